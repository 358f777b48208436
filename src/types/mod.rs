//! Domain types shared across acquisition, ML engine and pipeline.

mod classification;
mod forecast;
mod reading;
mod snapshot;

pub use classification::*;
pub use forecast::*;
pub use reading::*;
pub use snapshot::*;
