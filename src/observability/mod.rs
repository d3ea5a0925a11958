pub mod metrics;
pub mod tracking;

pub use metrics::*;
pub use tracking::*;
