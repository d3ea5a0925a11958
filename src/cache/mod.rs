pub mod fingerprint;
pub mod policy;
pub mod store;

pub use fingerprint::*;
pub use policy::*;
pub use store::*;
