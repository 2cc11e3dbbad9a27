pub mod cluster;
pub mod snapshot;
pub mod viewport;

pub use cluster::*;
pub use snapshot::*;
pub use viewport::*;
