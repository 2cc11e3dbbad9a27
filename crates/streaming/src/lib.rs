pub mod residency;
pub mod source;
pub mod store;

pub use residency::*;
pub use source::*;
pub use store::*;
