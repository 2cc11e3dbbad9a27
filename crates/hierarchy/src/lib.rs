pub mod bounds;
pub mod feature;
pub mod filter;
pub mod level;

pub use bounds::*;
pub use feature::*;
pub use filter::*;
pub use formats::GeometryKind;
pub use level::*;
