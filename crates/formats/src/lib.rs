pub mod geojson;
pub mod manifest;
pub mod package;

pub use geojson::*;
pub use manifest::*;
pub use package::*;
