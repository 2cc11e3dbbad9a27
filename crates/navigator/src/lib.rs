pub mod content;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod history;
pub mod metrics;
pub mod state;

pub use content::*;
pub use controller::*;
pub use error::*;
pub use event_bus::*;
pub use history::*;
pub use metrics::*;
pub use state::*;
