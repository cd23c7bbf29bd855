pub mod config;
pub mod error;
pub mod influx;
pub mod model;
pub mod mqtt;
pub mod reading;
pub mod relay;
pub mod ws;

// Re-export commonly used items
pub use config::Config;
pub use error::{AppError, Result};
pub use influx::PowerSink;
pub use model::PowerModel;
pub use reading::Reading;
pub use relay::Relay;
pub use ws::{AppState, Hub, ServerMessage};
