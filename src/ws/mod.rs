pub mod connection;
pub mod handler;
pub mod hub;
pub mod protocol;

pub use handler::{app, health_check, ws_handler, AppState};
pub use hub::Hub;
pub use protocol::ServerMessage;
