pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;
pub mod registry;

use tokio::sync::mpsc;

/// Sender half of a WebSocket connection's channel. Other parts of the
/// system clone this to push frames to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

pub use broadcast::EventRouter;
pub use registry::{ConnectionHandle, SessionRegistry};
