pub mod actor;
pub mod handler;
pub mod registry;

use axum::extract::ws::Message;
use tokio::sync::mpsc;

pub use registry::ConnectionRegistry;

/// Sender half of a WebSocket connection's outbound channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;
