//! Error types for broker sessions

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No broker host configured (placeholder credentials)
    #[error("no broker host configured")]
    NoBroker,

    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),

    /// The network thread could not be started
    #[error("failed to start network thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("session is not connected")]
    NotConnected,

    /// The client refused the request, usually a full or closed queue
    #[error("publish rejected: {0}")]
    Publish(#[from] rumqttc::ClientError),
}
