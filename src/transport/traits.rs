//! Transport trait abstraction for pluggable network backends

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Errors raised while opening a transport
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The endpoint cannot be parsed; retrying will not help
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Connect to {endpoint} failed: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConnectError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConnectError::InvalidEndpoint { .. })
    }
}

/// A transport stream that can read and write bytes
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TransportStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Factory for creating transport connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The stream type this connector produces
    type Stream: TransportStream;

    /// Attempt to connect, returning a stream on success
    async fn connect(&self) -> Result<Self::Stream, ConnectError>;

    /// Human-readable description of the endpoint
    fn describe(&self) -> String;
}
