//! In-memory transport for exercising the listener without sockets

use crate::transport::traits::{ConnectError, TransportConnector};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Hands the far end of every new connection to the test through a channel
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DuplexStream>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers,
            attempts: AtomicUsize::new(0),
        };
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    type Stream = DuplexStream;

    async fn connect(&self) -> Result<Self::Stream, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (local, remote) = tokio::io::duplex(64 * 1024);
        self.peers
            .send(remote)
            .map_err(|_| ConnectError::Unreachable {
                endpoint: self.describe(),
                source: std::io::ErrorKind::ConnectionRefused.into(),
            })?;
        Ok(local)
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
