//! TCP transport implementation

use crate::transport::traits::{ConnectError, TransportConnector};
use async_trait::async_trait;
use tokio::net::TcpStream;

const SCHEME: &str = "tcp://";

/// TCP connector for a coordinator endpoint (`tcp://host:port` or `host:port`)
pub struct TcpConnector {
    endpoint: String,
}

impl TcpConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Socket address part of the endpoint
    pub fn address(&self) -> Result<&str, ConnectError> {
        parse_endpoint(&self.endpoint)
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<Self::Stream, ConnectError> {
        let address = self.address()?;
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| ConnectError::Unreachable {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        stream.set_nodelay(true).map_err(|source| ConnectError::Unreachable {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

/// Validate an endpoint and return its `host:port` part
pub fn parse_endpoint(endpoint: &str) -> Result<&str, ConnectError> {
    let invalid = |reason: &str| ConnectError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let address = match endpoint.split_once("://") {
        Some(_) if endpoint.starts_with(SCHEME) => &endpoint[SCHEME.len()..],
        Some((scheme, _)) => return Err(invalid(&format!("unsupported scheme {:?}", scheme))),
        None => endpoint,
    };
    let address = address.trim_end_matches('/');

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>().map_err(|_| invalid("port is not a number"))?;

    Ok(address)
}
