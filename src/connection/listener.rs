//! Command listener with persistent connection and fixed-backoff reconnection

use crate::command::{DirectiveExecutor, DirectiveResult, SessionSet};
use crate::config::{AgentConfig, DecodePolicy};
use crate::flight::SessionError;
use crate::transport::{ConnectError, TransportConnector};
use letun_shared::codec::{self, CodecError, FrameDecoder};
use letun_shared::Message;
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outbound messages queued for the writer task
const OUTBOUND_QUEUE: usize = 100;

/// Why a connection ended
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Connect(ConnectError),

    #[error("Read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("Write error: {0}")]
    Write(#[source] std::io::Error),

    #[error("Coordinator closed connection")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Flight session failed: {0}")]
    Session(#[from] SessionError),
}

/// Outcome of one listen attempt
#[derive(Error, Debug)]
pub enum ListenError {
    /// Reconnect after the backoff
    #[error("{0}")]
    Recoverable(#[source] TransportError),

    /// Retrying cannot succeed
    #[error("{0}")]
    Fatal(#[source] ConnectError),
}

impl ListenError {
    #[cfg(test)]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ListenError::Recoverable(_))
    }
}

impl From<ConnectError> for ListenError {
    fn from(e: ConnectError) -> Self {
        if e.is_fatal() {
            ListenError::Fatal(e)
        } else {
            ListenError::Recoverable(TransportError::Connect(e))
        }
    }
}

impl From<TransportError> for ListenError {
    fn from(e: TransportError) -> Self {
        ListenError::Recoverable(e)
    }
}

/// Owns the agent's connection lifecycle and directive loop
pub struct CommandListener<C> {
    connector: C,
    executor: DirectiveExecutor,
    backoff: Duration,
    decode_policy: DecodePolicy,
}

impl<C: TransportConnector> CommandListener<C> {
    pub fn new(connector: C, config: &AgentConfig) -> Self {
        Self {
            connector,
            executor: DirectiveExecutor::new(
                config.interpolator(),
                config.loss_model(),
                config.report_interval(),
            ),
            backoff: config.reconnect_backoff(),
            decode_policy: config.on_decode_error,
        }
    }

    #[cfg(test)]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Listen forever, reconnecting after a fixed backoff.
    ///
    /// Only a fatal error ends the loop.
    pub async fn listen_with_retry(&self) -> Result<Infallible, ListenError> {
        loop {
            match self.listen().await {
                Err(ListenError::Recoverable(e)) => {
                    warn!(
                        endpoint = %self.connector.describe(),
                        error = %e,
                        "Connection lost, retrying in {:?}",
                        self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(fatal) => {
                    error!(endpoint = %self.connector.describe(), error = %fatal, "Giving up");
                    return Err(fatal);
                }
                Ok(never) => match never {},
            }
        }
    }

    /// Connect once and serve directives until the connection fails.
    ///
    /// Every flight spawned on this connection is aborted on return.
    pub async fn listen(&self) -> Result<Infallible, ListenError> {
        let stream = self.connector.connect().await?;
        info!(endpoint = %self.connector.describe(), "Connected to coordinator");

        let (reader, writer) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
        let mut writer_task = tokio::spawn(write_loop(writer, outbound_rx));
        let mut sessions = SessionSet::new();

        let reason = self
            .serve(reader, &outbound_tx, &mut sessions, &mut writer_task)
            .await;

        let aborted = sessions.len();
        sessions.abort_all();
        writer_task.abort();
        if aborted > 0 {
            warn!(aborted, "Aborted in-flight sessions");
        }

        Err(reason.into())
    }

    async fn serve<R: AsyncRead + Unpin>(
        &self,
        mut reader: R,
        outbound: &mpsc::Sender<Message>,
        sessions: &mut SessionSet,
        writer_task: &mut JoinHandle<Result<(), TransportError>>,
    ) -> TransportError {
        let mut decoder = FrameDecoder::new();
        let mut read_buf = vec![0u8; 4096];

        loop {
            tokio::select! {
                read = reader.read(&mut read_buf) => match read {
                    Ok(0) => return TransportError::Closed,
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);
                        if let Err(e) = self.drain_frames(&mut decoder, outbound, sessions) {
                            return e;
                        }
                    }
                    Err(e) => return TransportError::Read(e),
                },

                Some(joined) = sessions.join_next() => match joined {
                    Ok(Ok(report)) => {
                        debug!(
                            vehicle_id = %report.vehicle_id,
                            flight_id = ?report.flight_id,
                            sent = report.sent,
                            skipped = report.skipped,
                            "Session complete"
                        );
                    }
                    Ok(Err(e)) => return e.into(),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "Session task panicked"),
                },

                written = &mut *writer_task => {
                    return match written {
                        Ok(Err(e)) => e,
                        _ => TransportError::Closed,
                    };
                }
            }
        }
    }

    fn drain_frames(
        &self,
        decoder: &mut FrameDecoder,
        outbound: &mpsc::Sender<Message>,
        sessions: &mut SessionSet,
    ) -> Result<(), TransportError> {
        loop {
            match decoder.decode_next() {
                Ok(Some(message)) => {
                    debug!(kind = message.kind(), "Received from coordinator");
                    match self.executor.execute(message, outbound, sessions) {
                        DirectiveResult::FlightStarted { vehicle_id, flight_id, points } => debug!(
                            vehicle_id = %vehicle_id,
                            flight_id = ?flight_id,
                            points,
                            running = sessions.len(),
                            "Flight session spawned"
                        ),
                        DirectiveResult::Rejected { vehicle_id, message } => {
                            debug!(vehicle_id = %vehicle_id, reason = %message, "Directive rejected")
                        }
                        DirectiveResult::Observed => {}
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => match self.decode_policy {
                    DecodePolicy::Skip => warn!(error = %e, "Skipping malformed message"),
                    DecodePolicy::Reconnect => return Err(e.into()),
                },
            }
        }
    }
}

/// Single writer for the connection; serializes all outbound messages
async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Message>,
) -> Result<(), TransportError> {
    while let Some(message) = outbound.recv().await {
        let encoded = codec::encode(&message)?;
        writer.write_all(&encoded).await.map_err(TransportError::Write)?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}
