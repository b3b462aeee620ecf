//! Individual peer connection handling

use super::registry::{PeerHandle, PeerId, SessionRegistry};
use crate::command::DirectiveDispatcher;
use letun_shared::codec::{self, FrameDecoder};
use letun_shared::{Message, TelemetryRecord};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Messages queued for one peer before senders wait
const OUTBOUND_QUEUE: usize = 100;

/// Inbound side of a peer connection
pub struct PeerSession<R> {
    peer_id: PeerId,
    addr: String,
    reader: R,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> PeerSession<R> {
    pub fn new(peer_id: PeerId, addr: String, reader: R) -> Self {
        Self {
            peer_id,
            addr,
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Read the next message; malformed lines are logged and skipped.
    /// Returns None once the connection is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(message)) => return Some(message),
                Ok(None) => {}
                Err(e) => {
                    warn!(peer_id = self.peer_id, addr = %self.addr, "Skipping undecodable message: {}", e);
                    continue;
                }
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!(peer_id = self.peer_id, addr = %self.addr, "Read error: {}", e);
                    return None;
                }
            }
        }
    }
}

/// Serve one peer until it disconnects or the registry drops it
pub async fn serve_peer<S>(
    stream: S,
    addr: String,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<DirectiveDispatcher>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let writer_task = tokio::spawn(write_loop(writer, rx, addr.clone()));

    let handle = PeerHandle::new(addr.clone(), outbound);
    let closed = handle.closed();
    let peer_id = registry.register(handle).await;
    let mut session = PeerSession::new(peer_id, addr.clone(), reader);

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                warn!(peer_id, addr = %addr, "Peer dropped by coordinator");
                break;
            }
            message = session.recv() => match message {
                Some(message) => handle_message(peer_id, message, &registry, &dispatcher).await,
                None => {
                    info!(peer_id, addr = %addr, "Peer disconnected");
                    break;
                }
            },
        }
    }

    registry.unregister(peer_id).await;
    writer_task.abort();
}

async fn handle_message(
    peer_id: PeerId,
    message: Message,
    registry: &Arc<SessionRegistry>,
    dispatcher: &DirectiveDispatcher,
) {
    match message {
        Message::Telemetry(record) => {
            if let Some(record) = on_telemetry(peer_id, record, registry).await {
                registry.relay(peer_id, &Message::Telemetry(record)).await;
            }
        }
        Message::Stop(stop) => {
            info!(vehicle_id = %stop.vehicle_id, flight_id = ?stop.flight_id, "Vehicle finished flight");
            registry.handle_stop(stop.vehicle_id).await;
            registry.relay(peer_id, &Message::Stop(stop)).await;
        }
        Message::Start(directive) => {
            info!(peer_id, vehicle_id = %directive.vehicle_id, "Relaying start directive from peer");
            dispatcher.relay_start(directive).await;
        }
    }
}

/// Refresh liveness for the reporting vehicle; unresolvable records are dropped
async fn on_telemetry(peer_id: PeerId, record: TelemetryRecord, registry: &SessionRegistry) -> Option<TelemetryRecord> {
    let Some(vehicle_id) = registry.resolve_vehicle(&record).await else {
        warn!(peer_id, flight_id = ?record.flight_id, "Telemetry for unknown vehicle, dropping");
        return None;
    };

    registry.record_message(vehicle_id, Some(peer_id), Instant::now()).await;
    debug!(
        vehicle_id = %vehicle_id,
        lat = record.latitude,
        lon = record.longitude,
        alt = record.altitude,
        speed = record.speed,
        "Telemetry"
    );
    Some(record)
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Message>, addr: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let frame = match codec::encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(addr = %addr, "Failed to encode {} message: {}", message.kind(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            warn!(addr = %addr, "Write error: {}", e);
            break;
        }
    }
}
