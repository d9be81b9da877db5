//! The single authoritative control connection: handshake, `REGISTER`
//! subscription, and the server-push event demultiplexing loop (spec.md
//! §4.B).
//!
//! Grounded on the teacher's `networking::protocol::handshake` negotiation
//! flow and `pool::connection::lifecycle` state enum, narrowed to the one
//! control-channel responsibility instead of a general connection pool.

use super::reconnection::ReconnectionPolicy;
use crate::error::{DbError, Result};
use crate::protocol::events::{decode_event, ServerEvent};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::{Compression, Opcode, ProtocolVersion};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlState {
    Disconnected = 0,
    Connecting = 1,
    Ready = 2,
}

impl From<u8> for ControlState {
    fn from(v: u8) -> Self {
        match v {
            1 => ControlState::Connecting,
            2 => ControlState::Ready,
            _ => ControlState::Disconnected,
        }
    }
}

const REGISTERED_EVENTS: [&str; 3] = ["TOPOLOGY_CHANGE", "STATUS_CHANGE", "SCHEMA_CHANGE"];

/// Owns the TCP stream for the control channel and drives the
/// connect → REGISTER → event-loop state machine. Events are forwarded to
/// `events_tx`; the topology tracker (`cluster::mod`) owns the receiving
/// end and applies them to `ClusterMetadata`.
pub struct ControlConnection {
    state: AtomicU8,
    protocol_version: ProtocolVersion,
    compression: Compression,
    stream: AsyncMutex<Option<TcpStream>>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ControlConnection {
    pub fn new(protocol_version: ProtocolVersion, compression: Compression) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            state: AtomicU8::new(ControlState::Disconnected as u8),
            protocol_version,
            compression,
            stream: AsyncMutex::new(None),
            events_tx: tx,
        });
        (conn, rx)
    }

    pub fn state(&self) -> ControlState {
        ControlState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ControlState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Connects, negotiates protocol version (downgrading on
    /// `ProtocolError` per spec.md §6), and completes the `REGISTER`
    /// handshake. On success the connection is `Ready`.
    pub async fn connect(&self, address: SocketAddr) -> Result<()> {
        self.set_state(ControlState::Connecting);
        let mut version = self.protocol_version;
        loop {
            let stream = TcpStream::connect(address)
                .await
                .map_err(|e| DbError::ConnectionException(e.to_string()))?;
            let mut stream = stream;
            match self.negotiate_and_register(&mut stream, version, self.compression).await {
                Ok(()) => {
                    *self.stream.lock().await = Some(stream);
                    self.set_state(ControlState::Ready);
                    tracing::info!(%address, ?version, "control connection ready");
                    return Ok(());
                }
                Err(DbError::ProtocolError(_)) => match version.downgrade() {
                    Some(lower) => {
                        tracing::warn!(%address, from = ?version, to = ?lower, "downgrading protocol version");
                        version = lower;
                        continue;
                    }
                    None => {
                        self.set_state(ControlState::Disconnected);
                        return Err(DbError::InvalidProtocolVersion(
                            "no protocol version below V1 available".into(),
                        ));
                    }
                },
                Err(e) => {
                    self.set_state(ControlState::Disconnected);
                    return Err(e);
                }
            }
        }
    }

    async fn negotiate_and_register(
        &self,
        stream: &mut TcpStream,
        version: ProtocolVersion,
        compression: Compression,
    ) -> Result<()> {
        let startup_body = {
            let mut body = BytesMut::new();
            body.put_u16(1);
            put_string(&mut body, "CQL_VERSION");
            put_string(&mut body, "3.0.0");
            body
        };
        write_frame(stream, version, Opcode::Startup, 0, startup_body, compression).await?;
        let (header, _body) = read_frame(stream, version, compression).await?;
        match header.opcode {
            Opcode::Ready | Opcode::Authenticate => {}
            Opcode::Error => return Err(DbError::ProtocolError("STARTUP rejected".into())),
            other => return Err(DbError::ProtocolError(format!("unexpected STARTUP reply {other:?}"))),
        }

        let register_body = {
            let mut body = BytesMut::new();
            body.put_u16(REGISTERED_EVENTS.len() as u16);
            for event in REGISTERED_EVENTS {
                put_string(&mut body, event);
            }
            body
        };
        write_frame(stream, version, Opcode::Register, 0, register_body, compression).await?;
        let (header, _body) = read_frame(stream, version, compression).await?;
        if header.opcode != Opcode::Ready {
            return Err(DbError::ProtocolError("REGISTER rejected".into()));
        }
        Ok(())
    }

    /// Runs until the connection closes. Each frame on the event stream-id
    /// is decoded and forwarded; anything else is unexpected on a control
    /// connection and is logged and dropped.
    pub async fn run_event_loop(self: Arc<Self>) -> Result<()> {
        loop {
            let mut guard = self.stream.lock().await;
            let stream = match guard.as_mut() {
                Some(s) => s,
                None => return Err(DbError::ConnectionException("control connection not ready".into())),
            };
            let version = self.protocol_version;
            match read_frame(stream, version, self.compression).await {
                Ok((header, body)) => {
                    drop(guard);
                    if header.is_event_stream() && header.opcode == Opcode::Event {
                        match decode_event(body, version) {
                            Ok(event) => {
                                let _ = self.events_tx.send(event);
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to decode server event"),
                        }
                    } else {
                        tracing::debug!(opcode = ?header.opcode, "ignoring non-event frame on control connection");
                    }
                }
                Err(e) => {
                    drop(guard);
                    self.set_state(ControlState::Disconnected);
                    *self.stream.lock().await = None;
                    return Err(e);
                }
            }
        }
    }
}

/// Runs the connect/event-loop/reconnect cycle forever, using `policy` for
/// backoff between attempts. Intended to be spawned as a background task
/// owned by `cluster::Cluster`.
pub async fn drive_control_connection(
    conn: Arc<ControlConnection>,
    candidates: Vec<SocketAddr>,
    policy: Arc<dyn ReconnectionPolicy>,
) {
    loop {
        let mut connected = false;
        for address in &candidates {
            if conn.connect(*address).await.is_ok() {
                connected = true;
                if let Err(e) = Arc::clone(&conn).run_event_loop().await {
                    tracing::warn!(error = %e, "control connection event loop ended");
                }
                break;
            }
        }
        if !connected {
            tracing::warn!("no control connection candidate reachable");
        }
        let mut schedule = policy.new_schedule();
        tokio::time::sleep(schedule.next_delay()).await;
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

async fn write_frame(
    stream: &mut TcpStream,
    version: ProtocolVersion,
    opcode: Opcode,
    stream_id: i16,
    body: BytesMut,
    compression: Compression,
) -> Result<()> {
    let frame = Frame::new(version, stream_id, opcode, body, compression)?;
    let out = frame.encode();
    stream
        .write_all(&out)
        .await
        .map_err(|e| DbError::ConnectionException(e.to_string()))
}

async fn read_frame(
    stream: &mut TcpStream,
    version: ProtocolVersion,
    compression: Compression,
) -> Result<(FrameHeader, BytesMut)> {
    let header_size = FrameHeader::encoded_size(version);
    let mut header_buf = BytesMut::with_capacity(header_size);
    header_buf.resize(header_size, 0);
    stream
        .read_exact(&mut header_buf)
        .await
        .map_err(|e| DbError::ConnectionException(e.to_string()))?;
    let header = FrameHeader::decode(&mut header_buf)?;

    let mut body = BytesMut::with_capacity(header.length as usize);
    body.resize(header.length as usize, 0);
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| DbError::ConnectionException(e.to_string()))?;
    let body = compression.maybe_decompress(body, header.flags.compressed)?;
    Ok((header, body))
}
