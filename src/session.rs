//! Public entry points: `Cluster` handle plus the `Session` a caller
//! actually issues statements against (spec.md §4 "Data flow").
//!
//! Grounded on the teacher's `networking::protocol::handshake` connect flow
//! (reused here for data connections, not just the control channel) and
//! `pool::connection::core` per-connection read-loop pattern.

use crate::cluster::{Cluster, Host};
use crate::codec::CodecRegistry;
use crate::config::ClusterConfig;
use crate::error::{DbError, Result};
use crate::execution::{CancellationToken, ConnectionSource, LoadBalancingPolicy, QueryState};
use crate::pool::{Connection, ConnectionLifecycle, HostDispatcher, PoolSizing, RawResponse};
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::{Compression, Opcode};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

/// A single dialed data connection: the bookkeeping object from `pool::`
/// paired with the TCP socket it actually speaks over.
struct Socket {
    write_half: AsyncMutex<tokio::net::tcp::OwnedWriteHalf>,
}

/// A live CQL session: a cluster handle plus the per-host dispatchers and
/// sockets backing it.
pub struct Session {
    cluster: Arc<Cluster>,
    config: ClusterConfig,
    dispatchers: DashMap<SocketAddr, Arc<HostDispatcher>>,
    sockets: DashMap<u64, Arc<Socket>>,
}

impl Session {
    /// Connects the control channel and returns a session ready to execute
    /// statements. Data connections are dialed lazily as hosts are first
    /// targeted by the load-balancing policy.
    pub async fn connect(seed_addresses: Vec<SocketAddr>, config: ClusterConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let cluster = Cluster::connect(
            seed_addresses,
            config.protocol_version,
            config.compression,
            Arc::clone(&config.reconnection_policy),
            config.query.refresh_node_interval,
            config.query.refresh_node_list_interval,
            config.query.refresh_schema_interval,
            config.new_node_delay,
        );
        Ok(Arc::new(Self {
            cluster,
            config,
            dispatchers: DashMap::new(),
            sockets: DashMap::new(),
        }))
    }

    pub fn codecs(&self) -> Arc<CodecRegistry> {
        Arc::clone(self.cluster.metadata.codecs())
    }

    /// Executes one statement end-to-end (spec.md §4 "Data flow").
    pub async fn execute(&self, opcode: Opcode, body: BytesMut) -> Result<RawResponse> {
        let plan = self.config.load_balancing_policy.plan(&self.cluster.metadata, None);
        for host in &plan {
            if self.dispatchers.contains_key(&host.address) {
                continue;
            }
            if let Err(e) = self.dial(host).await {
                tracing::debug!(address = %host.address, error = %e, "skipping host during dial");
            }
        }
        let state = QueryState {
            max_retries: self.config.query.max_retries,
            timeout: self.config.query.default_timeout,
            tracing: false,
            retry_policy: Arc::clone(&self.config.retry_policy),
            speculative_policy: Arc::new(crate::execution::NoSpeculativeExecutionPolicy),
        };
        state
            .execute(plan, opcode, body, self.config.compression, self, CancellationToken::new())
            .await
    }

    async fn dial(&self, host: &Arc<Host>) -> Result<Arc<HostDispatcher>> {
        if let Some(existing) = self.dispatchers.get(&host.address) {
            return Ok(Arc::clone(existing.value()));
        }

        let distance = self.config.load_balancing_policy.distance(host);
        let sizing = self
            .config
            .pooling
            .sizing_for(distance)
            .ok_or_else(|| DbError::ConnectionException("host is ignored by load balancing policy".into()))?;

        let dispatcher = Arc::new(HostDispatcher::new(
            host.address,
            self.config.protocol_version,
            sizing,
            self.config.pooling.max_wait_queue_size,
        ));

        // Pre-dial the core pool so `dispatcher.dispatch()` always has a
        // live socket to pair a borrowed connection with; growth above core
        // is driven by the pool-maintenance task calling `open_connection`
        // again as `resize_decision` reports `Grow`.
        for _ in 0..sizing.core {
            self.open_connection(&dispatcher).await?;
        }

        self.dispatchers.insert(host.address, Arc::clone(&dispatcher));
        Ok(dispatcher)
    }

    async fn open_connection(&self, dispatcher: &Arc<HostDispatcher>) -> Result<Arc<Connection>> {
        let stream = TcpStream::connect(dispatcher.address)
            .await
            .map_err(|e| DbError::ConnectionException(e.to_string()))?;
        let version = self.config.protocol_version;
        let compression = self.config.compression;
        let (mut read_half, mut write_half) = stream.into_split();

        startup(&mut write_half, version, compression).await?;

        let conn = dispatcher.add_connection();
        self.sockets.insert(conn.id, Arc::new(Socket { write_half: AsyncMutex::new(write_half) }));

        let conn_for_reader = Arc::clone(&conn);
        let dispatcher_for_reader = Arc::clone(dispatcher);
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half, version, compression).await {
                    Ok((header, body)) => {
                        conn_for_reader.complete(header.stream_id, Ok(RawResponse { opcode: header.opcode, body }));
                    }
                    Err(e) => {
                        tracing::warn!(connection = conn_for_reader.id, error = %e, "data connection read loop ended");
                        conn_for_reader.set_lifecycle(ConnectionLifecycle::Closed);
                        dispatcher_for_reader.on_connection_closed(conn_for_reader.id);
                        return;
                    }
                }
            }
        });

        Ok(conn)
    }
}

#[async_trait]
impl ConnectionSource for Session {
    fn dispatcher_for(&self, host: &Host) -> Option<Arc<HostDispatcher>> {
        self.dispatchers.get(&host.address).map(|entry| Arc::clone(entry.value()))
    }

    async fn send(&self, conn: &Arc<Connection>, stream_id: i16, opcode: Opcode, body: BytesMut, compression: Compression) -> Result<()> {
        let socket = self
            .sockets
            .get(&conn.id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DbError::ConnectionException("no socket for connection".into()))?;

        let frame = Frame::new(self.config.protocol_version, stream_id, opcode, body, compression)?;
        let out = frame.encode();
        let mut write_half = socket.write_half.lock().await;
        write_half.write_all(&out).await.map_err(|e| DbError::ConnectionException(e.to_string()))?;
        conn.touch();
        Ok(())
    }
}

async fn startup(write_half: &mut tokio::net::tcp::OwnedWriteHalf, version: crate::protocol::ProtocolVersion, compression: Compression) -> Result<()> {
    let mut body = BytesMut::new();
    body.put_u16(1);
    put_string(&mut body, "CQL_VERSION");
    put_string(&mut body, "3.0.0");
    let frame = Frame::new(version, 0, Opcode::Startup, body, compression)?;
    let out = frame.encode();
    write_half.write_all(&out).await.map_err(|e| DbError::ConnectionException(e.to_string()))
}

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

async fn read_frame(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    version: crate::protocol::ProtocolVersion,
    compression: Compression,
) -> Result<(FrameHeader, BytesMut)> {
    let header_size = FrameHeader::encoded_size(version);
    let mut header_buf = BytesMut::with_capacity(header_size);
    header_buf.resize(header_size, 0);
    read_half.read_exact(&mut header_buf).await.map_err(|e| DbError::ConnectionException(e.to_string()))?;
    let header = FrameHeader::decode(&mut header_buf)?;

    let mut body = BytesMut::with_capacity(header.length as usize);
    body.resize(header.length as usize, 0);
    read_half.read_exact(&mut body).await.map_err(|e| DbError::ConnectionException(e.to_string()))?;
    let body = compression.maybe_decompress(body, header.flags.compressed)?;
    Ok((header, body))
}
