//! TCP transport for DS messages.
//!
//! Frames are a 4-byte big-endian length followed by the payload. The
//! first payload byte is the frame type; DS frames are handed to the
//! directory service's dispatcher with the sender's address as the peer
//! descriptor.
//!
//! # Locking
//!
//! The peers map is read-locked only long enough to clone the
//! per-connection writer handle; the writer's own lock is then taken for
//! the duration of the write, so slow peers never stall the map.

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use kestrel_directory::wire::{DS_MSG_TYPE, LOOKUP_MSG_TYPE};
use kestrel_directory::DirectoryService;
use kestrel_metrics::network::{
    P2P_BYTES_RECEIVED, P2P_BYTES_SENT, P2P_CONNECTION_ERRORS, P2P_MESSAGES_RECEIVED,
    P2P_MESSAGES_SENT, P2P_PEERS_CONNECTED,
};
use kestrel_types::Peer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Frame header size (payload length).
const HEADER_SIZE: usize = 4;

/// Upper bound on a single frame payload.
const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

#[derive(Clone)]
struct PeerConnection {
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
}

/// The DS node's TCP transport.
pub struct DsNetwork {
    service: Arc<DirectoryService>,
    peers: RwLock<HashMap<SocketAddr, PeerConnection>>,
}

impl DsNetwork {
    /// Create a transport bound to `service`.
    pub fn new(service: Arc<DirectoryService>) -> Self {
        Self {
            service,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `listen` and start accepting connections. Returns the bound
    /// address (useful when `listen` carries port 0).
    pub async fn listen(
        self: &Arc<Self>,
        listen: SocketAddr,
        token: CancellationToken,
    ) -> Result<SocketAddr> {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("failed to bind DS listener to {listen}"))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "DS transport listening");

        let network = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("DS listener stopping");
                        return;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "accepted DS connection");
                            P2P_PEERS_CONNECTED.inc();
                            let network = Arc::clone(&network);
                            tokio::spawn(async move {
                                if let Err(err) = network.handle_connection(stream, addr).await {
                                    debug!(%addr, %err, "DS connection closed with error");
                                }
                                P2P_PEERS_CONNECTED.dec();
                            });
                        }
                        Err(err) => {
                            error!(%err, "accept failed");
                            P2P_CONNECTION_ERRORS.inc();
                        }
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Read frames off one connection and dispatch them.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (mut reader, writer) = tokio::io::split(stream);
        self.peers.write().await.insert(
            addr,
            PeerConnection {
                writer: Arc::new(Mutex::new(writer)),
            },
        );

        let mut buf = BytesMut::with_capacity(4096);
        loop {
            let read = reader.read_buf(&mut buf).await?;
            if read == 0 {
                break;
            }

            while buf.len() >= HEADER_SIZE {
                let len = (&buf[..HEADER_SIZE]).get_u32() as usize;
                if len > MAX_MESSAGE_SIZE {
                    self.peers.write().await.remove(&addr);
                    anyhow::bail!("frame too large: {len}");
                }
                if buf.len() < HEADER_SIZE + len {
                    break;
                }

                buf.advance(HEADER_SIZE);
                let payload = buf.split_to(len);
                P2P_BYTES_RECEIVED.inc_by(payload.len() as f64);
                self.dispatch(&payload, addr).await;
            }
        }

        self.peers.write().await.remove(&addr);
        Ok(())
    }

    /// Route one payload by its frame-type byte.
    async fn dispatch(&self, payload: &[u8], addr: SocketAddr) {
        match payload.first() {
            Some(&DS_MSG_TYPE) => {
                P2P_MESSAGES_RECEIVED.with_label_values(&["ds"]).inc();
                let from = Peer::new(addr.ip(), addr.port());
                self.service.execute(payload, 1, &from).await;
            }
            Some(&LOOKUP_MSG_TYPE) => {
                P2P_MESSAGES_RECEIVED.with_label_values(&["lookup"]).inc();
                debug!(%addr, "lookup frame on a DS node; ignoring");
            }
            Some(other) => {
                P2P_MESSAGES_RECEIVED.with_label_values(&["unknown"]).inc();
                warn!(frame_type = other, %addr, "unknown frame type");
            }
            None => warn!(%addr, "empty frame"),
        }
    }

    /// Send one framed payload to `peer`, reusing a cached connection if
    /// one exists.
    pub async fn send(&self, peer: &Peer, payload: Vec<u8>) -> Result<()> {
        let addr = SocketAddr::new(peer.ip, peer.port);

        let connection = self.peers.read().await.get(&addr).cloned();
        let connection = match connection {
            Some(connection) => connection,
            None => {
                let stream = TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("failed to connect to {addr}"))?;
                let (reader, writer) = tokio::io::split(stream);
                // The outbound half doubles as an inbound connection.
                drop(reader);
                let connection = PeerConnection {
                    writer: Arc::new(Mutex::new(writer)),
                };
                self.peers.write().await.insert(addr, connection.clone());
                connection
            }
        };

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);

        let mut writer = connection.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        P2P_MESSAGES_SENT.inc();
        P2P_BYTES_SENT.inc_by(payload.len() as f64);
        Ok(())
    }

    /// Send one payload to every peer, logging failures.
    pub async fn multicast(&self, peers: &[Peer], payload: Vec<u8>) {
        for peer in peers {
            if let Err(err) = self.send(peer, payload.clone()).await {
                warn!(%peer, %err, "multicast send failed");
                P2P_CONNECTION_ERRORS.inc();
            }
        }
    }

    /// Number of live peer connections.
    pub async fn connected_peers(&self) -> usize {
        self.peers.read().await.len()
    }
}
