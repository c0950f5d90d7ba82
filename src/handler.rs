//! TCP connection handler
//!
//! Drives one connection through its lifecycle:
//! `AwaitingName` → `Active` → `Disconnected`.
//! The handler owns the socket. Everything written to the client goes
//! through an mpsc channel drained by a dedicated writer task, so the
//! registry and router only ever hold the sender half.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{Framing, ServerConfig};
use crate::error::{AppError, RegisterError};
use crate::message::{decode_text, ClientCommand, ServerMessage};
use crate::router::{Router, UnicastOutcome};
use crate::types::ClientId;

/// Connection lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first line, the requested display name
    AwaitingName,
    /// Registered under `name`, exchanging messages
    Active { name: String },
    /// Terminal
    Disconnected,
}

/// Handle a new TCP connection
///
/// Runs the handshake and message loop, then tears the connection down.
/// Peer close, resets and protocol errors end the connection normally;
/// only a lost registry surfaces as an error.
pub async fn handle_connection(
    stream: TcpStream,
    router: Router,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream.peer_addr()?;
    let client_id = ClientId::new();
    debug!("Connection {} from {}", client_id, peer_addr);

    let (read_half, write_half) = stream.into_split();

    // Channel for server -> client lines
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);
    let (close_tx, close_rx) = oneshot::channel();
    let write_task = tokio::spawn(write_loop(write_half, msg_rx, close_rx, client_id));

    let mut connection = Connection {
        id: client_id,
        addr: peer_addr,
        reader: BufReader::new(read_half),
        outbound: msg_tx,
        router,
        config,
    };
    let result = connection.run().await;

    // Snapshots held by other tasks may still own senders; close regardless
    let _ = close_tx.send(());
    drop(connection);
    let _ = write_task.await;

    debug!("Connection {} closed", client_id);
    result
}

struct Connection {
    id: ClientId,
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    outbound: mpsc::Sender<ServerMessage>,
    router: Router,
    config: Arc<ServerConfig>,
}

impl Connection {
    async fn run(&mut self) -> Result<(), AppError> {
        let mut state = ConnectionState::AwaitingName;

        loop {
            state = match state {
                ConnectionState::AwaitingName => self.await_name().await?,
                ConnectionState::Active { name } => self.serve(name).await?,
                ConnectionState::Disconnected => break,
            };
        }

        self.disconnect().await
    }

    /// Read and register the display name
    async fn await_name(&mut self) -> Result<ConnectionState, AppError> {
        let limit = self.config.read_chunk_size;
        let mut line = Vec::new();
        if let Err(e) = read_line_limited(&mut self.reader, &mut line, limit).await {
            debug!("Read error from {} during handshake: {}", self.addr, e);
            return Ok(ConnectionState::Disconnected);
        }
        if line.len() >= limit && !line.ends_with(b"\n") {
            warn!("Name line from {} exceeds {} bytes, closing", self.addr, limit);
            return Ok(ConnectionState::Disconnected);
        }

        let name = decode_text(&line);
        if name.is_empty() {
            info!("Client {} sent no name, closing", self.addr);
            return Ok(ConnectionState::Disconnected);
        }

        let registration = self
            .router
            .registry()
            .try_register(self.id, name.clone(), self.addr, self.outbound.clone())
            .await?;

        match registration {
            Ok(_) => {
                self.router
                    .broadcast(self.id, ServerMessage::Joined { name: name.clone() }, true)
                    .await?;
                self.router.announce_roster().await?;
                Ok(ConnectionState::Active { name })
            }
            Err(RegisterError::DuplicateName(name)) => {
                warn!("Duplicate name '{}' rejected for {}", name, self.addr);
                self.send(ServerMessage::DuplicateName { name }).await;
                Ok(ConnectionState::Disconnected)
            }
            Err(e @ RegisterError::AlreadyRegistered) => {
                warn!("Handshake for {} rejected: {}", self.id, e);
                Ok(ConnectionState::Disconnected)
            }
        }
    }

    /// Message loop for a registered client
    async fn serve(&mut self, name: String) -> Result<ConnectionState, AppError> {
        let mut buf = vec![0u8; self.config.read_chunk_size];
        let framing = self.config.framing;

        loop {
            let received = tokio::select! {
                received = read_message(&mut self.reader, &mut buf, framing) => received,
                _ = self.outbound.closed() => {
                    debug!("Writer for {} is gone", name);
                    None
                }
            };

            let Some(text) = received else {
                return Ok(ConnectionState::Disconnected);
            };
            if text.is_empty() {
                continue;
            }

            match ClientCommand::parse(&text) {
                ClientCommand::Quit => {
                    debug!("{} quit", name);
                    return Ok(ConnectionState::Disconnected);
                }
                ClientCommand::MalformedPrivate => {
                    self.send(ServerMessage::Usage).await;
                }
                ClientCommand::Private { to, text } => {
                    let reply = match self.router.unicast(&name, &to, &text).await? {
                        UnicastOutcome::Delivered => ServerMessage::PrivateSent { to, text },
                        UnicastOutcome::RecipientNotFound => {
                            ServerMessage::RecipientNotFound { name: to }
                        }
                    };
                    self.send(reply).await;
                }
                ClientCommand::Chat(text) => {
                    debug!("[{}] {}", name, text);
                    let chat = ServerMessage::Chat {
                        from: name.clone(),
                        text,
                    };
                    self.router.broadcast(self.id, chat, true).await?;
                }
            }
        }
    }

    /// Terminal step: unregister and announce, once
    async fn disconnect(&mut self) -> Result<(), AppError> {
        match self.router.teardown(self.id).await? {
            Some(client) => info!("{} ({}) disconnected", client.name, client.addr),
            None => debug!("{} closed before registering", self.addr),
        }
        Ok(())
    }

    /// Queue a line for this connection only
    async fn send(&self, msg: ServerMessage) {
        if self.outbound.send(msg).await.is_err() {
            debug!("Writer for {} already closed", self.id);
        }
    }
}

/// Receive one message according to the framing mode
///
/// Either mode takes at most `buf.len()` bytes; an over-long line is cut
/// and its remainder becomes the next message. `None` means the peer
/// closed the stream or the read failed.
async fn read_message(
    reader: &mut BufReader<OwnedReadHalf>,
    buf: &mut [u8],
    framing: Framing,
) -> Option<String> {
    let result = match framing {
        Framing::Chunk => reader
            .read(buf)
            .await
            .map(|n| (n > 0).then(|| decode_text(&buf[..n]))),
        Framing::Line => {
            let mut line = Vec::new();
            read_line_limited(reader, &mut line, buf.len())
                .await
                .map(|n| (n > 0).then(|| decode_text(&line)))
        }
    };

    result.unwrap_or_else(|e| {
        debug!("Read error: {}", e);
        None
    })
}

/// Read up to and including `\n`, but never more than `limit` bytes
async fn read_line_limited(
    reader: &mut BufReader<OwnedReadHalf>,
    line: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<usize> {
    reader.take(limit as u64).read_until(b'\n', line).await
}

/// Drain queued lines onto the socket
///
/// Ends on the first write error, when every sender is gone, or once
/// `close_rx` fires and the queue is empty. Dropping the receiver then
/// makes every later send to this connection fail.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    mut close_rx: oneshot::Receiver<()>,
    client_id: ClientId,
) {
    loop {
        let msg = tokio::select! {
            // Queued lines go out before the close is honoured
            biased;
            msg = msg_rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = &mut close_rx => break,
        };

        let line = format!("{}\n", msg);
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!("Write to {} failed: {}", client_id, e);
            break;
        }
    }
    drop(msg_rx);

    let _ = writer.shutdown().await;
    debug!("Write task ended for {}", client_id);
}
