//! Client struct definition
//!
//! Represents a registered participant: identity plus the channel feeding
//! its connection's writer task.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Registered client information
///
/// Cloning a `Client` clones only the sender half of its outbound channel;
/// the socket itself stays owned by the connection handler.
#[derive(Debug, Clone)]
pub struct Client {
    /// Connection identifier
    pub id: ClientId,
    /// Display name, unique among registered clients
    pub name: String,
    /// Peer address (informational)
    pub addr: SocketAddr,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl Client {
    /// Create a new client
    pub fn new(
        id: ClientId,
        name: String,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            name,
            addr,
            sender,
        }
    }

    /// Send a message to this client
    ///
    /// Returns an error if the writer task is gone (socket write failed
    /// or the connection was torn down).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_client_send_reaches_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let client = Client::new(ClientId::new(), "Alice".to_string(), addr(), tx);

        client.send(ServerMessage::Usage).await.unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::Usage));
    }

    #[tokio::test]
    async fn test_client_send_fails_when_writer_gone() {
        let (tx, rx) = mpsc::channel(4);
        let client = Client::new(ClientId::new(), "Alice".to_string(), addr(), tx);
        drop(rx);

        assert!(client.send(ServerMessage::Usage).await.is_err());
    }
}
