//! Broadcast and private message routing
//!
//! The router holds no state of its own. Every delivery starts from a
//! registry snapshot and the sends happen after the registry has answered,
//! so a slow recipient never holds up registry operations. A failed send
//! tears the recipient down through the same path as any other disconnect.

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::registry::RegistryHandle;
use crate::types::ClientId;

/// Result of a private message attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnicastOutcome {
    /// Handed to the recipient's connection (best effort)
    Delivered,
    /// No registered client has that name
    RecipientNotFound,
}

/// Message router
#[derive(Debug, Clone)]
pub struct Router {
    registry: RegistryHandle,
}

impl Router {
    pub fn new(registry: RegistryHandle) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Send `message` to every registered client, optionally skipping `from`
    pub async fn broadcast(
        &self,
        from: ClientId,
        message: ServerMessage,
        exclude_sender: bool,
    ) -> Result<(), AppError> {
        let skip = exclude_sender.then_some(from);
        let failed = self.fan_out(skip, message).await?;
        self.reap(failed).await
    }

    /// Send a private message to the client named `to`
    ///
    /// A failed send still reports `Delivered`; the recipient is torn down.
    pub async fn unicast(
        &self,
        from: &str,
        to: &str,
        text: &str,
    ) -> Result<UnicastOutcome, AppError> {
        let Some(recipient) = self.registry.find_by_name(to).await? else {
            return Ok(UnicastOutcome::RecipientNotFound);
        };

        let message = ServerMessage::Private {
            from: from.to_string(),
            text: text.to_string(),
        };
        if recipient.send(message).await.is_err() {
            warn!("Private message to {} failed, dropping client", recipient.name);
            self.reap(vec![recipient.id]).await?;
        } else {
            debug!("Private message {} -> {}", from, to);
        }

        Ok(UnicastOutcome::Delivered)
    }

    /// Broadcast the current roster to everyone
    pub async fn announce_roster(&self) -> Result<(), AppError> {
        let failed = self.roster_fan_out().await?;
        self.reap(failed).await
    }

    /// Remove a client and announce its departure
    ///
    /// Returns the removed client, or `None` if it was not registered
    /// (never completed the handshake, or already torn down). Only the
    /// call that actually removes the client announces anything.
    pub async fn teardown(&self, id: ClientId) -> Result<Option<Client>, AppError> {
        let Some(client) = self.registry.unregister(id).await? else {
            return Ok(None);
        };

        let failed = self.announce_departure(&client).await?;
        self.reap(failed).await?;
        Ok(Some(client))
    }

    /// Tear down clients whose sends failed
    ///
    /// Departure announcements can fail in turn, so this works through a
    /// queue until no new failures appear.
    async fn reap(&self, mut pending: Vec<ClientId>) -> Result<(), AppError> {
        while let Some(id) = pending.pop() {
            if let Some(client) = self.registry.unregister(id).await? {
                warn!("Send to {} failed, tearing down", client.name);
                pending.extend(self.announce_departure(&client).await?);
            }
        }
        Ok(())
    }

    async fn announce_departure(&self, client: &Client) -> Result<Vec<ClientId>, AppError> {
        info!("{} left the chat", client.name);

        let left = ServerMessage::Left {
            name: client.name.clone(),
        };
        let mut failed = self.fan_out(None, left).await?;
        failed.extend(self.roster_fan_out().await?);
        Ok(failed)
    }

    async fn roster_fan_out(&self) -> Result<Vec<ClientId>, AppError> {
        let clients = self.registry.snapshot().await?;
        if clients.is_empty() {
            return Ok(Vec::new());
        }

        let names = clients.iter().map(|c| c.name.clone()).collect();
        Ok(deliver(&clients, None, ServerMessage::Roster { names }).await)
    }

    async fn fan_out(
        &self,
        skip: Option<ClientId>,
        message: ServerMessage,
    ) -> Result<Vec<ClientId>, AppError> {
        let clients = self.registry.snapshot().await?;
        Ok(deliver(&clients, skip, message).await)
    }
}

/// Send to every client in `clients` except `skip`, returning the failures
async fn deliver(
    clients: &[Client],
    skip: Option<ClientId>,
    message: ServerMessage,
) -> Vec<ClientId> {
    let sends = clients
        .iter()
        .filter(|c| Some(c.id) != skip)
        .map(|c| {
            let message = message.clone();
            async move { c.send(message).await.err().map(|_| c.id) }
        });

    join_all(sends).await.into_iter().flatten().collect()
}
