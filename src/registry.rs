//! Client registry actor
//!
//! The registry is the only shared mutable state of the relay. A single
//! actor task owns it and processes one command at a time, so register,
//! unregister, snapshot and find-by-name never interleave. Handlers talk to
//! it through a cloneable `RegistryHandle`.

use std::net::SocketAddr;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::{AppError, RegisterError};
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Status line for one registered client, published after every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: String,
    pub addr: SocketAddr,
}

/// Registry state: registered clients in registration order
#[derive(Debug, Default)]
pub struct Registry {
    clients: Vec<Client>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check name uniqueness and insert in one step
    ///
    /// The confirmation is queued on the client's channel before the client
    /// becomes visible to snapshots, so it is always the first line it gets.
    pub fn try_register(&mut self, client: Client) -> Result<Client, RegisterError> {
        if self.clients.iter().any(|c| c.id == client.id) {
            return Err(RegisterError::AlreadyRegistered);
        }
        if self.clients.iter().any(|c| c.name == client.name) {
            return Err(RegisterError::DuplicateName(client.name));
        }

        let connected = ServerMessage::Connected {
            name: client.name.clone(),
        };
        if client.sender.try_send(connected).is_err() {
            debug!("Confirmation for {} not queued", client.name);
        }
        self.clients.push(client.clone());
        Ok(client)
    }

    /// Remove a client; `None` if it was never registered or already removed
    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        let index = self.clients.iter().position(|c| c.id == id)?;
        Some(self.clients.remove(index))
    }

    /// Point-in-time copy, oldest registration first
    pub fn snapshot(&self) -> Vec<Client> {
        self.clients.clone()
    }

    /// Exact, case-sensitive lookup
    pub fn find_by_name(&self, name: &str) -> Option<Client> {
        self.clients.iter().find(|c| c.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn roster_entries(&self) -> Vec<RosterEntry> {
        self.clients
            .iter()
            .map(|c| RosterEntry {
                name: c.name.clone(),
                addr: c.addr,
            })
            .collect()
    }
}

/// Requests handled by the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a client after its handshake
    Register {
        client: Client,
        reply: oneshot::Sender<Result<Client, RegisterError>>,
    },
    /// Remove a client during teardown
    Unregister {
        client_id: ClientId,
        reply: oneshot::Sender<Option<Client>>,
    },
    /// Copy of all registered clients
    Snapshot {
        reply: oneshot::Sender<Vec<Client>>,
    },
    /// Lookup by display name
    FindByName {
        name: String,
        reply: oneshot::Sender<Option<Client>>,
    },
}

/// The registry actor
///
/// Owns the `Registry` and publishes a status snapshot on every mutation.
pub struct RegistryActor {
    registry: Registry,
    receiver: mpsc::Receiver<RegistryCommand>,
    status: watch::Sender<Vec<RosterEntry>>,
}

impl RegistryActor {
    /// Create the actor and the handle used to reach it
    pub fn new(buffer: usize) -> (Self, RegistryHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        let (status_tx, status_rx) = watch::channel(Vec::new());

        let actor = Self {
            registry: Registry::new(),
            receiver: cmd_rx,
            status: status_tx,
        };
        let handle = RegistryHandle {
            sender: cmd_tx,
            status: status_rx,
        };
        (actor, handle)
    }

    /// Run the actor until every handle has been dropped
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Registry shutting down");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register { client, reply } => {
                let result = self.registry.try_register(client);
                if let Ok(client) = &result {
                    info!("{} ({}) registered as {}", client.id, client.addr, client.name);
                    self.publish_status();
                }
                let _ = reply.send(result);
            }
            RegistryCommand::Unregister { client_id, reply } => {
                let removed = self.registry.unregister(client_id);
                if let Some(client) = &removed {
                    info!("{} ({}) unregistered", client.name, client.addr);
                    self.publish_status();
                }
                let _ = reply.send(removed);
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            RegistryCommand::FindByName { name, reply } => {
                let _ = reply.send(self.registry.find_by_name(&name));
            }
        }
    }

    fn publish_status(&self) {
        debug!("Total clients: {}", self.registry.len());
        self.status.send_replace(self.registry.roster_entries());
    }
}

/// Cloneable front end to the registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    status: watch::Receiver<Vec<RosterEntry>>,
}

impl RegistryHandle {
    /// Spawn a registry actor on the current runtime
    pub fn spawn(buffer: usize) -> Self {
        let (actor, handle) = RegistryActor::new(buffer);
        tokio::spawn(actor.run());
        handle
    }

    /// Atomically check the name and register the client
    ///
    /// The outer error means the actor is gone; the inner one is the
    /// rejection.
    pub async fn try_register(
        &self,
        id: ClientId,
        name: String,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Result<Client, RegisterError>, AppError> {
        let client = Client::new(id, name, addr, sender);
        self.request(|reply| RegistryCommand::Register { client, reply })
            .await
    }

    /// Remove a client; idempotent
    pub async fn unregister(&self, client_id: ClientId) -> Result<Option<Client>, AppError> {
        self.request(|reply| RegistryCommand::Unregister { client_id, reply })
            .await
    }

    /// Consistent copy of all registered clients, oldest first
    pub async fn snapshot(&self) -> Result<Vec<Client>, AppError> {
        self.request(|reply| RegistryCommand::Snapshot { reply })
            .await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Client>, AppError> {
        let name = name.to_string();
        self.request(|reply| RegistryCommand::FindByName { name, reply })
            .await
    }

    /// Number of registered clients
    pub async fn len(&self) -> Result<usize, AppError> {
        Ok(self.snapshot().await?.len())
    }

    /// Subscribe to roster status updates (name and address per client)
    pub fn subscribe_status(&self) -> watch::Receiver<Vec<RosterEntry>> {
        self.status.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| AppError::RegistryClosed)?;
        reply_rx.await.map_err(|_| AppError::RegistryClosed)
    }
}
