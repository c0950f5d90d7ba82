//! Multi-client TCP Chat Relay Library
//!
//! Clients connect over plain TCP, send their display name as the first
//! line, then chat. Text is broadcast to everyone else; `/msg NAME text`
//! sends a private message and `/salir` leaves.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RegistryActor` owns the name → connection registry; every registry
//!   operation is a message, so name checks and inserts never interleave
//! - Each connection has a `handler` task running the
//!   `AwaitingName → Active → Disconnected` state machine, plus a writer task
//! - `Router` fans messages out from registry snapshots, outside the actor
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::{ChatRelay, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let relay = ChatRelay::new(listener, ServerConfig::default());
//!
//!     relay
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use crate::config::{Framing, ServerConfig};
pub use error::{AppError, RegisterError, SendError};
pub use handler::{handle_connection, ConnectionState};
pub use message::{ClientCommand, ServerMessage};
pub use registry::{Registry, RegistryActor, RegistryCommand, RegistryHandle, RosterEntry};
pub use router::{Router, UnicastOutcome};
pub use server::ChatRelay;
pub use types::ClientId;
