//! Error types for the chat relay
//!
//! Defines application-level errors, registration rejections and
//! outbound send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// These end a connection handler (or the process, for config errors).
/// Protocol-level problems such as an unknown recipient never show up here.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    /// The registry actor has stopped and no longer answers requests
    #[error("Registry closed")]
    RegistryClosed,
}

/// Reasons a registration attempt is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// Another registered client already uses this display name
    #[error("Name '{0}' is already in use")]
    DuplicateName(String),

    /// This connection already completed its handshake
    #[error("Connection already registered")]
    AlreadyRegistered,
}

/// Message send errors
///
/// Occurs when the connection's writer task has ended, i.e. the
/// underlying socket could no longer be written to.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
