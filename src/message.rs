//! Text protocol definitions
//!
//! The wire is plain UTF-8 text. Clients send a name line, then chat text
//! or the `/salir` and `/msg` commands. Server lines are rendered through
//! `Display` and terminated with a newline by the connection writer.

use std::fmt;

/// Byte-order-mark artifact some clients prepend to their first write
const BOM: char = '\u{feff}';

/// Normalize raw client text into a single trimmed line
///
/// Removes byte-order marks, collapses every run of `\r`/`\n` into one
/// space and trims surrounding whitespace.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_break = false;

    for ch in raw.chars() {
        match ch {
            BOM => {}
            '\r' | '\n' => {
                if !in_break {
                    out.push(' ');
                    in_break = true;
                }
            }
            _ => {
                out.push(ch);
                in_break = false;
            }
        }
    }

    out.trim().to_string()
}

/// Decode raw bytes permissively and normalize them
///
/// Invalid UTF-8 sequences are replaced, never rejected.
pub fn decode_text(bytes: &[u8]) -> String {
    normalize_text(&String::from_utf8_lossy(bytes))
}

/// Client → Server message, parsed from normalized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `/salir`: leave the chat
    Quit,
    /// `/msg NAME text`: private message
    Private { to: String, text: String },
    /// `/msg` with a missing recipient or text
    MalformedPrivate,
    /// Anything else is broadcast
    Chat(String),
}

impl ClientCommand {
    /// Parse a normalized, non-empty message
    ///
    /// Command keywords are matched case-insensitively.
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("/salir") {
            return ClientCommand::Quit;
        }

        let is_private = text
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("/msg"));
        if !is_private {
            return ClientCommand::Chat(text.to_string());
        }

        // command, recipient, rest-of-message
        let Some((_, args)) = text.split_once(char::is_whitespace) else {
            return ClientCommand::MalformedPrivate;
        };
        let Some((to, rest)) = args.trim_start().split_once(char::is_whitespace) else {
            return ClientCommand::MalformedPrivate;
        };
        let rest = rest.trim_start();
        if to.is_empty() || rest.is_empty() {
            return ClientCommand::MalformedPrivate;
        }

        ClientCommand::Private {
            to: to.to_string(),
            text: rest.to_string(),
        }
    }
}

/// Server → Client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Handshake accepted
    Connected { name: String },
    /// Handshake rejected, name taken
    DuplicateName { name: String },
    /// Another client joined
    Joined { name: String },
    /// A client left
    Left { name: String },
    /// Current roster, oldest registration first
    Roster { names: Vec<String> },
    /// Public chat line
    Chat { from: String, text: String },
    /// Private message delivered to its recipient
    Private { from: String, text: String },
    /// Confirmation echoed to the private message's sender
    PrivateSent { to: String, text: String },
    /// `/msg` without recipient or text
    Usage,
    /// `/msg` to an unknown name
    RecipientNotFound { name: String },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Connected { name } => write!(f, ">>> Connected as {}", name),
            ServerMessage::DuplicateName { name } => {
                write!(f, ">>> The name '{}' is already in use.", name)
            }
            ServerMessage::Joined { name } => write!(f, ">>> {} joined the chat", name),
            ServerMessage::Left { name } => write!(f, ">>> {} left the chat", name),
            ServerMessage::Roster { names } => {
                write!(f, ">>> Usuarios conectados: {}", names.join(", "))
            }
            ServerMessage::Chat { from, text } => write!(f, "[{}] {}", from, text),
            ServerMessage::Private { from, text } => write!(f, "[Privado de {}] {}", from, text),
            ServerMessage::PrivateSent { to, text } => write!(f, "[Privado a {}] {}", to, text),
            ServerMessage::Usage => write!(f, ">>> Usage: /msg NAME message"),
            ServerMessage::RecipientNotFound { name } => {
                write!(f, ">>> User '{}' not found", name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_bom_and_breaks() {
        assert_eq!(normalize_text("\u{feff}Alice\r\n"), "Alice");
        assert_eq!(normalize_text("  hello\r\n\r\nworld \n"), "hello world");
        assert_eq!(normalize_text("a\nb\rc"), "a b c");
    }

    #[test]
    fn test_normalize_blank_is_empty() {
        assert_eq!(normalize_text("\u{feff}\r\n  \n"), "");
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let text = decode_text(b"hi \xff there\n");
        assert_eq!(text, "hi \u{fffd} there");
    }

    #[test]
    fn test_parse_quit_case_insensitive() {
        assert_eq!(ClientCommand::parse("/salir"), ClientCommand::Quit);
        assert_eq!(ClientCommand::parse("/SALIR"), ClientCommand::Quit);
        assert_eq!(
            ClientCommand::parse("/salir now"),
            ClientCommand::Chat("/salir now".into())
        );
    }

    #[test]
    fn test_parse_private_keeps_spaces_in_text() {
        assert_eq!(
            ClientCommand::parse("/msg Bob hi there"),
            ClientCommand::Private {
                to: "Bob".into(),
                text: "hi there".into()
            }
        );
        assert_eq!(
            ClientCommand::parse("/MSG   Bob   hi"),
            ClientCommand::Private {
                to: "Bob".into(),
                text: "hi".into()
            }
        );
    }

    #[test]
    fn test_parse_private_missing_arguments() {
        assert_eq!(ClientCommand::parse("/msg"), ClientCommand::MalformedPrivate);
        assert_eq!(ClientCommand::parse("/msg Bob"), ClientCommand::MalformedPrivate);
    }

    #[test]
    fn test_parse_plain_chat() {
        assert_eq!(
            ClientCommand::parse("hello"),
            ClientCommand::Chat("hello".into())
        );
    }

    #[test]
    fn test_server_message_rendering() {
        let roster = ServerMessage::Roster {
            names: vec!["Alice".into(), "Bob".into()],
        };
        assert_eq!(roster.to_string(), ">>> Usuarios conectados: Alice, Bob");

        let private = ServerMessage::Private {
            from: "Alice".into(),
            text: "hi".into(),
        };
        assert_eq!(private.to_string(), "[Privado de Alice] hi");

        let chat = ServerMessage::Chat {
            from: "Alice".into(),
            text: "hello".into(),
        };
        assert_eq!(chat.to_string(), "[Alice] hello");
    }
}
