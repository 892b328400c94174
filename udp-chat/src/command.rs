//! Parsing of operator input lines.
//!
//! A line starting with `/` is a command; anything else is a chat message.

use thiserror::Error;

use crate::message::{chat_body_fits, MAX_CHAT_BODY};
use crate::username::is_valid_username;

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    /// `/search <name>`
    Search(String),
    /// `/disconnect`
    Disconnect,
}

/// Input refused locally; never reaches the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Message is too big ({len} bytes, at most {max} allowed).", max = MAX_CHAT_BODY)]
    TooLong { len: usize },
    #[error("Invalid username was entered.")]
    InvalidName,
    #[error("Usage: /search <name>")]
    SearchUsage,
    #[error("Unknown command {0}. Commands are /search <name> and /disconnect.")]
    UnknownCommand(String),
}

/// Parse one input line.  Returns `None` for an empty line.
pub fn parse_line(line: &str) -> Option<Result<Command, InputError>> {
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(chat(line));
    };

    let mut words = rest.split_whitespace();
    let cmd = match (words.next(), words.next(), words.next()) {
        (Some("disconnect"), None, _) => Ok(Command::Disconnect),
        (Some("search"), Some(name), None) if is_valid_username(name) => {
            Ok(Command::Search(name.to_string()))
        }
        (Some("search"), Some(_), None) => Err(InputError::InvalidName),
        (Some("search"), ..) => Err(InputError::SearchUsage),
        _ => Err(InputError::UnknownCommand(line.to_string())),
    };
    Some(cmd)
}

fn chat(line: &str) -> Result<Command, InputError> {
    if chat_body_fits(line) {
        Ok(Command::Chat(line.to_string()))
    } else {
        Err(InputError::TooLong { len: line.len() })
    }
}
