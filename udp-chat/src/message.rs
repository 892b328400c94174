//! Wire-format definitions for chat protocol messages.
//!
//! Every datagram exchanged with the coordinator is one [`Message`].  This
//! module is responsible for:
//! - Defining the thirteen on-wire message shapes and their one-byte tags.
//! - Serialising a [`Message`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Message`], returning a
//!   [`CodecError`] for malformed or truncated input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.  Every message starts with a
//! one-byte tag.  Usernames carry a 2-byte length prefix, free text (chat
//! bodies, server notices) a 4-byte one.
//!
//! ```text
//!  tag  name                 body
//!  ---  -------------------  ------------------------------------------
//!   1   connect request      u16 len, username
//!   2   connect reply        u8 accepted, u16 session port (if accepted)
//!   3   user joined          u16 len, username
//!   4   ping                 -
//!   5   pong                 -
//!   6   disconnect reply     -
//!   7   disconnect request   -
//!   8   user left            u16 len, username
//!   9   user query           u16 len, name
//!  10   user reply           u8 found; if found: u16 len, username
//!  11   chat                 u32 len, body
//!  12   relayed chat         u16 len, username, u32 len, body
//!  13   server text          u32 len, text
//! ```
//!
//! Bytes after the last field of a shape are ignored on decode.

use std::fmt;

use thiserror::Error;

/// Largest datagram the protocol ever puts on the wire.
pub const MAX_DATAGRAM: usize = 1400;

/// Bytes a chat message spends before its body: tag(1) + body length(4).
pub const CHAT_HEADER_LEN: usize = 5;

/// Largest chat body (in encoded bytes) that still fits one datagram.
pub const MAX_CHAT_BODY: usize = MAX_DATAGRAM - CHAT_HEADER_LEN;

/// One-byte discriminator identifying a message's shape.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    ConnectRequest = 1,
    ConnectReply = 2,
    UserJoined = 3,
    Ping = 4,
    Pong = 5,
    DisconnectReply = 6,
    DisconnectRequest = 7,
    UserLeft = 8,
    UserQuery = 9,
    UserReply = 10,
    Chat = 11,
    RelayedChat = 12,
    ServerText = 13,
}

impl Tag {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Tag::ConnectRequest,
            2 => Tag::ConnectReply,
            3 => Tag::UserJoined,
            4 => Tag::Ping,
            5 => Tag::Pong,
            6 => Tag::DisconnectReply,
            7 => Tag::DisconnectRequest,
            8 => Tag::UserLeft,
            9 => Tag::UserQuery,
            10 => Tag::UserReply,
            11 => Tag::Chat,
            12 => Tag::RelayedChat,
            13 => Tag::ServerText,
            _ => return None,
        })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::ConnectRequest => "connect request",
            Tag::ConnectReply => "connect reply",
            Tag::UserJoined => "user joined",
            Tag::Ping => "ping",
            Tag::Pong => "pong",
            Tag::DisconnectReply => "disconnect reply",
            Tag::DisconnectRequest => "disconnect request",
            Tag::UserLeft => "user left",
            Tag::UserQuery => "user query",
            Tag::UserReply => "user reply",
            Tag::Chat => "chat",
            Tag::RelayedChat => "relayed chat",
            Tag::ServerText => "server text",
        };
        write!(f, "{name} ({})", self.to_u8())
    }
}

/// The coordinator's answer to a connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectReply {
    /// All further traffic goes to `session_port`.
    Accepted { session_port: u16 },
    Rejected,
}

/// The coordinator's answer to a user query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Found { user: String },
    NotFound,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    ConnectRequest { user: String },
    ConnectReply(ConnectReply),
    UserJoined { user: String },
    /// Heartbeat probe from the coordinator.
    Ping,
    /// Heartbeat answer; also the first datagram sent to a new session port.
    Pong,
    /// Confirms a disconnect, or tells the client it timed out.
    DisconnectReply,
    DisconnectRequest,
    UserLeft { user: String },
    UserQuery { name: String },
    UserReply(Presence),
    Chat { body: String },
    RelayedChat { user: String, body: String },
    ServerText { text: String },
}

impl Message {
    /// The tag this message carries on the wire.
    pub fn tag(&self) -> Tag {
        match self {
            Message::ConnectRequest { .. } => Tag::ConnectRequest,
            Message::ConnectReply(_) => Tag::ConnectReply,
            Message::UserJoined { .. } => Tag::UserJoined,
            Message::Ping => Tag::Ping,
            Message::Pong => Tag::Pong,
            Message::DisconnectReply => Tag::DisconnectReply,
            Message::DisconnectRequest => Tag::DisconnectRequest,
            Message::UserLeft { .. } => Tag::UserLeft,
            Message::UserQuery { .. } => Tag::UserQuery,
            Message::UserReply(_) => Tag::UserReply,
            Message::Chat { .. } => Tag::Chat,
            Message::RelayedChat { .. } => Tag::RelayedChat,
            Message::ServerText { .. } => Tag::ServerText,
        }
    }

    /// Serialise this message into a newly allocated byte vector.
    ///
    /// Fails only when a text field is too long for its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let tag = self.tag();
        let mut buf = vec![tag.to_u8()];

        match self {
            Message::ConnectRequest { user }
            | Message::UserJoined { user }
            | Message::UserLeft { user } => put_short_text(&mut buf, tag, user)?,
            Message::UserQuery { name } => put_short_text(&mut buf, tag, name)?,
            Message::ConnectReply(ConnectReply::Accepted { session_port }) => {
                buf.push(1);
                buf.extend_from_slice(&session_port.to_be_bytes());
            }
            Message::ConnectReply(ConnectReply::Rejected) => buf.push(0),
            Message::UserReply(Presence::Found { user }) => {
                buf.push(1);
                put_short_text(&mut buf, tag, user)?;
            }
            Message::UserReply(Presence::NotFound) => buf.push(0),
            Message::Chat { body } => put_long_text(&mut buf, tag, body)?,
            Message::RelayedChat { user, body } => {
                put_short_text(&mut buf, tag, user)?;
                put_long_text(&mut buf, tag, body)?;
            }
            Message::ServerText { text } => put_long_text(&mut buf, tag, text)?,
            Message::Ping
            | Message::Pong
            | Message::DisconnectReply
            | Message::DisconnectRequest => {}
        }

        Ok(buf)
    }

    /// Parse a [`Message`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is empty or starts with an unrecognised tag,
    /// - `buf` is shorter than the fixed fields of its shape,
    /// - a length prefix points past the end of `buf`, or
    /// - a text field is not valid UTF-8.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let (&first, _) = buf.split_first().ok_or(CodecError::Empty)?;
        let tag = Tag::from_u8(first).ok_or(CodecError::UnknownTag(first))?;
        let mut r = Reader { buf, pos: 1, tag };

        let msg = match tag {
            Tag::ConnectRequest => Message::ConnectRequest { user: r.short_text()? },
            Tag::ConnectReply => {
                if r.u8()? == 0 {
                    Message::ConnectReply(ConnectReply::Rejected)
                } else {
                    Message::ConnectReply(ConnectReply::Accepted { session_port: r.u16()? })
                }
            }
            Tag::UserJoined => Message::UserJoined { user: r.short_text()? },
            Tag::Ping => Message::Ping,
            Tag::Pong => Message::Pong,
            Tag::DisconnectReply => Message::DisconnectReply,
            Tag::DisconnectRequest => Message::DisconnectRequest,
            Tag::UserLeft => Message::UserLeft { user: r.short_text()? },
            Tag::UserQuery => Message::UserQuery { name: r.short_text()? },
            Tag::UserReply => {
                if r.u8()? == 0 {
                    Message::UserReply(Presence::NotFound)
                } else {
                    Message::UserReply(Presence::Found { user: r.short_text()? })
                }
            }
            Tag::Chat => Message::Chat { body: r.long_text()? },
            Tag::RelayedChat => {
                let user = r.short_text()?;
                let body = r.long_text()?;
                Message::RelayedChat { user, body }
            }
            Tag::ServerText => Message::ServerText { text: r.long_text()? },
        };

        Ok(msg)
    }
}

/// `true` when a chat body of this text still fits one datagram.
pub fn chat_body_fits(body: &str) -> bool {
    body.len() <= MAX_CHAT_BODY
}

/// Errors that can arise when encoding or parsing a message
/// (`MalformedMessage` in protocol terms).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    #[error("{tag} message is truncated")]
    Truncated { tag: Tag },
    #[error("{tag} message carries text that is not valid UTF-8")]
    InvalidText { tag: Tag },
    #[error("{tag} field of {len} bytes does not fit its length prefix")]
    FieldTooLong { tag: Tag, len: usize },
}

impl CodecError {
    /// The message kind being processed, when the tag byte was recognised.
    pub fn tag(&self) -> Option<Tag> {
        match self {
            CodecError::Empty | CodecError::UnknownTag(_) => None,
            CodecError::Truncated { tag }
            | CodecError::InvalidText { tag }
            | CodecError::FieldTooLong { tag, .. } => Some(*tag),
        }
    }
}

fn put_short_text(buf: &mut Vec<u8>, tag: Tag, text: &str) -> Result<(), CodecError> {
    let len = u16::try_from(text.len()).map_err(|_| CodecError::FieldTooLong {
        tag,
        len: text.len(),
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
    Ok(())
}

fn put_long_text(buf: &mut Vec<u8>, tag: Tag, text: &str) -> Result<(), CodecError> {
    let len = u32::try_from(text.len()).map_err(|_| CodecError::FieldTooLong {
        tag,
        len: text.len(),
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(text.as_bytes());
    Ok(())
}

/// Bounds-checked cursor over an inbound datagram.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    tag: Tag,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(CodecError::Truncated { tag: self.tag })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn text(&mut self, len: usize) -> Result<String, CodecError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidText { tag: self.tag })
    }

    fn short_text(&mut self) -> Result<String, CodecError> {
        let len = self.u16()?;
        self.text(usize::from(len))
    }

    fn long_text(&mut self) -> Result<String, CodecError> {
        let len = self.u32()?;
        let len = usize::try_from(len).map_err(|_| CodecError::Truncated { tag: self.tag })?;
        self.text(len)
    }
}
