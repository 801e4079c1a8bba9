//! Framed text protocol spoken over the stream connection
//!
//! Client → server:
//! - a join frame `<name>\n`, sent once right after connecting
//! - single-byte answer tokens
//!
//! Server → client: `<tag><payload>\0` frames. Several frames may arrive in a
//! single read, or one frame may be split across reads, so clients feed raw
//! bytes into a [`FrameDecoder`] and pull complete [`Message`]s out of it.

use crate::error::ProtocolError;
use crate::{
    FALSE_TOKENS, FRAME_TERMINATOR, MAX_FRAME_LEN, MAX_NAME_LEN, NAME_TERMINATOR, TRUE_TOKENS,
};

/// The closed set of server frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Welcome,
    Error,
    Question,
    General,
    GameOver,
}

impl MessageKind {
    /// Wire tag written before the payload
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Welcome => "[W]",
            MessageKind::Error => "[E]",
            MessageKind::Question => "[Q]",
            MessageKind::General => "[G]",
            MessageKind::GameOver => "[GO]",
        }
    }

    // "[GO]" must be tried before "[G]"
    const MATCH_ORDER: [MessageKind; 5] = [
        MessageKind::GameOver,
        MessageKind::Welcome,
        MessageKind::Error,
        MessageKind::Question,
        MessageKind::General,
    ];
}

/// A single tagged server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: String,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn welcome(payload: impl Into<String>) -> Self {
        Self::new(MessageKind::Welcome, payload)
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, payload)
    }

    pub fn question(payload: impl Into<String>) -> Self {
        Self::new(MessageKind::Question, payload)
    }

    pub fn general(payload: impl Into<String>) -> Self {
        Self::new(MessageKind::General, payload)
    }

    pub fn game_over(payload: impl Into<String>) -> Self {
        Self::new(MessageKind::GameOver, payload)
    }

    /// Encodes the frame including its `\0` terminator.
    ///
    /// A terminator byte inside the payload would split the frame, so any are
    /// stripped.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.kind.tag();
        let mut frame = Vec::with_capacity(tag.len() + self.payload.len() + 1);
        frame.extend_from_slice(tag.as_bytes());
        frame.extend(
            self.payload
                .bytes()
                .filter(|byte| *byte != FRAME_TERMINATOR),
        );
        frame.push(FRAME_TERMINATOR);
        frame
    }

    /// Decodes one frame body (terminator already removed).
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidUtf8)?;

        MessageKind::MATCH_ORDER
            .iter()
            .find_map(|kind| {
                text.strip_prefix(kind.tag())
                    .map(|payload| Message::new(*kind, payload))
            })
            .ok_or_else(|| ProtocolError::UnknownMessageTag(text.chars().take(16).collect()))
    }
}

/// Reassembles `\0`-terminated frames from an arbitrary chunking of bytes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Returns the next complete frame, or `None` until more bytes arrive.
    ///
    /// Empty frames (two terminators in a row) are skipped. Once more than
    /// [`MAX_FRAME_LEN`] bytes are buffered without a terminator they are
    /// discarded and `FrameTooLong` is returned.
    pub fn next_message(&mut self) -> Option<Result<Message, ProtocolError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|b| *b == FRAME_TERMINATOR) else {
                if self.buffer.len() > MAX_FRAME_LEN {
                    self.buffer.clear();
                    return Some(Err(ProtocolError::FrameTooLong(MAX_FRAME_LEN)));
                }
                return None;
            };
            let frame: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
            if frame.is_empty() {
                continue;
            }
            return Some(Message::decode(&frame));
        }
    }

    /// Bytes received that are not yet part of a complete frame
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Encodes the join frame a client sends right after connecting.
pub fn encode_join(name: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(name.len() + 1);
    frame.extend(name.bytes().filter(|b| *b != NAME_TERMINATOR));
    frame.push(NAME_TERMINATOR);
    frame
}

/// Extracts the player name from a join frame.
///
/// Anything after the first newline is ignored and surrounding whitespace is
/// trimmed.
pub fn parse_join(frame: &[u8]) -> Result<String, ProtocolError> {
    let line = match frame.iter().position(|b| *b == NAME_TERMINATOR) {
        Some(end) => &frame[..end],
        None => frame,
    };

    if line.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong(MAX_NAME_LEN));
    }

    let name = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .trim();

    if name.is_empty() {
        return Err(ProtocolError::EmptyName);
    }

    Ok(name.to_string())
}

/// Maps an answer byte onto true/false.
pub fn parse_answer(token: u8) -> Result<bool, ProtocolError> {
    let token = token as char;
    if TRUE_TOKENS.contains(&token) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token) {
        Ok(false)
    } else {
        Err(ProtocolError::InvalidAnswerToken(token))
    }
}

/// Canonical token for an answer
pub fn answer_token(answer: bool) -> u8 {
    if answer {
        TRUE_TOKENS[1] as u8
    } else {
        FALSE_TOKENS[1] as u8
    }
}
