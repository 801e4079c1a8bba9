//! Wire formats and constants shared by the trivia server and its clients.
//!
//! - [`discovery`]: the fixed 39-byte UDP "server offer" packet
//! - [`protocol`]: tagged `\0`-terminated text frames, join frames and
//!   answer tokens for the stream connection
//! - [`questions`]: the true/false question source

pub mod discovery;
pub mod error;
pub mod protocol;
pub mod questions;

pub use discovery::DiscoveryPacket;
pub use error::ProtocolError;
pub use protocol::{Message, MessageKind};
pub use questions::{Question, QuestionBank, QuestionSource};

/// First four bytes of every discovery packet
pub const MAGIC_COOKIE: u32 = 0xabcd_dcba;
/// Message type of a "server offer"
pub const OFFER_MESSAGE_TYPE: u8 = 0x2;
/// UDP port clients listen on for offers
pub const DISCOVERY_PORT: u16 = 13117;
pub const DISCOVERY_PACKET_LEN: usize = 39;
/// Size of the UTF-16LE server name field in bytes
pub const SERVER_NAME_FIELD_LEN: usize = 32;

/// Terminates the join frame
pub const NAME_TERMINATOR: u8 = b'\n';
/// Terminates every server frame
pub const FRAME_TERMINATOR: u8 = 0;
/// Longest frame a decoder buffers while waiting for its terminator
pub const MAX_FRAME_LEN: usize = 64 * 1024;
pub const MAX_NAME_LEN: usize = 1024;

pub const TRUE_TOKENS: [char; 3] = ['Y', 'T', '1'];
pub const FALSE_TOKENS: [char; 3] = ['N', 'F', '0'];

pub const DEFAULT_SERVER_NAME: &str = "NovaBeach";
