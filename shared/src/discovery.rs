//! Discovery packet codec
//!
//! Servers advertise themselves on the LAN with a fixed 39-byte UDP packet:
//!
//! ```text
//! [4B magic cookie][1B message type][32B server name, UTF-16LE, NUL padded][2B port]
//! ```
//!
//! All integers are big-endian. The name field is truncated on a character
//! boundary so a surrogate pair is never split.

use crate::error::ProtocolError;
use crate::{DISCOVERY_PACKET_LEN, MAGIC_COOKIE, OFFER_MESSAGE_TYPE, SERVER_NAME_FIELD_LEN};

const NAME_OFFSET: usize = 5;
const PORT_OFFSET: usize = NAME_OFFSET + SERVER_NAME_FIELD_LEN;

/// A "server offer": who is hosting and which stream port to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPacket {
    pub server_name: String,
    pub port: u16,
}

impl DiscoveryPacket {
    pub fn new(server_name: impl Into<String>, port: u16) -> Self {
        Self {
            server_name: server_name.into(),
            port,
        }
    }

    /// Encodes the offer into its fixed wire layout.
    pub fn encode(&self) -> [u8; DISCOVERY_PACKET_LEN] {
        let mut packet = [0u8; DISCOVERY_PACKET_LEN];
        packet[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        packet[4] = OFFER_MESSAGE_TYPE;

        let mut cursor = NAME_OFFSET;
        let mut units = [0u16; 2];
        for ch in self.server_name.chars() {
            let encoded = ch.encode_utf16(&mut units);
            if cursor + encoded.len() * 2 > PORT_OFFSET {
                break;
            }
            for unit in encoded.iter() {
                packet[cursor..cursor + 2].copy_from_slice(&unit.to_le_bytes());
                cursor += 2;
            }
        }

        packet[PORT_OFFSET..].copy_from_slice(&self.port.to_be_bytes());
        packet
    }

    /// Decodes and validates a received datagram.
    ///
    /// Rejects anything that is not exactly 39 bytes or that carries the
    /// wrong magic cookie or message type.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() != DISCOVERY_PACKET_LEN {
            return Err(ProtocolError::MalformedDiscoveryPacket(format!(
                "expected {} bytes, got {}",
                DISCOVERY_PACKET_LEN,
                data.len()
            )));
        }

        let cookie = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if cookie != MAGIC_COOKIE {
            return Err(ProtocolError::MalformedDiscoveryPacket(format!(
                "bad magic cookie {:#010x}",
                cookie
            )));
        }

        if data[4] != OFFER_MESSAGE_TYPE {
            return Err(ProtocolError::MalformedDiscoveryPacket(format!(
                "unexpected message type {:#04x}",
                data[4]
            )));
        }

        let mut units: Vec<u16> = data[NAME_OFFSET..PORT_OFFSET]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        while units.last() == Some(&0) {
            units.pop();
        }
        let server_name = String::from_utf16_lossy(&units);

        let port = u16::from_be_bytes([data[PORT_OFFSET], data[PORT_OFFSET + 1]]);

        Ok(Self { server_name, port })
    }
}
