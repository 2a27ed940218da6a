//! Engine packet codec.
//!
//! # Format
//!
//! ```text
//! <type digit><data>
//! ```
//!
//! | Type | Digit |
//! |------|-------|
//! | open | 0 |
//! | close | 1 |
//! | ping | 2 |
//! | pong | 3 |
//! | message | 4 |
//! | upgrade | 5 |
//! | noop | 6 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

// ============================================================================
// EnginePacketType
// ============================================================================

/// Engine packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePacketType {
    /// Sent by the server when the connection opens.
    Open,
    /// Request to close the connection.
    Close,
    /// Liveness probe; answered with [`Pong`](Self::Pong).
    Ping,
    /// Answer to [`Ping`](Self::Ping).
    Pong,
    /// Carries an upper-layer payload.
    Message,
    /// Transport upgrade (unused over WebSocket).
    Upgrade,
    /// No operation.
    Noop,
}

impl EnginePacketType {
    /// All packet types, ordered by wire code.
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::Close,
        Self::Ping,
        Self::Pong,
        Self::Message,
        Self::Upgrade,
        Self::Noop,
    ];

    /// Returns the wire digit.
    #[inline]
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Open => '0',
            Self::Close => '1',
            Self::Ping => '2',
            Self::Pong => '3',
            Self::Message => '4',
            Self::Upgrade => '5',
            Self::Noop => '6',
        }
    }

    /// Maps a wire digit back to a packet type.
    #[inline]
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            '0' => Some(Self::Open),
            '1' => Some(Self::Close),
            '2' => Some(Self::Ping),
            '3' => Some(Self::Pong),
            '4' => Some(Self::Message),
            '5' => Some(Self::Upgrade),
            '6' => Some(Self::Noop),
            _ => None,
        }
    }
}

impl fmt::Display for EnginePacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Message => "message",
            Self::Upgrade => "upgrade",
            Self::Noop => "noop",
        };
        f.write_str(name)
    }
}

// ============================================================================
// EnginePacket
// ============================================================================

/// A transport-framing packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePacket {
    /// Packet type.
    pub packet_type: EnginePacketType,
    /// Opaque payload; empty for control packets.
    pub data: String,
}

impl EnginePacket {
    /// Creates a packet with data.
    #[inline]
    #[must_use]
    pub fn new(packet_type: EnginePacketType, data: impl Into<String>) -> Self {
        Self {
            packet_type,
            data: data.into(),
        }
    }

    /// Creates a packet with no data.
    #[inline]
    #[must_use]
    pub fn control(packet_type: EnginePacketType) -> Self {
        Self::new(packet_type, String::new())
    }

    /// Creates a `message` packet.
    #[inline]
    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(EnginePacketType::Message, data)
    }

    /// Encodes the packet for the wire.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut encoded = String::with_capacity(1 + self.data.len());
        encoded.push(self.packet_type.code());
        encoded.push_str(&self.data);
        encoded
    }

    /// Decodes a packet from wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the text is empty or the type digit is
    /// unknown.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let code = chars
            .next()
            .ok_or_else(|| Error::decode("empty engine packet", text))?;

        let packet_type = EnginePacketType::from_code(code).ok_or_else(|| {
            Error::decode(format!("unknown engine packet type '{code}'"), text)
        })?;

        Ok(Self::new(packet_type, chars.as_str()))
    }
}

// ============================================================================
// EngineHandshake
// ============================================================================

/// Session parameters carried by the server's `open` packet.
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineHandshake {
    /// Engine session id.
    pub sid: String,
    /// Transports the server offers to upgrade to.
    pub upgrades: Vec<String>,
    /// Server ping interval in milliseconds.
    pub ping_interval: u64,
    /// Server ping timeout in milliseconds.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    pub max_payload: u64,
}

impl EngineHandshake {
    /// Parses the `open` packet data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the data is not a JSON object.
    pub fn parse(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_encode_message() {
        let packet = EnginePacket::message("2[\"hi\"]");
        assert_eq!(packet.encode(), "42[\"hi\"]");
    }

    #[test]
    fn test_encode_control_packet_has_no_data() {
        assert_eq!(EnginePacket::control(EnginePacketType::Pong).encode(), "3");
        assert_eq!(EnginePacket::control(EnginePacketType::Close).encode(), "1");
    }

    #[test]
    fn test_decode_ping() {
        let packet = EnginePacket::decode("2").expect("decode");
        assert_eq!(packet, EnginePacket::control(EnginePacketType::Ping));
    }

    #[test]
    fn test_decode_keeps_multibyte_data() {
        let packet = EnginePacket::decode("4héllo").expect("decode");
        assert_eq!(packet.packet_type, EnginePacketType::Message);
        assert_eq!(packet.data, "héllo");
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        let err = EnginePacket::decode("9abc").unwrap_err();
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(EnginePacket::decode("").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_codes_are_consistent() {
        for packet_type in EnginePacketType::ALL {
            assert_eq!(
                EnginePacketType::from_code(packet_type.code()),
                Some(packet_type)
            );
        }
    }

    #[test]
    fn test_handshake_parse() {
        let handshake = EngineHandshake::parse(
            r#"{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .expect("handshake");

        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.upgrades, vec!["websocket".to_owned()]);
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.ping_timeout, 20000);
        assert_eq!(handshake.max_payload, 1_000_000);
    }

    #[test]
    fn test_handshake_missing_fields_default() {
        let handshake = EngineHandshake::parse(r#"{"sid":"abc"}"#).expect("handshake");
        assert_eq!(handshake.sid, "abc");
        assert_eq!(handshake.ping_interval, 0);
    }

    proptest! {
        #[test]
        fn prop_engine_packet_round_trip(index in 0_usize..7, data in ".*") {
            let packet = EnginePacket::new(EnginePacketType::ALL[index], data);
            prop_assert_eq!(EnginePacket::decode(&packet.encode()).expect("decode"), packet);
        }
    }
}
