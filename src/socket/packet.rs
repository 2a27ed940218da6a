//! Socket packet codec.
//!
//! # Format
//!
//! ```text
//! <type digit>[<ack id>][<namespace>,][<json payload>]
//! ```
//!
//! The namespace segment is present only for namespaces other than `/`.
//! The payload defaults to `{}`.
//!
//! | Type | Digit |
//! |------|-------|
//! | connect | 0 |
//! | disconnect | 1 |
//! | event | 2 |
//! | ack | 3 |
//! | error | 4 |
//! | binary_event | 5 |
//! | binary_ack | 6 |
//!
//! # Ack id position
//!
//! The encoder writes the ack id directly after the type digit. The decoder
//! also accepts an ack id directly after the namespace comma, which is where
//! conforming servers put it; when both are present the latter wins.
//!
//! A digit run only counts as an ack id when more payload follows it. After
//! the type digit that means anything but the end of text or the rest of a
//! number (`.`, `e`). After a namespace comma it must be `[` or `{`. In
//! every other case the digits are the payload, so `2/chat,5` carries the
//! number `5` and no ack id. A non-negative integer payload on the default
//! namespace with an ack id (`235`) cannot be told apart from a bare number
//! and decodes as the number.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::{self, Write as _};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// The namespace every client joins on open.
pub const DEFAULT_NAMESPACE: &str = "/";

// ============================================================================
// SocketPacketType
// ============================================================================

/// Socket packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketPacketType {
    /// Namespace connection request / confirmation.
    Connect,
    /// Namespace disconnection.
    Disconnect,
    /// Application event.
    Event,
    /// Acknowledgment reply.
    Ack,
    /// Namespace-level error.
    Error,
    /// Event with binary attachments (not supported).
    BinaryEvent,
    /// Ack with binary attachments (not supported).
    BinaryAck,
}

impl SocketPacketType {
    /// All packet types, ordered by wire code.
    pub const ALL: [Self; 7] = [
        Self::Connect,
        Self::Disconnect,
        Self::Event,
        Self::Ack,
        Self::Error,
        Self::BinaryEvent,
        Self::BinaryAck,
    ];

    /// Returns the wire digit.
    #[inline]
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Connect => '0',
            Self::Disconnect => '1',
            Self::Event => '2',
            Self::Ack => '3',
            Self::Error => '4',
            Self::BinaryEvent => '5',
            Self::BinaryAck => '6',
        }
    }

    /// Maps a wire digit back to a packet type.
    #[inline]
    #[must_use]
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            '0' => Some(Self::Connect),
            '1' => Some(Self::Disconnect),
            '2' => Some(Self::Event),
            '3' => Some(Self::Ack),
            '4' => Some(Self::Error),
            '5' => Some(Self::BinaryEvent),
            '6' => Some(Self::BinaryAck),
            _ => None,
        }
    }
}

impl fmt::Display for SocketPacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Event => "event",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::BinaryEvent => "binary_event",
            Self::BinaryAck => "binary_ack",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SocketPacket
// ============================================================================

/// An application-framing packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPacket {
    /// Packet type.
    pub packet_type: SocketPacketType,
    /// Namespace, always starting with `/`.
    pub namespace: String,
    /// JSON payload; never `null`.
    pub payload: Value,
    /// Acknowledgment id, if one is requested or answered.
    pub ack_id: Option<u64>,
}

impl SocketPacket {
    /// Creates a packet without an ack id.
    ///
    /// A `null` payload becomes `{}` and a namespace missing its leading
    /// `/` gets one.
    #[must_use]
    pub fn new(packet_type: SocketPacketType, namespace: impl Into<String>, payload: Value) -> Self {
        let mut namespace = namespace.into();
        if !namespace.starts_with('/') {
            namespace.insert(0, '/');
        }

        let payload = if payload.is_null() {
            Value::Object(Map::new())
        } else {
            payload
        };

        Self {
            packet_type,
            namespace,
            payload,
            ack_id: None,
        }
    }

    /// Sets the ack id.
    #[inline]
    #[must_use]
    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    /// Creates a `connect` packet for `namespace`.
    #[inline]
    #[must_use]
    pub fn connect(namespace: impl Into<String>) -> Self {
        Self::new(SocketPacketType::Connect, namespace, Value::Null)
    }

    /// Creates an `event` packet.
    #[inline]
    #[must_use]
    pub fn event(namespace: impl Into<String>, payload: Value) -> Self {
        Self::new(SocketPacketType::Event, namespace, payload)
    }

    /// Creates an `ack` packet answering `ack_id`.
    #[inline]
    #[must_use]
    pub fn ack(namespace: impl Into<String>, ack_id: u64, payload: Value) -> Self {
        Self::new(SocketPacketType::Ack, namespace, payload).with_ack_id(ack_id)
    }

    /// Returns `true` for the default namespace.
    #[inline]
    #[must_use]
    pub fn is_default_namespace(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
    }

    /// Encodes the packet for the wire.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut encoded = String::new();
        encoded.push(self.packet_type.code());

        if let Some(ack_id) = self.ack_id {
            let _ = write!(encoded, "{ack_id}");
        }

        if !self.is_default_namespace() {
            encoded.push_str(&self.namespace);
            encoded.push(',');
        }

        if self.payload.is_null() {
            encoded.push_str("{}");
        } else {
            let _ = write!(encoded, "{}", self.payload);
        }

        encoded
    }

    /// Decodes a packet from wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the type digit is missing or unknown, an
    /// ack id does not fit in a `u64`, or the payload is not valid JSON.
    pub fn decode(text: &str) -> Result<Self> {
        let code = text
            .chars()
            .next()
            .ok_or_else(|| Error::decode("empty socket packet", text))?;

        let packet_type = SocketPacketType::from_code(code).ok_or_else(|| {
            Error::decode(format!("unknown socket packet type '{code}'"), text)
        })?;

        // Type digits are ASCII, so every index below is a char boundary.
        let (mut ack_id, mut pos) = scan_ack_id(text, 1, precedes_payload)?;

        let mut namespace = DEFAULT_NAMESPACE;
        if text[pos..].starts_with('/') {
            let end = text[pos..].find(',').map_or(text.len(), |i| pos + i);
            namespace = &text[pos..end];
            pos = (end + 1).min(text.len());

            let (trailing, next) = scan_ack_id(text, pos, precedes_container)?;
            if let Some(trailing) = trailing {
                if let Some(leading) = ack_id {
                    debug!(leading, trailing, "Ack id after namespace supersedes leading digits");
                }
                ack_id = Some(trailing);
            }
            pos = next;
        }

        let rest = &text[pos..];
        let payload = if rest.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(rest)
                .map_err(|e| Error::decode(format!("invalid JSON payload: {e}"), text))?
        };

        let mut packet = Self::new(packet_type, namespace, payload);
        packet.ack_id = ack_id;
        Ok(packet)
    }
}

/// Reads a run of ASCII digits starting at `start` as an ack id.
///
/// `accepts` sees the byte after the run (`None` at end of text); when it
/// rejects, the digits are left in place for the payload. Returns the
/// parsed id and the index after it.
fn scan_ack_id(
    text: &str,
    start: usize,
    accepts: fn(Option<u8>) -> bool,
) -> Result<(Option<u64>, usize)> {
    let digits = text[start..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    let end = start + digits;
    if digits == 0 || !accepts(text.as_bytes().get(end).copied()) {
        return Ok((None, start));
    }

    let ack_id = text[start..end]
        .parse::<u64>()
        .map_err(|e| Error::decode(format!("invalid ack id: {e}"), text))?;

    Ok((Some(ack_id), end))
}

/// Follows a leading ack id: anything that cannot continue a JSON number.
fn precedes_payload(next: Option<u8>) -> bool {
    matches!(next, Some(byte) if !matches!(byte, b'.' | b'e' | b'E'))
}

/// Follows an ack id after a namespace comma.
fn precedes_container(next: Option<u8>) -> bool {
    matches!(next, Some(b'[' | b'{'))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_connect_default_namespace() {
        assert_eq!(SocketPacket::connect("/").encode(), "0{}");
    }

    #[test]
    fn test_encode_event_with_ack_and_namespace() {
        let packet = SocketPacket::event("/chat", json!(["foo"])).with_ack_id(42);
        assert_eq!(packet.encode(), "242/chat,[\"foo\"]");
    }

    #[test]
    fn test_encode_default_namespace_has_no_segment() {
        let packet = SocketPacket::event("/", json!(["foo", 1])).with_ack_id(7);
        assert_eq!(packet.encode(), "27[\"foo\",1]");
    }

    #[test]
    fn test_new_normalizes_namespace_and_null_payload() {
        let packet = SocketPacket::new(SocketPacketType::Disconnect, "admin", Value::Null);
        assert_eq!(packet.namespace, "/admin");
        assert_eq!(packet.payload, json!({}));
    }

    #[test]
    fn test_decode_connect_with_sid() {
        let packet = SocketPacket::decode("0{\"sid\":\"abc\"}").expect("decode");

        assert_eq!(packet.packet_type, SocketPacketType::Connect);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.payload, json!({"sid": "abc"}));
        assert_eq!(packet.ack_id, None);
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = SocketPacket::decode("21/chat,42[\"foo\"]").expect("decode");

        assert_eq!(packet.packet_type, SocketPacketType::Event);
        assert_eq!(packet.namespace, "/chat");
        assert_eq!(packet.ack_id, Some(42));
        assert_eq!(packet.payload, json!(["foo"]));
    }

    #[test]
    fn test_decode_leading_ack_id() {
        let packet = SocketPacket::decode("312[\"ok\"]").expect("decode");

        assert_eq!(packet.packet_type, SocketPacketType::Ack);
        assert_eq!(packet.ack_id, Some(12));
        assert_eq!(packet.payload, json!(["ok"]));
    }

    #[test]
    fn test_numeric_payload_after_namespace_is_not_an_ack_id() {
        let packet = SocketPacket::event("/chat", json!(5));
        assert_eq!(packet.encode(), "2/chat,5");

        let decoded = SocketPacket::decode(&packet.encode()).expect("decode");
        assert_eq!(decoded.payload, json!(5));
        assert_eq!(decoded.ack_id, None);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_numeric_payload_on_default_namespace() {
        let decoded = SocketPacket::decode("25").expect("decode");
        assert_eq!(decoded.payload, json!(5));
        assert_eq!(decoded.ack_id, None);

        let decoded = SocketPacket::decode("22.5").expect("decode");
        assert_eq!(decoded.payload, json!(2.5));
        assert_eq!(decoded.ack_id, None);
    }

    #[test]
    fn test_leading_ack_id_before_scalar_payload() {
        let packet = SocketPacket::event("/", json!("hi")).with_ack_id(3);
        assert_eq!(packet.encode(), "23\"hi\"");
        assert_eq!(SocketPacket::decode(&packet.encode()).expect("decode"), packet);

        let packet = SocketPacket::event("/chat", json!(-4)).with_ack_id(3);
        assert_eq!(SocketPacket::decode(&packet.encode()).expect("decode"), packet);
    }

    #[test]
    fn test_decode_ack_id_zero_is_present() {
        let packet = SocketPacket::decode("20[]").expect("decode");
        assert_eq!(packet.ack_id, Some(0));
    }

    #[test]
    fn test_decode_without_payload_defaults_to_empty_object() {
        let packet = SocketPacket::decode("1").expect("decode");

        assert_eq!(packet.packet_type, SocketPacketType::Disconnect);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.payload, json!({}));
    }

    #[test]
    fn test_decode_namespace_without_comma() {
        let packet = SocketPacket::decode("1/admin").expect("decode");

        assert_eq!(packet.namespace, "/admin");
        assert_eq!(packet.payload, json!({}));
    }

    #[test]
    fn test_decode_unknown_type_fails() {
        assert!(SocketPacket::decode("9[]").unwrap_err().is_decode_error());
        assert!(SocketPacket::decode("").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        assert!(SocketPacket::decode("2[\"unterminated").unwrap_err().is_decode_error());
    }

    #[test]
    fn test_decode_ack_id_overflow_fails() {
        let text = "299999999999999999999999[]";
        assert!(SocketPacket::decode(text).unwrap_err().is_decode_error());
    }

    fn arb_payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9 ]{0,6}".prop_map(Value::from),
        ];

        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    fn arb_packet() -> impl Strategy<Value = SocketPacket> {
        (
            0_usize..7,
            prop_oneof![Just("/".to_owned()), "/[a-z]{1,8}"],
            arb_payload(),
            proptest::option::of(0_u64..1_000_000),
        )
            .prop_map(|(index, namespace, payload, ack_id)| {
                let mut packet =
                    SocketPacket::new(SocketPacketType::ALL[index], namespace, payload);
                packet.ack_id = ack_id;
                packet
            })
            // `<type><ack><uint>` has no boundary between ack id and payload.
            .prop_filter("ack id fused with a bare number", |packet| {
                !(packet.ack_id.is_some()
                    && packet.is_default_namespace()
                    && packet.payload.is_u64())
            })
    }

    proptest! {
        #[test]
        fn prop_socket_packet_round_trip(packet in arb_packet()) {
            prop_assert_eq!(SocketPacket::decode(&packet.encode()).expect("decode"), packet);
        }

        #[test]
        fn prop_default_namespace_never_encoded(items in prop::collection::vec("[a-z]{0,6}", 0..4)) {
            let encoded = SocketPacket::event("/", json!(items)).encode();
            prop_assert!(!encoded.contains('/'));
            prop_assert_eq!(SocketPacket::decode(&encoded).expect("decode").namespace, "/");
        }
    }
}
