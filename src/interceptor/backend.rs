//! Terminal chain backends.
//!
//! [`PacketEncoder`] serializes a packet's body and stamps `content-type`
//! and `content-length`. [`PacketDecoder`] reverses it, choosing the body
//! representation from `content-type`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::{Body, Packet, WirePacket};

use super::Handler;

// ============================================================================
// Constants
// ============================================================================

/// Content type stamped on JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type stamped on text bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type stamped on byte bodies.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// PacketEncoder
// ============================================================================

/// Serializes packet bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketEncoder;

impl PacketEncoder {
    /// Encodes a packet synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if a JSON body cannot be serialized.
    pub fn encode(packet: Packet) -> Result<WirePacket> {
        let (mut meta, body) = packet.into_parts();
        let headers = &mut meta.headers;

        let payload = match body {
            Body::Empty => Bytes::new(),
            Body::Bytes(bytes) => {
                if headers.content_type().is_none() {
                    headers.set_content_type(BINARY_CONTENT_TYPE);
                }
                bytes
            }
            Body::Text(text) => {
                if headers.content_type().is_none() {
                    headers.set_content_type(TEXT_CONTENT_TYPE);
                }
                Bytes::from(text.into_bytes())
            }
            Body::Json(value) => {
                if headers.content_type().is_none() {
                    headers.set_content_type(JSON_CONTENT_TYPE);
                }
                Bytes::from(serde_json::to_vec(&value)?)
            }
        };

        headers.set_content_length(payload.len());
        Ok(WirePacket::new(meta, payload))
    }
}

#[async_trait]
impl Handler<Packet, WirePacket> for PacketEncoder {
    async fn handle(&self, input: Packet) -> Result<WirePacket> {
        Self::encode(input)
    }
}

// ============================================================================
// PacketDecoder
// ============================================================================

/// Rebuilds packet bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder;

impl PacketDecoder {
    /// Decodes a wire packet synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if a JSON payload does not parse or a
    /// text payload is not UTF-8.
    pub fn decode(wire: WirePacket) -> Result<Packet> {
        let WirePacket { meta, payload } = wire;

        let body = if payload.is_empty() {
            Body::Empty
        } else if meta.headers.is_json() {
            let value = serde_json::from_slice(&payload)
                .map_err(|e| Error::serialization(format!("invalid JSON payload: {e}")))?;
            Body::Json(value)
        } else if meta.headers.is_text() {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|e| Error::serialization(format!("invalid UTF-8 payload: {e}")))?;
            Body::Text(text)
        } else {
            Body::Bytes(payload)
        };

        Ok(Packet::from_parts(meta, body))
    }
}

#[async_trait]
impl Handler<WirePacket, Packet> for PacketDecoder {
    async fn handle(&self, input: WirePacket) -> Result<Packet> {
        Self::decode(input)
    }
}

// ============================================================================
// Tests
// ============================================================================
