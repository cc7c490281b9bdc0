//! Frame writer.
//!
//! Turns one [`WirePacket`] into one or more length-prefixed frames.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::WirePacket;
use crate::protocol::headers::CONTENT_TRANSFER_ENCODING;

use super::{BASE64_TRANSFER_ENCODING, BINARY_PREFIX_LEN, FrameConfig, FrameProfile, TextDocument};

// ============================================================================
// Framer
// ============================================================================

/// Stateless frame writer.
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    /// Codec settings.
    config: FrameConfig,
}

impl Framer {
    /// Creates a framer for `config`.
    #[inline]
    #[must_use]
    pub const fn new(config: FrameConfig) -> Self {
        Self { config }
    }

    /// Returns the codec settings.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Encodes a packet into frames, in write order.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if a binary frame is asked to carry a string id
    /// - [`Error::EntityTooLarge`] if the packet cannot fit the size limits
    /// - [`Error::Serialization`] if a JSON payload is not valid JSON
    pub fn encode(&self, packet: &WirePacket) -> Result<Vec<Bytes>> {
        match self.config.profile {
            FrameProfile::Binary => self.encode_binary(packet),
            FrameProfile::Text => self.encode_text(packet).map(|frame| vec![frame]),
        }
    }

    /// Binary profile: header on the first chunk, payload split by budget.
    fn encode_binary(&self, packet: &WirePacket) -> Result<Vec<Bytes>> {
        let max_size = self.config.max_size;
        let payload_len = packet.payload.len();
        if payload_len > self.config.max_packet_size {
            return Err(Error::entity_too_large(
                payload_len,
                self.config.max_packet_size,
            ));
        }

        let id = match &packet.meta.id {
            None => 0,
            Some(id) => id.as_num().ok_or_else(|| {
                Error::protocol(format!("binary frames need a numeric id, got {id:?}"))
            })?,
        };

        // The id travels in the fixed header; content-length tells the
        // receiver how many continuation bytes to expect.
        let mut meta = packet.meta.clone();
        meta.id = None;
        meta.headers.set_content_length(payload_len);
        let header = serde_json::to_vec(&meta)?;

        let header_len = u16::try_from(header.len())
            .map_err(|_| Error::protocol(format!("header block of {} bytes", header.len())))?;
        let first_overhead = BINARY_PREFIX_LEN + header.len();
        if first_overhead > max_size {
            return Err(Error::entity_too_large(first_overhead, max_size));
        }

        let first_budget = max_size - first_overhead;
        let rest_budget = max_size - BINARY_PREFIX_LEN;
        let (first, mut rest) = packet.payload.split_at(first_budget.min(payload_len));

        let mut frames = Vec::with_capacity(1 + rest.len().div_ceil(rest_budget));
        frames.push(self.binary_frame(id, header_len, &header, first));
        while !rest.is_empty() {
            let (chunk, tail) = rest.split_at(rest_budget.min(rest.len()));
            frames.push(self.binary_frame(id, 0, &[], chunk));
            rest = tail;
        }
        Ok(frames)
    }

    fn binary_frame(&self, id: u16, header_len: u16, header: &[u8], chunk: &[u8]) -> Bytes {
        let body_len = BINARY_PREFIX_LEN + header.len() + chunk.len();
        let prefix = body_len.to_string();

        let mut frame = BytesMut::with_capacity(prefix.len() + 1 + body_len);
        frame.put_slice(prefix.as_bytes());
        frame.put_u8(self.config.delimiter);
        frame.put_u16(id);
        frame.put_u16(header_len);
        frame.put_slice(header);
        frame.put_slice(chunk);
        frame.freeze()
    }

    /// Text profile: one JSON document carrying envelope and payload.
    fn encode_text(&self, packet: &WirePacket) -> Result<Bytes> {
        let mut meta = packet.meta.clone();
        let encoded = meta.headers.content_encoding().is_some();
        let payload = if packet.payload.is_empty() {
            None
        } else if !encoded && meta.headers.is_json() {
            Some(
                serde_json::from_slice::<Value>(&packet.payload)
                    .map_err(|e| Error::serialization(format!("invalid JSON payload: {e}")))?,
            )
        } else if !encoded && let Ok(text) = std::str::from_utf8(&packet.payload) {
            Some(Value::String(text.to_string()))
        } else {
            meta.headers
                .set(CONTENT_TRANSFER_ENCODING, Some(BASE64_TRANSFER_ENCODING));
            Some(Value::String(BASE64.encode(&packet.payload)))
        };

        let document = serde_json::to_vec(&TextDocument { meta, payload })?;
        if document.len() > self.config.max_size {
            return Err(Error::entity_too_large(document.len(), self.config.max_size));
        }

        let prefix = document.len().to_string();
        let mut frame = BytesMut::with_capacity(prefix.len() + 1 + document.len());
        frame.put_slice(prefix.as_bytes());
        frame.put_u8(self.config.delimiter);
        frame.put_slice(&document);
        Ok(frame.freeze())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::PacketId;
    use crate::protocol::PacketMeta;

    fn wire(id: Option<PacketId>, content_type: &str, payload: &'static [u8]) -> WirePacket {
        let mut meta = PacketMeta {
            id,
            url: Some("/x".into()),
            ..PacketMeta::default()
        };
        meta.headers.set_content_type(content_type);
        WirePacket::new(meta, Bytes::from_static(payload))
    }

    fn split_prefix(frame: &[u8]) -> (usize, &[u8]) {
        let pos = frame.iter().position(|b| *b == b'#').expect("delimiter");
        let len = std::str::from_utf8(&frame[..pos])
            .expect("ascii")
            .parse()
            .expect("decimal");
        (len, &frame[pos + 1..])
    }

    #[test]
    fn test_binary_single_frame_layout() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Binary));
        let frames = framer
            .encode(&wire(Some(PacketId::Num(0x0102)), "text/plain", b"hi"))
            .expect("encode");
        assert_eq!(frames.len(), 1);

        let (len, body) = split_prefix(&frames[0]);
        assert_eq!(len, body.len());
        assert_eq!(&body[..2], &[0x01, 0x02]);

        let header_len = u16::from_be_bytes([body[2], body[3]]) as usize;
        let header: Value = serde_json::from_slice(&body[4..4 + header_len]).expect("json");
        assert_eq!(header["url"], json!("/x"));
        assert_eq!(header["headers"]["content-length"], json!(2));
        assert!(header.get("id").is_none());
        assert_eq!(&body[4 + header_len..], b"hi");
    }

    #[test]
    fn test_binary_rejects_string_id() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Binary));
        let err = framer
            .encode(&wire(Some(PacketId::from("abc")), "text/plain", b"x"))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_binary_splits_large_payload() {
        let config = FrameConfig::new(FrameProfile::Binary).with_max_size(128);
        let framer = Framer::new(config);
        let payload: &'static [u8] = &[7u8; 400];
        let frames = framer
            .encode(&wire(Some(PacketId::Num(5)), "application/octet-stream", payload))
            .expect("encode");
        assert!(frames.len() > 1);

        let mut collected = Vec::new();
        for (index, frame) in frames.iter().enumerate() {
            let (len, body) = split_prefix(frame);
            assert!(len <= 128);
            assert_eq!(u16::from_be_bytes([body[0], body[1]]), 5);
            let header_len = u16::from_be_bytes([body[2], body[3]]) as usize;
            if index == 0 {
                assert!(header_len > 0);
            } else {
                assert_eq!(header_len, 0);
            }
            collected.extend_from_slice(&body[4 + header_len..]);
        }
        assert_eq!(collected, payload);
    }

    #[test]
    fn test_binary_header_larger_than_frame_is_rejected() {
        let config = FrameConfig::new(FrameProfile::Binary).with_max_size(16);
        let framer = Framer::new(config);
        let err = framer
            .encode(&wire(Some(PacketId::Num(1)), "text/plain", b"x"))
            .unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { .. }));
    }

    #[test]
    fn test_text_embeds_json_payload() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Text));
        let frames = framer
            .encode(&wire(Some(PacketId::Num(1)), "application/json", br#"{"name":"x"}"#))
            .expect("encode");
        let (len, body) = split_prefix(&frames[0]);
        assert_eq!(len, body.len());

        let doc: Value = serde_json::from_slice(body).expect("json");
        assert_eq!(doc["id"], json!(1));
        assert_eq!(doc["payload"], json!({"name": "x"}));
    }

    #[test]
    fn test_text_base64_for_binary_payload() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Text));
        let frames = framer
            .encode(&wire(None, "application/octet-stream", &[0xff, 0x00, 0xfe]))
            .expect("encode");
        let (_, body) = split_prefix(&frames[0]);
        let doc: Value = serde_json::from_slice(body).expect("json");
        assert_eq!(doc["headers"]["content-transfer-encoding"], json!("base64"));
        assert_eq!(doc["payload"], json!("/wD+"));
    }

    #[test]
    fn test_text_encoded_payload_uses_base64() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Text));
        let mut packet = wire(None, "application/json", b"{}");
        packet.meta.headers.set_content_encoding("zstd");
        let frames = framer.encode(&packet).expect("encode");
        let (_, body) = split_prefix(&frames[0]);
        let doc: Value = serde_json::from_slice(body).expect("json");
        assert_eq!(doc["headers"]["content-transfer-encoding"], json!("base64"));
        assert_eq!(doc["payload"], json!("e30="));
    }

    #[test]
    fn test_text_invalid_json_payload() {
        let framer = Framer::new(FrameConfig::new(FrameProfile::Text));
        let err = framer
            .encode(&wire(None, "application/json", b"{not json"))
            .unwrap_err();
        assert!(err.is_serialization_error());
    }

    #[test]
    fn test_text_oversize_document_is_rejected() {
        let config = FrameConfig::new(FrameProfile::Text).with_max_size(32);
        let framer = Framer::new(config);
        let err = framer
            .encode(&wire(None, "text/plain", &[b'a'; 64]))
            .unwrap_err();
        assert!(matches!(err, Error::EntityTooLarge { .. }));
    }
}
