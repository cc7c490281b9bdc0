//! Frame assembler.
//!
//! Turns frame bodies produced by the [`Deframer`](super::Deframer) into
//! [`WirePacket`]s. For the binary profile it also joins a first chunk with
//! its continuation frames.
//!
//! Errors are split in two classes:
//!
//! - Fatal (`Err(..)`): the byte stream can no longer be trusted.
//! - Per packet ([`Assembled::Rejected`]): one packet's envelope or payload
//!   could not be read; the stream is still aligned on frame boundaries.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Buf, Bytes, BytesMut};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::PacketId;
use crate::protocol::headers::CONTENT_TRANSFER_ENCODING;
use crate::protocol::{PacketMeta, WirePacket};

use super::{BASE64_TRANSFER_ENCODING, BINARY_PREFIX_LEN, FrameConfig, FrameProfile, TextDocument};

// ============================================================================
// Assembled
// ============================================================================

/// Outcome of feeding one frame to the assembler.
#[derive(Debug)]
pub enum Assembled {
    /// A complete packet.
    Packet(WirePacket),
    /// A chunk of a multi-frame packet was stored.
    Partial,
    /// The frame was well delimited but its content is unreadable.
    Rejected {
        /// Id of the affected packet, when it could be read.
        id: Option<PacketId>,
        /// What went wrong.
        error: Error,
    },
}

// ============================================================================
// PartialPacket
// ============================================================================

/// A multi-frame packet being reassembled.
#[derive(Debug)]
struct PartialPacket {
    /// Envelope from the first chunk.
    meta: PacketMeta,
    /// Payload received so far.
    payload: BytesMut,
    /// Total payload length announced by the first chunk.
    expected: usize,
}

// ============================================================================
// FrameAssembler
// ============================================================================

/// Stateful frame-to-packet decoder.
#[derive(Debug)]
pub struct FrameAssembler {
    /// Codec settings.
    config: FrameConfig,
    /// Packets awaiting continuation frames, by numeric id.
    partials: FxHashMap<u16, PartialPacket>,
    /// Bytes held across all partial packets.
    partial_bytes: usize,
}

impl FrameAssembler {
    /// Creates an assembler for `config`.
    #[must_use]
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            partials: FxHashMap::default(),
            partial_bytes: 0,
        }
    }

    /// Returns the number of packets awaiting continuation frames.
    #[inline]
    #[must_use]
    pub fn pending_partials(&self) -> usize {
        self.partials.len()
    }

    /// Feeds one frame body.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedFrame`] for a truncated binary header, a
    ///   continuation without a first chunk, or a chunk overflowing its
    ///   announced length
    /// - [`Error::EntityTooLarge`] if reassembly would exceed
    ///   `max_packet_size`
    pub fn push(&mut self, frame: Bytes) -> Result<Assembled> {
        match self.config.profile {
            FrameProfile::Binary => self.push_binary(frame),
            FrameProfile::Text => Ok(Self::decode_text(&frame)),
        }
    }

    fn push_binary(&mut self, mut frame: Bytes) -> Result<Assembled> {
        if frame.len() < BINARY_PREFIX_LEN {
            return Err(Error::malformed_frame(format!(
                "binary frame of {} bytes is shorter than its fixed header",
                frame.len()
            )));
        }
        let raw_id = frame.get_u16();
        let header_len = usize::from(frame.get_u16());
        if frame.len() < header_len {
            return Err(Error::malformed_frame(format!(
                "header length {header_len} exceeds frame body of {} bytes",
                frame.len()
            )));
        }

        if header_len == 0 {
            return self.push_continuation(raw_id, frame);
        }

        let id = (raw_id != 0).then_some(PacketId::Num(raw_id));
        let header = frame.split_to(header_len);
        let mut meta = match serde_json::from_slice::<PacketMeta>(&header) {
            Ok(meta) => meta,
            Err(e) => {
                return Ok(Assembled::Rejected {
                    id,
                    error: Error::serialization(format!("invalid packet header: {e}")),
                });
            }
        };
        meta.id = id;

        let expected = match meta.headers.content_length() {
            Some(len) => usize::try_from(len).unwrap_or(usize::MAX),
            None => frame.len(),
        };
        if expected > self.config.max_packet_size {
            return Err(Error::entity_too_large(expected, self.config.max_packet_size));
        }
        if frame.len() > expected {
            return Err(Error::malformed_frame(format!(
                "chunk of {} bytes overflows content-length {expected}",
                frame.len()
            )));
        }
        if frame.len() == expected {
            return Ok(Assembled::Packet(WirePacket::new(meta, frame)));
        }

        if raw_id == 0 {
            return Err(Error::malformed_frame(
                "multi-frame packet without a correlation id",
            ));
        }
        if self.partials.contains_key(&raw_id) {
            return Err(Error::malformed_frame(format!(
                "packet {raw_id} restarted before completion"
            )));
        }

        trace!(id = raw_id, expected, received = frame.len(), "Partial packet started");
        self.partial_bytes += frame.len();
        self.check_partial_budget()?;
        let mut payload = BytesMut::with_capacity(frame.len());
        payload.extend_from_slice(&frame);
        self.partials.insert(
            raw_id,
            PartialPacket {
                meta,
                payload,
                expected,
            },
        );
        Ok(Assembled::Partial)
    }

    fn push_continuation(&mut self, raw_id: u16, chunk: Bytes) -> Result<Assembled> {
        let Some(partial) = self.partials.get_mut(&raw_id) else {
            return Err(Error::malformed_frame(format!(
                "continuation frame for unknown packet {raw_id}"
            )));
        };

        let expected = partial.expected;
        let received = partial.payload.len() + chunk.len();
        if received > expected {
            return Err(Error::malformed_frame(format!(
                "packet {raw_id} overflows content-length {expected}"
            )));
        }
        partial.payload.extend_from_slice(&chunk);
        self.partial_bytes += chunk.len();
        self.check_partial_budget()?;

        if received < expected {
            return Ok(Assembled::Partial);
        }

        let Some(done) = self.partials.remove(&raw_id) else {
            return Ok(Assembled::Partial);
        };
        self.partial_bytes -= done.payload.len();
        trace!(id = raw_id, len = received, "Partial packet completed");
        Ok(Assembled::Packet(WirePacket::new(done.meta, done.payload.freeze())))
    }

    fn check_partial_budget(&self) -> Result<()> {
        if self.partial_bytes > self.config.max_packet_size {
            return Err(Error::entity_too_large(
                self.partial_bytes,
                self.config.max_packet_size,
            ));
        }
        Ok(())
    }

    /// Text profile: one JSON document per frame.
    fn decode_text(frame: &[u8]) -> Assembled {
        let document = match serde_json::from_slice::<TextDocument>(frame) {
            Ok(document) => document,
            Err(e) => {
                return Assembled::Rejected {
                    id: peek_id(frame),
                    error: Error::serialization(format!("invalid text frame: {e}")),
                };
            }
        };

        let TextDocument { mut meta, payload } = document;
        let id = meta.id.clone();
        let payload = match payload {
            None => Bytes::new(),
            Some(Value::Null)
                if meta.headers.content_type().is_some() && !meta.headers.is_json() =>
            {
                Bytes::new()
            }
            Some(Value::String(text)) => {
                let is_base64 = meta
                    .headers
                    .get_str(CONTENT_TRANSFER_ENCODING)
                    .is_some_and(|enc| enc.eq_ignore_ascii_case(BASE64_TRANSFER_ENCODING));
                if is_base64 {
                    meta.headers.remove(CONTENT_TRANSFER_ENCODING);
                    match BASE64.decode(text.as_bytes()) {
                        Ok(bytes) => Bytes::from(bytes),
                        Err(e) => {
                            return Assembled::Rejected {
                                id,
                                error: Error::serialization(format!("invalid base64 payload: {e}")),
                            };
                        }
                    }
                } else if meta.headers.is_json() {
                    match serde_json::to_vec(&Value::String(text)) {
                        Ok(bytes) => Bytes::from(bytes),
                        Err(e) => return Assembled::Rejected { id, error: e.into() },
                    }
                } else {
                    Bytes::from(text.into_bytes())
                }
            }
            Some(value) => {
                if !meta.headers.is_json() && meta.headers.content_type().is_none() {
                    meta.headers.set_content_type("application/json");
                }
                match serde_json::to_vec(&value) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => return Assembled::Rejected { id, error: e.into() },
                }
            }
        };
        Assembled::Packet(WirePacket::new(meta, payload))
    }
}

/// Best-effort id extraction from an unparseable document.
fn peek_id(frame: &[u8]) -> Option<PacketId> {
    let value: Value = serde_json::from_slice(frame).ok()?;
    serde_json::from_value(value.get("id")?.clone()).ok()
}

// ============================================================================
// Tests
// ============================================================================
