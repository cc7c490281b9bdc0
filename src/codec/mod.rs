//! Frame codec.
//!
//! Reversible mapping between [`WirePacket`](crate::protocol::WirePacket)s and
//! the bytes written to a duplex stream.
//!
//! # Wire Format
//!
//! Every frame starts with an ASCII-decimal length and a one-byte delimiter.
//! The length counts the bytes that follow the delimiter.
//!
//! ```text
//! Binary profile:
//! ┌────────┬───────┬──────────┬────────────┬──────────────┬─────────────┐
//! │ "1234" │ delim │ id (u16) │ hlen (u16) │ header JSON  │ payload     │
//! └────────┴───────┴──────────┴────────────┴──────────────┴─────────────┘
//!
//! Text profile:
//! ┌────────┬───────┬───────────────────────────────────────────────────┐
//! │ "1234" │ delim │ {"id":1,"url":"/x","headers":{..},"payload":..}  │
//! └────────┴───────┴───────────────────────────────────────────────────┘
//! ```
//!
//! Binary packets larger than one frame are split; continuation frames carry
//! the same id and a zero header length.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `framer` | Packet → frames |
//! | `deframer` | Byte stream → frame bodies |
//! | `assembler` | Frame bodies → packets |

// ============================================================================
// Submodules
// ============================================================================

/// Joins frame bodies into wire packets.
pub mod assembler;

/// Splits a byte stream into frame bodies.
pub mod deframer;

/// Writes wire packets as frames.
pub mod framer;

// ============================================================================
// Re-exports
// ============================================================================

pub use assembler::{Assembled, FrameAssembler};
pub use deframer::Deframer;
pub use framer::Framer;

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::PacketMeta;

// ============================================================================
// Constants
// ============================================================================

/// Default frame delimiter.
pub const DEFAULT_DELIMITER: u8 = b'#';

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_SIZE: usize = 1024 * 1024;

/// Default maximum size of a reassembled multi-frame packet (16 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

/// Bytes of fixed binary frame header (id + header length).
pub const BINARY_PREFIX_LEN: usize = 4;

/// `content-transfer-encoding` value for base64 payloads in text frames.
pub(crate) const BASE64_TRANSFER_ENCODING: &str = "base64";

// ============================================================================
// FrameProfile
// ============================================================================

/// Layout of the bytes after the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameProfile {
    /// Fixed binary header, JSON envelope, raw payload.
    Binary,
    /// One JSON document per packet.
    Text,
}

// ============================================================================
// FrameConfig
// ============================================================================

/// Limits and delimiter shared by framer, deframer and assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Wire layout.
    pub profile: FrameProfile,
    /// Byte separating the length prefix from the frame body.
    pub delimiter: u8,
    /// Maximum frame body size in bytes.
    pub max_size: usize,
    /// Maximum size of a packet reassembled from several frames.
    pub max_packet_size: usize,
}

impl FrameConfig {
    /// Creates a config with default limits.
    #[inline]
    #[must_use]
    pub const fn new(profile: FrameProfile) -> Self {
        Self {
            profile,
            delimiter: DEFAULT_DELIMITER,
            max_size: DEFAULT_MAX_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Sets the delimiter.
    #[inline]
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the maximum frame size.
    #[inline]
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the maximum reassembled packet size.
    #[inline]
    #[must_use]
    pub const fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    /// Validates the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the delimiter is an ASCII digit or the
    /// size limits cannot hold a minimal frame.
    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_ascii_digit() {
            return Err(Error::config(format!(
                "delimiter {:?} must not be an ASCII digit",
                self.delimiter as char
            )));
        }
        if self.max_size <= BINARY_PREFIX_LEN {
            return Err(Error::config(format!(
                "max_size must exceed {BINARY_PREFIX_LEN} bytes, got {}",
                self.max_size
            )));
        }
        if self.max_packet_size < self.max_size {
            return Err(Error::config(format!(
                "max_packet_size ({}) must be at least max_size ({})",
                self.max_packet_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::new(FrameProfile::Binary)
    }
}

// ============================================================================
// TextDocument
// ============================================================================

/// JSON document carried by a text-profile frame.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TextDocument {
    /// Packet envelope, flattened into the document.
    #[serde(flatten)]
    pub meta: PacketMeta,
    /// Payload, embedded as a JSON value. `None` when absent; a JSON `null`
    /// payload is `Some(Value::Null)`.
    #[serde(
        default,
        alias = "body",
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

/// Reads a field that is present, keeping an explicit `null`.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FrameConfig::default().validate().is_ok());
        assert_eq!(FrameConfig::default().delimiter, b'#');
    }

    #[test]
    fn test_digit_delimiter_is_rejected() {
        let config = FrameConfig::new(FrameProfile::Text).with_delimiter(b'7');
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_tiny_max_size_is_rejected() {
        let config = FrameConfig::new(FrameProfile::Binary).with_max_size(4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_packet_limit_below_frame_limit_is_rejected() {
        let config = FrameConfig::new(FrameProfile::Binary)
            .with_max_size(1024)
            .with_max_packet_size(512);
        assert!(config.validate().is_err());
    }
}
