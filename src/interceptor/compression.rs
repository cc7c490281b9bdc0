//! zstd payload compression.
//!
//! Encode side: payloads of at least [`MIN_COMPRESS_SIZE`] bytes are
//! compressed after the backend serialized them, and marked with
//! `content-encoding: zstd`. Compression is skipped when it would not save
//! space.
//!
//! Decode side: payloads marked `zstd` are decompressed before the backend
//! parses them. Other encodings pass through untouched.

// ============================================================================
// Imports
// ============================================================================

use std::io::Read;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::headers::CONTENT_ENCODING;
use crate::protocol::{Packet, WirePacket};

use super::{Interceptor, Next};

// ============================================================================
// Constants
// ============================================================================

/// Minimum payload size to attempt compression.
pub const MIN_COMPRESS_SIZE: usize = 64;

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Default cap on decompressed payload size (16 MiB).
pub const DEFAULT_MAX_DECOMPRESSED: usize = 16 * 1024 * 1024;

/// `content-encoding` token.
pub const ZSTD_ENCODING: &str = "zstd";

// ============================================================================
// CompressionInterceptor
// ============================================================================

/// Compresses outgoing and decompresses incoming payloads.
#[derive(Debug, Clone, Copy)]
pub struct CompressionInterceptor {
    /// zstd level.
    level: i32,
    /// Payloads smaller than this are sent as is.
    min_size: usize,
    /// Largest accepted decompressed payload.
    max_decompressed: usize,
}

impl CompressionInterceptor {
    /// Creates an interceptor with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            min_size: MIN_COMPRESS_SIZE,
            max_decompressed: DEFAULT_MAX_DECOMPRESSED,
        }
    }

    /// Sets the zstd level.
    #[inline]
    #[must_use]
    pub const fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Sets the compression threshold.
    #[inline]
    #[must_use]
    pub const fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Sets the decompressed size cap.
    #[inline]
    #[must_use]
    pub const fn with_max_decompressed(mut self, max_decompressed: usize) -> Self {
        self.max_decompressed = max_decompressed;
        self
    }

    /// Compresses `wire` in place if worthwhile.
    fn compress(&self, wire: &mut WirePacket) -> Result<()> {
        if wire.payload.len() < self.min_size || wire.meta.headers.content_encoding().is_some() {
            return Ok(());
        }

        let compressed = zstd::encode_all(&wire.payload[..], self.level)
            .map_err(|e| Error::serialization(format!("zstd compression failed: {e}")))?;
        if compressed.len() >= wire.payload.len() {
            return Ok(());
        }

        trace!(
            original = wire.payload.len(),
            compressed = compressed.len(),
            "Payload compressed"
        );
        wire.meta
            .headers
            .set_content_encoding(ZSTD_ENCODING)
            .set_content_length(compressed.len());
        wire.payload = Bytes::from(compressed);
        Ok(())
    }

    /// Decompresses `wire` in place if it is zstd-encoded.
    fn decompress(&self, wire: &mut WirePacket) -> Result<()> {
        let is_zstd = wire
            .meta
            .headers
            .content_encoding()
            .is_some_and(|enc| enc.eq_ignore_ascii_case(ZSTD_ENCODING));
        if !is_zstd {
            return Ok(());
        }

        let decoder = zstd::Decoder::new(&wire.payload[..])
            .map_err(|e| Error::serialization(format!("zstd decompression failed: {e}")))?;
        let mut output = Vec::new();
        decoder
            .take(self.max_decompressed as u64 + 1)
            .read_to_end(&mut output)
            .map_err(|e| Error::serialization(format!("zstd decompression failed: {e}")))?;
        if output.len() > self.max_decompressed {
            return Err(Error::entity_too_large(output.len(), self.max_decompressed));
        }

        wire.meta.headers.remove(CONTENT_ENCODING);
        wire.meta.headers.set_content_length(output.len());
        wire.payload = Bytes::from(output);
        Ok(())
    }
}

impl Default for CompressionInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interceptor<Packet, WirePacket> for CompressionInterceptor {
    fn name(&self) -> &'static str {
        "compression"
    }

    async fn intercept(&self, input: Packet, next: Next<Packet, WirePacket>) -> Result<WirePacket> {
        let mut wire = next.run(input).await?;
        self.compress(&mut wire)?;
        Ok(wire)
    }
}

#[async_trait]
impl Interceptor<WirePacket, Packet> for CompressionInterceptor {
    fn name(&self) -> &'static str {
        "compression"
    }

    async fn intercept(&self, mut input: WirePacket, next: Next<WirePacket, Packet>) -> Result<Packet> {
        self.decompress(&mut input)?;
        next.run(input).await
    }
}

// ============================================================================
// Tests
// ============================================================================
