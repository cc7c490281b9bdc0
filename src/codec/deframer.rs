//! Length-prefixed deframer.
//!
//! A pull-based state machine that reconstructs frame bodies from a byte
//! stream regardless of how the stream was chunked:
//!
//! ```text
//!            delimiter found, length ≤ max_size
//! ┌───────────────┐ ─────────────────────────────► ┌──────────────┐
//! │AwaitingLength │                                │ AwaitingBody │
//! └───────────────┘ ◄───────────────────────────── └──────────────┘
//!                    `length` bytes buffered, frame sliced
//! ```
//!
//! Short reads stay buffered until the next [`Deframer::push`]. Coalesced
//! frames are sliced one by one by repeated [`Deframer::next_frame`] calls.
//! The delimiter is only searched for inside the length prefix.

// ============================================================================
// Imports
// ============================================================================

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::FrameConfig;

// ============================================================================
// Constants
// ============================================================================

/// Initial read buffer capacity.
const INITIAL_CAPACITY: usize = 4 * 1024;

// ============================================================================
// DeframerState
// ============================================================================

/// Position inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeframerState {
    /// Scanning for the delimiter ending the length prefix.
    AwaitingLength,
    /// Length parsed, waiting for `length` body bytes.
    AwaitingBody {
        /// Declared body length.
        length: usize,
    },
}

// ============================================================================
// Deframer
// ============================================================================

/// Incremental frame reader.
#[derive(Debug)]
pub struct Deframer {
    /// Delimiter ending the length prefix.
    delimiter: u8,
    /// Maximum declared length accepted.
    max_size: usize,
    /// Longest length prefix that can still be ≤ `max_size`.
    max_digits: usize,
    /// Unconsumed bytes.
    buffer: BytesMut,
    /// Current state.
    state: DeframerState,
}

impl Deframer {
    /// Creates a deframer for `config`.
    #[must_use]
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            delimiter: config.delimiter,
            max_size: config.max_size,
            max_digits: decimal_digits(config.max_size),
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: DeframerState::AwaitingLength,
        }
    }

    /// Appends a chunk read from the stream.
    #[inline]
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the read buffer for reading directly from a stream.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Returns the number of buffered, unconsumed bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if a frame is partially buffered.
    #[inline]
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        !self.buffer.is_empty() || self.state != DeframerState::AwaitingLength
    }

    /// Slices the next complete frame body out of the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedFrame`] if the length prefix is not decimal
    /// - [`Error::EntityTooLarge`] if the declared length exceeds `max_size`
    ///
    /// Both are fatal: the stream position is lost.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                DeframerState::AwaitingLength => {
                    let Some(length) = self.parse_length()? else {
                        return Ok(None);
                    };
                    self.state = DeframerState::AwaitingBody { length };
                }
                DeframerState::AwaitingBody { length } => {
                    if self.buffer.len() < length {
                        self.buffer.reserve(length - self.buffer.len());
                        return Ok(None);
                    }
                    let frame = self.buffer.split_to(length).freeze();
                    self.state = DeframerState::AwaitingLength;
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Drains every complete frame currently buffered.
    ///
    /// # Errors
    ///
    /// Same as [`Deframer::next_frame`].
    pub fn drain_frames(&mut self) -> Result<Vec<Bytes>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Parses the length prefix, consuming it and the delimiter.
    fn parse_length(&mut self) -> Result<Option<usize>> {
        let scan = self.buffer.len().min(self.max_digits + 1);
        let prefix = &self.buffer[..scan];

        let Some(end) = prefix.iter().position(|b| *b == self.delimiter) else {
            if let Some(bad) = prefix.iter().find(|b| !b.is_ascii_digit()) {
                return Err(Error::malformed_frame(format!(
                    "unexpected byte 0x{bad:02x} in length prefix"
                )));
            }
            if prefix.len() > self.max_digits {
                return Err(Error::entity_too_large(
                    saturating_decimal(prefix),
                    self.max_size,
                ));
            }
            return Ok(None);
        };

        let digits = &prefix[..end];
        if digits.is_empty() {
            return Err(Error::malformed_frame("empty length prefix"));
        }
        if let Some(bad) = digits.iter().find(|b| !b.is_ascii_digit()) {
            return Err(Error::malformed_frame(format!(
                "unexpected byte 0x{bad:02x} in length prefix"
            )));
        }

        let length = saturating_decimal(digits);
        if length > self.max_size {
            return Err(Error::entity_too_large(length, self.max_size));
        }

        self.buffer.advance(end + 1);
        Ok(Some(length))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Number of decimal digits needed to print `value`.
fn decimal_digits(value: usize) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}

/// Parses ASCII digits, saturating instead of overflowing.
fn saturating_decimal(digits: &[u8]) -> usize {
    digits.iter().fold(0usize, |acc, digit| {
        acc.saturating_mul(10)
            .saturating_add(usize::from(digit.saturating_sub(b'0')))
    })
}

// ============================================================================
// Tests
// ============================================================================
