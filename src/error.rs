//! Error types for duplex transport sessions.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use duplex_transport::{Packet, Result};
//!
//! async fn example(session: &TransportSession) -> Result<()> {
//!     let response = session.request(Packet::request("/device/init")).await?;
//!     println!("{:?}", response.body);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Protocol`] |
//! | Framing (fatal) | [`Error::MalformedFrame`], [`Error::EntityTooLarge`] |
//! | Correlation | [`Error::AllocationExhausted`], [`Error::DuplicateId`], [`Error::TooManyPending`] |
//! | Serialization | [`Error::Serialization`], [`Error::Json`] |
//! | Request | [`Error::Request`], [`Error::RequestTimeout`] |
//! | Connection | [`Error::SessionClosed`], [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::PacketId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when session options or factory configuration are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Protocol usage error.
    ///
    /// Returned when a packet cannot be expressed in the session's wire
    /// profile (for example a string id on a binary-framed session).
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// Malformed frame on the wire.
    ///
    /// Fatal: the connection is assumed corrupted and the session is destroyed.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the framing violation.
        message: String,
    },

    /// Frame or packet exceeds the configured maximum size.
    ///
    /// Fatal on the read path. On the write path the packet is rejected
    /// before anything reaches the socket.
    #[error("Entity too large: {size} bytes exceeds limit of {max_size}")]
    EntityTooLarge {
        /// Declared or computed size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max_size: usize,
    },

    // ========================================================================
    // Correlation Errors
    // ========================================================================
    /// No correlation id available.
    ///
    /// Returned when every id in the allocator's range is outstanding.
    #[error("Packet id pool exhausted ({capacity} ids outstanding)")]
    AllocationExhausted {
        /// Number of ids in the pool.
        capacity: usize,
    },

    /// Correlation id already in flight.
    #[error("Packet id {id} is already in flight")]
    DuplicateId {
        /// The id that is already registered.
        id: PacketId,
    },

    /// Too many requests awaiting a response.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Requests currently pending.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    /// Packet body or metadata could not be (de)serialized.
    ///
    /// Isolated to the packet concerned; the connection survives.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The peer answered a request with an error.
    #[error("Request failed with status {status}: {status_text}")]
    Request {
        /// Status code carried by the response.
        status: u16,
        /// Status text carried by the response.
        status_text: String,
        /// Error detail carried by the response, if any.
        cause: Option<String>,
    },

    /// No response arrived before the request timeout.
    #[error("Request {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request id that timed out.
        id: PacketId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Session is closed or was destroyed while the operation was pending.
    #[error("Session closed")]
    SessionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates an entity too large error.
    #[inline]
    pub fn entity_too_large(size: usize, max_size: usize) -> Self {
        Self::EntityTooLarge { size, max_size }
    }

    /// Creates an allocation exhausted error.
    #[inline]
    pub fn allocation_exhausted(capacity: usize) -> Self {
        Self::AllocationExhausted { capacity }
    }

    /// Creates a duplicate id error.
    #[inline]
    pub fn duplicate_id(id: PacketId) -> Self {
        Self::DuplicateId { id }
    }

    /// Creates a too many pending requests error.
    #[inline]
    pub fn too_many_pending(pending: usize, max: usize) -> Self {
        Self::TooManyPending { pending, max }
    }

    /// Creates a serialization error.
    #[inline]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a request error from a response's status fields.
    #[inline]
    pub fn request(status: u16, status_text: impl Into<String>, cause: Option<String>) -> Self {
        Self::Request {
            status,
            status_text: status_text.into(),
            cause,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: PacketId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error tears down the session.
    ///
    /// Framing errors leave the byte stream in an unknown state, so the
    /// connection cannot be reused after one.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::EntityTooLarge { .. }
        )
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::SessionClosed | Self::Io(_))
    }

    /// Returns `true` if this is a serialization error.
    #[inline]
    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization { .. } | Self::Json(_))
    }

    /// Returns the response status for [`Error::Request`].
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
