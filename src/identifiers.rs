//! Type-safe identifiers for packets and sessions.
//!
//! Newtype wrappers prevent mixing a correlation id with a session id.
//!
//! | Type | Wire form | Source |
//! |------|-----------|--------|
//! | [`PacketId`] | `u16` or string | [`PacketIdAllocator`](crate::transport::PacketIdAllocator) or caller |
//! | [`SessionId`] | never on the wire | process-wide counter |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// PacketId
// ============================================================================

/// Correlation key linking a request to its response.
///
/// Binary-framed sessions carry the id in a 2-byte field, so only
/// [`PacketId::Num`] can cross them. Text-framed sessions accept both forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacketId {
    /// Numeric id, fits the binary frame's correlation field.
    Num(u16),
    /// Opaque string id.
    Str(String),
}

impl PacketId {
    /// Generates a random string id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self::Str(Uuid::new_v4().to_string())
    }

    /// Returns the numeric value, if this is a numeric id.
    #[inline]
    #[must_use]
    pub fn as_num(&self) -> Option<u16> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<u16> for PacketId {
    #[inline]
    fn from(value: u16) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for PacketId {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PacketId {
    #[inline]
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Global counter for session ids.
static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifier of a [`TransportSession`](crate::transport::TransportSession).
///
/// Unique within the process; used for log correlation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(NonZeroU32);

impl SessionId {
    /// Returns the next session id.
    #[must_use]
    pub fn next() -> Self {
        loop {
            let raw = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = NonZeroU32::new(raw) {
                return Self(id);
            }
        }
    }

    /// Creates a session id from a raw value (must be > 0).
    #[inline]
    #[must_use]
    pub fn from_u32(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
