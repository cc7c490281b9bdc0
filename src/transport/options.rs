//! Session configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use duplex_transport::SessionOptions;
//!
//! let options = SessionOptions::new()
//!     .with_delimiter(b'#')
//!     .with_max_size(65536)
//!     .with_request_timeout(Duration::from_secs(5))
//!     .with_server_side();
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::codec::{
    DEFAULT_DELIMITER, DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_SIZE, FrameConfig, FrameProfile,
};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default request timeout (30s).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on in-flight requests.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;

/// Default capacity of the write queue, in packets.
pub const DEFAULT_WRITE_QUEUE: usize = 64;

/// Default cap on concurrently running request handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ============================================================================
// SessionOptions
// ============================================================================

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Byte separating the length prefix from the frame body.
    pub delimiter: u8,

    /// Maximum frame body size in bytes.
    pub max_size: usize,

    /// Maximum reassembled packet size; defaults to the larger of 16 MiB
    /// and `max_size`.
    pub max_packet_size: Option<usize>,

    /// Serve inbound requests instead of only issuing them.
    pub server_side: bool,

    /// Timeout applied by `request` when none is given.
    pub request_timeout: Duration,

    /// Maximum requests awaiting a response.
    pub max_pending_requests: usize,

    /// Packets queued for writing before senders wait.
    pub write_queue: usize,

    /// Request handlers allowed to run at once before reading pauses.
    pub max_concurrent_handlers: usize,

    /// Events buffered per subscriber.
    pub event_capacity: usize,
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            max_size: DEFAULT_MAX_SIZE,
            max_packet_size: None,
            server_side: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
            write_queue: DEFAULT_WRITE_QUEUE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Creates server-side options.
    #[inline]
    #[must_use]
    pub const fn server() -> Self {
        Self::new().with_server_side()
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the delimiter byte.
    #[inline]
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the delimiter from a string, which must be exactly one byte.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty or multi-byte string.
    pub fn with_delimiter_str(self, delimiter: &str) -> Result<Self> {
        match delimiter.as_bytes() {
            [byte] => Ok(self.with_delimiter(*byte)),
            _ => Err(Error::config(format!(
                "delimiter must be a single byte, got {delimiter:?}"
            ))),
        }
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
        self.max_packet_size = Some(max_packet_size);
        self
    }

    /// Marks the session as server side.
    #[inline]
    #[must_use]
    pub const fn with_server_side(mut self) -> Self {
        self.server_side = true;
        self
    }

    /// Sets the default request timeout.
    #[inline]
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pending request cap.
    #[inline]
    #[must_use]
    pub const fn with_max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Sets the write queue capacity.
    #[inline]
    #[must_use]
    pub const fn with_write_queue(mut self, capacity: usize) -> Self {
        self.write_queue = capacity;
        self
    }

    /// Sets the concurrent handler cap.
    #[inline]
    #[must_use]
    pub const fn with_max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max;
        self
    }

    /// Sets the per-subscriber event buffer.
    #[inline]
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl SessionOptions {
    /// Returns the effective reassembled packet limit.
    #[inline]
    #[must_use]
    pub fn effective_max_packet_size(&self) -> usize {
        self.max_packet_size
            .unwrap_or_else(|| DEFAULT_MAX_PACKET_SIZE.max(self.max_size))
    }

    /// Builds the codec config for `profile`.
    #[must_use]
    pub fn frame_config(&self, profile: FrameProfile) -> FrameConfig {
        FrameConfig::new(profile)
            .with_delimiter(self.delimiter)
            .with_max_size(self.max_size)
            .with_max_packet_size(self.effective_max_packet_size())
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a digit delimiter, an unusable size
    /// limit, or a zero timeout, queue or cap.
    pub fn validate(&self) -> Result<()> {
        self.frame_config(FrameProfile::Binary).validate()?;

        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be greater than zero"));
        }
        if self.max_pending_requests == 0 {
            return Err(Error::config("max_pending_requests must be greater than zero"));
        }
        if self.write_queue == 0 {
            return Err(Error::config("write_queue must be greater than zero"));
        }
        if self.max_concurrent_handlers == 0 {
            return Err(Error::config("max_concurrent_handlers must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Returns `true` if the session serves inbound requests.
    #[inline]
    #[must_use]
    pub const fn is_server_side(&self) -> bool {
        self.server_side
    }
}

// ============================================================================
// Tests
// ============================================================================
