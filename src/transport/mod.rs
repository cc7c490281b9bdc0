//! Session transport layer.
//!
//! Binds the codec and interceptor chains to a live duplex stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌──────────────────────┐
//! │  TransportSession    │       duplex stream      │  TransportSession    │
//! │  (client side)       │◄────────────────────────►│  (server side)       │
//! │                      │   tcp / ws / mqtt / ...  │                      │
//! │  request() ──► id 1  │                          │  RequestHandler      │
//! │  request() ──► id 2  │                          │    └► response id 1  │
//! └──────────────────────┘                          └──────────────────────┘
//! ```
//!
//! # Session Lifecycle
//!
//! 1. Connect a socket (external to this crate)
//! 2. `TransportSessionFactory::create` - start a session over it
//! 3. `send` / `request` - exchange packets; server side serves requests
//! 4. `destroy` or `close` - tear down and release the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `allocator` | Correlation id pool |
//! | `factory` | Session factory and builder |
//! | `options` | Session options |
//! | `protocol` | Protocol name table |
//! | `session` | Session and its I/O tasks |
//! | `ws` | WebSocket byte-stream adapter |

// ============================================================================
// Submodules
// ============================================================================

/// Correlation id pool.
pub mod allocator;

/// Session factory.
pub mod factory;

/// Session options.
pub mod options;

/// Protocol name table.
pub mod protocol;

/// Session and its I/O tasks.
pub mod session;

/// WebSocket byte-stream adapter.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

pub use allocator::PacketIdAllocator;
pub use factory::{TransportSessionFactory, TransportSessionFactoryBuilder};
pub use options::SessionOptions;
pub use protocol::Protocol;
pub use session::{RequestHandler, SessionEvent, SessionState, TransportSession};
pub use ws::WsStream;
