//! Duplex Transport - packet sessions over duplex byte streams.
//!
//! This library turns any `AsyncRead + AsyncWrite` stream (TCP socket,
//! WebSocket, in-memory pipe) into a packet session that multiplexes
//! concurrent requests by correlation id.
//!
//! # Architecture
//!
//! ```text
//! Packet ──► encode chain ──► Framer ──► socket
//!                                           │
//! Packet ◄── decode chain ◄── Deframer ◄────┘
//!              (FrameAssembler joins split packets)
//! ```
//!
//! Key design principles:
//!
//! - Each [`TransportSession`] owns one stream plus a reader and a writer task
//! - Frames are length-prefixed: `<decimal length><delimiter><body>`
//! - Responses are matched to requests by id, in any order
//! - Interceptor chains are composed once and shared by every session a
//!   [`TransportSessionFactory`] creates
//!
//! # Quick Start
//!
//! ```no_run
//! use duplex_transport::{Packet, Result, SessionOptions, TransportSessionFactory};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let factory = TransportSessionFactory::new();
//!
//!     let socket = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//!     let session = factory.create(socket, "tcp", SessionOptions::new())?;
//!
//!     let response = session
//!         .request(
//!             Packet::request("/device/init")
//!                 .with_method("POST")
//!                 .with_body(json!({"name": "x"})),
//!         )
//!         .await?;
//!     println!("status: {:?}", response.status);
//!
//!     session.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`codec`] | Frame writer, reader and assembler |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Packet and session ids |
//! | [`interceptor`] | Encode/decode interceptor chains |
//! | [`protocol`] | Packet and header types |
//! | [`transport`] | Sessions, factory, options |

// ============================================================================
// Modules
// ============================================================================

/// Frame codec.
///
/// Length-prefixed framing with a binary and a text profile.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Encode/decode interceptor chains.
pub mod interceptor;

/// Packet model.
pub mod protocol;

/// Session transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Codec types
pub use codec::{FrameConfig, FrameProfile};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{PacketId, SessionId};

// Interceptor types
pub use interceptor::{
    CompressionInterceptor, DecodeChain, DecodeInterceptor, EncodeChain, EncodeInterceptor,
    Handler, Interceptor, InterceptorChain, InterceptorKind, InterceptorRegistry, Next,
    TraceInterceptor,
};

// Packet types
pub use protocol::{Body, HeaderCollection, HeaderValue, Packet, PacketUpdate};

// Transport types
pub use transport::{
    PacketIdAllocator, Protocol, RequestHandler, SessionEvent, SessionOptions, SessionState,
    TransportSession, TransportSessionFactory, TransportSessionFactoryBuilder, WsStream,
};
