//! Packet model.
//!
//! This module defines the structured values that travel over a session.
//!
//! # Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | `Packet` | Structured request, incoming or response packet |
//! | `Body` | Payload: empty, bytes, text or JSON |
//! | `PacketMeta` | Serializable envelope (id, role fields, headers) |
//! | `WirePacket` | Envelope plus serialized payload bytes |
//! | `HeaderCollection` | Case-insensitive ordered headers |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `headers` | Header map and typed accessors |
//! | `packet` | Packet, body and envelope types |

// ============================================================================
// Submodules
// ============================================================================

/// Case-insensitive header collection.
pub mod headers;

/// Packet value objects.
pub mod packet;

// ============================================================================
// Re-exports
// ============================================================================

pub use headers::{HeaderCollection, HeaderValue};
pub use packet::{Body, Packet, PacketMeta, PacketUpdate, WirePacket};
