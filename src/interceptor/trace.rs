//! Per-packet tracing interceptor.

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::Result;
use crate::protocol::{Packet, WirePacket};

use super::{Interceptor, Next};

// ============================================================================
// TraceInterceptor
// ============================================================================

/// Logs every packet crossing the chain at `trace` level.
///
/// Failures are logged at `debug` and returned unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceInterceptor;

impl TraceInterceptor {
    /// Creates the interceptor.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Interceptor<Packet, WirePacket> for TraceInterceptor {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn intercept(&self, input: Packet, next: Next<Packet, WirePacket>) -> Result<WirePacket> {
        let id = input.id.clone();
        let url = input.url.clone();
        let started = Instant::now();

        match next.run(input).await {
            Ok(wire) => {
                trace!(
                    ?id,
                    ?url,
                    len = wire.payload.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Packet encoded"
                );
                Ok(wire)
            }
            Err(e) => {
                debug!(?id, ?url, error = %e, "Packet encode failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Interceptor<WirePacket, Packet> for TraceInterceptor {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn intercept(&self, input: WirePacket, next: Next<WirePacket, Packet>) -> Result<Packet> {
        let id = input.meta.id.clone();
        let len = input.payload.len();
        let started = Instant::now();

        match next.run(input).await {
            Ok(packet) => {
                trace!(
                    ?id,
                    url = ?packet.url,
                    status = ?packet.status,
                    len,
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "Packet decoded"
                );
                Ok(packet)
            }
            Err(e) => {
                debug!(?id, len, error = %e, "Packet decode failed");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::interceptor::{DecodeChain, EncodeChain, PacketDecoder, PacketEncoder};
    use crate::protocol::Body;

    #[tokio::test]
    async fn test_trace_is_transparent() {
        let encode =
            EncodeChain::with_interceptors(Arc::new(PacketEncoder), vec![Arc::new(TraceInterceptor)]);
        let decode =
            DecodeChain::with_interceptors(Arc::new(PacketDecoder), vec![Arc::new(TraceInterceptor)]);

        let packet = Packet::request("/ping").with_id(9u16).with_body("pong");
        let wire = encode.handle(packet).await.expect("encode");
        let back = decode.handle(wire).await.expect("decode");

        assert_eq!(back.url.as_deref(), Some("/ping"));
        assert_eq!(back.body, Body::Text("pong".into()));
    }
}
