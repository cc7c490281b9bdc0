//! Encode/decode interceptor chains.
//!
//! A chain is an ordered list of [`Interceptor`]s in front of a terminal
//! [`Handler`] (the backend). Each interceptor receives the input and a
//! [`Next`] continuation; it may transform the input and forward it, transform
//! the output on the way back, or short-circuit without calling `next`.
//!
//! ```text
//! input ─► [interceptor 0] ─► [interceptor 1] ─► … ─► backend
//! output ◄─────────────────◄──────────────────◄──────┘
//! ```
//!
//! The composed handler is built on first use by folding the interceptors
//! right-to-left onto the backend, then cached for the chain's lifetime.
//!
//! # Chains
//!
//! | Alias | Input | Output | Backend |
//! |-------|-------|--------|---------|
//! | [`EncodeChain`] | [`Packet`] | [`WirePacket`] | [`PacketEncoder`] |
//! | [`DecodeChain`] | [`WirePacket`] | [`Packet`] | [`PacketDecoder`] |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backend` | Terminal body serializer/deserializer |
//! | `compression` | zstd payload compression |
//! | `registry` | Tag → constructor table |
//! | `trace` | Per-packet tracing |

// ============================================================================
// Submodules
// ============================================================================

/// Terminal encode/decode backends.
pub mod backend;

/// zstd payload compression.
pub mod compression;

/// Compile-time interceptor registration table.
pub mod registry;

/// Per-packet tracing interceptor.
pub mod trace;

// ============================================================================
// Re-exports
// ============================================================================

pub use backend::{PacketDecoder, PacketEncoder};
pub use compression::CompressionInterceptor;
pub use registry::{InterceptorKind, InterceptorRegistry};
pub use trace::TraceInterceptor;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{Packet, WirePacket};

// ============================================================================
// Types
// ============================================================================

/// Chain turning packets into wire packets.
pub type EncodeChain = InterceptorChain<Packet, WirePacket>;

/// Chain turning wire packets into packets.
pub type DecodeChain = InterceptorChain<WirePacket, Packet>;

/// Shared encode-side interceptor.
pub type EncodeInterceptor = Arc<dyn Interceptor<Packet, WirePacket>>;

/// Shared decode-side interceptor.
pub type DecodeInterceptor = Arc<dyn Interceptor<WirePacket, Packet>>;

// ============================================================================
// Traits
// ============================================================================

/// Terminal step of a chain.
#[async_trait]
pub trait Handler<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Processes the input.
    async fn handle(&self, input: I) -> Result<O>;
}

/// A step wrapping the rest of the chain.
///
/// Errors must be returned, never swallowed: whatever `next` returns as
/// `Err` has to reach the caller.
#[async_trait]
pub trait Interceptor<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the input, optionally delegating to `next`.
    async fn intercept(&self, input: I, next: Next<I, O>) -> Result<O>;
}

// ============================================================================
// Next
// ============================================================================

/// Continuation handed to an interceptor: the rest of the chain.
pub struct Next<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Remaining composed handler.
    inner: Arc<dyn Handler<I, O>>,
}

impl<I, O> Next<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Runs the rest of the chain.
    #[inline]
    pub async fn run(self, input: I) -> Result<O> {
        self.inner.handle(input).await
    }
}

// ============================================================================
// Link
// ============================================================================

/// One interceptor bound to the handler that follows it.
struct Link<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// The interceptor.
    interceptor: Arc<dyn Interceptor<I, O>>,
    /// Everything after it.
    next: Arc<dyn Handler<I, O>>,
}

#[async_trait]
impl<I, O> Handler<I, O> for Link<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn handle(&self, input: I) -> Result<O> {
        let next = Next {
            inner: Arc::clone(&self.next),
        };
        self.interceptor.intercept(input, next).await
    }
}

// ============================================================================
// InterceptorChain
// ============================================================================

/// Ordered interceptors in front of a backend.
pub struct InterceptorChain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Interceptors, outermost first.
    interceptors: Vec<Arc<dyn Interceptor<I, O>>>,
    /// Terminal handler.
    backend: Arc<dyn Handler<I, O>>,
    /// Composed handler, built on first use.
    compiled: OnceLock<Arc<dyn Handler<I, O>>>,
}

impl<I, O> InterceptorChain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a chain with no interceptors.
    #[must_use]
    pub fn new(backend: Arc<dyn Handler<I, O>>) -> Self {
        Self::with_interceptors(backend, Vec::new())
    }

    /// Creates a chain from an ordered interceptor list (outermost first).
    #[must_use]
    pub fn with_interceptors(
        backend: Arc<dyn Handler<I, O>>,
        interceptors: Vec<Arc<dyn Interceptor<I, O>>>,
    ) -> Self {
        Self {
            interceptors,
            backend,
            compiled: OnceLock::new(),
        }
    }

    /// Returns the number of interceptors.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if the chain has no interceptors.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Returns interceptor names, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Runs the input through the chain.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an interceptor or the backend.
    pub async fn handle(&self, input: I) -> Result<O> {
        self.compiled().handle(input).await
    }

    /// Returns the composed handler, building it once.
    fn compiled(&self) -> &Arc<dyn Handler<I, O>> {
        self.compiled.get_or_init(|| {
            self.interceptors
                .iter()
                .rev()
                .fold(Arc::clone(&self.backend), |next, interceptor| {
                    Arc::new(Link {
                        interceptor: Arc::clone(interceptor),
                        next,
                    }) as Arc<dyn Handler<I, O>>
                })
        })
    }
}

impl<I, O> fmt::Debug for InterceptorChain<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .field("compiled", &self.compiled.get().is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::error::Error;

    struct Echo;

    #[async_trait]
    impl Handler<String, String> for Echo {
        async fn handle(&self, input: String) -> Result<String> {
            Ok(format!("<{input}>"))
        }
    }

    struct Tag {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor<String, String> for Tag {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn intercept(&self, input: String, next: Next<String, String>) -> Result<String> {
            self.log.lock().push(format!("in:{}", self.label));
            let out = next.run(format!("{input}{}", self.label)).await?;
            self.log.lock().push(format!("out:{}", self.label));
            Ok(format!("{out}{}", self.label))
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Interceptor<String, String> for ShortCircuit {
        fn name(&self) -> &'static str {
            "short"
        }

        async fn intercept(&self, _input: String, _next: Next<String, String>) -> Result<String> {
            Ok("cached".to_string())
        }
    }

    struct Fails;

    #[async_trait]
    impl Interceptor<String, String> for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }

        async fn intercept(&self, _input: String, _next: Next<String, String>) -> Result<String> {
            Err(Error::serialization("rejected by interceptor"))
        }
    }

    struct CountingBackend(AtomicUsize);

    #[async_trait]
    impl Handler<String, String> for CountingBackend {
        async fn handle(&self, input: String) -> Result<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }
    }

    #[tokio::test]
    async fn test_empty_chain_calls_backend() {
        let chain: InterceptorChain<String, String> = InterceptorChain::new(Arc::new(Echo));
        assert!(chain.is_empty());
        assert_eq!(chain.handle("x".into()).await.expect("ok"), "<x>");
    }

    #[tokio::test]
    async fn test_order_is_outermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: InterceptorChain<String, String> = InterceptorChain::with_interceptors(
            Arc::new(Echo),
            vec![
                Arc::new(Tag {
                    label: "a",
                    log: Arc::clone(&log),
                }),
                Arc::new(Tag {
                    label: "b",
                    log: Arc::clone(&log),
                }),
            ],
        );

        assert_eq!(chain.names(), vec!["a", "b"]);
        assert_eq!(chain.handle("x".into()).await.expect("ok"), "<xab>ba");
        assert_eq!(*log.lock(), vec!["in:a", "in:b", "out:b", "out:a"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_backend() {
        let backend = Arc::new(CountingBackend(AtomicUsize::new(0)));
        let chain: InterceptorChain<String, String> = InterceptorChain::with_interceptors(
            Arc::clone(&backend) as Arc<dyn Handler<String, String>>,
            vec![Arc::new(ShortCircuit)],
        );
        assert_eq!(chain.handle("x".into()).await.expect("ok"), "cached");
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interceptor_error_propagates() {
        let backend = Arc::new(CountingBackend(AtomicUsize::new(0)));
        let chain: InterceptorChain<String, String> = InterceptorChain::with_interceptors(
            Arc::clone(&backend) as Arc<dyn Handler<String, String>>,
            vec![Arc::new(Fails)],
        );
        let err = chain.handle("x".into()).await.unwrap_err();
        assert!(err.is_serialization_error());
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_is_built_once() {
        let chain: InterceptorChain<String, String> = InterceptorChain::new(Arc::new(Echo));
        assert!(chain.compiled.get().is_none());
        chain.handle("1".into()).await.expect("ok");
        let first = Arc::as_ptr(chain.compiled.get().expect("built")) as *const ();
        chain.handle("2".into()).await.expect("ok");
        let second = Arc::as_ptr(chain.compiled.get().expect("built")) as *const ();
        assert_eq!(first, second);
    }
}
