//! Session factory.
//!
//! The factory owns one encode chain and one decode chain and shares them
//! with every session it creates, so each chain is composed once.
//!
//! # Example
//!
//! ```no_run
//! use duplex_transport::{InterceptorKind, SessionOptions, TransportSessionFactory};
//!
//! # async fn example() -> duplex_transport::Result<()> {
//! let factory = TransportSessionFactory::builder()
//!     .with(InterceptorKind::Compression)
//!     .build();
//!
//! let socket = tokio::net::TcpStream::connect("127.0.0.1:4000").await?;
//! let session = factory.create(socket, "tcp", SessionOptions::new())?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::error::Result;
use crate::interceptor::{
    DecodeChain, DecodeInterceptor, EncodeChain, EncodeInterceptor, Interceptor, InterceptorKind,
    InterceptorRegistry, PacketDecoder, PacketEncoder,
};
use crate::protocol::{Packet, WirePacket};

use super::options::SessionOptions;
use super::protocol::Protocol;
use super::session::TransportSession;

// ============================================================================
// TransportSessionFactory
// ============================================================================

/// Creates sessions sharing one pair of interceptor chains.
#[derive(Debug, Clone)]
pub struct TransportSessionFactory {
    /// Packet → wire chain.
    encode: Arc<EncodeChain>,
    /// Wire → packet chain.
    decode: Arc<DecodeChain>,
}

impl TransportSessionFactory {
    /// Creates a factory builder.
    #[inline]
    #[must_use]
    pub fn builder() -> TransportSessionFactoryBuilder {
        TransportSessionFactoryBuilder::new()
    }

    /// Creates a factory without interceptors.
    #[must_use]
    pub fn new() -> Self {
        TransportSessionFactoryBuilder::new().build()
    }

    /// Binds a session to `socket` for the protocol named `protocol`.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an unknown protocol
    /// name or invalid options.
    pub fn create<S>(
        &self,
        socket: S,
        protocol: &str,
        options: SessionOptions,
    ) -> Result<TransportSession<S>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let protocol: Protocol = protocol.parse()?;
        self.create_for(socket, protocol, options)
    }

    /// Binds a session to `socket` for `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for invalid options.
    pub fn create_for<S>(
        &self,
        socket: S,
        protocol: Protocol,
        options: SessionOptions,
    ) -> Result<TransportSession<S>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        options.validate()?;
        debug!(%protocol, "Creating session");
        Ok(TransportSession::start(
            socket,
            protocol,
            options,
            Arc::clone(&self.encode),
            Arc::clone(&self.decode),
        ))
    }

    /// Returns the encode interceptor names, outermost first.
    #[must_use]
    pub fn encode_interceptors(&self) -> Vec<&'static str> {
        self.encode.names()
    }

    /// Returns the decode interceptor names, outermost first.
    #[must_use]
    pub fn decode_interceptors(&self) -> Vec<&'static str> {
        self.decode.names()
    }
}

impl Default for TransportSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TransportSessionFactoryBuilder
// ============================================================================

/// Builder for [`TransportSessionFactory`].
///
/// Interceptors run outermost first, in the order added. Interceptors added
/// through [`with`](Self::with) or [`interceptor`](Self::interceptor) take the
/// same position in both chains: the outermost encode interceptor touches the
/// wire packet last and the outermost decode interceptor touches it first.
#[derive(Default)]
pub struct TransportSessionFactoryBuilder {
    /// Encode interceptors, outermost first.
    encode: Vec<EncodeInterceptor>,
    /// Decode interceptors, outermost first.
    decode: Vec<DecodeInterceptor>,
}

impl TransportSessionFactoryBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an encode-side interceptor.
    #[inline]
    #[must_use]
    pub fn encode_interceptor(mut self, interceptor: EncodeInterceptor) -> Self {
        self.encode.push(interceptor);
        self
    }

    /// Appends a decode-side interceptor.
    #[inline]
    #[must_use]
    pub fn decode_interceptor(mut self, interceptor: DecodeInterceptor) -> Self {
        self.decode.push(interceptor);
        self
    }

    /// Adds an interceptor that works in both directions.
    #[must_use]
    pub fn interceptor<T>(mut self, interceptor: T) -> Self
    where
        T: Interceptor<Packet, WirePacket> + Interceptor<WirePacket, Packet> + 'static,
    {
        let shared = Arc::new(interceptor);
        self.encode.push(Arc::clone(&shared) as EncodeInterceptor);
        self.decode.push(shared as DecodeInterceptor);
        self
    }

    /// Adds a built-in interceptor.
    #[must_use]
    pub fn with(mut self, kind: InterceptorKind) -> Self {
        if let Some(encode) = InterceptorRegistry::encode(kind) {
            self.encode.push(encode);
        }
        if let Some(decode) = InterceptorRegistry::decode(kind) {
            self.decode.push(decode);
        }
        self
    }

    /// Adds built-in interceptors by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an unknown name.
    pub fn with_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        let (encode, decode) = InterceptorRegistry::resolve(names)?;
        self.encode.extend(encode);
        self.decode.extend(decode);
        Ok(self)
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> TransportSessionFactory {
        let encode = EncodeChain::with_interceptors(Arc::new(PacketEncoder), self.encode);
        let decode = DecodeChain::with_interceptors(Arc::new(PacketDecoder), self.decode);
        TransportSessionFactory {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }
}

impl std::fmt::Debug for TransportSessionFactoryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSessionFactoryBuilder")
            .field("encode", &self.encode.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("decode", &self.decode.iter().map(|i| i.name()).collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::duplex;

    use crate::error::Error;
    use crate::interceptor::{CompressionInterceptor, TraceInterceptor};

    #[test]
    fn test_builder_orders_chains() {
        let factory = TransportSessionFactory::builder()
            .with(InterceptorKind::Compression)
            .interceptor(TraceInterceptor::new())
            .build();
        assert_eq!(factory.encode_interceptors(), vec!["compression", "trace"]);
        assert_eq!(factory.decode_interceptors(), vec!["compression", "trace"]);
    }

    #[test]
    fn test_with_names() {
        let factory = TransportSessionFactory::builder()
            .interceptor(CompressionInterceptor::new())
            .with_names(&["trace"])
            .expect("known")
            .build();
        assert_eq!(factory.encode_interceptors(), vec!["compression", "trace"]);
        assert_eq!(factory.decode_interceptors(), vec!["compression", "trace"]);

        assert!(
            TransportSessionFactory::builder()
                .with_names(&["bogus"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_create_by_name() {
        let factory = TransportSessionFactory::new();
        let (a, _b) = duplex(1024);
        let session = factory
            .create(a, "ws", SessionOptions::new())
            .expect("session");
        assert_eq!(session.protocol(), Protocol::Ws);
        assert!(session.is_open());
        session.destroy().await;
    }

    #[tokio::test]
    async fn test_unknown_protocol_and_bad_options() {
        let factory = TransportSessionFactory::new();

        let (a, _b) = duplex(1024);
        let err = factory.create(a, "carrier-pigeon", SessionOptions::new()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let (a, _b) = duplex(1024);
        let err = factory
            .create(a, "tcp", SessionOptions::new().with_delimiter(b'1'))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_clones_share_chains() {
        let factory = TransportSessionFactory::builder()
            .with(InterceptorKind::Trace)
            .build();
        let clone = factory.clone();
        assert!(Arc::ptr_eq(&factory.encode, &clone.encode));
        assert!(Arc::ptr_eq(&factory.decode, &clone.decode));
    }
}
