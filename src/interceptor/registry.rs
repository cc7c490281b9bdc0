//! Interceptor registration table.
//!
//! Built-in interceptors are looked up by [`InterceptorKind`] in a static
//! table of constructors, so sessions can be configured from names
//! (`"compression"`, `"trace"`) without any runtime registration step.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::{CompressionInterceptor, DecodeInterceptor, EncodeInterceptor, TraceInterceptor};

// ============================================================================
// InterceptorKind
// ============================================================================

/// Built-in interceptor tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorKind {
    /// zstd payload compression.
    Compression,
    /// Per-packet tracing.
    Trace,
}

impl InterceptorKind {
    /// Every built-in kind.
    pub const ALL: [Self; 2] = [Self::Compression, Self::Trace];

    /// Returns the registered name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compression => "compression",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for InterceptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterceptorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::config(format!("unknown interceptor: {s}")))
    }
}

// ============================================================================
// Registration table
// ============================================================================

/// One registry row.
struct Registration {
    kind: InterceptorKind,
    encode: fn() -> EncodeInterceptor,
    decode: fn() -> DecodeInterceptor,
}

static REGISTRY: &[Registration] = &[
    Registration {
        kind: InterceptorKind::Compression,
        encode: compression_encode,
        decode: compression_decode,
    },
    Registration {
        kind: InterceptorKind::Trace,
        encode: trace_encode,
        decode: trace_decode,
    },
];

fn compression_encode() -> EncodeInterceptor {
    Arc::new(CompressionInterceptor::new())
}

fn compression_decode() -> DecodeInterceptor {
    Arc::new(CompressionInterceptor::new())
}

fn trace_encode() -> EncodeInterceptor {
    Arc::new(TraceInterceptor::new())
}

fn trace_decode() -> DecodeInterceptor {
    Arc::new(TraceInterceptor::new())
}

// ============================================================================
// InterceptorRegistry
// ============================================================================

/// Lookup of built-in interceptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterceptorRegistry;

impl InterceptorRegistry {
    /// Returns the encode-side instance of `kind`.
    #[must_use]
    pub fn encode(kind: InterceptorKind) -> Option<EncodeInterceptor> {
        Self::row(kind).map(|row| (row.encode)())
    }

    /// Returns the decode-side instance of `kind`.
    #[must_use]
    pub fn decode(kind: InterceptorKind) -> Option<DecodeInterceptor> {
        Self::row(kind).map(|row| (row.decode)())
    }

    /// Resolves a list of names into matching encode and decode lists, both
    /// in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn resolve<S: AsRef<str>>(
        names: &[S],
    ) -> Result<(Vec<EncodeInterceptor>, Vec<DecodeInterceptor>)> {
        let mut encode = Vec::with_capacity(names.len());
        let mut decode = Vec::with_capacity(names.len());

        for name in names {
            let kind: InterceptorKind = name.as_ref().parse()?;
            let row = Self::row(kind)
                .ok_or_else(|| Error::config(format!("interceptor not registered: {kind}")))?;
            encode.push((row.encode)());
            decode.push((row.decode)());
        }

        Ok((encode, decode))
    }

    fn row(kind: InterceptorKind) -> Option<&'static Registration> {
        REGISTRY.iter().find(|row| row.kind == kind)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            "compression".parse::<InterceptorKind>().expect("known"),
            InterceptorKind::Compression
        );
        assert_eq!(
            " Trace ".parse::<InterceptorKind>().expect("known"),
            InterceptorKind::Trace
        );
        assert!("gzip".parse::<InterceptorKind>().is_err());
    }

    #[test]
    fn test_every_kind_is_registered() {
        for kind in InterceptorKind::ALL {
            assert_eq!(InterceptorRegistry::encode(kind).expect("encode").name(), kind.as_str());
            assert_eq!(InterceptorRegistry::decode(kind).expect("decode").name(), kind.as_str());
        }
    }

    #[test]
    fn test_resolve_keeps_order() {
        let (encode, decode) =
            InterceptorRegistry::resolve(&["compression", "trace"]).expect("resolve");
        let encode_names: Vec<_> = encode.iter().map(|i| i.name()).collect();
        let decode_names: Vec<_> = decode.iter().map(|i| i.name()).collect();
        assert_eq!(encode_names, vec!["compression", "trace"]);
        assert_eq!(decode_names, vec!["compression", "trace"]);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let err = InterceptorRegistry::resolve(&["nope"]).err().expect("expected resolve error");
        assert!(matches!(err, Error::Config { .. }));
    }
}
