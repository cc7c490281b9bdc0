//! Case-insensitive packet headers.
//!
//! Header names are normalized to ASCII lowercase on every operation, so
//! `Content-Type` and `content-type` address the same field. Insertion order
//! is preserved for serialization.
//!
//! # Example
//!
//! ```ignore
//! use duplex_transport::HeaderCollection;
//!
//! let mut headers = HeaderCollection::new();
//! headers.set("Content-Type", Some("application/json"));
//! assert_eq!(headers.content_type(), Some("application/json"));
//!
//! headers.set("content-type", None::<&str>);
//! assert!(!headers.has("Content-Type"));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// `content-type` header name.
pub const CONTENT_TYPE: &str = "content-type";

/// `content-length` header name.
pub const CONTENT_LENGTH: &str = "content-length";

/// `content-encoding` header name.
pub const CONTENT_ENCODING: &str = "content-encoding";

/// `content-transfer-encoding` header name.
pub const CONTENT_TRANSFER_ENCODING: &str = "content-transfer-encoding";

// ============================================================================
// HeaderValue
// ============================================================================

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    /// Plain string value.
    Str(String),
    /// Multi-valued field.
    List(Vec<String>),
    /// Numeric value.
    Num(Number),
}

impl HeaderValue {
    /// Returns the value as a string slice if it is a single string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an unsigned integer.
    ///
    /// Numeric strings are accepted as well, since peers disagree on how
    /// `content-length` is typed.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Num(n) => n.as_u64(),
            Self::Str(s) => s.trim().parse().ok(),
            Self::List(_) => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::List(list) => Value::Array(list.iter().cloned().map(Value::String).collect()),
            Self::Num(n) => Value::Number(n.clone()),
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::List(list) => f.write_str(&list.join(", ")),
            Self::Num(n) => write!(f, "{n}"),
        }
    }
}

impl TryFrom<Value> for HeaderValue {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(Self::Str(s)),
            Value::Number(n) => Ok(Self::Num(n)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(Error::serialization(format!(
                        "header list entries must be strings, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            other => Err(Error::serialization(format!(
                "unsupported header value: {other}"
            ))),
        }
    }
}

impl From<&str> for HeaderValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<String>> for HeaderValue {
    #[inline]
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<u64> for HeaderValue {
    #[inline]
    fn from(value: u64) -> Self {
        Self::Num(Number::from(value))
    }
}

impl From<usize> for HeaderValue {
    #[inline]
    fn from(value: usize) -> Self {
        Self::Num(Number::from(value as u64))
    }
}

impl From<i64> for HeaderValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Num(Number::from(value))
    }
}

// ============================================================================
// HeaderCollection
// ============================================================================

/// Ordered, case-insensitive header map.
///
/// `Clone` produces a fully independent copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderCollection {
    /// Entries keyed by lowercase name, in insertion order.
    entries: Vec<(String, HeaderValue)>,
}

impl HeaderCollection {
    /// Creates an empty collection.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds a collection from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if a value is not a string, number,
    /// or list of strings. `null` values are skipped.
    pub fn from_json(map: &Map<String, Value>) -> Result<Self> {
        let mut headers = Self::new();
        for (name, value) in map {
            if value.is_null() {
                continue;
            }
            headers.insert(name, HeaderValue::try_from(value.clone())?);
        }
        Ok(headers)
    }

    /// Returns `true` if the header is present.
    #[inline]
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the header value.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.position(name).map(|idx| &self.entries[idx].1)
    }

    /// Returns the header value if it is a single string.
    #[inline]
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderValue::as_str)
    }

    /// Sets or removes a header.
    ///
    /// `None` removes the field, matching the convention that assigning an
    /// absent value deletes it.
    pub fn set<V: Into<HeaderValue>>(&mut self, name: &str, value: Option<V>) -> &mut Self {
        match value {
            Some(value) => self.insert(name, value.into()),
            None => {
                self.remove(name);
            }
        }
        self
    }

    /// Removes a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Removes several headers at once.
    pub fn remove_many<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.remove(name);
        }
    }

    /// Returns the number of headers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(lowercase name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Copies every header from `other`, overwriting existing fields.
    pub fn merge(&mut self, other: &HeaderCollection) {
        for (name, value) in &other.entries {
            self.insert(name, value.clone());
        }
    }

    fn insert(&mut self, name: &str, value: HeaderValue) {
        match self.position(name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name.to_ascii_lowercase(), value)),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// Typed Accessors
// ============================================================================

impl HeaderCollection {
    /// Returns the `content-type` header.
    #[inline]
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.get_str(CONTENT_TYPE)
    }

    /// Sets the `content-type` header.
    #[inline]
    pub fn set_content_type(&mut self, value: impl Into<String>) -> &mut Self {
        self.set(CONTENT_TYPE, Some(value.into()))
    }

    /// Returns the `content-length` header.
    #[inline]
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.get(CONTENT_LENGTH).and_then(HeaderValue::as_u64)
    }

    /// Sets the `content-length` header.
    #[inline]
    pub fn set_content_length(&mut self, value: usize) -> &mut Self {
        self.set(CONTENT_LENGTH, Some(value))
    }

    /// Returns the `content-encoding` header.
    #[inline]
    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.get_str(CONTENT_ENCODING)
    }

    /// Sets the `content-encoding` header.
    #[inline]
    pub fn set_content_encoding(&mut self, value: impl Into<String>) -> &mut Self {
        self.set(CONTENT_ENCODING, Some(value.into()))
    }

    /// Returns `true` if the content type denotes JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            let mime = ct.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
    }

    /// Returns `true` if the content type denotes text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/"))
    }
}

// ============================================================================
// Serde
// ============================================================================

impl Serialize for HeaderCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, &value.to_json())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HeaderCollection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::from_json(&map).map_err(de::Error::custom)
    }
}

impl<'a> FromIterator<(&'a str, HeaderValue)> for HeaderCollection {
    fn from_iter<I: IntoIterator<Item = (&'a str, HeaderValue)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = HeaderCollection::new();
        headers.set("X-Trace-Id", Some("abc"));

        assert!(headers.has("x-trace-id"));
        assert!(headers.has("X-TRACE-ID"));
        assert_eq!(headers.get_str("x-Trace-id"), Some("abc"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_set_overwrites_and_keeps_order() {
        let mut headers = HeaderCollection::new();
        headers.set("a", Some("1")).set("b", Some("2")).set("A", Some("3"));

        let names: Vec<_> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(headers.get_str("a"), Some("3"));
    }

    #[test]
    fn test_set_none_removes() {
        let mut headers = HeaderCollection::new();
        headers.set_content_type("text/plain");
        headers.set(CONTENT_TYPE, None::<&str>);
        assert!(headers.content_type().is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_remove_many() {
        let mut headers = HeaderCollection::new();
        headers.set("a", Some("1")).set("b", Some("2")).set("c", Some("3"));
        headers.remove_many(["A", "c"]);
        assert_eq!(headers.len(), 1);
        assert!(headers.has("b"));
    }

    #[test]
    fn test_typed_accessors() {
        let mut headers = HeaderCollection::new();
        headers
            .set_content_type("application/json; charset=utf-8")
            .set_content_length(128)
            .set_content_encoding("zstd");

        assert!(headers.is_json());
        assert!(!headers.is_text());
        assert_eq!(headers.content_length(), Some(128));
        assert_eq!(headers.content_encoding(), Some("zstd"));
    }

    #[test]
    fn test_content_length_accepts_numeric_string() {
        let mut headers = HeaderCollection::new();
        headers.set("Content-Length", Some("42"));
        assert_eq!(headers.content_length(), Some(42));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut source = HeaderCollection::new();
        source.set("accept", Some(vec!["a".to_string(), "b".to_string()]));

        let mut copy = source.clone();
        copy.set("accept", Some("c"));
        copy.set("extra", Some("1"));

        assert_eq!(
            source.get("accept"),
            Some(&HeaderValue::List(vec!["a".into(), "b".into()]))
        );
        assert!(!source.has("extra"));
    }

    #[test]
    fn test_from_json_copies_deeply() {
        let mut object = json!({"Accept": ["a"], "Retry": 3, "skip": null})
            .as_object()
            .cloned()
            .expect("object");
        let headers = HeaderCollection::from_json(&object).expect("valid headers");

        object.insert("Accept".into(), json!(["changed"]));

        assert_eq!(headers.get("accept"), Some(&HeaderValue::List(vec!["a".into()])));
        assert_eq!(headers.get("retry").and_then(HeaderValue::as_u64), Some(3));
        assert!(!headers.has("skip"));
    }

    #[test]
    fn test_from_json_rejects_nested_objects() {
        let object = json!({"bad": {"nested": true}})
            .as_object()
            .cloned()
            .expect("object");
        let err = HeaderCollection::from_json(&object).unwrap_err();
        assert!(err.is_serialization_error());
    }

    #[test]
    fn test_serde_roundtrip_shape() {
        let mut headers = HeaderCollection::new();
        headers.set("Content-Type", Some("text/plain")).set_content_length(5);

        let json = serde_json::to_value(&headers).expect("serialize");
        assert_eq!(json, json!({"content-type": "text/plain", "content-length": 5}));

        let back: HeaderCollection = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, headers);
    }
}
