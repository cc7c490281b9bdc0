//! Packet value objects.
//!
//! A [`Packet`] is the structured unit exchanged over a session. The same
//! type plays three roles:
//!
//! | Role | Constructor | Role fields |
//! |------|-------------|-------------|
//! | Outgoing request | [`Packet::request`], [`Packet::publish`] | `url`, `topic`, `pattern`, `method` |
//! | Incoming (decoded) | produced by the decode chain | any |
//! | Outgoing response | [`Packet::response_to`] | `status`, `status_text`, `error` |
//!
//! The encode chain turns a packet into a [`WirePacket`]: the serializable
//! [`PacketMeta`] envelope plus the body serialized to bytes.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::PacketId;

use super::headers::{HeaderCollection, HeaderValue};

// ============================================================================
// Body
// ============================================================================

/// Packet payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// Opaque bytes.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Structured JSON value.
    Json(Value),
}

impl Body {
    /// Returns `true` if there is no payload.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the JSON value, if this is a JSON body.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the text, if this is a text body.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a bytes body.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Value> for Body {
    #[inline]
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Body {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Bytes> for Body {
    #[inline]
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Body {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

// ============================================================================
// Packet
// ============================================================================

/// A structured packet with correlation id, headers and body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    /// Correlation id. Assigned by the session when a request is sent
    /// without one.
    pub id: Option<PacketId>,
    /// Request target for request/response protocols.
    pub url: Option<String>,
    /// Topic for pub/sub protocols.
    pub topic: Option<String>,
    /// Message pattern for pattern-routed protocols.
    pub pattern: Option<String>,
    /// Request method.
    pub method: Option<String>,
    /// Topic the response is expected on (pub/sub protocols).
    pub reply_to: Option<String>,
    /// Response status code.
    pub status: Option<u16>,
    /// Response status text.
    pub status_text: Option<String>,
    /// Response error detail.
    pub error: Option<String>,
    /// Packet headers.
    pub headers: HeaderCollection,
    /// Packet payload.
    pub body: Body,
}

// ============================================================================
// Packet - Constructors
// ============================================================================

impl Packet {
    /// Creates an empty packet.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request addressed to `url`.
    #[inline]
    #[must_use]
    pub fn request(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Creates a message published to `topic`.
    #[inline]
    #[must_use]
    pub fn publish(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Creates a response to `request`.
    ///
    /// The response shares the request's id and, for pub/sub protocols, is
    /// published on the request's reply topic.
    #[must_use]
    pub fn response_to(request: &Packet) -> Self {
        Self {
            id: request.id.clone(),
            topic: request.reply_to.clone(),
            status: Some(200),
            ..Self::default()
        }
    }
}

// ============================================================================
// Packet - Builder Methods
// ============================================================================

impl Packet {
    /// Sets the correlation id.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<PacketId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the request method.
    #[inline]
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the message pattern.
    #[inline]
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets the reply topic.
    #[inline]
    #[must_use]
    pub fn with_reply_to(mut self, topic: impl Into<String>) -> Self {
        self.reply_to = Some(topic.into());
        self
    }

    /// Sets a header.
    #[inline]
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.set(name, Some(value));
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the response status.
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: u16, status_text: impl Into<String>) -> Self {
        self.status = Some(status);
        self.status_text = Some(status_text.into());
        self
    }

    /// Sets the response error detail.
    #[inline]
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ============================================================================
// Packet - Clone & Inspection
// ============================================================================

impl Packet {
    /// Returns a copy of this packet with `update` merged in.
    ///
    /// The copy keeps this packet's id unless the update sets one. Headers
    /// are copied and then overlaid with the update's headers; the source
    /// packet is never modified.
    #[must_use]
    pub fn clone_with(&self, update: PacketUpdate) -> Self {
        let mut copy = self.clone();
        if let Some(id) = update.id {
            copy.id = Some(id);
        }
        if let Some(url) = update.url {
            copy.url = Some(url);
        }
        if let Some(topic) = update.topic {
            copy.topic = Some(topic);
        }
        if let Some(method) = update.method {
            copy.method = Some(method);
        }
        if let Some(status) = update.status {
            copy.status = Some(status);
        }
        if let Some(status_text) = update.status_text {
            copy.status_text = Some(status_text);
        }
        if let Some(pattern) = update.pattern {
            copy.pattern = Some(pattern);
        }
        if let Some(reply_to) = update.reply_to {
            copy.reply_to = Some(reply_to);
        }
        if let Some(error) = update.error {
            copy.error = Some(error);
        }
        if let Some(headers) = update.headers {
            copy.headers.merge(&headers);
        }
        if let Some(body) = update.body {
            copy.body = body;
        }
        copy
    }

    /// Returns `true` if this packet reports a failure.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|status| status >= 400)
    }

    /// Converts an error response into [`Error::Request`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Request`] carrying status, status text and cause if
    /// the packet reports a failure.
    pub fn into_result(self) -> Result<Packet> {
        if !self.is_error() {
            return Ok(self);
        }
        let status = self.status.unwrap_or(500);
        let status_text = self
            .status_text
            .clone()
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "error".to_string());
        Err(Error::request(status, status_text, self.error))
    }

    /// Splits the packet into its envelope and body.
    #[must_use]
    pub fn into_parts(self) -> (PacketMeta, Body) {
        let meta = PacketMeta {
            id: self.id,
            url: self.url,
            topic: self.topic,
            pattern: self.pattern,
            method: self.method,
            reply_to: self.reply_to,
            status: self.status,
            status_text: self.status_text,
            error: self.error,
            headers: self.headers,
        };
        (meta, self.body)
    }

    /// Rebuilds a packet from its envelope and body.
    #[must_use]
    pub fn from_parts(meta: PacketMeta, body: Body) -> Self {
        Self {
            id: meta.id,
            url: meta.url,
            topic: meta.topic,
            pattern: meta.pattern,
            method: meta.method,
            reply_to: meta.reply_to,
            status: meta.status,
            status_text: meta.status_text,
            error: meta.error,
            headers: meta.headers,
            body,
        }
    }
}

// ============================================================================
// PacketUpdate
// ============================================================================

/// Fields to override in [`Packet::clone_with`].
#[derive(Debug, Clone, Default)]
pub struct PacketUpdate {
    /// New correlation id.
    pub id: Option<PacketId>,
    /// New url.
    pub url: Option<String>,
    /// New topic.
    pub topic: Option<String>,
    /// New method.
    pub method: Option<String>,
    /// New status.
    pub status: Option<u16>,
    /// New status text.
    pub status_text: Option<String>,
    /// New subscription pattern.
    pub pattern: Option<String>,
    /// New reply topic.
    pub reply_to: Option<String>,
    /// New error message.
    pub error: Option<String>,
    /// Headers overlaid on the copied headers.
    pub headers: Option<HeaderCollection>,
    /// New body.
    pub body: Option<Body>,
}

// ============================================================================
// PacketMeta
// ============================================================================

/// Serializable packet envelope: everything except the body.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "url": "/device/init",
///   "method": "POST",
///   "headers": { "content-type": "application/json" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketMeta {
    /// Correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PacketId>,
    /// Request target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Pub/sub topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Message pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Request method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Reply topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Response status code.
    #[serde(
        default,
        alias = "statusCode",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<u16>,
    /// Response status text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Response error detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Headers.
    #[serde(default, skip_serializing_if = "HeaderCollection::is_empty")]
    pub headers: HeaderCollection,
}

// ============================================================================
// WirePacket
// ============================================================================

/// A packet whose body has been serialized to bytes.
///
/// Output of the encode chain, input of the framer; output of the frame
/// assembler, input of the decode chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WirePacket {
    /// Packet envelope.
    pub meta: PacketMeta,
    /// Serialized body.
    pub payload: Bytes,
}

impl WirePacket {
    /// Creates a wire packet.
    #[inline]
    #[must_use]
    pub fn new(meta: PacketMeta, payload: Bytes) -> Self {
        Self { meta, payload }
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
    fn test_request_builder() {
        let packet = Packet::request("/device/init")
            .with_id(1u16)
            .with_method("POST")
            .with_body(json!({"name": "x"}));

        assert_eq!(packet.id, Some(PacketId::Num(1)));
        assert_eq!(packet.url.as_deref(), Some("/device/init"));
        assert_eq!(packet.method.as_deref(), Some("POST"));
        assert_eq!(packet.body.as_json(), Some(&json!({"name": "x"})));
    }

    #[test]
    fn test_response_to_shares_id_and_reply_topic() {
        let request = Packet::publish("sensors/read")
            .with_id(9u16)
            .with_reply_to("sensors/read/reply");
        let response = Packet::response_to(&request);

        assert_eq!(response.id, request.id);
        assert_eq!(response.topic.as_deref(), Some("sensors/read/reply"));
        assert_eq!(response.status, Some(200));
    }

    #[test]
    fn test_clone_with_never_mutates_source() {
        let source = Packet::request("/a")
            .with_id(3u16)
            .with_header("X-Origin", "source");

        let mut overlay = HeaderCollection::new();
        overlay.set("x-origin", Some("copy"));
        let copy = source.clone_with(PacketUpdate {
            url: Some("/b".into()),
            headers: Some(overlay),
            ..PacketUpdate::default()
        });

        assert_eq!(copy.id, Some(PacketId::Num(3)));
        assert_eq!(copy.url.as_deref(), Some("/b"));
        assert_eq!(copy.headers.get_str("x-origin"), Some("copy"));

        assert_eq!(source.url.as_deref(), Some("/a"));
        assert_eq!(source.headers.get_str("x-origin"), Some("source"));
    }

    #[test]
    fn test_clone_with_overrides_routing_fields() {
        let source = Packet::request("sensors/+").with_id(5u16);
        let copy = source.clone_with(PacketUpdate {
            pattern: Some("sensors/#".into()),
            reply_to: Some("replies/5".into()),
            error: Some("rejected".into()),
            ..PacketUpdate::default()
        });

        assert_eq!(copy.pattern.as_deref(), Some("sensors/#"));
        assert_eq!(copy.reply_to.as_deref(), Some("replies/5"));
        assert_eq!(copy.error.as_deref(), Some("rejected"));
        assert!(copy.is_error());

        assert!(source.pattern.is_none());
        assert!(source.reply_to.is_none());
        assert!(source.error.is_none());
    }

    #[test]
    fn test_clone_with_overrides_id() {
        let source = Packet::request("/a").with_id(3u16);
        let copy = source.clone_with(PacketUpdate {
            id: Some(PacketId::Num(4)),
            ..PacketUpdate::default()
        });
        assert_eq!(copy.id, Some(PacketId::Num(4)));
        assert_eq!(source.id, Some(PacketId::Num(3)));
    }

    #[test]
    fn test_into_result() {
        let ok = Packet::new().with_status(200, "OK");
        assert!(ok.into_result().is_ok());

        let failed = Packet::new()
            .with_status(404, "Not Found")
            .with_error("no route for /x");
        let err = failed.into_result().unwrap_err();
        match err {
            Error::Request {
                status,
                status_text,
                cause,
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert_eq!(cause.as_deref(), Some("no route for /x"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_without_status_defaults_to_500() {
        let err = Packet::new().with_error("boom").into_result().unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_parts_roundtrip() {
        let packet = Packet::request("/x")
            .with_id("abc")
            .with_header("a", "1")
            .with_body("hello");
        let (meta, body) = packet.clone().into_parts();
        assert_eq!(Packet::from_parts(meta, body), packet);
    }

    #[test]
    fn test_meta_accepts_status_code_alias() {
        let meta: PacketMeta =
            serde_json::from_value(json!({"id": 1, "statusCode": 200})).expect("parse");
        assert_eq!(meta.status, Some(200));
        assert_eq!(meta.id, Some(PacketId::Num(1)));
    }

    #[test]
    fn test_meta_serialization_skips_empty_fields() {
        let meta = PacketMeta {
            id: Some(PacketId::Num(2)),
            reply_to: Some("r".into()),
            ..PacketMeta::default()
        };
        let json = serde_json::to_value(&meta).expect("serialize");
        assert_eq!(json, json!({"id": 2, "replyTo": "r"}));
    }
}
