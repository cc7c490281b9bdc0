//! Protocol name table.
//!
//! | Protocol | Frame profile | Reply matching |
//! |----------|---------------|----------------|
//! | `tcp` | binary | id |
//! | `udp` | binary | id |
//! | `coap` | binary | id |
//! | `grpc` | binary | id |
//! | `ws` | text | id |
//! | `http` | text | id |
//! | `mqtt` | text | id + reply topic |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use crate::codec::FrameProfile;
use crate::error::{Error, Result};

// ============================================================================
// Protocol
// ============================================================================

/// Protocol hosted by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Raw TCP.
    Tcp,
    /// UDP wrapped as a duplex.
    Udp,
    /// CoAP.
    Coap,
    /// gRPC.
    Grpc,
    /// WebSocket.
    Ws,
    /// HTTP.
    Http,
    /// MQTT.
    Mqtt,
}

impl Protocol {
    /// Every supported protocol.
    pub const ALL: [Self; 7] = [
        Self::Tcp,
        Self::Udp,
        Self::Coap,
        Self::Grpc,
        Self::Ws,
        Self::Http,
        Self::Mqtt,
    ];

    /// Returns the protocol name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Coap => "coap",
            Self::Grpc => "grpc",
            Self::Ws => "ws",
            Self::Http => "http",
            Self::Mqtt => "mqtt",
        }
    }

    /// Returns the frame profile used on the wire.
    #[inline]
    #[must_use]
    pub const fn frame_profile(self) -> FrameProfile {
        match self {
            Self::Tcp | Self::Udp | Self::Coap | Self::Grpc => FrameProfile::Binary,
            Self::Ws | Self::Http | Self::Mqtt => FrameProfile::Text,
        }
    }

    /// Returns `true` if responses must also match the request's reply topic.
    #[inline]
    #[must_use]
    pub const fn matches_reply_topic(self) -> bool {
        matches!(self, Self::Mqtt)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::config(format!("unknown protocol: {name}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.as_str().parse::<Protocol>().expect("known"), protocol);
        }
        assert_eq!("TCP".parse::<Protocol>().expect("known"), Protocol::Tcp);
    }

    #[test]
    fn test_unknown_name() {
        let err = "smtp".parse::<Protocol>().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_frame_profiles() {
        assert_eq!(Protocol::Tcp.frame_profile(), FrameProfile::Binary);
        assert_eq!(Protocol::Grpc.frame_profile(), FrameProfile::Binary);
        assert_eq!(Protocol::Ws.frame_profile(), FrameProfile::Text);
        assert_eq!(Protocol::Mqtt.frame_profile(), FrameProfile::Text);
    }

    #[test]
    fn test_reply_topic_matching() {
        assert!(Protocol::Mqtt.matches_reply_topic());
        assert!(!Protocol::Tcp.matches_reply_topic());
    }
}
