//! Client wire protocol: control frames in both directions.
//!
//! Events themselves travel as the bare serialized record; only control
//! frames carry a `type` tag defined here.

use briefcast_core::{EventType, ProtocolError, SessionId, SourceAgent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::filter::AdmissionFilter;

/// Server → client control frames.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once, right after the connection joins its session.
    Connected {
        /// Session the connection joined.
        session_id: SessionId,
        /// Server time of the join.
        timestamp: DateTime<Utc>,
    },
    /// Heartbeat request; the client answers with `pong`.
    Ping,
}

impl ServerFrame {
    /// `connected` frame stamped with the current time.
    pub fn connected(session_id: SessionId) -> Self {
        Self::Connected {
            session_id,
            timestamp: Utc::now(),
        }
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Client → server control frames.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat acknowledgement.
    Pong,
    /// Replace this connection's filter.
    Subscribe {
        /// Allowed producers; empty allows all.
        #[serde(default)]
        agents: Vec<SourceAgent>,
        /// Allowed event types; empty allows all.
        #[serde(default)]
        event_types: Vec<EventType>,
    },
    /// Drop this connection's filter.
    Unsubscribe,
    /// Any other `type`. Logged and ignored.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// Decode a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::NonUtf8(data.len()))?;
        Self::parse(text)
    }

    /// Frame type label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Unknown => "unknown",
        }
    }

    /// The filter a `subscribe` frame asks for.
    pub fn into_filter(self) -> Option<AdmissionFilter> {
        match self {
            Self::Subscribe {
                agents,
                event_types,
            } => Some(AdmissionFilter::new(agents, event_types)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn ping_wire_shape() {
        assert_eq!(ServerFrame::Ping.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn connected_wire_shape() {
        let json = ServerFrame::connected(SessionId::from("sess-1")).to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "connected");
        assert_eq!(v["session_id"], "sess-1");
        assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn parse_pong_and_unsubscribe() {
        assert_eq!(ClientFrame::parse(r#"{"type":"pong"}"#).unwrap(), ClientFrame::Pong);
        assert_eq!(
            ClientFrame::parse(r#"{"type":"unsubscribe"}"#).unwrap(),
            ClientFrame::Unsubscribe
        );
    }

    #[test]
    fn parse_subscribe_with_partial_lists() {
        let frame = ClientFrame::parse(r#"{"type":"subscribe","agents":["burn_analyst"]}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                agents: vec![SourceAgent::BurnAnalyst],
                event_types: vec![],
            }
        );
        let filter = frame.into_filter().unwrap();
        assert_eq!(filter.agents, vec![SourceAgent::BurnAnalyst]);
        assert!(filter.event_types.is_empty());
    }

    #[test]
    fn parse_subscribe_with_types() {
        let frame = ClientFrame::parse(
            r#"{"type":"subscribe","agents":[],"event_types":["ALERT","ACTION_REQUIRED"]}"#,
        )
        .unwrap();
        assert_matches!(frame, ClientFrame::Subscribe { ref event_types, .. } if event_types.len() == 2);
    }

    #[test]
    fn unknown_type_falls_back() {
        let frame = ClientFrame::parse(r#"{"type":"resume","cursor":7}"#).unwrap();
        assert_eq!(frame, ClientFrame::Unknown);
        assert_eq!(frame.kind(), "unknown");
        assert!(frame.into_filter().is_none());
    }

    #[test]
    fn malformed_is_protocol_error() {
        assert_matches!(ClientFrame::parse("not json"), Err(ProtocolError::Malformed(_)));
        assert_matches!(ClientFrame::parse(r#"{"no_type":1}"#), Err(ProtocolError::Malformed(_)));
        assert_matches!(
            ClientFrame::parse(r#"{"type":"subscribe","agents":["weather_oracle"]}"#),
            Err(ProtocolError::Malformed(_))
        );
    }

    #[test]
    fn binary_frames() {
        assert_eq!(ClientFrame::parse_bytes(br#"{"type":"pong"}"#).unwrap(), ClientFrame::Pong);
        assert_matches!(
            ClientFrame::parse_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::NonUtf8(2))
        );
    }
}
