use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::SessionView;

const ALL_TOPIC: &str = "all";

/// Broadcast address: the session list, or one session by code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Session(String),
}

impl Topic {
    pub fn session(code: impl Into<String>) -> Self {
        Topic::Session(code.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Topic::All => ALL_TOPIC,
            Topic::Session(code) => code,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Topic {
    fn from(raw: &str) -> Self {
        if raw == ALL_TOPIC {
            Topic::All
        } else {
            Topic::Session(raw.to_string())
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Topic::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Refresh signal for session-list viewers; carries no payload
    ListChanged,
    SessionChanged,
}

/// Frame pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub target: Topic,
    pub payload: Option<SessionView>,
}

impl Notification {
    pub fn list_changed() -> Self {
        Self {
            kind: NotificationKind::ListChanged,
            target: Topic::All,
            payload: None,
        }
    }

    pub fn session_changed(view: SessionView) -> Self {
        Self {
            kind: NotificationKind::SessionChanged,
            target: Topic::session(view.code.clone()),
            payload: Some(view),
        }
    }
}

/// Inbound control frame from a viewer. Anything that fails to parse,
/// unknown actions included, is dropped by the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ViewerControl {
    SubscribeAll,
    #[serde(rename_all = "camelCase")]
    SubscribeSession {
        session_code: String,
    },
    #[serde(rename_all = "camelCase")]
    UnsubscribeSession {
        session_code: String,
    },
}

impl ViewerControl {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
