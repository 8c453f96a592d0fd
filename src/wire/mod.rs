//! Envelope shapes exchanged with the client, and the topic namespace.
//!
//! All engine topics live under `dv:*`; `dv:c:<route>` is reserved for
//! view sessions. User channels may not register under `dv:*`.

pub mod url;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::Limits;

pub const VIEW_TOPIC_PREFIX: &str = "dv:c:";
pub const RESERVED_PREFIX: &str = "dv:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("topic {topic:?} is not a view topic (expected dv:c:<route>)")]
    InvalidTopic { topic: String },
    #[error("topic exceeds {max_len} bytes")]
    TopicTooLong { max_len: usize },
    #[error("unrecognized envelope shape")]
    UnrecognizedEnvelope,
}

/// A view-session topic, `dv:c:<route>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Topic(String);

impl Topic {
    pub fn parse(raw: &str, limits: &Limits) -> Result<Self, WireError> {
        if raw.len() > limits.max_topic_len {
            return Err(WireError::TopicTooLong {
                max_len: limits.max_topic_len,
            });
        }
        match raw.strip_prefix(VIEW_TOPIC_PREFIX) {
            Some(route) if !route.is_empty() => Ok(Self(raw.to_string())),
            _ => Err(WireError::InvalidTopic {
                topic: raw.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The route component after the `dv:c:` prefix.
    pub fn route(&self) -> &str {
        &self.0[VIEW_TOPIC_PREFIX.len()..]
    }

    /// Whether a channel pattern falls in the reserved engine namespace.
    pub fn is_reserved(pattern: &str) -> bool {
        pattern == "dv" || pattern.starts_with(RESERVED_PREFIX)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn empty_object() -> Value {
    json!({})
}

/// Join payload: optional test-attribution `caller` plus user params `p`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JoinParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<Value>,
    pub p: Value,
}

impl Default for JoinParams {
    fn default() -> Self {
        Self {
            caller: None,
            p: empty_object(),
        }
    }
}

/// Payload of a client event envelope: `{e: name, p: payload}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    pub e: String,
    #[serde(default = "empty_object")]
    pub p: Value,
}

// Typed discriminants so untagged envelope enums stay unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
enum ClientEventTag {
    #[default]
    #[serde(rename = "e")]
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
enum LeaveTag {
    #[default]
    #[serde(rename = "phx_leave")]
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
enum PatchTag {
    #[default]
    #[serde(rename = "o")]
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
enum RedirectTag {
    #[default]
    #[serde(rename = "redirect")]
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
enum CloseTag {
    #[default]
    #[serde(rename = "phx_close")]
    Close,
}

/// Client → server envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClientEnvelope {
    Leave(LeaveFrame),
    Event(ClientEventFrame),
}

impl ClientEnvelope {
    pub fn event(
        name: impl Into<String>,
        payload: Value,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Self {
        Self::Event(ClientEventFrame {
            event: ClientEventTag::Event,
            payload: EventPayload {
                e: name.into(),
                p: payload,
            },
            msg_ref,
            join_ref,
        })
    }

    pub fn leave() -> Self {
        Self::Leave(LeaveFrame {
            event: LeaveTag::Leave,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientEventFrame {
    event: ClientEventTag,
    pub payload: EventPayload,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaveFrame {
    event: LeaveTag,
}

/// Patch envelope payload: compressed ops `o`, cycle counter `c`, and the
/// optional flash delta `f`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchPayload {
    pub o: Vec<Value>,
    pub c: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchFrame {
    event: PatchTag,
    pub payload: PatchPayload,
}

/// Redirect opts: a validated local path or an external URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RedirectPayload {
    Local { to: String },
    External { external: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RedirectFrame {
    event: RedirectTag,
    pub payload: RedirectPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloseFrame {
    event: CloseTag,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyFrame {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
    pub topic: String,
    pub status: ReplyStatus,
    pub payload: Value,
}

/// A user push-event: the name is an opaque string (the client prefixes
/// `phx:` when bridging to window events).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFrame {
    pub event: String,
    pub payload: Value,
}

/// Server → client envelopes.
///
/// Untagged with typed discriminants; the user-event frame is last so it
/// only catches envelopes no reserved shape claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ServerEnvelope {
    Patch(PatchFrame),
    Redirect(RedirectFrame),
    Close(CloseFrame),
    Reply(ReplyFrame),
    Event(EventFrame),
}

impl ServerEnvelope {
    pub fn patch(payload: PatchPayload) -> Self {
        Self::Patch(PatchFrame {
            event: PatchTag::Patch,
            payload,
        })
    }

    pub fn redirect(payload: RedirectPayload) -> Self {
        Self::Redirect(RedirectFrame {
            event: RedirectTag::Redirect,
            payload,
        })
    }

    pub fn close(topic: &Topic) -> Self {
        Self::Close(CloseFrame {
            event: CloseTag::Close,
            topic: topic.as_str().to_string(),
        })
    }

    pub fn reply(
        msg_ref: Option<String>,
        join_ref: Option<String>,
        topic: &Topic,
        status: ReplyStatus,
        payload: Value,
    ) -> Self {
        Self::Reply(ReplyFrame {
            msg_ref,
            join_ref,
            topic: topic.as_str().to_string(),
            status,
            payload,
        })
    }

    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self::Event(EventFrame {
            event: name.into(),
            payload,
        })
    }
}
