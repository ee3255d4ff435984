//! Chat event model and inbound unit parsing.
//!
//! Events are JSON objects discriminated by a `type` tag. The service never
//! looks inside chat content; it only needs the tag, the routing fields
//! (`roomId`, `action`) and enough identity to log sensibly.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Room identifier as assigned by the persistence store.
pub type RoomId = i64;

/// User identifier as assigned by the identity provider.
pub type UserId = i64;

/// An encoded event, shared between every connection queue it is pushed to.
pub type Payload = Arc<str>;

/// Serialize a value once into a shareable [`Payload`].
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Payload> {
    Ok(Arc::from(serde_json::to_string(value)?))
}

/// Event discriminator carried in the `type` field.
///
/// Unknown tags are preserved verbatim in [`EventKind::Other`] so that
/// forwarding never rewrites what a client sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A new chat message.
    Message,
    /// A sticker message; content is the sticker reference.
    Stamp,
    /// A message retracted in place (tombstone kept in the room).
    Deleted,
    /// A message removed outright; not tied to one room.
    Delete,
    /// A presence envelope (`enter` / `leave`).
    Presence,
    /// A read receipt relayed between viewers of one room.
    Read,
    /// Client keepalive.
    Ping,
    /// Any other tag.
    Other(String),
}

impl EventKind {
    /// Wire representation of the tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Stamp => "stamp",
            Self::Deleted => "deleted",
            Self::Delete => "delete",
            Self::Presence => "presence",
            Self::Read => "read",
            Self::Ping => "ping",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        match tag {
            "message" => Self::Message,
            "stamp" => Self::Stamp,
            "deleted" => Self::Deleted,
            "delete" => Self::Delete,
            "presence" => Self::Presence,
            "read" => Self::Read,
            "ping" => Self::Ping,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence action carried by `presence` events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PresenceAction {
    /// The user is now viewing the room.
    Enter,
    /// The user stopped viewing the room.
    Leave,
    /// Anything else; logged and ignored by the tracker.
    Other(String),
}

impl PresenceAction {
    /// Wire representation of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::Other(action) => action,
        }
    }
}

impl From<&str> for PresenceAction {
    fn from(action: &str) -> Self {
        match action {
            "enter" => Self::Enter,
            "leave" => Self::Leave,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for PresenceAction {
    fn from(action: String) -> Self {
        Self::from(action.as_str())
    }
}

impl From<PresenceAction> for String {
    fn from(action: PresenceAction) -> Self {
        match action {
            PresenceAction::Other(action) => action,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for PresenceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoted message a reply refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTo {
    /// Display name of the quoted sender.
    pub name: String,
    /// Quoted text.
    pub text: String,
    /// Idempotency token of the quoted message.
    #[serde(alias = "client_id")]
    pub client_id: String,
}

/// A chat event as pushed to connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Store-assigned message id, when the event describes a stored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Room the event belongs to; absent for global events.
    #[serde(default, alias = "room_id", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    /// Presence action, for `presence` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<PresenceAction>,
    /// Client-supplied idempotency token.
    #[serde(default, alias = "client_id", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Originating user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Originating user's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Kind-specific text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Attachment references (file names or sticker ids).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Quoted message, for replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

impl ChatEvent {
    fn bare(kind: EventKind) -> Self {
        Self {
            kind,
            id: None,
            room_id: None,
            action: None,
            client_id: None,
            sender_id: None,
            sender_name: None,
            content: None,
            attachments: Vec::new(),
            reply_to: None,
        }
    }

    /// A new chat message in `room_id`.
    pub fn message(
        room_id: RoomId,
        client_id: impl Into<String>,
        sender_id: UserId,
        sender_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            room_id: Some(room_id),
            client_id: Some(client_id.into()),
            sender_id: Some(sender_id),
            sender_name: Some(sender_name.into()),
            content: Some(content.into()),
            ..Self::bare(EventKind::Message)
        }
    }

    /// A retraction notice for a message in `room_id`.
    pub fn deleted(
        room_id: RoomId,
        client_id: impl Into<String>,
        sender_id: UserId,
        sender_name: impl Into<String>,
    ) -> Self {
        let sender_name = sender_name.into();
        Self {
            room_id: Some(room_id),
            client_id: Some(client_id.into()),
            sender_id: Some(sender_id),
            content: Some(format!("{} retracted a message", sender_name)),
            sender_name: Some(sender_name),
            ..Self::bare(EventKind::Deleted)
        }
    }

    /// A hard delete, visible from any room.
    pub fn delete(
        client_id: impl Into<String>,
        sender_id: UserId,
        sender_name: impl Into<String>,
    ) -> Self {
        Self {
            client_id: Some(client_id.into()),
            sender_id: Some(sender_id),
            sender_name: Some(sender_name.into()),
            ..Self::bare(EventKind::Delete)
        }
    }

    /// A presence envelope for `user_id` in `room_id`.
    pub fn presence(room_id: RoomId, action: PresenceAction, user_id: UserId) -> Self {
        Self {
            room_id: Some(room_id),
            action: Some(action),
            sender_id: Some(user_id),
            ..Self::bare(EventKind::Presence)
        }
    }

    /// Attach a quoted message.
    pub fn with_reply(mut self, reply_to: ReplyTo) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    /// Attach file or sticker references.
    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Check the fields the event kind requires.
    pub fn validate(&self) -> Result<()> {
        let required: &[&'static str] = match self.kind {
            EventKind::Message | EventKind::Stamp | EventKind::Deleted => &["roomId", "clientId"],
            EventKind::Delete => &["clientId"],
            EventKind::Presence => &["roomId", "action"],
            EventKind::Read => &["roomId"],
            EventKind::Ping | EventKind::Other(_) => &[],
        };

        for &field in required {
            if !self.has_field(field) {
                return Err(ProtocolError::MissingField {
                    kind: self.kind.to_string(),
                    field,
                });
            }
        }

        match self.room_id {
            Some(room_id) if room_id <= 0 => Err(ProtocolError::InvalidField {
                field: "roomId",
                value: room_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn has_field(&self, field: &str) -> bool {
        match field {
            "roomId" => self.room_id.is_some(),
            "clientId" => self.client_id.as_deref().is_some_and(|id| !id.is_empty()),
            "action" => self.action.is_some(),
            _ => true,
        }
    }
}

/// A presence request extracted from an inbound unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRequest {
    /// Room the request targets.
    pub room_id: RoomId,
    /// Requested action, if the unit carried one as a string.
    pub action: Option<PresenceAction>,
}

impl PresenceRequest {
    fn from_fields(fields: &Map<String, Value>) -> Result<Self> {
        let room = fields
            .get("roomId")
            .or_else(|| fields.get("room_id"))
            .ok_or_else(|| ProtocolError::MissingField {
                kind: EventKind::Presence.to_string(),
                field: "roomId",
            })?;

        let room_id = room_id_from_value(room)
            .filter(|id| *id > 0)
            .ok_or_else(|| ProtocolError::InvalidField {
                field: "roomId",
                value: room.to_string(),
            })?;

        let action = fields
            .get("action")
            .and_then(Value::as_str)
            .map(PresenceAction::from);

        Ok(Self { room_id, action })
    }
}

/// Browsers send numbers as doubles; accept any integral value.
fn room_id_from_value(value: &Value) -> Option<RoomId> {
    let number = value.as_number()?;
    if let Some(id) = number.as_i64() {
        return Some(id);
    }
    let float = number.as_f64()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        Some(float as i64)
    } else {
        None
    }
}

/// One unit received from a client connection.
///
/// The raw text is kept so it can be forwarded verbatim once the unit has
/// been accepted.
#[derive(Debug, Clone)]
pub struct InboundUnit {
    kind: Option<EventKind>,
    presence: Option<PresenceRequest>,
    raw: Payload,
}

impl InboundUnit {
    /// Parse a raw unit. Must be a JSON object; `presence` units must carry
    /// an integral `roomId`.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = fields
            .get("type")
            .and_then(Value::as_str)
            .map(EventKind::from);

        let presence = match kind {
            Some(EventKind::Presence) => Some(PresenceRequest::from_fields(&fields)?),
            _ => None,
        };

        Ok(Self {
            kind,
            presence,
            raw: Arc::from(raw),
        })
    }

    /// The unit's `type` tag, if it had a string one.
    pub fn kind(&self) -> Option<&EventKind> {
        self.kind.as_ref()
    }

    /// The presence request, for `presence` units.
    pub fn presence(&self) -> Option<&PresenceRequest> {
        self.presence.as_ref()
    }

    /// The unit exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Take the raw text as a forwardable payload.
    pub fn into_payload(self) -> Payload {
        self.raw
    }
}
