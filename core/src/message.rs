/// Conversation message model
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix shared by all ids derived from room traffic
pub const REMOTE_ID_PREFIX: &str = "remote_";

/// How many leading characters of content feed a derived id
const ID_CONTENT_HEAD: usize = 50;

/// Role of a message in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Lowercase name, also used inside derived ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Which path a message entered the transcript through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Created on this client (user input, assistant output, resume)
    Local,
    /// Backfilled from the room history at bootstrap
    RemoteHistory,
    /// Pushed by the room while the session is live
    RemoteLive,
}

/// One piece of message content; only text participates in matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
}

/// Identity of the collaborator a message came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl SenderInfo {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: None,
            avatar_ref: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A single transcript message
///
/// Messages are value objects: once merged into a transcript their id,
/// role and content never change. Ordering is by `created` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Seconds since the epoch
    pub created: i64,
    /// Present when the message came from a remote collaborator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
    pub origin: Source,
}

impl Message {
    /// New locally authored user message
    pub fn user() -> Self {
        Self::local(Role::User)
    }

    /// New locally authored assistant message
    pub fn assistant() -> Self {
        Self::local(Role::Assistant)
    }

    fn local(role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: Vec::new(),
            created: Utc::now().timestamp(),
            sender: None,
            origin: Source::Local,
        }
    }

    /// Message rebuilt from one room history entry. The id is derived
    /// deterministically so a later re-fetch of the same entry produces
    /// the same id.
    pub fn from_history(
        role: Role,
        content: &str,
        timestamp_ms: i64,
        sender: Option<SenderInfo>,
    ) -> Self {
        Self {
            id: historical_id(timestamp_ms, role, content),
            role,
            content: vec![ContentPart::Text {
                text: content.to_string(),
            }],
            created: timestamp_ms / 1000,
            sender,
            origin: Source::RemoteHistory,
        }
    }

    /// Message built from a live room event. Live ids carry a random
    /// suffix; nothing ever re-derives them.
    pub fn live(role: Role, content: &str, timestamp_ms: i64) -> Self {
        Self {
            id: live_id(role),
            role,
            content: vec![ContentPart::Text {
                text: content.to_string(),
            }],
            created: timestamp_ms / 1000,
            sender: None,
            origin: Source::RemoteLive,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(ContentPart::Text { text: text.into() });
        self
    }

    pub fn with_created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    pub fn with_sender(mut self, sender: SenderInfo) -> Self {
        self.sender = Some(sender);
        self
    }

    /// All text parts joined together, the form content matching runs on
    pub fn concat_text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True for messages that entered through the room rather than
    /// being authored on this client
    pub fn is_remote_origin(&self) -> bool {
        self.origin != Source::Local
    }
}

/// Deterministic id for a history entry
pub fn historical_id(timestamp_ms: i64, role: Role, content: &str) -> String {
    format!(
        "{}{}_{}_{}",
        REMOTE_ID_PREFIX,
        timestamp_ms,
        role.as_str(),
        sanitize_head(content)
    )
}

/// Unique id for a live event
pub fn live_id(role: Role) -> String {
    let suffix: u32 = rand::random();
    format!(
        "{}{}_{}_{:08x}",
        REMOTE_ID_PREFIX,
        Utc::now().timestamp_millis(),
        role.as_str(),
        suffix
    )
}

/// First characters of content with everything but ASCII alphanumerics
/// stripped, so ids survive any id-unfriendly characters
fn sanitize_head(content: &str) -> String {
    content
        .chars()
        .take(ID_CONTENT_HEAD)
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_id_deterministic() {
        let a = historical_id(1700000000123, Role::User, "Hello, world!");
        let b = historical_id(1700000000123, Role::User, "Hello, world!");
        assert_eq!(a, b);
        assert_eq!(a, "remote_1700000000123_user_Helloworld");
    }

    #[test]
    fn test_historical_id_strips_special_characters() {
        let id = historical_id(1000, Role::Assistant, "¿Qué? 42 — ok!");
        assert_eq!(id, "remote_1000_assistant_Qu42ok");
    }

    #[test]
    fn test_historical_id_truncates_content() {
        let long = "a".repeat(200);
        let id = historical_id(1000, Role::User, &long);
        assert_eq!(id, format!("remote_1000_user_{}", "a".repeat(50)));
    }

    #[test]
    fn test_live_ids_are_unique() {
        let a = live_id(Role::User);
        let b = live_id(Role::User);
        assert!(a.starts_with(REMOTE_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_history_converts_timestamp() {
        let message = Message::from_history(Role::User, "hi", 1700000000999, None);
        assert_eq!(message.created, 1700000000);
        assert_eq!(message.origin, Source::RemoteHistory);
        assert!(message.is_remote_origin());
    }

    #[test]
    fn test_local_builders() {
        let message = Message::assistant().with_text("answer");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.origin, Source::Local);
        assert!(message.sender.is_none());
        assert!(!message.is_remote_origin());
        assert_eq!(message.concat_text(), "answer");
    }

    #[test]
    fn test_concat_text_joins_parts() {
        let mut message = Message::user().with_text("first");
        message.content.push(ContentPart::Text {
            text: "second".to_string(),
        });
        assert_eq!(message.concat_text(), "first\nsecond");
    }

    #[test]
    fn test_message_serialization_round_trip() {
        let message = Message::from_history(
            Role::Assistant,
            "hello",
            1700000000000,
            Some(SenderInfo::new("bob@remote").with_display_name("Bob")),
        );
        let json = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, back);
        assert!(json.contains("\"remote_history\""));
    }
}
