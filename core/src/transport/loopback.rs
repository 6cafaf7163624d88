/// In-process room used by the demo binary and tests
use super::{HistoryEntry, RoomEvent, RoomTransport};
use crate::error::Result;
use crate::message::{Role, SenderInfo};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A process-local stand-in for the room service. Own sends land in the
/// room history but are never replayed to our own event feed, matching
/// how the real service treats the sending device.
pub struct LoopbackRoom {
    rooms: Arc<RwLock<HashMap<String, Vec<HistoryEntry>>>>,
    events: broadcast::Sender<RoomEvent>,
}

impl LoopbackRoom {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Record a collaborator message and push it to live subscribers
    pub async fn post_as(
        &self,
        room_id: &str,
        external_id: &str,
        display_name: Option<&str>,
        text: &str,
    ) {
        let mut sender = SenderInfo::new(external_id);
        if let Some(name) = display_name {
            sender = sender.with_display_name(name);
        }
        let timestamp_ms = Utc::now().timestamp_millis();

        {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room_id.to_string())
                .or_default()
                .push(HistoryEntry {
                    role: Role::User,
                    content: text.to_string(),
                    timestamp_ms,
                    sender: Some(sender.clone()),
                });
        }

        let _ = self.events.send(RoomEvent {
            content: Some(text.to_string()),
            sender_external_id: external_id.to_string(),
            room_id: room_id.to_string(),
            timestamp_ms,
            sender: Some(sender),
        });
    }

    /// Pre-seed history, for bootstrap scenarios
    pub async fn seed_history(&self, room_id: &str, entries: Vec<HistoryEntry>) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .extend(entries);
    }

    async fn record(&self, room_id: &str, text: &str) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .push(HistoryEntry {
                role: Role::Assistant,
                content: text.to_string(),
                timestamp_ms: Utc::now().timestamp_millis(),
                sender: None,
            });
    }
}

impl Default for LoopbackRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LoopbackRoom {
    fn clone(&self) -> Self {
        Self {
            rooms: self.rooms.clone(),
            events: self.events.clone(),
        }
    }
}

#[async_trait]
impl RoomTransport for LoopbackRoom {
    async fn fetch_history(&self, room_id: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rooms = self.rooms.read().await;
        let entries = rooms.get(room_id).cloned().unwrap_or_default();
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }

    async fn send(&self, room_id: &str, text: &str) -> Result<()> {
        debug!("Loopback send to {}", room_id);
        self.record(room_id, text).await;
        Ok(())
    }

    async fn send_annotated(
        &self,
        room_id: &str,
        text: &str,
        kind: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        debug!("Loopback annotated send ({}) to {}: {}", kind, room_id, metadata);
        self.record(room_id, text).await;
        Ok(())
    }

    fn subscribe_inbound(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_history_respects_limit() {
        let room = LoopbackRoom::new();
        for i in 0..5 {
            room.post_as("demo", "bob@remote", None, &format!("msg {}", i))
                .await;
        }

        let entries = room.fetch_history("demo", 3).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].content, "msg 2");
        assert_eq!(entries[2].content, "msg 4");
    }

    #[tokio::test]
    async fn test_fetch_history_unknown_room_is_empty() {
        let room = LoopbackRoom::new();
        let entries = room.fetch_history("nowhere", 10).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_post_as_reaches_subscribers_but_send_does_not() {
        let room = LoopbackRoom::new();
        let mut inbound = room.subscribe_inbound();

        room.send("demo", "our own reply").await.unwrap();
        room.post_as("demo", "bob@remote", Some("Bob"), "hi there")
            .await;

        let event = inbound.recv().await.unwrap();
        assert_eq!(event.sender_external_id, "bob@remote");
        assert_eq!(event.content.as_deref(), Some("hi there"));
        assert!(inbound.try_recv().is_err());

        let entries = room.fetch_history("demo", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
