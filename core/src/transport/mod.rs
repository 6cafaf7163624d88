/// Transport seam to the room service
///
/// The core never talks to a network itself. A [`RoomTransport`]
/// implementation supplies history backfill, the two send primitives and
/// the live event feed; the real client plugs the federated messenger in
/// here, the demo and tests use [`LoopbackRoom`].
pub mod loopback;

pub use loopback::LoopbackRoom;

use crate::error::Result;
use crate::message::{Role, SenderInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One message from the room's history backfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    /// Milliseconds since the epoch
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
}

/// One live event pushed from the room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    /// Missing content is tolerated and treated as empty text
    pub content: Option<String>,
    pub sender_external_id: String,
    pub room_id: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
}

#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Fetch up to `limit` most recent messages, oldest first
    async fn fetch_history(&self, room_id: &str, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Plain text send, the fallback mirror path
    async fn send(&self, room_id: &str, text: &str) -> Result<()>;

    /// Annotated send used for the primary mirror attempt
    async fn send_annotated(
        &self,
        room_id: &str,
        text: &str,
        kind: &str,
        metadata: serde_json::Value,
    ) -> Result<()>;

    /// Live event feed; dropping the receiver unsubscribes
    fn subscribe_inbound(&self) -> broadcast::Receiver<RoomEvent>;
}
