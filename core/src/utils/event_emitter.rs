/// Session event fan-out for UI consumers
use crate::message::Source;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 128;

/// Events a UI can watch alongside transcript snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// New messages were accepted into the transcript
    TranscriptUpdated { source: Source, accepted: usize },
    /// A local assistant reply was armed for mirroring
    MirrorScheduled { message_id: String },
    /// A reply was echoed into the room
    MessageMirrored { message_id: String },
    /// Both send attempts failed; the reply stays unsynced
    MirrorFailed { message_id: String },
}

pub struct EventEmitter {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emit to whoever is listening; no subscribers is fine
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
