/// Session controller
///
/// Owns the transcript and wires the three message sources into it:
/// local appends from the UI, the room history backfill at startup, and
/// live room events while the session runs. When a room is configured it
/// also runs the outbound mirror scheduler.
use crate::config::Config;
use crate::error::{AtriumError, Result};
use crate::message::{Message, Role, SenderInfo, Source};
use crate::mirror::MirrorScheduler;
use crate::transcript::{MergeReport, Transcript};
use crate::transport::{RoomEvent, RoomTransport};
use crate::utils::event_emitter::{EventEmitter, SessionEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Session {
    config: Config,
    transport: Arc<dyn RoomTransport>,
    transcript: Arc<RwLock<Transcript>>,
    scheduler: Option<MirrorScheduler>,
    events: EventEmitter,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session with an empty transcript
    pub fn new(config: Config, transport: Arc<dyn RoomTransport>) -> Self {
        let events = EventEmitter::new();
        let transcript = Arc::new(RwLock::new(Transcript::new(config.dedup_window_secs)));
        let scheduler = config.room_id.as_ref().map(|room_id| {
            MirrorScheduler::new(
                room_id.clone(),
                config.local_user_id.clone(),
                config.quiescence_delay,
                transport.clone(),
                transcript.clone(),
                events.clone(),
            )
        });

        Self {
            config,
            transport,
            transcript,
            scheduler,
            events,
            inbound_task: Mutex::new(None),
        }
    }

    /// Create a session seeded with a previously saved local transcript
    pub async fn resume(
        config: Config,
        transport: Arc<dyn RoomTransport>,
        messages: Vec<Message>,
    ) -> Self {
        let session = Self::new(config, transport);
        let report = session.merge(messages, Source::Local).await;
        debug!("Resumed {} local messages", report.accepted.len());
        session
    }

    /// Bootstrap: backfill room history, then subscribe to live events.
    /// A failed backfill downgrades to an empty start, never an error.
    pub async fn start(&self) -> Result<()> {
        let Some(room_id) = self.config.room_id.clone() else {
            info!("Session started without a room; mirroring disabled");
            return Ok(());
        };

        {
            let mut inbound_task = self.inbound_task.lock().await;
            if inbound_task.is_some() {
                return Err(AtriumError::Session("session already started".to_string()));
            }

            info!("Starting collaborative session in room {}", room_id);

            match self
                .transport
                .fetch_history(&room_id, self.config.history_limit)
                .await
            {
                Ok(entries) => {
                    let total = entries.len();
                    let candidates: Vec<Message> = entries
                        .into_iter()
                        .map(|e| Message::from_history(e.role, &e.content, e.timestamp_ms, e.sender))
                        .collect();
                    let report = self.merge(candidates, Source::RemoteHistory).await;
                    info!("Backfilled {} of {} history entries", report.accepted.len(), total);
                }
                Err(e) => {
                    // The room may be unreachable or not joined yet; the
                    // session still works locally
                    warn!("History fetch for room {} failed: {}", room_id, e);
                }
            }

            let mut inbound = self.transport.subscribe_inbound();
            let transcript = self.transcript.clone();
            let scheduler = self.scheduler.clone();
            let events = self.events.clone();
            let handle = tokio::spawn(async move {
                loop {
                    match inbound.recv().await {
                        Ok(event) => {
                            if event.room_id != room_id {
                                continue;
                            }
                            let message = live_message(event);
                            merge_into(
                                &transcript,
                                scheduler.as_ref(),
                                &events,
                                vec![message],
                                Source::RemoteLive,
                            )
                            .await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Inbound event feed lagged, skipped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                debug!("Inbound event loop ended");
            });
            *inbound_task = Some(handle);
        }

        Ok(())
    }

    /// Append a locally created message
    pub async fn append_local(&self, message: Message) -> MergeReport {
        self.merge(vec![message], Source::Local).await
    }

    /// Append the user's own input
    pub async fn append_user(&self, text: impl Into<String>) -> Message {
        let message = Message::user().with_text(text);
        self.append_local(message.clone()).await;
        message
    }

    /// Append an assistant reply produced on this client
    pub async fn append_assistant(&self, text: impl Into<String>) -> Message {
        let message = Message::assistant().with_text(text);
        self.append_local(message.clone()).await;
        message
    }

    /// Snapshot of the transcript in display order
    pub async fn transcript(&self) -> Vec<Message> {
        self.transcript.read().await.messages().to_vec()
    }

    /// True once the given message has been echoed to the room
    pub async fn is_mirrored(&self, message_id: &str) -> bool {
        self.transcript.read().await.is_synced(message_id)
    }

    /// Subscribe to session events
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_collaborating(&self) -> bool {
        self.config.room_id.is_some()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.config.room_id.as_deref()
    }

    /// Tear down: drop any pending mirror and leave the live feed
    pub async fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel().await;
        }
        if let Some(task) = self.inbound_task.lock().await.take() {
            task.abort();
        }
        info!("Session stopped");
    }

    async fn merge(&self, candidates: Vec<Message>, source: Source) -> MergeReport {
        merge_into(
            &self.transcript,
            self.scheduler.as_ref(),
            &self.events,
            candidates,
            source,
        )
        .await
    }
}

/// Merge candidates and poke the scheduler when the tail moved
async fn merge_into(
    transcript: &Arc<RwLock<Transcript>>,
    scheduler: Option<&MirrorScheduler>,
    events: &EventEmitter,
    candidates: Vec<Message>,
    source: Source,
) -> MergeReport {
    let report = {
        let mut transcript = transcript.write().await;
        transcript.merge(candidates, source)
    };

    if !report.accepted.is_empty() {
        events.emit(SessionEvent::TranscriptUpdated {
            source,
            accepted: report.accepted.len(),
        });
    }
    if report.last_changed {
        if let Some(scheduler) = scheduler {
            scheduler.evaluate().await;
        }
    }
    report
}

/// Turn a live room event into a transcript candidate. Events carry no
/// role; everything pushed live is collaborator speech.
fn live_message(event: RoomEvent) -> Message {
    let text = event.content.unwrap_or_default();
    let sender = event
        .sender
        .unwrap_or_else(|| SenderInfo::new(event.sender_external_id.clone()));
    Message::live(Role::User, &text, event.timestamp_ms).with_sender(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_message_defaults_missing_content_to_empty() {
        let event = RoomEvent {
            content: None,
            sender_external_id: "bob@remote".to_string(),
            room_id: "room-1".to_string(),
            timestamp_ms: 1_700_000_000_500,
            sender: None,
        };

        let message = live_message(event);
        assert_eq!(message.role, Role::User);
        assert_eq!(message.concat_text(), "");
        assert_eq!(message.created, 1_700_000_000);
        assert_eq!(message.origin, Source::RemoteLive);
        assert_eq!(
            message.sender.map(|s| s.external_id),
            Some("bob@remote".to_string())
        );
    }

    #[test]
    fn test_live_message_keeps_sender_info() {
        let event = RoomEvent {
            content: Some("hi".to_string()),
            sender_external_id: "bob@remote".to_string(),
            room_id: "room-1".to_string(),
            timestamp_ms: 1_700_000_000_000,
            sender: Some(SenderInfo::new("bob@remote").with_display_name("Bob")),
        };

        let message = live_message(event);
        assert_eq!(
            message.sender.and_then(|s| s.display_name),
            Some("Bob".to_string())
        );
    }
}
