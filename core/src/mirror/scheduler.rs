/// Outbound mirror scheduler
///
/// Echoes locally generated assistant replies into the room, at most once
/// per reply, after a quiescence delay that lets streamed content settle.
/// Arming is generation-tagged: re-arming or cancelling invalidates any
/// outstanding timer, and the timer re-checks the transcript before it
/// touches the transport, so a stale timer can never send superseded
/// content.
use crate::message::Role;
use crate::transcript::Transcript;
use crate::transport::RoomTransport;
use crate::utils::event_emitter::{EventEmitter, SessionEvent};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Annotation kind attached to primary mirror sends
pub const MIRROR_KIND: &str = "assistant_reply";

/// Tail message that currently qualifies for mirroring
struct MirrorCandidate {
    message_id: String,
    content: String,
    prompted_by: String,
}

/// One armed deferred send
#[derive(Debug, Clone)]
struct PendingMirror {
    message_id: String,
    content: String,
    prompted_by: String,
    generation: u64,
}

#[derive(Default)]
struct SchedulerState {
    generation: u64,
    pending: Option<PendingMirror>,
    timer: Option<JoinHandle<()>>,
    /// Content last armed or successfully mirrored, per message id
    last_content: HashMap<String, String>,
}

pub struct MirrorScheduler {
    room_id: String,
    local_user_id: String,
    delay: Duration,
    transport: Arc<dyn RoomTransport>,
    transcript: Arc<RwLock<Transcript>>,
    events: EventEmitter,
    state: Arc<Mutex<SchedulerState>>,
}

impl MirrorScheduler {
    pub fn new(
        room_id: String,
        local_user_id: String,
        delay: Duration,
        transport: Arc<dyn RoomTransport>,
        transcript: Arc<RwLock<Transcript>>,
        events: EventEmitter,
    ) -> Self {
        Self {
            room_id,
            local_user_id,
            delay,
            transport,
            transcript,
            events,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Re-assess the transcript tail and arm, re-arm or do nothing.
    /// Called whenever the last message of the transcript changes.
    pub async fn evaluate(&self) {
        let candidate = {
            let transcript = self.transcript.read().await;
            match self.eligible_tail(&transcript) {
                Some(candidate) => candidate,
                None => return,
            }
        };

        let mut state = self.state.lock().await;
        if state.last_content.get(&candidate.message_id) == Some(&candidate.content) {
            // Already armed or already mirrored with this exact content
            return;
        }

        // One deferred send per transcript: whatever was armed is stale now
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        state
            .last_content
            .insert(candidate.message_id.clone(), candidate.content.clone());
        state.pending = Some(PendingMirror {
            message_id: candidate.message_id.clone(),
            content: candidate.content,
            prompted_by: candidate.prompted_by,
            generation,
        });

        debug!(
            "Mirror armed for message {} (generation {})",
            candidate.message_id, generation
        );
        self.events.emit(SessionEvent::MirrorScheduled {
            message_id: candidate.message_id,
        });

        let scheduler = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.delay).await;
            scheduler.fire(generation).await;
        }));
    }

    /// Drop any armed mirror; used on session teardown
    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.pending.take().is_some() {
            debug!("Pending mirror cancelled");
        }
    }

    /// Eligibility rules for the current tail message
    fn eligible_tail(&self, transcript: &Transcript) -> Option<MirrorCandidate> {
        let last = transcript.last()?;
        if last.role != Role::Assistant {
            return None;
        }
        if last.is_remote_origin() {
            // Never re-broadcast something the room already has
            return None;
        }
        if transcript.is_synced(&last.id) {
            return None;
        }

        // Only answers to our own question leave this client. A reply
        // with no preceding question at all (a greeting) counts as ours.
        let prompted_by = match transcript.preceding_user_message(&last.id) {
            Some(asker) => match &asker.sender {
                Some(sender) if sender.external_id != self.local_user_id => {
                    debug!(
                        "Not mirroring {}: it answers {}'s question",
                        last.id, sender.external_id
                    );
                    return None;
                }
                Some(sender) => sender.external_id.clone(),
                None => self.local_user_id.clone(),
            },
            None => self.local_user_id.clone(),
        };

        Some(MirrorCandidate {
            message_id: last.id.clone(),
            content: last.concat_text(),
            prompted_by,
        })
    }

    /// Timer body: re-check that the armed reply is still current, then send
    async fn fire(&self, generation: u64) {
        let pending = {
            let state = self.state.lock().await;
            match &state.pending {
                Some(p) if p.generation == generation => p.clone(),
                _ => return,
            }
        };

        let still_current = {
            let transcript = self.transcript.read().await;
            !transcript.is_synced(&pending.message_id)
                && transcript
                    .last()
                    .map(|m| m.id == pending.message_id && m.concat_text() == pending.content)
                    .unwrap_or(false)
        };
        if !still_current {
            debug!("Mirror for {} superseded before send", pending.message_id);
            self.clear_if_current(generation).await;
            return;
        }

        info!(
            "Mirroring message {} to room {}",
            pending.message_id, self.room_id
        );
        let metadata = json!({
            "local_message_id": pending.message_id,
            "prompted_by": pending.prompted_by,
        });

        let sent = match self
            .transport
            .send_annotated(&self.room_id, &pending.content, MIRROR_KIND, metadata)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Annotated send failed for {}: {}; retrying as plain text",
                    pending.message_id, e
                );
                match self.transport.send(&self.room_id, &pending.content).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Plain send failed for {}: {}", pending.message_id, e);
                        false
                    }
                }
            }
        };

        if sent {
            {
                let mut transcript = self.transcript.write().await;
                transcript.mark_synced(&pending.message_id);
            }
            let mut state = self.state.lock().await;
            state
                .last_content
                .insert(pending.message_id.clone(), pending.content.clone());
            if state.pending.as_ref().map(|p| p.generation) == Some(generation) {
                state.pending = None;
                state.timer = None;
            }
            drop(state);
            self.events.emit(SessionEvent::MessageMirrored {
                message_id: pending.message_id,
            });
        } else {
            {
                let mut transcript = self.transcript.write().await;
                transcript.unmark_synced(&pending.message_id);
            }
            let mut state = self.state.lock().await;
            // Forget the armed content so a retry or the next content
            // change can arm again
            state.last_content.remove(&pending.message_id);
            if state.pending.as_ref().map(|p| p.generation) == Some(generation) {
                state.pending = None;
                state.timer = None;
            }
            drop(state);
            self.events.emit(SessionEvent::MirrorFailed {
                message_id: pending.message_id,
            });
        }
    }

    async fn clear_if_current(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.pending.as_ref().map(|p| p.generation) == Some(generation) {
            state.pending = None;
            state.timer = None;
        }
    }
}

impl Clone for MirrorScheduler {
    fn clone(&self) -> Self {
        Self {
            room_id: self.room_id.clone(),
            local_user_id: self.local_user_id.clone(),
            delay: self.delay,
            transport: self.transport.clone(),
            transcript: self.transcript.clone(),
            events: self.events.clone(),
            state: self.state.clone(),
        }
    }
}
