/// In-memory transcript for one session
use crate::config::DEFAULT_DEDUP_WINDOW_SECS;
use crate::message::{Message, Role, Source};
use crate::transcript::dedup;
use std::collections::HashSet;
use tracing::debug;

/// What one merge call did. Every candidate lands in exactly one of the
/// two lists.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    /// True when the merge changed which message is last
    pub last_changed: bool,
}

/// Ordered, deduplicated message list plus the sync bookkeeping the
/// mirror scheduler reads
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    /// Every id ever accepted, so a removed message cannot reappear
    processed_ids: HashSet<String>,
    /// Ids of local messages already echoed to the room
    synced_ids: HashSet<String>,
    dedup_window_secs: i64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW_SECS)
    }
}

impl Transcript {
    pub fn new(dedup_window_secs: i64) -> Self {
        Self {
            messages: Vec::new(),
            processed_ids: HashSet::new(),
            synced_ids: HashSet::new(),
            dedup_window_secs,
        }
    }

    /// Merge a batch of candidates from one source. Accepted messages are
    /// re-sorted into timestamp order; equal timestamps keep their
    /// insertion order.
    pub fn merge(&mut self, candidates: Vec<Message>, source: Source) -> MergeReport {
        let previous_last = self.messages.last().map(|m| m.id.clone());
        let mut report = MergeReport::default();

        for candidate in candidates {
            if dedup::should_accept(
                &candidate,
                source,
                &self.messages,
                &self.processed_ids,
                self.dedup_window_secs,
            ) {
                self.processed_ids.insert(candidate.id.clone());
                report.accepted.push(candidate.id.clone());
                self.messages.push(candidate);
            } else {
                report.rejected.push(candidate.id);
            }
        }

        if !report.accepted.is_empty() {
            self.messages.sort_by_key(|m| m.created);
        }

        report.last_changed = self.messages.last().map(|m| m.id.clone()) != previous_last;
        if !report.accepted.is_empty() {
            debug!(
                "Merged {} of {} candidates ({:?})",
                report.accepted.len(),
                report.accepted.len() + report.rejected.len(),
                source
            );
        }
        report
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The closest user-role message before the given one, the question a
    /// reply is answering
    pub fn preceding_user_message(&self, before_id: &str) -> Option<&Message> {
        let index = self.messages.iter().position(|m| m.id == before_id)?;
        self.messages[..index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
    }

    pub fn mark_synced(&mut self, id: &str) {
        self.synced_ids.insert(id.to_string());
    }

    pub fn unmark_synced(&mut self, id: &str) {
        self.synced_ids.remove(id);
    }

    pub fn is_synced(&self, id: &str) -> bool {
        self.synced_ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sorts_by_created() {
        let mut transcript = Transcript::default();
        let report = transcript.merge(
            vec![
                Message::user().with_text("second").with_created(2000),
                Message::user().with_text("first").with_created(1000),
            ],
            Source::Local,
        );

        assert_eq!(report.accepted.len(), 2);
        let texts: Vec<String> = transcript.messages().iter().map(|m| m.concat_text()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_merge_is_stable_on_equal_timestamps() {
        let mut transcript = Transcript::default();
        transcript.merge(
            vec![
                Message::user().with_text("a").with_created(1000),
                Message::user().with_text("b").with_created(1000),
            ],
            Source::Local,
        );
        transcript.merge(
            vec![Message::user().with_text("c").with_created(1000)],
            Source::Local,
        );

        let texts: Vec<String> = transcript.messages().iter().map(|m| m.concat_text()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut transcript = Transcript::default();
        let batch = vec![
            Message::from_history(Role::User, "hi", 1_000_000, None),
            Message::from_history(Role::Assistant, "hello", 1_001_000, None),
        ];

        let first = transcript.merge(batch.clone(), Source::RemoteHistory);
        assert_eq!(first.accepted.len(), 2);

        let second = transcript.merge(batch, Source::RemoteHistory);
        assert!(second.accepted.is_empty());
        assert_eq!(second.rejected.len(), 2);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_last_changed_tracks_the_tail() {
        let mut transcript = Transcript::default();

        let report = transcript.merge(
            vec![Message::user().with_text("q").with_created(2000)],
            Source::Local,
        );
        assert!(report.last_changed);

        // An earlier message slots in before the tail
        let report = transcript.merge(
            vec![Message::from_history(Role::User, "old", 1_000_000, None)],
            Source::RemoteHistory,
        );
        assert_eq!(report.accepted.len(), 1);
        assert!(!report.last_changed);

        // A rejected batch never moves the tail
        let report = transcript.merge(
            vec![Message::from_history(Role::User, "old", 1_000_000, None)],
            Source::RemoteHistory,
        );
        assert!(report.accepted.is_empty());
        assert!(!report.last_changed);
    }

    #[test]
    fn test_out_of_order_live_event_lands_in_timestamp_order() {
        let mut transcript = Transcript::default();
        transcript.merge(
            vec![
                Message::user().with_text("q").with_created(1000),
                Message::assistant().with_text("a").with_created(1010),
            ],
            Source::Local,
        );

        // Live event with an older timestamp, delivered late
        let report = transcript.merge(
            vec![Message::live(Role::User, "earlier remark", 1_005_000)],
            Source::RemoteLive,
        );
        assert_eq!(report.accepted.len(), 1);
        assert!(!report.last_changed);

        let texts: Vec<String> = transcript.messages().iter().map(|m| m.concat_text()).collect();
        assert_eq!(texts, vec!["q", "earlier remark", "a"]);
    }

    #[test]
    fn test_preceding_user_message_skips_other_roles() {
        let mut transcript = Transcript::default();
        let question = Message::user().with_text("why?").with_created(1000);
        let question_id = question.id.clone();
        let reply = Message::assistant().with_text("because").with_created(1010);
        let reply_id = reply.id.clone();

        transcript.merge(
            vec![
                Message::user().with_text("older").with_created(900),
                question,
                reply,
            ],
            Source::Local,
        );

        let found = transcript.preceding_user_message(&reply_id);
        assert_eq!(found.map(|m| m.id.clone()), Some(question_id));
    }

    #[test]
    fn test_preceding_user_message_none_when_absent() {
        let mut transcript = Transcript::default();
        let reply = Message::assistant().with_text("greeting").with_created(1000);
        let reply_id = reply.id.clone();
        transcript.merge(vec![reply], Source::Local);

        assert!(transcript.preceding_user_message(&reply_id).is_none());
        assert!(transcript.preceding_user_message("unknown-id").is_none());
    }

    #[test]
    fn test_sync_markers() {
        let mut transcript = Transcript::default();
        let reply = Message::assistant().with_text("a").with_created(1000);
        let id = reply.id.clone();
        transcript.merge(vec![reply], Source::Local);

        assert!(!transcript.is_synced(&id));
        transcript.mark_synced(&id);
        assert!(transcript.is_synced(&id));
        transcript.unmark_synced(&id);
        assert!(!transcript.is_synced(&id));
    }
}
