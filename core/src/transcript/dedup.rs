/// Merge-time deduplication rules
///
/// Three tiers, applied in order; the first hit rejects the candidate:
///   1. exact id match, for candidates from any source
///   2. content + role match within a timestamp window, history backfill only
///   3. content + role match within the same origin class, live events only
use crate::message::{Message, Source};
use std::collections::HashSet;
use tracing::debug;

/// Decide whether a candidate enters the transcript
pub fn should_accept(
    candidate: &Message,
    source: Source,
    existing: &[Message],
    processed_ids: &HashSet<String>,
    window_secs: i64,
) -> bool {
    // Tier 1: the id has been seen before, even if the message is gone
    if processed_ids.contains(&candidate.id) || existing.iter().any(|m| m.id == candidate.id) {
        debug!("Dropping {}: id already processed", candidate.id);
        return false;
    }

    match source {
        Source::RemoteHistory => {
            // Tier 2: backfill derives fresh ids every fetch, so an entry
            // we already hold locally is recognized by content instead.
            // The window keeps distinct repeats ("ok" twice, minutes
            // apart) from collapsing into one.
            let text = candidate.concat_text();
            if existing.iter().any(|m| {
                m.role == candidate.role
                    && (m.created - candidate.created).abs() <= window_secs
                    && m.concat_text() == text
            }) {
                debug!("Dropping {}: matches existing content nearby in time", candidate.id);
                return false;
            }
        }
        Source::RemoteLive => {
            // Tier 3: a live event is a duplicate only of another message
            // in the same origin class. A remote copy of locally authored
            // text is a distinct utterance and stays.
            let text = candidate.concat_text();
            if existing.iter().any(|m| {
                m.is_remote_origin() == candidate.is_remote_origin()
                    && m.role == candidate.role
                    && m.concat_text() == text
            }) {
                debug!("Dropping {}: same-class content already present", candidate.id);
                return false;
            }
        }
        // Local appends carry fresh unique ids; tier 1 is all that applies
        Source::Local => {}
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn existing_assistant(text: &str, created: i64) -> Message {
        Message::assistant().with_text(text).with_created(created)
    }

    #[test]
    fn test_tier1_rejects_known_id() {
        let existing = vec![existing_assistant("hello", 1000)];
        let mut candidate = Message::assistant().with_text("different");
        candidate.id = existing[0].id.clone();

        assert!(!should_accept(
            &candidate,
            Source::Local,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier1_rejects_processed_id_without_message() {
        let candidate = Message::assistant().with_text("hello");
        let mut processed = HashSet::new();
        processed.insert(candidate.id.clone());

        assert!(!should_accept(&candidate, Source::Local, &[], &processed, 10));
    }

    #[test]
    fn test_tier2_rejects_content_match_inside_window() {
        let existing = vec![existing_assistant("Hello", 1000)];
        let candidate = Message::from_history(Role::Assistant, "Hello", 1_005_000, None);
        assert_eq!(candidate.created, 1005);

        assert!(!should_accept(
            &candidate,
            Source::RemoteHistory,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier2_accepts_content_match_outside_window() {
        let existing = vec![existing_assistant("Hello", 1000)];
        let candidate = Message::from_history(Role::Assistant, "Hello", 1_020_000, None);
        assert_eq!(candidate.created, 1020);

        assert!(should_accept(
            &candidate,
            Source::RemoteHistory,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier2_window_is_inclusive() {
        let existing = vec![existing_assistant("Hello", 1000)];
        let candidate = Message::from_history(Role::Assistant, "Hello", 1_010_000, None);

        assert!(!should_accept(
            &candidate,
            Source::RemoteHistory,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier2_requires_matching_role() {
        let existing = vec![existing_assistant("Hello", 1000)];
        let candidate = Message::from_history(Role::User, "Hello", 1_005_000, None);

        assert!(should_accept(
            &candidate,
            Source::RemoteHistory,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier2_does_not_apply_to_local_appends() {
        // A user really can type the same thing twice in a row
        let existing = vec![Message::user().with_text("ok").with_created(1000)];
        let candidate = Message::user().with_text("ok").with_created(1002);

        assert!(should_accept(
            &candidate,
            Source::Local,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier3_rejects_same_class_content_regardless_of_time() {
        let existing = vec![Message::from_history(Role::User, "ping", 1_000_000, None)];
        let candidate = Message::live(Role::User, "ping", 99_000_000);

        assert!(!should_accept(
            &candidate,
            Source::RemoteLive,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier3_keeps_cross_class_duplicates() {
        // Local "hello" and a collaborator's live "hello" are distinct
        let existing = vec![Message::user().with_text("hello").with_created(1000)];
        let candidate = Message::live(Role::User, "hello", 1_000_000);

        assert!(should_accept(
            &candidate,
            Source::RemoteLive,
            &existing,
            &HashSet::new(),
            10
        ));
    }

    #[test]
    fn test_tier3_requires_matching_role() {
        let existing = vec![Message::from_history(Role::Assistant, "ping", 1_000_000, None)];
        let candidate = Message::live(Role::User, "ping", 1_000_000);

        assert!(should_accept(
            &candidate,
            Source::RemoteLive,
            &existing,
            &HashSet::new(),
            10
        ));
    }
}
