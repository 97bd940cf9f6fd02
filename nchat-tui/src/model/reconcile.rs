//! Cached-vs-live message reconciliation (`SPEC_FULL.md` §3 invariant 6).
//!
//! A message already held in memory must never regress when a fresher copy
//! of the same id arrives from the cache or from the backend: reactions and
//! read state only move forward, never backward to an emptier value.

use nchat_core::ChatMessage;

/// Merges `incoming` into `existing`, keeping whichever value of each field
/// is "more complete" rather than blindly overwriting with `incoming`.
///
/// - `time_sent` takes the larger of the two (a backend correction moves a
///   message's timestamp forward, never back to an earlier guess).
/// - `reactions` keeps `existing`'s value if `incoming` carries no reactions
///   at all, so a stale fetch can't wipe reactions a later event already
///   applied.
/// - `is_read` is sticky true: once read, a message does not un-read itself.
/// - every other field takes `incoming`, which is assumed newer.
pub fn reconcile_cached(existing: &ChatMessage, incoming: &ChatMessage) -> ChatMessage {
    let mut merged = incoming.clone();

    merged.time_sent = existing.time_sent.max(incoming.time_sent);

    let incoming_reactions_empty =
        incoming.reactions.sender_emojis.is_empty() && incoming.reactions.emoji_counts.is_empty();
    if incoming_reactions_empty {
        merged.reactions = existing.reactions.clone();
    }

    merged.is_read = existing.is_read || incoming.is_read;

    merged
}

/// Reconciles the **live** (`cached=false`) arrival of a message already
/// held in memory (`spec.md` §4.2): the live copy replaces `existing`
/// outright, since it is the backend's authoritative version rather than a
/// possibly-stale cache fetch. Reactions are the one exception — they only
/// merge against `existing`'s reactions when `incoming.reactions`'s
/// `need_consolidation_with_cache` flag asks for it, via the same
/// consolidation rules the cache store applies on write.
pub fn reconcile_live(existing: &ChatMessage, incoming: &ChatMessage) -> ChatMessage {
    let mut merged = incoming.clone();
    if incoming.reactions.need_consolidation_with_cache {
        merged.reactions = nchat_core::cache::merge_reactions(Some(&existing.reactions), &incoming.reactions);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use nchat_core::{MsgId, Reactions, UserId};

    fn base(time_sent: i64, is_read: bool, reactions: Reactions) -> ChatMessage {
        ChatMessage {
            id: MsgId::from("m1"),
            sender_id: UserId::from("u1"),
            text: "hi".into(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions,
            time_sent,
            is_outgoing: false,
            is_read,
            has_mention: false,
        }
    }

    #[test]
    fn timestamp_never_regresses() {
        let existing = base(100, false, Reactions::default());
        let incoming = base(50, false, Reactions::default());
        let merged = reconcile_cached(&existing, &incoming);
        assert_eq!(merged.time_sent, 100);
    }

    #[test]
    fn timestamp_advances_when_incoming_is_newer() {
        let existing = base(100, false, Reactions::default());
        let incoming = base(150, false, Reactions::default());
        let merged = reconcile_cached(&existing, &incoming);
        assert_eq!(merged.time_sent, 150);
    }

    #[test]
    fn empty_incoming_reactions_do_not_clear_existing_reactions() {
        let mut with_reaction = Reactions::default();
        with_reaction.emoji_counts.insert("👍".to_string(), 1);
        let existing = base(100, false, with_reaction.clone());
        let incoming = base(100, false, Reactions::default());
        let merged = reconcile_cached(&existing, &incoming);
        assert_eq!(merged.reactions, with_reaction);
    }

    #[test]
    fn nonempty_incoming_reactions_replace_existing() {
        let mut old_reaction = Reactions::default();
        old_reaction.emoji_counts.insert("👍".to_string(), 1);
        let mut new_reaction = Reactions::default();
        new_reaction.emoji_counts.insert("❤️".to_string(), 2);
        let existing = base(100, false, old_reaction);
        let incoming = base(100, false, new_reaction.clone());
        let merged = reconcile_cached(&existing, &incoming);
        assert_eq!(merged.reactions, new_reaction);
    }

    #[test]
    fn read_state_is_sticky() {
        let existing = base(100, true, Reactions::default());
        let incoming = base(100, false, Reactions::default());
        let merged = reconcile_cached(&existing, &incoming);
        assert!(merged.is_read);
    }

    #[test]
    fn live_arrival_replaces_existing_outright() {
        let existing = base(100, true, Reactions::default());
        let incoming = base(50, false, Reactions::default());
        let merged = reconcile_live(&existing, &incoming);
        // Unlike `reconcile_cached`, a live arrival is authoritative: no
        // max-timestamp and no sticky-read carryover from `existing`.
        assert_eq!(merged.time_sent, 50);
        assert!(!merged.is_read);
    }

    #[test]
    fn live_arrival_without_consolidation_flag_uses_incoming_reactions_as_is() {
        let mut old_reaction = Reactions::default();
        old_reaction.emoji_counts.insert("👍".to_string(), 1);
        let existing = base(100, false, old_reaction);
        let incoming = base(100, false, Reactions::default());
        let merged = reconcile_live(&existing, &incoming);
        assert_eq!(merged.reactions, Reactions::default());
    }

    #[test]
    fn live_arrival_with_consolidation_flag_merges_against_cached_reactions() {
        let mut old_reaction = Reactions::default();
        old_reaction.emoji_counts.insert("👍".to_string(), 1);
        let existing = base(100, false, old_reaction);

        let mut incoming_reaction = Reactions::default();
        incoming_reaction.emoji_counts.insert("❤️".to_string(), 1);
        incoming_reaction.need_consolidation_with_cache = true;
        let incoming = base(100, false, incoming_reaction);

        let merged = reconcile_live(&existing, &incoming);
        assert_eq!(merged.reactions.emoji_counts.get("👍"), Some(&1));
        assert_eq!(merged.reactions.emoji_counts.get("❤️"), Some(&1));
    }
}
