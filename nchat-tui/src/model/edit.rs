//! Edit-window gate (`SPEC_FULL.md` §4.3 Scenario D).
//!
//! A message is only editable while it is still outgoing and within the
//! window the active protocol advertises via feature flags.

use nchat_core::protocol::FeatureSet;
use nchat_core::protocol::ProtocolFeature;
use nchat_core::ChatMessage;

const FIFTEEN_MINUTES_MS: i64 = 15 * 60 * 1000;
const TWO_DAYS_MS: i64 = 2 * 24 * 60 * 60 * 1000;

/// Why a message cannot be edited right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDenied {
    NotOutgoing,
    TooOld,
}

impl EditDenied {
    pub fn message(self) -> &'static str {
        match self {
            EditDenied::NotOutgoing => "Only messages you sent can be edited.",
            EditDenied::TooOld => "Messages older than the edit window cannot be edited.",
        }
    }
}

/// Returns `Ok(())` if `message` may be edited at `now_ms`, else the denial reason.
///
/// Neither `EditWithinTwoDays` nor `EditWithinFifteenMins` set means the
/// protocol imposes no time limit: only the outgoing check applies.
pub fn can_edit(message: &ChatMessage, features: FeatureSet, now_ms: i64) -> Result<(), EditDenied> {
    if !message.is_outgoing {
        return Err(EditDenied::NotOutgoing);
    }

    let age_ms = now_ms.saturating_sub(message.time_sent);

    if features.has(ProtocolFeature::EditWithinFifteenMins) && age_ms > FIFTEEN_MINUTES_MS {
        return Err(EditDenied::TooOld);
    }

    if features.has(ProtocolFeature::EditWithinTwoDays) && age_ms > TWO_DAYS_MS {
        return Err(EditDenied::TooOld);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nchat_core::{ChatMessage, MsgId, Reactions, UserId};

    fn message(is_outgoing: bool, time_sent: i64) -> ChatMessage {
        ChatMessage {
            id: MsgId::from("m1"),
            sender_id: UserId::from("u1"),
            text: "hi".into(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent,
            is_outgoing,
            is_read: true,
            has_mention: false,
        }
    }

    #[test]
    fn non_outgoing_message_is_never_editable() {
        let msg = message(false, 0);
        let features = FeatureSet::empty().with(ProtocolFeature::EditWithinFifteenMins);
        assert_eq!(can_edit(&msg, features, 1_000), Err(EditDenied::NotOutgoing));
    }

    #[test]
    fn no_time_limit_feature_allows_editing_regardless_of_age() {
        let msg = message(true, 0);
        let features = FeatureSet::empty();
        assert_eq!(can_edit(&msg, features, 1_000_000_000), Ok(()));
    }

    #[test]
    fn fourteen_minutes_old_is_editable_under_fifteen_minute_window() {
        let msg = message(true, 0);
        let features = FeatureSet::empty().with(ProtocolFeature::EditWithinFifteenMins);
        let now = 14 * 60 * 1000;
        assert_eq!(can_edit(&msg, features, now), Ok(()));
    }

    #[test]
    fn sixteen_minutes_old_is_not_editable_under_fifteen_minute_window() {
        let msg = message(true, 0);
        let features = FeatureSet::empty().with(ProtocolFeature::EditWithinFifteenMins);
        let now = 16 * 60 * 1000;
        assert_eq!(can_edit(&msg, features, now), Err(EditDenied::TooOld));
    }

    #[test]
    fn two_day_window_allows_one_day_old_message() {
        let msg = message(true, 0);
        let features = FeatureSet::empty().with(ProtocolFeature::EditWithinTwoDays);
        let now = 24 * 60 * 60 * 1000;
        assert_eq!(can_edit(&msg, features, now), Ok(()));
    }

    #[test]
    fn two_day_window_rejects_three_day_old_message() {
        let msg = message(true, 0);
        let features = FeatureSet::empty().with(ProtocolFeature::EditWithinTwoDays);
        let now = 3 * 24 * 60 * 60 * 1000;
        assert_eq!(can_edit(&msg, features, now), Err(EditDenied::TooOld));
    }
}
