//! Typing debounce (`SPEC_FULL.md` §4.3.8), grounded on `uimodel.cpp::SetTyping`.

use nchat_core::{ChatId, ProfileId};

const TYPING_REFRESH_MS: i64 = 2500;
const TYPING_STOP_MS: i64 = 3000;

/// What the Model should actually send to the backend, if anything, in
/// response to a `set_typing` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingAction {
    None,
    Send { is_typing: bool },
}

#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    last: Option<(ProfileId, ChatId)>,
    last_is_typing: bool,
    last_type_time_ms: i64,
    last_send_time_ms: i64,
}

impl Default for TypingDebouncer {
    fn default() -> Self {
        Self {
            last: None,
            last_is_typing: false,
            last_type_time_ms: 0,
            last_send_time_ms: 0,
        }
    }
}

impl TypingDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `now_ms` is injected so the 2.5s/3s windows can be tested without a
    /// real clock.
    pub fn set_typing(
        &mut self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        is_typing: bool,
        has_typing_timeout: bool,
        now_ms: i64,
    ) -> TypingAction {
        if !is_typing && !self.last_is_typing {
            return TypingAction::None;
        }

        if !is_typing && self.last_is_typing && (now_ms - self.last_type_time_ms) > TYPING_STOP_MS {
            self.last = None;
            self.last_is_typing = false;
            return TypingAction::Send { is_typing: false };
        }

        if is_typing {
            self.last_type_time_ms = now_ms;
            let same_chat = self.last.as_ref() == Some(&(profile_id.clone(), chat_id.clone()))
                && self.last_is_typing;

            if same_chat {
                if has_typing_timeout && (now_ms - self.last_send_time_ms) > TYPING_REFRESH_MS {
                    self.last_send_time_ms = now_ms;
                    return TypingAction::Send { is_typing: true };
                }
                return TypingAction::None;
            }

            self.last = Some((profile_id.clone(), chat_id.clone()));
            self.last_is_typing = true;
            self.last_send_time_ms = now_ms;
            return TypingAction::Send { is_typing: true };
        }

        TypingAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ProfileId, ChatId) {
        (ProfileId::new("p1"), ChatId::new("c1"))
    }

    #[test]
    fn first_keystroke_sends_start() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        let action = d.set_typing(&p, &c, true, true, 1000);
        assert_eq!(action, TypingAction::Send { is_typing: true });
    }

    #[test]
    fn refresh_suppressed_before_2500ms() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        d.set_typing(&p, &c, true, true, 0);
        let action = d.set_typing(&p, &c, true, true, 1000);
        assert_eq!(action, TypingAction::None);
    }

    #[test]
    fn refresh_sent_after_2500ms_when_backend_supports_timeout() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        d.set_typing(&p, &c, true, true, 0);
        let action = d.set_typing(&p, &c, true, true, 2600);
        assert_eq!(action, TypingAction::Send { is_typing: true });
    }

    #[test]
    fn refresh_never_sent_without_typing_timeout_feature() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        d.set_typing(&p, &c, true, false, 0);
        let action = d.set_typing(&p, &c, true, false, 10_000);
        assert_eq!(action, TypingAction::None);
    }

    #[test]
    fn stop_typing_sent_after_3s_idle() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        d.set_typing(&p, &c, true, true, 0);
        let action = d.set_typing(&p, &c, false, true, 3100);
        assert_eq!(action, TypingAction::Send { is_typing: false });
    }

    #[test]
    fn invariant_no_typing_indicator_more_than_once_per_2500ms() {
        let (p, c) = ids();
        let mut d = TypingDebouncer::new();
        let mut sends = 0;
        for t in (0..10_000).step_by(200) {
            if d.set_typing(&p, &c, true, true, t) == (TypingAction::Send { is_typing: true }) {
                sends += 1;
            }
        }
        // 10000ms window, refresh every >2500ms: at most 4 sends (0, ~2501*2, ~2501*3...)
        assert!(sends <= 5, "sent {sends} typing indicators in 10s");
    }
}
