//! Chat ordering (`SPEC_FULL.md` §3, §4.3.6, invariant 2).

use nchat_core::{ChatId, ChatInfo};

/// Sorts `(chat_id, info)` pairs per the ordering invariant: pinned precede
/// unpinned; within a pin-class, greater `last_message_time` precedes
/// smaller; ties break by `id` ascending. When `muted_demoted` is set,
/// muted chats sort after non-muted ones within their pin-class regardless
/// of time (`ui.conf`'s `muted_position_by_timestamp`, inverted sense:
/// `false` is the original's default "demote muted chats").
pub fn sort_chats<'a>(chats: &mut Vec<(&'a ChatId, &'a ChatInfo)>, demote_muted: bool) {
    chats.sort_by(|(id_a, a), (id_b, b)| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| {
                if demote_muted {
                    a.is_muted.cmp(&b.is_muted)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .then_with(|| b.last_message_time.cmp(&a.last_message_time))
            .then_with(|| id_a.as_str().cmp(id_b.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: &str, pinned: bool, time: i64) -> (ChatId, ChatInfo) {
        let mut info = ChatInfo::new(ChatId::new(id));
        info.is_pinned = pinned;
        info.last_message_time = time;
        (ChatId::new(id), info)
    }

    #[test]
    fn scenario_a_ordering() {
        let a = chat("A", false, 100);
        let b = chat("B", true, 50);
        let c = chat("C", false, 200);
        let mut chats = vec![(&a.0, &a.1), (&b.0, &b.1), (&c.0, &c.1)];
        sort_chats(&mut chats, false);
        let ids: Vec<&str> = chats.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
    }

    #[test]
    fn ties_broken_by_id_ascending() {
        let a = chat("b", false, 100);
        let b = chat("a", false, 100);
        let mut chats = vec![(&a.0, &a.1), (&b.0, &b.1)];
        sort_chats(&mut chats, false);
        let ids: Vec<&str> = chats.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn scenario_f_pin_moves_chat_to_front() {
        let mut a = chat("A", false, 10);
        let b = chat("B", false, 20);
        let c = chat("C", false, 30);
        let d = chat("D", false, 40);
        let e = chat("E", false, 50);
        a.1.is_pinned = true;
        a.1.last_message_time = 999;
        let mut chats = vec![(&a.0, &a.1), (&b.0, &b.1), (&c.0, &c.1), (&d.0, &d.1), (&e.0, &e.1)];
        sort_chats(&mut chats, false);
        assert_eq!(chats[0].0.as_str(), "A");
    }

    #[test]
    fn muted_demoted_when_configured() {
        let mut a = chat("A", false, 200);
        a.1.is_muted = true;
        let b = chat("B", false, 100);
        let mut chats = vec![(&a.0, &a.1), (&b.0, &b.1)];
        sort_chats(&mut chats, true);
        let ids: Vec<&str> = chats.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn muted_not_demoted_by_default() {
        let mut a = chat("A", false, 200);
        a.1.is_muted = true;
        let b = chat("B", false, 100);
        let mut chats = vec![(&a.0, &a.1), (&b.0, &b.1)];
        sort_chats(&mut chats, false);
        let ids: Vec<&str> = chats.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]); // time still wins
    }
}
