//! Fetch loop invariants (`SPEC_FULL.md` §4.3.4).
//!
//! Kept as pure functions over plain integers so the exact request-sizing
//! arithmetic extracted from `RequestMessages` can be pinned by tests
//! without needing a live [`nchat_core::Cache`] or [`nchat_core::Protocol`].

/// `neededHistory = messageOffset + 1 + ⌈2H/3⌉`.
pub fn needed_history(message_offset: usize, history_lines: usize) -> usize {
    message_offset + 1 + (2 * history_lines).div_ceil(3)
}

/// `visibleCount = min(len(messageVec), messageOffset + H)`.
pub fn visible_count(message_vec_len: usize, message_offset: usize, history_lines: usize) -> usize {
    message_vec_len.min(message_offset + history_lines)
}

/// The `max_history` term: `8` while home-fetch-all is draining, else
/// `⌊2H/3⌋ + 1`.
pub fn max_history(history_lines: usize, home_fetch_all: bool) -> usize {
    if home_fetch_all {
        8
    } else {
        (2 * history_lines) / 3 + 1
    }
}

/// `limit = max(0, messageOffset + 1 + maxHistory - historySize)`, floored at
/// 12 once it is non-zero (ten-plus same-millisecond messages on some
/// backends). Returns `None` when no fetch is needed.
pub fn fetch_limit(message_offset: usize, max_history: usize, history_size: usize) -> Option<usize> {
    const MIN_LIMIT: usize = 12;
    let wanted = (message_offset + 1 + max_history) as isize - history_size as isize;
    if wanted <= 0 { None } else { Some((wanted as usize).max(MIN_LIMIT)) }
}

/// Counts how many entries of `message_vec` (newest-first ids) precede and
/// include the one matching `oldest_message_id`, matching the original's
/// reverse walk in `RequestMessages`. Returns the full length when
/// `oldest_message_id` is absent (nothing cached yet).
pub fn history_size(message_vec: &[&str], oldest_message_id: Option<&str>) -> usize {
    let Some(oldest) = oldest_message_id else {
        return message_vec.len();
    };
    let mut size = message_vec.len();
    for id in message_vec.iter().rev() {
        if *id == oldest {
            break;
        }
        size -= 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needed_history_matches_formula() {
        assert_eq!(needed_history(0, 10), 1 + 7); // ceil(20/3) = 7
    }

    #[test]
    fn scenario_c_pagination() {
        // messageVec has 30 items, H=10, messageOffset=0.
        let needed = needed_history(0, 10);
        assert!(needed <= 30); // no fetch needed yet at offset 0

        // After page-up by 10 (messageOffset=10), second page-up needs more
        // history once `messageOffset + 1 + ceil(2H/3) > 30`.
        let needed_after = needed_history(10, 10);
        assert!(needed_after > 0);
        assert_eq!(needed_after, 10 + 1 + 7);
        assert!(needed_after < 30);

        let needed_deep = needed_history(23, 10);
        assert!(needed_deep > 30);
    }

    #[test]
    fn max_history_is_eight_during_home_fetch_all() {
        assert_eq!(max_history(10, true), 8);
        assert_eq!(max_history(10, false), 7);
    }

    #[test]
    fn fetch_limit_floors_at_twelve() {
        assert_eq!(fetch_limit(0, 7, 0), Some(12));
    }

    #[test]
    fn fetch_limit_none_when_satisfied() {
        assert_eq!(fetch_limit(0, 7, 100), None);
    }

    #[test]
    fn history_size_walks_back_to_oldest() {
        let vec = vec!["m5", "m4", "m3", "m2", "m1"]; // newest first
        assert_eq!(history_size(&vec, Some("m3")), 3);
        assert_eq!(history_size(&vec, Some("m1")), 5);
        assert_eq!(history_size(&vec, None), 5);
    }
}
