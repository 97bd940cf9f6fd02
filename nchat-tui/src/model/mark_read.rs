//! Mark-read policy (`SPEC_FULL.md` §4.3.5).

/// The gate a message `m` must pass before a `MarkMessageRead` request is
/// issued. Kept as plain booleans so the five-condition policy — and the
/// resolved `mark_read_any_chat` ambiguity (see `DESIGN.md`) — can be tested
/// without a live Model.
#[derive(Debug, Clone, Copy)]
pub struct MarkReadContext {
    pub was_unread: bool,
    pub mark_read_every_view: bool,
    pub mark_read_on_view: bool,
    pub history_interaction: bool,
    pub terminal_active: bool,
    pub mark_read_when_inactive: bool,
    pub current_chat_set: bool,
    pub mark_read_any_chat: bool,
    pub in_displayed_slice: bool,
}

pub fn should_mark_read(ctx: MarkReadContext) -> bool {
    if !ctx.mark_read_every_view && !ctx.was_unread {
        return false;
    }
    if !ctx.mark_read_on_view && !ctx.history_interaction {
        return false;
    }
    if !ctx.terminal_active && !ctx.mark_read_when_inactive {
        return false;
    }
    if !ctx.current_chat_set && !ctx.mark_read_any_chat {
        return false;
    }
    ctx.in_displayed_slice
}

impl MarkReadContext {
    /// A context in which every gate is already satisfied; tests flip one
    /// field at a time off of this baseline.
    pub fn all_pass() -> Self {
        Self {
            was_unread: true,
            mark_read_every_view: false,
            mark_read_on_view: true,
            history_interaction: false,
            terminal_active: true,
            mark_read_when_inactive: false,
            current_chat_set: true,
            mark_read_any_chat: false,
            in_displayed_slice: true,
        }
    }
}
