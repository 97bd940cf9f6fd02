//! Desktop notification / terminal bell predicate (`SPEC_FULL.md` §4.3.7).
//!
//! Mirrors [`super::mark_read`]'s shape: a context struct capturing every
//! input the decision depends on, and a pure function so the policy can be
//! tested without a real terminal or notifier.

/// What, if anything, to fire for a newly arrived incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifyAction {
    pub desktop: bool,
    pub bell: bool,
}

impl NotifyAction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_noop(self) -> bool {
        !self.desktop && !self.bell
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifyContext {
    /// The message did not originate from the logged-in user.
    pub is_incoming: bool,
    pub terminal_active: bool,
    /// The message arrived in the chat currently shown on screen.
    pub is_current_chat: bool,
    pub desktop_notify_active_current: bool,
    pub desktop_notify_active_noncurrent: bool,
    pub desktop_notify_inactive: bool,
    pub terminal_bell_active: bool,
    pub terminal_bell_inactive: bool,
}

/// Decides whether to raise a desktop notification and/or ring the terminal
/// bell for a message, given `ctx`.
///
/// Outgoing (self-sent) messages never notify. The desktop channel further
/// distinguishes "current chat" from "non-current chat" while the terminal
/// is focused (`UpdateChatInfoIsUnread`'s three-way split); the bell only
/// distinguishes terminal focus, not which chat the message landed in.
pub fn should_notify(ctx: NotifyContext) -> NotifyAction {
    if !ctx.is_incoming {
        return NotifyAction::none();
    }

    let desktop = if ctx.terminal_active {
        if ctx.is_current_chat {
            ctx.desktop_notify_active_current
        } else {
            ctx.desktop_notify_active_noncurrent
        }
    } else {
        ctx.desktop_notify_inactive
    };

    let bell = if ctx.terminal_active {
        ctx.terminal_bell_active
    } else {
        ctx.terminal_bell_inactive
    };

    NotifyAction { desktop, bell }
}
