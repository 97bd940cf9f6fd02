//! In-memory state owned exclusively by the Model (`SPEC_FULL.md` §3).

use std::collections::{HashMap, HashSet, VecDeque};

use nchat_core::{ChatInfo, ChatMessage, ContactInfo, MsgId, ProfileId, UserId};

use super::takeover::TakeoverState;
use super::typing::TypingDebouncer;
use crate::model::ChatKey;

/// Keyboard focus mode, mutually exclusive within a single chat
/// (`SPEC_FULL.md` §4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Default,
    SelectMessage,
    EditMessage,
    ListDialog,
    MessageDialog,
}

/// The entry buffer plus its saved/undo snapshot.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub text: String,
    pub cursor: usize,
    pub cleared_text: Option<String>,
    pub cleared_cursor: usize,
}

impl Entry {
    pub fn insert_char(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    pub fn delete_char_before_cursor(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = self.text[..self.cursor]
            .char_indices()
            .next_back()
            .map(|(idx, _)| idx)
            .unwrap_or(0);
        self.text.remove(prev);
        self.cursor = prev;
    }

    pub fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.text[..self.cursor]
                .char_indices()
                .next_back()
                .map(|(idx, _)| idx)
                .unwrap_or(0);
        }
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.text.len() {
            self.cursor = self.text[self.cursor..]
                .char_indices()
                .nth(1)
                .map(|(idx, _)| self.cursor + idx)
                .unwrap_or(self.text.len());
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.text.len();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }

    /// Loads `text` into the buffer, stashing whatever was there so [`Entry::restore`]
    /// can bring it back (`EditMessage`/cancel-key undo, `SPEC_FULL.md` §4.3.2).
    pub fn load(&mut self, text: String) {
        self.cleared_text = Some(std::mem::replace(&mut self.text, text));
        self.cleared_cursor = self.cursor;
        self.cursor = self.text.len();
    }

    /// Restores the stashed buffer saved by [`Entry::load`], if any.
    pub fn restore(&mut self) {
        if let Some(saved) = self.cleared_text.take() {
            self.text = saved;
            self.cursor = self.cleared_cursor;
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.cleared_text = None;
    }
}

#[derive(Debug, Default)]
pub struct ModelState {
    pub chat_infos: HashMap<ChatKey, ChatInfo>,
    pub chat_vec: Vec<ChatKey>,
    pub contact_infos: HashMap<(ProfileId, UserId), ContactInfo>,

    pub message_vec: HashMap<ChatKey, Vec<MsgId>>,
    pub messages: HashMap<ChatKey, HashMap<MsgId, ChatMessage>>,
    pub message_offset: HashMap<ChatKey, usize>,
    pub message_offset_stack: HashMap<ChatKey, Vec<usize>>,
    pub oldest_message_id: HashMap<ChatKey, MsgId>,
    pub msg_from_ids_requested: HashMap<ChatKey, HashSet<String>>,

    /// `timePinned` from the most recent `UpdatePin{isPinned:true}`; used in
    /// place of the newest message's `timeSent` when recomputing
    /// `lastMessageTime` for a pinned chat (`SPEC_FULL.md` §4.3.6 point 1).
    pub pin_times: HashMap<ChatKey, i64>,

    /// Temporary ids minted on send, FIFO per chat, popped as the backend's
    /// echo `SendMessage` notifications arrive (`SPEC_FULL.md` §3 supplement).
    pub outgoing_pending: HashMap<ChatKey, VecDeque<MsgId>>,

    /// First `Connect{success:true}` time per profile; a message for a chat
    /// with no current chat set yet only auto-focuses that chat if it
    /// arrived after this (`SPEC_FULL.md` §4.3.6 point 4).
    pub connect_time: HashMap<ProfileId, i64>,

    pub current_chat: Option<ChatKey>,
    pub mode: Mode,
    pub entry: Entry,

    /// Index into `message_vec_for(current_chat)` highlighted in
    /// `SelectMessage`/`EditMessage` mode.
    pub selected_index: Option<usize>,

    /// The message `EditMessage` mode is currently rewriting, set when
    /// `Key::EditSelected` loads its text into `entry`.
    pub editing_message: Option<(ChatKey, MsgId)>,

    /// Emoji set from the most recent `AvailableReactions` notification,
    /// offered by `EmojiListDialog`.
    pub available_reactions: HashMap<ChatKey, Vec<String>>,

    pub users_typing: HashMap<ChatKey, HashSet<UserId>>,
    pub user_online: HashMap<(ProfileId, UserId), bool>,

    pub terminal_active: bool,
    pub history_interaction: bool,
    pub home_fetch_all: bool,
    pub running: bool,

    pub typing: TypingDebouncer,
    pub takeover: TakeoverState,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Default
    }
}

impl ModelState {
    pub fn new() -> Self {
        Self {
            mode: Mode::Default,
            terminal_active: true,
            running: true,
            ..Default::default()
        }
    }

    pub fn message_vec_for(&self, key: &ChatKey) -> &[MsgId] {
        self.message_vec.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn offset_for(&self, key: &ChatKey) -> usize {
        self.message_offset.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_handle_multibyte_chars() {
        let mut entry = Entry::default();
        entry.insert_char('h');
        entry.insert_char('i');
        entry.insert_char('\u{1F600}');
        assert_eq!(entry.text, "hi\u{1F600}");
        entry.delete_char_before_cursor();
        assert_eq!(entry.text, "hi");
    }

    #[test]
    fn move_left_right_step_by_codepoint() {
        let mut entry = Entry {
            text: "h\u{1F600}i".to_string(),
            cursor: 0,
            ..Default::default()
        };
        entry.move_right();
        assert_eq!(entry.cursor, 1);
        entry.move_right();
        assert_eq!(entry.cursor, 1 + '\u{1F600}'.len_utf8());
        entry.move_left();
        assert_eq!(entry.cursor, 1);
    }

    #[test]
    fn load_then_restore_round_trips_original_buffer() {
        let mut entry = Entry {
            text: "draft".to_string(),
            cursor: 3,
            ..Default::default()
        };
        entry.load("edited text".to_string());
        assert_eq!(entry.text, "edited text");
        entry.restore();
        assert_eq!(entry.text, "draft");
        assert_eq!(entry.cursor, 3);
    }

    #[test]
    fn clear_drops_any_pending_restore() {
        let mut entry = Entry {
            text: "draft".to_string(),
            cursor: 3,
            ..Default::default()
        };
        entry.load("edited".to_string());
        entry.clear();
        entry.restore();
        assert_eq!(entry.text, "");
    }
}
