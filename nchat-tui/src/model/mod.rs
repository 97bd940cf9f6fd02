//! The UI Model: single owner of all in-memory chat state, and the only
//! piece of this crate that is not itself async (`SPEC_FULL.md` §2, §3).
//!
//! Keeping the Model synchronous means every external effect it wants —
//! sending a backend request, persisting a message, ringing the bell — is
//! returned as data (an [`Effect`]) rather than performed inline. The
//! `tokio`-aware shell in `crate::app` executes the returned effects and
//! feeds results back in through [`Model::apply_service`]. This generalizes
//! the `KeyAction` return-value pattern the REPL's key handler uses, to a
//! list of effects rather than a single one.

pub mod edit;
pub mod fetch;
pub mod mark_read;
pub mod notify;
pub mod reconcile;
pub mod sort;
pub mod state;
pub mod takeover;
pub mod typing;

pub use state::{Entry, Mode, ModelState};

use std::collections::HashMap;
use std::sync::Mutex;

use nchat_core::{
    ChatId, ChatInfo, ChatMessage, Config, FeatureSet, FileId, FileInfo, FileStatus, MsgId, ProfileId,
    ProfileService, ProtocolFeature, Reactions, Request, Service, UserId, SPONSORED_TIME_SENT,
};

use edit::can_edit;
use fetch::{fetch_limit, history_size, max_history, needed_history};
use mark_read::{should_mark_read, MarkReadContext};
use notify::{should_notify, NotifyContext};
use reconcile::{reconcile_cached, reconcile_live};
use sort::sort_chats;
use takeover::TakeoverOutcome;
use typing::TypingAction;

/// Identifies a single chat within a single logged-in profile. Every
/// per-chat map in [`ModelState`] is keyed by this pair.
pub type ChatKey = (ProfileId, ChatId);

/// A request the Model wants issued to the named profile's backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    pub profile_id: ProfileId,
    pub request: Request,
}

/// Everything the async shell must do on the Model's behalf in response to
/// one key press or one inbound [`Service`]. Ordering within the vec is not
/// significant; the shell may run independent effects concurrently.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(OutgoingRequest),
    PersistMessages {
        profile_id: ProfileId,
        chat_id: ChatId,
        messages: Vec<ChatMessage>,
    },
    PersistMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        message: ChatMessage,
    },
    DeleteMessage {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
    },
    MergeReactions {
        profile_id: ProfileId,
        chat_id: ChatId,
        msg_id: MsgId,
        reactions: Reactions,
    },
    DesktopNotify {
        chat_id: ChatId,
        text: String,
    },
    TerminalBell,
    Exit,
}

/// Keys the Model interprets. Terminal-specific decoding (crossterm's
/// `KeyEvent`) lives in `crate::app`; this enum is the narrow surface the
/// Model's state machine actually switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// The configurable "edit selected message" binding (`key.conf`'s
    /// `KeyEdit`), pre-resolved by `crate::app` before reaching the Model.
    EditSelected,
    Quit,
}

/// Per-profile facts the Model needs but a backend only reveals once:
/// its `self_id` and advertised [`FeatureSet`].
#[derive(Debug, Clone)]
struct ProfileMeta {
    self_id: UserId,
    features: FeatureSet,
}

pub struct Model {
    state: Mutex<ModelState>,
    config: Config,
    profiles: Mutex<HashMap<ProfileId, ProfileMeta>>,
}

impl Model {
    pub fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(ModelState::new()),
            config,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    /// Records a backend's identity ahead of login, so later notifications
    /// from it can be reconciled against `self_id`/feature-gated policy.
    pub fn register_profile(&self, profile_id: ProfileId, self_id: UserId, features: FeatureSet) {
        self.profiles.lock().unwrap().insert(profile_id, ProfileMeta { self_id, features });
    }

    /// Runs `f` against the locked state. Kept private: every public entry
    /// point below acquires the lock exactly once, so there is never a
    /// nested-lock hazard even though `ModelState`'s mutex is not reentrant
    /// (`DESIGN.md` Open Question 2).
    fn with_state<R>(&self, f: impl FnOnce(&ModelState) -> R) -> R {
        let guard = self.state.lock().unwrap();
        f(&guard)
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut ModelState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    /// A read-only snapshot for rendering, taken under the lock and then
    /// released (`SPEC_FULL.md` §9's `ChatSnapshot`).
    pub fn snapshot(&self) -> ChatSnapshot {
        self.with_state(ChatSnapshot::capture)
    }

    fn features_for(&self, profile_id: &ProfileId) -> FeatureSet {
        self.profiles
            .lock()
            .unwrap()
            .get(profile_id)
            .map(|m| m.features)
            .unwrap_or_else(FeatureSet::empty)
    }

    /// The logged-in user id a profile registered at `register_profile`
    /// time; `None` before the profile has been registered. Exposed so
    /// callers outside the lock (e.g. `crate::app`'s attachment picker) can
    /// stamp an outgoing message's `sender_id` without reaching into the
    /// owned-mutex state.
    pub fn self_id_for(&self, profile_id: &ProfileId) -> Option<UserId> {
        self.profiles.lock().unwrap().get(profile_id).map(|m| m.self_id.clone())
    }

    fn demote_muted(&self) -> bool {
        !self.config.ui.muted_position_by_timestamp
    }

    // ---- inbound notifications -------------------------------------------------

    /// Applies one backend notification, mutating state and returning
    /// whatever effects it demands. `now_ms` is injected for the same reason
    /// `TypingDebouncer`/`can_edit` take it: deterministic tests.
    pub fn apply_service(&self, msg: ProfileService, now_ms: i64) -> Vec<Effect> {
        let profile_id = msg.profile_id;
        let features = self.features_for(&profile_id);
        let demote_muted = self.demote_muted();
        self.with_state_mut(|state| {
            apply_service_locked(state, &profile_id, msg.service, features, now_ms, demote_muted, &self.config.ui)
        })
    }

    // ---- key handling -----------------------------------------------------------

    /// Drives the `Default`/`SelectMessage`/`EditMessage` state machine
    /// (`SPEC_FULL.md` §4.3.2). Keys arriving while `mode` is `ListDialog` or
    /// `MessageDialog` are not handled here: `crate::dialog` owns key
    /// routing for as long as a dialog is on screen.
    pub fn handle_key(&self, key: Key, now_ms: i64) -> Vec<Effect> {
        if key == Key::Quit {
            return self.with_state_mut(|state| {
                state.running = false;
                vec![Effect::Exit]
            });
        }

        // Key routing is suspended for as long as a backend owns the
        // terminal (`SPEC_FULL.md` §4.3 takeover supplement): the original
        // stops reading input entirely while `IsProtocolUiControlActive`.
        if self.takeover_active() {
            return Vec::new();
        }

        let current_profile = self.with_state(|state| state.current_chat.as_ref().map(|(p, _)| p.clone()));
        let features = current_profile.as_ref().map(|p| self.features_for(p)).unwrap_or_else(FeatureSet::empty);
        let self_id = current_profile.as_ref().and_then(|p| self.self_id_for(p)).unwrap_or_else(|| UserId::from(""));

        let history_lines = self.config.ui.history_lines;
        self.with_state_mut(|state| match state.mode {
            Mode::Default => handle_key_default(state, key, now_ms, features, history_lines, &self_id),
            Mode::SelectMessage => handle_key_select(state, key, features, now_ms, history_lines),
            Mode::EditMessage => handle_key_edit(state, key, now_ms),
            Mode::ListDialog | Mode::MessageDialog => Vec::new(),
        })
    }

    /// Sets the chat currently displayed; clears per-chat transient state
    /// (selection) that does not carry over between chats.
    pub fn set_current_chat(&self, key: ChatKey) -> Vec<Effect> {
        self.with_state_mut(|state| {
            state.current_chat = Some(key.clone());
            state.selected_index = None;
            vec![Effect::Send(OutgoingRequest {
                profile_id: key.0,
                request: Request::SetCurrentChat { chat_id: key.1 },
            })]
        })
    }

    /// Sends the file at `file_path` as an attachment to `chat_key`, the way
    /// `Key::Enter` sends the entry buffer's text (`uimodel.cpp::TransferFile`):
    /// a local id is minted, the message is inserted into state immediately
    /// so it renders before the backend's echo arrives, and `outgoing_pending`
    /// tracks it the same way. Exposed so `crate::app`'s attachment picker
    /// (`F5`/`FileListDialog`) can send without the chat needing to be
    /// `current_chat` first.
    pub fn send_attachment(&self, chat_key: ChatKey, file_path: String, file_type: String, now_ms: i64) -> Vec<Effect> {
        let Some(self_id) = self.self_id_for(&chat_key.0) else { return Vec::new() };
        self.with_state_mut(|state| send_attachment_locked(state, chat_key, file_path, file_type, now_ms, &self_id))
    }

    pub fn set_terminal_active(&self, active: bool) {
        self.with_state_mut(|state| state.terminal_active = active);
    }

    pub fn set_history_interaction(&self, interacting: bool) {
        self.with_state_mut(|state| state.history_interaction = interacting);
    }

    pub fn is_running(&self) -> bool {
        self.with_state(|state| state.running)
    }

    /// Whether a backend currently owns `ProtocolUiControl` (`SPEC_FULL.md`
    /// §4.3 takeover supplement). While this is `true`, `crate::app`'s render
    /// loop suspends redraw and drops keys instead of routing them through
    /// [`Model::handle_key`], mirroring `HandleProtocolUiControlStart`
    /// tearing down the rendered screen until the owning profile releases
    /// control.
    pub fn takeover_active(&self) -> bool {
        self.with_state(|state| state.takeover.is_active())
    }
}

/// An immutable copy of the fields `crate::view` needs, captured under the
/// lock once per frame so rendering never competes with `apply_service`/
/// `handle_key` for the mutex (`DESIGN.md` Open Question 2).
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub chat_infos: HashMap<ChatKey, ChatInfo>,
    pub chat_vec: Vec<ChatKey>,
    pub contact_infos: HashMap<(ProfileId, UserId), nchat_core::ContactInfo>,
    pub current_chat: Option<ChatKey>,
    pub mode: Mode,
    pub entry_text: String,
    pub entry_cursor: usize,
    pub selected_index: Option<usize>,
    pub visible_messages: HashMap<ChatKey, Vec<ChatMessage>>,
    /// Emoji set offered by `crate::dialog::EmojiListDialog`, from the most
    /// recent `AvailableReactions` notification for the chat.
    pub available_reactions: HashMap<ChatKey, Vec<String>>,
}

impl ChatSnapshot {
    /// A chat's display name, resolved the way `GetContactListName` does: the
    /// matching contact's name, or "Saved Messages" for the self chat, or the
    /// raw chat id if no contact record has arrived yet (`SPEC_FULL.md` §9).
    pub fn chat_name(&self, key: &ChatKey) -> String {
        let contact_key = (key.0.clone(), UserId::from(key.1.as_str()));
        match self.contact_infos.get(&contact_key) {
            Some(contact) if contact.is_self => "Saved Messages".to_string(),
            Some(contact) if !contact.name.is_empty() => contact.name.clone(),
            _ => key.1.as_str().to_string(),
        }
    }

    /// A message sender's display name, resolved the way `GetContactName`
    /// does: "You" for the logged-in user, else the contact's name or id.
    pub fn sender_name(&self, profile_id: &ProfileId, sender_id: &UserId) -> String {
        let contact_key = (profile_id.clone(), sender_id.clone());
        match self.contact_infos.get(&contact_key) {
            Some(contact) if contact.is_self => "You".to_string(),
            Some(contact) if !contact.name.is_empty() => contact.name.clone(),
            _ => sender_id.as_str().to_string(),
        }
    }
}

impl ChatSnapshot {
    fn capture(state: &ModelState) -> Self {
        let visible_messages = state
            .message_vec
            .keys()
            .map(|key| {
                let offset = state.offset_for(key);
                let ids = state.message_vec_for(key);
                // Newest-first, from `offset` to the oldest cached message; `crate::view`
                // slices the terminal-height-sized window it actually renders out of this.
                let msgs = state
                    .messages
                    .get(key)
                    .map(|by_id| {
                        ids.iter()
                            .skip(offset)
                            .filter_map(|id| by_id.get(id).cloned())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                (key.clone(), msgs)
            })
            .collect();

        Self {
            chat_infos: state.chat_infos.clone(),
            chat_vec: state.chat_vec.clone(),
            contact_infos: state.contact_infos.clone(),
            available_reactions: state.available_reactions.clone(),
            current_chat: state.current_chat.clone(),
            mode: state.mode,
            entry_text: state.entry.text.clone(),
            entry_cursor: state.entry.cursor,
            selected_index: state.selected_index,
            visible_messages,
        }
    }
}

// ---- key handling, pure over &mut ModelState --------------------------------------

fn handle_key_default(
    state: &mut ModelState,
    key: Key,
    now_ms: i64,
    features: FeatureSet,
    history_lines: usize,
    self_id: &UserId,
) -> Vec<Effect> {
    match key {
        Key::Char(c) => {
            state.entry.insert_char(c);
            typing_effect(state, now_ms, features, true)
        }
        Key::Backspace => {
            state.entry.delete_char_before_cursor();
            let still_typing = !state.entry.text.is_empty();
            typing_effect(state, now_ms, features, still_typing)
        }
        Key::Left => {
            state.entry.move_left();
            Vec::new()
        }
        Key::Right => {
            state.entry.move_right();
            Vec::new()
        }
        Key::Home => {
            state.entry.move_home();
            Vec::new()
        }
        Key::End => {
            state.entry.move_end();
            Vec::new()
        }
        Key::Enter => send_current_entry(state, now_ms, features, self_id),
        Key::Esc => {
            state.entry.clear();
            typing_effect(state, now_ms, features, false)
        }
        Key::Up => {
            let Some(key) = state.current_chat.clone() else { return Vec::new() };
            if state.message_vec_for(&key).is_empty() {
                return Vec::new();
            }
            state.mode = Mode::SelectMessage;
            state.selected_index = Some(0);
            Vec::new()
        }
        Key::PageUp | Key::PageDown => paginate(state, key, history_lines),
        Key::Down | Key::EditSelected | Key::Quit => Vec::new(),
    }
}

fn handle_key_select(
    state: &mut ModelState,
    key: Key,
    features: FeatureSet,
    now_ms: i64,
    history_lines: usize,
) -> Vec<Effect> {
    let Some(chat_key) = state.current_chat.clone() else {
        state.mode = Mode::Default;
        return Vec::new();
    };
    let len = state.message_vec_for(&chat_key).len();

    match key {
        Key::Up => {
            if let Some(i) = state.selected_index {
                if i + 1 < len {
                    state.selected_index = Some(i + 1);
                }
            }
            Vec::new()
        }
        Key::Down => {
            match state.selected_index {
                Some(0) | None => {
                    state.mode = Mode::Default;
                    state.selected_index = None;
                }
                Some(i) => state.selected_index = Some(i - 1),
            }
            Vec::new()
        }
        Key::Esc => {
            state.mode = Mode::Default;
            state.selected_index = None;
            Vec::new()
        }
        Key::EditSelected => {
            let Some(index) = state.selected_index else { return Vec::new() };
            let Some(msg_id) = state.message_vec_for(&chat_key).get(index).cloned() else {
                return Vec::new();
            };
            let Some(message) = state.messages.get(&chat_key).and_then(|m| m.get(&msg_id)).cloned() else {
                return Vec::new();
            };
            match can_edit(&message, features, now_ms) {
                Ok(()) => {
                    state.entry.load(message.text.clone());
                    state.editing_message = Some((chat_key, msg_id));
                    state.mode = Mode::EditMessage;
                }
                Err(_denied) => {
                    // Denial reason is surfaced by `crate::view` via `EditDenied::message`;
                    // nothing to mutate here.
                }
            }
            Vec::new()
        }
        Key::PageUp | Key::PageDown => paginate(state, key, history_lines),
        _ => Vec::new(),
    }
}

fn handle_key_edit(state: &mut ModelState, key: Key, now_ms: i64) -> Vec<Effect> {
    match key {
        Key::Char(c) => {
            state.entry.insert_char(c);
            Vec::new()
        }
        Key::Backspace => {
            state.entry.delete_char_before_cursor();
            Vec::new()
        }
        Key::Left => {
            state.entry.move_left();
            Vec::new()
        }
        Key::Right => {
            state.entry.move_right();
            Vec::new()
        }
        Key::Home => {
            state.entry.move_home();
            Vec::new()
        }
        Key::End => {
            state.entry.move_end();
            Vec::new()
        }
        Key::Esc => {
            state.entry.restore();
            state.editing_message = None;
            state.mode = Mode::SelectMessage;
            Vec::new()
        }
        Key::Enter => {
            let Some((chat_key, msg_id)) = state.editing_message.take() else {
                state.mode = Mode::Default;
                return Vec::new();
            };
            let text = state.entry.take();
            state.mode = Mode::Default;
            state.selected_index = None;

            let Some(mut message) = state.messages.get(&chat_key).and_then(|m| m.get(&msg_id)).cloned() else {
                return Vec::new();
            };
            message.text = text;
            message.time_sent = now_ms;

            vec![Effect::Send(OutgoingRequest {
                profile_id: chat_key.0,
                request: Request::EditMessage { chat_id: chat_key.1, msg_id, message },
            })]
        }
        _ => Vec::new(),
    }
}

/// `Key::PageUp`/`Key::PageDown` over a chat's history, ported from
/// `uimodel.cpp::OnKeyPrevPage`/`OnKeyNextPage`: the jump size is
/// `min(historyShowCount, max(messageCount - messageOffset - 1, 0))`, pushed
/// onto a per-chat stack so `PageDown` can undo exactly what the matching
/// `PageUp` added rather than a flat `+1`/`-1`.
fn paginate(state: &mut ModelState, key: Key, history_lines: usize) -> Vec<Effect> {
    let Some(chat_key) = state.current_chat.clone() else { return Vec::new() };
    let offset = state.offset_for(&chat_key);

    match key {
        Key::PageUp => {
            let message_count = state.messages.get(&chat_key).map(HashMap::len).unwrap_or(0);
            let add_offset = history_lines.min(message_count.saturating_sub(offset + 1));
            if add_offset == 0 {
                return Vec::new();
            }

            let new_offset = offset + add_offset;
            state.message_offset_stack.entry(chat_key.clone()).or_default().push(add_offset);
            state.message_offset.insert(chat_key.clone(), new_offset);

            let history = state.message_vec_for(&chat_key);
            let ids: Vec<&str> = history.iter().map(MsgId::as_str).collect();
            let oldest = state.oldest_message_id.get(&chat_key).map(MsgId::as_str);
            let size = history_size(&ids, oldest);
            let needed = needed_history(new_offset, history_lines);

            if needed > size {
                let max_hist = max_history(history_lines, state.home_fetch_all);
                if let Some(limit) = fetch_limit(new_offset, max_hist, size) {
                    let from_msg_id = history.last().cloned().unwrap_or_else(|| MsgId::from(""));
                    return vec![Effect::Send(OutgoingRequest {
                        profile_id: chat_key.0.clone(),
                        request: Request::GetMessages { chat_id: chat_key.1.clone(), from_msg_id, limit },
                    })];
                }
            }
            Vec::new()
        }
        Key::PageDown => {
            let popped = state.message_offset_stack.get_mut(&chat_key).and_then(Vec::pop).unwrap_or(0);
            let dec_offset = if popped > 0 { popped } else { offset };
            if dec_offset > 0 {
                state.message_offset.insert(chat_key, offset.saturating_sub(dec_offset));
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn send_current_entry(state: &mut ModelState, now_ms: i64, features: FeatureSet, self_id: &UserId) -> Vec<Effect> {
    if state.entry.text.is_empty() {
        return Vec::new();
    }
    let Some(chat_key) = state.current_chat.clone() else { return Vec::new() };
    let text = state.entry.take();

    let id = MsgId::from(uuid::Uuid::now_v7().to_string());
    let message = ChatMessage {
        id: id.clone(),
        sender_id: self_id.clone(),
        text,
        quoted_id: None,
        quoted_text: None,
        quoted_sender: None,
        file_info: None,
        link: None,
        reactions: Reactions::default(),
        time_sent: now_ms,
        is_outgoing: true,
        is_read: true,
        has_mention: false,
    };

    state.outgoing_pending.entry(chat_key.clone()).or_default().push_back(id);
    state.message_vec.entry(chat_key.clone()).or_default().insert(0, message.id.clone());
    state.messages.entry(chat_key.clone()).or_default().insert(message.id.clone(), message.clone());

    let mut effects = vec![Effect::Send(OutgoingRequest {
        profile_id: chat_key.0.clone(),
        request: Request::SendMessage { chat_id: chat_key.1, message },
    })];
    effects.extend(typing_effect(state, now_ms, features, false));
    effects
}

fn send_attachment_locked(
    state: &mut ModelState,
    chat_key: ChatKey,
    file_path: String,
    file_type: String,
    now_ms: i64,
    self_id: &UserId,
) -> Vec<Effect> {
    let file_info = FileInfo { file_status: FileStatus::Downloaded, file_id: FileId::new(""), file_path, file_type };
    let id = MsgId::from(uuid::Uuid::now_v7().to_string());
    let message = ChatMessage {
        id: id.clone(),
        sender_id: self_id.clone(),
        text: String::new(),
        quoted_id: None,
        quoted_text: None,
        quoted_sender: None,
        file_info: Some(file_info.to_hex()),
        link: None,
        reactions: Reactions::default(),
        time_sent: now_ms,
        is_outgoing: true,
        is_read: true,
        has_mention: false,
    };

    state.outgoing_pending.entry(chat_key.clone()).or_default().push_back(id);
    state.message_vec.entry(chat_key.clone()).or_default().insert(0, message.id.clone());
    state.messages.entry(chat_key.clone()).or_default().insert(message.id.clone(), message.clone());

    vec![Effect::Send(OutgoingRequest {
        profile_id: chat_key.0.clone(),
        request: Request::SendMessage { chat_id: chat_key.1, message },
    })]
}

fn typing_effect(state: &mut ModelState, now_ms: i64, features: FeatureSet, is_typing: bool) -> Vec<Effect> {
    let Some((profile_id, chat_id)) = state.current_chat.clone() else { return Vec::new() };
    let has_timeout = features.has(ProtocolFeature::TypingTimeout);
    match state.typing.set_typing(&profile_id, &chat_id, is_typing, has_timeout, now_ms) {
        TypingAction::None => Vec::new(),
        TypingAction::Send { is_typing } => vec![Effect::Send(OutgoingRequest {
            profile_id,
            request: Request::SendTyping { chat_id, is_typing },
        })],
    }
}

// ---- service application, pure over &mut ModelState -------------------------------

fn apply_service_locked(
    state: &mut ModelState,
    profile_id: &ProfileId,
    service: Service,
    features: FeatureSet,
    now_ms: i64,
    demote_muted: bool,
    ui: &nchat_core::UiConfig,
) -> Vec<Effect> {
    match service {
        Service::Connect { success } => {
            if success {
                state.connect_time.insert(profile_id.clone(), now_ms);
                let mut effects = Vec::new();
                if features.has(ProtocolFeature::AutoGetContactsOnLogin) {
                    effects.push(Effect::Send(OutgoingRequest {
                        profile_id: profile_id.clone(),
                        request: Request::GetContacts,
                    }));
                }
                if features.has(ProtocolFeature::AutoGetChatsOnLogin) {
                    effects.push(Effect::Send(OutgoingRequest {
                        profile_id: profile_id.clone(),
                        request: Request::GetChats { chat_id: None },
                    }));
                }
                effects
            } else {
                Vec::new()
            }
        }

        Service::NewContacts { contacts, full_sync } => {
            if full_sync {
                state.contact_infos.retain(|(p, _), _| p != profile_id);
            }
            for contact in contacts {
                state.contact_infos.insert((profile_id.clone(), contact.id.clone()), contact);
            }
            Vec::new()
        }

        Service::NewChats { chats } => {
            for chat in chats {
                let key = (profile_id.clone(), chat.id.clone());
                if !state.chat_infos.contains_key(&key) {
                    state.chat_vec.push(key.clone());
                }
                state.chat_infos.insert(key, chat);
            }
            resort(state, demote_muted);
            Vec::new()
        }

        Service::NewMessages { chat_id, messages, from_msg_id: _, cached, sequence: _ } => {
            let key = (profile_id.clone(), chat_id.clone());
            let mut effects = Vec::new();
            let connect_time = state.connect_time.get(profile_id).copied().unwrap_or(i64::MAX);

            for incoming in messages {
                let merged = match state.messages.get(&key).and_then(|m| m.get(&incoming.id)) {
                    Some(existing) if cached => reconcile_cached(existing, &incoming),
                    Some(existing) => reconcile_live(existing, &incoming),
                    None => incoming.clone(),
                };

                let is_new = !state.messages.get(&key).map(|m| m.contains_key(&merged.id)).unwrap_or(false);
                if is_new {
                    let vec = state.message_vec.entry(key.clone()).or_default();
                    let pos = vec
                        .iter()
                        .position(|id| {
                            state.messages.get(&key).and_then(|m| m.get(id)).map(|m| m.time_sent).unwrap_or(0)
                                < merged.time_sent
                        })
                        .unwrap_or(vec.len());
                    vec.insert(pos, merged.id.clone());
                }

                state.messages.entry(key.clone()).or_default().insert(merged.id.clone(), merged.clone());

                if !cached {
                    update_last_message_time(state, &key, &merged, demote_muted);

                    if state.current_chat.is_none() && merged.time_sent > connect_time {
                        state.current_chat = Some(key.clone());
                    }

                    let notify_ctx = NotifyContext {
                        is_incoming: !merged.is_outgoing,
                        terminal_active: state.terminal_active,
                        is_current_chat: state.current_chat.as_ref() == Some(&key),
                        desktop_notify_active_current: ui.desktop_notify_active_current,
                        desktop_notify_active_noncurrent: ui.desktop_notify_active_noncurrent,
                        desktop_notify_inactive: ui.desktop_notify_inactive,
                        terminal_bell_active: ui.terminal_bell_active,
                        terminal_bell_inactive: ui.terminal_bell_inactive,
                    };
                    let action = should_notify(notify_ctx);
                    if action.desktop {
                        effects.push(Effect::DesktopNotify { chat_id: chat_id.clone(), text: merged.text.clone() });
                    }
                    if action.bell {
                        effects.push(Effect::TerminalBell);
                    }

                    let was_unread = state.chat_infos.get(&key).map(|c| c.is_unread).unwrap_or(false);
                    let mark_read_ctx = MarkReadContext {
                        was_unread,
                        mark_read_every_view: features.has(ProtocolFeature::MarkReadEveryView),
                        mark_read_on_view: ui.mark_read_on_view,
                        history_interaction: state.history_interaction,
                        terminal_active: state.terminal_active,
                        mark_read_when_inactive: ui.mark_read_when_inactive,
                        current_chat_set: state.current_chat.as_ref() == Some(&key),
                        mark_read_any_chat: ui.mark_read_any_chat,
                        in_displayed_slice: state.current_chat.as_ref() == Some(&key),
                    };
                    if should_mark_read(mark_read_ctx) {
                        effects.push(Effect::Send(OutgoingRequest {
                            profile_id: profile_id.clone(),
                            request: Request::MarkMessageRead {
                                chat_id: chat_id.clone(),
                                sender_id: merged.sender_id.clone(),
                                msg_id: merged.id.clone(),
                                read_all_reactions: false,
                            },
                        }));
                    }
                }
            }

            effects.push(Effect::PersistMessages {
                profile_id: profile_id.clone(),
                chat_id,
                messages: state.message_vec_for(&key).iter().filter_map(|id| state.messages.get(&key).and_then(|m| m.get(id)).cloned()).collect(),
            });
            effects
        }

        Service::SendMessage { chat_id, message, success } => {
            let key = (profile_id.clone(), chat_id.clone());
            if !success {
                return Vec::new();
            }

            if let Some(pending) = state.outgoing_pending.get_mut(&key) {
                if let Some(temp_id) = pending.pop_front() {
                    if temp_id != message.id {
                        if let Some(vec) = state.message_vec.get_mut(&key) {
                            vec.retain(|id| *id != temp_id);
                        }
                        if let Some(m) = state.messages.get_mut(&key) {
                            m.remove(&temp_id);
                        }
                    }
                }
            }

            let merged = match state.messages.get(&key).and_then(|m| m.get(&message.id)) {
                Some(existing) => reconcile_cached(existing, &message),
                None => message,
            };

            let is_new = !state.messages.get(&key).map(|m| m.contains_key(&merged.id)).unwrap_or(false);
            if is_new {
                state.message_vec.entry(key.clone()).or_default().insert(0, merged.id.clone());
            }
            state.messages.entry(key.clone()).or_default().insert(merged.id.clone(), merged.clone());
            update_last_message_time(state, &key, &merged, demote_muted);

            vec![Effect::PersistMessage { profile_id: profile_id.clone(), chat_id, message: merged }]
        }

        Service::MarkMessageRead { chat_id, msg_id, success } => {
            if !success {
                return Vec::new();
            }
            let key = (profile_id.clone(), chat_id.clone());
            if let Some(message) = state.messages.get_mut(&key).and_then(|m| m.get_mut(&msg_id)) {
                message.is_read = true;
                return vec![Effect::PersistMessage { profile_id: profile_id.clone(), chat_id: key.1, message: message.clone() }];
            }
            Vec::new()
        }

        Service::DeleteMessage { chat_id, msg_id, success } => {
            if !success {
                return Vec::new();
            }
            let key = (profile_id.clone(), chat_id.clone());
            if let Some(vec) = state.message_vec.get_mut(&key) {
                vec.retain(|id| *id != msg_id);
            }
            if let Some(m) = state.messages.get_mut(&key) {
                m.remove(&msg_id);
            }
            vec![Effect::DeleteMessage { profile_id: profile_id.clone(), chat_id: key.1, msg_id }]
        }

        Service::DeleteChat { chat_id, success } => {
            if !success {
                return Vec::new();
            }
            let key = (profile_id.clone(), chat_id);
            state.chat_infos.remove(&key);
            state.chat_vec.retain(|k| *k != key);
            state.message_vec.remove(&key);
            state.messages.remove(&key);
            if state.current_chat.as_ref() == Some(&key) {
                state.current_chat = None;
            }
            Vec::new()
        }

        Service::SendTyping { .. } => Vec::new(),

        Service::SetStatus { .. } => Vec::new(),

        Service::CreateChat { chat_id, success } => {
            if !success {
                return Vec::new();
            }
            let key = (profile_id.clone(), chat_id.clone());
            state.chat_infos.entry(key.clone()).or_insert_with(|| ChatInfo::new(chat_id));
            if !state.chat_vec.contains(&key) {
                state.chat_vec.push(key.clone());
            }
            state.current_chat = Some(key);
            resort(state, demote_muted);
            Vec::new()
        }

        Service::ReceiveTyping { chat_id, user_id, is_typing } => {
            let key = (profile_id.clone(), chat_id);
            let set = state.users_typing.entry(key).or_default();
            if is_typing {
                set.insert(user_id);
            } else {
                set.remove(&user_id);
            }
            Vec::new()
        }

        Service::ReceiveStatus { user_id, is_online } => {
            state.user_online.insert((profile_id.clone(), user_id), is_online);
            Vec::new()
        }

        Service::NewMessageStatus { chat_id, msg_id, is_read } => {
            let key = (profile_id.clone(), chat_id.clone());
            if let Some(message) = state.messages.get_mut(&key).and_then(|m| m.get_mut(&msg_id)) {
                message.is_read = message.is_read || is_read;
                return vec![Effect::PersistMessage { profile_id: profile_id.clone(), chat_id, message: message.clone() }];
            }
            Vec::new()
        }

        Service::NewMessageFile { chat_id, msg_id, file_id, file_path } => {
            let key = (profile_id.clone(), chat_id.clone());
            if let Some(message) = state.messages.get_mut(&key).and_then(|m| m.get_mut(&msg_id)) {
                let mut info = message
                    .file_info
                    .as_deref()
                    .and_then(|hex| FileInfo::from_hex(hex).ok())
                    .unwrap_or(FileInfo {
                        file_status: FileStatus::NotDownloaded,
                        file_id,
                        file_path: String::new(),
                        file_type: String::new(),
                    });
                info.file_status = FileStatus::Downloaded;
                info.file_path = file_path;
                message.file_info = Some(info.to_hex());
                return vec![Effect::PersistMessage { profile_id: profile_id.clone(), chat_id, message: message.clone() }];
            }
            Vec::new()
        }

        Service::UpdateMute { chat_id, is_muted } => {
            let key = (profile_id.clone(), chat_id);
            if let Some(info) = state.chat_infos.get_mut(&key) {
                info.is_muted = is_muted;
            }
            resort(state, demote_muted);
            Vec::new()
        }

        Service::UpdatePin { chat_id, is_pinned, time_pinned } => {
            let key = (profile_id.clone(), chat_id);
            if is_pinned {
                state.pin_times.insert(key.clone(), time_pinned);
            } else {
                state.pin_times.remove(&key);
            }
            if let Some(info) = state.chat_infos.get_mut(&key) {
                info.is_pinned = is_pinned;
                info.last_message_time = if is_pinned { time_pinned } else { newest_message_time(state, &key) };
            }
            resort(state, demote_muted);
            Vec::new()
        }

        Service::NewMessageReactions { chat_id, msg_id, reactions } => {
            let key = (profile_id.clone(), chat_id.clone());
            if let Some(message) = state.messages.get_mut(&key).and_then(|m| m.get_mut(&msg_id)) {
                message.reactions = reactions.clone();
                return vec![Effect::MergeReactions { profile_id: profile_id.clone(), chat_id, msg_id, reactions }];
            }
            Vec::new()
        }

        Service::AvailableReactions { chat_id, emojis } => {
            state.available_reactions.insert((profile_id.clone(), chat_id), emojis);
            Vec::new()
        }

        Service::FindMessage { chat_id, msg_id } => {
            let key = (profile_id.clone(), chat_id);
            if let Some(msg_id) = msg_id {
                if let Some(index) = state.message_vec_for(&key).iter().position(|id| *id == msg_id) {
                    state.current_chat = Some(key);
                    state.selected_index = Some(index);
                    state.mode = Mode::SelectMessage;
                }
            }
            Vec::new()
        }

        Service::ProtocolUiControl { take_control } => {
            match state.takeover.request(profile_id, take_control) {
                TakeoverOutcome::Denied => vec![Effect::Send(OutgoingRequest {
                    profile_id: profile_id.clone(),
                    request: Request::ProtocolUiControl { take_control: false },
                })],
                TakeoverOutcome::Granted | TakeoverOutcome::Released | TakeoverOutcome::Ignored => Vec::new(),
            }
        }

        Service::RequestAppExit => {
            state.running = false;
            vec![Effect::Exit]
        }
    }
}

fn resort(state: &mut ModelState, demote_muted: bool) {
    let mut pairs: Vec<(&ChatId, &ChatInfo)> = state
        .chat_infos
        .iter()
        .map(|((_, chat_id), info)| (chat_id, info))
        .collect();
    sort_chats(&mut pairs, demote_muted);
    let order: Vec<ChatId> = pairs.into_iter().map(|(id, _)| id.clone()).collect();
    state.chat_vec.sort_by_key(|(_, chat_id)| order.iter().position(|id| id == chat_id).unwrap_or(usize::MAX));
}

fn newest_message_time(state: &ModelState, key: &ChatKey) -> i64 {
    state
        .message_vec_for(key)
        .iter()
        .filter_map(|id| state.messages.get(key).and_then(|m| m.get(id)))
        .filter(|m| m.time_sent != SPONSORED_TIME_SENT)
        .map(|m| m.time_sent)
        .max()
        .unwrap_or(0)
}

fn update_last_message_time(state: &mut ModelState, key: &ChatKey, message: &ChatMessage, demote_muted: bool) {
    if message.time_sent == SPONSORED_TIME_SENT {
        return;
    }
    if state.pin_times.contains_key(key) {
        return; // a pinned chat's ordering key is its pin time, not its newest message
    }
    if let Some(info) = state.chat_infos.get_mut(key) {
        if message.time_sent > info.last_message_time {
            info.last_message_time = message.time_sent;
        }
    }
    resort(state, demote_muted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nchat_core::ChatId;

    fn config() -> Config {
        Config::default()
    }

    fn profile() -> ProfileId {
        ProfileId::new("demo_1")
    }

    fn chat() -> ChatId {
        ChatId::new("c1")
    }

    #[test]
    fn connect_with_auto_get_chats_issues_get_chats_request() {
        let model = Model::new(config());
        let features = FeatureSet::empty().with(ProtocolFeature::AutoGetChatsOnLogin);
        model.register_profile(profile(), UserId::new("self"), features);

        let effects = model.apply_service(
            ProfileService { profile_id: profile(), service: Service::Connect { success: true } },
            1000,
        );
        assert!(effects.iter().any(|e| matches!(e, Effect::Send(OutgoingRequest { request: Request::GetChats { .. }, .. }))));
    }

    #[test]
    fn new_chats_are_visible_and_sorted() {
        let model = Model::new(config());
        let mut a = ChatInfo::new(ChatId::new("a"));
        a.last_message_time = 10;
        let mut b = ChatInfo::new(ChatId::new("b"));
        b.last_message_time = 20;

        model.apply_service(
            ProfileService { profile_id: profile(), service: Service::NewChats { chats: vec![a, b] } },
            0,
        );

        let snapshot = model.snapshot();
        assert_eq!(snapshot.chat_vec[0], (profile(), ChatId::new("b")));
    }

    #[test]
    fn typed_text_and_enter_sends_message_and_clears_entry() {
        let model = Model::new(config());
        model.apply_service(
            ProfileService {
                profile_id: profile(),
                service: Service::NewChats { chats: vec![ChatInfo::new(chat())] },
            },
            0,
        );
        model.set_current_chat((profile(), chat()));

        model.handle_key(Key::Char('h'), 0);
        model.handle_key(Key::Char('i'), 0);
        let effects = model.handle_key(Key::Enter, 0);

        assert!(effects.iter().any(|e| matches!(e, Effect::Send(OutgoingRequest { request: Request::SendMessage { .. }, .. }))));
        let snapshot = model.snapshot();
        assert_eq!(snapshot.entry_text, "");
    }

    #[test]
    fn send_message_echo_replaces_temp_id_with_real_id() {
        let model = Model::new(config());
        model.apply_service(
            ProfileService {
                profile_id: profile(),
                service: Service::NewChats { chats: vec![ChatInfo::new(chat())] },
            },
            0,
        );
        model.set_current_chat((profile(), chat()));
        model.handle_key(Key::Char('h'), 0);
        model.handle_key(Key::Enter, 0);

        let key = (profile(), chat());
        let temp_id = model.with_state(|s| s.message_vec_for(&key)[0].clone());

        let mut confirmed = ChatMessage {
            id: MsgId::new("real-id-1"),
            sender_id: UserId::new("self"),
            text: "h".into(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent: 0,
            is_outgoing: true,
            is_read: true,
            has_mention: false,
        };
        confirmed.id = MsgId::new("real-id-1");

        model.apply_service(
            ProfileService {
                profile_id: profile(),
                service: Service::SendMessage { chat_id: chat(), message: confirmed, success: true },
            },
            0,
        );

        let ids = model.with_state(|s| s.message_vec_for(&key).to_vec());
        assert!(!ids.contains(&temp_id));
        assert!(ids.contains(&MsgId::new("real-id-1")));
    }

    #[test]
    fn select_message_and_edit_denied_when_too_old() {
        let model = Model::new(config());
        let key = (profile(), chat());
        model.apply_service(
            ProfileService { profile_id: profile(), service: Service::NewChats { chats: vec![ChatInfo::new(chat())] } },
            0,
        );
        let old_message = ChatMessage {
            id: MsgId::new("m1"),
            sender_id: UserId::new("self"),
            text: "old".into(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent: 0,
            is_outgoing: true,
            is_read: true,
            has_mention: false,
        };
        model.apply_service(
            ProfileService {
                profile_id: profile(),
                service: Service::NewMessages {
                    chat_id: chat(),
                    messages: vec![old_message],
                    from_msg_id: MsgId::new(""),
                    cached: false,
                    sequence: 0,
                },
            },
            0,
        );
        model.set_current_chat(key.clone());
        model.register_profile(profile(), UserId::new("self"), FeatureSet::empty().with(ProtocolFeature::EditWithinFifteenMins));

        model.handle_key(Key::Up, 0);
        model.handle_key(Key::EditSelected, 20 * 60 * 1000);

        let mode = model.with_state(|s| s.mode);
        assert_eq!(mode, Mode::SelectMessage); // edit denied, stays in selection mode
    }

    #[test]
    fn page_up_jumps_by_history_lines_not_by_one() {
        let mut cfg = config();
        cfg.ui.history_lines = 10;
        let model = Model::new(cfg);
        let key = (profile(), chat());

        model.apply_service(
            ProfileService { profile_id: profile(), service: Service::NewChats { chats: vec![ChatInfo::new(chat())] } },
            0,
        );
        let messages: Vec<ChatMessage> = (0..30)
            .map(|i| ChatMessage {
                id: MsgId::from(format!("m{i}")),
                sender_id: UserId::new("self"),
                text: format!("msg {i}"),
                quoted_id: None,
                quoted_text: None,
                quoted_sender: None,
                file_info: None,
                link: None,
                reactions: Reactions::default(),
                time_sent: i,
                is_outgoing: true,
                is_read: true,
                has_mention: false,
            })
            .collect();
        model.apply_service(
            ProfileService {
                profile_id: profile(),
                service: Service::NewMessages { chat_id: chat(), messages, from_msg_id: MsgId::new(""), cached: true, sequence: 0 },
            },
            0,
        );
        model.set_current_chat(key.clone());

        model.handle_key(Key::PageUp, 0);
        let offset = model.with_state(|s| s.offset_for(&key));
        assert_eq!(offset, 10); // min(10, 30 - 0 - 1) = 10, not 1

        model.handle_key(Key::PageUp, 0);
        let offset = model.with_state(|s| s.offset_for(&key));
        assert_eq!(offset, 20); // min(10, 30 - 10 - 1) = 10

        model.handle_key(Key::PageDown, 0);
        let offset = model.with_state(|s| s.offset_for(&key));
        assert_eq!(offset, 10); // undoes exactly the jump the matching PageUp added

        model.handle_key(Key::PageDown, 0);
        let offset = model.with_state(|s| s.offset_for(&key));
        assert_eq!(offset, 0);
    }
}
