//! Inbound notifications a backend delivers to the Model.
//!
//! As with [`super::request::Request`], this replaces the original's
//! `ServiceMessage` subclass hierarchy with a single tagged union.

use crate::data::{ChatInfo, ChatMessage, ContactInfo, Reactions};
use crate::ids::{ChatId, FileId, MsgId, ProfileId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum Service {
    Connect {
        success: bool,
    },
    NewContacts {
        contacts: Vec<ContactInfo>,
        full_sync: bool,
    },
    NewChats {
        chats: Vec<ChatInfo>,
    },
    NewMessages {
        chat_id: ChatId,
        messages: Vec<ChatMessage>,
        from_msg_id: MsgId,
        cached: bool,
        sequence: u64,
    },
    SendMessage {
        chat_id: ChatId,
        message: ChatMessage,
        success: bool,
    },
    MarkMessageRead {
        chat_id: ChatId,
        msg_id: MsgId,
        success: bool,
    },
    DeleteMessage {
        chat_id: ChatId,
        msg_id: MsgId,
        success: bool,
    },
    DeleteChat {
        chat_id: ChatId,
        success: bool,
    },
    SendTyping {
        chat_id: ChatId,
        is_typing: bool,
        success: bool,
    },
    SetStatus {
        is_online: bool,
        success: bool,
    },
    CreateChat {
        chat_id: ChatId,
        success: bool,
    },
    ReceiveTyping {
        chat_id: ChatId,
        user_id: UserId,
        is_typing: bool,
    },
    ReceiveStatus {
        user_id: UserId,
        is_online: bool,
    },
    NewMessageStatus {
        chat_id: ChatId,
        msg_id: MsgId,
        is_read: bool,
    },
    NewMessageFile {
        chat_id: ChatId,
        msg_id: MsgId,
        file_id: FileId,
        file_path: String,
    },
    UpdateMute {
        chat_id: ChatId,
        is_muted: bool,
    },
    UpdatePin {
        chat_id: ChatId,
        is_pinned: bool,
        time_pinned: i64,
    },
    NewMessageReactions {
        chat_id: ChatId,
        msg_id: MsgId,
        reactions: Reactions,
    },
    AvailableReactions {
        chat_id: ChatId,
        emojis: Vec<String>,
    },
    FindMessage {
        chat_id: ChatId,
        msg_id: Option<MsgId>,
    },
    /// `take_control == true` begins a takeover; `false` ends it. See
    /// the model's takeover channel for how this is arbitrated.
    ProtocolUiControl {
        take_control: bool,
    },
    RequestAppExit,
}

/// A [`Service`] tagged with the profile that produced it — every inbound
/// notification path needs to know which profile it came from before it can
/// reach the right per-profile chat state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileService {
    pub profile_id: ProfileId,
    pub service: Service,
}
