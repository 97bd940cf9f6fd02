//! Requests the Model issues to a backend.
//!
//! Replaces the original's deep `RequestMessage` class hierarchy with a
//! single tagged union; dispatch on the backend side becomes pattern
//! matching instead of a `messageType` enum switch.

use crate::data::ChatMessage;
use crate::ids::{ChatId, FileId, MsgId, UserId};

/// What to do with a downloaded file once `DownloadFile` completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFileAction {
    None,
    Open,
    OpenPager,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetContacts,
    GetChats {
        chat_id: Option<ChatId>,
    },
    GetStatus {
        user_id: UserId,
    },
    GetMessage {
        chat_id: ChatId,
        msg_id: MsgId,
        cached: bool,
    },
    GetMessages {
        chat_id: ChatId,
        from_msg_id: MsgId,
        limit: usize,
    },
    SendMessage {
        chat_id: ChatId,
        message: ChatMessage,
    },
    EditMessage {
        chat_id: ChatId,
        msg_id: MsgId,
        message: ChatMessage,
    },
    MarkMessageRead {
        chat_id: ChatId,
        sender_id: UserId,
        msg_id: MsgId,
        read_all_reactions: bool,
    },
    DeleteMessage {
        chat_id: ChatId,
        msg_id: MsgId,
    },
    DeleteChat {
        chat_id: ChatId,
    },
    SendTyping {
        chat_id: ChatId,
        is_typing: bool,
    },
    SetStatus {
        is_online: bool,
    },
    CreateChat {
        user_id: UserId,
    },
    SetCurrentChat {
        chat_id: ChatId,
    },
    DownloadFile {
        chat_id: ChatId,
        msg_id: MsgId,
        file_id: FileId,
        action: DownloadFileAction,
    },
    SendReaction {
        chat_id: ChatId,
        msg_id: MsgId,
        emoji: String,
    },
    GetAvailableReactions {
        chat_id: ChatId,
    },
    FindMessage {
        chat_id: ChatId,
        query: String,
    },
    /// Answers a backend's `Service::ProtocolUiControl`: `take_control` is
    /// always `false` here, sent back immediately when a concurrent
    /// take-control attempt is denied because another profile already holds
    /// the terminal (`SPEC_FULL.md` §4.3 takeover supplement, Scenario E).
    ProtocolUiControl {
        take_control: bool,
    },
    Reinit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_variants_are_structurally_comparable() {
        let a = Request::GetContacts;
        let b = Request::GetContacts;
        assert_eq!(a, b);

        let c = Request::GetStatus { user_id: UserId::new("u1") };
        assert_ne!(a, c);
    }
}
