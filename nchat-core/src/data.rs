//! Core data model: contacts, chats, messages, file attachments, reactions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, FileId, UserId};

/// Timestamp sentinel marking a backend-injected sponsored message. Sponsored
/// messages sort normally in `messageVec` but are skipped when computing a
/// chat's newest message for ordering/unread purposes.
pub const SPONSORED_TIME_SENT: i64 = i64::MAX;

/// Identifies a user or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub id: UserId,
    pub name: String,
    pub phone: String,
    /// Marks the logged-in user; their chat is shown as "Saved Messages".
    pub is_self: bool,
    /// True if the displayed name is a local alias rather than a stored contact name.
    pub is_alias: bool,
}

/// Chat ordering key and presence flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: ChatId,
    pub is_unread: bool,
    pub is_unread_mention: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub last_message_time: i64,
    pub transcription_language: Option<String>,
}

impl ChatInfo {
    pub fn new(id: ChatId) -> Self {
        Self {
            id,
            is_unread: false,
            is_unread_mention: false,
            is_muted: false,
            is_pinned: false,
            last_message_time: 0,
            transcription_language: None,
        }
    }
}

/// `fileStatus` lifecycle of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    None,
    NotDownloaded,
    Downloaded,
    Downloading,
    DownloadFailed,
}

/// Describes a message attachment. Encoded as a hex blob inside
/// [`ChatMessage::file_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_status: FileStatus,
    pub file_id: FileId,
    pub file_path: String,
    pub file_type: String,
}

impl FileInfo {
    /// Serializes to the hex-blob representation stored in `ChatMessage.file_info`.
    pub fn to_hex(&self) -> String {
        let json = serde_json::to_vec(self).expect("FileInfo always serializes");
        hex_encode(&json)
    }

    /// Parses a hex-blob representation produced by [`FileInfo::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid hex or does not decode to a
    /// well-formed `FileInfo`.
    pub fn from_hex(s: &str) -> Result<Self, FileInfoError> {
        let bytes = hex_decode(s).ok_or(FileInfoError::InvalidHex)?;
        serde_json::from_slice(&bytes).map_err(|_| FileInfoError::InvalidEncoding)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileInfoError {
    #[error("file info blob is not valid hex")]
    InvalidHex,
    #[error("file info blob does not decode to a well-formed FileInfo")]
    InvalidEncoding,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Emoji reactions on a single message.
///
/// The three `need*`/`update*`/`replace*` flags instruct the cache how to
/// combine this value with whatever it already has stored, rather than
/// blindly overwriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reactions {
    pub sender_emojis: HashMap<String, String>,
    pub emoji_counts: HashMap<String, i64>,
    pub need_consolidation_with_cache: bool,
    pub update_count_based_on_sender: bool,
    pub replace_count: bool,
}

impl Default for Reactions {
    fn default() -> Self {
        Self {
            sender_emojis: HashMap::new(),
            emoji_counts: HashMap::new(),
            need_consolidation_with_cache: false,
            update_count_based_on_sender: false,
            replace_count: false,
        }
    }
}

// The upstream C++ `Reactions::operator!=` returned `*this == other` (a
// transcription bug). `#[derive(PartialEq)]` gives `!=` as the true negation
// of `==` for free, so the bug has no Rust equivalent to reproduce — pinned
// by a regression test below.

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: crate::ids::MsgId,
    pub sender_id: UserId,
    pub text: String,
    pub quoted_id: Option<crate::ids::MsgId>,
    pub quoted_text: Option<String>,
    pub quoted_sender: Option<UserId>,
    /// Hex-encoded [`FileInfo`], if this message carries an attachment.
    pub file_info: Option<String>,
    pub link: Option<String>,
    pub reactions: Reactions,
    /// Milliseconds since epoch, or [`SPONSORED_TIME_SENT`] for a sponsored message.
    pub time_sent: i64,
    pub is_outgoing: bool,
    pub is_read: bool,
    pub has_mention: bool,
}

impl ChatMessage {
    pub fn is_sponsored(&self) -> bool {
        self.time_sent == SPONSORED_TIME_SENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file_info() -> FileInfo {
        FileInfo {
            file_status: FileStatus::Downloaded,
            file_id: FileId::new("f1"),
            file_path: "/tmp/photo.jpg".to_string(),
            file_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn file_info_hex_round_trips() {
        let info = sample_file_info();
        let hex = info.to_hex();
        let back = FileInfo::from_hex(&hex).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn file_info_from_hex_rejects_odd_length() {
        assert!(matches!(FileInfo::from_hex("abc"), Err(FileInfoError::InvalidHex)));
    }

    #[test]
    fn file_info_from_hex_rejects_non_hex() {
        assert!(matches!(FileInfo::from_hex("zz"), Err(FileInfoError::InvalidHex)));
    }

    #[test]
    fn sponsored_message_detected_by_sentinel() {
        let msg = ChatMessage {
            id: crate::ids::MsgId::new("m1"),
            sender_id: UserId::new("u1"),
            text: String::new(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent: SPONSORED_TIME_SENT,
            is_outgoing: false,
            is_read: true,
            has_mention: false,
        };
        assert!(msg.is_sponsored());
    }

    #[test]
    fn reactions_inequality_is_the_obvious_negation() {
        let a = Reactions::default();
        let mut b = Reactions::default();
        assert_eq!(a, b);
        assert!(!(a != b));

        b.emoji_counts.insert("👍".to_string(), 1);
        assert_ne!(a, b);
        assert!(a != b);
    }
}
