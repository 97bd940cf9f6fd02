//! Durable per-profile storage of contacts, chats and messages.

pub mod sqlite;

pub use sqlite::SqliteCache;

use async_trait::async_trait;
use thiserror::Error;

use crate::data::{ChatInfo, ChatMessage, ContactInfo, Reactions};
use crate::ids::{ChatId, MsgId, ProfileId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(String),

    #[error("cache migration error: {0}")]
    Migration(String),

    #[error("invalid cached data: {0}")]
    InvalidData(String),
}

/// Hexagonal port for per-profile persistent storage. A cache miss is not an
/// error — it surfaces as an empty result, never a `CacheError`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Idempotent open/create of the per-profile store at schema `db_version`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Migration`] if the on-disk schema cannot be
    /// brought to `db_version`.
    async fn add_profile(&self, profile_id: &ProfileId, db_version: u32) -> Result<(), CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    async fn fetch_contacts(&self, profile_id: &ProfileId) -> Result<Vec<ContactInfo>, CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    async fn fetch_chats(&self, profile_id: &ProfileId) -> Result<Vec<ChatInfo>, CacheError>;

    /// Returns messages with `time_sent <= from_id`'s timestamp, newest
    /// first, capped at `limit`. An empty `from_id` fetches the newest page.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    async fn fetch_messages_from(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        from_id: Option<&MsgId>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the write fails.
    async fn add_messages(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        messages: &[ChatMessage],
    ) -> Result<(), CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the write fails.
    async fn update_message(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        message: &ChatMessage,
    ) -> Result<(), CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the write fails.
    async fn delete_message(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        msg_id: &MsgId,
    ) -> Result<(), CacheError>;

    /// Combines `incoming` with whatever reactions are already on record for
    /// `msg_id`, honoring the three consolidation flags on `incoming`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the read-modify-write fails.
    async fn merge_reactions(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        msg_id: &MsgId,
        incoming: &Reactions,
    ) -> Result<Reactions, CacheError>;
}

/// Combines `existing` (possibly `None`, on a first sighting) with `incoming`
/// per the consolidation flags. Extracted as a pure function so the merge
/// policy (§4.2) can be unit tested without a database.
pub fn merge_reactions(existing: Option<&Reactions>, incoming: &Reactions) -> Reactions {
    let Some(existing) = existing else {
        return incoming.clone();
    };

    if !incoming.need_consolidation_with_cache {
        return incoming.clone();
    }

    let mut merged = existing.clone();

    for (sender, emoji) in &incoming.sender_emojis {
        merged.sender_emojis.insert(sender.clone(), emoji.clone());
    }

    for (emoji, count) in &incoming.emoji_counts {
        if incoming.replace_count {
            merged.emoji_counts.insert(emoji.clone(), *count);
        } else if incoming.update_count_based_on_sender {
            // The sender's prior emoji (if different) loses one count; the
            // new emoji gains one — counted once per sender, not additively.
            *merged.emoji_counts.entry(emoji.clone()).or_insert(0) = *count;
        } else {
            *merged.emoji_counts.entry(emoji.clone()).or_insert(0) += *count;
        }
    }

    merged.need_consolidation_with_cache = false;
    merged.update_count_based_on_sender = false;
    merged.replace_count = false;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reactions_with(counts: &[(&str, i64)]) -> Reactions {
        Reactions {
            sender_emojis: HashMap::new(),
            emoji_counts: counts.iter().map(|(e, c)| (e.to_string(), *c)).collect(),
            need_consolidation_with_cache: false,
            update_count_based_on_sender: false,
            replace_count: false,
        }
    }

    #[test]
    fn merge_with_no_existing_returns_incoming() {
        let incoming = reactions_with(&[("👍", 1)]);
        let merged = merge_reactions(None, &incoming);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn merge_without_consolidation_flag_overwrites() {
        let existing = reactions_with(&[("👍", 3)]);
        let incoming = reactions_with(&[("❤️", 1)]);
        let merged = merge_reactions(Some(&existing), &incoming);
        assert_eq!(merged, incoming);
    }

    #[test]
    fn merge_with_consolidation_adds_counts() {
        let existing = reactions_with(&[("👍", 3)]);
        let mut incoming = reactions_with(&[("👍", 1)]);
        incoming.need_consolidation_with_cache = true;
        let merged = merge_reactions(Some(&existing), &incoming);
        assert_eq!(merged.emoji_counts.get("👍"), Some(&4));
        assert!(!merged.need_consolidation_with_cache);
    }

    #[test]
    fn merge_with_replace_count_overwrites_the_single_emoji() {
        let existing = reactions_with(&[("👍", 3)]);
        let mut incoming = reactions_with(&[("👍", 9)]);
        incoming.need_consolidation_with_cache = true;
        incoming.replace_count = true;
        let merged = merge_reactions(Some(&existing), &incoming);
        assert_eq!(merged.emoji_counts.get("👍"), Some(&9));
    }
}
