//! SQLite-backed [`Cache`] implementation.
//!
//! Each profile gets its own database file under `<base_dir>/<profileId>/db/`
//! so that deleting a profile is a directory removal, matching the
//! filesystem layout in `SPEC_FULL.md` §6.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;

use super::{Cache, CacheError, merge_reactions};
use crate::data::{ChatInfo, ChatMessage, ContactInfo, Reactions};
use crate::ids::{ChatId, MsgId, ProfileId, UserId};

/// SQLite-based cache store, one connection pool per profile.
///
/// Uses WAL mode and runs migrations automatically the first time a profile
/// is opened.
pub struct SqliteCache {
    base_dir: PathBuf,
    pools: Mutex<HashMap<ProfileId, SqlitePool>>,
}

impl SqliteCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn pool_for(&self, profile_id: &ProfileId) -> Result<SqlitePool, CacheError> {
        let pools = self.pools.lock().await;
        pools
            .get(profile_id)
            .cloned()
            .ok_or_else(|| CacheError::Database(format!("profile not added: {profile_id}")))
    }

    fn db_path(&self, profile_id: &ProfileId) -> PathBuf {
        self.base_dir.join(profile_id.as_str()).join("db").join("messages.db")
    }
}

#[async_trait]
impl Cache for SqliteCache {
    async fn add_profile(&self, profile_id: &ProfileId, _db_version: u32) -> Result<(), CacheError> {
        let mut pools = self.pools.lock().await;
        if pools.contains_key(profile_id) {
            return Ok(());
        }

        let path = self.db_path(profile_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Database(format!("failed to create {}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| CacheError::Migration(e.to_string()))?;

        pools.insert(profile_id.clone(), pool);
        Ok(())
    }

    async fn fetch_contacts(&self, profile_id: &ProfileId) -> Result<Vec<ContactInfo>, CacheError> {
        let pool = self.pool_for(profile_id).await?;
        let rows = sqlx::query(
            "SELECT user_id, name, phone, is_self, is_alias FROM contacts WHERE profile_id = ?",
        )
        .bind(profile_id.as_str())
        .fetch_all(&pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ContactInfo {
                id: UserId::new(row.get::<String, _>("user_id")),
                name: row.get("name"),
                phone: row.get("phone"),
                is_self: row.get::<i64, _>("is_self") != 0,
                is_alias: row.get::<i64, _>("is_alias") != 0,
            })
            .collect())
    }

    async fn fetch_chats(&self, profile_id: &ProfileId) -> Result<Vec<ChatInfo>, CacheError> {
        let pool = self.pool_for(profile_id).await?;
        let rows = sqlx::query(
            "SELECT chat_id, is_unread, is_unread_mention, is_muted, is_pinned, \
             last_message_time, transcription_language FROM chats WHERE profile_id = ?",
        )
        .bind(profile_id.as_str())
        .fetch_all(&pool)
        .await
        .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ChatInfo {
                id: ChatId::new(row.get::<String, _>("chat_id")),
                is_unread: row.get::<i64, _>("is_unread") != 0,
                is_unread_mention: row.get::<i64, _>("is_unread_mention") != 0,
                is_muted: row.get::<i64, _>("is_muted") != 0,
                is_pinned: row.get::<i64, _>("is_pinned") != 0,
                last_message_time: row.get("last_message_time"),
                transcription_language: row.get("transcription_language"),
            })
            .collect())
    }

    async fn fetch_messages_from(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        from_id: Option<&MsgId>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CacheError> {
        let pool = self.pool_for(profile_id).await?;

        let from_time: Option<i64> = match from_id {
            Some(id) => {
                let row = sqlx::query("SELECT time_sent FROM messages WHERE profile_id = ? AND chat_id = ? AND msg_id = ?")
                    .bind(profile_id.as_str())
                    .bind(chat_id.as_str())
                    .bind(id.as_str())
                    .fetch_optional(&pool)
                    .await
                    .map_err(|e| CacheError::Database(e.to_string()))?;
                match row {
                    Some(row) => Some(row.get("time_sent")),
                    None => return Ok(Vec::new()),
                }
            }
            None => None,
        };

        let rows = match from_time {
            Some(t) => sqlx::query(
                "SELECT * FROM messages WHERE profile_id = ? AND chat_id = ? AND time_sent <= ? \
                 ORDER BY time_sent DESC LIMIT ?",
            )
            .bind(profile_id.as_str())
            .bind(chat_id.as_str())
            .bind(t)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await,
            None => sqlx::query(
                "SELECT * FROM messages WHERE profile_id = ? AND chat_id = ? \
                 ORDER BY time_sent DESC LIMIT ?",
            )
            .bind(profile_id.as_str())
            .bind(chat_id.as_str())
            .bind(limit as i64)
            .fetch_all(&pool)
            .await,
        }
        .map_err(|e| CacheError::Database(e.to_string()))?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn add_messages(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        messages: &[ChatMessage],
    ) -> Result<(), CacheError> {
        let pool = self.pool_for(profile_id).await?;
        for message in messages {
            insert_message(&pool, profile_id, chat_id, message).await?;
        }
        Ok(())
    }

    async fn update_message(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        message: &ChatMessage,
    ) -> Result<(), CacheError> {
        let pool = self.pool_for(profile_id).await?;
        insert_message(&pool, profile_id, chat_id, message).await
    }

    async fn delete_message(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        msg_id: &MsgId,
    ) -> Result<(), CacheError> {
        let pool = self.pool_for(profile_id).await?;
        sqlx::query("DELETE FROM messages WHERE profile_id = ? AND chat_id = ? AND msg_id = ?")
            .bind(profile_id.as_str())
            .bind(chat_id.as_str())
            .bind(msg_id.as_str())
            .execute(&pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;
        Ok(())
    }

    async fn merge_reactions(
        &self,
        profile_id: &ProfileId,
        chat_id: &ChatId,
        msg_id: &MsgId,
        incoming: &Reactions,
    ) -> Result<Reactions, CacheError> {
        let pool = self.pool_for(profile_id).await?;
        let row = sqlx::query("SELECT reactions_json FROM messages WHERE profile_id = ? AND chat_id = ? AND msg_id = ?")
            .bind(profile_id.as_str())
            .bind(chat_id.as_str())
            .bind(msg_id.as_str())
            .fetch_optional(&pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        let existing: Option<Reactions> = match row {
            Some(row) => {
                let json: String = row.get("reactions_json");
                Some(serde_json::from_str(&json).map_err(|e| CacheError::InvalidData(e.to_string()))?)
            }
            None => None,
        };

        let merged = merge_reactions(existing.as_ref(), incoming);

        sqlx::query("UPDATE messages SET reactions_json = ? WHERE profile_id = ? AND chat_id = ? AND msg_id = ?")
            .bind(serde_json::to_string(&merged).expect("Reactions always serializes"))
            .bind(profile_id.as_str())
            .bind(chat_id.as_str())
            .bind(msg_id.as_str())
            .execute(&pool)
            .await
            .map_err(|e| CacheError::Database(e.to_string()))?;

        Ok(merged)
    }
}

async fn insert_message(
    pool: &SqlitePool,
    profile_id: &ProfileId,
    chat_id: &ChatId,
    message: &ChatMessage,
) -> Result<(), CacheError> {
    sqlx::query(
        r#"
        INSERT INTO messages (profile_id, chat_id, msg_id, sender_id, text, quoted_id,
            quoted_text, quoted_sender, file_info, link, reactions_json, time_sent,
            is_outgoing, is_read, has_mention)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (profile_id, chat_id, msg_id) DO UPDATE SET
            sender_id = excluded.sender_id,
            text = excluded.text,
            quoted_id = excluded.quoted_id,
            quoted_text = excluded.quoted_text,
            quoted_sender = excluded.quoted_sender,
            file_info = excluded.file_info,
            link = excluded.link,
            reactions_json = excluded.reactions_json,
            time_sent = excluded.time_sent,
            is_outgoing = excluded.is_outgoing,
            is_read = excluded.is_read,
            has_mention = excluded.has_mention
        "#,
    )
    .bind(profile_id.as_str())
    .bind(chat_id.as_str())
    .bind(message.id.as_str())
    .bind(message.sender_id.as_str())
    .bind(&message.text)
    .bind(message.quoted_id.as_ref().map(|v| v.as_str().to_string()))
    .bind(&message.quoted_text)
    .bind(message.quoted_sender.as_ref().map(|v| v.as_str().to_string()))
    .bind(&message.file_info)
    .bind(&message.link)
    .bind(serde_json::to_string(&message.reactions).expect("Reactions always serializes"))
    .bind(message.time_sent)
    .bind(message.is_outgoing)
    .bind(message.is_read)
    .bind(message.has_mention)
    .execute(pool)
    .await
    .map_err(|e| CacheError::Database(e.to_string()))?;

    Ok(())
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Result<ChatMessage, CacheError> {
    let reactions_json: String = row.get("reactions_json");
    let reactions: Reactions =
        serde_json::from_str(&reactions_json).map_err(|e| CacheError::InvalidData(e.to_string()))?;

    Ok(ChatMessage {
        id: MsgId::new(row.get::<String, _>("msg_id")),
        sender_id: UserId::new(row.get::<String, _>("sender_id")),
        text: row.get("text"),
        quoted_id: row.get::<Option<String>, _>("quoted_id").map(MsgId::new),
        quoted_text: row.get("quoted_text"),
        quoted_sender: row.get::<Option<String>, _>("quoted_sender").map(UserId::new),
        file_info: row.get("file_info"),
        link: row.get("link"),
        reactions,
        time_sent: row.get("time_sent"),
        is_outgoing: row.get("is_outgoing"),
        is_read: row.get("is_read"),
        has_mention: row.get("has_mention"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Reactions;

    fn sample_message(id: &str, time_sent: i64) -> ChatMessage {
        ChatMessage {
            id: MsgId::new(id),
            sender_id: UserId::new("u1"),
            text: "hello".to_string(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent,
            is_outgoing: false,
            is_read: false,
            has_mention: false,
        }
    }

    #[tokio::test]
    async fn add_messages_then_fetch_round_trips() {
        let dir = tempdir();
        let cache = SqliteCache::new(&dir);
        let profile = ProfileId::new("demo_1");
        cache.add_profile(&profile, 1).await.unwrap();

        let chat = ChatId::new("c1");
        let messages = vec![sample_message("m1", 100), sample_message("m2", 200)];
        cache.add_messages(&profile, &chat, &messages).await.unwrap();

        let fetched = cache.fetch_messages_from(&profile, &chat, None, 10).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].id.as_str(), "m2"); // newest first
    }

    #[tokio::test]
    async fn fetch_messages_from_missing_id_returns_empty() {
        let dir = tempdir();
        let cache = SqliteCache::new(&dir);
        let profile = ProfileId::new("demo_2");
        cache.add_profile(&profile, 1).await.unwrap();
        let chat = ChatId::new("c1");

        let fetched = cache
            .fetch_messages_from(&profile, &chat, Some(&MsgId::new("missing")), 10)
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn merge_reactions_persists_the_merge() {
        let dir = tempdir();
        let cache = SqliteCache::new(&dir);
        let profile = ProfileId::new("demo_3");
        cache.add_profile(&profile, 1).await.unwrap();
        let chat = ChatId::new("c1");
        cache.add_messages(&profile, &chat, &[sample_message("m1", 10)]).await.unwrap();

        let mut incoming = Reactions::default();
        incoming.emoji_counts.insert("👍".to_string(), 1);
        incoming.need_consolidation_with_cache = true;
        let merged = cache
            .merge_reactions(&profile, &chat, &MsgId::new("m1"), &incoming)
            .await
            .unwrap();
        assert_eq!(merged.emoji_counts.get("👍"), Some(&1));

        let fetched = cache.fetch_messages_from(&profile, &chat, None, 10).await.unwrap();
        assert_eq!(fetched[0].reactions.emoji_counts.get("👍"), Some(&1));
    }

    fn tempdir() -> PathBuf {
        let path = std::env::temp_dir().join(format!("nchat_cache_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        path
    }
}
