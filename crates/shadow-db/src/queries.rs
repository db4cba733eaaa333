use crate::models::{DmConversationRow, MessageRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, content, user_id, user_name, avatar_color, avatar_url, hearts_count, created_at";

impl Database {
    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, content, user_id, user_name, avatar_color, avatar_url, hearts_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.conversation_id,
                    row.content,
                    row.user_id,
                    row.user_name,
                    row.avatar_color,
                    row.avatar_url,
                    row.hearts_count,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first. With `before`, only messages strictly older than it.
    pub fn get_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id, limit, before))
    }

    /// Oldest first, strictly newer than `after`.
    pub fn get_messages_after(
        &self,
        conversation_id: &str,
        after: &str,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE conversation_id = ?1 AND created_at > ?2
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?3",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, after, limit], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Overwrite the hearts counter. Returns false if no such message.
    pub fn update_hearts_count(&self, id: &str, count: u32) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET hearts_count = ?1 WHERE id = ?2",
                rusqlite::params![count, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            conn.query_row(&sql, [id], message_row).optional()
        })
    }

    // -- Direct conversations --

    /// Find the conversation between two users, creating it if needed. The
    /// pair is order-insensitive.
    pub fn get_or_create_dm_conversation(
        &self,
        new_id: &str,
        user_a: &str,
        user_b: &str,
        now: &str,
    ) -> Result<DmConversationRow> {
        let (user1, user2) = if user_a <= user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO dm_conversations (id, user1_id, user2_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new_id, user1, user2, now],
            )?;
            let row = tx.query_row(
                "SELECT id, user1_id, user2_id, updated_at FROM dm_conversations
                 WHERE user1_id = ?1 AND user2_id = ?2",
                [user1, user2],
                dm_row,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_dm_conversation(&self, id: &str) -> Result<Option<DmConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user1_id, user2_id, updated_at FROM dm_conversations WHERE id = ?1",
                [id],
                dm_row,
            )
            .optional()
        })
    }

    /// A user's conversations, most recently active first.
    pub fn list_dm_conversations(&self, user_id: &str) -> Result<Vec<DmConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user1_id, user2_id, updated_at FROM dm_conversations
                 WHERE user1_id = ?1 OR user2_id = ?1
                 ORDER BY updated_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], dm_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn touch_dm_conversation(&self, id: &str, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE dm_conversations SET updated_at = ?1 WHERE id = ?2",
                [at, id],
            )?;
            Ok(())
        })
    }

    /// Move `user_id`'s read marker in a direct conversation forward to
    /// `at`. An older `at` leaves the marker where it is.
    pub fn mark_dm_read(&self, conversation_id: &str, user_id: &str, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO dm_reads (conversation_id, user_id, last_read_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id, user_id)
                 DO UPDATE SET last_read_at = MAX(last_read_at, excluded.last_read_at)",
                [conversation_id, user_id, at],
            )?;
            Ok(())
        })
    }

    /// Direct conversations of `user_id` holding a message from the other
    /// participant newer than the user's read marker, most recent first.
    pub fn unread_dm_conversations(&self, user_id: &str) -> Result<Vec<DmConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user1_id, c.user2_id, c.updated_at
                 FROM dm_conversations c
                 LEFT JOIN dm_reads r ON r.conversation_id = c.id AND r.user_id = ?1
                 WHERE (c.user1_id = ?1 OR c.user2_id = ?1)
                   AND EXISTS (
                       SELECT 1 FROM messages m
                       WHERE m.conversation_id = 'dm:' || c.id
                         AND m.user_id != ?1
                         AND m.created_at > COALESCE(r.last_read_at, '')
                   )
                 ORDER BY c.updated_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], dm_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_messages(
    conn: &Connection,
    conversation_id: &str,
    limit: u32,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {} FROM messages
         WHERE conversation_id = ?1 AND (?2 IS NULL OR created_at < ?2)
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![conversation_id, before, limit], message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        content: row.get(2)?,
        user_id: row.get(3)?,
        user_name: row.get(4)?,
        avatar_color: row.get(5)?,
        avatar_url: row.get(6)?,
        hearts_count: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn dm_row(row: &Row<'_>) -> rusqlite::Result<DmConversationRow> {
    Ok(DmConversationRow {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
