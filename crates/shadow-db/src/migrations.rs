use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS dm_conversations (
            id          TEXT PRIMARY KEY,
            user1_id    TEXT NOT NULL,
            user2_id    TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(user1_id, user2_id)
        );

        -- conversation_id is 'group' or 'dm:<dm_conversations.id>'.
        -- Author fields are denormalized so a page needs no join.
        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL,
            content             TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            user_name           TEXT NOT NULL,
            avatar_color        TEXT NOT NULL,
            avatar_url          TEXT,
            hearts_count        INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        -- Per-user read marker for a direct conversation.
        CREATE TABLE IF NOT EXISTS dm_reads (
            conversation_id TEXT NOT NULL REFERENCES dm_conversations(id),
            user_id         TEXT NOT NULL,
            last_read_at    TEXT NOT NULL,
            PRIMARY KEY(conversation_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
