use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL,
            discriminator   INTEGER NOT NULL,
            avatar          TEXT,
            password        TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(username, discriminator)
        );

        -- One row per side of a friendship edge. status NULL means 'none';
        -- channel_id survives status resets so direct channels are reused.
        CREATE TABLE IF NOT EXISTS friendships (
            user_id     TEXT NOT NULL REFERENCES users(id),
            friend_id   TEXT NOT NULL REFERENCES users(id),
            status      TEXT,
            channel_id  TEXT,
            active      INTEGER,
            PRIMARY KEY (user_id, friend_id)
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            is_group    INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Membership list for group channels only. Direct channel
        -- participation is derived from friendships.channel_id.
        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_channel_members_user
            ON channel_members(user_id);

        -- The unique (channel_id, bucket_seq) index doubles as the
        -- conditional write that keeps concurrent rollovers from creating
        -- two buckets at the same sequence.
        CREATE TABLE IF NOT EXISTS chat_buckets (
            id          TEXT PRIMARY KEY,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            bucket_seq  INTEGER NOT NULL,
            start_time  TEXT NOT NULL,
            end_time    TEXT NOT NULL,
            UNIQUE(channel_id, bucket_seq)
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id              TEXT PRIMARY KEY,
            bucket_id       TEXT NOT NULL REFERENCES chat_buckets(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT,
            timestamp       TEXT NOT NULL,
            last_modified   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_bucket
            ON chat_messages(bucket_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
