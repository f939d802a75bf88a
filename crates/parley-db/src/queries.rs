use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use parley_types::models::FriendshipStatus;

use crate::models::{ChannelRow, ChatBucketRow, ChatMessageRow, FriendshipRow, UserRow};
use crate::{BUCKET_CAPACITY, Database};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        discriminator: u16,
        avatar: Option<&str>,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, discriminator, avatar, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id,
                    username,
                    discriminator,
                    avatar,
                    password_hash,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, discriminator, avatar, password, created_at
                     FROM users WHERE id = ?1",
                )?
                .query_row([id], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn user_by_name(&self, username: &str, discriminator: u16) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, discriminator, avatar, password, created_at
                     FROM users WHERE username = ?1 AND discriminator = ?2",
                )?
                .query_row(rusqlite::params![username, discriminator], map_user)
                .optional()?;
            Ok(row)
        })
    }

    pub fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, username, discriminator, avatar, password, created_at
                 FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

            let rows = stmt
                .query_map(params.as_slice(), map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn name_taken(&self, username: &str, discriminator: u16) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1 AND discriminator = ?2",
                rusqlite::params![username, discriminator],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    // -- Friendships --

    pub fn friendship(&self, user_id: &str, friend_id: &str) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| query_friendship(conn, user_id, friend_id))
    }

    pub fn friendships_for(&self, user_id: &str) -> Result<Vec<FriendshipRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, friend_id, status, channel_id, active
                 FROM friendships WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], map_friendship)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn friendship_by_channel(
        &self,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT user_id, friend_id, status, channel_id, active
                     FROM friendships WHERE user_id = ?1 AND channel_id = ?2",
                )?
                .query_row([user_id, channel_id], map_friendship)
                .optional()?;
            Ok(row)
        })
    }

    /// Upsert one side's status, leaving the channel reference and active
    /// flag untouched. `None` resets the side to 'no relationship' while the
    /// row (and therefore any direct channel assignment) is kept.
    pub fn set_friendship_status(
        &self,
        user_id: &str,
        friend_id: &str,
        status: Option<FriendshipStatus>,
    ) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, status) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, friend_id) DO UPDATE SET status = excluded.status",
                rusqlite::params![user_id, friend_id, status.map(|s| s.as_str())],
            )?;
            require_friendship(conn, user_id, friend_id)
        })
    }

    /// Mark one side accepted: status FRIEND, direct channel assigned,
    /// channel active.
    pub fn set_friendship_accepted(
        &self,
        user_id: &str,
        friend_id: &str,
        channel_id: &str,
    ) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, status, channel_id, active)
                 VALUES (?1, ?2, 'FRIEND', ?3, 1)
                 ON CONFLICT(user_id, friend_id) DO UPDATE
                     SET status = 'FRIEND', channel_id = ?3, active = 1",
                rusqlite::params![user_id, friend_id, channel_id],
            )?;
            require_friendship(conn, user_id, friend_id)
        })
    }

    /// Assign a direct channel to one side without touching its status.
    pub fn attach_direct_channel(
        &self,
        user_id: &str,
        friend_id: &str,
        channel_id: &str,
    ) -> Result<FriendshipRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO friendships (user_id, friend_id, channel_id, active)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(user_id, friend_id) DO UPDATE
                     SET channel_id = ?3, active = 1",
                rusqlite::params![user_id, friend_id, channel_id],
            )?;
            require_friendship(conn, user_id, friend_id)
        })
    }

    // -- Channels --

    pub fn create_channel(&self, id: &str, name: &str, is_group: bool) -> Result<ChannelRow> {
        self.with_conn(|conn| {
            let created_at = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO channels (id, name, is_group, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, is_group, created_at],
            )?;
            Ok(ChannelRow {
                id: id.to_string(),
                name: name.to_string(),
                is_group,
                created_at,
            })
        })
    }

    pub fn channel_by_id(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare("SELECT id, name, is_group, created_at FROM channels WHERE id = ?1")?
                .query_row([id], map_channel)
                .optional()?;
            Ok(row)
        })
    }

    pub fn channels_by_ids(&self, ids: &[String]) -> Result<Vec<ChannelRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, name, is_group, created_at FROM channels WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

            let rows = stmt
                .query_map(params.as_slice(), map_channel)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn add_channel_members(&self, channel_id: &str, user_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for user_id in user_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![channel_id, user_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn channel_member_ids(&self, channel_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1")?;
            let rows = stmt
                .query_map([channel_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                [channel_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn group_channel_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT channel_id FROM channel_members WHERE user_id = ?1")?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every channel a user should hear events for: active direct channels
    /// plus joined group channels. Used to compute room membership when a
    /// connection is established.
    pub fn active_channel_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT channel_id FROM friendships
                     WHERE user_id = ?1 AND channel_id IS NOT NULL AND active = 1
                 UNION
                 SELECT channel_id FROM channel_members WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chat buckets --

    /// Bucket with the highest sequence for the channel, creating bucket 0
    /// empty if the channel has no history yet. Calling twice without
    /// appends returns the same bucket.
    pub fn latest_chat_bucket_or_create(
        &self,
        channel_id: &str,
    ) -> Result<(ChatBucketRow, Vec<ChatMessageRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let bucket = match query_latest_bucket(&tx, channel_id)? {
                Some(bucket) => bucket,
                None => insert_bucket(&tx, channel_id, 0)?,
            };
            let messages = query_bucket_messages(&tx, &bucket.id)?;
            tx.commit()?;
            Ok((bucket, messages))
        })
    }

    pub fn chat_bucket_by_seq(
        &self,
        channel_id: &str,
        bucket_seq: u32,
    ) -> Result<Option<(ChatBucketRow, Vec<ChatMessageRow>)>> {
        self.with_conn(|conn| {
            let bucket = conn
                .prepare(
                    "SELECT id, channel_id, bucket_seq, start_time, end_time
                     FROM chat_buckets WHERE channel_id = ?1 AND bucket_seq = ?2",
                )?
                .query_row(rusqlite::params![channel_id, bucket_seq], map_bucket)
                .optional()?;

            match bucket {
                Some(bucket) => {
                    let messages = query_bucket_messages(conn, &bucket.id)?;
                    Ok(Some((bucket, messages)))
                }
                None => Ok(None),
            }
        })
    }

    /// Append to the channel's open bucket, rolling over to a new bucket
    /// once the open one holds `BUCKET_CAPACITY` messages.
    ///
    /// The whole read-check-write runs in one transaction behind the
    /// connection mutex, and the unique (channel_id, bucket_seq) index turns
    /// a lost cross-process race into a constraint error rather than a
    /// duplicate sequence.
    pub fn append_chat_message(
        &self,
        channel_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<(ChatBucketRow, ChatMessageRow)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();

            let bucket = match query_latest_bucket(&tx, channel_id)? {
                None => insert_bucket(&tx, channel_id, 0)?,
                Some(bucket) if count_bucket_messages(&tx, &bucket.id)? >= BUCKET_CAPACITY => {
                    insert_bucket(&tx, channel_id, bucket.bucket_seq + 1)?
                }
                Some(bucket) => {
                    tx.execute(
                        "UPDATE chat_buckets SET end_time = ?1 WHERE id = ?2",
                        rusqlite::params![now, bucket.id],
                    )?;
                    ChatBucketRow {
                        end_time: now.clone(),
                        ..bucket
                    }
                }
            };

            let message = ChatMessageRow {
                id: Uuid::new_v4().to_string(),
                bucket_id: bucket.id.clone(),
                sender_id: sender_id.to_string(),
                content: Some(content.to_string()),
                timestamp: now.clone(),
                last_modified: now,
            };
            tx.execute(
                "INSERT INTO chat_messages (id, bucket_id, sender_id, content, timestamp, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id,
                    message.bucket_id,
                    message.sender_id,
                    message.content,
                    message.timestamp,
                    message.last_modified
                ],
            )?;

            tx.commit()?;
            Ok((bucket, message))
        })
    }
}

fn query_friendship(
    conn: &Connection,
    user_id: &str,
    friend_id: &str,
) -> Result<Option<FriendshipRow>> {
    let row = conn
        .prepare(
            "SELECT user_id, friend_id, status, channel_id, active
             FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
        )?
        .query_row([user_id, friend_id], map_friendship)
        .optional()?;
    Ok(row)
}

fn require_friendship(conn: &Connection, user_id: &str, friend_id: &str) -> Result<FriendshipRow> {
    query_friendship(conn, user_id, friend_id)?
        .ok_or_else(|| anyhow::anyhow!("friendship row vanished after upsert: {user_id} -> {friend_id}"))
}

fn query_latest_bucket(conn: &Connection, channel_id: &str) -> Result<Option<ChatBucketRow>> {
    let row = conn
        .prepare(
            "SELECT id, channel_id, bucket_seq, start_time, end_time
             FROM chat_buckets WHERE channel_id = ?1
             ORDER BY bucket_seq DESC LIMIT 1",
        )?
        .query_row([channel_id], map_bucket)
        .optional()?;
    Ok(row)
}

fn insert_bucket(conn: &Connection, channel_id: &str, bucket_seq: u32) -> Result<ChatBucketRow> {
    let now = Utc::now().to_rfc3339();
    let bucket = ChatBucketRow {
        id: Uuid::new_v4().to_string(),
        channel_id: channel_id.to_string(),
        bucket_seq,
        start_time: now.clone(),
        end_time: now,
    };
    conn.execute(
        "INSERT INTO chat_buckets (id, channel_id, bucket_seq, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            bucket.id,
            bucket.channel_id,
            bucket.bucket_seq,
            bucket.start_time,
            bucket.end_time
        ],
    )?;
    Ok(bucket)
}

fn count_bucket_messages(conn: &Connection, bucket_id: &str) -> Result<usize> {
    let count: usize = conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE bucket_id = ?1",
        [bucket_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Insertion order (rowid) is the authoritative message order within a
/// bucket; timestamps can collide.
fn query_bucket_messages(conn: &Connection, bucket_id: &str) -> Result<Vec<ChatMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, bucket_id, sender_id, content, timestamp, last_modified
         FROM chat_messages WHERE bucket_id = ?1
         ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([bucket_id], |row| {
            Ok(ChatMessageRow {
                id: row.get(0)?,
                bucket_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
                last_modified: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        discriminator: row.get(2)?,
        avatar: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_friendship(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendshipRow> {
    let status: Option<String> = row.get(2)?;
    Ok(FriendshipRow {
        user_id: row.get(0)?,
        friend_id: row.get(1)?,
        status: status.as_deref().and_then(|s| {
            let parsed = FriendshipStatus::parse(s);
            if parsed.is_none() {
                warn!("Unknown friendship status '{}' in store", s);
            }
            parsed
        }),
        channel_id: row.get(3)?,
        active: row.get(4)?,
    })
}

fn map_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_group: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn map_bucket(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatBucketRow> {
    Ok(ChatBucketRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        bucket_seq: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_channel() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "ash", 1, None, "hash").unwrap();
        let channel = Uuid::new_v4().to_string();
        db.create_channel(&channel, "", false).unwrap();
        (db, channel)
    }

    #[test]
    fn latest_or_create_is_idempotent() {
        let (db, channel) = db_with_channel();

        let (first, messages) = db.latest_chat_bucket_or_create(&channel).unwrap();
        assert_eq!(first.bucket_seq, 0);
        assert!(messages.is_empty());

        let (second, _) = db.latest_chat_bucket_or_create(&channel).unwrap();
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn appends_roll_over_at_capacity() {
        let (db, channel) = db_with_channel();

        // 50k + r messages -> k + 1 buckets, contiguous sequences
        let total = BUCKET_CAPACITY * 2 + 3;
        for i in 0..total {
            db.append_chat_message(&channel, "u1", &format!("msg {i}"))
                .unwrap();
        }

        let (latest, messages) = db.latest_chat_bucket_or_create(&channel).unwrap();
        assert_eq!(latest.bucket_seq, 2);
        assert_eq!(messages.len(), 3);

        for seq in 0..=2u32 {
            let (bucket, messages) = db.chat_bucket_by_seq(&channel, seq).unwrap().unwrap();
            assert_eq!(bucket.bucket_seq, seq);
            let expected = if seq < 2 { BUCKET_CAPACITY } else { 3 };
            assert_eq!(messages.len(), expected);
        }
        assert!(db.chat_bucket_by_seq(&channel, 3).unwrap().is_none());
    }

    #[test]
    fn messages_keep_insertion_order() {
        let (db, channel) = db_with_channel();

        for i in 0..10 {
            db.append_chat_message(&channel, "u1", &format!("msg {i}"))
                .unwrap();
        }

        let (_, messages) = db.latest_chat_bucket_or_create(&channel).unwrap();
        let contents: Vec<_> = messages
            .iter()
            .map(|m| m.content.clone().unwrap())
            .collect();
        let expected: Vec<_> = (0..10).map(|i| format!("msg {i}")).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn first_append_creates_bucket_zero() {
        let (db, channel) = db_with_channel();

        let (bucket, message) = db.append_chat_message(&channel, "u1", "hello").unwrap();
        assert_eq!(bucket.bucket_seq, 0);
        assert_eq!(message.content.as_deref(), Some("hello"));
    }

    #[test]
    fn status_reset_keeps_channel_reference() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("a", "ash", 1, None, "hash").unwrap();
        db.create_user("b", "brock", 2, None, "hash").unwrap();
        db.create_channel("c1", "", false).unwrap();

        db.set_friendship_accepted("a", "b", "c1").unwrap();
        let row = db.set_friendship_status("a", "b", None).unwrap();

        assert_eq!(row.status, None);
        assert_eq!(row.channel_id.as_deref(), Some("c1"));
    }

    #[test]
    fn missing_row_and_null_status_read_the_same() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("a", "ash", 1, None, "hash").unwrap();
        db.create_user("b", "brock", 2, None, "hash").unwrap();

        assert!(db.friendship("a", "b").unwrap().is_none());

        db.set_friendship_status("a", "b", Some(FriendshipStatus::Pending))
            .unwrap();
        let row = db.set_friendship_status("a", "b", None).unwrap();
        assert_eq!(row.status, None);
    }
}
