//! Unread and unread-mention accounting.
//!
//! Counts are always recomputed from the message tables, never adjusted
//! incrementally.  For a thread with last-seen time `L`, a non-deleted
//! message counts as unread when
//!
//! * it was sent after `L` and is not read, or
//! * it has unseen reactions and at least one of them was sent after `L`.
//!
//! Each message counts at most once.  The mention count is the subset of the
//! first group that also mentions us.

use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{unread_rows_for_thread, TableSchema, MMS_SCHEMA, SMS_SCHEMA};

/// Result of a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadCounts {
    pub unread: i64,
    pub mentions: i64,
}

impl std::ops::Add for UnreadCounts {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            unread: self.unread + other.unread,
            mentions: self.mentions + other.mentions,
        }
    }
}

pub(crate) fn count_table(
    conn: &Connection,
    schema: &TableSchema,
    thread_id: i64,
    last_seen: i64,
) -> Result<UnreadCounts> {
    let date_sent = schema.date_sent;
    let (unread, mentions) = conn.query_row(
        &format!(
            "SELECT
                 COALESCE(SUM(CASE WHEN (m.{date_sent} > ?2 AND m.read = 0)
                                     OR (m.reactions_unread = 1 AND EXISTS (
                                            SELECT 1 FROM reaction r
                                             WHERE r.message_id = m._id AND r.is_mms = {is_mms}
                                               AND r.date_sent > ?2))
                                   THEN 1 ELSE 0 END), 0),
                 COALESCE(SUM(CASE WHEN m.{date_sent} > ?2 AND m.read = 0 AND m.has_mention = 1
                                   THEN 1 ELSE 0 END), 0)
             FROM {table} m
             WHERE m.thread_id = ?1 AND m.is_deleted = 0",
            is_mms = schema.transport.is_mms_flag(),
            table = schema.table,
        ),
        params![thread_id, last_seen],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(UnreadCounts { unread, mentions })
}

/// Recompute and persist the counters of one thread.  The thread's read flag
/// becomes true exactly when no unread row is left in either table.
pub(crate) fn recompute(conn: &Connection, thread_id: i64) -> Result<UnreadCounts> {
    let last_seen: i64 = conn
        .query_row(
            "SELECT last_seen FROM thread WHERE _id = ?1",
            params![thread_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        })?;

    let counts = count_table(conn, &SMS_SCHEMA, thread_id, last_seen)?
        + count_table(conn, &MMS_SCHEMA, thread_id, last_seen)?;
    let remaining = unread_rows_for_thread(conn, &SMS_SCHEMA, thread_id)?
        + unread_rows_for_thread(conn, &MMS_SCHEMA, thread_id)?;

    conn.execute(
        "UPDATE thread SET unread_count = ?2, unread_mention_count = ?3, read = ?4 WHERE _id = ?1",
        params![thread_id, counts.unread, counts.mentions, remaining == 0],
    )?;

    tracing::trace!(
        thread_id,
        last_seen,
        unread = counts.unread,
        mentions = counts.mentions,
        "unread counts recomputed"
    );
    Ok(counts)
}

impl Database {
    /// Recompute the thread's counters against its current last-seen time.
    pub fn refresh_unread_counts(&self, thread_id: i64) -> Result<UnreadCounts> {
        let counts = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let counts = recompute(&tx, thread_id)?;
            tx.commit()?;
            counts
        };
        self.notify_thread(thread_id);
        Ok(counts)
    }

    /// Stored counters of one thread, `None` if the thread does not exist.
    pub fn unread_counts(&self, thread_id: i64) -> Result<Option<UnreadCounts>> {
        let conn = self.conn();
        let counts = conn
            .query_row(
                "SELECT unread_count, unread_mention_count FROM thread WHERE _id = ?1",
                params![thread_id],
                |row| {
                    Ok(UnreadCounts {
                        unread: row.get(0)?,
                        mentions: row.get(1)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(counts)
    }

    /// Badge total over every non-archived thread.
    pub fn total_unread_count(&self) -> Result<i64> {
        let conn = self.conn();
        let total = conn.query_row(
            "SELECT COALESCE(SUM(unread_count), 0) FROM thread WHERE archived = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use parley_shared::Address;

    use super::*;
    use crate::messages::{MessageId, MessageTable, NewMessage};
    use crate::reactions::NewReaction;

    fn frank() -> Address {
        Address::from_serialized(&format!("05{}", "f0".repeat(32)))
    }

    fn me() -> Address {
        Address::from_serialized(&format!("05{}", "ee".repeat(32)))
    }

    #[test]
    fn counts_span_both_tables() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&frank()).unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(frank(), 10, "a"))
            .unwrap();
        db.mms()
            .insert(thread, &NewMessage::incoming(frank(), 20, "b").with_mention())
            .unwrap();
        db.sms()
            .insert(thread, &NewMessage::outgoing(me(), 30, "c"))
            .unwrap();

        let counts = db.refresh_unread_counts(thread).unwrap();
        assert_eq!(counts, UnreadCounts { unread: 2, mentions: 1 });
        assert_eq!(db.unread_counts(thread).unwrap(), Some(counts));
        assert_eq!(db.total_unread_count().unwrap(), 2);
    }

    #[test]
    fn deleted_rows_do_not_count() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&frank()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::incoming(frank(), 10, "a"))
            .unwrap();
        db.conn()
            .execute("UPDATE sms SET is_deleted = 1 WHERE _id = ?1", [id])
            .unwrap();

        assert_eq!(db.refresh_unread_counts(thread).unwrap().unread, 0);
    }

    #[test]
    fn unread_message_with_unseen_reaction_counts_once() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&frank()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::outgoing(me(), 10, "mine").with_read(false))
            .unwrap();
        db.add_reaction(MessageId::sms(id), &NewReaction::new(frank(), "👀", 20))
            .unwrap();

        assert_eq!(db.refresh_unread_counts(thread).unwrap().unread, 1);
    }

    #[test]
    fn missing_thread_is_not_found() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(db.refresh_unread_counts(42), Err(StoreError::NotFound)));
        assert_eq!(db.unread_counts(42).unwrap(), None);
    }
}
