//! Conversation rows.
//!
//! A thread is the aggregate view of one conversation: it is created lazily
//! on first contact, and its snippet and counters are always *derived* from
//! the two message tables (see [`Database::update_thread`] and
//! [`crate::unread`]).  Deleting a thread does not delete its messages.

use parley_shared::Address;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::{lock, Database, ThreadCreatedHook};
use crate::error::{Result, StoreError};
use crate::message_type::MessageType;
use crate::messages::conversation::{conversation_count, conversation_reader};
use crate::messages::{
    delete_ids, set_messages_read, MarkedMessageInfo, MessageRecord, MessageView, SortOrder,
    Snippet, Transport, MMS_SCHEMA, SMS_SCHEMA,
};
use crate::models::{DistributionType, MessageContent, ReadUpTo, ThreadRecord};
use crate::unread;

const THREAD_COLUMNS: &str = "t._id, t.address, t.creation_date, t.date, t.message_count,
    t.snippet, t.snippet_type, t.snippet_uri, t.snippet_content, t.read, t.unread_count,
    t.unread_mention_count, t.type, t.archived, t.is_pinned, t.last_seen, t.has_sent,
    t.delivery_receipt_count, t.read_receipt_count, t.expires_in";

/// Rows fetched per step while scanning backwards for the snippet.
const SNIPPET_SCAN_PAGE: i64 = 50;

impl Database {
    // -----------------------------------------------------------------------
    // Lookup and creation
    // -----------------------------------------------------------------------

    /// Id of the thread for `address`, creating it if needed.
    ///
    /// Concurrent callers for the same address always get the same id and
    /// only one row is ever created.
    pub fn get_or_create_thread_id(&self, address: &Address) -> Result<i64> {
        self.get_or_create_thread_id_with(address, DistributionType::default())
    }

    pub fn get_or_create_thread_id_with(
        &self,
        address: &Address,
        distribution_type: DistributionType,
    ) -> Result<i64> {
        let (thread_id, created) = {
            let _guard = lock(&self.thread_create_lock);
            let conn = self.conn();

            match find_thread_id(&conn, address)? {
                Some(id) => (id, false),
                None => {
                    let now = self.clock.now_millis();
                    // The unique index on address is the backstop; with the
                    // lock held the conflict branch should never run.
                    let inserted = conn.execute(
                        "INSERT INTO thread (address, creation_date, date, type)
                         VALUES (?1, ?2, ?2, ?3)
                         ON CONFLICT (address) DO NOTHING",
                        params![address.to_string(), now, distribution_type.as_i64()],
                    )?;
                    let id = find_thread_id(&conn, address)?.ok_or(StoreError::NotFound)?;
                    (id, inserted == 1)
                }
            }
        };

        lock(&self.thread_addresses).insert(thread_id, address.clone());

        if created {
            tracing::info!(thread_id, address = %address.debug_string(), "thread created");
            let hook = lock(&self.thread_created_hook).clone();
            if let Some(hook) = hook {
                hook(thread_id, address);
            }
            self.notify_thread(thread_id);
        }
        Ok(thread_id)
    }

    pub fn thread_id_if_exists(&self, address: &Address) -> Result<Option<i64>> {
        let conn = self.conn();
        find_thread_id(&conn, address)
    }

    /// Address of a thread, served from an in-memory cache after the first
    /// lookup.
    pub fn address_for_thread(&self, thread_id: i64) -> Result<Option<Address>> {
        if let Some(address) = lock(&self.thread_addresses).get(&thread_id) {
            return Ok(Some(address.clone()));
        }

        let address = {
            let conn = self.conn();
            thread_address(&conn, thread_id)?
        };
        if let Some(address) = &address {
            lock(&self.thread_addresses).insert(thread_id, address.clone());
        }
        Ok(address)
    }

    /// Called once for every newly created thread, outside of any store lock.
    pub fn set_thread_created_hook(&self, hook: Option<ThreadCreatedHook>) {
        *lock(&self.thread_created_hook) = hook;
    }

    pub fn get_thread(&self, thread_id: i64) -> Result<Option<ThreadRecord>> {
        let conn = self.conn();
        let thread = conn
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM thread t WHERE t._id = ?1"),
                params![thread_id],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    // -----------------------------------------------------------------------
    // Lists
    // -----------------------------------------------------------------------

    /// Visible conversations: pinned first, then most recent.  Empty
    /// one-to-one threads are hidden; groups and communities always show.
    pub fn conversation_list(&self) -> Result<Vec<ThreadRecord>> {
        Ok(self
            .listed_threads("t.archived = 0")?
            .into_iter()
            .filter(|l| is_listable(&l.thread))
            .map(|l| l.thread)
            .collect())
    }

    pub fn archived_list(&self) -> Result<Vec<ThreadRecord>> {
        Ok(self
            .listed_threads("t.archived = 1")?
            .into_iter()
            .map(|l| l.thread)
            .collect())
    }

    /// Conversations the user has accepted: they sent something, approved
    /// the contact, or it is a group / community.
    pub fn approved_conversation_list(&self) -> Result<Vec<ThreadRecord>> {
        Ok(self
            .listed_threads("t.archived = 0")?
            .into_iter()
            .filter(|l| is_listable(&l.thread) && l.is_approved())
            .map(|l| l.thread)
            .collect())
    }

    /// Message requests: unapproved, unblocked one-to-one threads with at
    /// least one message.
    pub fn unapproved_conversation_list(&self) -> Result<Vec<ThreadRecord>> {
        Ok(self
            .listed_threads("t.archived = 0 AND t.message_count > 0")?
            .into_iter()
            .filter(|l| !l.is_approved() && !l.blocked)
            .map(|l| l.thread)
            .collect())
    }

    pub fn recent_conversation_list(&self, limit: usize) -> Result<Vec<ThreadRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread t
             WHERE t.message_count > 0 ORDER BY t.date DESC, t._id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    pub fn search_by_address_prefix(&self, prefix: &str) -> Result<Vec<ThreadRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM thread t
             WHERE substr(t.address, 1, length(?1)) = ?1 ORDER BY t.date DESC, t._id DESC"
        ))?;
        let rows = stmt.query_map(params![prefix], row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    fn listed_threads(&self, predicate: &str) -> Result<Vec<ListedThread>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {THREAD_COLUMNS}, COALESCE(rs.approved, 0), COALESCE(rs.blocked, 0)
             FROM thread t LEFT JOIN recipient_settings rs ON rs.address = t.address
             WHERE {predicate}
             ORDER BY t.is_pinned DESC, t.date DESC, t._id DESC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(ListedThread {
                thread: row_to_thread(row)?,
                approved: row.get(20)?,
                blocked: row.get(21)?,
            })
        })?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    // -----------------------------------------------------------------------
    // Flags
    // -----------------------------------------------------------------------

    pub fn set_archived(&self, thread_id: i64, archived: bool) -> Result<()> {
        self.set_thread_column(thread_id, "archived", archived as i64)
    }

    pub fn set_pinned(&self, thread_id: i64, pinned: bool) -> Result<()> {
        self.set_thread_column(thread_id, "is_pinned", pinned as i64)
    }

    pub fn is_pinned(&self, thread_id: i64) -> Result<bool> {
        Ok(self.thread_column::<bool>(thread_id, "is_pinned")?.unwrap_or(false))
    }

    pub fn set_has_sent(&self, thread_id: i64, has_sent: bool) -> Result<()> {
        self.set_thread_column(thread_id, "has_sent", has_sent as i64)
    }

    pub fn last_seen_and_has_sent(&self, thread_id: i64) -> Result<Option<(i64, bool)>> {
        let conn = self.conn();
        let pair = conn
            .query_row(
                "SELECT last_seen, has_sent FROM thread WHERE _id = ?1",
                params![thread_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(pair)
    }

    pub fn set_distribution_type(&self, thread_id: i64, distribution_type: DistributionType) -> Result<()> {
        self.set_thread_column(thread_id, "type", distribution_type.as_i64())
    }

    pub fn distribution_type(&self, thread_id: i64) -> Result<Option<DistributionType>> {
        Ok(self
            .thread_column::<i64>(thread_id, "type")?
            .map(DistributionType::from_i64))
    }

    pub fn set_creation_date(&self, thread_id: i64, date: i64) -> Result<()> {
        self.set_thread_column(thread_id, "creation_date", date)
    }

    /// Time of the latest message as stored on the thread row.
    pub fn last_updated(&self, thread_id: i64) -> Result<Option<i64>> {
        self.thread_column(thread_id, "date")
    }

    /// Message count as of the last [`Database::update_thread`].
    pub fn message_count(&self, thread_id: i64) -> Result<i64> {
        Ok(self.thread_column(thread_id, "message_count")?.unwrap_or(0))
    }

    fn set_thread_column(&self, thread_id: i64, column: &str, value: i64) -> Result<()> {
        let affected = {
            let conn = self.conn();
            conn.execute(
                &format!("UPDATE thread SET {column} = ?2 WHERE _id = ?1"),
                params![thread_id, value],
            )?
        };
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.notify_thread(thread_id);
        Ok(())
    }

    fn thread_column<T: rusqlite::types::FromSql>(&self, thread_id: i64, column: &str) -> Result<Option<T>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                &format!("SELECT {column} FROM thread WHERE _id = ?1"),
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Recompute count, snippet, receipt counts and expiry from the newest
    /// non-deleted message.  Clears the snippet when there is none.
    /// Returns whether a snippet message was found.
    pub fn update_thread(&self, thread_id: i64, unarchive: bool) -> Result<bool> {
        let found = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let found = update_thread_in(&tx, thread_id, unarchive)?;
            tx.commit()?;
            found
        };
        self.notify_thread(thread_id);
        Ok(found)
    }

    pub fn clear_snippet(&self, thread_id: i64) -> Result<()> {
        {
            let conn = self.conn();
            let count = conversation_count(&conn, thread_id)?;
            clear_snippet_in(&conn, thread_id, count)?;
        }
        self.notify_thread(thread_id);
        Ok(())
    }

    /// Set the thread's last-seen time (`LAST_SEEN_NOW` for the clock's now)
    /// and recompute its unread counters.
    ///
    /// Returns `false` without changing anything for a missing thread, and
    /// for a community thread that has no messages yet: setting last-seen
    /// there would hide the first messages once they sync.
    pub fn set_last_seen(&self, thread_id: i64, timestamp: i64) -> Result<bool> {
        let timestamp = if timestamp == parley_shared::constants::LAST_SEEN_NOW {
            self.clock.now_millis()
        } else {
            timestamp
        };

        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            let Some(address) = thread_address(&tx, thread_id)? else {
                return Ok(false);
            };
            if address.is_community() && conversation_count(&tx, thread_id)? <= 0 {
                tracing::debug!(thread_id, "not setting last seen on an empty community");
                return Ok(false);
            }

            tx.execute(
                "UPDATE thread SET last_seen = ?2 WHERE _id = ?1",
                params![thread_id, timestamp],
            )?;
            unread::recompute(&tx, thread_id)?;
            tx.commit()?;
        }

        self.notify_thread(thread_id);
        Ok(true)
    }

    /// Mark messages of both tables read and recompute the counters.
    ///
    /// Returns the messages whose read flag flipped in this call, for
    /// read-receipt dispatch.  With `update_last_seen` the thread's
    /// last-seen moves forward to `t` (or to now for [`ReadUpTo::All`]).
    pub fn set_read(
        &self,
        thread_id: i64,
        up_to: ReadUpTo,
        update_last_seen: bool,
    ) -> Result<Vec<MarkedMessageInfo>> {
        let mut marked = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            if thread_address(&tx, thread_id)?.is_none() {
                return Err(StoreError::NotFound);
            }

            let mut marked = set_messages_read(&tx, &SMS_SCHEMA, thread_id, up_to)?;
            marked.extend(set_messages_read(&tx, &MMS_SCHEMA, thread_id, up_to)?);

            if update_last_seen {
                let seen = match up_to {
                    ReadUpTo::Time(t) => t,
                    ReadUpTo::All => self.clock.now_millis(),
                };
                tx.execute(
                    "UPDATE thread SET last_seen = MAX(last_seen, ?2) WHERE _id = ?1",
                    params![thread_id, seen],
                )?;
            }
            unread::recompute(&tx, thread_id)?;
            tx.commit()?;
            marked
        };

        marked.sort_by_key(|m| (m.date_sent, m.message));
        tracing::debug!(thread_id, marked = marked.len(), "thread marked read");
        self.notify_thread(thread_id);
        Ok(marked)
    }

    /// Mark everything up to `time` read and move last-seen there.  Unless
    /// `force` is set this does nothing when last-seen is already at or past
    /// `time`.  Returns `None` when nothing was done.
    pub fn mark_all_as_read(
        &self,
        thread_id: i64,
        time: i64,
        force: bool,
    ) -> Result<Option<Vec<MarkedMessageInfo>>> {
        let Some((last_seen, _)) = self.last_seen_and_has_sent(thread_id)? else {
            return Ok(None);
        };
        if !force && last_seen >= time {
            return Ok(None);
        }

        let marked = self.set_read(thread_id, ReadUpTo::Time(time), false)?;
        self.set_last_seen(thread_id, time)?;
        Ok(Some(marked))
    }

    // -----------------------------------------------------------------------
    // Trimming and deletion
    // -----------------------------------------------------------------------

    /// Keep only the newest `length` messages of the thread.
    pub fn trim_thread(&self, thread_id: i64, length: usize) -> Result<usize> {
        let deleted = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            let doomed: Vec<MessageRecord> =
                conversation_reader(&tx, thread_id, SortOrder::Descending, length as i64, None)?
                    .collect();
            let deleted = delete_records(&tx, &doomed)?;

            if deleted > 0 {
                update_thread_in(&tx, thread_id, false)?;
                unread::recompute(&tx, thread_id)?;
            }
            tx.commit()?;
            deleted
        };

        if deleted > 0 {
            tracing::info!(thread_id, deleted, "thread trimmed");
            self.notify_thread(thread_id);
        }
        Ok(deleted)
    }

    /// Delete every message of the thread sent before `time`.
    pub fn trim_thread_before(&self, thread_id: i64, time: i64) -> Result<usize> {
        let deleted = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            let doomed: Vec<MessageRecord> =
                conversation_reader(&tx, thread_id, SortOrder::Ascending, 0, None)?
                    .take_while(|r| r.date_sent() < time)
                    .collect();
            let deleted = delete_records(&tx, &doomed)?;

            if deleted > 0 {
                update_thread_in(&tx, thread_id, false)?;
                unread::recompute(&tx, thread_id)?;
            }
            tx.commit()?;
            deleted
        };

        if deleted > 0 {
            self.notify_thread(thread_id);
        }
        Ok(deleted)
    }

    /// Remove the thread row only.  Its messages are left for the caller.
    pub fn delete_thread(&self, thread_id: i64) -> Result<bool> {
        let affected = {
            let conn = self.conn();
            conn.execute("DELETE FROM thread WHERE _id = ?1", params![thread_id])?
        };
        lock(&self.thread_addresses).remove(&thread_id);

        if affected > 0 {
            tracing::info!(thread_id, "thread deleted");
            self.notify_thread(thread_id);
        }
        Ok(affected > 0)
    }

    pub fn delete_threads(&self, thread_ids: &[i64]) -> Result<usize> {
        let deleted = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let mut deleted = 0;
            for id in thread_ids {
                deleted += tx.execute("DELETE FROM thread WHERE _id = ?1", params![id])?;
            }
            tx.commit()?;
            deleted
        };

        {
            let mut cache = lock(&self.thread_addresses);
            for id in thread_ids {
                cache.remove(id);
            }
        }
        self.notify_all_threads();
        Ok(deleted)
    }

    pub fn delete_all_threads(&self) -> Result<usize> {
        let deleted = {
            let conn = self.conn();
            conn.execute("DELETE FROM thread", [])?
        };
        lock(&self.thread_addresses).clear();

        tracing::info!(deleted, "all threads deleted");
        self.notify_all_threads();
        Ok(deleted)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

fn find_thread_id(conn: &Connection, address: &Address) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT _id FROM thread WHERE address = ?1",
            params![address.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn thread_address(conn: &Connection, thread_id: i64) -> Result<Option<Address>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT address FROM thread WHERE _id = ?1",
            params![thread_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(|s| Address::from_serialized(&s)))
}

/// Newest non-deleted message, scanning backwards a page at a time.
fn latest_visible_message(conn: &Connection, thread_id: i64) -> Result<Option<MessageRecord>> {
    let mut offset = 0;
    loop {
        let mut page = conversation_reader(
            conn,
            thread_id,
            SortOrder::Descending,
            offset,
            Some(SNIPPET_SCAN_PAGE),
        )?;
        let fetched = page.remaining() as i64;

        if let Some(record) = page.by_ref().find(|r| !r.is_deleted()) {
            return Ok(Some(record));
        }
        if fetched < SNIPPET_SCAN_PAGE {
            return Ok(None);
        }
        offset += SNIPPET_SCAN_PAGE;
    }
}

pub(crate) fn update_thread_in(conn: &Connection, thread_id: i64, unarchive: bool) -> Result<bool> {
    let count = conversation_count(conn, thread_id)?;

    let Some(record) = latest_visible_message(conn, thread_id)? else {
        clear_snippet_in(conn, thread_id, count)?;
        return Ok(false);
    };
    let snippet = Snippet::from_record(&record);
    let content = encode_snippet_content(thread_id, snippet.content.as_ref());

    let affected = conn.execute(
        "UPDATE thread SET
             date = ?2, message_count = ?3, snippet = ?4, snippet_type = ?5, snippet_uri = ?6,
             snippet_content = ?7, delivery_receipt_count = ?8, read_receipt_count = ?9,
             expires_in = ?10, archived = CASE WHEN ?11 THEN 0 ELSE archived END
         WHERE _id = ?1",
        params![
            thread_id,
            snippet.date,
            count,
            snippet.body,
            i64::from(snippet.message_type),
            snippet.uri,
            content,
            snippet.delivery_receipt_count,
            snippet.read_receipt_count,
            snippet.expires_in,
            unarchive,
        ],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(true)
}

fn clear_snippet_in(conn: &Connection, thread_id: i64, count: i64) -> Result<()> {
    let affected = conn.execute(
        "UPDATE thread SET
             message_count = ?2, snippet = '', snippet_type = 0, snippet_uri = NULL,
             snippet_content = NULL, delivery_receipt_count = 0, read_receipt_count = 0,
             expires_in = 0
         WHERE _id = ?1",
        params![thread_id, count],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

fn encode_snippet_content(thread_id: i64, content: Option<&MessageContent>) -> Option<String> {
    content.and_then(|c| match serde_json::to_string(c) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(thread_id, error = %e, "could not encode snippet content");
            None
        }
    })
}

fn delete_records(conn: &Connection, records: &[MessageRecord]) -> Result<usize> {
    let ids_for = |transport: Transport| -> Vec<i64> {
        records
            .iter()
            .filter(|r| r.transport() == transport)
            .map(|r| r.common().id)
            .collect()
    };
    Ok(delete_ids(conn, &SMS_SCHEMA, &ids_for(Transport::Sms))?
        + delete_ids(conn, &MMS_SCHEMA, &ids_for(Transport::Mms))?)
}

struct ListedThread {
    thread: ThreadRecord,
    approved: bool,
    blocked: bool,
}

impl ListedThread {
    fn is_approved(&self) -> bool {
        self.thread.has_sent || self.approved || self.thread.address.is_group_or_community()
    }
}

fn is_listable(thread: &ThreadRecord) -> bool {
    thread.message_count > 0 || thread.pinned || thread.address.is_group_or_community()
}

fn row_to_thread(row: &Row<'_>) -> rusqlite::Result<ThreadRecord> {
    let id: i64 = row.get(0)?;
    let address: String = row.get(1)?;
    let snippet_content = row
        .get::<_, Option<String>>(8)?
        .and_then(|json| match serde_json::from_str(&json) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(thread_id = id, error = %e, "undecodable snippet content");
                None
            }
        });

    Ok(ThreadRecord {
        id,
        address: Address::from_serialized(&address),
        creation_date: row.get(2)?,
        date: row.get(3)?,
        message_count: row.get(4)?,
        snippet: row.get(5)?,
        snippet_type: MessageType::from(row.get::<_, i64>(6)?),
        snippet_uri: row.get(7)?,
        snippet_content,
        read: row.get(9)?,
        unread_count: row.get(10)?,
        unread_mention_count: row.get(11)?,
        distribution_type: DistributionType::from_i64(row.get(12)?),
        archived: row.get(13)?,
        pinned: row.get(14)?,
        last_seen: row.get(15)?,
        has_sent: row.get(16)?,
        delivery_receipt_count: row.get(17)?,
        read_receipt_count: row.get(18)?,
        expires_in: row.get(19)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::database::StoreOptions;
    use crate::messages::{MessageTable, NewMessage};
    use crate::models::{AttachmentKind, AttachmentRef};

    fn grace() -> Address {
        Address::from_serialized(&format!("05{}", "9a".repeat(32)))
    }

    fn me() -> Address {
        Address::from_serialized(&format!("05{}", "ee".repeat(32)))
    }

    fn community() -> Address {
        Address::community("https://open.example.org", "lobby")
    }

    fn db_at(now: i64) -> (Database, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let db = Database::in_memory_with(StoreOptions::default().with_clock(clock.clone())).unwrap();
        (db, clock)
    }

    #[test]
    fn get_or_create_is_stable_and_caches_address() {
        let (db, _) = db_at(5_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        db.set_thread_created_hook(Some(Arc::new(move |_: i64, _: &Address| {
            seen.fetch_add(1, Ordering::SeqCst);
        })));

        let a = db.get_or_create_thread_id(&grace()).unwrap();
        let b = db.get_or_create_thread_id(&grace()).unwrap();
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(db.thread_id_if_exists(&grace()).unwrap(), Some(a));
        assert_eq!(db.address_for_thread(a).unwrap(), Some(grace()));

        let thread = db.get_thread(a).unwrap().unwrap();
        assert_eq!(thread.creation_date, 5_000);
        assert_eq!(thread.distribution_type, DistributionType::Conversation);
        assert!(thread.read);
    }

    #[test]
    fn update_skips_deleted_rows_and_truncates_date() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(grace(), 1_234, "older"))
            .unwrap();
        let newest = db
            .mms()
            .insert(thread, &NewMessage::incoming(grace(), 5_678, "newer"))
            .unwrap();
        db.mms().mark_as_deleted(newest, "deleted").unwrap();

        assert!(db.update_thread(thread, false).unwrap());
        let record = db.get_thread(thread).unwrap().unwrap();
        assert_eq!(record.snippet, "older");
        assert_eq!(record.date, 1_000);
        assert_eq!(record.message_count, 2);
    }

    #[test]
    fn update_uses_attachment_label_and_uri() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        db.mms()
            .insert(
                thread,
                &NewMessage::incoming(grace(), 10, "").with_attachment(AttachmentRef {
                    uri: "blob://v/1".into(),
                    kind: AttachmentKind::VoiceNote,
                }),
            )
            .unwrap();

        db.update_thread(thread, false).unwrap();
        let record = db.get_thread(thread).unwrap().unwrap();
        assert_eq!(record.snippet, "Voice message");
        assert_eq!(record.snippet_uri.as_deref(), Some("blob://v/1"));
    }

    #[test]
    fn update_without_messages_clears_snippet() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::incoming(grace(), 10, "bye"))
            .unwrap();
        db.update_thread(thread, false).unwrap();

        db.sms().delete_message(id).unwrap();
        assert!(!db.update_thread(thread, false).unwrap());

        let record = db.get_thread(thread).unwrap().unwrap();
        assert_eq!(record.snippet, "");
        assert_eq!(record.message_count, 0);
    }

    #[test]
    fn unarchive_on_update() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(grace(), 10, "hi"))
            .unwrap();
        db.set_archived(thread, true).unwrap();

        db.update_thread(thread, false).unwrap();
        assert!(db.get_thread(thread).unwrap().unwrap().archived);
        db.update_thread(thread, true).unwrap();
        assert!(!db.get_thread(thread).unwrap().unwrap().archived);
    }

    #[test]
    fn set_last_seen_now_uses_clock() {
        let (db, clock) = db_at(10_000);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(grace(), 9_000, "a"))
            .unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(grace(), 11_000, "b"))
            .unwrap();

        clock.set(10_000);
        assert!(db
            .set_last_seen(thread, parley_shared::constants::LAST_SEEN_NOW)
            .unwrap());
        assert_eq!(db.last_seen_and_has_sent(thread).unwrap(), Some((10_000, false)));
        assert_eq!(db.get_thread(thread).unwrap().unwrap().unread_count, 1);
        assert!(!db.set_last_seen(999, 1).unwrap());
    }

    #[test]
    fn empty_community_keeps_last_seen() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&community()).unwrap();

        assert!(!db.set_last_seen(thread, 500).unwrap());
        assert_eq!(db.last_seen_and_has_sent(thread).unwrap(), Some((0, false)));
    }

    #[test]
    fn set_read_flips_thread_flag_only_when_nothing_is_left() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        for ts in [100, 200] {
            db.sms()
                .insert(thread, &NewMessage::incoming(grace(), ts, "m"))
                .unwrap();
        }
        db.mms()
            .insert(thread, &NewMessage::incoming(grace(), 300, "m"))
            .unwrap();
        db.refresh_unread_counts(thread).unwrap();
        assert!(!db.get_thread(thread).unwrap().unwrap().read);

        let marked = db.set_read(thread, ReadUpTo::Time(200), true).unwrap();
        assert_eq!(marked.len(), 2);
        let record = db.get_thread(thread).unwrap().unwrap();
        assert!(!record.read);
        assert_eq!(record.last_seen, 200);
        assert_eq!(record.unread_count, 1);

        let marked = db.set_read(thread, ReadUpTo::All, false).unwrap();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].message.transport, Transport::Mms);
        let record = db.get_thread(thread).unwrap().unwrap();
        assert!(record.read);
        assert_eq!(record.unread_count, 0);
        assert_eq!(record.unread_mention_count, 0);
    }

    #[test]
    fn mark_all_as_read_respects_force() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(grace(), 100, "m"))
            .unwrap();
        db.set_last_seen(thread, 500).unwrap();

        assert_eq!(db.mark_all_as_read(thread, 400, false).unwrap(), None);
        let marked = db.mark_all_as_read(thread, 400, true).unwrap().unwrap();
        assert_eq!(marked.len(), 1);
        assert_eq!(db.last_seen_and_has_sent(thread).unwrap(), Some((400, false)));
    }

    #[test]
    fn lists_and_flags() {
        let (db, _) = db_at(0);
        let chat = db.get_or_create_thread_id(&grace()).unwrap();
        let request = db.get_or_create_thread_id(&me()).unwrap();
        let empty = db.get_or_create_thread_id(&Address::from_serialized(&format!("05{}", "01".repeat(32)))).unwrap();
        let open = db.get_or_create_thread_id(&community()).unwrap();

        for (thread, author) in [(chat, grace()), (request, me())] {
            db.sms()
                .insert(thread, &NewMessage::incoming(author, 10, "x"))
                .unwrap();
            db.update_thread(thread, false).unwrap();
        }
        db.set_has_sent(chat, true).unwrap();
        db.set_pinned(open, true).unwrap();

        let ids = |list: Vec<ThreadRecord>| list.into_iter().map(|t| t.id).collect::<Vec<_>>();

        assert_eq!(ids(db.conversation_list().unwrap())[0], open);
        assert!(!ids(db.conversation_list().unwrap()).contains(&empty));
        assert!(db.is_pinned(open).unwrap());

        assert_eq!(ids(db.unapproved_conversation_list().unwrap()), vec![request]);
        let approved = ids(db.approved_conversation_list().unwrap());
        assert!(approved.contains(&chat) && approved.contains(&open));
        assert!(!approved.contains(&request));

        db.set_archived(request, true).unwrap();
        assert_eq!(ids(db.archived_list().unwrap()), vec![request]);
        assert!(db.unapproved_conversation_list().unwrap().is_empty());

        assert_eq!(ids(db.search_by_address_prefix("https://open").unwrap()), vec![open]);
        assert_eq!(db.recent_conversation_list(10).unwrap().len(), 2);

        db.set_distribution_type(chat, DistributionType::Broadcast).unwrap();
        assert_eq!(db.distribution_type(chat).unwrap(), Some(DistributionType::Broadcast));
        db.set_creation_date(chat, 77).unwrap();
        assert_eq!(db.get_thread(chat).unwrap().unwrap().creation_date, 77);
        assert_eq!(db.message_count(chat).unwrap(), 1);
        assert_eq!(db.last_updated(chat).unwrap(), Some(0));

        assert!(matches!(db.set_archived(999, true), Err(StoreError::NotFound)));
    }

    #[test]
    fn trimming() {
        let (db, _) = db_at(0);
        let thread = db.get_or_create_thread_id(&grace()).unwrap();
        for ts in [1_000, 2_000, 3_000, 4_000] {
            db.sms()
                .insert(thread, &NewMessage::incoming(grace(), ts, format!("m{ts}")))
                .unwrap();
        }
        db.mms()
            .insert(thread, &NewMessage::incoming(grace(), 2_500, "mms"))
            .unwrap();

        assert_eq!(db.trim_thread_before(thread, 2_000).unwrap(), 1);
        assert_eq!(db.trim_thread(thread, 2).unwrap(), 2);

        let left: Vec<String> = db
            .conversation(thread, SortOrder::Ascending, 0, None)
            .unwrap()
            .map(|r| r.body().to_string())
            .collect();
        assert_eq!(left, ["m3000", "m4000"]);

        let record = db.get_thread(thread).unwrap().unwrap();
        assert_eq!(record.message_count, 2);
        assert_eq!(record.snippet, "m4000");
        assert_eq!(record.unread_count, 2);
    }

    #[test]
    fn deleting_threads_keeps_messages() {
        let (db, _) = db_at(0);
        let a = db.get_or_create_thread_id(&grace()).unwrap();
        let b = db.get_or_create_thread_id(&me()).unwrap();
        db.sms()
            .insert(a, &NewMessage::incoming(grace(), 1, "x"))
            .unwrap();

        assert!(db.delete_thread(a).unwrap());
        assert_eq!(db.address_for_thread(a).unwrap(), None);
        assert_eq!(db.sms().message_count_for_thread(a).unwrap(), 1);

        assert_eq!(db.delete_threads(&[b, 12345]).unwrap(), 1);
        db.get_or_create_thread_id(&grace()).unwrap();
        assert_eq!(db.delete_all_threads().unwrap(), 1);
        assert!(db.conversation_list().unwrap().is_empty());
    }
}
