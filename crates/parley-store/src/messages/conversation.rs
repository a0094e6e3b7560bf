//! The merged conversation view.
//!
//! Both tables are projected onto one column set and combined with
//! `UNION ALL`.  Columns only one table has are synthesised as `NULL` in the
//! other branch, and a `transport` discriminator tells the [`MessageReader`]
//! which decoder to use for each row.  Each table's own sent-time column is
//! aliased to `normalized_date_sent`.
//!
//! Ordering is by `normalized_date_sent`, then `transport`, then `_id`, all
//! in the requested direction, so rows with equal sent times across tables
//! have a stable order.

use parley_shared::Address;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;

use crate::database::Database;
use crate::error::Result;
use crate::message_type::MessageType;
use crate::messages::{
    MessageCommon, MessageId, MessageRecord, MmsMessageRecord, ReactionRecord, SmsMessageRecord,
    TableSchema, Transport, MMS_SCHEMA, SMS_SCHEMA,
};
use crate::models::{AttachmentKind, AttachmentRef, QuoteRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    fn order_by(self) -> String {
        let dir = self.sql();
        format!("ORDER BY normalized_date_sent {dir}, transport {dir}, _id {dir}")
    }
}

/// Upper end of a [`Database::query_conversation`] window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageBound {
    /// Inclusive upper sent time.
    Until(i64),
    /// At most this many rows.
    Limit(i64),
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

fn branch_sql(schema: &TableSchema) -> String {
    let extras = if schema.has_attachments {
        "NULL AS status, m.attachment_uri AS attachment_uri, m.attachment_kind AS attachment_kind,
         m.quote_id AS quote_id, m.quote_author AS quote_author"
    } else {
        "m.status AS status, NULL AS attachment_uri, NULL AS attachment_kind,
         NULL AS quote_id, NULL AS quote_author"
    };

    format!(
        "SELECT '{transport}' AS transport, m._id AS _id, m.thread_id AS thread_id,
                m.address AS address, m.{date_sent} AS normalized_date_sent,
                m.{date_received} AS normalized_date_received, m.{ty} AS type,
                m.body AS body, m.read AS read, m.has_mention AS has_mention,
                m.notified AS notified, m.reactions_unread AS reactions_unread,
                m.delivery_receipt_count AS delivery_receipt_count,
                m.read_receipt_count AS read_receipt_count, m.expires_in AS expires_in,
                m.expire_started AS expire_started, m.is_deleted AS is_deleted,
                m.message_content AS message_content, {extras},
                (SELECT json_group_array(json_object(
                        'id', r._id, 'author', r.author_id, 'emoji', r.emoji,
                        'server_id', r.server_id, 'count', r.count, 'sort_id', r.sort_id,
                        'date_sent', r.date_sent, 'date_received', r.date_received))
                   FROM reaction r
                  WHERE r.message_id = m._id AND r.is_mms = {is_mms}) AS reactions,
                th.address AS conversation_address
           FROM {table} m LEFT JOIN thread th ON th._id = m.thread_id",
        transport = schema.transport.as_str(),
        date_sent = schema.date_sent,
        date_received = schema.date_received,
        ty = schema.message_type,
        is_mms = schema.transport.is_mms_flag(),
        table = schema.table,
    )
}

/// Both tables, one row set.
fn merged_sql() -> String {
    format!(
        "SELECT * FROM ({} UNION ALL {})",
        branch_sql(&SMS_SCHEMA),
        branch_sql(&MMS_SCHEMA)
    )
}

fn outgoing_predicate() -> String {
    MessageType::outgoing_sql("type")
}

// ---------------------------------------------------------------------------
// Rows and decoding
// ---------------------------------------------------------------------------

/// One undecoded row of the merged projection.
struct MergedRow {
    transport: String,
    id: i64,
    thread_id: i64,
    address: String,
    date_sent: i64,
    date_received: i64,
    message_type: i64,
    body: Option<String>,
    read: bool,
    has_mention: bool,
    notified: bool,
    reactions_unread: bool,
    delivery_receipt_count: i64,
    read_receipt_count: i64,
    expires_in: i64,
    expire_started: i64,
    is_deleted: bool,
    message_content: Option<String>,
    status: Option<i64>,
    attachment_uri: Option<String>,
    attachment_kind: Option<String>,
    quote_id: Option<i64>,
    quote_author: Option<String>,
    reactions: Option<String>,
    conversation_address: Option<String>,
}

impl MergedRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            transport: row.get("transport")?,
            id: row.get("_id")?,
            thread_id: row.get("thread_id")?,
            address: row.get("address")?,
            date_sent: row.get("normalized_date_sent")?,
            date_received: row.get("normalized_date_received")?,
            message_type: row.get("type")?,
            body: row.get("body")?,
            read: row.get("read")?,
            has_mention: row.get("has_mention")?,
            notified: row.get("notified")?,
            reactions_unread: row.get("reactions_unread")?,
            delivery_receipt_count: row.get("delivery_receipt_count")?,
            read_receipt_count: row.get("read_receipt_count")?,
            expires_in: row.get("expires_in")?,
            expire_started: row.get("expire_started")?,
            is_deleted: row.get("is_deleted")?,
            message_content: row.get("message_content")?,
            status: row.get("status")?,
            attachment_uri: row.get("attachment_uri")?,
            attachment_kind: row.get("attachment_kind")?,
            quote_id: row.get("quote_id")?,
            quote_author: row.get("quote_author")?,
            reactions: row.get("reactions")?,
            conversation_address: row.get("conversation_address")?,
        })
    }

    /// Dispatch on the discriminator.  Only an unknown discriminator drops
    /// the row; a corrupt payload only drops that field.
    fn decode(self) -> Option<MessageRecord> {
        let Some(transport) = Transport::parse(&self.transport) else {
            tracing::error!(transport = %self.transport, id = self.id, "unknown transport in merged row");
            return None;
        };

        let content = self.message_content.as_deref().and_then(|json| {
            serde_json::from_str(json)
                .map_err(|e| {
                    tracing::warn!(%transport, id = self.id, error = %e, "undecodable message content");
                })
                .ok()
        });
        let reactions = decode_reactions(self.reactions.as_deref(), MessageId::new(self.id, transport));

        let common = MessageCommon {
            id: self.id,
            thread_id: self.thread_id,
            author: Address::from_serialized(&self.address),
            conversation: self.conversation_address.as_deref().map(Address::from_serialized),
            date_sent: self.date_sent,
            date_received: self.date_received,
            message_type: MessageType::from(self.message_type),
            body: self.body.unwrap_or_default(),
            read: self.read,
            has_mention: self.has_mention,
            notified: self.notified,
            reactions_unread: self.reactions_unread,
            delivery_receipt_count: self.delivery_receipt_count,
            read_receipt_count: self.read_receipt_count,
            expires_in: self.expires_in,
            expire_started: self.expire_started,
            is_deleted: self.is_deleted,
            content,
            reactions,
        };

        Some(match transport {
            Transport::Sms => MessageRecord::Sms(SmsMessageRecord {
                common,
                status: self.status.unwrap_or(-1),
            }),
            Transport::Mms => {
                let attachment = self.attachment_uri.map(|uri| {
                    let kind = self
                        .attachment_kind
                        .as_deref()
                        .and_then(AttachmentKind::parse)
                        .unwrap_or(AttachmentKind::Document);
                    AttachmentRef { uri, kind }
                });
                let quote = self.quote_id.map(|timestamp| QuoteRef {
                    timestamp,
                    author: Address::from_serialized(self.quote_author.as_deref().unwrap_or_default()),
                });
                MessageRecord::Mms(MmsMessageRecord {
                    common,
                    attachment,
                    quote,
                })
            }
        })
    }
}

#[derive(Deserialize)]
struct ReactionJson {
    id: i64,
    author: String,
    emoji: String,
    server_id: Option<String>,
    count: i64,
    sort_id: i64,
    date_sent: i64,
    date_received: i64,
}

fn decode_reactions(json: Option<&str>, message: MessageId) -> Vec<ReactionRecord> {
    let Some(json) = json else {
        return Vec::new();
    };
    let parsed: Vec<ReactionJson> = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(message_id = message.id, error = %e, "undecodable reactions");
            return Vec::new();
        }
    };

    let mut reactions: Vec<ReactionRecord> = parsed
        .into_iter()
        .map(|r| ReactionRecord {
            id: r.id,
            message,
            author: Address::from_serialized(&r.author),
            emoji: r.emoji,
            server_id: r.server_id,
            count: r.count,
            sort_id: r.sort_id,
            date_sent: r.date_sent,
            date_received: r.date_received,
        })
        .collect();
    reactions.sort_by_key(|r| (r.sort_id, r.id));
    reactions
}

/// Cursor over a merged result set.
///
/// Rows are fetched eagerly (the connection lock is not held while the
/// caller iterates) and decoded lazily, one per [`MessageReader::next_record`].
pub struct MessageReader {
    rows: std::vec::IntoIter<MergedRow>,
}

impl MessageReader {
    fn query(conn: &Connection, sql: &str, args: &[i64]) -> Result<Self> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), MergedRow::from_row)?;

        let mut collected = Vec::new();
        for row in rows {
            collected.push(row?);
        }
        Ok(Self {
            rows: collected.into_iter(),
        })
    }

    /// Advance and decode the next row, skipping rows that cannot be
    /// attributed to either table.
    pub fn next_record(&mut self) -> Option<MessageRecord> {
        for row in self.rows.by_ref() {
            if let Some(record) = row.decode() {
                return Some(record);
            }
        }
        None
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for MessageReader {
    type Item = MessageRecord;

    fn next(&mut self) -> Option<MessageRecord> {
        self.next_record()
    }
}

// ---------------------------------------------------------------------------
// Connection-level queries (usable inside a transaction)
// ---------------------------------------------------------------------------

pub(crate) fn select_one(conn: &Connection, schema: &TableSchema, id: i64) -> Result<Option<MessageRecord>> {
    let sql = format!("SELECT * FROM ({}) WHERE _id = ?1", branch_sql(schema));
    let row = conn
        .query_row(&sql, params![id], MergedRow::from_row)
        .optional()?;
    Ok(row.and_then(MergedRow::decode))
}

pub(crate) fn conversation_reader(
    conn: &Connection,
    thread_id: i64,
    order: SortOrder,
    offset: i64,
    limit: Option<i64>,
) -> Result<MessageReader> {
    let sql = format!(
        "{} WHERE thread_id = ?1 {} LIMIT ?2 OFFSET ?3",
        merged_sql(),
        order.order_by()
    );
    MessageReader::query(conn, &sql, &[thread_id, limit.unwrap_or(-1), offset.max(0)])
}

pub(crate) fn conversation_count(conn: &Connection, thread_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM sms WHERE thread_id = ?1)
              + (SELECT COUNT(*) FROM mms WHERE thread_id = ?1)",
        params![thread_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Database {
    /// Messages of one thread from both tables, in one timeline.
    /// `limit = None` returns every row from `offset` on.
    pub fn conversation(
        &self,
        thread_id: i64,
        order: SortOrder,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<MessageReader> {
        let conn = self.conn();
        conversation_reader(&conn, thread_id, order, offset, limit)
    }

    /// Messages sent at or after `from_time`, up to `bound`.
    pub fn query_conversation(
        &self,
        thread_id: i64,
        from_time: i64,
        bound: PageBound,
        order: SortOrder,
    ) -> Result<MessageReader> {
        let base = format!(
            "{} WHERE thread_id = ?1 AND normalized_date_sent >= ?2",
            merged_sql()
        );
        let (sql, args) = match bound {
            PageBound::Until(to_time) => (
                format!("{base} AND normalized_date_sent <= ?3 {}", order.order_by()),
                vec![thread_id, from_time, to_time],
            ),
            PageBound::Limit(limit) => (
                format!("{base} {} LIMIT ?3", order.order_by()),
                vec![thread_id, from_time, limit],
            ),
        };
        let conn = self.conn();
        MessageReader::query(&conn, &sql, &args)
    }

    /// Whether anything older than `oldest_loaded` exists in the thread.
    pub fn has_next_page(&self, thread_id: i64, oldest_loaded: i64) -> Result<bool> {
        self.exists_in_thread(thread_id, "normalized_date_sent < ?2", oldest_loaded)
    }

    /// Whether anything newer than `newest_loaded` exists in the thread.
    pub fn has_previous_page(&self, thread_id: i64, newest_loaded: i64) -> Result<bool> {
        self.exists_in_thread(thread_id, "normalized_date_sent > ?2", newest_loaded)
    }

    fn exists_in_thread(&self, thread_id: i64, predicate: &str, value: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS ({} WHERE thread_id = ?1 AND {predicate})",
            merged_sql()
        );
        let conn = self.conn();
        let exists = conn.query_row(&sql, params![thread_id, value], |row| row.get(0))?;
        Ok(exists)
    }

    /// Newest-first reader used to derive the thread preview.  Deleted rows
    /// are included; the consumer skips them.
    pub fn conversation_snippet(&self, thread_id: i64) -> Result<MessageReader> {
        self.conversation(thread_id, SortOrder::Descending, 0, None)
    }

    /// The newest row of the thread, deleted or not.
    pub fn last_message(&self, thread_id: i64) -> Result<Option<MessageRecord>> {
        Ok(self
            .conversation(thread_id, SortOrder::Descending, 0, Some(1))?
            .next_record())
    }

    /// First message (in any thread) sent at `timestamp`.
    pub fn message_for_timestamp(&self, timestamp: i64) -> Result<Option<MessageRecord>> {
        let sql = format!(
            "{} WHERE normalized_date_sent = ?1 {} LIMIT 1",
            merged_sql(),
            SortOrder::Ascending.order_by()
        );
        let conn = self.conn();
        Ok(MessageReader::query(&conn, &sql, &[timestamp])?.next_record())
    }

    /// The message sent at `timestamp` by `author`.
    pub fn message_for(&self, timestamp: i64, author: &Address) -> Result<Option<MessageRecord>> {
        let sql = format!(
            "{} WHERE normalized_date_sent = ?1 AND address = ?2 {} LIMIT 1",
            merged_sql(),
            SortOrder::Ascending.order_by()
        );
        let conn = self.conn();
        let row = conn
            .query_row(&sql, params![timestamp, author.to_string()], MergedRow::from_row)
            .optional()?;
        Ok(row.and_then(MergedRow::decode))
    }

    /// Our newest outgoing, non-deleted message in the thread.
    pub fn last_sent_message_id(&self, thread_id: i64) -> Result<Option<MessageId>> {
        let sql = format!(
            "SELECT transport, _id FROM ({}) WHERE thread_id = ?1 AND is_deleted = 0 AND {} {} LIMIT 1",
            merged_sql(),
            outgoing_predicate(),
            SortOrder::Descending.order_by()
        );
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(&sql, params![thread_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row.and_then(|(transport, id)| Transport::parse(&transport).map(|t| MessageId::new(id, t))))
    }

    /// Distinct senders of incoming messages, most recently active first.
    pub fn recent_member_addresses(&self, thread_id: i64, limit: i64) -> Result<Vec<Address>> {
        let sql = format!(
            "SELECT address, MAX(normalized_date_sent) AS last_active FROM ({})
              WHERE thread_id = ?1 AND NOT {}
              GROUP BY address ORDER BY last_active DESC LIMIT ?2",
            merged_sql(),
            outgoing_predicate()
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![thread_id, limit], |row| row.get::<_, String>(0))?;

        let mut addresses = Vec::new();
        for row in rows {
            addresses.push(Address::from_serialized(&row?));
        }
        Ok(addresses)
    }

    pub fn messages_from_sender(&self, thread_id: i64, author: &Address) -> Result<Vec<MessageRecord>> {
        let sql = format!(
            "{} WHERE thread_id = ?1 AND address = ?2 {}",
            merged_sql(),
            SortOrder::Ascending.order_by()
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![thread_id, author.to_string()], MergedRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            if let Some(record) = row?.decode() {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Zero-based position of the message sent at `date_sent` in the
    /// newest-first timeline, or `None` if no such message exists.
    pub fn message_position(&self, thread_id: i64, date_sent: i64) -> Result<Option<i64>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT EXISTS ({merged} WHERE thread_id = ?1 AND normalized_date_sent = ?2),
                    (SELECT COUNT(*) FROM ({merged} WHERE thread_id = ?1 AND normalized_date_sent > ?2))",
            merged = merged_sql()
        );
        let (exists, newer): (bool, i64) = conn.query_row(&sql, params![thread_id, date_sent], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        Ok(exists.then_some(newer))
    }

    /// Rows in both tables for the thread, deleted ones included.
    pub fn conversation_count(&self, thread_id: i64) -> Result<i64> {
        let conn = self.conn();
        conversation_count(&conn, thread_id)
    }

    /// Unread rows of the thread regardless of last-seen.
    pub fn unread_count(&self, thread_id: i64) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM ({}) WHERE thread_id = ?1 AND read = 0 AND is_deleted = 0",
            merged_sql()
        );
        let conn = self.conn();
        let count = conn.query_row(&sql, params![thread_id], |row| row.get(0))?;
        Ok(count)
    }

    /// Messages that should raise a notification, oldest first: incoming rows
    /// that are unread and not yet notified, and our own rows carrying a
    /// reaction newer than their thread's last-seen time.
    pub fn unread_or_unseen_reactions(&self) -> Result<MessageReader> {
        let sql = format!(
            "SELECT u.* FROM ({merged}) u JOIN thread t ON t._id = u.thread_id
              WHERE u.is_deleted = 0 AND (
                    (u.read = 0 AND u.notified = 0 AND NOT {outgoing})
                 OR ({outgoing} AND EXISTS (
                        SELECT 1 FROM reaction r
                         WHERE r.message_id = u._id
                           AND r.is_mms = (u.transport = 'mms')
                           AND r.date_sent > t.last_seen)))
              ORDER BY u.normalized_date_sent ASC, u.transport ASC, u._id ASC",
            merged = merged_sql(),
            outgoing = MessageType::outgoing_sql("u.type"),
        );
        let conn = self.conn();
        MessageReader::query(&conn, &sql, &[])
    }
}
