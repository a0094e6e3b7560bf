//! Statement-level helpers shared by both message tables.
//!
//! Everything here takes a borrowed connection (or transaction) plus the
//! [`TableSchema`] to run against, so thread-level operations can combine
//! both tables inside one transaction without re-locking.

use parley_shared::Address;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::Result;
use crate::message_type::MessageType;
use crate::messages::{DeletedMessage, MarkedMessageInfo, MessageId, ReceiptKind, TableSchema};
use crate::models::ReadUpTo;

pub(crate) fn thread_id_of(conn: &Connection, schema: &TableSchema, id: i64) -> Result<Option<i64>> {
    let thread_id = conn
        .query_row(
            &format!("SELECT thread_id FROM {} WHERE _id = ?1", schema.table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(thread_id)
}

pub(crate) fn message_type_of(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
) -> Result<Option<MessageType>> {
    let raw: Option<i64> = conn
        .query_row(
            &format!("SELECT {} FROM {} WHERE _id = ?1", schema.message_type, schema.table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(MessageType::from))
}

pub(crate) fn count_for_thread(conn: &Connection, schema: &TableSchema, thread_id: i64) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {} WHERE thread_id = ?1", schema.table),
        params![thread_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Rows of the thread that are still unread, whatever their sent time.
pub(crate) fn unread_rows_for_thread(
    conn: &Connection,
    schema: &TableSchema,
    thread_id: i64,
) -> Result<i64> {
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE thread_id = ?1 AND read = 0 AND is_deleted = 0",
            schema.table
        ),
        params![thread_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub(crate) fn set_expire_started(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
    started_at: i64,
) -> Result<Option<i64>> {
    conn.execute(
        &format!("UPDATE {} SET expire_started = ?2 WHERE _id = ?1", schema.table),
        params![id, started_at],
    )?;
    thread_id_of(conn, schema, id)
}

pub(crate) fn set_base_type(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
    base: u64,
) -> Result<Option<i64>> {
    let column = schema.message_type;
    conn.execute(
        &format!(
            "UPDATE {} SET {column} = ({column} & ~{mask}) | ?2 WHERE _id = ?1",
            schema.table,
            mask = MessageType::BASE_TYPE_MASK
        ),
        params![id, (base & MessageType::BASE_TYPE_MASK) as i64],
    )?;
    thread_id_of(conn, schema, id)
}

pub(crate) fn set_notified(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
    notified: bool,
) -> Result<usize> {
    let affected = conn.execute(
        &format!("UPDATE {} SET notified = ?2 WHERE _id = ?1", schema.table),
        params![id, notified],
    )?;
    Ok(affected)
}

fn attachment_uri_of(conn: &Connection, schema: &TableSchema, id: i64) -> Result<Option<String>> {
    if !schema.has_attachments {
        return Ok(None);
    }
    let uri: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT attachment_uri FROM {} WHERE _id = ?1", schema.table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(uri.flatten())
}

fn delete_reactions(conn: &Connection, schema: &TableSchema, id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM reaction WHERE message_id = ?1 AND is_mms = ?2",
        params![id, schema.transport.is_mms_flag()],
    )?;
    Ok(deleted)
}

pub(crate) fn soft_delete(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
    displayed_text: &str,
) -> Result<Option<DeletedMessage>> {
    let Some(thread_id) = thread_id_of(conn, schema, id)? else {
        return Ok(None);
    };
    let attachment_uri = attachment_uri_of(conn, schema, id)?;

    let extra = if schema.has_attachments {
        ", attachment_uri = NULL, attachment_kind = NULL, quote_id = NULL, quote_author = NULL"
    } else {
        ""
    };
    conn.execute(
        &format!(
            "UPDATE {} SET is_deleted = 1, body = ?2, read = 1, has_mention = 0,
                 reactions_unread = 0, message_content = NULL{extra}
             WHERE _id = ?1",
            schema.table
        ),
        params![id, displayed_text],
    )?;
    delete_reactions(conn, schema, id)?;

    Ok(Some(DeletedMessage {
        thread_id,
        attachment_uri,
    }))
}

pub(crate) fn hard_delete(
    conn: &Connection,
    schema: &TableSchema,
    id: i64,
) -> Result<Option<DeletedMessage>> {
    let Some(thread_id) = thread_id_of(conn, schema, id)? else {
        return Ok(None);
    };
    let attachment_uri = attachment_uri_of(conn, schema, id)?;

    delete_reactions(conn, schema, id)?;
    conn.execute(
        &format!("DELETE FROM {} WHERE _id = ?1", schema.table),
        params![id],
    )?;

    Ok(Some(DeletedMessage {
        thread_id,
        attachment_uri,
    }))
}

/// Delete the rows matching `clause` (with positional `args`) together with
/// their reactions.
pub(crate) fn delete_where(
    conn: &Connection,
    schema: &TableSchema,
    clause: &str,
    args: &[i64],
) -> Result<usize> {
    conn.execute(
        &format!(
            "DELETE FROM reaction WHERE is_mms = {} AND message_id IN
                 (SELECT _id FROM {} WHERE {clause})",
            schema.transport.is_mms_flag(),
            schema.table
        ),
        params_from_iter(args.iter()),
    )?;
    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE {clause}", schema.table),
        params_from_iter(args.iter()),
    )?;
    Ok(deleted)
}

pub(crate) fn delete_ids(conn: &Connection, schema: &TableSchema, ids: &[i64]) -> Result<usize> {
    let mut deleted = 0;
    for id in ids {
        delete_reactions(conn, schema, *id)?;
        deleted += conn.execute(
            &format!("DELETE FROM {} WHERE _id = ?1", schema.table),
            params![id],
        )?;
    }
    Ok(deleted)
}

pub(crate) fn set_messages_read(
    conn: &Connection,
    schema: &TableSchema,
    thread_id: i64,
    up_to: ReadUpTo,
) -> Result<Vec<MarkedMessageInfo>> {
    let date_sent = schema.date_sent;
    let (bound, args): (String, Vec<i64>) = match up_to {
        ReadUpTo::Time(t) => (format!(" AND {date_sent} <= ?2"), vec![thread_id, t]),
        ReadUpTo::All => (String::new(), vec![thread_id]),
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT _id, address, {date_sent}, expires_in, expire_started FROM {}
         WHERE thread_id = ?1 AND read = 0 AND is_deleted = 0{bound}
         ORDER BY {date_sent} ASC, _id ASC",
        schema.table
    ))?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        let address: String = row.get(1)?;
        Ok(MarkedMessageInfo {
            message: MessageId::new(row.get(0)?, schema.transport),
            thread_id,
            author: Address::from_serialized(&address),
            date_sent: row.get(2)?,
            expires_in: row.get(3)?,
            expire_started: row.get(4)?,
        })
    })?;

    let mut marked = Vec::new();
    for row in rows {
        marked.push(row?);
    }

    conn.execute(
        &format!(
            "UPDATE {} SET read = 1, reactions_unread = 0
             WHERE thread_id = ?1 AND (read = 0 OR reactions_unread = 1){bound}",
            schema.table
        ),
        params_from_iter(args.iter()),
    )?;

    Ok(marked)
}

/// Returns `(message id, thread id)` of every row that was bumped.
pub(crate) fn increment_receipt_count(
    conn: &Connection,
    schema: &TableSchema,
    kind: ReceiptKind,
    date_sent: i64,
    author: &Address,
) -> Result<Vec<(i64, i64)>> {
    let outgoing = MessageType::outgoing_sql(schema.message_type);
    let mut stmt = conn.prepare(&format!(
        "SELECT _id, thread_id FROM {} WHERE {} = ?1 AND address = ?2 AND {outgoing}",
        schema.table, schema.date_sent
    ))?;
    let rows = stmt.query_map(params![date_sent, author.to_string()], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;

    let mut matched = Vec::new();
    for row in rows {
        matched.push(row?);
    }

    let column = kind.column();
    for (id, _) in &matched {
        conn.execute(
            &format!("UPDATE {} SET {column} = {column} + 1 WHERE _id = ?1", schema.table),
            params![id],
        )?;
    }
    Ok(matched)
}

pub(crate) fn expired_message_ids(conn: &Connection, schema: &TableSchema, now: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT _id FROM {} WHERE expires_in > 0 AND expire_started > 0
             AND expire_started + expires_in <= ?1
         ORDER BY _id",
        schema.table
    ))?;
    let rows = stmt.query_map(params![now], |row| row.get(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub(crate) fn next_expiring_timestamp(conn: &Connection, schema: &TableSchema) -> Result<Option<i64>> {
    let next = conn.query_row(
        &format!(
            "SELECT MIN(expire_started + expires_in) FROM {}
             WHERE expires_in > 0 AND expire_started > 0",
            schema.table
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(next)
}

pub(crate) fn migrate_thread_id(
    conn: &Connection,
    schema: &TableSchema,
    old_thread_id: i64,
    new_thread_id: i64,
) -> Result<usize> {
    let moved = conn.execute(
        &format!("UPDATE {} SET thread_id = ?2 WHERE thread_id = ?1", schema.table),
        params![old_thread_id, new_thread_id],
    )?;
    Ok(moved)
}
