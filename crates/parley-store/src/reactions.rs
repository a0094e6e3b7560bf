use parley_shared::Address;
use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::messages::{message_type_of, thread_id_of, MessageId, ReactionRecord};

/// A reaction to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReaction {
    pub author: Address,
    pub emoji: String,
    pub server_id: Option<String>,
    pub count: i64,
    pub sort_id: i64,
    pub date_sent: i64,
    pub date_received: i64,
}

impl NewReaction {
    pub fn new(author: Address, emoji: impl Into<String>, date_sent: i64) -> Self {
        Self {
            author,
            emoji: emoji.into(),
            server_id: None,
            count: 1,
            sort_id: 0,
            date_sent,
            date_received: date_sent,
        }
    }
}

impl Database {
    /// Add (or refresh) a reaction.  A reaction by someone else on one of our
    /// own messages flags that message as having unseen reactions.
    ///
    /// Returns the thread the message belongs to.
    pub fn add_reaction(&self, message: MessageId, reaction: &NewReaction) -> Result<i64> {
        let schema = message.transport.schema();
        let thread_id = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            let thread_id = thread_id_of(&tx, schema, message.id)?.ok_or(StoreError::NotFound)?;

            tx.execute(
                "INSERT INTO reaction (message_id, is_mms, author_id, emoji, server_id, count,
                                       sort_id, date_sent, date_received)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (message_id, is_mms, emoji, author_id) DO UPDATE SET
                     server_id = excluded.server_id,
                     count = excluded.count,
                     sort_id = excluded.sort_id,
                     date_sent = excluded.date_sent,
                     date_received = excluded.date_received",
                params![
                    message.id,
                    message.transport.is_mms_flag(),
                    reaction.author.to_string(),
                    reaction.emoji,
                    reaction.server_id,
                    reaction.count,
                    reaction.sort_id,
                    reaction.date_sent,
                    reaction.date_received,
                ],
            )?;

            if reacted_by_other_on_outgoing(&tx, message, &reaction.author)? {
                tx.execute(
                    &format!("UPDATE {} SET reactions_unread = 1 WHERE _id = ?1", schema.table),
                    params![message.id],
                )?;
            }

            tx.commit()?;
            thread_id
        };

        tracing::debug!(
            message_id = message.id,
            transport = %message.transport,
            thread_id,
            "reaction added"
        );
        self.notify_thread(thread_id);
        Ok(thread_id)
    }

    pub fn remove_reaction(&self, message: MessageId, author: &Address, emoji: &str) -> Result<bool> {
        let (affected, thread_id) = {
            let conn = self.conn();
            let affected = conn.execute(
                "DELETE FROM reaction
                 WHERE message_id = ?1 AND is_mms = ?2 AND author_id = ?3 AND emoji = ?4",
                params![message.id, message.transport.is_mms_flag(), author.to_string(), emoji],
            )?;
            (affected, thread_id_of(&conn, message.transport.schema(), message.id)?)
        };

        if affected > 0 {
            if let Some(thread_id) = thread_id {
                self.notify_thread(thread_id);
            }
        }
        Ok(affected > 0)
    }

    pub fn reactions_for_message(&self, message: MessageId) -> Result<Vec<ReactionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT _id, author_id, emoji, server_id, count, sort_id, date_sent, date_received
             FROM reaction WHERE message_id = ?1 AND is_mms = ?2
             ORDER BY sort_id ASC, _id ASC",
        )?;

        let rows = stmt.query_map(
            params![message.id, message.transport.is_mms_flag()],
            |row| {
                let author: String = row.get(1)?;
                Ok(ReactionRecord {
                    id: row.get(0)?,
                    message,
                    author: Address::from_serialized(&author),
                    emoji: row.get(2)?,
                    server_id: row.get(3)?,
                    count: row.get(4)?,
                    sort_id: row.get(5)?,
                    date_sent: row.get(6)?,
                    date_received: row.get(7)?,
                })
            },
        )?;

        let mut reactions = Vec::new();
        for row in rows {
            reactions.push(row?);
        }
        Ok(reactions)
    }
}

fn reacted_by_other_on_outgoing(conn: &Connection, message: MessageId, author: &Address) -> Result<bool> {
    let schema = message.transport.schema();
    let is_outgoing = message_type_of(conn, schema, message.id)?.is_some_and(|ty| ty.is_outgoing());
    if !is_outgoing {
        return Ok(false);
    }

    let message_author: String = conn.query_row(
        &format!("SELECT address FROM {} WHERE _id = ?1", schema.table),
        params![message.id],
        |row| row.get(0),
    )?;
    Ok(message_author != author.to_string())
}
