//! The two message tables.
//!
//! Transport A (`sms`) and transport B (`mms`) evolved separately: column
//! names differ (`date_sent`/`type` vs `date`/`msg_box`) and B carries
//! attachment and quote columns A lacks.  [`TableSchema`] names the columns
//! that differ, and [`MessageTable`] implements the shared bookkeeping once
//! on top of it.  Only `insert` is table specific.
//!
//! The primitives here never touch the thread row.  Callers sequence
//! `insert` → [`Database::update_thread`] → unread recompute themselves.

mod bookkeeping;
pub mod conversation;
mod mms;
pub mod record;
mod sms;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::message_type::MessageType;
use crate::models::ReadUpTo;

pub(crate) use bookkeeping::*;
pub use conversation::{MessageReader, PageBound, SortOrder};
pub use mms::MmsTable;
pub use record::*;
pub use sms::SmsTable;

/// Which physical table a message lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Sms,
    Mms,
}

impl Transport {
    pub const ALL: [Transport; 2] = [Transport::Sms, Transport::Mms];

    /// Value of the `transport` discriminator column in merged queries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Mms => "mms",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sms" => Some(Self::Sms),
            "mms" => Some(Self::Mms),
            _ => None,
        }
    }

    pub fn schema(self) -> &'static TableSchema {
        match self {
            Self::Sms => &SMS_SCHEMA,
            Self::Mms => &MMS_SCHEMA,
        }
    }

    /// Value of `reaction.is_mms`.
    pub(crate) fn is_mms_flag(self) -> i64 {
        match self {
            Self::Sms => 0,
            Self::Mms => 1,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names that differ between the two tables.
#[derive(Debug)]
pub struct TableSchema {
    pub transport: Transport,
    pub table: &'static str,
    pub date_sent: &'static str,
    pub date_received: &'static str,
    pub message_type: &'static str,
    pub has_attachments: bool,
}

pub static SMS_SCHEMA: TableSchema = TableSchema {
    transport: Transport::Sms,
    table: "sms",
    date_sent: "date_sent",
    date_received: "date_received",
    message_type: "type",
    has_attachments: false,
};

pub static MMS_SCHEMA: TableSchema = TableSchema {
    transport: Transport::Mms,
    table: "mms",
    date_sent: "date",
    date_received: "date_received",
    message_type: "msg_box",
    has_attachments: true,
};

/// Which receipt counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivery,
    Read,
}

impl ReceiptKind {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Delivery => "delivery_receipt_count",
            Self::Read => "read_receipt_count",
        }
    }
}

/// Per-table message operations.
///
/// Every method locks the connection for the duration of one statement (or
/// one transaction) and emits a thread change afterwards.
pub trait MessageTable {
    fn schema(&self) -> &'static TableSchema;

    fn database(&self) -> &Database;

    /// Append a row and return its id (unique within this table only).
    fn insert(&self, thread_id: i64, message: &NewMessage) -> Result<i64>;

    fn transport(&self) -> Transport {
        self.schema().transport
    }

    fn get(&self, id: i64) -> Result<Option<MessageRecord>> {
        let conn = self.database().conn();
        conversation::select_one(&conn, self.schema(), id)
    }

    fn thread_id_for(&self, id: i64) -> Result<Option<i64>> {
        let conn = self.database().conn();
        thread_id_of(&conn, self.schema(), id)
    }

    /// `false` for absent rows.
    fn is_outgoing(&self, id: i64) -> Result<bool> {
        let conn = self.database().conn();
        Ok(message_type_of(&conn, self.schema(), id)?.is_some_and(MessageType::is_outgoing))
    }

    fn message_count_for_thread(&self, thread_id: i64) -> Result<i64> {
        let conn = self.database().conn();
        count_for_thread(&conn, self.schema(), thread_id)
    }

    fn mark_expire_started(&self, id: i64, started_at: i64) -> Result<()> {
        let thread_id = {
            let conn = self.database().conn();
            set_expire_started(&conn, self.schema(), id, started_at)?
        };
        notify_found(self.database(), thread_id)
    }

    fn mark_as_sending(&self, id: i64) -> Result<()> {
        self.set_base_type(id, MessageType::BASE_SENDING)
    }

    fn mark_as_sent(&self, id: i64) -> Result<()> {
        self.set_base_type(id, MessageType::BASE_SENT)
    }

    fn mark_as_sent_failed(&self, id: i64) -> Result<()> {
        self.set_base_type(id, MessageType::BASE_SENT_FAILED)
    }

    fn set_base_type(&self, id: i64, base: u64) -> Result<()> {
        let thread_id = {
            let conn = self.database().conn();
            set_base_type(&conn, self.schema(), id, base)?
        };
        notify_found(self.database(), thread_id)
    }

    /// Soft delete: the row stays for ordering and counts, its body becomes
    /// `displayed_text` and its payload, mention and reactions are dropped.
    fn mark_as_deleted(&self, id: i64, displayed_text: &str) -> Result<DeletedMessage> {
        let deleted = {
            let mut conn = self.database().conn();
            let tx = conn.transaction()?;
            let deleted = soft_delete(&tx, self.schema(), id, displayed_text)?;
            tx.commit()?;
            deleted
        };
        let deleted = deleted.ok_or(StoreError::NotFound)?;
        self.database().notify_thread(deleted.thread_id);
        Ok(deleted)
    }

    /// Hard delete of one row and its reactions.
    fn delete_message(&self, id: i64) -> Result<DeletedMessage> {
        let deleted = {
            let mut conn = self.database().conn();
            let tx = conn.transaction()?;
            let deleted = hard_delete(&tx, self.schema(), id)?;
            tx.commit()?;
            deleted
        };
        let deleted = deleted.ok_or(StoreError::NotFound)?;
        tracing::debug!(
            transport = %self.transport(),
            message_id = id,
            thread_id = deleted.thread_id,
            "deleted message"
        );
        self.database().notify_thread(deleted.thread_id);
        Ok(deleted)
    }

    /// Hard delete every row of the thread sent strictly before `before`.
    fn delete_messages_in_thread_before(&self, thread_id: i64, before: i64) -> Result<usize> {
        let date_sent = self.schema().date_sent;
        let deleted = {
            let mut conn = self.database().conn();
            let tx = conn.transaction()?;
            let deleted = delete_where(
                &tx,
                self.schema(),
                &format!("thread_id = ?1 AND {date_sent} < ?2"),
                &[thread_id, before],
            )?;
            tx.commit()?;
            deleted
        };
        if deleted > 0 {
            self.database().notify_thread(thread_id);
        }
        Ok(deleted)
    }

    fn delete_thread_messages(&self, thread_id: i64) -> Result<usize> {
        let deleted = {
            let mut conn = self.database().conn();
            let tx = conn.transaction()?;
            let deleted = delete_where(&tx, self.schema(), "thread_id = ?1", &[thread_id])?;
            tx.commit()?;
            deleted
        };
        if deleted > 0 {
            self.database().notify_thread(thread_id);
        }
        Ok(deleted)
    }

    /// Mark this table's rows of the thread read.  Returns only the rows
    /// whose read flag went from false to true in this call.
    fn set_messages_read(&self, thread_id: i64, up_to: ReadUpTo) -> Result<Vec<MarkedMessageInfo>> {
        let marked = {
            let mut conn = self.database().conn();
            let tx = conn.transaction()?;
            let marked = set_messages_read(&tx, self.schema(), thread_id, up_to)?;
            tx.commit()?;
            marked
        };
        if !marked.is_empty() {
            self.database().notify_thread(thread_id);
        }
        Ok(marked)
    }

    fn mark_notified(&self, id: i64, notified: bool) -> Result<()> {
        let conn = self.database().conn();
        let affected = set_notified(&conn, self.schema(), id, notified)?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Bump a receipt counter on our outgoing message(s) sent at `date_sent`
    /// by `author`.  Returns the ids that matched.
    fn increment_receipt_count(
        &self,
        kind: ReceiptKind,
        date_sent: i64,
        author: &parley_shared::Address,
    ) -> Result<Vec<MessageId>> {
        let bumped = {
            let conn = self.database().conn();
            increment_receipt_count(&conn, self.schema(), kind, date_sent, author)?
        };
        for (_, thread_id) in &bumped {
            self.database().notify_thread(*thread_id);
        }
        Ok(bumped
            .into_iter()
            .map(|(id, _)| MessageId::new(id, self.transport()))
            .collect())
    }

    /// Rows whose disappearing timer ran out at or before `now`.
    fn expired_message_ids(&self, now: i64) -> Result<Vec<i64>> {
        let conn = self.database().conn();
        expired_message_ids(&conn, self.schema(), now)
    }

    fn next_expiring_timestamp(&self) -> Result<Option<i64>> {
        let conn = self.database().conn();
        next_expiring_timestamp(&conn, self.schema())
    }

    /// Move every row of `old_thread_id` to `new_thread_id`.
    fn migrate_thread_id(&self, old_thread_id: i64, new_thread_id: i64) -> Result<usize> {
        let moved = {
            let conn = self.database().conn();
            migrate_thread_id(&conn, self.schema(), old_thread_id, new_thread_id)?
        };
        if moved > 0 {
            self.database().notify_thread(old_thread_id);
            self.database().notify_thread(new_thread_id);
        }
        Ok(moved)
    }
}

fn notify_found(db: &Database, thread_id: Option<i64>) -> Result<()> {
    let thread_id = thread_id.ok_or(StoreError::NotFound)?;
    db.notify_thread(thread_id);
    Ok(())
}

impl Database {
    /// Transport A.
    pub fn sms(&self) -> SmsTable<'_> {
        SmsTable::new(self)
    }

    /// Transport B.
    pub fn mms(&self) -> MmsTable<'_> {
        MmsTable::new(self)
    }

    pub fn message_table(&self, transport: Transport) -> Box<dyn MessageTable + '_> {
        match transport {
            Transport::Sms => Box::new(self.sms()),
            Transport::Mms => Box::new(self.mms()),
        }
    }

    pub fn get_message(&self, message: MessageId) -> Result<Option<MessageRecord>> {
        self.message_table(message.transport).get(message.id)
    }
}
