use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::messages::{MessageTable, NewMessage, TableSchema, SMS_SCHEMA};

/// Transport A: text-only messages.
#[derive(Clone, Copy)]
pub struct SmsTable<'a> {
    db: &'a Database,
}

impl<'a> SmsTable<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl MessageTable for SmsTable<'_> {
    fn schema(&self) -> &'static TableSchema {
        &SMS_SCHEMA
    }

    fn database(&self) -> &Database {
        self.db
    }

    fn insert(&self, thread_id: i64, message: &NewMessage) -> Result<i64> {
        if message.attachment.is_some() || message.quote.is_some() {
            tracing::warn!(thread_id, "sms rows cannot carry attachments or quotes, dropping them");
        }
        let content = message
            .content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let id = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO sms (thread_id, address, date_sent, date_received, type, body,
                                  read, has_mention, expires_in, expire_started, message_content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    thread_id,
                    message.author.to_string(),
                    message.date_sent,
                    message.date_received,
                    i64::from(message.message_type),
                    message.body,
                    message.read,
                    message.has_mention,
                    message.expires_in,
                    message.expire_started,
                    content,
                ],
            )?;
            conn.last_insert_rowid()
        };

        tracing::debug!(thread_id, message_id = id, "inserted sms message");
        self.db.notify_thread(thread_id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use parley_shared::Address;

    use super::*;
    use crate::message_type::MessageType;
    use crate::messages::{MessageView, ReceiptKind};
    use crate::models::{ExpiryMode, MessageContent, ReadUpTo};

    fn alice() -> Address {
        Address::from_serialized(&format!("05{}", "a1".repeat(32)))
    }

    fn me() -> Address {
        Address::from_serialized(&format!("05{}", "ee".repeat(32)))
    }

    #[test]
    fn insert_and_get() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();

        let content = MessageContent::DisappearingMessageUpdate {
            expiry: ExpiryMode::AfterRead(60),
        };
        let id = db
            .sms()
            .insert(
                thread,
                &NewMessage::incoming(alice(), 1_000, "hello").with_content(content.clone()),
            )
            .unwrap();

        let record = db.sms().get(id).unwrap().expect("row exists");
        assert_eq!(record.body(), "hello");
        assert_eq!(record.thread_id(), thread);
        assert_eq!(record.author(), &alice());
        assert_eq!(record.common().conversation, Some(alice()));
        assert_eq!(record.common().content, Some(content));
        assert!(!record.is_outgoing());
        assert!(db.sms().get(id + 1).unwrap().is_none());
    }

    #[test]
    fn corrupt_content_reads_as_absent() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::incoming(alice(), 1_000, "hi"))
            .unwrap();

        db.conn()
            .execute(
                "UPDATE sms SET message_content = '{not json' WHERE _id = ?1",
                [id],
            )
            .unwrap();

        let record = db.sms().get(id).unwrap().expect("row still readable");
        assert_eq!(record.common().content, None);
        assert_eq!(record.body(), "hi");
    }

    #[test]
    fn status_transitions_keep_flags() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::outgoing(me(), 1_000, "out"))
            .unwrap();

        db.sms().mark_as_sent(id).unwrap();
        let ty = db.sms().get(id).unwrap().unwrap().common().message_type;
        assert!(ty.is_sent());
        assert!(ty.has_flag(MessageType::SECURE_MESSAGE_BIT));

        db.sms().mark_as_sent_failed(id).unwrap();
        assert!(db.sms().get(id).unwrap().unwrap().common().message_type.is_failed());
        assert!(db.sms().is_outgoing(id).unwrap());
        assert!(db.sms().mark_as_sent(9_999).is_err());
    }

    #[test]
    fn set_messages_read_reports_each_row_once() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        for ts in [100, 200, 300] {
            db.sms()
                .insert(thread, &NewMessage::incoming(alice(), ts, "m"))
                .unwrap();
        }

        let first = db.sms().set_messages_read(thread, ReadUpTo::Time(200)).unwrap();
        assert_eq!(
            first.iter().map(|m| m.date_sent).collect::<Vec<_>>(),
            vec![100, 200]
        );
        assert!(db
            .sms()
            .set_messages_read(thread, ReadUpTo::Time(200))
            .unwrap()
            .is_empty());

        let rest = db.sms().set_messages_read(thread, ReadUpTo::All).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].date_sent, 300);
    }

    #[test]
    fn receipts_match_outgoing_by_timestamp_and_author() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        let out = db
            .sms()
            .insert(thread, &NewMessage::outgoing(me(), 500, "out"))
            .unwrap();
        db.sms()
            .insert(thread, &NewMessage::incoming(alice(), 500, "in"))
            .unwrap();

        let bumped = db
            .sms()
            .increment_receipt_count(ReceiptKind::Read, 500, &me())
            .unwrap();
        assert_eq!(bumped.len(), 1);
        assert_eq!(bumped[0].id, out);

        let record = db.sms().get(out).unwrap().unwrap();
        assert_eq!(record.common().read_receipt_count, 1);
        assert_eq!(record.common().delivery_receipt_count, 0);
    }

    #[test]
    fn expiry_bookkeeping() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        let short = db
            .sms()
            .insert(thread, &NewMessage::incoming(alice(), 1, "a").with_expiry(1_000))
            .unwrap();
        let long = db
            .sms()
            .insert(thread, &NewMessage::incoming(alice(), 2, "b").with_expiry(60_000))
            .unwrap();

        assert_eq!(db.sms().next_expiring_timestamp().unwrap(), None);

        db.sms().mark_expire_started(short, 10_000).unwrap();
        db.sms().mark_expire_started(long, 10_000).unwrap();

        assert_eq!(db.sms().next_expiring_timestamp().unwrap(), Some(11_000));
        assert_eq!(db.sms().expired_message_ids(10_999).unwrap(), Vec::<i64>::new());
        assert_eq!(db.sms().expired_message_ids(11_000).unwrap(), vec![short]);
    }

    #[test]
    fn soft_delete_keeps_row() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&alice()).unwrap();
        let id = db
            .sms()
            .insert(thread, &NewMessage::incoming(alice(), 1, "secret").with_mention())
            .unwrap();

        let deleted = db.sms().mark_as_deleted(id, "This message has been deleted").unwrap();
        assert_eq!(deleted.thread_id, thread);

        let record = db.sms().get(id).unwrap().unwrap();
        assert!(record.is_deleted());
        assert!(record.is_read());
        assert!(!record.has_mention());
        assert_eq!(record.body(), "This message has been deleted");
        assert_eq!(db.sms().message_count_for_thread(thread).unwrap(), 1);
    }

    #[test]
    fn migrate_thread_moves_rows() {
        let db = Database::in_memory().unwrap();
        let old = db.get_or_create_thread_id(&alice()).unwrap();
        let new = db.get_or_create_thread_id(&me()).unwrap();
        db.sms()
            .insert(old, &NewMessage::incoming(alice(), 1, "x"))
            .unwrap();

        assert_eq!(db.sms().migrate_thread_id(old, new).unwrap(), 1);
        assert_eq!(db.sms().message_count_for_thread(old).unwrap(), 0);
        assert_eq!(db.sms().message_count_for_thread(new).unwrap(), 1);
    }
}
