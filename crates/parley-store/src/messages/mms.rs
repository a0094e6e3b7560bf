use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::messages::{MessageTable, NewMessage, TableSchema, MMS_SCHEMA};

/// Transport B: messages that may carry an attachment and a quote.
#[derive(Clone, Copy)]
pub struct MmsTable<'a> {
    db: &'a Database,
}

impl<'a> MmsTable<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl MessageTable for MmsTable<'_> {
    fn schema(&self) -> &'static TableSchema {
        &MMS_SCHEMA
    }

    fn database(&self) -> &Database {
        self.db
    }

    fn insert(&self, thread_id: i64, message: &NewMessage) -> Result<i64> {
        let content = message
            .content
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let attachment = message.attachment.as_ref();
        let quote = message.quote.as_ref();

        let id = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO mms (thread_id, address, date, date_received, msg_box, body,
                                  read, has_mention, expires_in, expire_started, message_content,
                                  attachment_uri, attachment_kind, quote_id, quote_author)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
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
                    attachment.map(|a| a.uri.as_str()),
                    attachment.map(|a| a.kind.as_str()),
                    quote.map(|q| q.timestamp),
                    quote.map(|q| q.author.to_string()),
                ],
            )?;
            conn.last_insert_rowid()
        };

        tracing::debug!(thread_id, message_id = id, "inserted mms message");
        self.db.notify_thread(thread_id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use parley_shared::Address;

    use super::*;
    use crate::messages::{MessageRecord, MessageView};
    use crate::models::{AttachmentKind, AttachmentRef, QuoteRef};

    fn bob() -> Address {
        Address::from_serialized(&format!("05{}", "b0".repeat(32)))
    }

    fn photo() -> AttachmentRef {
        AttachmentRef {
            uri: "blob://photos/1".into(),
            kind: AttachmentKind::Image,
        }
    }

    #[test]
    fn attachment_and_quote_round_trip() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&bob()).unwrap();

        let mut message = NewMessage::incoming(bob(), 2_000, "").with_attachment(photo());
        message.quote = Some(QuoteRef {
            timestamp: 1_000,
            author: bob(),
        });
        let id = db.mms().insert(thread, &message).unwrap();

        let record = db.mms().get(id).unwrap().expect("row exists");
        assert_eq!(record.date_sent(), 2_000);
        match record {
            MessageRecord::Mms(mms) => {
                assert_eq!(mms.attachment, Some(photo()));
                assert_eq!(mms.quote.map(|q| q.timestamp), Some(1_000));
            }
            MessageRecord::Sms(_) => panic!("decoded through the wrong transport"),
        }
    }

    #[test]
    fn hard_delete_returns_attachment_for_cleanup() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&bob()).unwrap();
        let id = db
            .mms()
            .insert(thread, &NewMessage::incoming(bob(), 1, "pic").with_attachment(photo()))
            .unwrap();

        let deleted = db.mms().delete_message(id).unwrap();
        assert_eq!(deleted.thread_id, thread);
        assert_eq!(deleted.attachment_uri.as_deref(), Some("blob://photos/1"));
        assert!(db.mms().get(id).unwrap().is_none());
        assert!(db.mms().delete_message(id).is_err());
    }

    #[test]
    fn delete_before_only_touches_older_rows() {
        let db = Database::in_memory().unwrap();
        let thread = db.get_or_create_thread_id(&bob()).unwrap();
        for ts in [10, 20, 30] {
            db.mms()
                .insert(thread, &NewMessage::incoming(bob(), ts, "m"))
                .unwrap();
        }

        assert_eq!(db.mms().delete_messages_in_thread_before(thread, 30).unwrap(), 2);
        assert_eq!(db.mms().message_count_for_thread(thread).unwrap(), 1);
        assert_eq!(db.mms().delete_thread_messages(thread).unwrap(), 1);
    }
}
