//! Decoded message rows.
//!
//! There is no global message id: a message is identified by its row id
//! *and* the table it lives in ([`MessageId`]).  Both tables decode into a
//! [`MessageRecord`], a tagged variant sharing one [`MessageCommon`] block,
//! and the [`MessageView`] trait exposes the common fields uniformly.

use parley_shared::Address;
use serde::{Deserialize, Serialize};

use crate::message_type::MessageType;
use crate::messages::Transport;
use crate::models::{AttachmentRef, MessageContent, QuoteRef};

/// Table-qualified message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId {
    pub id: i64,
    pub transport: Transport,
}

impl MessageId {
    pub fn new(id: i64, transport: Transport) -> Self {
        Self { id, transport }
    }

    pub fn sms(id: i64) -> Self {
        Self::new(id, Transport::Sms)
    }

    pub fn mms(id: i64) -> Self {
        Self::new(id, Transport::Mms)
    }
}

/// Input to [`MessageTable::insert`](crate::messages::MessageTable::insert).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Individual sender (our own address for outgoing messages).
    pub author: Address,
    pub date_sent: i64,
    pub date_received: i64,
    pub message_type: MessageType,
    pub body: Option<String>,
    pub read: bool,
    pub has_mention: bool,
    pub expires_in: i64,
    pub expire_started: i64,
    pub content: Option<MessageContent>,
    /// Only persisted by transport B.
    pub attachment: Option<AttachmentRef>,
    /// Only persisted by transport B.
    pub quote: Option<QuoteRef>,
}

impl NewMessage {
    /// An unread incoming text message.
    pub fn incoming(author: Address, date_sent: i64, body: impl Into<String>) -> Self {
        Self {
            author,
            date_sent,
            date_received: date_sent,
            message_type: MessageType::incoming(),
            body: Some(body.into()),
            read: false,
            has_mention: false,
            expires_in: 0,
            expire_started: 0,
            content: None,
            attachment: None,
            quote: None,
        }
    }

    /// An outgoing text message.  Our own messages are never unread.
    pub fn outgoing(author: Address, date_sent: i64, body: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::outgoing(),
            read: true,
            ..Self::incoming(author, date_sent, body)
        }
    }

    pub fn with_mention(mut self) -> Self {
        self.has_mention = true;
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_content(mut self, content: MessageContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_expiry(mut self, expires_in: i64) -> Self {
        self.expires_in = expires_in;
        self
    }
}

/// A reaction as aggregated into a merged message row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub id: i64,
    pub message: MessageId,
    pub author: Address,
    pub emoji: String,
    pub server_id: Option<String>,
    pub count: i64,
    pub sort_id: i64,
    pub date_sent: i64,
    pub date_received: i64,
}

/// Fields both tables carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCommon {
    pub id: i64,
    pub thread_id: i64,
    pub author: Address,
    /// Address of the conversation the message belongs to, when its thread
    /// row still exists.
    pub conversation: Option<Address>,
    pub date_sent: i64,
    pub date_received: i64,
    pub message_type: MessageType,
    pub body: String,
    pub read: bool,
    pub has_mention: bool,
    pub notified: bool,
    pub reactions_unread: bool,
    pub delivery_receipt_count: i64,
    pub read_receipt_count: i64,
    pub expires_in: i64,
    pub expire_started: i64,
    pub is_deleted: bool,
    /// `None` when absent *or* when the stored JSON failed to decode.
    pub content: Option<MessageContent>,
    pub reactions: Vec<ReactionRecord>,
}

/// Transport A row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessageRecord {
    pub common: MessageCommon,
    /// Delivery status code, -1 when none was reported.
    pub status: i64,
}

/// Transport B row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmsMessageRecord {
    pub common: MessageCommon,
    pub attachment: Option<AttachmentRef>,
    pub quote: Option<QuoteRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRecord {
    Sms(SmsMessageRecord),
    Mms(MmsMessageRecord),
}

impl MessageRecord {
    pub fn attachment(&self) -> Option<&AttachmentRef> {
        match self {
            Self::Sms(_) => None,
            Self::Mms(mms) => mms.attachment.as_ref(),
        }
    }
}

/// Read-only projection over the fields every message has.
pub trait MessageView {
    fn common(&self) -> &MessageCommon;

    fn transport(&self) -> Transport;

    fn message_id(&self) -> MessageId {
        MessageId::new(self.common().id, self.transport())
    }

    fn thread_id(&self) -> i64 {
        self.common().thread_id
    }

    fn author(&self) -> &Address {
        &self.common().author
    }

    fn date_sent(&self) -> i64 {
        self.common().date_sent
    }

    fn body(&self) -> &str {
        &self.common().body
    }

    fn is_outgoing(&self) -> bool {
        self.common().message_type.is_outgoing()
    }

    fn is_read(&self) -> bool {
        self.common().read
    }

    fn is_deleted(&self) -> bool {
        self.common().is_deleted
    }

    fn has_mention(&self) -> bool {
        self.common().has_mention
    }

    fn reactions(&self) -> &[ReactionRecord] {
        &self.common().reactions
    }
}

impl MessageView for SmsMessageRecord {
    fn common(&self) -> &MessageCommon {
        &self.common
    }

    fn transport(&self) -> Transport {
        Transport::Sms
    }
}

impl MessageView for MmsMessageRecord {
    fn common(&self) -> &MessageCommon {
        &self.common
    }

    fn transport(&self) -> Transport {
        Transport::Mms
    }
}

impl MessageView for MessageRecord {
    fn common(&self) -> &MessageCommon {
        match self {
            Self::Sms(sms) => &sms.common,
            Self::Mms(mms) => &mms.common,
        }
    }

    fn transport(&self) -> Transport {
        match self {
            Self::Sms(_) => Transport::Sms,
            Self::Mms(_) => Transport::Mms,
        }
    }
}

/// A message whose read flag flipped, handed to read-receipt dispatch and
/// disappearing-message timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedMessageInfo {
    pub message: MessageId,
    pub thread_id: i64,
    pub author: Address,
    pub date_sent: i64,
    pub expires_in: i64,
    pub expire_started: i64,
}

/// What a hard delete left behind for the caller to clean up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedMessage {
    pub thread_id: i64,
    pub attachment_uri: Option<String>,
}

/// Thread preview derived from a decoded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub body: String,
    pub content: Option<MessageContent>,
    pub uri: Option<String>,
    pub message_type: MessageType,
    pub date: i64,
    pub delivery_receipt_count: i64,
    pub read_receipt_count: i64,
    pub expires_in: i64,
}

impl Snippet {
    pub fn from_record(record: &MessageRecord) -> Self {
        let common = record.common();
        let attachment = record.attachment();

        let body = match attachment {
            Some(a) if common.body.is_empty() => a.kind.label().to_string(),
            _ => common.body.clone(),
        };

        Self {
            body,
            content: common.content.clone(),
            uri: attachment.map(|a| a.uri.clone()),
            message_type: common.message_type,
            // Thread dates are kept at whole-second precision.
            date: common.date_sent - common.date_sent.rem_euclid(1000),
            delivery_receipt_count: common.delivery_receipt_count,
            read_receipt_count: common.read_receipt_count,
            expires_in: common.expires_in,
        }
    }
}
