//! # parley-store
//!
//! Local message store for the Parley messenger, backed by SQLite (or
//! SQLCipher with the `sqlcipher` feature).
//!
//! Messages live in two physical tables, one per transport, that are read
//! back as a single timeline.  Threads aggregate each conversation and keep
//! derived state (snippet, counts, unread badges) that is always recomputed
//! from the message tables.  Per-recipient preferences live alongside.
//!
//! The crate exposes a synchronous [`Database`] handle.  Every mutation
//! publishes a change event that async consumers can subscribe to.

pub mod clock;
pub mod database;
pub mod groups;
pub mod message_type;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notify;
pub mod reactions;
pub mod recipients;
pub mod threads;
pub mod unread;

mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use database::{Database, StoreOptions, ThreadCreatedHook};
pub use error::{Result, StoreError};
pub use message_type::MessageType;
pub use messages::{
    DeletedMessage, MarkedMessageInfo, MessageCommon, MessageId, MessageReader, MessageRecord,
    MessageTable, MessageView, MmsMessageRecord, NewMessage, PageBound, ReactionRecord,
    ReceiptKind, SmsMessageRecord, Snippet, SortOrder, Transport,
};
pub use models::*;
pub use notify::{Notifier, ThreadChange};
pub use reactions::NewReaction;
pub use unread::UnreadCounts;
