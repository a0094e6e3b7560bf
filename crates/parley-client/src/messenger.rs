//! Composition of the store and the recipient cache.
//!
//! [`Messenger`] is what the rest of the client talks to.  Each operation
//! sequences the store primitives in the required order: message write,
//! then thread update, then unread recompute.

use std::collections::BTreeMap;
use std::sync::Arc;

use directories::ProjectDirs;
use parley_shared::Address;
use parley_store::{
    Database, DeletedMessage, MarkedMessageInfo, MessageId, MessageTable, NewMessage, NewReaction,
    ReadUpTo, StoreOptions, Transport,
};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::recipients::{Recipient, RecipientCache};

/// Receives the read-receipt dispatch list after messages were marked read.
pub trait ReadReceiptSink: Send + Sync {
    /// `timestamps` are the sent times of `author`'s messages that were just
    /// read, in ascending order.
    fn send_read_receipts(&self, author: &Address, timestamps: &[i64]);
}

pub struct Messenger {
    db: Arc<Database>,
    recipients: RecipientCache,
    config: ClientConfig,
    runtime: Handle,
    receipts: Option<Arc<dyn ReadReceiptSink>>,
}

impl Messenger {
    /// Open the database described by `config` and build the client on it.
    pub fn open(config: ClientConfig, runtime: Handle) -> Result<Self> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("org", "parley", "parley")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| ClientError::Config("no platform data directory".into()))?,
        };

        let options = StoreOptions::default().with_change_buffer(config.change_buffer);
        let db = Database::open_in_dir(&data_dir, &config.db_key, options)?;
        Ok(Self::new(Arc::new(db), config, runtime))
    }

    pub fn new(db: Arc<Database>, config: ClientConfig, runtime: Handle) -> Self {
        let recipients = RecipientCache::new(db.clone(), runtime.clone(), config.resolve_timeout);
        Self {
            db,
            recipients,
            config,
            runtime,
            receipts: None,
        }
    }

    pub fn with_receipt_sink(mut self, sink: Arc<dyn ReadReceiptSink>) -> Self {
        self.receipts = Some(sink);
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn recipients(&self) -> &RecipientCache {
        &self.recipients
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Store an incoming message in `conversation`.  Messages from blocked
    /// senders are dropped and yield `None`.
    pub fn receive(
        &self,
        conversation: &Address,
        transport: Transport,
        mut message: NewMessage,
    ) -> Result<Option<MessageId>> {
        let blocked = self
            .db
            .recipient_settings(&message.author)?
            .is_some_and(|s| s.blocked);
        if blocked {
            tracing::debug!(author = %message.author.debug_string(), "dropping message from blocked sender");
            return Ok(None);
        }

        if !message.has_mention && self.mentions_me(message.body.as_deref()) {
            message.has_mention = true;
        }

        let thread_id = self.db.get_or_create_thread_id(conversation)?;
        let id = self.db.message_table(transport).insert(thread_id, &message)?;
        self.db.update_thread(thread_id, true)?;
        self.db.refresh_unread_counts(thread_id)?;

        tracing::info!(thread_id, message_id = id, %transport, "message received");
        Ok(Some(MessageId::new(id, transport)))
    }

    /// Store an outgoing message.  Writing to a contact approves them.
    pub fn send(&self, conversation: &Address, transport: Transport, message: NewMessage) -> Result<MessageId> {
        let thread_id = self.db.get_or_create_thread_id(conversation)?;
        let id = self.db.message_table(transport).insert(thread_id, &message)?;

        self.db.set_has_sent(thread_id, true)?;
        if conversation.is_standard() {
            self.db.set_approved(conversation, true)?;
        }
        self.db.update_thread(thread_id, true)?;
        self.db.refresh_unread_counts(thread_id)?;

        tracing::info!(thread_id, message_id = id, %transport, "message stored for sending");
        Ok(MessageId::new(id, transport))
    }

    /// Mark the thread read up to `up_to` and hand the newly read messages
    /// to the receipt sink.
    pub fn mark_read(&self, thread_id: i64, up_to: ReadUpTo) -> Result<Vec<MarkedMessageInfo>> {
        let marked = self.db.set_read(thread_id, up_to, true)?;
        if !marked.is_empty() {
            self.db.update_thread(thread_id, false)?;
            self.dispatch_read_receipts(thread_id, &marked)?;
        }
        Ok(marked)
    }

    /// Hard delete.  The returned attachment URI, if any, is the caller's to
    /// clean up.
    pub fn delete_message(&self, message: MessageId) -> Result<DeletedMessage> {
        let deleted = self.db.message_table(message.transport).delete_message(message.id)?;
        self.db.update_thread(deleted.thread_id, false)?;
        self.db.refresh_unread_counts(deleted.thread_id)?;
        Ok(deleted)
    }

    /// Soft delete: the row stays in the timeline showing `displayed_text`.
    pub fn mark_message_deleted(&self, message: MessageId, displayed_text: &str) -> Result<DeletedMessage> {
        let deleted = self
            .db
            .message_table(message.transport)
            .mark_as_deleted(message.id, displayed_text)?;
        self.db.update_thread(deleted.thread_id, false)?;
        self.db.refresh_unread_counts(deleted.thread_id)?;
        Ok(deleted)
    }

    /// Delete every message of the thread, then the thread itself.
    pub fn delete_conversation(&self, thread_id: i64) -> Result<usize> {
        let mut deleted = 0;
        for transport in Transport::ALL {
            deleted += self.db.message_table(transport).delete_thread_messages(thread_id)?;
        }
        self.db.delete_thread(thread_id)?;

        tracing::info!(thread_id, deleted, "conversation deleted");
        Ok(deleted)
    }

    pub fn react(&self, message: MessageId, reaction: &NewReaction) -> Result<()> {
        let thread_id = self.db.add_reaction(message, reaction)?;
        self.db.refresh_unread_counts(thread_id)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recipients
    // -----------------------------------------------------------------------

    /// Cached recipient, possibly still resolving.
    pub fn recipient(&self, address: &Address) -> Arc<Recipient> {
        self.recipients.get(address, true)
    }

    /// Cached recipient, waiting (bounded) for its fetch to finish.
    pub fn resolved_recipient(&self, address: &Address) -> Arc<Recipient> {
        self.recipients.get(address, false)
    }

    /// Keep cached recipients in step with the store.  The task runs until
    /// the returned handle is aborted.
    pub fn watch_recipients(&self) -> JoinHandle<()> {
        let mut changes = self.db.subscribe_recipient_changes();
        let cache = self.recipients.clone();

        self.runtime.spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(address) => {
                        cache.refresh(&address);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "recipient watcher lagged, refreshing all");
                        cache.refresh_all();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("recipient watcher stopped");
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn mentions_me(&self, body: Option<&str>) -> bool {
        match (&self.config.local_address, body) {
            (Some(me), Some(body)) => body.contains(&format!("@{me}")),
            _ => false,
        }
    }

    fn dispatch_read_receipts(&self, thread_id: i64, marked: &[MarkedMessageInfo]) -> Result<()> {
        let Some(sink) = &self.receipts else {
            return Ok(());
        };
        if !self.config.read_receipts {
            return Ok(());
        }
        // Receipts are only sent in one-to-one conversations.
        match self.db.address_for_thread(thread_id)? {
            Some(address) if !address.is_group_or_community() => {}
            _ => return Ok(()),
        }

        let mut by_author: BTreeMap<&Address, Vec<i64>> = BTreeMap::new();
        for info in marked {
            by_author.entry(&info.author).or_default().push(info.date_sent);
        }
        for (author, mut timestamps) in by_author {
            timestamps.sort_unstable();
            sink.send_read_receipts(author, &timestamps);
        }
        Ok(())
    }
}
