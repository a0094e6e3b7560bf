use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_shared::Address;
use parley_store::{Database, RecipientSettings};
use tokio::runtime::Handle;

use super::lock;
use super::recipient::Recipient;
use crate::error::Result;

/// How many recent senders stand in for a community's member list.
const COMMUNITY_PARTICIPANT_LIMIT: i64 = 32;

/// Everything a fetch produces for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedRecipient {
    pub settings: RecipientSettings,
    pub participants: Vec<Address>,
}

/// Source of recipient data.  Called on a blocking worker thread.
pub trait RecipientFetcher: Send + Sync {
    fn fetch(&self, address: &Address) -> Result<FetchedRecipient>;
}

impl RecipientFetcher for Database {
    fn fetch(&self, address: &Address) -> Result<FetchedRecipient> {
        let settings = self.recipient_settings(address)?.unwrap_or_default();

        let participants = if address.is_group() {
            self.group_members(address)?
                .into_iter()
                .map(|m| m.address)
                .collect()
        } else if address.is_community() {
            match self.thread_id_if_exists(address)? {
                Some(thread_id) => self.recent_member_addresses(thread_id, COMMUNITY_PARTICIPANT_LIMIT)?,
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        Ok(FetchedRecipient {
            settings,
            participants,
        })
    }
}

struct CacheInner {
    entries: Mutex<HashMap<Address, Arc<Recipient>>>,
    fetcher: Arc<dyn RecipientFetcher>,
    runtime: Handle,
    resolve_timeout: Duration,
}

/// Shared recipient cache.  Cheap to clone.
#[derive(Clone)]
pub struct RecipientCache {
    inner: Arc<CacheInner>,
}

impl RecipientCache {
    /// Fetches run on `runtime`'s blocking pool.  Blocking lookups wait at
    /// most `resolve_timeout`.
    pub fn new(fetcher: Arc<dyn RecipientFetcher>, runtime: Handle, resolve_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                fetcher,
                runtime,
                resolve_timeout,
            }),
        }
    }

    /// The cached recipient for `address`, created and scheduled for a fetch
    /// if absent.  With `asynchronous == false` this blocks until the fetch
    /// finishes, bounded by the resolve timeout.
    pub fn get(&self, address: &Address, asynchronous: bool) -> Arc<Recipient> {
        let (recipient, created) = {
            let mut entries = lock(&self.inner.entries);
            match entries.get(address) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let recipient = Arc::new(Recipient::resolving(address.clone()));
                    entries.insert(address.clone(), recipient.clone());
                    (recipient, true)
                }
            }
        };

        if created {
            tracing::debug!(address = %address.debug_string(), "recipient cache miss");
            self.spawn_fetch(recipient.clone());
        }
        if !asynchronous {
            recipient.wait_resolved(self.inner.resolve_timeout);
        }
        recipient
    }

    pub fn cached_or_none(&self, address: &Address) -> Option<Arc<Recipient>> {
        lock(&self.inner.entries).get(address).cloned()
    }

    /// Drop the entry.  Holders keep their instance; the next `get` builds a
    /// fresh one.
    pub fn invalidate(&self, address: &Address) -> bool {
        lock(&self.inner.entries).remove(address).is_some()
    }

    /// Re-fetch into the cached instance, if there is one.
    pub fn refresh(&self, address: &Address) -> bool {
        let Some(recipient) = self.cached_or_none(address) else {
            return false;
        };
        recipient.begin_fetch();
        self.spawn_fetch(recipient);
        true
    }

    pub fn refresh_all(&self) {
        let cached: Vec<Arc<Recipient>> = lock(&self.inner.entries).values().cloned().collect();
        tracing::debug!(count = cached.len(), "refreshing every cached recipient");
        for recipient in cached {
            recipient.begin_fetch();
            self.spawn_fetch(recipient);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_fetch(&self, recipient: Arc<Recipient>) {
        let cache = self.clone();
        self.inner
            .runtime
            .spawn_blocking(move || cache.run_fetch(&recipient));
    }

    fn run_fetch(&self, recipient: &Arc<Recipient>) {
        match self.inner.fetcher.fetch(recipient.address()) {
            Ok(fetched) => {
                let participants = fetched
                    .participants
                    .iter()
                    .filter(|p| *p != recipient.address())
                    .map(|p| self.get(p, true))
                    .collect();
                recipient.apply(fetched.settings, participants);
            }
            Err(e) => recipient.fail(&e),
        }
    }
}
