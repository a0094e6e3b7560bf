//! In-memory recipient resolution.
//!
//! [`RecipientCache`] hands out shared [`Recipient`] instances keyed by
//! address.  Settings are fetched off the caller's thread and copied into
//! the cached instance, so everything holding it sees the update.

mod cache;
mod recipient;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cache::{FetchedRecipient, RecipientCache, RecipientFetcher};
pub use recipient::{ListenerHandle, Recipient, RecipientListener};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
