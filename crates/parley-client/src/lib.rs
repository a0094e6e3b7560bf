//! # parley-client
//!
//! Composition root of the Parley messenger core: configuration, logging,
//! the recipient cache and the [`Messenger`] facade over `parley-store`.

pub mod config;
pub mod error;
pub mod logging;
pub mod messenger;
pub mod recipients;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use logging::init_logging;
pub use messenger::{Messenger, ReadReceiptSink};
pub use recipients::{
    FetchedRecipient, ListenerHandle, Recipient, RecipientCache, RecipientFetcher, RecipientListener,
};
