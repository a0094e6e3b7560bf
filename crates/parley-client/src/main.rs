//! # parley
//!
//! Inspection tool for a local Parley store: opens the database configured
//! through the environment and prints the conversation list with unread
//! badges.

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::info;

use parley_client::{init_logging, ClientConfig, Messenger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Logging and configuration
    // -----------------------------------------------------------------------
    init_logging();
    info!("Starting parley v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(
        data_dir = ?config.data_dir,
        change_buffer = config.change_buffer,
        resolve_timeout_ms = config.resolve_timeout.as_millis() as u64,
        read_receipts = config.read_receipts,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 2. Open the store
    // -----------------------------------------------------------------------
    let messenger = Arc::new(
        Messenger::open(config, Handle::current()).context("failed to open the message store")?,
    );
    let watcher = messenger.watch_recipients();

    // -----------------------------------------------------------------------
    // 3. Print the conversation list (store calls block, keep them off the
    //    async workers)
    // -----------------------------------------------------------------------
    let lines = {
        let messenger = messenger.clone();
        tokio::task::spawn_blocking(move || conversation_lines(&messenger)).await??
    };
    for line in lines {
        println!("{line}");
    }

    watcher.abort();
    Ok(())
}

fn conversation_lines(messenger: &Messenger) -> anyhow::Result<Vec<String>> {
    let db = messenger.database();
    let threads = db.conversation_list().context("failed to list conversations")?;

    let mut lines = Vec::with_capacity(threads.len() + 1);
    for thread in &threads {
        let recipient = messenger.resolved_recipient(&thread.address);
        let badge = match (thread.unread_count, thread.unread_mention_count) {
            (0, _) => String::new(),
            (n, 0) => format!("[{n}]"),
            (n, m) => format!("[{n} @{m}]"),
        };
        let pin = if thread.pinned { "*" } else { " " };
        lines.push(format!(
            "{pin}{:>5}  {:<28} {:>9}  {}",
            thread.id,
            recipient.display_name(),
            badge,
            thread.snippet
        ));
    }
    lines.push(format!(
        "{} conversations, {} unread",
        threads.len(),
        db.total_unread_count()?
    ));
    Ok(lines)
}
