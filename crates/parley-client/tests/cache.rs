use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use parley_client::{ClientError, FetchedRecipient, RecipientCache, RecipientFetcher, Result};
use parley_shared::Address;
use parley_store::RecipientSettings;

fn addr(byte: &str) -> Address {
    Address::from_serialized(&format!("05{}", byte.repeat(32)))
}

/// Each fetch waits for one message on the gate.
struct GatedFetcher {
    gate: Mutex<Receiver<Result<FetchedRecipient>>>,
}

impl GatedFetcher {
    fn new() -> (Arc<Self>, Sender<Result<FetchedRecipient>>) {
        let (tx, rx) = channel();
        (Arc::new(Self { gate: Mutex::new(rx) }), tx)
    }
}

impl RecipientFetcher for GatedFetcher {
    fn fetch(&self, _: &Address) -> Result<FetchedRecipient> {
        self.gate
            .lock()
            .unwrap()
            .recv()
            .unwrap_or_else(|_| Err(ClientError::Unavailable("gate closed".into())))
    }
}

fn named(name: &str) -> Result<FetchedRecipient> {
    Ok(FetchedRecipient {
        settings: RecipientSettings {
            profile_name: Some(name.into()),
            ..Default::default()
        },
        participants: Vec::new(),
    })
}

#[test]
fn same_instance_while_resolving() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (fetcher, gate) = GatedFetcher::new();
    let cache = RecipientCache::new(fetcher, runtime.handle().clone(), Duration::from_secs(5));

    let first = cache.get(&addr("01"), true);
    let second = cache.get(&addr("01"), true);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(first.is_resolving());

    gate.send(named("Ines")).unwrap();
    assert!(first.wait_resolved(Duration::from_secs(5)));
    assert!(second.is_resolved());
    assert_eq!(second.display_name(), "Ines");
}

#[test]
fn blocking_get_is_bounded_by_the_timeout() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (fetcher, gate) = GatedFetcher::new();
    let cache = RecipientCache::new(fetcher, runtime.handle().clone(), Duration::from_millis(50));

    let recipient = cache.get(&addr("02"), false);
    assert!(recipient.is_resolving());

    gate.send(named("late")).unwrap();
    assert!(recipient.wait_resolved(Duration::from_secs(5)));
}

#[test]
fn refresh_updates_in_place_and_notifies_once() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (fetcher, gate) = GatedFetcher::new();
    let cache = RecipientCache::new(fetcher, runtime.handle().clone(), Duration::from_secs(5));

    gate.send(named("before")).unwrap();
    let recipient = cache.get(&addr("03"), false);
    assert_eq!(recipient.display_name(), "before");

    let (tx, rx) = channel();
    let _handle = recipient.add_listener(Arc::new(move |r: &parley_client::Recipient| {
        let _ = tx.send(r.display_name());
    }));

    assert!(cache.refresh(&addr("03")));
    gate.send(named("after")).unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "after");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(Arc::ptr_eq(&recipient, &cache.cached_or_none(&addr("03")).unwrap()));
    assert_eq!(recipient.fetches_completed(), 2);
}

#[test]
fn failed_refresh_keeps_the_snapshot() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (fetcher, gate) = GatedFetcher::new();
    let cache = RecipientCache::new(fetcher, runtime.handle().clone(), Duration::from_secs(5));

    gate.send(named("kept")).unwrap();
    let recipient = cache.get(&addr("04"), false);

    cache.refresh(&addr("04"));
    gate.send(Err(ClientError::Unavailable("offline".into()))).unwrap();

    assert!(recipient.wait_resolved(Duration::from_secs(5)));
    assert_eq!(recipient.display_name(), "kept");
    assert!(!cache.refresh(&addr("05")));
}
