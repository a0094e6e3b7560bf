use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::Duration;

use parley_shared::constants::UNKNOWN_RECIPIENT_NAME;
use parley_shared::Address;
use parley_store::{ExpiryMode, NotifyType, RecipientSettings};

use super::lock;

/// Callback fired after a recipient (or one of its participants) finished a
/// fetch.  Receives the recipient the listener was registered on.
pub type RecipientListener = Arc<dyn Fn(&Recipient) + Send + Sync>;

struct RecipientState {
    settings: RecipientSettings,
    participants: Vec<Arc<Recipient>>,
    resolving: bool,
    fetch_in_flight: bool,
    has_snapshot: bool,
    fetches_completed: u64,
}

struct ListenerEntry {
    id: u64,
    callback: RecipientListener,
    /// Registrations made on participants on behalf of this listener.
    fanned_out: Vec<(Weak<Recipient>, u64)>,
}

/// A cached, possibly still resolving view of one address.
///
/// The instance is shared: every fetch writes into the same object, so
/// holders and listeners keep observing it across refreshes.
pub struct Recipient {
    address: Address,
    state: Mutex<RecipientState>,
    fetch_done: Condvar,
    listeners: Mutex<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
}

impl Recipient {
    /// A resolving recipient seeded with default settings, with its first
    /// fetch considered in flight.
    pub(crate) fn resolving(address: Address) -> Self {
        Self {
            address,
            state: Mutex::new(RecipientState {
                settings: RecipientSettings::default(),
                participants: Vec::new(),
                resolving: true,
                fetch_in_flight: true,
                has_snapshot: false,
                fetches_completed: 0,
            }),
            fetch_done: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn settings(&self) -> RecipientSettings {
        lock(&self.state).settings.clone()
    }

    pub fn participants(&self) -> Vec<Arc<Recipient>> {
        lock(&self.state).participants.clone()
    }

    pub fn is_resolving(&self) -> bool {
        lock(&self.state).resolving
    }

    pub fn is_resolved(&self) -> bool {
        !self.is_resolving()
    }

    /// Number of fetches that completed successfully.
    pub fn fetches_completed(&self) -> u64 {
        lock(&self.state).fetches_completed
    }

    /// Name to display, falling back to a shortened id or a placeholder.
    pub fn display_name(&self) -> String {
        if let Some(name) = lock(&self.state).settings.display_name() {
            return name.to_string();
        }
        match &self.address {
            Address::Community { room, .. } => room.clone(),
            other => other
                .account_id()
                .map(|id| format!("({}…)", id.short()))
                .unwrap_or_else(|| UNKNOWN_RECIPIENT_NAME.to_string()),
        }
    }

    pub fn is_blocked(&self) -> bool {
        lock(&self.state).settings.blocked
    }

    pub fn is_approved(&self) -> bool {
        lock(&self.state).settings.approved
    }

    pub fn is_approved_me(&self) -> bool {
        lock(&self.state).settings.approved_me
    }

    pub fn is_muted(&self, now_millis: i64) -> bool {
        lock(&self.state).settings.is_muted(now_millis)
    }

    pub fn notify_type(&self) -> NotifyType {
        lock(&self.state).settings.notify_type
    }

    pub fn expiry_mode(&self) -> ExpiryMode {
        lock(&self.state).settings.expiry_mode
    }

    pub fn profile_key(&self) -> Option<Vec<u8>> {
        lock(&self.state).settings.profile_key.clone()
    }

    pub fn profile_avatar(&self) -> Option<String> {
        lock(&self.state).settings.profile_avatar.clone()
    }

    /// Block until the in-flight fetch (if any) finishes or `timeout`
    /// elapses.  Returns whether the recipient is resolved afterwards.
    pub fn wait_resolved(&self, timeout: Duration) -> bool {
        let state = lock(&self.state);
        let (state, result) = self
            .fetch_done
            .wait_timeout_while(state, timeout, |s| s.fetch_in_flight)
            .unwrap_or_else(PoisonError::into_inner);

        if result.timed_out() {
            tracing::warn!(
                address = %self.address.debug_string(),
                timeout_ms = timeout.as_millis() as u64,
                "recipient resolve timed out"
            );
        }
        !state.resolving
    }

    // -----------------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------------

    /// Register `callback`.  For groups the registration is mirrored on every
    /// participant, so a participant's change also reaches this listener.
    /// Dropping the returned handle unregisters everywhere.
    pub fn add_listener(self: &Arc<Self>, callback: RecipientListener) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let fanned_out = self.fan_out(&callback, &self.participants());

        lock(&self.listeners).push(ListenerEntry {
            id,
            callback,
            fanned_out,
        });

        ListenerHandle {
            recipient: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Plain registration without fan-out.
    fn register(&self, callback: RecipientListener) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push(ListenerEntry {
            id,
            callback,
            fanned_out: Vec::new(),
        });
        id
    }

    fn remove_listener(&self, id: u64) {
        let entry = {
            let mut listeners = lock(&self.listeners);
            listeners
                .iter()
                .position(|e| e.id == id)
                .map(|i| listeners.remove(i))
        };
        if let Some(entry) = entry {
            unregister_all(entry.fanned_out);
        }
    }

    fn fan_out(
        self: &Arc<Self>,
        callback: &RecipientListener,
        participants: &[Arc<Recipient>],
    ) -> Vec<(Weak<Recipient>, u64)> {
        participants
            .iter()
            .filter(|p| !Arc::ptr_eq(p, self))
            .map(|participant| {
                let group = Arc::downgrade(self);
                let callback = callback.clone();
                let relay: RecipientListener = Arc::new(move |_: &Recipient| {
                    if let Some(group) = group.upgrade() {
                        callback(&group);
                    }
                });
                (Arc::downgrade(participant), participant.register(relay))
            })
            .collect()
    }

    /// Move every fanned-out registration onto the current participants.
    fn refan(self: &Arc<Self>, participants: &[Arc<Recipient>]) {
        let stale: Vec<(u64, RecipientListener, Vec<(Weak<Recipient>, u64)>)> = lock(&self.listeners)
            .iter_mut()
            .map(|e| (e.id, e.callback.clone(), mem::take(&mut e.fanned_out)))
            .collect();

        for (id, callback, old) in stale {
            unregister_all(old);
            let fresh = self.fan_out(&callback, participants);

            let orphaned = {
                let mut listeners = lock(&self.listeners);
                match listeners.iter_mut().find(|e| e.id == id) {
                    Some(entry) => {
                        entry.fanned_out = fresh;
                        None
                    }
                    // Removed while we were re-registering.
                    None => Some(fresh),
                }
            };
            if let Some(fresh) = orphaned {
                unregister_all(fresh);
            }
        }
    }

    /// Call every listener on a snapshot of the registry.  Listeners may
    /// add or remove registrations from inside the callback.
    pub fn notify_listeners(&self) {
        let callbacks: Vec<RecipientListener> = lock(&self.listeners)
            .iter()
            .map(|e| e.callback.clone())
            .collect();

        for callback in callbacks {
            callback(self);
        }
    }

    // -----------------------------------------------------------------------
    // Fetch lifecycle (driven by the cache)
    // -----------------------------------------------------------------------

    pub(crate) fn begin_fetch(&self) {
        let mut state = lock(&self.state);
        state.resolving = true;
        state.fetch_in_flight = true;
    }

    /// Copy a completed fetch into this instance, wake waiters and notify
    /// listeners once.
    pub(crate) fn apply(self: &Arc<Self>, settings: RecipientSettings, participants: Vec<Arc<Recipient>>) {
        {
            let mut state = lock(&self.state);
            state.settings = settings;
            state.participants = participants.clone();
            state.resolving = false;
            state.fetch_in_flight = false;
            state.has_snapshot = true;
            state.fetches_completed += 1;
        }
        self.fetch_done.notify_all();

        self.refan(&participants);
        tracing::trace!(address = %self.address.debug_string(), "recipient resolved");
        self.notify_listeners();
    }

    /// A failed fetch keeps the last good snapshot, if there is one.
    /// Without one the recipient stays resolving.  Waiters are released
    /// either way.
    pub(crate) fn fail(&self, error: &dyn fmt::Display) {
        {
            let mut state = lock(&self.state);
            state.fetch_in_flight = false;
            if state.has_snapshot {
                state.resolving = false;
                tracing::warn!(
                    address = %self.address.debug_string(),
                    error = %error,
                    "recipient fetch failed, keeping last snapshot"
                );
            } else {
                tracing::error!(
                    address = %self.address.debug_string(),
                    error = %error,
                    "recipient fetch failed"
                );
            }
        }
        self.fetch_done.notify_all();
    }
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipient")
            .field("address", &self.address.debug_string())
            .field("resolving", &self.is_resolving())
            .finish()
    }
}

fn unregister_all(registrations: Vec<(Weak<Recipient>, u64)>) {
    for (participant, id) in registrations {
        if let Some(participant) = participant.upgrade() {
            participant.remove_listener(id);
        }
    }
}

/// Keeps a listener registered.  Dropping it (or calling
/// [`ListenerHandle::remove`]) unregisters the listener and its fan-out.
#[must_use = "dropping the handle removes the listener"]
pub struct ListenerHandle {
    recipient: Weak<Recipient>,
    id: u64,
}

impl ListenerHandle {
    pub fn remove(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(recipient) = self.recipient.upgrade() {
            recipient.remove_listener(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn addr(byte: &str) -> Address {
        Address::from_serialized(&format!("05{}", byte.repeat(32)))
    }

    fn counter() -> (Arc<AtomicUsize>, RecipientListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        (count, Arc::new(move |_: &Recipient| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn apply_resolves_and_notifies_once() {
        let recipient = Arc::new(Recipient::resolving(addr("11")));
        let (count, listener) = counter();
        let _handle = recipient.add_listener(listener);

        let settings = RecipientSettings {
            profile_name: Some("Ana".into()),
            ..Default::default()
        };
        recipient.apply(settings, Vec::new());

        assert!(recipient.is_resolved());
        assert!(recipient.wait_resolved(Duration::from_millis(1)));
        assert_eq!(recipient.display_name(), "Ana");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_without_snapshot_stays_resolving() {
        let recipient = Recipient::resolving(addr("22"));
        recipient.fail(&"offline");

        assert!(recipient.is_resolving());
        assert!(!recipient.wait_resolved(Duration::from_secs(5)));
        assert_eq!(recipient.display_name(), format!("({}…)", &"22".repeat(32)[..8]));
    }

    #[test]
    fn failure_with_snapshot_keeps_it() {
        let recipient = Arc::new(Recipient::resolving(addr("33")));
        recipient.apply(
            RecipientSettings {
                blocked: true,
                ..Default::default()
            },
            Vec::new(),
        );

        recipient.begin_fetch();
        assert!(recipient.is_resolving());
        recipient.fail(&"offline");

        assert!(recipient.is_resolved());
        assert!(recipient.is_blocked());
    }

    #[test]
    fn group_listener_hears_participants() {
        let member = Arc::new(Recipient::resolving(addr("44")));
        let group = Arc::new(Recipient::resolving(Address::from_serialized(&format!(
            "03{}",
            "55".repeat(32)
        ))));
        group.apply(RecipientSettings::default(), vec![member.clone()]);

        let (count, listener) = counter();
        let handle = group.add_listener(listener);
        assert_eq!(member.listener_count(), 1);

        member.apply(RecipientSettings::default(), Vec::new());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.remove();
        assert_eq!(group.listener_count(), 0);
        assert_eq!(member.listener_count(), 0);
    }

    #[test]
    fn new_participants_inherit_group_listeners() {
        let old_member = Arc::new(Recipient::resolving(addr("66")));
        let new_member = Arc::new(Recipient::resolving(addr("77")));
        let group = Arc::new(Recipient::resolving(Address::from_serialized(&format!(
            "03{}",
            "88".repeat(32)
        ))));
        group.apply(RecipientSettings::default(), vec![old_member.clone()]);

        let (count, listener) = counter();
        let _handle = group.add_listener(listener);

        group.apply(RecipientSettings::default(), vec![new_member.clone()]);
        assert_eq!(old_member.listener_count(), 0);
        assert_eq!(new_member.listener_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        new_member.apply(RecipientSettings::default(), Vec::new());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_can_remove_itself_while_notified() {
        let recipient = Arc::new(Recipient::resolving(addr("99")));
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let (count, counting) = counter();

        let own = slot.clone();
        let handle = recipient.add_listener(Arc::new(move |_: &Recipient| {
            own.lock().unwrap().take();
        }));
        *slot.lock().unwrap() = Some(handle);
        let _other = recipient.add_listener(counting);

        recipient.notify_listeners();
        assert_eq!(recipient.listener_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
