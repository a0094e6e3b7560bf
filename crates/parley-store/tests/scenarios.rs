use std::sync::Arc;
use std::thread;

use parley_shared::Address;
use parley_store::{
    Database, ExpiryMode, MessageId, MessageTable, MessageView, NewMessage, NewReaction,
    NotifyType, ReadUpTo, RecipientSettings, SortOrder, Transport,
};

fn alice() -> Address {
    Address::from_serialized(&format!("05{}", "a1".repeat(32)))
}

fn me() -> Address {
    Address::from_serialized(&format!("05{}", "ee".repeat(32)))
}

fn open_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("parley.db"), &[7u8; 32]).unwrap();
    (dir, db)
}

#[test]
fn concurrent_get_or_create_yields_one_thread() {
    let (_dir, db) = open_db();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            thread::spawn(move || db.get_or_create_thread_id(&alice()).unwrap())
        })
        .collect();
    let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(db.search_by_address_prefix(&alice().to_string()).unwrap().len(), 1);
}

#[test]
fn update_is_idempotent() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    db.sms()
        .insert(thread, &NewMessage::incoming(alice(), 1_500, "first"))
        .unwrap();
    db.mms()
        .insert(thread, &NewMessage::outgoing(me(), 2_500, "second"))
        .unwrap();

    db.update_thread(thread, false).unwrap();
    let once = db.get_thread(thread).unwrap().unwrap();
    db.update_thread(thread, false).unwrap();
    let twice = db.get_thread(thread).unwrap().unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.snippet, "second");
    assert_eq!(once.message_count, 2);
}

#[test]
fn unread_count_tracks_last_seen() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    for ts in [100, 200, 300] {
        db.sms()
            .insert(thread, &NewMessage::incoming(alice(), ts, "a"))
            .unwrap();
    }
    for ts in [150, 250] {
        db.mms()
            .insert(thread, &NewMessage::incoming(alice(), ts, "b"))
            .unwrap();
    }
    let deleted = db
        .sms()
        .insert(thread, &NewMessage::incoming(alice(), 400, "gone"))
        .unwrap();
    db.sms().mark_as_deleted(deleted, "").unwrap();

    for (seen, expected) in [(0, 5), (150, 3), (250, 1), (300, 0)] {
        assert!(db.set_last_seen(thread, seen).unwrap());
        assert_eq!(db.get_thread(thread).unwrap().unwrap().unread_count, expected, "last seen {seen}");
    }
}

#[test]
fn set_read_reports_each_transition_once() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    let a = db
        .sms()
        .insert(thread, &NewMessage::incoming(alice(), 100, "a"))
        .unwrap();
    let b = db
        .mms()
        .insert(thread, &NewMessage::incoming(alice(), 200, "b"))
        .unwrap();
    db.sms()
        .insert(thread, &NewMessage::incoming(alice(), 300, "later"))
        .unwrap();

    let marked = db.set_read(thread, ReadUpTo::Time(200), true).unwrap();
    let ids: Vec<MessageId> = marked.iter().map(|m| m.message).collect();
    assert_eq!(ids, vec![MessageId::sms(a), MessageId::mms(b)]);

    assert!(db.set_read(thread, ReadUpTo::Time(200), true).unwrap().is_empty());
}

#[test]
fn recipient_settings_round_trip() {
    let (_dir, db) = open_db();
    let settings = RecipientSettings {
        blocked: true,
        approved: true,
        mute_until: 9_999,
        notify_type: NotifyType::Mentions,
        expiry_mode: ExpiryMode::AfterSend(86_400),
        profile_key: None,
        profile_name: Some("Zoë 🌸".into()),
        ..Default::default()
    };

    db.upsert_recipient_settings(&alice(), &settings).unwrap();
    assert_eq!(db.recipient_settings(&alice()).unwrap(), Some(settings));
    assert_eq!(db.recipient_settings(&me()).unwrap(), None);
}

#[test]
fn empty_community_join_keeps_zero_unread() {
    let (_dir, db) = open_db();
    let community = Address::community("https://chat.example.net", "general");
    let thread = db.get_or_create_thread_id(&community).unwrap();

    assert!(!db.set_last_seen(thread, db.now_millis()).unwrap());
    assert_eq!(db.get_thread(thread).unwrap().unwrap().unread_count, 0);
}

#[test]
fn conversation_interleaves_both_tables() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    db.sms()
        .insert(thread, &NewMessage::incoming(alice(), 100, "from a"))
        .unwrap();
    db.mms()
        .insert(thread, &NewMessage::incoming(alice(), 200, "from b"))
        .unwrap();

    let order: Vec<(Transport, String)> = db
        .conversation(thread, SortOrder::Descending, 0, None)
        .unwrap()
        .map(|r| (r.transport(), r.body().to_string()))
        .collect();
    assert_eq!(
        order,
        vec![
            (Transport::Mms, "from b".to_string()),
            (Transport::Sms, "from a".to_string()),
        ]
    );
}

#[test]
fn mentions_are_a_subset_of_unread() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    db.sms()
        .insert(thread, &NewMessage::incoming(alice(), 100, "one"))
        .unwrap();
    db.mms()
        .insert(thread, &NewMessage::incoming(alice(), 110, "two @me").with_mention())
        .unwrap();
    db.sms()
        .insert(thread, &NewMessage::incoming(alice(), 120, "three"))
        .unwrap();

    assert!(db.set_last_seen(thread, 50).unwrap());
    let record = db.get_thread(thread).unwrap().unwrap();
    assert_eq!(record.unread_count, 3);
    assert_eq!(record.unread_mention_count, 1);
}

#[test]
fn reaction_on_read_message_counts_as_unread() {
    let (_dir, db) = open_db();
    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    let id = db
        .sms()
        .insert(thread, &NewMessage::outgoing(me(), 50, "old news"))
        .unwrap();

    assert!(db.set_last_seen(thread, 100).unwrap());
    assert_eq!(db.get_thread(thread).unwrap().unwrap().unread_count, 0);

    db.add_reaction(MessageId::sms(id), &NewReaction::new(alice(), "😮", 150))
        .unwrap();
    assert!(db.set_last_seen(thread, 100).unwrap());

    let record = db.get_thread(thread).unwrap().unwrap();
    assert_eq!(record.unread_count, 1);
    assert!(db.sms().get(id).unwrap().unwrap().is_read());
}

#[test]
fn thread_changes_reach_subscribers() {
    let (_dir, db) = open_db();
    let mut changes = db.subscribe_thread_changes();

    let thread = db.get_or_create_thread_id(&alice()).unwrap();
    db.set_pinned(thread, true).unwrap();

    assert_eq!(changes.try_recv().unwrap(), parley_store::ThreadChange::Thread(thread));
    assert_eq!(changes.try_recv().unwrap(), parley_store::ThreadChange::Thread(thread));
    assert!(changes.try_recv().is_err());
}
