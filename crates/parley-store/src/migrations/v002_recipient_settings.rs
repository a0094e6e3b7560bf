use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS recipient_settings (
    _id                               INTEGER PRIMARY KEY AUTOINCREMENT,
    address                           TEXT NOT NULL,
    blocked                           INTEGER NOT NULL DEFAULT 0,
    approved                          INTEGER NOT NULL DEFAULT 0,
    approved_me                       INTEGER NOT NULL DEFAULT 0,
    mute_until                        INTEGER NOT NULL DEFAULT 0,
    notify_type                       INTEGER NOT NULL DEFAULT 0, -- 0 all, 1 mentions, 2 none
    auto_download                     INTEGER NOT NULL DEFAULT -1, -- -1 unset, 0 never, 1 always
    expiry_type                       INTEGER NOT NULL DEFAULT 0, -- 0 off, 1 after read, 2 after send
    expiry_seconds                    INTEGER NOT NULL DEFAULT 0,
    profile_key                       TEXT,                       -- base64
    system_display_name               TEXT,
    profile_name                      TEXT,
    profile_avatar                    TEXT,
    notification_channel              TEXT,
    blocks_community_message_requests INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_recipient_settings_address ON recipient_settings(address);

-- Legacy disappearing timers only existed in the after-read flavour.
INSERT OR IGNORE INTO recipient_settings (
    address, blocked, approved, approved_me, mute_until, notify_type, auto_download,
    expiry_type, expiry_seconds, profile_key, system_display_name, profile_name,
    profile_avatar, notification_channel, blocks_community_message_requests
)
SELECT
    recipient_ids,
    COALESCE(block, 0),
    COALESCE(approved, 0),
    COALESCE(approved_me, 0),
    COALESCE(mute_until, 0),
    COALESCE(notify_type, 0),
    COALESCE(auto_download, -1),
    CASE WHEN COALESCE(expire_messages, 0) > 0 THEN 1 ELSE 0 END,
    COALESCE(expire_messages, 0),
    profile_key,
    system_display_name,
    signal_profile_name,
    signal_profile_avatar,
    notification_channel,
    COALESCE(blocks_community_message_requests, 0)
FROM recipient_preferences
WHERE recipient_ids IS NOT NULL;

DROP TABLE IF EXISTS recipient_preferences;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
