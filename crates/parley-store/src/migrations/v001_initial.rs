use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Conversations
CREATE TABLE IF NOT EXISTS thread (
    _id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    address                TEXT NOT NULL,              -- canonical Address string
    creation_date          INTEGER NOT NULL DEFAULT 0, -- epoch millis
    date                   INTEGER NOT NULL DEFAULT 0, -- last activity, whole seconds in millis
    message_count          INTEGER NOT NULL DEFAULT 0,
    snippet                TEXT NOT NULL DEFAULT '',
    snippet_type           INTEGER NOT NULL DEFAULT 0,
    snippet_uri            TEXT,
    snippet_content        TEXT,                       -- JSON MessageContent
    read                   INTEGER NOT NULL DEFAULT 1,
    unread_count           INTEGER NOT NULL DEFAULT 0,
    unread_mention_count   INTEGER NOT NULL DEFAULT 0,
    type                   INTEGER NOT NULL DEFAULT 2, -- distribution type
    archived               INTEGER NOT NULL DEFAULT 0,
    is_pinned              INTEGER NOT NULL DEFAULT 0,
    last_seen              INTEGER NOT NULL DEFAULT 0,
    has_sent               INTEGER NOT NULL DEFAULT 0,
    delivery_receipt_count INTEGER NOT NULL DEFAULT 0,
    read_receipt_count     INTEGER NOT NULL DEFAULT 0,
    expires_in             INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_thread_address ON thread(address);
CREATE INDEX IF NOT EXISTS idx_thread_date ON thread(date);
CREATE INDEX IF NOT EXISTS idx_thread_archived ON thread(archived);

-- Transport A: plain text messages
CREATE TABLE IF NOT EXISTS sms (
    _id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id              INTEGER NOT NULL,
    address                TEXT NOT NULL,              -- individual sender
    date_sent              INTEGER NOT NULL,
    date_received          INTEGER NOT NULL,
    type                   INTEGER NOT NULL,           -- MessageType bitmask
    body                   TEXT,
    read                   INTEGER NOT NULL DEFAULT 0,
    has_mention            INTEGER NOT NULL DEFAULT 0,
    notified               INTEGER NOT NULL DEFAULT 0,
    reactions_unread       INTEGER NOT NULL DEFAULT 0,
    delivery_receipt_count INTEGER NOT NULL DEFAULT 0,
    read_receipt_count     INTEGER NOT NULL DEFAULT 0,
    expires_in             INTEGER NOT NULL DEFAULT 0, -- millis
    expire_started         INTEGER NOT NULL DEFAULT 0, -- epoch millis, 0 = not started
    is_deleted             INTEGER NOT NULL DEFAULT 0,
    message_content        TEXT,                       -- JSON MessageContent
    status                 INTEGER NOT NULL DEFAULT -1
);

CREATE INDEX IF NOT EXISTS idx_sms_thread ON sms(thread_id);
CREATE INDEX IF NOT EXISTS idx_sms_date_sent ON sms(date_sent);
CREATE INDEX IF NOT EXISTS idx_sms_read ON sms(thread_id, read);

-- Transport B: messages with attachments / quotes
CREATE TABLE IF NOT EXISTS mms (
    _id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id              INTEGER NOT NULL,
    address                TEXT NOT NULL,
    date                   INTEGER NOT NULL,           -- sent time
    date_received          INTEGER NOT NULL,
    msg_box                INTEGER NOT NULL,           -- MessageType bitmask
    body                   TEXT,
    read                   INTEGER NOT NULL DEFAULT 0,
    has_mention            INTEGER NOT NULL DEFAULT 0,
    notified               INTEGER NOT NULL DEFAULT 0,
    reactions_unread       INTEGER NOT NULL DEFAULT 0,
    delivery_receipt_count INTEGER NOT NULL DEFAULT 0,
    read_receipt_count     INTEGER NOT NULL DEFAULT 0,
    expires_in             INTEGER NOT NULL DEFAULT 0,
    expire_started         INTEGER NOT NULL DEFAULT 0,
    is_deleted             INTEGER NOT NULL DEFAULT 0,
    message_content        TEXT,
    attachment_uri         TEXT,
    attachment_kind        TEXT,
    quote_id               INTEGER,                    -- sent time of the quoted message
    quote_author           TEXT
);

CREATE INDEX IF NOT EXISTS idx_mms_thread ON mms(thread_id);
CREATE INDEX IF NOT EXISTS idx_mms_date ON mms(date);
CREATE INDEX IF NOT EXISTS idx_mms_read ON mms(thread_id, read);

-- Emoji reactions, for rows of either message table
CREATE TABLE IF NOT EXISTS reaction (
    _id           INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id    INTEGER NOT NULL,
    is_mms        INTEGER NOT NULL,
    author_id     TEXT NOT NULL,
    emoji         TEXT NOT NULL,
    server_id     TEXT,
    count         INTEGER NOT NULL DEFAULT 1,
    sort_id       INTEGER NOT NULL DEFAULT 0,
    date_sent     INTEGER NOT NULL,
    date_received INTEGER NOT NULL,

    UNIQUE (message_id, is_mms, emoji, author_id)
);

CREATE INDEX IF NOT EXISTS idx_reaction_message ON reaction(message_id, is_mms);

-- Legacy per-address preferences, superseded by recipient_settings
CREATE TABLE IF NOT EXISTS recipient_preferences (
    _id                               INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_ids                     TEXT UNIQUE,
    block                             INTEGER DEFAULT 0,
    approved                          INTEGER DEFAULT 0,
    approved_me                       INTEGER DEFAULT 0,
    mute_until                        INTEGER DEFAULT 0,
    notify_type                       INTEGER DEFAULT 0,
    auto_download                     INTEGER DEFAULT -1,
    expire_messages                   INTEGER DEFAULT 0,
    profile_key                       TEXT,
    system_display_name               TEXT,
    signal_profile_name               TEXT,
    signal_profile_avatar             TEXT,
    notification_channel              TEXT,
    blocks_community_message_requests INTEGER DEFAULT 0
);

-- Closed group membership
CREATE TABLE IF NOT EXISTS group_members (
    group_address  TEXT NOT NULL,
    member_address TEXT NOT NULL,
    is_admin       INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (group_address, member_address)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
