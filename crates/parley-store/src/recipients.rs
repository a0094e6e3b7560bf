//! Durable per-address recipient settings.
//!
//! No caching happens at this layer; every read hits the table.  Single
//! field mutators are thin wrappers over [`Database::update_recipient_settings`],
//! which performs the read-modify-write inside one transaction.  Callers that
//! need several fields to change atomically pass one closure that sets all of
//! them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parley_shared::Address;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::Database;
use crate::error::Result;
use crate::models::{AutoDownload, ExpiryMode, NotifyType, RecipientSettings};

const SETTINGS_COLUMNS: &str = "blocked, approved, approved_me, mute_until, notify_type,
    auto_download, expiry_type, expiry_seconds, profile_key, system_display_name,
    profile_name, profile_avatar, notification_channel, blocks_community_message_requests";

impl Database {
    /// Single-row read.  `None` means we never stored anything for `address`.
    pub fn recipient_settings(&self, address: &Address) -> Result<Option<RecipientSettings>> {
        let conn = self.conn();
        read_settings(&conn, address)
    }

    /// Full replace-or-insert.
    pub fn upsert_recipient_settings(&self, address: &Address, settings: &RecipientSettings) -> Result<()> {
        {
            let conn = self.conn();
            write_settings(&conn, address, settings)?;
        }
        self.notify_recipient(address);
        Ok(())
    }

    /// Batched read-modify-write.  `update` receives the current settings
    /// (defaults if no row exists); nothing is written and no change is
    /// published when it leaves them unchanged.  Returns whether a write
    /// happened.
    pub fn update_recipient_settings<F>(&self, address: &Address, update: F) -> Result<bool>
    where
        F: FnOnce(&mut RecipientSettings),
    {
        let changed = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            let before = read_settings(&tx, address)?.unwrap_or_default();
            let mut after = before.clone();
            update(&mut after);

            let changed = after != before;
            if changed {
                write_settings(&tx, address, &after)?;
            }
            tx.commit()?;
            changed
        };

        if changed {
            tracing::debug!(address = %address.debug_string(), "recipient settings updated");
            self.notify_recipient(address);
        }
        Ok(changed)
    }

    pub fn set_blocked(&self, address: &Address, blocked: bool) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.blocked = blocked)
    }

    pub fn set_approved(&self, address: &Address, approved: bool) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.approved = approved)
    }

    pub fn set_approved_me(&self, address: &Address, approved_me: bool) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.approved_me = approved_me)
    }

    pub fn set_muted_until(&self, address: &Address, until: i64) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.mute_until = until)
    }

    pub fn set_notify_type(&self, address: &Address, notify_type: NotifyType) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.notify_type = notify_type)
    }

    pub fn set_auto_download(&self, address: &Address, auto_download: AutoDownload) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.auto_download = auto_download)
    }

    pub fn set_expiry_mode(&self, address: &Address, mode: ExpiryMode) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.expiry_mode = mode)
    }

    pub fn set_profile_key(&self, address: &Address, key: Option<Vec<u8>>) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.profile_key = key)
    }

    pub fn set_profile_name(&self, address: &Address, name: Option<String>) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.profile_name = name)
    }

    pub fn set_system_display_name(&self, address: &Address, name: Option<String>) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.system_display_name = name)
    }

    pub fn set_profile_avatar(&self, address: &Address, url: Option<String>) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.profile_avatar = url)
    }

    pub fn set_notification_channel(&self, address: &Address, channel: Option<String>) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.notification_channel = channel)
    }

    pub fn set_blocks_community_message_requests(&self, address: &Address, blocks: bool) -> Result<bool> {
        self.update_recipient_settings(address, |s| s.blocks_community_message_requests = blocks)
    }

    /// "Delete contact": the only path that physically removes settings.
    pub fn delete_recipient(&self, address: &Address) -> Result<bool> {
        let affected = {
            let conn = self.conn();
            conn.execute(
                "DELETE FROM recipient_settings WHERE address = ?1",
                params![address.to_string()],
            )?
        };
        if affected > 0 {
            tracing::info!(address = %address.debug_string(), "recipient deleted");
            self.notify_recipient(address);
        }
        Ok(affected > 0)
    }

    pub fn blocked_addresses(&self) -> Result<Vec<Address>> {
        self.addresses_where("blocked = 1", None)
    }

    /// Addresses that own a dedicated notification channel, with the channel id.
    pub fn addresses_with_notification_channel(&self) -> Result<Vec<(Address, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT address, notification_channel FROM recipient_settings
             WHERE notification_channel IS NOT NULL ORDER BY address",
        )?;
        let rows = stmt.query_map([], |row| {
            let address: String = row.get(0)?;
            Ok((Address::from_serialized(&address), row.get(1)?))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn find_by_profile_avatar(&self, url: &str) -> Result<Vec<Address>> {
        self.addresses_where("profile_avatar = ?1", Some(url))
    }

    fn addresses_where(&self, predicate: &str, arg: Option<&str>) -> Result<Vec<Address>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT address FROM recipient_settings WHERE {predicate} ORDER BY address"
        ))?;
        let mut rows = match arg {
            Some(arg) => stmt.query(params![arg])?,
            None => stmt.query([])?,
        };

        let mut addresses = Vec::new();
        while let Some(row) = rows.next()? {
            let address: String = row.get(0)?;
            addresses.push(Address::from_serialized(&address));
        }
        Ok(addresses)
    }
}

fn read_settings(conn: &Connection, address: &Address) -> Result<Option<RecipientSettings>> {
    let settings = conn
        .query_row(
            &format!("SELECT {SETTINGS_COLUMNS} FROM recipient_settings WHERE address = ?1"),
            params![address.to_string()],
            |row| row_to_settings(row, address),
        )
        .optional()?;
    Ok(settings)
}

fn write_settings(conn: &Connection, address: &Address, settings: &RecipientSettings) -> Result<()> {
    let (expiry_type, expiry_seconds) = settings.expiry_mode.to_columns();
    conn.execute(
        &format!(
            "INSERT INTO recipient_settings (address, {SETTINGS_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT (address) DO UPDATE SET
                 blocked = excluded.blocked,
                 approved = excluded.approved,
                 approved_me = excluded.approved_me,
                 mute_until = excluded.mute_until,
                 notify_type = excluded.notify_type,
                 auto_download = excluded.auto_download,
                 expiry_type = excluded.expiry_type,
                 expiry_seconds = excluded.expiry_seconds,
                 profile_key = excluded.profile_key,
                 system_display_name = excluded.system_display_name,
                 profile_name = excluded.profile_name,
                 profile_avatar = excluded.profile_avatar,
                 notification_channel = excluded.notification_channel,
                 blocks_community_message_requests = excluded.blocks_community_message_requests"
        ),
        params![
            address.to_string(),
            settings.blocked,
            settings.approved,
            settings.approved_me,
            settings.mute_until,
            settings.notify_type.as_i64(),
            settings.auto_download.as_i64(),
            expiry_type,
            expiry_seconds,
            settings.profile_key.as_ref().map(|key| BASE64.encode(key)),
            settings.system_display_name,
            settings.profile_name,
            settings.profile_avatar,
            settings.notification_channel,
            settings.blocks_community_message_requests,
        ],
    )?;
    Ok(())
}

fn row_to_settings(row: &Row<'_>, address: &Address) -> rusqlite::Result<RecipientSettings> {
    let notify_raw: i64 = row.get(4)?;
    let notify_type = NotifyType::from_i64(notify_raw).unwrap_or_else(|| {
        tracing::warn!(address = %address.debug_string(), notify_raw, "unknown notify type, using default");
        NotifyType::default()
    });

    let profile_key = row
        .get::<_, Option<String>>(8)?
        .and_then(|encoded| match BASE64.decode(encoded.as_bytes()) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(address = %address.debug_string(), error = %e, "undecodable profile key");
                None
            }
        });

    Ok(RecipientSettings {
        blocked: row.get(0)?,
        approved: row.get(1)?,
        approved_me: row.get(2)?,
        mute_until: row.get(3)?,
        notify_type,
        auto_download: AutoDownload::from_i64(row.get(5)?),
        expiry_mode: ExpiryMode::from_columns(row.get(6)?, row.get(7)?),
        profile_key,
        system_display_name: row.get(9)?,
        profile_name: row.get(10)?,
        profile_avatar: row.get(11)?,
        notification_channel: row.get(12)?,
        blocks_community_message_requests: row.get(13)?,
    })
}
