//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration
//! for local development.

use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{DEFAULT_CHANGE_BUFFER, DEFAULT_RESOLVE_TIMEOUT_MS};
use parley_shared::Address;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory holding `parley.db`.
    /// Env: `PARLEY_DATA_DIR`
    /// Default: the platform data directory (`None` here).
    pub data_dir: Option<PathBuf>,

    /// Capacity of the thread / recipient change channels.
    /// Env: `PARLEY_CHANGE_BUFFER`
    /// Default: `256`
    pub change_buffer: usize,

    /// Upper bound on a blocking recipient resolve.
    /// Env: `PARLEY_RESOLVE_TIMEOUT_MS`
    /// Default: `5000`
    pub resolve_timeout: Duration,

    /// Whether read receipts are handed to the receipt sink.
    /// Env: `PARLEY_READ_RECEIPTS` (true/false)
    /// Default: `true`
    pub read_receipts: bool,

    /// Our own account id, used for mention detection.
    /// Env: `PARLEY_LOCAL_ADDRESS`
    /// Default: unset.
    pub local_address: Option<Address>,

    /// Database key (hex-encoded, 64 chars).  Only used with SQLCipher.
    /// Env: `PARLEY_DB_KEY`
    /// Default: all-zeros (development only).
    pub db_key: [u8; 32],
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            change_buffer: DEFAULT_CHANGE_BUFFER,
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            read_receipts: true,
            local_address: None,
            db_key: [0u8; 32],
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("PARLEY_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = lookup("PARLEY_CHANGE_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.change_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_CHANGE_BUFFER, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_RESOLVE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.resolve_timeout = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PARLEY_RESOLVE_TIMEOUT_MS, using default")
                }
            }
        }

        if let Some(val) = lookup("PARLEY_READ_RECEIPTS") {
            config.read_receipts = val != "false" && val != "0";
        }

        if let Some(val) = lookup("PARLEY_LOCAL_ADDRESS") {
            match Address::try_parse(&val) {
                Ok(address) => config.local_address = Some(address),
                Err(e) => tracing::warn!(error = %e, "Invalid PARLEY_LOCAL_ADDRESS, ignoring"),
            }
        }

        if let Some(val) = lookup("PARLEY_DB_KEY") {
            match parse_db_key(&val) {
                Ok(key) => config.db_key = key,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid PARLEY_DB_KEY, using default (dev-only)")
                }
            }
        }

        config
    }
}

/// Parse a 64-character hex string into a 32-byte key.
fn parse_db_key(raw: &str) -> Result<[u8; 32], String> {
    let raw = raw.trim();
    if raw.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", raw.len()));
    }

    let mut key = [0u8; 32];
    hex::decode_to_slice(raw, &mut key).map_err(|e| e.to_string())?;
    Ok(key)
}
