/// Application name
pub const APP_NAME: &str = "Parley";

/// Length of a hex-encoded account id, including the one byte prefix
pub const ACCOUNT_ID_HEX_LEN: usize = 66;

/// Serialized prefix of a legacy (pre-v2) closed group address
pub const LEGACY_GROUP_PREFIX: &str = "__textsecure_group__!";

/// URI scheme of a blinded id scoped to a community server
pub const COMMUNITY_BLINDED_SCHEME: &str = "community-blinded://";

/// Query parameter carrying the community server in a blinded address
pub const COMMUNITY_BLINDED_SERVER_PARAM: &str = "server";

/// Placeholder shown when a recipient has no usable name
pub const UNKNOWN_RECIPIENT_NAME: &str = "Unknown";

/// Capacity of the thread / recipient change broadcast channels
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

/// Upper bound on a blocking recipient resolve, in milliseconds
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 5_000;

/// Sentinel accepted by `set_last_seen` meaning "use the current time"
pub const LAST_SEEN_NOW: i64 = -1;
