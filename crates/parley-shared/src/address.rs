//! Conversation participant addresses.
//!
//! An [`Address`] is the stable key for everything the store persists about a
//! contact, group or community.  Every variant has one canonical string form
//! (see [`Address::from_serialized`] and the `Display` impl); that string is
//! what ends up in the `address` columns of the database.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ACCOUNT_ID_HEX_LEN, COMMUNITY_BLINDED_SCHEME, COMMUNITY_BLINDED_SERVER_PARAM,
    LEGACY_GROUP_PREFIX,
};
use crate::error::AddressError;

// ---------------------------------------------------------------------------
// Account ids
// ---------------------------------------------------------------------------

/// The one-byte prefix that tags what kind of key an account id carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Standard,
    Group,
    Blinded,
    BlindedV2,
}

impl IdPrefix {
    pub fn as_hex(&self) -> &'static str {
        match self {
            Self::Standard => "05",
            Self::Group => "03",
            Self::Blinded => "15",
            Self::BlindedV2 => "25",
        }
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        match s {
            "05" => Some(Self::Standard),
            "03" => Some(Self::Group),
            "15" => Some(Self::Blinded),
            "25" => Some(Self::BlindedV2),
            _ => None,
        }
    }

    pub fn is_blinded(&self) -> bool {
        matches!(self, Self::Blinded | Self::BlindedV2)
    }
}

/// A validated, lower-cased, hex-encoded account id (prefix byte + 32 byte key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    prefix: IdPrefix,
    hex: String,
}

impl AccountId {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.len() != ACCOUNT_ID_HEX_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }
        hex::decode(s)?;

        let hex = s.to_ascii_lowercase();
        let prefix = IdPrefix::from_hex(&hex[..2])
            .ok_or_else(|| AddressError::UnknownPrefix(hex[..2].to_string()))?;

        Ok(Self { prefix, hex })
    }

    pub fn prefix(&self) -> IdPrefix {
        self.prefix
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// First eight hex chars after the prefix, safe to put in logs.
    pub fn short(&self) -> &str {
        &self.hex[2..10]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Stable identifier of a conversation participant, group or community.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Address {
    /// A regular 1:1 contact (`05…`).
    Standard(AccountId),
    /// A v2 closed group (`03…`).
    Group(AccountId),
    /// A blinded id seen outside of any community context (`15…` / `25…`).
    Blinded(AccountId),
    /// A legacy closed group, keyed by the group's public key hex.
    LegacyGroup(String),
    /// An open community room.
    Community { server_url: String, room: String },
    /// A blinded community member we can message through the server inbox.
    CommunityBlinded {
        server_url: String,
        blinded_id: AccountId,
    },
    /// Anything we failed to parse; kept verbatim so no data is lost.
    Unknown(String),
}

impl Address {
    /// Parse the canonical string form.  Never fails: unparseable input
    /// becomes [`Address::Unknown`].
    pub fn from_serialized(serialized: &str) -> Self {
        Self::try_parse(serialized).unwrap_or_else(|_| Self::Unknown(serialized.to_string()))
    }

    /// Strict variant of [`Address::from_serialized`].
    pub fn try_parse(s: &str) -> Result<Self, AddressError> {
        let lower = s.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return parse_community(s);
        }

        if let Some(rest) = s.strip_prefix(COMMUNITY_BLINDED_SCHEME) {
            return parse_community_blinded(rest);
        }

        if let Some(encoded) = s.strip_prefix(LEGACY_GROUP_PREFIX) {
            let bytes = hex::decode(encoded)?;
            let key = String::from_utf8(bytes)
                .map_err(|_| AddressError::Malformed(s.to_string()))?;
            return Ok(Self::LegacyGroup(key));
        }

        let account_id = AccountId::parse(s)?;
        Ok(match account_id.prefix() {
            IdPrefix::Standard => Self::Standard(account_id),
            IdPrefix::Group => Self::Group(account_id),
            IdPrefix::Blinded | IdPrefix::BlindedV2 => Self::Blinded(account_id),
        })
    }

    pub fn community(server_url: &str, room: &str) -> Self {
        Self::Community {
            server_url: server_url.trim_end_matches('/').to_string(),
            room: room.to_string(),
        }
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        match self {
            Self::Standard(id) | Self::Group(id) | Self::Blinded(id) => Some(id),
            Self::CommunityBlinded { blinded_id, .. } => Some(blinded_id),
            _ => None,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, Self::Standard(_))
    }

    pub fn is_group_v2(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn is_legacy_group(&self) -> bool {
        matches!(self, Self::LegacyGroup(_))
    }

    pub fn is_group(&self) -> bool {
        self.is_group_v2() || self.is_legacy_group()
    }

    pub fn is_community(&self) -> bool {
        matches!(self, Self::Community { .. })
    }

    pub fn is_community_inbox(&self) -> bool {
        matches!(self, Self::CommunityBlinded { .. })
    }

    pub fn is_group_or_community(&self) -> bool {
        self.is_group() || self.is_community()
    }

    pub fn is_blinded(&self) -> bool {
        matches!(self, Self::Blinded(_) | Self::CommunityBlinded { .. })
    }

    /// A representation that is safe to log: keys are shortened, community
    /// rooms are hidden.
    pub fn debug_string(&self) -> String {
        match self {
            Self::Standard(id) => format!("Standard({}…)", id.short()),
            Self::Group(id) => format!("Group({}…)", id.short()),
            Self::Blinded(id) => format!("Blinded({}…)", id.short()),
            Self::LegacyGroup(key) => {
                format!("LegacyGroup({}…)", key.get(..8).unwrap_or(key))
            }
            Self::Community { server_url, .. } => format!("Community({server_url}, room=xxxx)"),
            Self::CommunityBlinded {
                server_url,
                blinded_id,
            } => format!("CommunityBlinded({server_url}, {}…)", blinded_id.short()),
            Self::Unknown(raw) => format!("Unknown({raw})"),
        }
    }
}

fn parse_community(s: &str) -> Result<Address, AddressError> {
    let malformed = || AddressError::Malformed(s.to_string());

    let scheme_end = s.find("://").map(|i| i + 3).ok_or_else(malformed)?;
    let rest = s[scheme_end..].split(['?', '#']).next().unwrap_or_default();
    let trimmed = rest.trim_end_matches('/');

    let slash = trimmed.rfind('/').ok_or_else(malformed)?;
    let (server_path, room) = (&trimmed[..slash], &trimmed[slash + 1..]);
    if server_path.is_empty() || room.is_empty() {
        return Err(malformed());
    }

    Ok(Address::Community {
        server_url: format!("{}{}", &s[..scheme_end], server_path),
        room: room.to_string(),
    })
}

fn parse_community_blinded(rest: &str) -> Result<Address, AddressError> {
    let (id_part, query) = rest.split_once('?').unwrap_or((rest, ""));
    let blinded_id = AccountId::parse(id_part)?;
    if !blinded_id.prefix().is_blinded() {
        return Err(AddressError::WrongPrefix {
            expected: IdPrefix::Blinded.as_hex(),
            found: blinded_id.prefix().as_hex(),
        });
    }

    let server_url = query
        .split('&')
        .find_map(|pair| {
            pair.strip_prefix(COMMUNITY_BLINDED_SERVER_PARAM)
                .and_then(|v| v.strip_prefix('='))
        })
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AddressError::Malformed(rest.to_string()))?;

    Ok(Address::CommunityBlinded {
        server_url: server_url.to_string(),
        blinded_id,
    })
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(id) | Self::Group(id) | Self::Blinded(id) => write!(f, "{id}"),
            Self::LegacyGroup(key) => {
                write!(f, "{LEGACY_GROUP_PREFIX}{}", hex::encode(key.as_bytes()))
            }
            Self::Community { server_url, room } => write!(f, "{server_url}/{room}"),
            Self::CommunityBlinded {
                server_url,
                blinded_id,
            } => write!(
                f,
                "{COMMUNITY_BLINDED_SCHEME}{blinded_id}?{COMMUNITY_BLINDED_SERVER_PARAM}={server_url}"
            ),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::from_serialized(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}
