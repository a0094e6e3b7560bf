//! Domain models persisted by the store.
//!
//! Message record types live in [`crate::messages`]; this module holds the
//! recipient, thread and payload types shared between the tables.

use parley_shared::Address;
use serde::{Deserialize, Serialize};

use crate::message_type::MessageType;

// ---------------------------------------------------------------------------
// Recipient settings
// ---------------------------------------------------------------------------

/// Which incoming messages raise a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotifyType {
    #[default]
    All,
    Mentions,
    None,
}

impl NotifyType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::All => 0,
            Self::Mentions => 1,
            Self::None => 2,
        }
    }

    pub fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::All),
            1 => Some(Self::Mentions),
            2 => Some(Self::None),
            _ => None,
        }
    }
}

/// Per-recipient attachment auto-download override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutoDownload {
    /// Fall back to the global preference.
    #[default]
    Unset,
    Never,
    Always,
}

impl AutoDownload {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Unset => -1,
            Self::Never => 0,
            Self::Always => 1,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        match raw {
            0 => Self::Never,
            1 => Self::Always,
            _ => Self::Unset,
        }
    }
}

/// Disappearing message configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "seconds", rename_all = "snake_case")]
pub enum ExpiryMode {
    #[default]
    None,
    AfterRead(u64),
    AfterSend(u64),
}

impl ExpiryMode {
    pub fn seconds(self) -> u64 {
        match self {
            Self::None => 0,
            Self::AfterRead(s) | Self::AfterSend(s) => s,
        }
    }

    pub fn expiry_millis(self) -> i64 {
        (self.seconds() as i64).saturating_mul(1000)
    }

    pub(crate) fn to_columns(self) -> (i64, i64) {
        match self {
            Self::None => (0, 0),
            Self::AfterRead(s) => (1, s as i64),
            Self::AfterSend(s) => (2, s as i64),
        }
    }

    pub(crate) fn from_columns(kind: i64, seconds: i64) -> Self {
        let seconds = seconds.max(0) as u64;
        match kind {
            _ if seconds == 0 => Self::None,
            1 => Self::AfterRead(seconds),
            2 => Self::AfterSend(seconds),
            _ => Self::None,
        }
    }
}

/// Durable per-address settings.  A missing row reads as `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecipientSettings {
    pub blocked: bool,
    /// We accepted their message request (or started the conversation).
    pub approved: bool,
    /// They accepted ours.
    pub approved_me: bool,
    /// Epoch millis; notifications are muted while `now < mute_until`.
    pub mute_until: i64,
    pub notify_type: NotifyType,
    pub auto_download: AutoDownload,
    pub expiry_mode: ExpiryMode,
    pub profile_key: Option<Vec<u8>>,
    pub system_display_name: Option<String>,
    pub profile_name: Option<String>,
    pub profile_avatar: Option<String>,
    pub notification_channel: Option<String>,
    pub blocks_community_message_requests: bool,
}

impl RecipientSettings {
    pub fn is_muted(&self, now_millis: i64) -> bool {
        self.mute_until > now_millis
    }

    /// Best name to show, if any is known.
    pub fn display_name(&self) -> Option<&str> {
        self.system_display_name
            .as_deref()
            .or(self.profile_name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }
}

/// A member of a closed group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupMember {
    pub address: Address,
    pub is_admin: bool,
}

// ---------------------------------------------------------------------------
// Message payloads
// ---------------------------------------------------------------------------

/// Structured payload of control / rich messages, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    DisappearingMessageUpdate {
        expiry: ExpiryMode,
    },
    GroupUpdate {
        text: String,
        #[serde(default)]
        members: Vec<Address>,
    },
    CommunityInvitation {
        name: String,
        url: String,
    },
}

/// Coarse content classification of an attachment.  The bytes themselves live
/// in the external blob store and are referenced by URI only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    VoiceNote,
    Document,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::VoiceNote => "voice_note",
            Self::Document => "document",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "voice_note" => Some(Self::VoiceNote),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// Label shown in place of an empty body.
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
            Self::Audio => "Audio",
            Self::VoiceNote => "Voice message",
            Self::Document => "Document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub uri: String,
    pub kind: AttachmentKind,
}

/// Reference to a quoted message, by its sent time and author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRef {
    pub timestamp: i64,
    pub author: Address,
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistributionType {
    Broadcast,
    #[default]
    Conversation,
    Archive,
    InboxZero,
}

impl DistributionType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Broadcast => 1,
            Self::Conversation => 2,
            Self::Archive => 3,
            Self::InboxZero => 4,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        match raw {
            1 => Self::Broadcast,
            3 => Self::Archive,
            4 => Self::InboxZero,
            _ => Self::Conversation,
        }
    }
}

/// One conversation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub id: i64,
    pub address: Address,
    pub creation_date: i64,
    /// Time of the latest message, truncated to whole seconds.
    pub date: i64,
    pub message_count: i64,
    pub snippet: String,
    pub snippet_type: MessageType,
    pub snippet_uri: Option<String>,
    pub snippet_content: Option<MessageContent>,
    pub read: bool,
    pub unread_count: i64,
    pub unread_mention_count: i64,
    pub distribution_type: DistributionType,
    pub archived: bool,
    pub pinned: bool,
    pub last_seen: i64,
    pub has_sent: bool,
    pub delivery_receipt_count: i64,
    pub read_receipt_count: i64,
    pub expires_in: i64,
}

/// How far `set_read` / `set_messages_read` should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadUpTo {
    /// Every message sent at or before this time (epoch millis).
    Time(i64),
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_mode_columns_round_trip() {
        for mode in [
            ExpiryMode::None,
            ExpiryMode::AfterRead(30),
            ExpiryMode::AfterSend(86_400),
        ] {
            let (kind, seconds) = mode.to_columns();
            assert_eq!(ExpiryMode::from_columns(kind, seconds), mode);
        }
        assert_eq!(ExpiryMode::from_columns(2, 0), ExpiryMode::None);
    }

    #[test]
    fn content_json_shape() {
        let content = MessageContent::DisappearingMessageUpdate {
            expiry: ExpiryMode::AfterSend(60),
        };
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"disappearing_message_update","expiry":{"mode":"after_send","seconds":60}}"#
        );
    }

    #[test]
    fn display_name_prefers_system_name() {
        let settings = RecipientSettings {
            system_display_name: Some("Alice (work)".into()),
            profile_name: Some("alice".into()),
            ..Default::default()
        };
        assert_eq!(settings.display_name(), Some("Alice (work)"));

        let blank = RecipientSettings {
            profile_name: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(blank.display_name(), None);
    }

    #[test]
    fn muted_until_is_exclusive() {
        let settings = RecipientSettings {
            mute_until: 1_000,
            ..Default::default()
        };
        assert!(settings.is_muted(999));
        assert!(!settings.is_muted(1_000));
    }
}
