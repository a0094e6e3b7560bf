//! The `type` / `msg_box` bitmask shared by both message tables.
//!
//! The low five bits hold the base type (direction and delivery state); the
//! higher bits are independent flags marking control messages.  Direction is
//! always derived from the base type, there is no separate column for it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(u64);

impl MessageType {
    pub const BASE_TYPE_MASK: u64 = 0x1F;

    pub const INCOMING_CALL: u64 = 1;
    pub const OUTGOING_CALL: u64 = 2;
    pub const MISSED_CALL: u64 = 3;

    pub const BASE_INBOX: u64 = 20;
    pub const BASE_OUTBOX: u64 = 21;
    pub const BASE_SENDING: u64 = 22;
    pub const BASE_SENT: u64 = 23;
    pub const BASE_SENT_FAILED: u64 = 24;
    pub const BASE_PENDING_SECURE_FALLBACK: u64 = 25;
    pub const BASE_PENDING_INSECURE_FALLBACK: u64 = 26;
    pub const BASE_DRAFT: u64 = 27;
    pub const BASE_SYNCING: u64 = 28;
    pub const BASE_RESYNCING: u64 = 29;
    pub const BASE_SYNC_FAILED: u64 = 30;

    pub const OUTGOING_BASE_TYPES: [u64; 10] = [
        Self::BASE_OUTBOX,
        Self::BASE_SENT,
        Self::BASE_SENDING,
        Self::BASE_SENT_FAILED,
        Self::BASE_PENDING_SECURE_FALLBACK,
        Self::BASE_PENDING_INSECURE_FALLBACK,
        Self::OUTGOING_CALL,
        Self::BASE_SYNCING,
        Self::BASE_RESYNCING,
        Self::BASE_SYNC_FAILED,
    ];

    pub const MEDIA_SAVED_BIT: u64 = 0x1000;
    pub const SCREENSHOT_BIT: u64 = 0x2000;
    pub const COMMUNITY_INVITATION_BIT: u64 = 0x4000;
    pub const GROUP_UPDATE_BIT: u64 = 0x10000;
    pub const GROUP_QUIT_BIT: u64 = 0x20000;
    pub const EXPIRATION_TIMER_UPDATE_BIT: u64 = 0x40000;
    pub const MESSAGE_REQUEST_RESPONSE_BIT: u64 = 0x80000;
    pub const PUSH_MESSAGE_BIT: u64 = 0x200000;
    pub const SECURE_MESSAGE_BIT: u64 = 0x800000;

    const CONTROL_BITS: u64 = Self::MEDIA_SAVED_BIT
        | Self::SCREENSHOT_BIT
        | Self::GROUP_UPDATE_BIT
        | Self::GROUP_QUIT_BIT
        | Self::EXPIRATION_TIMER_UPDATE_BIT
        | Self::MESSAGE_REQUEST_RESPONSE_BIT;

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// A received, end-to-end encrypted message.
    pub const fn incoming() -> Self {
        Self(Self::BASE_INBOX | Self::SECURE_MESSAGE_BIT | Self::PUSH_MESSAGE_BIT)
    }

    /// An outgoing message that has not been handed to the network yet.
    pub const fn outgoing() -> Self {
        Self(Self::BASE_SENDING | Self::SECURE_MESSAGE_BIT | Self::PUSH_MESSAGE_BIT)
    }

    pub const fn base(self) -> u64 {
        self.0 & Self::BASE_TYPE_MASK
    }

    /// Replace the base type, keeping every flag.
    pub const fn with_base(self, base: u64) -> Self {
        Self((self.0 & !Self::BASE_TYPE_MASK) | (base & Self::BASE_TYPE_MASK))
    }

    pub const fn with_flag(self, flag: u64) -> Self {
        Self(self.0 | flag)
    }

    pub const fn has_flag(self, flag: u64) -> bool {
        self.0 & flag != 0
    }

    pub fn is_outgoing(self) -> bool {
        Self::OUTGOING_BASE_TYPES.contains(&self.base())
    }

    pub fn is_inbox(self) -> bool {
        self.base() == Self::BASE_INBOX
    }

    pub fn is_sent(self) -> bool {
        self.base() == Self::BASE_SENT
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self.base(),
            Self::BASE_OUTBOX
                | Self::BASE_SENDING
                | Self::BASE_PENDING_SECURE_FALLBACK
                | Self::BASE_PENDING_INSECURE_FALLBACK
                | Self::BASE_SYNCING
                | Self::BASE_RESYNCING
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self.base(), Self::BASE_SENT_FAILED | Self::BASE_SYNC_FAILED)
    }

    pub fn is_call(self) -> bool {
        matches!(
            self.base(),
            Self::INCOMING_CALL | Self::OUTGOING_CALL | Self::MISSED_CALL
        )
    }

    pub fn is_group_update(self) -> bool {
        self.has_flag(Self::GROUP_UPDATE_BIT)
    }

    pub fn is_expiration_timer_update(self) -> bool {
        self.has_flag(Self::EXPIRATION_TIMER_UPDATE_BIT)
    }

    pub fn is_community_invitation(self) -> bool {
        self.has_flag(Self::COMMUNITY_INVITATION_BIT)
    }

    /// Control messages render as centred notices rather than bubbles.
    pub fn is_control_message(self) -> bool {
        self.has_flag(Self::CONTROL_BITS) || self.is_call()
    }

    /// SQL predicate matching outgoing rows of the given type column.
    pub fn outgoing_sql(column: &str) -> String {
        let bases = Self::OUTGOING_BASE_TYPES
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("({column} & {}) IN ({bases})", Self::BASE_TYPE_MASK)
    }
}

impl From<i64> for MessageType {
    fn from(raw: i64) -> Self {
        Self(raw as u64)
    }
}

impl From<MessageType> for i64 {
    fn from(ty: MessageType) -> Self {
        ty.0 as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_comes_from_base_type() {
        assert!(!MessageType::incoming().is_outgoing());
        assert!(MessageType::outgoing().is_outgoing());
        assert!(MessageType::outgoing()
            .with_base(MessageType::BASE_SENT)
            .is_sent());
    }

    #[test]
    fn with_base_keeps_flags() {
        let ty = MessageType::outgoing()
            .with_flag(MessageType::GROUP_UPDATE_BIT)
            .with_base(MessageType::BASE_SENT_FAILED);

        assert!(ty.is_failed());
        assert!(ty.is_group_update());
        assert!(ty.has_flag(MessageType::SECURE_MESSAGE_BIT));
    }

    #[test]
    fn control_messages() {
        let timer = MessageType::incoming().with_flag(MessageType::EXPIRATION_TIMER_UPDATE_BIT);
        assert!(timer.is_control_message());
        assert!(!MessageType::incoming().is_control_message());
        assert!(MessageType::from_raw(MessageType::MISSED_CALL).is_control_message());
    }

    #[test]
    fn outgoing_sql_lists_every_outgoing_base() {
        let sql = MessageType::outgoing_sql("m.type");
        assert!(sql.starts_with("(m.type & 31) IN ("));
        assert!(sql.contains("23"));
        assert!(!sql.contains("20,"));
    }
}
