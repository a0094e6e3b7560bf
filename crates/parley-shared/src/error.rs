use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AddressError {
    #[error("Invalid account id length: expected 66 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("Invalid account id: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Unknown account id prefix: {0}")]
    UnknownPrefix(String),

    #[error("Account id has prefix {found}, expected {expected}")]
    WrongPrefix {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Malformed address: {0}")]
    Malformed(String),
}
