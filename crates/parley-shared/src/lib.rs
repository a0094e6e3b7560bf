pub mod address;
pub mod constants;
pub mod error;

pub use address::{AccountId, Address, IdPrefix};
pub use error::AddressError;
