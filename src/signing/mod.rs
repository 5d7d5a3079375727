pub mod authority;

pub use authority::{SettlementAuthority, AUTHORITY_KEY_ENV};
