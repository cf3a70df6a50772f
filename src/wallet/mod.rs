//! Key pair used to sign transactions
//!
//! Wallet storage and key management live outside this crate; the ledger only
//! needs something that can sign and a public key string.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::Wallet;
