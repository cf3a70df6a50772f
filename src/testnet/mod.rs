//! Shared helpers for unit tests
//!
//! Wallets, signed transfers, cheaply mined blocks and loopback node configs.

pub mod test_utils;

pub use test_utils::*;
