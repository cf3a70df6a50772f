//! In-memory ledger state
//!
//! The mempool of pending transactions and the `Ledger` context that pairs it
//! with the chain behind one lock order. Nothing is persisted to disk.

pub mod ledger;
pub mod memory_pool;

pub use ledger::{Ledger, Returned};
pub use memory_pool::Mempool;
