//! Mining loop
//!
//! A single worker that batches the mempool into blocks and races the rest of
//! the network to extend the chain.

pub mod miner_loop;

pub use miner_loop::{MinerLoop, MiningOutcome};
