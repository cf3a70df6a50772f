//! # Gossip Ledger - My Peer-to-Peer Proof-of-Work Ledger
//!
//! This is a small ledger node I built in Rust: nodes gossip transactions and
//! blocks over plain TCP, mine with an exact leading-zero rule, and converge
//! on one chain through a freeze / wakeup vote.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Account-style transfers**: signed with ECDSA P-256, balances derived by replaying history
//! - **Merkle aggregation**: an index arena so proof paths can walk leaf to root
//! - **Proof-of-work chain**: append-only, validated block by block, held in memory
//! - **Gossip network**: fixed-size records, one thread per link, flooding relay
//! - **Fork reconciliation**: freeze, collect chain proposals, adopt the most popular
//!
//! ## How I Organized My Code
//! - `core/`: transactions, merkle tree, blocks, proof-of-work, the chain
//! - `storage/`: the mempool and the `Ledger` that pairs it with the chain
//! - `network/`: wire records, peer links, the hub, client sessions, node startup
//! - `miner/`: the mining loop
//! - `wallet/`: key pair used to sign transfers
//! - `config/`: node settings from defaults, TOML, environment
//! - `utils/`: hashing, signing, encoding helpers
//! - `cli/`: command-line interface
//!
//! ## Key Design Decisions I Made
//! - No global state: one `Ledger` context is shared by the hub and the miner
//! - Mempool lock is always taken before the chain lock
//! - A chain is only ever replaced whole, never spliced
//!
//! ## When I Need to Understand Something
//! 1. Start with `network/hub.rs` for what each message does
//! 2. Look at `core/chain.rs` for what makes a block acceptable
//! 3. Check `miner/miner_loop.rs` for how mining races are settled

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod miner;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::NodeConfig;
pub use crate::core::{Block, Chain, MerkleAggregate, MerkleTree, ProofOfWork, Transaction, GENESIS_HASH};
pub use error::{LedgerError, Result, ValidationFailure};
pub use miner::{MinerLoop, MiningOutcome};
pub use network::{
    request_block, request_history, send_transactions, LedgerNode, Message, MessageType,
    NetworkHub, ReconcileOutcome,
};
pub use storage::{Ledger, Mempool};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, sha256_digest, sha256_hex,
};
pub use wallet::Wallet;
