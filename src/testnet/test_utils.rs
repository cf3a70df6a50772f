//! Test utilities for ledger testing

use crate::config::NodeConfig;
use crate::core::{Block, Transaction};
use crate::wallet::Wallet;

/// Difficulty low enough that mining takes a handful of hashes
pub const TEST_DIFFICULTY: u32 = 1;

pub fn create_test_wallets(count: usize) -> Vec<Wallet> {
    (0..count)
        .map(|_| Wallet::new().expect("key generation should work in tests"))
        .collect()
}

/// Transfer signed by `from`, with a fixed timestamp so identities are predictable
pub fn signed_transfer(from: &Wallet, to: &Wallet, amount: f64, timestamp: u64) -> Transaction {
    let mut tx =
        Transaction::with_timestamp(&from.get_address(), &to.get_address(), amount, timestamp);
    tx.sign(from).expect("signing with the sender key should work");
    tx
}

pub fn mined_block(previous_hash: &str, transactions: Vec<Transaction>, difficulty: u32) -> Block {
    let mut block = Block::with_timestamp(previous_hash, transactions, difficulty, 1_000);
    block.mine();
    block
}

/// Loopback node on ephemeral ports, miner off, short settling interval
pub fn local_test_config(peers: Vec<String>) -> NodeConfig {
    NodeConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        client_addr: "127.0.0.1:0".to_string(),
        peers,
        difficulty: TEST_DIFFICULTY,
        mining: false,
        min_backoff_ms: 5,
        max_backoff_ms: 20,
        settle_interval_ms: 200,
    }
}
