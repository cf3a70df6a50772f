//! Core ledger functionality
//!
//! This module contains the data structures and their validation rules:
//! transactions, merkle aggregation, blocks, proof-of-work, and the chain.

pub mod block;
pub mod chain;
pub mod merkle;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_HASH};
pub use chain::Chain;
pub use merkle::{MerkleAggregate, MerkleTree, ProofElement};
pub use monetary::{is_valid_amount, INITIAL_STAKE};
pub use proof_of_work::{count_leading_zeros, ProofOfWork};
pub use transaction::Transaction;
