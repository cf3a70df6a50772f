//! Configuration management
//!
//! This module handles the settings of a ledger node: listening addresses,
//! peers, mining difficulty, and timing of the miner and reconciliation.

pub mod settings;

pub use settings::{NodeConfig, DEFAULT_DIFFICULTY};
