//! Peer-to-peer networking
//!
//! This module handles communication between ledger nodes and with clients:
//! the fixed-size record protocol, one link per peer connection, the hub that
//! relays transactions and blocks and reconciles forks, and client sessions.

pub mod client;
pub mod hub;
pub mod message;
pub mod node;
pub mod peer_link;

pub use client::{request_block, request_history, send_transactions, ClientSession};
pub use hub::{select_proposal, NetworkHub, ReconcileOutcome};
pub use message::{Message, MessageType, PAYLOAD_CAPACITY, RECORD_SIZE};
pub use node::LedgerNode;
pub use peer_link::PeerLink;
