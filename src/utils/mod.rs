//! Utility functions and helpers
//!
//! Hashing, signing, encoding, and the JSON helpers used for wire payloads.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, hex8, new_key_pair, sha256_digest, sha256_hex,
};

pub use serialization::{deserialize, serialize};
