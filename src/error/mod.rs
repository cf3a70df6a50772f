//! Error handling for the ledger node
//!
//! Two layers: `ValidationFailure` is the reason a transaction or block was
//! rejected (always recovered locally), `LedgerError` is everything that can
//! actually go wrong while talking to the outside world.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Why a transaction or block was turned away
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// Signature missing, malformed, or not produced by the sender key
    BadSignature,
    /// Sender and receiver are the same key
    SelfTransfer,
    /// Derived balance cannot cover the amount
    InsufficientBalance { required: f64, available: f64 },
    /// Amount is negative or not a finite number
    InvalidAmount,
    /// Hash does not carry exactly `difficulty` leading zeros
    ProofOfWork,
    /// Stored merkle root does not match the carried batch
    MerkleMismatch,
    /// `previous_hash` does not point at the current tail
    BrokenLinkage { expected: String, found: String },
    /// Transaction identity is already known
    Duplicate(String),
    /// Transaction claims to be in a block already and cannot be pending
    AlreadyConfirmed,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::BadSignature => write!(f, "bad signature"),
            ValidationFailure::SelfTransfer => write!(f, "sender and receiver are identical"),
            ValidationFailure::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: required {required}, available {available}"
            ),
            ValidationFailure::InvalidAmount => write!(f, "amount must be a non-negative number"),
            ValidationFailure::ProofOfWork => write!(f, "proof-of-work mismatch"),
            ValidationFailure::MerkleMismatch => write!(f, "merkle root mismatch"),
            ValidationFailure::BrokenLinkage { expected, found } => {
                write!(f, "broken linkage: expected {expected}, found {found}")
            }
            ValidationFailure::Duplicate(id) => write!(f, "duplicate transaction {id}"),
            ValidationFailure::AlreadyConfirmed => write!(f, "transaction is already confirmed"),
        }
    }
}

/// Error types for ledger node operations
#[derive(Debug, Clone)]
pub enum LedgerError {
    /// Key handling or signing errors
    Crypto(String),
    /// Peer unreachable, connection reset, bind failure
    Network(String),
    /// Malformed wire record or payload
    ProtocolDecode(String),
    /// JSON encoding errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Chain import failed at the given block index
    InvalidChain { index: usize, reason: ValidationFailure },
    /// Lookup for something that is not there
    NotFound(String),
    /// Rejected transaction or block
    Validation(ValidationFailure),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Network(msg) => write!(f, "Network error: {msg}"),
            LedgerError::ProtocolDecode(msg) => write!(f, "Protocol decode error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::InvalidChain { index, reason } => {
                write!(f, "Invalid chain at block {index}: {reason}")
            }
            LedgerError::NotFound(what) => write!(f, "Not found: {what}"),
            LedgerError::Validation(reason) => write!(f, "Rejected: {reason}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<ValidationFailure> for LedgerError {
    fn from(reason: ValidationFailure) -> Self {
        LedgerError::Validation(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_failure_wraps_into_ledger_error() {
        let err: LedgerError = ValidationFailure::SelfTransfer.into();
        assert_eq!(
            err.to_string(),
            "Rejected: sender and receiver are identical"
        );
    }

    #[test]
    fn test_invalid_chain_message_names_the_block() {
        let err = LedgerError::InvalidChain {
            index: 3,
            reason: ValidationFailure::MerkleMismatch,
        };
        assert_eq!(err.to_string(), "Invalid chain at block 3: merkle root mismatch");
    }
}
