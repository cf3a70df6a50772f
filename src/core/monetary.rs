//! Amount rules
//!
//! There is no minting: every identity starts with the same stake and balances
//! are derived by replaying history on top of it.

/// Stake every public key starts with before any history is replayed
pub const INITIAL_STAKE: f64 = 100.0;

/// Amounts must be finite and non-negative
pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}
