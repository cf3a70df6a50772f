// A transaction here is a plain account-style transfer: one sender key, one receiver key,
// an amount. There are no inputs or outputs to chase, balances come from replaying history.

use crate::core::monetary::is_valid_amount;
use crate::error::{LedgerError, Result};
use crate::utils::{
    base58_decode, current_timestamp, ecdsa_p256_sha256_sign_verify, sha256_digest, sha256_hex,
};
use crate::wallet::Wallet;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    sender: String,   // base58 public key of the payer
    receiver: String, // base58 public key of the payee
    amount: f64,
    timestamp: u64, // milliseconds since the epoch, fixed at creation
    #[serde(default)]
    signature: String, // hex, empty until signed
    #[serde(default)]
    confirmed: bool, // the only field that changes after creation
}

impl Transaction {
    /// New unsigned transfer stamped with the current time
    pub fn new(sender: &str, receiver: &str, amount: f64) -> Result<Transaction> {
        Ok(Self::with_timestamp(
            sender,
            receiver,
            amount,
            current_timestamp()?,
        ))
    }

    pub fn with_timestamp(sender: &str, receiver: &str, amount: f64, timestamp: u64) -> Transaction {
        Transaction {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            timestamp,
            signature: String::new(),
            confirmed: false,
        }
    }

    /// Self-transfer used to ask a node for the history of `public_key`
    pub fn new_query(public_key: &str) -> Result<Transaction> {
        Self::new(public_key, public_key, 0.0)
    }

    /// Identity hash over (sender, amount, receiver, timestamp), lowercase hex.
    ///
    /// Neither the signature nor the `confirmed` flag takes part, so the
    /// identity is stable across signing and confirmation.
    pub fn get_id(&self) -> String {
        let data = format!(
            "{}{}{}{}",
            self.sender, self.amount, self.receiver, self.timestamp
        );
        sha256_hex(data.as_bytes())
    }

    fn signing_digest(&self) -> Vec<u8> {
        let data = format!(
            "{}{}{}{}{}",
            self.sender,
            self.amount,
            self.receiver,
            self.timestamp,
            self.get_id()
        );
        sha256_digest(data.as_bytes())
    }

    /// Sign with the sender's key and store the signature as hex
    pub fn sign(&mut self, wallet: &Wallet) -> Result<()> {
        if wallet.get_address() != self.sender {
            return Err(LedgerError::Crypto(
                "Signing key does not belong to the sender".to_string(),
            ));
        }
        let signature = wallet.sign(&self.signing_digest())?;
        self.signature = HEXLOWER.encode(&signature);
        Ok(())
    }

    /// True only for a well-formed transfer whose signature checks against `sender`
    pub fn verify(&self) -> bool {
        if self.is_query() || !is_valid_amount(self.amount) {
            return false;
        }
        let public_key = match base58_decode(&self.sender) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match HEXLOWER.decode(self.signature.as_bytes()) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        ecdsa_p256_sha256_sign_verify(&public_key, &signature, &self.signing_digest())
    }

    /// Self-transfers never move value; they are history queries
    pub fn is_query(&self) -> bool {
        self.sender == self.receiver
    }

    pub fn involves(&self, public_key: &str) -> bool {
        self.sender == public_key || self.receiver == public_key
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    pub fn get_receiver(&self) -> &str {
        self.receiver.as_str()
    }

    pub fn get_amount(&self) -> f64 {
        self.amount
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn set_confirmed(&mut self, confirmed: bool) {
        self.confirmed = confirmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{deserialize, serialize};

    fn signed(from: &Wallet, to: &Wallet, amount: f64) -> Transaction {
        let mut tx =
            Transaction::with_timestamp(&from.get_address(), &to.get_address(), amount, 1_000);
        tx.sign(from).unwrap();
        tx
    }

    #[test]
    fn test_signed_transfer_verifies() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let tx = signed(&alice, &bob, 10.0);
        assert!(tx.verify());
        assert_eq!(tx.get_id().len(), 64);
    }

    #[test]
    fn test_unsigned_or_tampered_transfer_fails() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let unsigned =
            Transaction::with_timestamp(&alice.get_address(), &bob.get_address(), 1.0, 5);
        assert!(!unsigned.verify());

        let mut tampered = signed(&alice, &bob, 10.0);
        tampered.amount = 90.0;
        assert!(!tampered.verify());

        let mut garbage = signed(&alice, &bob, 10.0);
        garbage.signature = "not hex".to_string();
        assert!(!garbage.verify());
    }

    #[test]
    fn test_self_transfer_never_verifies() {
        let alice = Wallet::new().unwrap();
        let mut tx = Transaction::with_timestamp(&alice.get_address(), &alice.get_address(), 1.0, 7);
        tx.sign(&alice).unwrap();
        assert!(tx.is_query());
        assert!(!tx.verify());
    }

    #[test]
    fn test_signing_with_foreign_key_is_refused() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mut tx = Transaction::with_timestamp(&alice.get_address(), &bob.get_address(), 1.0, 7);
        assert!(matches!(tx.sign(&bob), Err(LedgerError::Crypto(_))));
    }

    #[test]
    fn test_identity_ignores_confirmation_and_signature() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let unsigned =
            Transaction::with_timestamp(&alice.get_address(), &bob.get_address(), 3.5, 42);
        let mut tx = signed(&alice, &bob, 3.5);
        tx.timestamp = 42;
        tx.sign(&alice).unwrap();
        let id = tx.get_id();
        assert_eq!(id, unsigned.get_id());

        tx.set_confirmed(true);
        assert_eq!(tx.get_id(), id);
        assert!(tx.verify());
    }

    #[test]
    fn test_wire_field_names() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let tx = signed(&alice, &bob, 2.0);
        let json = serialize(&tx).unwrap();
        for field in [
            "\"sender\"",
            "\"receiver\"",
            "\"amount\"",
            "\"timestamp\"",
            "\"signature\"",
            "\"confirmed\"",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
        let back: Transaction = deserialize(&json).unwrap();
        assert_eq!(back, tx);
        assert!(back.verify());
    }
}
