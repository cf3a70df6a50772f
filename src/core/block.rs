use crate::core::{MerkleAggregate, ProofOfWork, Transaction};
use crate::error::{Result, ValidationFailure};
use crate::utils::current_timestamp;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// `previous_hash` of the first block in every chain
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A block does not store its own hash; it is recomputed from the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    previous_hash: String,
    timestamp: u64,
    difficulty: u32,
    nonce: u32,
    merkle: MerkleAggregate,
}

impl Block {
    /// Unmined candidate on top of `previous_hash`
    pub fn new_block(
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Result<Block> {
        Ok(Self::with_timestamp(
            previous_hash,
            transactions,
            difficulty,
            current_timestamp()?,
        ))
    }

    pub fn with_timestamp(
        previous_hash: &str,
        transactions: Vec<Transaction>,
        difficulty: u32,
        timestamp: u64,
    ) -> Block {
        Block {
            previous_hash: previous_hash.to_string(),
            timestamp,
            difficulty,
            nonce: 0,
            merkle: MerkleAggregate::new(transactions),
        }
    }

    /// Search nonces until the hash has exactly `difficulty` leading zeros.
    ///
    /// Blocks the calling thread; there is no cancellation. When the nonce
    /// space runs out the timestamp moves forward and the search restarts.
    pub fn mine(&mut self) -> String {
        debug!(
            "Mining block on {} with {} transactions at difficulty {}",
            self.previous_hash,
            self.merkle.get_transactions().len(),
            self.difficulty
        );
        loop {
            let pow = ProofOfWork::new_proof_of_work(self);
            if let Some((nonce, hash)) = pow.run() {
                self.nonce = nonce;
                info!("Proof-of-work completed for block: {hash} (difficulty: {})", self.difficulty);
                return hash;
            }
            self.timestamp = current_timestamp()
                .unwrap_or(self.timestamp)
                .max(self.timestamp + 1);
            self.nonce = 0;
        }
    }

    /// Proof-of-work and merkle consistency; linkage is the chain's business
    pub fn verify(&self) -> std::result::Result<(), ValidationFailure> {
        if !ProofOfWork::validate(self) {
            return Err(ValidationFailure::ProofOfWork);
        }
        if !self.merkle.is_valid() {
            return Err(ValidationFailure::MerkleMismatch);
        }
        Ok(())
    }

    pub fn get_hash(&self) -> String {
        ProofOfWork::new_proof_of_work(self).hash_with_nonce(self.nonce)
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_merkle_root(&self) -> &str {
        self.merkle.get_root()
    }

    pub fn get_merkle(&self) -> &MerkleAggregate {
        &self.merkle
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.merkle.get_transactions()
    }

    pub fn get_timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u32 {
        self.nonce
    }

    pub(crate) fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    /// Flag every carried transaction as confirmed; identities and the root are unaffected
    pub fn mark_confirmed(&mut self) {
        for tx in self.merkle.transactions_mut() {
            tx.set_confirmed(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::proof_of_work::count_leading_zeros;
    use crate::testnet::test_utils::{create_test_wallets, signed_transfer};
    use crate::utils::serialize;

    #[test]
    fn test_mined_block_verifies_with_exact_zero_count() {
        let wallets = create_test_wallets(2);
        let tx = signed_transfer(&wallets[0], &wallets[1], 5.0, 1);
        let mut block = Block::with_timestamp(GENESIS_HASH, vec![tx], 2, 1_000);

        let hash = block.mine();
        assert_eq!(hash, block.get_hash());
        assert_eq!(count_leading_zeros(&hash), 2);
        assert_eq!(block.verify(), Ok(()));
    }

    #[test]
    fn test_changing_nonce_breaks_proof_of_work() {
        let mut block = Block::with_timestamp(GENESIS_HASH, Vec::new(), 3, 1_000);
        block.mine();
        let pow = ProofOfWork::new_proof_of_work(&block);
        let bad = (0..u32::MAX)
            .find(|n| count_leading_zeros(&pow.hash_with_nonce(*n)) != 3)
            .unwrap();
        block.set_nonce(bad);
        assert_eq!(block.verify(), Err(ValidationFailure::ProofOfWork));
    }

    #[test]
    fn test_confirmation_keeps_block_valid() {
        let wallets = create_test_wallets(2);
        let tx = signed_transfer(&wallets[0], &wallets[1], 5.0, 1);
        let mut block = Block::with_timestamp(GENESIS_HASH, vec![tx], 1, 1_000);
        let hash = block.mine();

        block.mark_confirmed();
        assert!(block.get_transactions().iter().all(|tx| tx.is_confirmed()));
        assert_eq!(block.get_hash(), hash);
        assert_eq!(block.verify(), Ok(()));
    }

    #[test]
    fn test_tampered_batch_is_merkle_mismatch() {
        let wallets = create_test_wallets(2);
        let tx = signed_transfer(&wallets[0], &wallets[1], 5.0, 1);
        let mut block = Block::with_timestamp(GENESIS_HASH, vec![tx], 1, 1_000);
        block.mine();

        // header (and so the hash) is untouched, only the carried batch changes
        let mut value = serde_json::to_value(&block).unwrap();
        value["merkle"]["transactions"] = serde_json::json!([]);
        let forged: Block = serde_json::from_value(value).unwrap();
        assert_eq!(forged.get_hash(), block.get_hash());
        assert_eq!(forged.verify(), Err(ValidationFailure::MerkleMismatch));
    }

    #[test]
    fn test_wire_layout() {
        let block = Block::with_timestamp(GENESIS_HASH, Vec::new(), 1, 5);
        let json = serialize(&block).unwrap();
        assert!(json.starts_with("{\"previous_hash\":"));
        assert!(json.contains("\"merkle\":{\"root\":"));
        assert!(json.contains("\"transactions\":[]"));
    }
}
