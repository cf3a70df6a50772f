use crate::core::{Block, Transaction, GENESIS_HASH};
use crate::error::{LedgerError, Result, ValidationFailure};
use crate::utils::{deserialize, serialize};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Append-only list of blocks, kept in memory.
///
/// Every block that makes it in has passed `append`, so the whole list always
/// links back to `GENESIS_HASH`, carries valid proofs of work and consistent
/// merkle roots, and never repeats a transaction identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    blocks: Vec<Block>,
    #[serde(skip)]
    known: HashSet<String>,
}

impl Chain {
    pub fn new() -> Chain {
        Chain::default()
    }

    /// Validate `block` against the tail and push it. Leaves the chain untouched on rejection.
    pub fn append(&mut self, block: Block) -> std::result::Result<(), ValidationFailure> {
        self.check(&block)?;
        for tx in block.get_transactions() {
            self.known.insert(tx.get_id());
        }
        debug!(
            "Appended block {} at height {}",
            block.get_hash(),
            self.blocks.len()
        );
        self.blocks.push(block);
        Ok(())
    }

    /// Everything `append` checks, without mutating
    pub fn check(&self, block: &Block) -> std::result::Result<(), ValidationFailure> {
        block.verify()?;

        let expected = self.last_hash();
        if block.get_previous_hash() != expected {
            return Err(ValidationFailure::BrokenLinkage {
                expected,
                found: block.get_previous_hash().to_string(),
            });
        }

        let mut batch = HashSet::new();
        for tx in block.get_transactions() {
            if !tx.verify() {
                return Err(ValidationFailure::BadSignature);
            }
            let id = tx.get_id();
            if self.known.contains(&id) || !batch.insert(id.clone()) {
                return Err(ValidationFailure::Duplicate(id));
            }
        }
        Ok(())
    }

    /// Hash of the tail block, or the genesis sentinel while empty
    pub fn last_hash(&self) -> String {
        self.blocks
            .last()
            .map(Block::get_hash)
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.known.contains(txid)
    }

    pub fn find_block(&self, hash: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.get_hash() == hash)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|block| block.get_transactions())
    }

    /// Every confirmed transaction sent or received by `public_key`, oldest first
    pub fn transactions_for(&self, public_key: &str) -> Vec<Transaction> {
        self.transactions()
            .filter(|tx| tx.involves(public_key))
            .cloned()
            .collect()
    }

    pub fn block_hashes(&self) -> Vec<String> {
        self.blocks.iter().map(Block::get_hash).collect()
    }

    /// Same blocks in the same order, judged by hash
    pub fn same_blocks(&self, other: &Chain) -> bool {
        self.len() == other.len() && self.block_hashes() == other.block_hashes()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn get_blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `{"blocks":[...]}`
    pub fn to_wire(&self) -> Result<String> {
        serialize(self)
    }

    /// Parse and replay every block through `append` on an empty chain
    pub fn from_wire(text: &str) -> Result<Chain> {
        let parsed: Chain = deserialize(text)?;
        Self::from_blocks(parsed.blocks)
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Result<Chain> {
        let mut chain = Chain::new();
        for (index, block) in blocks.into_iter().enumerate() {
            chain
                .append(block)
                .map_err(|reason| LedgerError::InvalidChain { index, reason })?;
        }
        Ok(chain)
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_utils::{create_test_wallets, mined_block, signed_transfer};

    #[test]
    fn test_empty_chain_links_to_genesis() {
        let chain = Chain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.last_hash(), GENESIS_HASH);
    }

    #[test]
    fn test_append_links_blocks() {
        let w = create_test_wallets(2);
        let mut chain = Chain::new();

        let first = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1);
        chain.append(first.clone()).unwrap();
        assert_eq!(chain.last_hash(), first.get_hash());

        let second = mined_block(
            &first.get_hash(),
            vec![signed_transfer(&w[1], &w[0], 1.0, 2)],
            1,
        );
        chain.append(second.clone()).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.last_hash(), second.get_hash());
        assert_eq!(chain.find_block(&first.get_hash()), Some(&first));
    }

    #[test]
    fn test_rejection_leaves_chain_untouched() {
        let w = create_test_wallets(2);
        let mut chain = Chain::new();
        let first = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1);
        chain.append(first).unwrap();
        let before = chain.clone();

        // stale link
        let stale = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 2.0, 2)], 1);
        assert!(matches!(
            chain.append(stale),
            Err(ValidationFailure::BrokenLinkage { .. })
        ));
        assert_eq!(chain, before);
    }

    #[test]
    fn test_duplicate_identity_across_blocks_is_rejected() {
        let w = create_test_wallets(2);
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);
        let mut chain = Chain::new();
        let first = mined_block(GENESIS_HASH, vec![tx.clone()], 1);
        chain.append(first.clone()).unwrap();

        let again = mined_block(&first.get_hash(), vec![tx.clone()], 1);
        assert_eq!(
            chain.append(again),
            Err(ValidationFailure::Duplicate(tx.get_id()))
        );
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_duplicate_inside_one_batch_is_rejected() {
        let w = create_test_wallets(2);
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);
        let block = mined_block(GENESIS_HASH, vec![tx.clone(), tx], 1);
        assert!(matches!(
            Chain::new().append(block),
            Err(ValidationFailure::Duplicate(_))
        ));
    }

    #[test]
    fn test_unsigned_transaction_is_rejected() {
        let w = create_test_wallets(2);
        let unsigned = Transaction::with_timestamp(&w[0].get_address(), &w[1].get_address(), 1.0, 1);
        let block = mined_block(GENESIS_HASH, vec![unsigned], 1);
        assert_eq!(
            Chain::new().append(block),
            Err(ValidationFailure::BadSignature)
        );
    }

    #[test]
    fn test_wire_round_trip_rebuilds_index() {
        let w = create_test_wallets(2);
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);
        let mut chain = Chain::new();
        chain
            .append(mined_block(GENESIS_HASH, vec![tx.clone()], 1))
            .unwrap();

        let text = chain.to_wire().unwrap();
        assert!(text.starts_with("{\"blocks\":["));
        let imported = Chain::from_wire(&text).unwrap();
        assert!(imported.same_blocks(&chain));
        assert!(imported.contains(&tx.get_id()));
        assert_eq!(imported.transactions_for(&w[1].get_address()).len(), 1);
    }

    #[test]
    fn test_import_reports_first_bad_block() {
        let w = create_test_wallets(2);
        let first = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1);
        let orphan = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 2.0, 2)], 1);

        match Chain::from_blocks(vec![first, orphan]) {
            Err(LedgerError::InvalidChain { index, reason }) => {
                assert_eq!(index, 1);
                assert!(matches!(reason, ValidationFailure::BrokenLinkage { .. }));
            }
            other => panic!("expected InvalidChain, got {other:?}"),
        }
        assert!(matches!(
            Chain::from_wire("{\"blocks\":"),
            Err(LedgerError::ProtocolDecode(_))
        ));
    }
}
