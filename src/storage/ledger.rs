use crate::core::{Block, Chain, Transaction};
use crate::error::{Result, ValidationFailure};
use crate::storage::Mempool;
use log::{debug, info};
use std::sync::{Mutex, MutexGuard};

/// Chain and mempool shared by every worker of one node.
///
/// Lock order is always mempool, then chain. Every method that needs both
/// takes them in that order and releases them before returning, so callers
/// never hold a ledger lock across network I/O.
///
/// Known limit of draining before mining: while a batch is being mined it is
/// in neither the mempool nor the chain, so admissions in that window do not
/// count it against the sender's balance.
#[derive(Debug, Default)]
pub struct Ledger {
    mempool: Mutex<Mempool>,
    chain: Mutex<Chain>,
}

/// Where the transactions of a lost mining race ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Returned {
    pub requeued: usize,
    pub discarded: usize,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger::default()
    }

    pub fn with_chain(chain: Chain) -> Ledger {
        Ledger {
            mempool: Mutex::new(Mempool::new()),
            chain: Mutex::new(chain),
        }
    }

    // A worker that panicked mid-update cannot leave either structure half
    // written (every mutation is a single insert/push), so keep going.
    fn mempool(&self) -> MutexGuard<'_, Mempool> {
        self.mempool.lock().unwrap_or_else(|poisoned| {
            log::error!("Mempool lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(|poisoned| {
            log::error!("Chain lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn admit(&self, tx: Transaction) -> std::result::Result<(), ValidationFailure> {
        let mut mempool = self.mempool();
        let chain = self.chain();
        mempool.try_admit(tx, &chain)
    }

    /// Append a block and drop its transactions from the mempool
    pub fn append_block(&self, block: Block) -> std::result::Result<(), ValidationFailure> {
        let txids: Vec<String> = block.get_transactions().iter().map(Transaction::get_id).collect();
        let hash = block.get_hash();

        let mut mempool = self.mempool();
        let mut chain = self.chain();
        chain.append(block)?;
        mempool.prune(&txids);
        info!(
            "Block {hash} appended at height {} ({} transactions)",
            chain.len() - 1,
            txids.len()
        );
        Ok(())
    }

    pub fn last_hash(&self) -> String {
        self.chain().last_hash()
    }

    /// Hand the whole pool to the miner
    pub fn drain_mempool(&self) -> Vec<Transaction> {
        self.mempool().drain()
    }

    /// Put a batch back exactly as it was drained
    pub fn requeue_all(&self, batch: Vec<Transaction>) -> usize {
        let mut mempool = self.mempool();
        batch.into_iter().filter(|tx| mempool.requeue(tx.clone())).count()
    }

    /// After a failed append: requeue what the chain does not have, drop the rest
    pub fn return_unconfirmed(&self, batch: Vec<Transaction>) -> Returned {
        let mut mempool = self.mempool();
        let chain = self.chain();
        let mut returned = Returned {
            requeued: 0,
            discarded: 0,
        };
        for mut tx in batch {
            if chain.contains(&tx.get_id()) {
                returned.discarded += 1;
                continue;
            }
            tx.set_confirmed(false);
            if mempool.requeue(tx) {
                returned.requeued += 1;
            }
        }
        returned
    }

    /// Replace the chain wholesale if `candidate` differs from the current one.
    ///
    /// Returns `None` when nothing changed, otherwise the transactions of the old
    /// chain that the new one lacks; those are back in the mempool unconfirmed.
    /// Mempool entries the new chain already carries are pruned.
    pub fn adopt_chain(&self, candidate: Chain) -> Option<Vec<Transaction>> {
        let mut mempool = self.mempool();
        let mut chain = self.chain();
        if chain.same_blocks(&candidate) {
            return None;
        }

        let mut requeued = Vec::new();
        for tx in chain.transactions() {
            if candidate.contains(&tx.get_id()) {
                continue;
            }
            let mut tx = tx.clone();
            tx.set_confirmed(false);
            if mempool.requeue(tx.clone()) {
                requeued.push(tx);
            }
        }

        let confirmed: Vec<String> = candidate
            .transactions()
            .map(Transaction::get_id)
            .filter(|id| mempool.contains(id))
            .collect();
        mempool.prune(&confirmed);

        info!(
            "Replaced chain of {} blocks with chain of {} blocks; {} transactions requeued",
            chain.len(),
            candidate.len(),
            requeued.len()
        );
        *chain = candidate;
        Some(requeued)
    }

    pub fn chain_wire(&self) -> Result<String> {
        self.chain().to_wire()
    }

    pub fn chain_snapshot(&self) -> Chain {
        self.chain().clone()
    }

    pub fn chain_len(&self) -> usize {
        self.chain().len()
    }

    pub fn find_block(&self, hash: &str) -> Option<Block> {
        self.chain().find_block(hash).cloned()
    }

    /// Chain history first, then pending transactions
    pub fn transactions_for(&self, public_key: &str) -> Vec<Transaction> {
        let mempool = self.mempool();
        let chain = self.chain();
        let mut history = chain.transactions_for(public_key);
        let mut pending = mempool.transactions_for(public_key);
        pending.sort_by_key(Transaction::get_timestamp);
        history.extend(pending);
        debug!("{} transactions touch {public_key}", history.len());
        history
    }

    pub fn balance_of(&self, public_key: &str) -> f64 {
        let mempool = self.mempool();
        let chain = self.chain();
        mempool.balance_of(public_key, &chain)
    }

    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.mempool().get_all()
    }

    pub fn mempool_contains(&self, txid: &str) -> bool {
        self.mempool().contains(txid)
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool().len()
    }

    pub fn mempool_is_empty(&self) -> bool {
        self.mempool().is_empty()
    }
}
