use crate::core::{Chain, Transaction, INITIAL_STAKE};
use crate::error::ValidationFailure;
use log::debug;
use std::collections::HashMap;

/// Pending transactions ( K -> txid_hex, V => Transaction ).
///
/// No lock of its own: the `Ledger` owns it behind a mutex and hands the
/// current chain in wherever a decision depends on it.
#[derive(Debug, Default)]
pub struct Mempool {
    inner: HashMap<String, Transaction>,
}

impl Mempool {
    pub fn new() -> Mempool {
        Mempool::default()
    }

    /// Admit a signed, still pending transfer if it is new and its sender can afford it
    pub fn try_admit(
        &mut self,
        tx: Transaction,
        chain: &Chain,
    ) -> std::result::Result<(), ValidationFailure> {
        let txid = tx.get_id();
        if self.inner.contains_key(&txid) || chain.contains(&txid) {
            return Err(ValidationFailure::Duplicate(txid));
        }
        if tx.is_confirmed() {
            return Err(ValidationFailure::AlreadyConfirmed);
        }
        if tx.is_query() {
            return Err(ValidationFailure::SelfTransfer);
        }
        if !tx.verify() {
            return Err(ValidationFailure::BadSignature);
        }

        let available = self.balance_of(tx.get_sender(), chain);
        if available - tx.get_amount() < 0.0 {
            return Err(ValidationFailure::InsufficientBalance {
                required: tx.get_amount(),
                available,
            });
        }

        debug!("Admitted transaction {txid} into the mempool");
        self.inner.insert(txid, tx);
        Ok(())
    }

    /// Initial stake plus every movement in the chain and in this pool
    pub fn balance_of(&self, public_key: &str, chain: &Chain) -> f64 {
        chain
            .transactions()
            .chain(self.inner.values())
            .filter(|tx| !tx.is_query())
            .fold(INITIAL_STAKE, |balance, tx| {
                if tx.get_sender() == public_key {
                    balance - tx.get_amount()
                } else if tx.get_receiver() == public_key {
                    balance + tx.get_amount()
                } else {
                    balance
                }
            })
    }

    /// Empty the pool, oldest first (ties broken by identity)
    pub fn drain(&mut self) -> Vec<Transaction> {
        let mut batch: Vec<(String, Transaction)> = self.inner.drain().collect();
        batch.sort_by(|(id_a, a), (id_b, b)| {
            a.get_timestamp()
                .cmp(&b.get_timestamp())
                .then_with(|| id_a.cmp(id_b))
        });
        batch.into_iter().map(|(_, tx)| tx).collect()
    }

    pub fn prune<'a>(&mut self, txids: impl IntoIterator<Item = &'a String>) {
        for txid in txids {
            self.inner.remove(txid);
        }
    }

    /// Put a transaction back unconditionally; false if it was already there
    pub fn requeue(&mut self, tx: Transaction) -> bool {
        let txid = tx.get_id();
        if self.inner.contains_key(&txid) {
            return false;
        }
        self.inner.insert(txid, tx);
        true
    }

    pub fn get(&self, txid: &str) -> Option<&Transaction> {
        self.inner.get(txid)
    }

    pub fn contains(&self, txid: &str) -> bool {
        self.inner.contains_key(txid)
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        self.inner.values().cloned().collect()
    }

    pub fn transactions_for(&self, public_key: &str) -> Vec<Transaction> {
        self.inner
            .values()
            .filter(|tx| tx.involves(public_key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
