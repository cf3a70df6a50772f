use crate::core::{Block, Transaction};
use crate::network::{Message, NetworkHub};
use crate::storage::Ledger;
use crate::utils::current_timestamp;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// What one pass of the miner did
#[derive(Debug, Clone, PartialEq)]
pub enum MiningOutcome {
    /// Mempool empty or node frozen
    Idle,
    /// Node froze while mining; the batch went back untouched
    Abandoned { requeued: usize },
    Appended(Block),
    /// Someone else extended the chain first
    LostRace { requeued: usize, discarded: usize },
}

/// Drains the mempool into blocks, mines them, and announces the winners
pub struct MinerLoop {
    ledger: Arc<Ledger>,
    hub: Arc<NetworkHub>,
    difficulty: u32,
    min_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl MinerLoop {
    pub fn new(
        hub: Arc<NetworkHub>,
        difficulty: u32,
        min_backoff_ms: u64,
        max_backoff_ms: u64,
    ) -> MinerLoop {
        MinerLoop {
            ledger: Arc::clone(hub.get_ledger()),
            hub,
            difficulty,
            min_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(min_backoff_ms),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    pub fn run(&self) {
        info!("Miner started at difficulty {}", self.difficulty);
        loop {
            match self.mine_once() {
                MiningOutcome::Idle | MiningOutcome::Abandoned { .. } => self.backoff(),
                MiningOutcome::Appended(_) | MiningOutcome::LostRace { .. } => {}
            }
        }
    }

    fn backoff(&self) {
        let wait = rand::thread_rng().gen_range(self.min_backoff_ms..=self.max_backoff_ms);
        thread::sleep(Duration::from_millis(wait));
    }

    /// Drain, mine and settle one candidate block
    pub fn mine_once(&self) -> MiningOutcome {
        if self.hub.is_frozen() || self.ledger.mempool_is_empty() {
            return MiningOutcome::Idle;
        }
        let mut batch = self.ledger.drain_mempool();
        if batch.is_empty() {
            return MiningOutcome::Idle;
        }

        let previous_hash = self.ledger.last_hash();
        let capacity = current_timestamp().and_then(|timestamp| {
            Message::block_capacity(&previous_hash, self.difficulty, timestamp, &batch)
                .map(|capacity| (timestamp, capacity))
        });
        let (timestamp, capacity) = match capacity {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to build candidate block: {e}");
                self.ledger.requeue_all(batch);
                return MiningOutcome::Idle;
            }
        };
        if capacity == 0 {
            let oversized = batch.remove(0);
            warn!(
                "Dropping transaction {} that cannot fit in any block",
                oversized.get_id()
            );
            self.ledger.requeue_all(batch);
            return MiningOutcome::Idle;
        }
        let overflow = batch.split_off(capacity);
        if !overflow.is_empty() {
            debug!("Candidate block full, {} transactions wait for the next one", overflow.len());
            self.ledger.requeue_all(overflow);
        }

        let mut block =
            Block::with_timestamp(&previous_hash, batch.clone(), self.difficulty, timestamp);
        block.mine();
        self.settle(block, batch)
    }

    /// Decide what happens to a freshly mined block and the batch it was built from
    pub fn settle(&self, mut block: Block, batch: Vec<Transaction>) -> MiningOutcome {
        if self.hub.is_frozen() {
            let requeued = self.ledger.requeue_all(batch);
            info!("Node froze while mining, returned {requeued} transactions");
            return MiningOutcome::Abandoned { requeued };
        }

        block.mark_confirmed();
        match self.ledger.append_block(block.clone()) {
            Ok(()) => {
                info!("New block {} is mined!", block.get_hash());
                self.hub.broadcast_block(&block);
                MiningOutcome::Appended(block)
            }
            Err(reason) => {
                debug!("Mined block {} rejected: {reason}", block.get_hash());
                let returned = self.ledger.return_unconfirmed(batch);
                info!(
                    "Lost mining race: {} transactions requeued, {} already confirmed",
                    returned.requeued, returned.discarded
                );
                MiningOutcome::LostRace {
                    requeued: returned.requeued,
                    discarded: returned.discarded,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GENESIS_HASH;
    use crate::testnet::test_utils::{create_test_wallets, mined_block, signed_transfer};

    fn miner() -> MinerLoop {
        let hub = NetworkHub::new(Arc::new(Ledger::new()), Duration::from_millis(10));
        MinerLoop::new(hub, 1, 1, 2)
    }

    #[test]
    fn test_idle_on_empty_mempool() {
        assert_eq!(miner().mine_once(), MiningOutcome::Idle);
    }

    #[test]
    fn test_mines_and_appends_pending_transactions() {
        let w = create_test_wallets(2);
        let miner = miner();
        let tx = signed_transfer(&w[0], &w[1], 3.0, 1);
        miner.ledger.admit(tx.clone()).unwrap();

        match miner.mine_once() {
            MiningOutcome::Appended(block) => {
                assert_eq!(block.get_transactions().len(), 1);
                assert!(block.get_transactions()[0].is_confirmed());
                assert_eq!(miner.ledger.last_hash(), block.get_hash());
            }
            other => panic!("expected a block, got {other:?}"),
        }
        assert!(miner.ledger.mempool_is_empty());
        assert_eq!(miner.ledger.balance_of(&w[1].get_address()), 103.0);
    }

    #[test]
    fn test_candidate_block_fits_one_record() {
        let w = create_test_wallets(2);
        let miner = miner();
        for ts in 0..60 {
            miner
                .ledger
                .admit(signed_transfer(&w[0], &w[1], 1.0, ts))
                .unwrap();
        }

        let block = match miner.mine_once() {
            MiningOutcome::Appended(block) => block,
            other => panic!("expected a block, got {other:?}"),
        };
        let carried = block.get_transactions().len();
        assert!(carried > 0 && carried < 60);
        assert!(Message::blocks(&[block.clone()]).unwrap().encode().is_ok());
        // oldest first; the rest is still pending
        assert_eq!(block.get_transactions()[0].get_timestamp(), 0);
        assert_eq!(miner.ledger.mempool_len(), 60 - carried);
        assert_eq!(miner.ledger.chain_len(), 1);
    }

    #[test]
    fn test_frozen_node_does_not_mine() {
        let w = create_test_wallets(2);
        let miner = miner();
        miner
            .ledger
            .admit(signed_transfer(&w[0], &w[1], 3.0, 1))
            .unwrap();
        miner.hub.freeze();
        assert_eq!(miner.mine_once(), MiningOutcome::Idle);
        assert_eq!(miner.ledger.mempool_len(), 1);
    }

    #[test]
    fn test_freeze_during_mining_abandons_block() {
        let w = create_test_wallets(2);
        let miner = miner();
        let tx = signed_transfer(&w[0], &w[1], 3.0, 1);
        let block = mined_block(GENESIS_HASH, vec![tx.clone()], 1);

        miner.hub.freeze();
        assert_eq!(
            miner.settle(block, vec![tx.clone()]),
            MiningOutcome::Abandoned { requeued: 1 }
        );
        assert!(miner.ledger.mempool_contains(&tx.get_id()));
        assert_eq!(miner.ledger.chain_len(), 0);
    }

    #[test]
    fn test_lost_race_requeues_only_unconfirmed() {
        let w = create_test_wallets(2);
        let miner = miner();
        let shared = signed_transfer(&w[0], &w[1], 1.0, 1);
        let ours_only = signed_transfer(&w[0], &w[1], 2.0, 2);

        // a competing block with `shared` lands first
        miner
            .ledger
            .append_block(mined_block(GENESIS_HASH, vec![shared.clone()], 1))
            .unwrap();
        let candidate = mined_block(GENESIS_HASH, vec![shared.clone(), ours_only.clone()], 1);

        assert_eq!(
            miner.settle(candidate, vec![shared.clone(), ours_only.clone()]),
            MiningOutcome::LostRace {
                requeued: 1,
                discarded: 1
            }
        );
        assert!(miner.ledger.mempool_contains(&ours_only.get_id()));
        assert!(!miner.ledger.mempool_contains(&shared.get_id()));
        assert_eq!(miner.ledger.chain_len(), 1);
    }
}
