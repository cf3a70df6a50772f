use crate::core::{Block, Chain, Transaction};
use crate::error::{LedgerError, Result};
use crate::network::message::read_record;
use crate::network::{ClientSession, Message, MessageType, PeerLink};
use crate::storage::Ledger;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Result of one freeze/wakeup round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No peer answered the chain request in time
    NoProposals,
    /// The local chain won the tally, or the winner failed validation
    Unchanged,
    /// The local chain was replaced
    Adopted { blocks: usize, requeued: usize },
}

/// Owns every peer link of a node and routes their messages into the ledger.
///
/// One worker thread per link reads records and calls `handle_peer_message`;
/// sends may come from any thread. Ledger locks are never held while sending.
pub struct NetworkHub {
    ledger: Arc<Ledger>,
    settle_interval: Duration,
    links: RwLock<Vec<Arc<PeerLink>>>,
    frozen: AtomicBool,
}

impl NetworkHub {
    pub fn new(ledger: Arc<Ledger>, settle_interval: Duration) -> Arc<NetworkHub> {
        Arc::new(NetworkHub {
            ledger,
            settle_interval,
            links: RwLock::new(Vec::new()),
            frozen: AtomicBool::new(false),
        })
    }

    pub fn get_ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .map_err(|e| LedgerError::Network(format!("Failed to bind to {addr}: {e}")))
    }

    /// Accept peers on `listener` from a background thread
    pub fn serve_peers(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        thread::spawn(move || {
            if let Ok(addr) = listener.local_addr() {
                info!("Peer listener on {addr}");
            }
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = hub.attach(stream) {
                            error!("Failed to attach incoming peer: {e}");
                        }
                    }
                    Err(e) => error!("Error accepting peer connection: {e}"),
                }
            }
        })
    }

    /// Accept clients on `listener`, one session thread each
    pub fn serve_clients(self: &Arc<Self>, listener: TcpListener) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        thread::spawn(move || {
            if let Ok(addr) = listener.local_addr() {
                info!("Client listener on {addr}");
            }
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => match ClientSession::new(Arc::clone(&hub), stream) {
                        Ok(session) => {
                            thread::spawn(move || session.run());
                        }
                        Err(e) => error!("Failed to open client session: {e}"),
                    },
                    Err(e) => error!("Error accepting client connection: {e}"),
                }
            }
        })
    }

    /// Open an outbound link to a peer's listening socket
    pub fn connect(self: &Arc<Self>, addr: &str) -> Result<Arc<PeerLink>> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| LedgerError::Network(format!("Failed to connect to {addr}: {e}")))?;
        self.attach(stream)
    }

    fn attach(self: &Arc<Self>, stream: TcpStream) -> Result<Arc<PeerLink>> {
        let (link, reader) = PeerLink::open(stream)?;
        let link = Arc::new(link);
        if self.is_frozen() {
            link.freeze();
        }

        match self.links.write() {
            Ok(mut links) => links.push(Arc::clone(&link)),
            Err(_) => {
                return Err(LedgerError::Network(
                    "Failed to acquire write lock on peer links".to_string(),
                ))
            }
        }
        info!(
            "Peer link {} established with {}",
            link.get_id(),
            link.get_remote_addr()
        );

        let hub = Arc::clone(self);
        let worker_link = Arc::clone(&link);
        thread::spawn(move || hub.run_link(worker_link, reader));
        Ok(link)
    }

    fn run_link(self: Arc<Self>, link: Arc<PeerLink>, mut reader: TcpStream) {
        loop {
            let record = match read_record(&mut reader) {
                Ok(record) => record,
                Err(e) => {
                    error!("Link to {} closed: {e}", link.get_remote_addr());
                    break;
                }
            };
            match Message::decode(&record) {
                Ok(message) => self.handle_peer_message(&link, message),
                Err(e) => warn!("Dropping record from {}: {e}", link.get_remote_addr()),
            }
        }
        self.detach(link.get_id());
    }

    fn detach(&self, id: Uuid) {
        match self.links.write() {
            Ok(mut links) => links.retain(|link| link.get_id() != id),
            Err(_) => error!("Failed to acquire write lock on peer links"),
        }
    }

    fn snapshot_links(&self) -> Vec<Arc<PeerLink>> {
        match self.links.read() {
            Ok(links) => links.clone(),
            Err(_) => {
                error!("Failed to acquire read lock on peer links");
                Vec::new()
            }
        }
    }

    pub fn link_count(&self) -> usize {
        self.snapshot_links().len()
    }

    /// Dispatch one record received on `link`
    pub fn handle_peer_message(&self, link: &PeerLink, message: Message) {
        debug!(
            "Received {:?} from {}",
            message.get_kind(),
            link.get_remote_addr()
        );
        match message.get_kind() {
            MessageType::TransactionTransfer => self.on_transactions(link, &message),
            MessageType::BlockTransfer => self.on_blocks(link, &message),
            MessageType::ChainRequest => self.on_chain_request(link),
            MessageType::ChainTransfer => self.on_chain_transfer(link, &message),
            MessageType::ChainSync => self.on_chain_sync(link, &message),
            MessageType::TransactionRequest | MessageType::BlockRequest => {
                if let Some(reply) = self.answer_query(&message) {
                    self.send_to(link, &reply);
                }
            }
            MessageType::NullResponse => {}
        }
    }

    fn on_transactions(&self, origin: &PeerLink, message: &Message) {
        if origin.is_frozen() {
            debug!("Link {} is frozen, dropping transactions", origin.get_id());
            return;
        }
        let transactions = match message.parse_transactions() {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!("Bad transaction batch from {}: {e}", origin.get_remote_addr());
                return;
            }
        };
        let accepted = self.admit_all(transactions);
        if accepted.is_empty() {
            return;
        }
        match Message::transactions(&accepted) {
            Ok(relay) => self.relay(&relay, origin.get_id()),
            Err(e) => error!("Failed to encode transaction relay: {e}"),
        }
    }

    fn on_blocks(&self, origin: &PeerLink, message: &Message) {
        if origin.is_frozen() {
            debug!("Link {} is frozen, dropping blocks", origin.get_id());
            return;
        }
        let blocks = match message.parse_blocks() {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Bad block batch from {}: {e}", origin.get_remote_addr());
                return;
            }
        };

        let mut accepted = Vec::new();
        for block in blocks {
            match self.ledger.append_block(block.clone()) {
                Ok(()) => accepted.push(block),
                Err(reason) => debug!(
                    "Rejected block {} from {}: {reason}",
                    block.get_hash(),
                    origin.get_remote_addr()
                ),
            }
        }
        if accepted.is_empty() {
            return;
        }
        match Message::blocks(&accepted) {
            Ok(relay) => self.relay(&relay, origin.get_id()),
            Err(e) => error!("Failed to encode block relay: {e}"),
        }
    }

    fn on_chain_request(&self, link: &PeerLink) {
        if self.ledger.chain_len() == 0 {
            debug!("Local chain is empty, ignoring chain request");
            return;
        }
        match self.ledger.chain_wire() {
            Ok(text) => self.send_to(link, &Message::new(MessageType::ChainTransfer, text)),
            Err(e) => error!("Failed to serialize local chain: {e}"),
        }
    }

    fn on_chain_transfer(&self, link: &PeerLink, message: &Message) {
        match Chain::from_wire(message.get_payload()) {
            Ok(chain) => {
                debug!(
                    "Cached chain proposal of {} blocks from {}",
                    chain.len(),
                    link.get_remote_addr()
                );
                link.set_proposal(message.get_payload().to_string());
            }
            Err(e) => warn!("Ignoring chain proposal from {}: {e}", link.get_remote_addr()),
        }
    }

    fn on_chain_sync(&self, origin: &PeerLink, message: &Message) {
        let chain = match Chain::from_wire(message.get_payload()) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Ignoring chain sync from {}: {e}", origin.get_remote_addr());
                return;
            }
        };
        if let Some(requeued) = self.ledger.adopt_chain(chain) {
            self.relay(message, origin.get_id());
            self.broadcast_transactions(&requeued);
        }
    }

    /// Reply for a client-facing query, `None` if the request itself is unreadable
    pub fn answer_query(&self, message: &Message) -> Option<Message> {
        match message.get_kind() {
            MessageType::TransactionRequest => {
                if self.is_frozen() {
                    return Some(Message::null_response());
                }
                let query = match message.parse_query() {
                    Ok(query) => query,
                    Err(e) => {
                        warn!("Bad history request: {e}");
                        return None;
                    }
                };
                let history = self.ledger.transactions_for(query.get_sender());
                match Message::transactions(&history) {
                    Ok(reply) => Some(reply),
                    Err(e) => {
                        error!("Failed to encode history reply: {e}");
                        Some(Message::null_response())
                    }
                }
            }
            MessageType::BlockRequest => {
                let query = match message.parse_block_query() {
                    Ok(query) => query,
                    Err(e) => {
                        warn!("Bad block request: {e}");
                        return None;
                    }
                };
                let reply = self
                    .ledger
                    .find_block(&query.hash)
                    .and_then(|block| Message::blocks(&[block]).ok());
                Some(reply.unwrap_or_else(Message::null_response))
            }
            _ => None,
        }
    }

    /// Admit a client's batch and flood whatever was accepted
    pub fn submit_transactions(&self, transactions: Vec<Transaction>) -> usize {
        let accepted = self.admit_all(transactions);
        self.broadcast_transactions(&accepted);
        accepted.len()
    }

    fn admit_all(&self, transactions: Vec<Transaction>) -> Vec<Transaction> {
        let mut accepted = Vec::new();
        for tx in transactions {
            let txid = tx.get_id();
            match self.ledger.admit(tx.clone()) {
                Ok(()) => accepted.push(tx),
                Err(reason) => debug!("Rejected transaction {txid}: {reason}"),
            }
        }
        accepted
    }

    pub fn broadcast_block(&self, block: &Block) {
        match Message::blocks(std::slice::from_ref(block)) {
            Ok(message) => self.broadcast(&message),
            Err(e) => error!("Failed to encode block {}: {e}", block.get_hash()),
        }
    }

    pub fn broadcast_transactions(&self, transactions: &[Transaction]) {
        if transactions.is_empty() {
            return;
        }
        match Message::transaction_batches(transactions) {
            Ok(messages) => messages.iter().for_each(|message| self.broadcast(message)),
            Err(e) => error!("Failed to encode transaction batch: {e}"),
        }
    }

    pub fn broadcast(&self, message: &Message) {
        for link in self.snapshot_links() {
            self.send_to(&link, message);
        }
    }

    fn relay(&self, message: &Message, except: Uuid) {
        for link in self.snapshot_links() {
            if link.get_id() != except {
                self.send_to(&link, message);
            }
        }
    }

    // A failed write only ends that link; its worker notices on the next read.
    // A message that never made it into a record leaves the link untouched.
    fn send_to(&self, link: &PeerLink, message: &Message) {
        match link.send(message) {
            Ok(()) => {}
            Err(LedgerError::Serialization(e)) => warn!(
                "Not sending {:?} to {}: {e}",
                message.get_kind(),
                link.get_remote_addr()
            ),
            Err(e) => {
                error!("Failed to send to {}: {e}", link.get_remote_addr());
                link.shutdown();
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Stop taking transactions and blocks from every link and halt the miner
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
        for link in self.snapshot_links() {
            link.freeze();
        }
        info!("Node frozen");
    }

    /// Unfreeze, collect chain proposals for one settling interval, and converge
    /// on the most popular one.
    pub fn wakeup(&self) -> ReconcileOutcome {
        let links = self.snapshot_links();
        for link in &links {
            link.clear_proposal();
            link.wakeup();
        }
        self.frozen.store(false, Ordering::SeqCst);
        info!("Node awake, requesting chains from {} peers", links.len());

        self.broadcast(&Message::chain_request());
        thread::sleep(self.settle_interval);

        let mut proposals: Vec<String> = self
            .snapshot_links()
            .iter()
            .filter_map(|link| link.get_proposal())
            .collect();
        if proposals.is_empty() {
            info!("No chain proposals received");
            return ReconcileOutcome::NoProposals;
        }

        let local = match self.ledger.chain_wire() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize local chain: {e}");
                return ReconcileOutcome::Unchanged;
            }
        };
        proposals.push(local.clone());

        let winner = match select_proposal(&proposals) {
            Some(winner) if winner != local => winner.to_string(),
            _ => {
                info!("Local chain kept after tallying {} proposals", proposals.len());
                return ReconcileOutcome::Unchanged;
            }
        };

        let chain = match Chain::from_wire(&winner) {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Winning chain proposal failed validation: {e}");
                return ReconcileOutcome::Unchanged;
            }
        };
        let blocks = chain.len();
        match self.ledger.adopt_chain(chain) {
            Some(requeued) => {
                self.broadcast(&Message::new(MessageType::ChainSync, winner));
                self.broadcast_transactions(&requeued);
                ReconcileOutcome::Adopted {
                    blocks,
                    requeued: requeued.len(),
                }
            }
            None => ReconcileOutcome::Unchanged,
        }
    }

    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.snapshot_links()
            .iter()
            .map(|link| link.get_remote_addr())
            .collect()
    }
}

/// Most frequent proposal; ties go to the longest text, then the
/// lexicographically greatest, so every node picks the same one.
pub fn select_proposal(proposals: &[String]) -> Option<&str> {
    let mut votes: HashMap<&str, usize> = HashMap::new();
    for proposal in proposals {
        *votes.entry(proposal.as_str()).or_default() += 1;
    }
    votes
        .into_iter()
        .max_by(|(text_a, votes_a), (text_b, votes_b)| {
            votes_a
                .cmp(votes_b)
                .then_with(|| text_a.len().cmp(&text_b.len()))
                .then_with(|| text_a.cmp(text_b))
        })
        .map(|(text, _)| text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GENESIS_HASH;
    use crate::network::PAYLOAD_CAPACITY;
    use crate::testnet::test_utils::{create_test_wallets, mined_block, signed_transfer};

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_proposal_prefers_popularity() {
        let proposals = texts(&["aaaaaaaa", "bb", "bb"]);
        assert_eq!(select_proposal(&proposals), Some("bb"));
    }

    #[test]
    fn test_select_proposal_breaks_ties_by_length_then_text() {
        assert_eq!(select_proposal(&texts(&["abc", "abcd"])), Some("abcd"));
        assert_eq!(select_proposal(&texts(&["abd", "abc"])), Some("abd"));
        assert_eq!(select_proposal(&texts(&["abc", "abd"])), Some("abd"));
        assert_eq!(select_proposal(&[]), None);
    }

    fn hub_with_link() -> (Arc<NetworkHub>, Arc<PeerLink>, TcpStream) {
        let hub = NetworkHub::new(Arc::new(Ledger::new()), Duration::from_millis(50));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let link = hub.connect(&addr.to_string()).unwrap();
        let (remote, _) = listener.accept().unwrap();
        (hub, link, remote)
    }

    #[test]
    fn test_frozen_link_drops_transfers() {
        let w = create_test_wallets(2);
        let (hub, link, _remote) = hub_with_link();
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);

        hub.freeze();
        assert!(link.is_frozen());
        hub.handle_peer_message(&link, Message::transactions(&[tx.clone()]).unwrap());
        assert_eq!(hub.get_ledger().mempool_len(), 0);

        link.wakeup();
        hub.handle_peer_message(&link, Message::transactions(&[tx.clone()]).unwrap());
        assert!(hub.get_ledger().mempool_contains(&tx.get_id()));
    }

    #[test]
    fn test_block_transfer_appends_and_prunes() {
        let w = create_test_wallets(2);
        let (hub, link, _remote) = hub_with_link();
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);
        hub.get_ledger().admit(tx.clone()).unwrap();

        let block = mined_block(GENESIS_HASH, vec![tx.clone()], 1);
        hub.handle_peer_message(&link, Message::blocks(&[block.clone()]).unwrap());
        assert_eq!(hub.get_ledger().last_hash(), block.get_hash());
        assert_eq!(hub.get_ledger().mempool_len(), 0);

        // the same block again is rejected quietly
        hub.handle_peer_message(&link, Message::blocks(&[block]).unwrap());
        assert_eq!(hub.get_ledger().chain_len(), 1);
    }

    #[test]
    fn test_chain_request_is_answered_once_chain_exists() {
        let w = create_test_wallets(2);
        let (hub, link, mut remote) = hub_with_link();

        // empty chain: nothing is sent, so the next record is the sentinel below
        hub.handle_peer_message(&link, Message::chain_request());
        link.send(&Message::null_response()).unwrap();
        let first = Message::decode(&read_record(&mut remote).unwrap()).unwrap();
        assert_eq!(first.get_kind(), MessageType::NullResponse);

        let block = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1);
        hub.get_ledger().append_block(block).unwrap();
        hub.handle_peer_message(&link, Message::chain_request());
        let reply = Message::decode(&read_record(&mut remote).unwrap()).unwrap();
        assert_eq!(reply.get_kind(), MessageType::ChainTransfer);
        assert_eq!(reply.get_payload(), hub.get_ledger().chain_wire().unwrap());
    }

    #[test]
    fn test_chain_too_large_for_a_record_keeps_the_link() {
        let w = create_test_wallets(2);
        let (hub, link, mut remote) = hub_with_link();
        let ledger = hub.get_ledger();
        for ts in 0..40 {
            let tx = signed_transfer(&w[0], &w[1], 1.0, ts);
            ledger
                .append_block(mined_block(&ledger.last_hash(), vec![tx], 1))
                .unwrap();
        }
        assert!(ledger.chain_wire().unwrap().len() > PAYLOAD_CAPACITY);

        hub.handle_peer_message(&link, Message::chain_request());
        assert_eq!(hub.link_count(), 1);

        // the link still carries whatever does fit
        hub.broadcast(&Message::null_response());
        let next = Message::decode(&read_record(&mut remote).unwrap()).unwrap();
        assert_eq!(next.get_kind(), MessageType::NullResponse);
    }

    #[test]
    fn test_chain_transfer_is_cached_not_applied() {
        let w = create_test_wallets(2);
        let (hub, link, _remote) = hub_with_link();
        let mut chain = Chain::new();
        chain
            .append(mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1))
            .unwrap();
        let text = chain.to_wire().unwrap();

        hub.handle_peer_message(&link, Message::new(MessageType::ChainTransfer, text.clone()));
        assert_eq!(link.get_proposal(), Some(text));
        assert_eq!(hub.get_ledger().chain_len(), 0);

        hub.handle_peer_message(
            &link,
            Message::new(MessageType::ChainTransfer, "{\"blocks\":[{}]}".to_string()),
        );
        assert!(link.get_proposal().is_some());
    }

    #[test]
    fn test_chain_sync_replaces_local_chain() {
        let w = create_test_wallets(2);
        let (hub, link, _remote) = hub_with_link();
        let mut chain = Chain::new();
        chain
            .append(mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1))
            .unwrap();

        hub.handle_peer_message(
            &link,
            Message::new(MessageType::ChainSync, chain.to_wire().unwrap()),
        );
        assert!(hub.get_ledger().chain_snapshot().same_blocks(&chain));
    }

    #[test]
    fn test_history_query_and_null_response_when_frozen() {
        let w = create_test_wallets(2);
        let hub = NetworkHub::new(Arc::new(Ledger::new()), Duration::from_millis(10));
        let tx = signed_transfer(&w[0], &w[1], 1.0, 1);
        hub.get_ledger().admit(tx.clone()).unwrap();

        let request = Message::history_request(&w[1].get_address()).unwrap();
        let reply = hub.answer_query(&request).unwrap();
        assert_eq!(reply.get_kind(), MessageType::TransactionTransfer);
        assert_eq!(reply.parse_transactions().unwrap(), vec![tx]);

        hub.freeze();
        let reply = hub.answer_query(&request).unwrap();
        assert_eq!(reply.get_kind(), MessageType::NullResponse);
    }

    #[test]
    fn test_block_query() {
        let w = create_test_wallets(2);
        let hub = NetworkHub::new(Arc::new(Ledger::new()), Duration::from_millis(10));
        let block = mined_block(GENESIS_HASH, vec![signed_transfer(&w[0], &w[1], 1.0, 1)], 1);
        hub.get_ledger().append_block(block.clone()).unwrap();

        let found = hub
            .answer_query(&Message::block_request(&block.get_hash()).unwrap())
            .unwrap();
        assert_eq!(found.parse_blocks().unwrap(), vec![block]);

        let missing = hub
            .answer_query(&Message::block_request("00ff").unwrap())
            .unwrap();
        assert_eq!(missing.get_kind(), MessageType::NullResponse);
    }

    #[test]
    fn test_wakeup_without_peers_reports_no_proposals() {
        let hub = NetworkHub::new(Arc::new(Ledger::new()), Duration::from_millis(10));
        hub.freeze();
        assert_eq!(hub.wakeup(), ReconcileOutcome::NoProposals);
        assert!(!hub.is_frozen());
    }
}
