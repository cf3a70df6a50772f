use crate::config::NodeConfig;
use crate::error::Result;
use crate::miner::MinerLoop;
use crate::network::NetworkHub;
use crate::storage::Ledger;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A running node: both listeners, the configured peer links, and the miner
pub struct LedgerNode {
    hub: Arc<NetworkHub>,
    listen_addr: SocketAddr,
    client_addr: SocketAddr,
    miner: Option<JoinHandle<()>>,
}

impl LedgerNode {
    /// Bind both sockets, dial peers, start the miner.
    ///
    /// Only a bind failure is an error; unreachable peers are logged and skipped.
    pub fn start(config: &NodeConfig) -> Result<LedgerNode> {
        let ledger = Arc::new(Ledger::new());
        let hub = NetworkHub::new(ledger, config.settle_interval());

        let peer_listener = NetworkHub::bind(&config.listen_addr)?;
        let client_listener = NetworkHub::bind(&config.client_addr)?;
        let listen_addr = peer_listener.local_addr()?;
        let client_addr = client_listener.local_addr()?;
        hub.serve_peers(peer_listener);
        hub.serve_clients(client_listener);
        info!("Node {} listening for peers on {listen_addr}, clients on {client_addr}", config.node_id());

        for peer in &config.peers {
            if let Err(e) = hub.connect(peer) {
                error!("Could not reach peer {peer}: {e}");
            }
        }

        let miner = if config.mining {
            let miner = MinerLoop::new(
                Arc::clone(&hub),
                config.difficulty,
                config.min_backoff_ms,
                config.max_backoff_ms,
            );
            Some(miner.spawn())
        } else {
            info!("Mining is off");
            None
        };

        Ok(LedgerNode {
            hub,
            listen_addr,
            client_addr,
            miner,
        })
    }

    pub fn get_hub(&self) -> &Arc<NetworkHub> {
        &self.hub
    }

    pub fn get_ledger(&self) -> &Arc<Ledger> {
        self.hub.get_ledger()
    }

    pub fn get_listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn get_client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn is_mining(&self) -> bool {
        self.miner.is_some()
    }
}
