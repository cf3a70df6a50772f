use crate::error::{LedgerError, Result};
use crate::network::Message;
use log::debug;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// One connection to a remote node.
///
/// The socket is split with `try_clone`: this struct keeps the sending half
/// behind a mutex so any thread may send, and the receiving half goes to the
/// link's own worker thread.
#[derive(Debug)]
pub struct PeerLink {
    id: Uuid,
    remote_addr: SocketAddr,
    writer: Mutex<TcpStream>,
    frozen: AtomicBool,
    proposal: Mutex<Option<String>>,
}

impl PeerLink {
    /// Wrap a connected stream, returning the link and the half to read from
    pub fn open(stream: TcpStream) -> Result<(PeerLink, TcpStream)> {
        let remote_addr = stream
            .peer_addr()
            .map_err(|e| LedgerError::Network(format!("Failed to get peer address: {e}")))?;
        let reader = stream
            .try_clone()
            .map_err(|e| LedgerError::Network(format!("Failed to clone stream to {remote_addr}: {e}")))?;

        let link = PeerLink {
            id: Uuid::new_v4(),
            remote_addr,
            writer: Mutex::new(stream),
            frozen: AtomicBool::new(false),
            proposal: Mutex::new(None),
        };
        Ok((link, reader))
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| LedgerError::Network(format!("Writer to {} is poisoned", self.remote_addr)))?;
        message.write_to(&mut *writer)?;
        debug!("Sent {:?} to {}", message.get_kind(), self.remote_addr);
        Ok(())
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn wakeup(&self) {
        self.frozen.store(false, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Remember the chain text this peer last offered
    pub fn set_proposal(&self, chain_text: String) {
        match self.proposal.lock() {
            Ok(mut proposal) => *proposal = Some(chain_text),
            Err(_) => log::error!("Failed to acquire lock on proposal of {}", self.remote_addr),
        }
    }

    pub fn get_proposal(&self) -> Option<String> {
        match self.proposal.lock() {
            Ok(proposal) => proposal.clone(),
            Err(_) => {
                log::error!("Failed to acquire lock on proposal of {}", self.remote_addr);
                None
            }
        }
    }

    pub fn clear_proposal(&self) {
        match self.proposal.lock() {
            Ok(mut proposal) => *proposal = None,
            Err(_) => log::error!("Failed to acquire lock on proposal of {}", self.remote_addr),
        }
    }

    /// Close both halves; the worker's pending read returns and it exits
    pub fn shutdown(&self) {
        if let Ok(writer) = self.writer.lock() {
            let _ = writer.shutdown(Shutdown::Both);
        }
    }
}
