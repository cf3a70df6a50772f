use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::network::message::read_record;
use crate::network::{Message, MessageType, NetworkHub};
use log::{debug, info, warn};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

const TCP_CONNECT_TIMEOUT: u64 = 5000;

/// One connection accepted on the client listening socket.
///
/// Clients submit transactions and ask questions; nothing they send is relayed
/// verbatim, and they never receive peer traffic.
pub struct ClientSession {
    hub: Arc<NetworkHub>,
    stream: TcpStream,
    remote_addr: SocketAddr,
}

impl ClientSession {
    pub fn new(hub: Arc<NetworkHub>, stream: TcpStream) -> Result<ClientSession> {
        let remote_addr = stream
            .peer_addr()
            .map_err(|e| LedgerError::Network(format!("Failed to get client address: {e}")))?;
        Ok(ClientSession {
            hub,
            stream,
            remote_addr,
        })
    }

    pub fn run(mut self) {
        info!("Client session opened from {}", self.remote_addr);
        loop {
            let record = match read_record(&mut self.stream) {
                Ok(record) => record,
                Err(e) => {
                    debug!("Client {} went away: {e}", self.remote_addr);
                    break;
                }
            };
            let message = match Message::decode(&record) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping record from client {}: {e}", self.remote_addr);
                    continue;
                }
            };
            if let Err(e) = self.handle(message) {
                warn!("Client session {} ended: {e}", self.remote_addr);
                break;
            }
        }
        info!("Client session closed from {}", self.remote_addr);
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        match message.get_kind() {
            MessageType::TransactionTransfer => {
                if self.hub.is_frozen() {
                    debug!("Node is frozen, dropping client transactions");
                    return Ok(());
                }
                match message.parse_transactions() {
                    Ok(transactions) => {
                        let offered = transactions.len();
                        let accepted = self.hub.submit_transactions(transactions);
                        info!(
                            "Client {} submitted {offered} transactions, {accepted} accepted",
                            self.remote_addr
                        );
                    }
                    Err(e) => warn!("Bad transaction batch from client {}: {e}", self.remote_addr),
                }
                Ok(())
            }
            MessageType::TransactionRequest | MessageType::BlockRequest => {
                match self.hub.answer_query(&message) {
                    Some(reply) => reply.write_to(&mut self.stream),
                    None => Ok(()),
                }
            }
            other => {
                debug!("Ignoring {other:?} from client {}", self.remote_addr);
                Ok(())
            }
        }
    }
}

fn open(addr: &str) -> Result<TcpStream> {
    let socket_addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| LedgerError::Network(format!("Invalid address {addr}: {e}")))?;
    TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_CONNECT_TIMEOUT))
        .map_err(|e| LedgerError::Network(format!("Failed to connect to {addr}: {e}")))
}

fn exchange(addr: &str, request: &Message) -> Result<Message> {
    let mut stream = open(addr)?;
    request.write_to(&mut stream)?;
    Message::decode(&read_record(&mut stream)?)
}

/// Submit transactions to a node's client port
pub fn send_transactions(addr: &str, transactions: &[Transaction]) -> Result<()> {
    let mut stream = open(addr)?;
    for message in Message::transaction_batches(transactions)? {
        message.write_to(&mut stream)?;
    }
    Ok(())
}

/// Every transaction touching `public_key`, or `None` while the node is frozen
pub fn request_history(addr: &str, public_key: &str) -> Result<Option<Vec<Transaction>>> {
    let reply = exchange(addr, &Message::history_request(public_key)?)?;
    match reply.get_kind() {
        MessageType::TransactionTransfer => reply.parse_transactions().map(Some),
        MessageType::NullResponse => Ok(None),
        other => Err(LedgerError::ProtocolDecode(format!(
            "Unexpected {other:?} in reply to a history request"
        ))),
    }
}

pub fn request_block(addr: &str, hash: &str) -> Result<Option<Block>> {
    let reply = exchange(addr, &Message::block_request(hash)?)?;
    match reply.get_kind() {
        MessageType::BlockTransfer => Ok(reply.parse_blocks()?.into_iter().next()),
        MessageType::NullResponse => Ok(None),
        other => Err(LedgerError::ProtocolDecode(format!(
            "Unexpected {other:?} in reply to a block request"
        ))),
    }
}
