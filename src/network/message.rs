use crate::core::{Block, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Bytes available for the UTF-8 payload in one record
pub const PAYLOAD_CAPACITY: usize = 16 * 1024;
/// 4-byte little-endian type tag followed by the NUL-padded payload
pub const RECORD_SIZE: usize = 4 + PAYLOAD_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    TransactionTransfer,
    TransactionRequest,
    BlockTransfer,
    BlockRequest,
    ChainTransfer,
    ChainRequest,
    ChainSync,
    NullResponse,
}

impl MessageType {
    pub fn tag(self) -> u32 {
        match self {
            MessageType::TransactionTransfer => 0,
            MessageType::TransactionRequest => 1,
            MessageType::BlockTransfer => 2,
            MessageType::BlockRequest => 3,
            MessageType::ChainTransfer => 4,
            MessageType::ChainRequest => 5,
            MessageType::ChainSync => 6,
            MessageType::NullResponse => 7,
        }
    }

    pub fn from_tag(tag: u32) -> Result<MessageType> {
        match tag {
            0 => Ok(MessageType::TransactionTransfer),
            1 => Ok(MessageType::TransactionRequest),
            2 => Ok(MessageType::BlockTransfer),
            3 => Ok(MessageType::BlockRequest),
            4 => Ok(MessageType::ChainTransfer),
            5 => Ok(MessageType::ChainRequest),
            6 => Ok(MessageType::ChainSync),
            7 => Ok(MessageType::NullResponse),
            other => Err(LedgerError::ProtocolDecode(format!(
                "Unknown message type {other}"
            ))),
        }
    }
}

/// `{"transactions":[...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
}

/// `{"blocks":[...]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockBatch {
    pub blocks: Vec<Block>,
}

/// `{"hash":"<hex>"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockQuery {
    pub hash: String,
}

/// One record on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    kind: MessageType,
    payload: String,
}

impl Message {
    pub fn new(kind: MessageType, payload: String) -> Message {
        Message { kind, payload }
    }

    pub fn transactions(transactions: &[Transaction]) -> Result<Message> {
        let batch = TransactionBatch {
            transactions: transactions.to_vec(),
        };
        Ok(Message::new(
            MessageType::TransactionTransfer,
            serialize(&batch)?,
        ))
    }

    /// The same transfer split over as many records as it needs
    pub fn transaction_batches(transactions: &[Transaction]) -> Result<Vec<Message>> {
        let framing = Message::transactions(&[])?.payload.len();
        let mut messages = Vec::new();
        let mut rest = transactions;
        while !rest.is_empty() {
            // an entry too big for any record still goes out alone and fails at encode
            let count = fitting_prefix(framing, rest, false)?.max(1);
            let (head, tail) = rest.split_at(count);
            messages.push(Message::transactions(head)?);
            rest = tail;
        }
        Ok(messages)
    }

    /// How many leading `candidates` a block on `previous_hash` can carry and
    /// still travel as one `BLOCK_TRANSFER` after it is mined and confirmed
    pub fn block_capacity(
        previous_hash: &str,
        difficulty: u32,
        timestamp: u64,
        candidates: &[Transaction],
    ) -> Result<usize> {
        let mut widest = Block::with_timestamp(previous_hash, Vec::new(), difficulty, timestamp);
        widest.set_nonce(u32::MAX);
        let framing = Message::blocks(std::slice::from_ref(&widest))?.payload.len();
        fitting_prefix(framing, candidates, true)
    }

    pub fn blocks(blocks: &[Block]) -> Result<Message> {
        let batch = BlockBatch {
            blocks: blocks.to_vec(),
        };
        Ok(Message::new(MessageType::BlockTransfer, serialize(&batch)?))
    }

    pub fn history_request(public_key: &str) -> Result<Message> {
        let sentinel = Transaction::new_query(public_key)?;
        Ok(Message::new(
            MessageType::TransactionRequest,
            serialize(&sentinel)?,
        ))
    }

    pub fn block_request(hash: &str) -> Result<Message> {
        let query = BlockQuery {
            hash: hash.to_string(),
        };
        Ok(Message::new(MessageType::BlockRequest, serialize(&query)?))
    }

    pub fn chain_request() -> Message {
        Message::new(MessageType::ChainRequest, String::new())
    }

    pub fn null_response() -> Message {
        Message::new(MessageType::NullResponse, String::new())
    }

    pub fn get_kind(&self) -> MessageType {
        self.kind
    }

    pub fn get_payload(&self) -> &str {
        self.payload.as_str()
    }

    pub fn parse_transactions(&self) -> Result<Vec<Transaction>> {
        deserialize::<TransactionBatch>(&self.payload).map(|batch| batch.transactions)
    }

    pub fn parse_blocks(&self) -> Result<Vec<Block>> {
        deserialize::<BlockBatch>(&self.payload).map(|batch| batch.blocks)
    }

    pub fn parse_query(&self) -> Result<Transaction> {
        deserialize(&self.payload)
    }

    pub fn parse_block_query(&self) -> Result<BlockQuery> {
        deserialize(&self.payload)
    }

    /// Fixed-size record; payloads that do not fit are refused
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = self.payload.as_bytes();
        if bytes.len() > PAYLOAD_CAPACITY {
            return Err(LedgerError::Serialization(format!(
                "{:?} payload of {} bytes exceeds the {PAYLOAD_CAPACITY} byte record",
                self.kind,
                bytes.len()
            )));
        }
        if bytes.contains(&0) {
            return Err(LedgerError::Serialization(
                "Payload contains a NUL byte".to_string(),
            ));
        }

        let mut record = vec![0u8; RECORD_SIZE];
        record[..4].copy_from_slice(&self.kind.tag().to_le_bytes());
        record[4..4 + bytes.len()].copy_from_slice(bytes);
        Ok(record)
    }

    pub fn decode(record: &[u8]) -> Result<Message> {
        if record.len() != RECORD_SIZE {
            return Err(LedgerError::ProtocolDecode(format!(
                "Record of {} bytes, expected {RECORD_SIZE}",
                record.len()
            )));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&record[..4]);
        let kind = MessageType::from_tag(u32::from_le_bytes(tag))?;

        let body = &record[4..];
        let end = body.iter().position(|b| *b == 0).unwrap_or(body.len());
        let payload = std::str::from_utf8(&body[..end])
            .map_err(|e| LedgerError::ProtocolDecode(format!("Payload is not UTF-8: {e}")))?;
        Ok(Message::new(kind, payload.to_string()))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let record = self.encode()?;
        writer
            .write_all(&record)
            .and_then(|_| writer.flush())
            .map_err(|e| LedgerError::Network(format!("Failed to send {:?}: {e}", self.kind)))
    }
}

// Longest prefix whose JSON array fits in a record next to `framing` bytes
fn fitting_prefix(framing: usize, candidates: &[Transaction], confirmed: bool) -> Result<usize> {
    let mut size = framing;
    for (count, tx) in candidates.iter().enumerate() {
        let mut entry = tx.clone();
        if confirmed {
            entry.set_confirmed(true);
        }
        let entry_len = serialize(&entry)?.len() + usize::from(count > 0);
        if size + entry_len > PAYLOAD_CAPACITY {
            return Ok(count);
        }
        size += entry_len;
    }
    Ok(candidates.len())
}

/// Block until one full record has arrived.
///
/// Connectivity problems come back as `Network`; the bytes themselves are not
/// inspected here, so a garbled record still reads fine and fails in `decode`.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut record = vec![0u8; RECORD_SIZE];
    reader
        .read_exact(&mut record)
        .map_err(|e| LedgerError::Network(format!("Failed to read record: {e}")))?;
    Ok(record)
}
