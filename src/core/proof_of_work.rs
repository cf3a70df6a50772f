use crate::core::Block;
use crate::utils::hex8;
use data_encoding::HEXLOWER;
use ring::digest::{Context, SHA256};

/// Nonce search for one block header.
///
/// The hashed text is `previous_hash || merkle_root || hex8(timestamp) ||
/// hex8(difficulty) || hex8(nonce)`; a hash is accepted when its hex form has
/// exactly `difficulty` leading zeros.
pub struct ProofOfWork {
    prefix: Context,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> ProofOfWork {
        let mut prefix = Context::new(&SHA256);
        prefix.update(block.get_previous_hash().as_bytes());
        prefix.update(block.get_merkle_root().as_bytes());
        prefix.update(hex8(block.get_timestamp()).as_bytes());
        prefix.update(hex8(u64::from(block.get_difficulty())).as_bytes());
        ProofOfWork {
            prefix,
            difficulty: block.get_difficulty(),
        }
    }

    /// Validate proof-of-work for a block
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block);
        let digest = pow.digest(block.get_nonce());
        leading_zero_nibbles(&digest) == pow.difficulty as usize
    }

    fn digest(&self, nonce: u32) -> Vec<u8> {
        let mut context = self.prefix.clone();
        context.update(hex8(u64::from(nonce)).as_bytes());
        context.finish().as_ref().to_vec()
    }

    pub fn hash_with_nonce(&self, nonce: u32) -> String {
        HEXLOWER.encode(&self.digest(nonce))
    }

    /// Walk the whole nonce space from 0; `None` once it is exhausted
    pub fn run(&self) -> Option<(u32, String)> {
        let target = self.difficulty as usize;
        let mut nonce: u32 = 0;
        loop {
            let digest = self.digest(nonce);
            if leading_zero_nibbles(&digest) == target {
                return Some((nonce, HEXLOWER.encode(&digest)));
            }
            nonce = nonce.checked_add(1)?;
        }
    }
}

/// Count of leading `'0'` characters in a hex hash
pub fn count_leading_zeros(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

// Same count as `count_leading_zeros` on the hex form, without encoding it
fn leading_zero_nibbles(digest: &[u8]) -> usize {
    let mut zeros = 0;
    for byte in digest {
        if *byte == 0 {
            zeros += 2;
            continue;
        }
        if *byte < 0x10 {
            zeros += 1;
        }
        break;
    }
    zeros
}
