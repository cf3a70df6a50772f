use crate::core::Transaction;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};

/// Merkle root plus the ordered batch it commits to, as carried inside a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleAggregate {
    root: String,
    transactions: Vec<Transaction>,
}

impl MerkleAggregate {
    pub fn new(transactions: Vec<Transaction>) -> MerkleAggregate {
        let root = MerkleTree::build(&transactions).get_root_hash().to_string();
        MerkleAggregate { root, transactions }
    }

    pub fn get_root(&self) -> &str {
        self.root.as_str()
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub(crate) fn transactions_mut(&mut self) -> &mut [Transaction] {
        self.transactions.as_mut_slice()
    }

    /// Recomputed root equals the stored one
    pub fn is_valid(&self) -> bool {
        MerkleTree::build(&self.transactions).get_root_hash() == self.root
    }

    pub fn proof_path(&self, target: &Transaction) -> Result<Vec<ProofElement>> {
        MerkleTree::build(&self.transactions).proof_path(target)
    }
}

/// Merkle tree kept as an arena: nodes refer to each other by index.
///
/// Leaves are `hash(identity)`, internal nodes `hash(left || right)`. A node
/// left without a partner at any level is paired with the empty string.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    nodes: Vec<MerkleNode>,
    leaves: Vec<usize>,
    root: usize,
}

#[derive(Debug, Clone)]
struct MerkleNode {
    hash: String,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofElement {
    /// Sibling hash, empty when the node had no partner
    pub hash: String,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    pub fn build(transactions: &[Transaction]) -> MerkleTree {
        let mut nodes = Vec::with_capacity(transactions.len() * 2 + 1);

        if transactions.is_empty() {
            nodes.push(MerkleNode {
                hash: sha256_hex(b""),
                parent: None,
                left: None,
                right: None,
            });
            return MerkleTree {
                nodes,
                leaves: Vec::new(),
                root: 0,
            };
        }

        for tx in transactions {
            nodes.push(MerkleNode {
                hash: Self::leaf_hash(tx),
                parent: None,
                left: None,
                right: None,
            });
        }
        let leaves: Vec<usize> = (0..transactions.len()).collect();

        let mut level = leaves.clone();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let left = pair[0];
                let right = pair.get(1).copied();
                let right_hash = right.map(|idx| nodes[idx].hash.as_str()).unwrap_or("");
                let hash = Self::hash_pair(&nodes[left].hash, right_hash);

                let parent = nodes.len();
                nodes.push(MerkleNode {
                    hash,
                    parent: None,
                    left: Some(left),
                    right,
                });
                nodes[left].parent = Some(parent);
                if let Some(right) = right {
                    nodes[right].parent = Some(parent);
                }
                next.push(parent);
            }
            level = next;
        }

        let root = level[0];
        MerkleTree {
            nodes,
            leaves,
            root,
        }
    }

    pub fn leaf_hash(tx: &Transaction) -> String {
        sha256_hex(tx.get_id().as_bytes())
    }

    fn hash_pair(left: &str, right: &str) -> String {
        let mut data = String::with_capacity(left.len() + right.len());
        data.push_str(left);
        data.push_str(right);
        sha256_hex(data.as_bytes())
    }

    pub fn get_root_hash(&self) -> &str {
        self.nodes[self.root].hash.as_str()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Sibling hashes from the target's leaf up to the root
    pub fn proof_path(&self, target: &Transaction) -> Result<Vec<ProofElement>> {
        let leaf_hash = Self::leaf_hash(target);
        let mut current = self
            .leaves
            .iter()
            .copied()
            .find(|&idx| self.nodes[idx].hash == leaf_hash)
            .ok_or_else(|| {
                LedgerError::NotFound(format!("transaction {} is not in this tree", target.get_id()))
            })?;

        let mut path = Vec::new();
        while let Some(parent) = self.nodes[current].parent {
            let node = &self.nodes[parent];
            if node.left == Some(current) {
                let hash = node
                    .right
                    .map(|idx| self.nodes[idx].hash.clone())
                    .unwrap_or_default();
                path.push(ProofElement {
                    hash,
                    is_right: true,
                });
            } else if let Some(left) = node.left {
                path.push(ProofElement {
                    hash: self.nodes[left].hash.clone(),
                    is_right: false,
                });
            }
            current = parent;
        }
        Ok(path)
    }

    /// Fold a leaf hash up the path and compare against `root`
    pub fn verify_path(leaf: &str, path: &[ProofElement], root: &str) -> bool {
        let computed = path.iter().fold(leaf.to_string(), |current, element| {
            if element.is_right {
                Self::hash_pair(&current, &element.hash)
            } else {
                Self::hash_pair(&element.hash, &current)
            }
        });
        computed == root
    }
}
