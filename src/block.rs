//! Blocks. Identity and equality are pinned to the fields fixed at creation
//! (`tx`, `timestamp`); `parents`, `approved`, and `on_iter` are filled in by
//! the storage node later in the block's life and must never perturb the
//! hash a block was gossiped under.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;
use crate::time::Timestamp;
use crate::transaction::{Address, Transaction};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub tx: Transaction,
    pub timestamp: Timestamp,
    /// Per-participant parent pointer, filled in at commit time.
    pub parents: BTreeMap<Address, BlockHash>,
    /// `None` until step-1 evaluates the block; `Some(false)` marks a
    /// rejection that will never be retried.
    pub approved: Option<bool>,
    /// Commit round this block landed in. Meaningless before commit.
    pub on_iter: u64,
}

impl Block {
    pub fn new(tx: Transaction, timestamp: Timestamp) -> Self {
        Block { tx, timestamp, parents: BTreeMap::new(), approved: None, on_iter: 0 }
    }

    /// Hash over the pre-commit-stable content only: `{tx, timestamp}`.
    /// Computed fresh every time rather than cached, since a block's other
    /// fields keep changing until it commits.
    pub fn content_hash(&self) -> BlockHash {
        let payload = (&self.tx, self.timestamp);
        let bytes = serde_json::to_vec(&payload).expect("tx/timestamp are always serializable");
        BlockHash::from_bytes(&bytes)
    }

    /// Sender plus every receiver, deduplicated and ordered.
    pub fn participants(&self) -> BTreeSet<Address> {
        let mut set = BTreeSet::new();
        set.insert(self.tx.sender.clone());
        set.extend(self.tx.receivers().iter().cloned());
        set
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.tx == other.tx && self.timestamp == other.timestamp
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_hash().0.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn tx(sender: &str, receivers: &[&str]) -> Transaction {
        Transaction::new(
            sender.into(),
            vec![0],
            receivers.iter().map(|s| s.to_string()).collect(),
            vec![],
        )
    }

    #[test]
    fn hash_ignores_parents_approved_and_iter() {
        let mut a = Block::new(tx("alice", &["bob"]), 10);
        let b = a.clone();
        a.parents.insert("alice".into(), BlockHash::from_bytes(b"x"));
        a.approved = Some(true);
        a.on_iter = 7;
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a, b);
    }

    #[test]
    fn different_timestamps_hash_differently() {
        let a = Block::new(tx("alice", &["bob"]), 1);
        let b = Block::new(tx("alice", &["bob"]), 2);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn participants_includes_sender_and_receivers_once() {
        let block = Block::new(tx("alice", &["bob", "carol"]), 1);
        let participants: Vec<_> = block.participants().into_iter().collect();
        assert_eq!(participants, vec!["alice".to_string(), "bob".to_string(), "carol".to_string()]);
    }
}
