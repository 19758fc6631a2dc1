//! Transactions: one sender, an ordered set of receivers, and a signature
//! collected from every participant before the enclosing block can commit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Addresses and signatures are treated as opaque bytes/strings; the
/// blockmesh protocol never inspects a key or verifies a signature itself.
pub type Address = String;
pub type Signature = Vec<u8>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub data: Vec<u8>,
    receivers: Vec<Address>,
    signatures: BTreeMap<Address, Signature>,
}

impl Transaction {
    pub fn new(sender: Address, sender_sign: Signature, receivers: Vec<Address>, data: Vec<u8>) -> Self {
        let mut seen = std::collections::BTreeSet::new();
        let receivers: Vec<Address> = receivers
            .into_iter()
            .filter(|r| *r != sender && seen.insert(r.clone()))
            .collect();
        let mut signatures = BTreeMap::new();
        signatures.insert(sender.clone(), sender_sign);
        Transaction { sender, data, receivers, signatures }
    }

    pub fn receivers(&self) -> &[Address] {
        &self.receivers
    }

    pub fn sign(&mut self, addr: Address, signature: Signature) {
        self.signatures.insert(addr, signature);
    }

    pub fn signature_of(&self, addr: &str) -> Option<&Signature> {
        self.signatures.get(addr)
    }

    /// True once the sender and every receiver has signed.
    pub fn fully_signed(&self) -> bool {
        self.receivers.iter().all(|r| self.signatures.contains_key(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receivers_are_deduplicated_and_exclude_sender() {
        let tx = Transaction::new(
            "alice".into(),
            vec![1],
            vec!["bob".into(), "bob".into(), "alice".into(), "carol".into()],
            vec![],
        );
        assert_eq!(tx.receivers(), &["bob".to_string(), "carol".to_string()]);
    }

    #[test]
    fn fully_signed_requires_every_receiver() {
        let mut tx = Transaction::new("alice".into(), vec![1], vec!["bob".into(), "carol".into()], vec![]);
        assert!(!tx.fully_signed());
        tx.sign("bob".into(), vec![2]);
        assert!(!tx.fully_signed());
        tx.sign("carol".into(), vec![3]);
        assert!(tx.fully_signed());
    }
}
