//! The validation predicate is a capability handed to a storage node at
//! construction, not a hardcoded rule: any `Fn(&Block) -> bool` closure
//! works, so tests can swap in adversarial predicates without touching the
//! storage's commit logic.

use crate::block::Block;
use crate::transaction::Address;

pub type Validator = Box<dyn Fn(&Block) -> bool>;

/// Accepts everything that hasn't already been marked rejected.
pub fn accept_all() -> Validator {
    Box::new(|block| block.approved != Some(false))
}

/// Rejects everything. Useful for exercising the step-1 rejection path.
pub fn reject_all() -> Validator {
    Box::new(|_| false)
}

/// Rejects any block sent by `addr`, accepts everything else.
pub fn reject_sender(addr: Address) -> Validator {
    Box::new(move |block| block.tx.sender != addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn sample(sender: &str) -> Block {
        Block::new(Transaction::new(sender.into(), vec![0], vec!["bob".into()], vec![]), 1)
    }

    #[test]
    fn reject_sender_only_blocks_that_sender() {
        let v = reject_sender("alice".into());
        assert!(!v(&sample("alice")));
        assert!(v(&sample("bob")));
    }
}
