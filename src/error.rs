//! Error taxonomy. Maps the four classes from the design's error-handling
//! section onto a single `thiserror`-derived enum: `Corruption` and
//! `ContractViolation` are the two that actually need to interrupt the
//! caller, while transient/warning conditions are signaled with
//! `Option`/`Ok(false)`-shaped return values instead of an `Err`.

use thiserror::Error;

use crate::hash::BlockHash;
use crate::transaction::Address;

#[derive(Debug, Error)]
pub enum BlockmeshError {
    #[error("participant {addr} is not connected to any storage")]
    NotInitialized { addr: Address },

    #[error("no such participant: {0}")]
    UnknownParticipant(Address),

    #[error("participant {addr}: stored head {stored:?} disagrees with supplied head {supplied:?}")]
    HeadMismatch { addr: Address, stored: BlockHash, supplied: BlockHash },

    #[error("storage-local invariant broken: {0}")]
    Corruption(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BlockmeshError>;
