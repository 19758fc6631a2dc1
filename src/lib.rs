//! # blockmesh
//!
//! Per-participant linear chains woven together by multi-party blocks,
//! replicated across storage nodes via a two-phase gossip/commit protocol.
//!
//! ## Core components
//!
//! - [`storage::Storage`]: the two-phase commit coordinator and mesh peer
//! - [`participant::Participant`]: the client side — signing, submitting,
//!   chain checks
//! - [`block::Block`] / [`transaction::Transaction`]: the data model
//! - [`mode`]: Classic vs Modified, as two implementations behind one trait
//! - [`disk`]: content-addressed block files plus a per-node `HEAD` file
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use blockmesh::{LogicalClock, ModeName, Participant, Storage};
//!
//! let clock = Rc::new(LogicalClock::new());
//! let stg = Storage::new(ModeName::Classic, "/tmp/blockmesh-demo/stg", clock.clone()).unwrap();
//! let alice = Participant::new(ModeName::Classic, "/tmp/blockmesh-demo/alice", "alice".into(), vec![1], &stg).unwrap();
//!
//! // External driver advances logical time and ticks the two phases:
//! clock.advance_to(1);
//! Storage::gossip_round(&stg).unwrap();
//! Storage::commit_round(&stg, 1).unwrap();
//! ```

pub mod block;
pub mod disk;
pub mod error;
pub mod event;
pub mod hash;
pub mod mode;
pub mod participant;
pub mod storage;
pub mod time;
pub mod transaction;
pub mod validation;

pub use block::Block;
pub use error::{BlockmeshError, Result};
pub use event::{Event, EventSink, LogSink, NoOpSink};
pub use hash::{BlockHash, GENESIS_BLOCK};
pub use mode::{CommitMode, ModeName};
pub use participant::Participant;
pub use storage::Storage;
pub use time::{LogicalClock, TimeSource, Timestamp};
pub use transaction::{Address, Signature, Transaction};
pub use validation::Validator;
