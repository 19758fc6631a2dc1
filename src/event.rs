//! Structured observability, mirroring the teacher's `Event`/`EventSink`
//! split: callers who want structured telemetry implement `EventSink`,
//! everyone else gets `NoOpSink` plus ordinary `log` lines.

use crate::hash::BlockHash;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    BlockQueued { hash: BlockHash, participants: usize },
    BlockGossiped { hash: BlockHash },
    BlockRejected { hash: BlockHash },
    BlockCommitted { hash: BlockHash, on_iter: u64, participants: usize },
    MeshJoined { peers: usize },
    MeshRefreshed { fetched: usize },
}

pub trait EventSink {
    fn log(&mut self, time: Timestamp, event: Event);
}

#[derive(Debug, Default)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: Timestamp, _event: Event) {}
}

/// Forwards every event to the `log` crate at an appropriate level.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn log(&mut self, time: Timestamp, event: Event) {
        match &event {
            Event::BlockRejected { hash } => log::warn!("t={time} block {hash:?} rejected"),
            Event::BlockCommitted { hash, on_iter, participants } => {
                log::info!("t={time} committed {hash:?} on_iter={on_iter} participants={participants}")
            }
            Event::MeshRefreshed { fetched } => log::debug!("t={time} mesh refresh fetched {fetched} blocks"),
            _ => log::debug!("t={time} {event:?}"),
        }
    }
}
