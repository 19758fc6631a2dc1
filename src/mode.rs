//! Classic vs Modified, expressed as two concrete implementations behind a
//! common interface rather than a runtime branch. A storage node holds a
//! single `Box<dyn CommitMode>` and never matches on which mode it's in.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::block::Block;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeName {
    Classic,
    Modified,
}

/// A pending block paired with its submission/gossip weight.
pub type CountedBlock = (Block, u32);

pub trait CommitMode: std::fmt::Debug {
    fn name(&self) -> ModeName;

    /// Submit (or resubmit) a block. Classic is idempotent; Modified
    /// accumulates a count used later by the quorum rule.
    fn submit(&mut self, block: Block);

    fn queue_len(&self) -> usize;

    fn queue_contains(&self, block: &Block) -> bool;

    fn remove_from_queue(&mut self, block: &Block);

    /// Snapshot of the queue, in submission order, for step-1 evaluation.
    fn queue_snapshot(&self) -> Vec<CountedBlock>;

    /// Maximum distinct blocks this node may broadcast in one step-1 pass.
    /// Classic has no cap; Modified caps at the number of homed
    /// participants (fairness).
    fn gossip_budget(&self, homed_participants: usize) -> usize;

    /// Record that `block` was gossiped — by us, or received from a peer —
    /// carrying `count` submissions worth of weight.
    fn gossip(&mut self, block: Block, count: u32);

    /// Drain the entire shared buffer for step-2 processing.
    fn drain_shared(&mut self) -> Vec<CountedBlock>;

    /// Modified withholds commit until the accumulated shared count equals
    /// the block's participant count.
    fn requires_quorum(&self) -> bool;

    fn queue_for_head_file(&self) -> Vec<CountedBlock>;

    fn restore_queue(&mut self, entries: Vec<CountedBlock>);
}

#[derive(Debug, Default)]
pub struct ClassicMode {
    queue: IndexMap<Block, u32>,
    shared: VecDeque<Block>,
}

impl ClassicMode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitMode for ClassicMode {
    fn name(&self) -> ModeName {
        ModeName::Classic
    }

    fn submit(&mut self, block: Block) {
        self.queue.entry(block).or_insert(1);
    }

    fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn queue_contains(&self, block: &Block) -> bool {
        self.queue.contains_key(block)
    }

    fn remove_from_queue(&mut self, block: &Block) {
        self.queue.shift_remove(block);
    }

    fn queue_snapshot(&self) -> Vec<CountedBlock> {
        self.queue.iter().map(|(b, c)| (b.clone(), *c)).collect()
    }

    fn gossip_budget(&self, _homed_participants: usize) -> usize {
        usize::MAX
    }

    fn gossip(&mut self, block: Block, _count: u32) {
        self.shared.push_back(block);
    }

    fn drain_shared(&mut self) -> Vec<CountedBlock> {
        self.shared.drain(..).map(|b| (b, 1)).collect()
    }

    fn requires_quorum(&self) -> bool {
        false
    }

    fn queue_for_head_file(&self) -> Vec<CountedBlock> {
        self.queue_snapshot()
    }

    fn restore_queue(&mut self, entries: Vec<CountedBlock>) {
        for (block, _) in entries {
            self.queue.entry(block).or_insert(1);
        }
    }
}

#[derive(Debug, Default)]
pub struct ModifiedMode {
    queue: IndexMap<Block, u32>,
    shared: IndexMap<Block, u32>,
}

impl ModifiedMode {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommitMode for ModifiedMode {
    fn name(&self) -> ModeName {
        ModeName::Modified
    }

    fn submit(&mut self, block: Block) {
        *self.queue.entry(block).or_insert(0) += 1;
    }

    fn queue_len(&self) -> usize {
        self.queue.values().map(|c| *c as usize).sum()
    }

    fn queue_contains(&self, block: &Block) -> bool {
        self.queue.contains_key(block)
    }

    fn remove_from_queue(&mut self, block: &Block) {
        self.queue.shift_remove(block);
    }

    fn queue_snapshot(&self) -> Vec<CountedBlock> {
        self.queue.iter().map(|(b, c)| (b.clone(), *c)).collect()
    }

    fn gossip_budget(&self, homed_participants: usize) -> usize {
        homed_participants
    }

    fn gossip(&mut self, block: Block, count: u32) {
        *self.shared.entry(block).or_insert(0) += count;
    }

    fn drain_shared(&mut self) -> Vec<CountedBlock> {
        self.shared.drain(..).collect()
    }

    fn requires_quorum(&self) -> bool {
        true
    }

    fn queue_for_head_file(&self) -> Vec<CountedBlock> {
        self.queue_snapshot()
    }

    fn restore_queue(&mut self, entries: Vec<CountedBlock>) {
        for (block, count) in entries {
            *self.queue.entry(block).or_insert(0) += count;
        }
    }
}

pub fn new_mode(name: ModeName) -> Box<dyn CommitMode> {
    match name {
        ModeName::Classic => Box::new(ClassicMode::new()),
        ModeName::Modified => Box::new(ModifiedMode::new()),
    }
}
