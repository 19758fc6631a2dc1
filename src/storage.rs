//! The storage node: two-phase commit coordinator, mesh peer, and home for
//! a set of participants. Mirrors the teacher's `EcNode` — a `Rc<RefCell<_>>`
//! aggregate driven by an external tick loop — generalized from the token
//! ring to the blockmesh protocol.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::rc::{Rc, Weak};

use crate::block::Block;
use crate::disk::{BlockDir, StorageHead};
use crate::error::{BlockmeshError, Result};
use crate::event::{Event, EventSink, NoOpSink};
use crate::hash::{BlockHash, GENESIS_BLOCK};
use crate::mode::{new_mode, CommitMode, ModeName};
use crate::participant::Participant;
use crate::time::{Timestamp, TimeSource};
use crate::transaction::Address;
use crate::validation::{accept_all, Validator};

pub struct Storage {
    mode: Box<dyn CommitMode>,
    dir: BlockDir,
    peers: Vec<Weak<RefCell<Storage>>>,
    users: BTreeMap<Address, Rc<RefCell<Participant>>>,
    block_mesh: BTreeMap<Address, BlockHash>,
    block_count: u64,
    available: bool,
    time: Rc<dyn TimeSource>,
    validator: Validator,
    event_sink: Box<dyn EventSink>,
}

impl Storage {
    pub fn new(
        mode: ModeName,
        dir: impl AsRef<Path>,
        time: Rc<dyn TimeSource>,
    ) -> Result<Rc<RefCell<Storage>>> {
        Storage::new_with(mode, dir, time, accept_all(), Box::new(NoOpSink))
    }

    pub fn new_with(
        mode: ModeName,
        dir: impl AsRef<Path>,
        time: Rc<dyn TimeSource>,
        validator: Validator,
        event_sink: Box<dyn EventSink>,
    ) -> Result<Rc<RefCell<Storage>>> {
        let dir = BlockDir::open(dir)?;
        Ok(Rc::new(RefCell::new(Storage {
            mode: new_mode(mode),
            dir,
            peers: Vec::new(),
            users: BTreeMap::new(),
            block_mesh: BTreeMap::new(),
            block_count: 1,
            available: true,
            time,
            validator,
            event_sink,
        })))
    }

    pub fn mode(&self) -> ModeName {
        self.mode.name()
    }

    pub fn available(&self) -> bool {
        self.available
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn queue_len(&self) -> usize {
        self.mode.queue_len()
    }

    pub fn head_of(&self, addr: &str) -> Option<BlockHash> {
        self.block_mesh.get(addr).copied()
    }

    pub fn time_now(&self) -> Timestamp {
        self.time.time()
    }

    pub fn disable(&mut self) {
        self.available = false;
    }

    pub fn enable(self_rc: &Rc<RefCell<Storage>>) -> Result<()> {
        let was_available = self_rc.borrow().available;
        if !was_available {
            Storage::refresh_blocks(self_rc)?;
            self_rc.borrow_mut().available = true;
        }
        Ok(())
    }

    /// Joins `a`'s mesh to `b`'s, merging peer lists symmetrically. `a` must
    /// not already belong to a mesh.
    pub fn join(a: &Rc<RefCell<Storage>>, b: &Rc<RefCell<Storage>>) -> Result<()> {
        if !a.borrow().peers.is_empty() {
            return Err(BlockmeshError::ContractViolation("storage already belongs to a mesh".into()));
        }
        let mut new_peers = vec![Rc::clone(b)];
        new_peers.extend(b.borrow().peers.iter().filter_map(Weak::upgrade));

        for peer in &new_peers {
            a.borrow_mut().peers.push(Rc::downgrade(peer));
            peer.borrow_mut().peers.push(Rc::downgrade(a));
        }
        let peer_count = a.borrow().peers.len();
        let now = a.borrow().time.time();
        a.borrow_mut().event_sink.log(now, Event::MeshJoined { peers: peer_count });
        Storage::refresh_blocks(a)
    }

    /// Rebuilds the local reachable-block index by walking `block_mesh`
    /// back through parents to `GENESIS_BLOCK`.
    fn index_blocks(self_rc: &Rc<RefCell<Storage>>) -> Result<HashSet<BlockHash>> {
        let s = self_rc.borrow();
        let mut index = HashSet::new();
        index.insert(GENESIS_BLOCK);
        let mut frontier: Vec<BlockHash> = s.block_mesh.values().copied().collect();
        while let Some(hash) = frontier.pop() {
            if hash.is_genesis() || !index.insert(hash) {
                continue;
            }
            let block = s
                .dir
                .load(&hash)?
                .ok_or_else(|| BlockmeshError::Corruption(format!("block {hash:?} referenced by mesh is missing")))?;
            frontier.extend(block.parents.values().copied());
        }
        Ok(index)
    }

    /// Finds the first available peer, diffs its reachable-block index
    /// against ours, and fetches whatever is missing.
    pub fn refresh_blocks(self_rc: &Rc<RefCell<Storage>>) -> Result<()> {
        let self_index = Storage::index_blocks(self_rc)?;
        let peers: Vec<_> = self_rc.borrow().peers.iter().filter_map(Weak::upgrade).collect();

        let mut chosen = None;
        for peer in &peers {
            if peer.borrow().available {
                chosen = Some(Rc::clone(peer));
                break;
            }
        }
        let Some(peer) = chosen else {
            log::warn!("refresh_blocks: no available peer to refresh from");
            return Ok(());
        };

        let peer_index = Storage::index_blocks(&peer)?;
        if self_index == peer_index {
            return Ok(());
        }

        let missing: Vec<BlockHash> = peer_index.difference(&self_index).copied().collect();
        let mut fetched = 0usize;
        for hash in &missing {
            let block = peer
                .borrow()
                .dir
                .load(hash)?
                .ok_or_else(|| BlockmeshError::Corruption(format!("peer claims {hash:?} but cannot produce it")))?;
            self_rc.borrow().dir.save(hash, &block)?;
            fetched += 1;
        }

        let peer_mesh = peer.borrow().block_mesh.clone();
        self_rc.borrow_mut().block_mesh = peer_mesh;

        let rebuilt = Storage::index_blocks(self_rc)?;
        if rebuilt != peer_index {
            self_rc.borrow_mut().available = false;
            return Err(BlockmeshError::Corruption(
                "local blockmesh diverged from peer even after refresh".into(),
            ));
        }

        let mut s = self_rc.borrow_mut();
        s.block_count = rebuilt.len() as u64;
        let now = s.time.time();
        s.event_sink.log(now, Event::MeshRefreshed { fetched });
        Ok(())
    }

    /// Registers `participant` as homed here. New addresses start at
    /// `GENESIS_BLOCK` across the whole mesh; known addresses have their
    /// local head overwritten with the mesh's authoritative record, and a
    /// disagreeing non-empty supplied head is a hard error.
    pub fn connect_user(self_rc: &Rc<RefCell<Storage>>, participant: &Rc<RefCell<Participant>>) -> Result<()> {
        let addr = participant.borrow().addr.clone();
        let supplied_head = participant.borrow().head;

        let (resolved_head, new_peers) = {
            let mut s = self_rc.borrow_mut();
            let existing = s.users.entry(addr.clone()).or_insert_with(|| Rc::clone(participant)).clone();
            let existing_head = existing.borrow().head;
            if existing_head != supplied_head {
                return Err(BlockmeshError::HeadMismatch { addr, stored: existing_head, supplied: supplied_head });
            }

            if let Some(&mesh_head) = s.block_mesh.get(&addr) {
                (mesh_head, Vec::new())
            } else {
                s.block_mesh.insert(addr.clone(), GENESIS_BLOCK);
                let peer_refs: Vec<_> = s.peers.iter().filter_map(Weak::upgrade).collect();
                (GENESIS_BLOCK, peer_refs)
            }
        };

        for peer in &new_peers {
            peer.borrow_mut().block_mesh.insert(addr.clone(), GENESIS_BLOCK);
        }

        participant.borrow_mut().head = resolved_head;
        participant.borrow_mut().inited = true;
        Ok(())
    }

    pub fn disconnect_user(&mut self, addr: &str) -> Result<()> {
        self.users
            .remove(addr)
            .map(|_| ())
            .ok_or_else(|| BlockmeshError::UnknownParticipant(addr.to_string()))
    }

    /// Resolves a batch of addresses to their homed `Participant`, searching
    /// peers if not homed locally. Fails the whole call if any address is
    /// nowhere to be found; an individual `None` means a peer that holds it
    /// is currently disabled (transient, not fatal).
    pub fn get_users(
        self_rc: &Rc<RefCell<Storage>>,
        addrs: &[Address],
    ) -> Result<Vec<Option<Rc<RefCell<Participant>>>>> {
        if !self_rc.borrow().available {
            return Err(BlockmeshError::ContractViolation("storage is disabled".into()));
        }
        if addrs.is_empty() {
            return Err(BlockmeshError::ContractViolation("get_users called with no addresses".into()));
        }
        addrs.iter().map(|a| Storage::request_user(self_rc, a)).collect()
    }

    fn request_user(self_rc: &Rc<RefCell<Storage>>, addr: &str) -> Result<Option<Rc<RefCell<Participant>>>> {
        if let Some(u) = self_rc.borrow().users.get(addr) {
            return Ok(Some(Rc::clone(u)));
        }
        let peers: Vec<_> = self_rc.borrow().peers.iter().filter_map(Weak::upgrade).collect();
        let mut any_unavailable = false;
        for peer in &peers {
            let p = peer.borrow();
            if !p.available {
                any_unavailable = true;
                continue;
            }
            if let Some(u) = p.users.get(addr) {
                return Ok(Some(Rc::clone(u)));
            }
        }
        if any_unavailable {
            Ok(None)
        } else {
            Err(BlockmeshError::UnknownParticipant(addr.to_string()))
        }
    }

    pub fn add_new_block(&mut self, block: Block) -> Result<()> {
        if !self.available {
            return Err(BlockmeshError::ContractViolation("storage is disabled".into()));
        }
        let hash = block.content_hash();
        let participants = block.participants().len();
        self.mode.submit(block);
        let now = self.time.time();
        self.event_sink.log(now, Event::BlockQueued { hash, participants });
        Ok(())
    }

    /// Step 1: evaluate the queue against the validation predicate and
    /// gossip everything that passes, up to the mode's fairness budget.
    pub fn gossip_round(self_rc: &Rc<RefCell<Storage>>) -> Result<()> {
        if !self_rc.borrow().available {
            return Ok(());
        }
        let (candidates, budget) = {
            let s = self_rc.borrow();
            (s.mode.queue_snapshot(), s.mode.gossip_budget(s.users.len()))
        };

        let mut sent = 0usize;
        for (mut block, count) in candidates {
            if sent >= budget {
                break;
            }
            let approved = { (self_rc.borrow().validator)(&block) };
            if !approved {
                block.approved = Some(false);
                let hash = block.content_hash();
                self_rc.borrow_mut().mode.remove_from_queue(&block);
                Storage::deliver_rejection(self_rc, &block)?;
                let now = self_rc.borrow().time.time();
                self_rc.borrow_mut().event_sink.log(now, Event::BlockRejected { hash });
                continue;
            }

            block.approved = Some(true);
            let hash = block.content_hash();
            self_rc.borrow_mut().mode.gossip(block.clone(), count);

            let peers: Vec<_> = self_rc.borrow().peers.iter().filter_map(Weak::upgrade).collect();
            for peer in &peers {
                if peer.borrow().available {
                    peer.borrow_mut().mode.gossip(block.clone(), count);
                }
            }

            let now = self_rc.borrow().time.time();
            self_rc.borrow_mut().event_sink.log(now, Event::BlockGossiped { hash });
            sent += 1;
        }
        Ok(())
    }

    fn deliver_rejection(self_rc: &Rc<RefCell<Storage>>, block: &Block) -> Result<()> {
        let participant = self_rc.borrow().users.get(&block.tx.sender).cloned();
        if let Some(p) = participant {
            p.borrow_mut().receive_from_stg(block)?;
        }
        Ok(())
    }

    /// Step 2: drain the shared buffer, order deterministically by
    /// `(timestamp, content hash)`, and commit every block whose
    /// participants don't conflict with one already committed this round.
    pub fn commit_round(self_rc: &Rc<RefCell<Storage>>, iteration: u64) -> Result<()> {
        if !self_rc.borrow().available {
            return Ok(());
        }
        let mut candidates = self_rc.borrow_mut().mode.drain_shared();
        if candidates.is_empty() {
            return Ok(());
        }
        candidates.sort_by(|(a, _), (b, _)| a.timestamp.cmp(&b.timestamp).then_with(|| a.content_hash().cmp(&b.content_hash())));

        let requires_quorum = self_rc.borrow().mode.requires_quorum();
        let mut round_participants: BTreeSet<Address> = BTreeSet::new();

        for (mut block, count) in candidates {
            let participants = block.participants();

            if requires_quorum && count as usize != participants.len() {
                continue;
            }
            if participants.iter().any(|p| round_participants.contains(p)) {
                continue;
            }

            let parents: BTreeMap<Address, BlockHash> = participants
                .iter()
                .map(|p| (p.clone(), self_rc.borrow().block_mesh.get(p).copied().unwrap_or(GENESIS_BLOCK)))
                .collect();
            block.parents = parents;
            block.on_iter = iteration;
            let hash = block.content_hash();

            self_rc.borrow().dir.save(&hash, &block)?;

            for p in &participants {
                self_rc.borrow_mut().block_mesh.insert(p.clone(), hash);
                let maybe_user = self_rc.borrow().users.get(p).cloned();
                if let Some(u) = maybe_user {
                    u.borrow_mut().receive_from_stg(&block)?;
                }
            }

            {
                let mut s = self_rc.borrow_mut();
                s.block_count += 1;
                s.mode.remove_from_queue(&block);
                let now = s.time.time();
                s.event_sink.log(now, Event::BlockCommitted { hash, on_iter: iteration, participants: participants.len() });
            }

            round_participants.extend(participants);
        }
        Ok(())
    }

    pub fn save_head(&self) -> Result<()> {
        let head = StorageHead {
            mode: self.mode.name(),
            heads: self.block_mesh.clone(),
            available: self.available,
            block_count: self.block_count,
            queue: self.mode.queue_for_head_file(),
        };
        StorageHead::save(self.dir.path(), &head)
    }

    pub fn load(dir: impl AsRef<Path>, time: Rc<dyn TimeSource>, validator: Validator) -> Result<Rc<RefCell<Storage>>> {
        Storage::load_with(dir, time, validator, Box::new(NoOpSink))
    }

    pub fn load_with(
        dir: impl AsRef<Path>,
        time: Rc<dyn TimeSource>,
        validator: Validator,
        event_sink: Box<dyn EventSink>,
    ) -> Result<Rc<RefCell<Storage>>> {
        let block_dir = BlockDir::open(dir.as_ref())?;
        let head = StorageHead::load(dir.as_ref())?;
        let (mode_name, heads, available, block_count, queue) = match head {
            Some(h) => (h.mode, h.heads, h.available, h.block_count, h.queue),
            None => (ModeName::Classic, BTreeMap::new(), true, 1, Vec::new()),
        };
        let mut mode = new_mode(mode_name);
        mode.restore_queue(queue);

        Ok(Rc::new(RefCell::new(Storage {
            mode,
            dir: block_dir,
            peers: Vec::new(),
            users: BTreeMap::new(),
            block_mesh: heads,
            block_count,
            available,
            time,
            validator,
            event_sink,
        })))
    }
}
