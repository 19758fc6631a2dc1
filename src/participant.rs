//! A participant: the client side of the protocol. Holds its own local
//! chain-tail directory (so `check_chain` can walk ancestors independent of
//! any storage node) and a weak reference to its home storage.

use std::cell::RefCell;
use std::path::Path;
use std::rc::{Rc, Weak};

use crate::block::Block;
use crate::disk::{BlockDir, ParticipantHead};
use crate::error::{BlockmeshError, Result};
use crate::hash::{BlockHash, GENESIS_BLOCK};
use crate::mode::ModeName;
use crate::storage::Storage;
use crate::transaction::{Address, Signature, Transaction};

pub struct Participant {
    mode: ModeName,
    dir: BlockDir,
    pub(crate) addr: Address,
    sign: Signature,
    home: Weak<RefCell<Storage>>,
    pub(crate) head: BlockHash,
    block_count: u64,
    pub(crate) inited: bool,
    /// Modified mode only: re-armed each time this participant's own block
    /// lands back on its chain, so it can't flood the mesh with more than
    /// one outstanding proposal.
    generation_allowed: bool,
}

impl Participant {
    pub fn new(
        mode: ModeName,
        dir: impl AsRef<Path>,
        addr: Address,
        sign: Signature,
        home: &Rc<RefCell<Storage>>,
    ) -> Result<Rc<RefCell<Participant>>> {
        let participant = Rc::new(RefCell::new(Participant {
            mode,
            dir: BlockDir::open(dir)?,
            addr,
            sign,
            home: Rc::downgrade(home),
            head: GENESIS_BLOCK,
            block_count: 0,
            inited: false,
            generation_allowed: true,
        }));
        Storage::connect_user(home, &participant)?;
        Ok(participant)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn head(&self) -> BlockHash {
        self.head
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub fn is_initialized(&self) -> bool {
        self.inited
    }

    /// Adds this participant's signature to `tx` and returns the current
    /// head, which the caller threads through as a parent pointer.
    pub fn sign_tx(&self, tx: &mut Transaction) -> Result<BlockHash> {
        if !self.inited {
            return Err(BlockmeshError::NotInitialized { addr: self.addr.clone() });
        }
        tx.sign(self.addr.clone(), self.sign.clone());
        Ok(self.head)
    }

    /// Called by a storage node once a block involving this participant is
    /// either rejected (no-op here) or committed. On commit, persists the
    /// block to the participant's own chain directory and advances `head`.
    pub fn receive_from_stg(&mut self, block: &Block) -> Result<()> {
        if block.approved != Some(true) {
            return Ok(());
        }
        if !self.check_chain(block)? {
            return Ok(());
        }

        let hash = block.content_hash();
        self.dir.save(&hash, block)?;
        self.head = hash;
        self.block_count += 1;

        if self.mode == ModeName::Modified && block.tx.sender == self.addr {
            self.generation_allowed = true;
        }
        Ok(())
    }

    /// Verifies `block`'s parent pointer for this participant matches the
    /// current head, then walks every ancestor back to genesis, confirming
    /// each one is readable. A broken link in the middle of the chain
    /// raises; a missing file simply refuses the commit (caller retries
    /// later once mesh refresh has caught it up).
    fn check_chain(&self, block: &Block) -> Result<bool> {
        let parent = block.parents.get(&self.addr).copied().ok_or_else(|| {
            BlockmeshError::Corruption(format!("block has no parent entry for {}", self.addr))
        })?;
        if parent != self.head {
            return Err(BlockmeshError::Corruption(format!(
                "chain-link mismatch for {}: block parent {parent:?} != local head {:?}",
                self.addr, self.head
            )));
        }

        let mut cursor = self.head;
        while !cursor.is_genesis() {
            match self.dir.load(&cursor)? {
                Some(b) => {
                    cursor = *b.parents.get(&self.addr).ok_or_else(|| {
                        BlockmeshError::Corruption(format!("chain block missing parent entry for {}", self.addr))
                    })?;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Builds a transaction to `receivers`, collects their signatures,
    /// submits it to the home storage, and returns the block's content
    /// hash — or `None` if the attempt is silently dropped (storage
    /// disabled, a receiver unreachable, or Modified-mode generation is
    /// still throttled).
    pub fn perform(self_rc: &Rc<RefCell<Participant>>, receivers: Vec<Address>, data: Vec<u8>) -> Result<Option<BlockHash>> {
        let (inited, addr, home, mode, generation_allowed) = {
            let p = self_rc.borrow();
            (p.inited, p.addr.clone(), p.home.upgrade(), p.mode, p.generation_allowed)
        };
        if !inited {
            return Err(BlockmeshError::NotInitialized { addr });
        }
        let home = home.ok_or_else(|| BlockmeshError::ContractViolation("home storage has been dropped".into()))?;
        if !home.borrow().available() {
            return Ok(None);
        }
        if mode == ModeName::Modified && !generation_allowed {
            return Ok(None);
        }

        let hash = match Participant::build_and_submit(self_rc, &home, receivers, data)? {
            Some(hash) => hash,
            None => return Ok(None),
        };

        if mode == ModeName::Modified {
            self_rc.borrow_mut().generation_allowed = false;
        }
        Ok(Some(hash))
    }

    fn build_and_submit(
        self_rc: &Rc<RefCell<Participant>>,
        home: &Rc<RefCell<Storage>>,
        receivers: Vec<Address>,
        data: Vec<u8>,
    ) -> Result<Option<BlockHash>> {
        let (addr, sign, mode) = {
            let p = self_rc.borrow();
            (p.addr.clone(), p.sign.clone(), p.mode)
        };
        let mut tx = Transaction::new(addr, sign, receivers.clone(), data);

        let resolved = Storage::get_users(home, tx.receivers().to_vec().as_slice())?;
        let mut receiver_homes = Vec::new();
        for maybe in &resolved {
            match maybe {
                None => return Ok(None),
                Some(participant) => {
                    participant.borrow().sign_tx(&mut tx)?;
                    if let Some(h) = participant.borrow().home.upgrade() {
                        receiver_homes.push(h);
                    }
                }
            }
        }

        let time = home.borrow().time_now();
        let block = Block::new(tx, time);
        let hash = block.content_hash();
        home.borrow_mut().add_new_block(block.clone())?;

        // Modified mode needs every participant's home to independently
        // queue (and later gossip) the same block so the quorum count can
        // reach the participant total; Classic only needs the sender's copy.
        if mode == ModeName::Modified {
            for receiver_home in receiver_homes {
                receiver_home.borrow_mut().add_new_block(block.clone())?;
            }
        }
        Ok(Some(hash))
    }

    pub fn save_head(&self) -> Result<()> {
        let head = ParticipantHead {
            addr: self.addr.clone(),
            sign: self.sign.clone(),
            mode: self.mode,
            head: self.head,
            block_count: self.block_count,
        };
        ParticipantHead::save(self.dir.path(), &head)
    }

    /// Restores a participant from its `HEAD` file. Mode, address, and
    /// signature come back from disk rather than being supplied again.
    pub fn load(dir: impl AsRef<Path>, home: &Rc<RefCell<Storage>>) -> Result<Rc<RefCell<Participant>>> {
        let block_dir = BlockDir::open(dir.as_ref())?;
        let saved = ParticipantHead::load(dir.as_ref())?
            .ok_or_else(|| BlockmeshError::ContractViolation("no participant HEAD file to load".into()))?;

        let participant = Rc::new(RefCell::new(Participant {
            mode: saved.mode,
            dir: block_dir,
            addr: saved.addr,
            sign: saved.sign,
            home: Rc::downgrade(home),
            head: saved.head,
            block_count: saved.block_count,
            inited: false,
            generation_allowed: true,
        }));
        Storage::connect_user(home, &participant)?;
        Ok(participant)
    }
}
