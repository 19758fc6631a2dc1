//! On-disk layout: one file per block, named by its content hash in hex,
//! plus a single `HEAD` file per node holding the state needed to resume
//! after a restart (mesh table, pending queue, mode). Mirrors the teacher's
//! `EcBlocks`/`BatchedBackend` trait split, but backed by real `std::fs`
//! instead of an in-memory map.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::hash::BlockHash;
use crate::mode::{CountedBlock, ModeName};
use crate::transaction::Address;

const HEAD_FILE: &str = "HEAD";

/// A directory of content-addressed block files.
#[derive(Debug)]
pub struct BlockDir {
    path: PathBuf,
}

impl BlockDir {
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(BlockDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_for(&self, hash: &BlockHash) -> PathBuf {
        self.path.join(hash.to_hex())
    }

    /// Writes a block if it isn't already on disk. Blocks are immutable
    /// once committed, so a pre-existing file is assumed identical.
    pub fn save(&self, hash: &BlockHash, block: &Block) -> crate::error::Result<()> {
        let file = self.file_for(hash);
        if file.exists() {
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(block)?;
        fs::write(file, bytes)?;
        Ok(())
    }

    pub fn load(&self, hash: &BlockHash) -> crate::error::Result<Option<Block>> {
        match fs::read(self.file_for(hash)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        hash.is_genesis() || self.file_for(hash).exists()
    }
}

pub(crate) fn save_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> crate::error::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(dir.join(name), bytes)?;
    Ok(())
}

pub(crate) fn load_json<T: DeserializeOwned>(dir: &Path, name: &str) -> crate::error::Result<Option<T>> {
    match fs::read(dir.join(name)) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Shape of a storage node's `HEAD` file.
#[derive(Debug, Serialize, Deserialize)]
pub struct StorageHead {
    pub mode: ModeName,
    pub heads: BTreeMap<Address, BlockHash>,
    pub available: bool,
    pub block_count: u64,
    pub queue: Vec<CountedBlock>,
}

impl StorageHead {
    pub fn save(dir: &Path, head: &StorageHead) -> crate::error::Result<()> {
        save_json(dir, HEAD_FILE, head)
    }

    pub fn load(dir: &Path) -> crate::error::Result<Option<StorageHead>> {
        load_json(dir, HEAD_FILE)
    }
}

/// Shape of a participant's `HEAD` file.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParticipantHead {
    pub addr: Address,
    pub sign: crate::transaction::Signature,
    pub mode: ModeName,
    pub head: BlockHash,
    pub block_count: u64,
}

impl ParticipantHead {
    pub fn save(dir: &Path, head: &ParticipantHead) -> crate::error::Result<()> {
        save_json(dir, HEAD_FILE, head)
    }

    pub fn load(dir: &Path) -> crate::error::Result<Option<ParticipantHead>> {
        load_json(dir, HEAD_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    #[test]
    fn save_is_idempotent_and_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = BlockDir::open(tmp.path()).unwrap();
        let block = Block::new(Transaction::new("alice".into(), vec![0], vec!["bob".into()], vec![]), 3);
        let hash = block.content_hash();
        dir.save(&hash, &block).unwrap();
        dir.save(&hash, &block).unwrap();
        let loaded = dir.load(&hash).unwrap().unwrap();
        assert_eq!(loaded.content_hash(), hash);
        assert!(dir.exists(&hash));
    }

    #[test]
    fn missing_block_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = BlockDir::open(tmp.path()).unwrap();
        assert_eq!(dir.load(&BlockHash::from_bytes(b"nope")).unwrap(), None);
    }
}
