//! Content-addressing for blocks.
//!
//! Blocks are identified by a blake3 digest of their pre-commit-stable
//! content (see `block::Block::content_hash`). `GENESIS_BLOCK` is the
//! sentinel meaning "no parent yet".

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

/// Sentinel parent value meaning "no block yet".
pub const GENESIS_BLOCK: BlockHash = BlockHash([0u8; 32]);

impl BlockHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        BlockHash(*blake3::hash(bytes).as_bytes())
    }

    pub fn is_genesis(&self) -> bool {
        *self == GENESIS_BLOCK
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex_decode(s)?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(BlockHash(out))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_genesis() {
            write!(f, "GENESIS")
        } else {
            write!(f, "{}", &self.to_hex()[..12])
        }
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
