//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the chunking and transport layers require from the host.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use shared_types::{BlockId, BlockSize, Hash};

use crate::domain::errors::BlockStoreError;

/// A stored block: its content address and exactly `block_size` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(id: BlockId, data: Vec<u8>) -> Self {
        Self { id, data }
    }

    /// Build a block addressed by `checksum.checksum(&data)`.
    pub fn addressed(checksum: &dyn ChecksumProvider, data: Vec<u8>) -> Self {
        Self {
            id: BlockId::new(checksum.checksum(&data)),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Content-addressed block storage.
///
/// Blocks are immutable once written and every block is exactly
/// `block_size()` bytes long.
///
/// Testing: `InMemoryBlockStore` (adapters/memory.rs)
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fixed block size of this store.
    fn block_size(&self) -> BlockSize;

    async fn has(&self, id: &BlockId) -> Result<bool, BlockStoreError>;

    /// Fetch a block. `NotFound` when absent.
    async fn get(&self, id: &BlockId) -> Result<Block, BlockStoreError>;

    /// Store a block. `AlreadyExists` when the address is taken.
    async fn put(&self, block: Block) -> Result<(), BlockStoreError>;

    async fn delete(&self, id: &BlockId) -> Result<(), BlockStoreError>;
}

/// Content hash used to derive block addresses.
pub trait ChecksumProvider: Send + Sync {
    fn checksum(&self, data: &[u8]) -> Hash;

    fn verify(&self, data: &[u8], expected: &Hash) -> bool {
        &self.checksum(data) == expected
    }
}

/// SHA-256 content addresses.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256ChecksumProvider;

impl ChecksumProvider for Sha256ChecksumProvider {
    fn checksum(&self, data: &[u8]) -> Hash {
        Sha256::digest(data).into()
    }
}
