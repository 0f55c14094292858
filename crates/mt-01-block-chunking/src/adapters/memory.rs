//! In-memory `BlockStore` with fault injection for tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::trace;

use shared_types::{BlockId, BlockSize};

use crate::domain::errors::BlockStoreError;
use crate::ports::outbound::{Block, BlockStore};

/// HashMap-backed block store.
///
/// Enforces the fixed block size and refuses to overwrite an address.
pub struct InMemoryBlockStore {
    block_size: BlockSize,
    blocks: RwLock<HashMap<BlockId, Vec<u8>>>,
    put_attempts: AtomicUsize,
    fail_next_puts: AtomicUsize,
    fail_puts_after: RwLock<Option<usize>>,
    fail_deletes: AtomicBool,
    fail_gets: AtomicBool,
}

impl InMemoryBlockStore {
    pub fn new(block_size: BlockSize) -> Self {
        Self {
            block_size,
            blocks: RwLock::new(HashMap::new()),
            put_attempts: AtomicUsize::new(0),
            fail_next_puts: AtomicUsize::new(0),
            fail_puts_after: RwLock::new(None),
            fail_deletes: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` put calls with an I/O error.
    pub fn fail_next_puts(&self, n: usize) {
        self.fail_next_puts.store(n, Ordering::SeqCst);
    }

    /// Let `n` more puts succeed, then fail every later one.
    pub fn fail_puts_after(&self, n: usize) {
        *self.fail_puts_after.write() = Some(n);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Stored bytes for `id`, bypassing fault injection.
    pub fn raw_block(&self, id: &BlockId) -> Option<Vec<u8>> {
        self.blocks.read().get(id).cloned()
    }

    /// Overwrite stored bytes in place. Used to simulate corruption.
    pub fn tamper(&self, id: &BlockId, data: Vec<u8>) {
        self.blocks.write().insert(*id, data);
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.blocks.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Total put calls seen, failed ones included.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    fn injected_put_failure(&self) -> bool {
        let pending = self.fail_next_puts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next_puts.store(pending - 1, Ordering::SeqCst);
            return true;
        }
        let mut after = self.fail_puts_after.write();
        match after.as_mut() {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }
}

fn injected(operation: &'static str) -> BlockStoreError {
    BlockStoreError::Io {
        operation,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    async fn has(&self, id: &BlockId) -> Result<bool, BlockStoreError> {
        Ok(self.contains(id))
    }

    async fn get(&self, id: &BlockId) -> Result<Block, BlockStoreError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(injected("get"));
        }
        self.blocks
            .read()
            .get(id)
            .map(|data| Block::new(*id, data.clone()))
            .ok_or(BlockStoreError::NotFound { id: *id })
    }

    async fn put(&self, block: Block) -> Result<(), BlockStoreError> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.injected_put_failure() {
            return Err(injected("put"));
        }
        let expected = self.block_size.bytes();
        if block.data.len() != expected {
            return Err(BlockStoreError::SizeMismatch {
                id: block.id,
                expected,
                actual: block.data.len(),
            });
        }
        let mut blocks = self.blocks.write();
        if blocks.contains_key(&block.id) {
            return Err(BlockStoreError::AlreadyExists { id: block.id });
        }
        trace!(block_id = %block.id, "Stored block");
        blocks.insert(block.id, block.data);
        Ok(())
    }

    async fn delete(&self, id: &BlockId) -> Result<(), BlockStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.blocks.write().remove(id);
        Ok(())
    }
}
