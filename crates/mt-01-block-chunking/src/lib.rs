//! # Block Chunking (mt-01)
//!
//! Splits payloads into fixed-size content-addressed blocks and describes
//! them with a compact Constituent Block List (CBL) header.
//!
//! ## Architecture Role
//!
//! ```text
//! [Message Transport (2)] ──split/encode──→ [Block Chunking (1)]
//!                                                  │
//!                                                  ↓ put/get/delete
//!                                            [BlockStore port]
//! ```
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Description |
//! |----|-----------|-------------|
//! | 1 | Block count | `ceil(len / block_size)`, zero blocks for empty content |
//! | 2 | Padding | Final block zero-padded to exactly `block_size` |
//! | 3 | Exact join | `join(split(x), len(x)) == x` |
//! | 4 | Header round-trip | `decode(encode(h)) == h` |
//! | 5 | Cheap discriminator | Message headers recognisable from a 4-byte prefix |
//! | 6 | Indexed headers | Headers over one block are segmented behind an index block |
//!
//! ## Crate Structure
//!
//! - `domain/` - chunker, CBL header codec, errors (pure, no I/O)
//! - `ports/` - `BlockStore` and `ChecksumProvider` contracts
//! - `adapters/` - in-memory block store

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::memory::InMemoryBlockStore;
pub use domain::chunker::{block_count_for, join_blocks, split_into_blocks};
pub use domain::errors::{BlockStoreError, CodecError};
pub use domain::header::{
    decode_header, decode_header_block, encode_header, encode_header_index, encoded_header_len,
    is_message_header, CblHeader, HeaderBlock, HeaderIndex, MessageHeaderFields,
    HEADER_FIXED_LEN, HEADER_MAGIC, HEADER_VERSION, MAX_HEADER_DEPTH,
};
pub use ports::outbound::{Block, BlockStore, ChecksumProvider, Sha256ChecksumProvider};
