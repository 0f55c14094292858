//! # Domain Layer for Block Chunking
//!
//! Pure functions with no I/O dependencies.
//!
//! - **chunker**: split/join with zero padding
//! - **header**: CBL header encoding, decoding and discrimination
//! - **errors**: codec and block store errors

pub mod chunker;
pub mod errors;
pub mod header;
