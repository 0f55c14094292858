//! Port traits (outbound SPI) for block chunking.

pub mod outbound;
