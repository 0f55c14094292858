//! Fixed-size block splitting and exact-length reassembly.

/// Number of blocks needed for `len` bytes.
///
/// Zero for empty content, otherwise `ceil(len / block_size)`.
pub fn block_count_for(len: usize, block_size: usize) -> usize {
    debug_assert!(block_size > 0, "block size must be positive");
    len.div_ceil(block_size.max(1))
}

/// Split `content` into blocks of exactly `block_size` bytes.
///
/// The final block is zero-padded on the right. Empty content yields no
/// blocks.
pub fn split_into_blocks(content: &[u8], block_size: usize) -> Vec<Vec<u8>> {
    debug_assert!(block_size > 0, "block size must be positive");
    content
        .chunks(block_size.max(1))
        .map(|chunk| {
            let mut block = Vec::with_capacity(block_size);
            block.extend_from_slice(chunk);
            block.resize(block_size, 0);
            block
        })
        .collect()
}

/// Concatenate block payloads and truncate to `original_length`.
///
/// Padding beyond `original_length` is discarded. If the blocks hold fewer
/// bytes than `original_length`, everything available is returned; callers
/// that need a hard guarantee check the total first.
pub fn join_blocks<B: AsRef<[u8]>>(blocks: &[B], original_length: usize) -> Vec<u8> {
    let mut content = Vec::with_capacity(original_length);
    for block in blocks {
        let remaining = original_length - content.len();
        if remaining == 0 {
            break;
        }
        let bytes = block.as_ref();
        content.extend_from_slice(&bytes[..remaining.min(bytes.len())]);
    }
    content
}
