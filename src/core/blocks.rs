//! Splitting file content into transfer blocks and joining it back.

/// Size of a full DATA payload. A shorter payload ends the transfer.
pub const BLOCK_SIZE: usize = 512;

/// Number of DATA packets needed to carry `size` bytes.
///
/// A transfer always ends with a short block, so an exact multiple of
/// [`BLOCK_SIZE`] (including zero) needs one extra, empty block.
pub fn number_of_blocks(size: usize) -> usize {
    size / BLOCK_SIZE + 1
}

/// Split `content` into the ordered blocks of a transfer.
pub fn split(content: &[u8]) -> Vec<&[u8]> {
    let mut blocks: Vec<&[u8]> = content.chunks(BLOCK_SIZE).collect();
    if content.len() % BLOCK_SIZE == 0 {
        blocks.push(&[]);
    }
    blocks
}

/// Concatenate block payloads received in order.
pub fn reassemble<I, B>(blocks: I) -> Vec<u8>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut content = Vec::new();
    for block in blocks {
        content.extend_from_slice(block.as_ref());
    }
    content
}

/// Block number of the block at `index` (0-based), wrapping at 65536.
pub fn block_number(index: usize) -> u16 {
    ((index + 1) % 65536) as u16
}
