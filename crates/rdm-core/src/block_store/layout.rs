//! On-disk layout of the 4096-byte journal record.
//!
//! All integers are little-endian. The stamp covers every byte after itself
//! (offsets 8..4096), so any change to length, mtime or bitmap must be
//! followed by [`restamp`].

use sha2::{Digest, Sha256};

/// Size of one block of the target file.
pub const BLOCK_SIZE: u64 = 4 * 1024 * 1024;
/// Size of the journal file.
pub const RECORD_SIZE: usize = 4096;

pub const MAGIC_OFFSET: usize = 0;
pub const STAMP_OFFSET: usize = 4;
pub const LENGTH_OFFSET: usize = 8;
pub const MODIFIED_OFFSET: usize = 16;
pub const RESERVED_OFFSET: usize = 24;
pub const BITMAP_OFFSET: usize = 1024;
pub const BITMAP_LEN: usize = RECORD_SIZE - BITMAP_OFFSET;

/// One bit per block.
pub const MAX_BLOCK_COUNT: u64 = (BITMAP_LEN * 8) as u64;
/// Largest target file a journal can describe (96 GiB).
pub const MAX_FILE_SIZE: u64 = BLOCK_SIZE * MAX_BLOCK_COUNT;

pub const MAGIC: u32 = u32::from_le_bytes(*b"RDJ1");

fn read_u32(record: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&record[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn read_u64(record: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&record[offset..offset + 8]);
    u64::from_le_bytes(b)
}

pub fn magic(record: &[u8]) -> u32 {
    read_u32(record, MAGIC_OFFSET)
}

pub fn set_magic(record: &mut [u8]) {
    record[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&MAGIC.to_le_bytes());
}

pub fn stamp(record: &[u8]) -> u32 {
    read_u32(record, STAMP_OFFSET)
}

pub fn total_length(record: &[u8]) -> u64 {
    read_u64(record, LENGTH_OFFSET)
}

pub fn set_total_length(record: &mut [u8], length: u64) {
    record[LENGTH_OFFSET..LENGTH_OFFSET + 8].copy_from_slice(&length.to_le_bytes());
}

/// Target mtime (unix seconds) recorded at the last journal update.
pub fn last_modified(record: &[u8]) -> i64 {
    read_u64(record, MODIFIED_OFFSET) as i64
}

pub fn set_last_modified(record: &mut [u8], secs: i64) {
    record[MODIFIED_OFFSET..MODIFIED_OFFSET + 8].copy_from_slice(&secs.to_le_bytes());
}

/// First four bytes of SHA-256 over the record body.
pub fn compute_stamp(record: &[u8]) -> u32 {
    let digest = Sha256::digest(&record[LENGTH_OFFSET..RECORD_SIZE]);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

pub fn restamp(record: &mut [u8]) {
    let s = compute_stamp(record);
    record[STAMP_OFFSET..STAMP_OFFSET + 4].copy_from_slice(&s.to_le_bytes());
}

/// True when magic and stamp agree with the record body.
pub fn is_intact(record: &[u8]) -> bool {
    record.len() == RECORD_SIZE && magic(record) == MAGIC && stamp(record) == compute_stamp(record)
}

/// Bit `id % 8` of bitmap byte `id / 8`.
pub fn is_block_set(record: &[u8], id: usize) -> bool {
    record
        .get(BITMAP_OFFSET + id / 8)
        .map(|&b| b & (1 << (id % 8)) != 0)
        .unwrap_or(false)
}

pub fn set_block(record: &mut [u8], id: usize) {
    if let Some(b) = record.get_mut(BITMAP_OFFSET + id / 8) {
        *b |= 1 << (id % 8);
    }
}

pub fn clear_bitmap(record: &mut [u8]) {
    record[BITMAP_OFFSET..RECORD_SIZE].fill(0);
}

/// Number of set bits among the first `block_count` blocks.
pub fn count_set(record: &[u8], block_count: usize) -> usize {
    (0..block_count).filter(|&id| is_block_set(record, id)).count()
}
