//! CRC-32 (IEEE 802.3) over chunked buffers
//!
//! Table-driven implementation of the reflected CRC-32 using polynomial
//! 0xEDB88320, initial register 0xFFFFFFFF and a final one's complement.
//!
//! Files are staged as a sequence of fixed-size buffers where only the first
//! `total_length` bytes of the concatenation are meaningful. [`compute`] walks
//! that sequence directly, so no contiguous copy of the file is ever made.
//!
//! ```rust
//! use crcscan::checksum::{compute, crc32};
//!
//! let chunks: [&[u8]; 2] = [b"ab", b"c\0"];
//! assert_eq!(compute(&chunks, 3), crc32(b"abc"));
//! assert_eq!(crc32(b"abc"), 0x352441c2);
//! ```

/// IEEE 802.3 CRC32 polynomial (reversed)
pub const POLYNOMIAL: u32 = 0xEDB8_8320;

const INITIAL: u32 = 0xFFFF_FFFF;

/// Precomputed lookup table, generated at compile time
const TABLE: [u32; 256] = generate_table();

const fn generate_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-32 state
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    register: u32,
}

impl Crc32 {
    /// Start a new checksum
    pub fn new() -> Self {
        Self { register: INITIAL }
    }

    /// Feed more bytes
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.register;
        for &byte in data {
            crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
        }
        self.register = crc;
    }

    /// Finish and return the checksum
    pub fn finalize(self) -> u32 {
        self.register ^ INITIAL
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a single contiguous slice
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// CRC-32 of the first `total_length` bytes of the concatenated `buffers`
///
/// Each buffer contributes up to its full length before the walk moves on to
/// the next one; the last buffer may be only partially used. The caller
/// guarantees the buffers hold at least `total_length` bytes. If they do not,
/// the checksum covers whatever the buffers hold.
pub fn compute<B: AsRef<[u8]>>(buffers: &[B], total_length: u64) -> u32 {
    debug_assert!(
        capacity(buffers) >= total_length,
        "buffers shorter than declared length"
    );

    let mut crc = Crc32::new();
    let mut remaining = total_length;

    for buffer in buffers {
        if remaining == 0 {
            break;
        }
        let bytes = buffer.as_ref();
        let take = bytes.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        crc.update(&bytes[..take]);
        remaining -= take as u64;
    }

    crc.finalize()
}

/// Total bytes the buffers can hold
pub fn capacity<B: AsRef<[u8]>>(buffers: &[B]) -> u64 {
    buffers.iter().map(|b| b.as_ref().len() as u64).sum()
}
