use core::cmp;

use crate::{PktBuf, Platform};

/// Compile-time shape of a chunked read: `TOTAL` bytes at most, copied in
/// `BLOCK`-sized pieces.
struct Chunks<const TOTAL: usize, const BLOCK: usize>;

impl<const TOTAL: usize, const BLOCK: usize> Chunks<TOTAL, BLOCK> {
    const FULL_BLOCKS: usize = {
        assert!(BLOCK > 0, "block size must be non-zero");
        assert!(BLOCK <= TOTAL, "block size must not exceed the buffer");
        assert!(TOTAL <= u32::MAX as usize);
        TOTAL / BLOCK
    };
}

impl<P: Platform> PktBuf<'_, P> {
    /// Copies up to `TOTAL` bytes from `offset` into `buffer`.
    ///
    /// The read stops at `data_end`. It is issued as at most `TOTAL / BLOCK`
    /// full blocks followed by one shorter tail block, so the loop count is
    /// fixed at build time. Blocks are loaded independently; a failed block
    /// leaves its part of `buffer` as it was.
    ///
    /// Returns the length of the prefix of `buffer` that holds packet bytes.
    #[inline(always)]
    pub fn read_into_buffer<const TOTAL: usize, const BLOCK: usize>(
        &self,
        offset: u32,
        buffer: &mut [u8; TOTAL],
    ) -> usize {
        let full_blocks = Chunks::<TOTAL, BLOCK>::FULL_BLOCKS;
        let end = cmp::min(offset.saturating_add(TOTAL as u32), self.data_end());

        let mut cursor = offset;
        let mut valid = 0;
        let mut intact = true;
        let mut filled = 0;

        for _ in 0..full_blocks {
            if cursor.saturating_add(BLOCK as u32) > end {
                break;
            }
            match self.load(cursor, &mut buffer[filled..filled + BLOCK]) {
                Ok(()) if intact => valid += BLOCK,
                _ => intact = false,
            }
            cursor += BLOCK as u32;
            filled += BLOCK;
        }

        if filled >= TOTAL {
            return valid;
        }
        let left = end.saturating_sub(cursor) as usize;
        if left == 0 {
            return valid;
        }

        let tail = cmp::min(left, cmp::min(TOTAL - filled, BLOCK - 1));
        if self.load(cursor, &mut buffer[filled..filled + tail]).is_ok() && intact {
            valid += tail;
        }
        valid
    }
}
