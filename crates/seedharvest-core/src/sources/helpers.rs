//! Shared helpers used by multiple source implementations and the platform
//! binding.

// ---------------------------------------------------------------------------
// Portable monotonic timestamp
// ---------------------------------------------------------------------------

/// Nanoseconds since a process-local epoch.
///
/// Used where the platform has no raw monotonic clock call.
pub fn monotonic_nanos() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Word packing
// ---------------------------------------------------------------------------

/// Serialize 64-bit words as little-endian bytes.
pub fn words_to_le_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

// ---------------------------------------------------------------------------
// Bulk dump header
// ---------------------------------------------------------------------------

/// Read the first machine word of `buf` as a signed, pointer-sized,
/// native-endian count. `None` if the buffer is shorter than a word.
pub fn read_leading_word(buf: &[u8]) -> Option<i64> {
    const WORD: usize = std::mem::size_of::<isize>();
    let head: [u8; WORD] = buf.get(..WORD)?.try_into().ok()?;
    Some(isize::from_ne_bytes(head) as i64)
}

/// Clamp a reported thread count into a valid credit for `len` bytes.
pub fn thread_count_credit(count: i64, len: usize) -> usize {
    if count <= 0 {
        return 0;
    }
    usize::try_from(count).map_or(len, |c| c.min(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_nanos_is_monotonic() {
        let t1 = monotonic_nanos();
        let t2 = monotonic_nanos();
        assert!(t2 >= t1);
    }

    #[test]
    fn words_pack_little_endian() {
        let bytes = words_to_le_bytes(&[0x0102, u64::MAX]);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..2], &[0x02, 0x01]);
        assert!(bytes[2..8].iter().all(|&b| b == 0));
        assert!(bytes[8..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn leading_word_roundtrips_native() {
        let mut buf = vec![0u8; 64];
        buf[..std::mem::size_of::<isize>()].copy_from_slice(&(7isize).to_ne_bytes());
        assert_eq!(read_leading_word(&buf), Some(7));
    }

    #[test]
    fn leading_word_needs_a_full_word() {
        assert_eq!(read_leading_word(&[1, 2]), None);
    }

    #[test]
    fn negative_count_gives_zero_credit() {
        assert_eq!(thread_count_credit(-3, 100), 0);
        assert_eq!(thread_count_credit(0, 100), 0);
    }

    #[test]
    fn count_is_capped_at_length() {
        assert_eq!(thread_count_credit(500, 100), 100);
        assert_eq!(thread_count_credit(42, 100), 42);
    }
}
