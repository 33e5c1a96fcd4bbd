//! Chunk type and fixed-size range planning.

/// A single planned range: byte interval [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Chunk {
    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// HTTP Range header value (inclusive end): `bytes=start-(end-1)`.
    pub fn range_header_value(&self) -> String {
        if self.is_empty() {
            "bytes=0-0".to_string()
        } else {
            format!("bytes={}-{}", self.start, self.end - 1)
        }
    }
}

/// Splits `total_size` into consecutive chunks of `chunk_size` bytes.
///
/// Every chunk but the last is exactly `chunk_size` long; the last one takes
/// the remainder. Returns an empty vec if `total_size` or `chunk_size` is 0.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<Chunk> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total_size.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total_size {
        let end = offset.saturating_add(chunk_size).min(total_size);
        out.push(Chunk { start: offset, end });
        offset = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn assert_partitions(chunks: &[Chunk], total: u64) {
        let mut expected_start = 0;
        for c in chunks {
            assert_eq!(c.start, expected_start, "gap or overlap at {}", c.start);
            assert!(c.end > c.start);
            expected_start = c.end;
        }
        assert_eq!(expected_start, total);
    }

    #[test]
    fn hundred_mib_in_ten_mib_chunks() {
        let chunks = plan_chunks(100 * MIB, 10 * MIB);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.len() == 10 * MIB));
        assert_partitions(&chunks, 100 * MIB);
    }

    #[test]
    fn last_chunk_takes_the_remainder() {
        let chunks = plan_chunks(25, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Chunk { start: 20, end: 25 });
    }

    #[test]
    fn chunk_larger_than_total_is_one_chunk() {
        let chunks = plan_chunks(100, 1000);
        assert_eq!(chunks, vec![Chunk { start: 0, end: 100 }]);
    }

    #[test]
    fn partitions_for_many_sizes() {
        for total in [1u64, 2, 7, 63, 64, 65, 1000, 4097, 10 * MIB + 3] {
            for chunk in [1u64, 3, 64, 4096, MIB] {
                if total / chunk > 100_000 {
                    continue;
                }
                assert_partitions(&plan_chunks(total, chunk), total);
            }
        }
    }

    #[test]
    fn empty_inputs() {
        assert!(plan_chunks(0, 4).is_empty());
        assert!(plan_chunks(100, 0).is_empty());
    }

    #[test]
    fn range_header() {
        let c = Chunk { start: 0, end: 99 };
        assert_eq!(c.range_header_value(), "bytes=0-98");
        let one = Chunk { start: 42, end: 43 };
        assert_eq!(one.range_header_value(), "bytes=42-42");
    }
}
