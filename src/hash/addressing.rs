//! Linear-hashing bucket addressing and FNV-1a hash function.

pub const INITIAL_BUCKETS: u32 = 4;
pub const DEFAULT_FILL_FACTOR: u8 = 75;
pub const MAX_FILL_FACTOR: u8 = 90;

#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

#[derive(Debug, Clone, Copy)]
pub struct Addressing {
    pub max_bucket: u32,
    pub high_mask: u32,
    pub low_mask: u32,
}

impl Addressing {
    /// `high_mask` always addresses the round a split is growing into; `low_mask`
    /// (`= high_mask >> 1`) addresses the round still being split. A hash folds
    /// from `high_mask` down to `low_mask` for any bucket not yet split this round.
    #[must_use]
    pub fn initial() -> Self {
        Self { max_bucket: INITIAL_BUCKETS - 1, high_mask: 2 * INITIAL_BUCKETS - 1, low_mask: INITIAL_BUCKETS - 1 }
    }

    #[must_use]
    pub fn bucket_for(&self, hash: u32) -> u32 {
        let b = hash & self.high_mask;
        if b > self.max_bucket { hash & self.low_mask } else { b }
    }

    /// Applies one linear-hashing split step; returns the bucket number that was split.
    ///
    /// The next bucket to split is always `max_bucket - low_mask`: the count of
    /// buckets already split this round. A round is complete only once every
    /// bucket addressed by `low_mask` has split, i.e. `max_bucket` reaches
    /// `high_mask`; only then does `low_mask` advance to the old `high_mask` and
    /// `high_mask` double.
    pub fn split(&mut self) -> u32 {
        let split_bucket = self.max_bucket - self.low_mask;
        self.max_bucket += 1;
        if self.max_bucket == self.high_mask {
            self.low_mask = self.high_mask;
            self.high_mask = 2 * self.high_mask + 1;
        }
        split_bucket
    }
}
