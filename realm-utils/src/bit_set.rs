//! A fixed-size bit set.

/// A simple bit set implementation with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSet(pub Box<[u64]>);

impl BitSet {
    /// Creates a bit set able to hold `bits` bits, all cleared.
    #[must_use]
    pub fn with_capacity(bits: usize) -> Self {
        Self(vec![0; bits.div_ceil(64)].into_boxed_slice())
    }

    /// Sets the bit at the given index. Out of range indices are ignored.
    pub fn set(&mut self, index: usize, value: bool) {
        let u64_index = index / 64;
        let bit_index = index % 64;

        if u64_index >= self.0.len() {
            return;
        }

        if value {
            self.0[u64_index] |= 1 << bit_index;
        } else {
            self.0[u64_index] &= !(1 << bit_index);
        }
    }

    /// Returns the bit at the given index, `false` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.0
            .get(index / 64)
            .is_some_and(|word| word & (1 << (index % 64)) != 0)
    }

    /// Sets the bit and returns whether it was previously clear.
    pub fn insert(&mut self, index: usize) -> bool {
        let was_set = self.get(index);
        self.set(index, true);
        !was_set && index / 64 < self.0.len()
    }

    /// Number of bits this set can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.0.len() * 64
    }
}
