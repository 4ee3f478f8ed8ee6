// Deterministic, portable pseudo-random number generator for chart retargeting.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding.
// The performance engine draws from one `ChartRng` per chart, and only when
// two or more candidate placements are genuinely tied on cost. Everything else
// in the pipeline is deterministic, so a chart's output is a pure function of
// its input timeline, the configuration, and the seed.
//
// **Critical constraint: determinism.** Every method on `ChartRng` must
// produce identical output given the same prior state, regardless of
// platform, compiler version, or optimization level. Do not use
// floating-point arithmetic in the core generator or any source of
// non-determinism (hash-map iteration order, thread ids, clocks) in this
// module.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG seeded once per generated chart.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChartRng {
    s: [u64; 4],
}

impl ChartRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `ChartRng` instances created with the same seed will produce
    /// identical output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Create a PRNG from the first eight bytes of a digest, little endian.
    ///
    /// Shorter slices are zero-padded. This is how per-file seeds are derived
    /// from a hash of the song file name.
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self::new(seed_from_bytes(bytes))
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1).
    ///
    /// Uses the upper 53 bits of a `u64` to fill the mantissa of an f64.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        // = (2^64 - range) % range
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Pick an index into a collection of `len` tied candidates.
    ///
    /// A single candidate is returned without consuming any randomness, so
    /// the stream only advances at genuine ties. Returns `None` for an empty
    /// collection.
    pub fn pick_index(&mut self, len: usize) -> Option<usize> {
        match len {
            0 => None,
            1 => Some(0),
            n => Some(self.range_usize(0, n)),
        }
    }

    /// Pick one element of a slice of tied candidates. See `pick_index`.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.pick_index(items.len()).map(|i| &items[i])
    }
}

/// Fold the first eight bytes of `bytes` into a little-endian `u64`.
pub fn seed_from_bytes(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = ChartRng::new(42);
        let mut b = ChartRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = ChartRng::new(42);
        let mut b = ChartRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = ChartRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_within_bounds() {
        let mut rng = ChartRng::new(555);
        for _ in 0..10_000 {
            let v = rng.range_usize(5, 15);
            assert!((5..15).contains(&v), "range_usize out of range: {v}");
        }
    }

    #[test]
    fn pick_index_single_candidate_consumes_nothing() {
        let mut a = ChartRng::new(7);
        let mut b = ChartRng::new(7);
        assert_eq!(a.pick_index(1), Some(0));
        assert_eq!(a.pick_index(0), None);
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn pick_covers_every_candidate() {
        let mut rng = ChartRng::new(3);
        let items = ['a', 'b', 'c'];
        let mut seen = [false; 3];
        for _ in 0..1000 {
            let i = rng.pick_index(items.len()).unwrap();
            seen[i] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert!(items.contains(rng.pick(&items).unwrap()));
    }

    #[test]
    fn seed_from_short_digest_is_zero_padded() {
        assert_eq!(seed_from_bytes(&[1]), 1);
        assert_eq!(seed_from_bytes(&[]), 0);
        assert_eq!(
            seed_from_bytes(&[1, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]),
            1,
            "bytes past the eighth are ignored"
        );
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = ChartRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: ChartRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
