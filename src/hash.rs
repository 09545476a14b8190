// Strong hash functions used to spread item hashes and to derive alternate
// bucket indices from fingerprints.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// A deterministic function mapping a 64-bit value to a well-distributed 64-bit value.
///
/// The filter applies it twice: once to the output of the item-normalising hasher,
/// and once to every fingerprint when computing an alternate bucket index. It must
/// return the same output for the same input for the whole lifetime of a filter,
/// otherwise stored fingerprints become unreachable.
pub trait StrongHash {
    fn hash(&self, value: u64) -> u64;
}

/// General-purpose 64-bit hash: XXH3 over the little-endian bytes of the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xxh3Hash;

impl StrongHash for Xxh3Hash {
    #[inline]
    fn hash(&self, value: u64) -> u64 {
        xxh3_64(&value.to_le_bytes())
    }
}

/// Seeded byte-string hash (XXH3 with a 64-bit seed).
///
/// A seed of zero produces the same output as [`Xxh3Hash`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeededXxh3Hash {
    seed: u64,
}

impl SeededXxh3Hash {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Hash an arbitrary byte string with this seed
    pub fn hash_bytes(&self, bytes: &[u8]) -> u64 {
        if self.seed == 0 {
            xxh3_64(bytes)
        } else {
            xxh3_64_with_seed(bytes, self.seed)
        }
    }
}

impl StrongHash for SeededXxh3Hash {
    #[inline]
    fn hash(&self, value: u64) -> u64 {
        self.hash_bytes(&value.to_le_bytes())
    }
}

/// Pairwise-independent multiply-shift hash family.
///
/// Computes `(add + multiply * x) >> 64` in wrapping 128-bit arithmetic, after
/// Dietzfelbinger, "Universal hashing and k-wise independent random variables via
/// integer arithmetic without primes". Both coefficients are odd.
///
/// Slower than [`Xxh3Hash`] but with a provable independence bound. Note that a
/// default-constructed instance draws fresh coefficients, so two filters built
/// with `MultiplyShift::default()` hash differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplyShift {
    multiply: u128,
    add: u128,
}

impl MultiplyShift {
    /// Draw both coefficients from the operating system's entropy source
    pub fn new() -> Self {
        Self::from_rng(&mut StdRng::from_os_rng())
    }

    /// Draw both coefficients from the given random source
    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::with_coefficients(rng.random(), rng.random())
    }

    /// Use fixed coefficients. The lowest bit of each is forced to one.
    pub fn with_coefficients(multiply: u128, add: u128) -> Self {
        Self {
            multiply: multiply | 1,
            add: add | 1,
        }
    }

    pub fn coefficients(&self) -> (u128, u128) {
        (self.multiply, self.add)
    }
}

impl Default for MultiplyShift {
    fn default() -> Self {
        Self::new()
    }
}

impl StrongHash for MultiplyShift {
    #[inline]
    fn hash(&self, value: u64) -> u64 {
        (self
            .add
            .wrapping_add(self.multiply.wrapping_mul(value as u128))
            >> 64) as u64
    }
}
