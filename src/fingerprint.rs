// Fingerprint codec and partial-key cuckoo hashing index derivation.

use crate::hash::StrongHash;
use tracing::trace;

/// Largest supported fingerprint width in bytes
pub const MAX_FINGERPRINT_SIZE: usize = 4;

/// Round `value` up to the next power of two. Zero rounds up to one.
pub fn ceil_to_power_of_two(value: usize) -> usize {
    value.max(1).next_power_of_two()
}

/// Read a little-endian integer out of up to four bytes
pub fn from_bytes(bytes: &[u8]) -> u32 {
    debug_assert!(bytes.len() <= MAX_FINGERPRINT_SIZE);
    bytes
        .iter()
        .enumerate()
        .fold(0, |value, (i, &byte)| value | (byte as u32) << (i * 8))
}

/// Write the lowest `bytes.len()` bytes of `value` in little-endian order
pub fn into_bytes(value: u32, bytes: &mut [u8]) {
    debug_assert!(bytes.len() <= MAX_FINGERPRINT_SIZE);
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = (value >> (i * 8)) as u8;
    }
}

/// A fixed-width, never-zero fingerprint of an item.
///
/// Stored inline so that moving fingerprints around during relocation never
/// allocates. Only the first `size` bytes are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    bytes: [u8; MAX_FINGERPRINT_SIZE],
    size: usize,
}

impl Fingerprint {
    /// Build a fingerprint of `size` bytes holding the low bytes of `value`.
    /// A value that truncates to zero is remapped to 1, since all-zero marks an empty slot.
    pub fn new(value: u32, size: usize) -> Self {
        assert!(
            (1..=MAX_FINGERPRINT_SIZE).contains(&size),
            "fingerprint size must be between 1 and {MAX_FINGERPRINT_SIZE} bytes"
        );
        let mut fingerprint = Self {
            bytes: [0; MAX_FINGERPRINT_SIZE],
            size,
        };
        into_bytes(value, fingerprint.as_mut_bytes());
        if fingerprint.is_empty() {
            trace!(value, size, "fingerprint computed to zero, remapped to 1");
            fingerprint.bytes[0] = 1;
        }
        fingerprint
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The fingerprint as an integer, as fed to the strong hash for alternate indices
    pub fn value(&self) -> u32 {
        from_bytes(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.size]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

/// Both candidate buckets of an item and its fingerprint.
///
/// `alt_index(index, fingerprint) == alt_index` and
/// `alt_index(alt_index, fingerprint) == index` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub index: usize,
    pub alt_index: usize,
    pub fingerprint: Fingerprint,
}

/// Compute the alternate bucket of `fingerprint` when it sits in bucket `index`.
///
/// `bucket_mask` is `bucket_count - 1` with `bucket_count` a power of two, which
/// makes the mapping its own inverse. Initial placement and relocation must both
/// go through this function: any other reduction of the hash breaks symmetry and
/// strands items in buckets that lookups never visit.
#[inline]
pub fn alt_index<S: StrongHash + ?Sized>(
    strong_hash: &S,
    index: usize,
    fingerprint: &Fingerprint,
    bucket_mask: usize,
) -> usize {
    index ^ (strong_hash.hash(fingerprint.value() as u64) as usize & bucket_mask)
}

/// Derive the placement of an item from its weak (normalised) hash.
///
/// The strong hash of `weak_hash` is split in two halves: the low half supplies
/// the fingerprint (its top `fingerprint_size` bytes), the high half the primary
/// index.
pub fn placement<S: StrongHash + ?Sized>(
    strong_hash: &S,
    weak_hash: u64,
    fingerprint_size: usize,
    bucket_mask: usize,
) -> Placement {
    let hash = strong_hash.hash(weak_hash);
    let fingerprint_part = hash as u32;
    let index_part = (hash >> 32) as u32;

    // fingerprint_size is at most 4, so the shift is at most 24
    let fingerprint = Fingerprint::new(
        fingerprint_part >> (32 - fingerprint_size * 8),
        fingerprint_size,
    );
    let index = index_part as usize & bucket_mask;
    let alt_index = alt_index(strong_hash, index, &fingerprint, bucket_mask);
    debug_assert_eq!(
        index,
        self::alt_index(strong_hash, alt_index, &fingerprint, bucket_mask)
    );

    Placement {
        index,
        alt_index,
        fingerprint,
    }
}
