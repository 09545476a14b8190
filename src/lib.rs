// Flat-Buffer Cuckoo Filter Implementation
// A compact probabilistic data structure for set membership testing with no false
// negatives, a bounded false positive rate and support for deletions. Fingerprints
// are whole bytes stored back to back in a single buffer, located through
// partial-key cuckoo hashing and placed with a bounded random-walk relocation.

mod bucket;
mod fingerprint;
mod hash;

pub use bucket::{BUCKET_SIZE, Bucket};
pub use fingerprint::{
    Fingerprint, MAX_FINGERPRINT_SIZE, Placement, ceil_to_power_of_two, from_bytes, into_bytes,
};
pub use hash::{MultiplyShift, SeededXxh3Hash, StrongHash, Xxh3Hash};

use derive_builder::{Builder, UninitializedFieldError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use tracing::debug;

/// Bucket indices come from the upper 32 bits of the item hash, so more buckets
/// than this would never be addressed.
const MAX_BUCKET_COUNT: u64 = 1 << 32;

/// Error type for building a Cuckoo Filter
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The fingerprint size is outside `1..=MAX_FINGERPRINT_SIZE` bytes
    #[error("fingerprint_size must be between 1 and 4 bytes, got {0}")]
    InvalidFingerprintSize(usize),
    /// A capacity of zero would round to zero buckets
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    /// The capacity needs more buckets than can be addressed or allocated
    #[error("capacity {0} is too large")]
    CapacityOverflow(usize),
    /// A builder field without a default was left unset
    #[error("{0} must be initialized")]
    UninitializedField(&'static str),
}

impl From<UninitializedFieldError> for Error {
    fn from(error: UninitializedFieldError) -> Self {
        Error::UninitializedField(error.field_name())
    }
}

/// A single-threaded probabilistic data structure for set membership testing.
///
/// ## Algorithm Overview
///
/// 1. **Fingerprints**: Items are reduced to 1 to 4 byte fingerprints. The all-zero
///    fingerprint marks an empty slot, so a fingerprint computing to zero becomes 1.
///
/// 2. **Partial-key cuckoo hashing**: Each item has two candidate buckets. The
///    alternate bucket is `index ^ hash(fingerprint)`, so it can be recomputed from
///    the stored fingerprint alone and the relation is its own inverse.
///
/// 3. **Relocation**: A random candidate is chosen as target. When it is full, a
///    random resident of it is swapped out for the new fingerprint and moved to its own alternate bucket,
///    possibly displacing another resident, for at most `max_relocations` steps.
///
/// ## Hashing
///
/// Items are first normalised to 64 bits by the weak hasher `H` (any
/// `Hasher + Default`), then spread by the strong hash `S` which is also used for
/// alternate indices.
///
/// ## Caveats
///
/// - When a relocation cascade gives up, [`insert`](Self::insert) returns `false`
///   but the requested item may in fact be stored while the fingerprint in hand at
///   the end of the cascade, belonging to some earlier item, is dropped. There is
///   no victim cache.
/// - Two items that derive the same buckets and fingerprint are indistinguishable:
///   erasing one may remove the slot the other was counted by.
///
/// ## Time Complexity
///
/// - **Lookup**: O(1), at most two bucket scans
/// - **Deletion**: O(1)
/// - **Insertion**: Amortized O(1), bounded by `max_relocations`
#[derive(Debug, Builder)]
#[builder(
    pattern = "owned",
    build_fn(
        private,
        name = "base_build",
        validate = "Self::validate",
        error = "Error"
    )
)]
pub struct CuckooFilter<S = Xxh3Hash, H = DefaultHasher>
where
    S: StrongHash + Default,
    H: Hasher + Default,
{
    // Configuration parameters
    /// Number of elements the filter should hold, rounded up to whole buckets
    #[builder(default = "1048576")]
    capacity: usize,

    /// Size of fingerprints in bytes (1 to 4)
    #[builder(default = "2")]
    fingerprint_size: usize,

    /// Maximum number of displacements to try before giving up on an insertion
    #[builder(default = "500")]
    max_relocations: usize,

    /// Hash applied to normalised item hashes and to fingerprints
    #[builder(default)]
    strong_hash: S,

    /// Seed for the random source. Taken from the operating system when unset.
    #[builder(default, setter(strip_option))]
    seed: Option<u64>,

    // Internal values - automatically derived from the configuration
    /// Number of buckets in the filter (power of 2)
    #[builder(setter(skip))]
    bucket_count: usize,

    /// All buckets back to back, `BUCKET_SIZE * fingerprint_size` bytes each
    #[builder(setter(skip))]
    buffer: Vec<u8>,

    /// Number of elements in the filter
    #[builder(setter(skip))]
    len: usize,

    /// Picks the target candidate bucket and the victim slots of a relocation
    #[builder(setter(skip), default = "StdRng::from_os_rng()")]
    rng: StdRng,

    /// Phantom data for the item hasher type
    #[builder(setter(skip))]
    _hasher: PhantomData<H>,
}

impl<S, H> CuckooFilter<S, H>
where
    S: StrongHash + Default,
    H: Hasher + Default,
{
    /// Insert an item into the filter
    ///
    /// One of the two candidate buckets is picked at random. The fingerprint goes
    /// into a free slot of that bucket, or, if it is full, a relocation cascade is
    /// run from it. The cascade may still end up in the other candidate.
    ///
    /// Returns `true` if the item was stored. `false` means the cascade gave up,
    /// which becomes likely as the load factor approaches its limit; see the type
    /// level documentation for what was lost in that case.
    pub fn insert<T: ?Sized + Hash>(&mut self, item: &T) -> bool {
        let Placement {
            index,
            alt_index,
            fingerprint,
        } = self.placement(item);
        let target = if self.rng.random_bool(0.5) {
            index
        } else {
            alt_index
        };
        let inserted =
            self.bucket_mut(target).insert(&fingerprint) || self.relocate(target, fingerprint);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Check if an item is in the filter
    ///
    /// Returns `true` if the item is possibly in the filter (may have false positives),
    /// `false` if it is definitely not in the filter
    pub fn contains<T: ?Sized + Hash>(&self, item: &T) -> bool {
        let placement = self.placement(item);
        self.bucket(placement.index)
            .contains(&placement.fingerprint)
            || self
                .bucket(placement.alt_index)
                .contains(&placement.fingerprint)
    }

    /// Attempts to remove an item from the filter.
    ///
    /// Returns `true` if the item was removed, or `false` if it was not found.
    ///
    /// Note:
    /// - An item should only be removed if it was previously added. Removing a non-existent
    ///   item may remove a different item that shares its buckets and fingerprint.
    pub fn erase<T: ?Sized + Hash>(&mut self, item: &T) -> bool {
        let Placement {
            index,
            alt_index,
            fingerprint,
        } = self.placement(item);
        let erased = self.bucket_mut(index).erase(&fingerprint)
            || self.bucket_mut(alt_index).erase(&fingerprint);
        if erased {
            self.len -= 1;
        }
        erased
    }

    /// Counts the fingerprints matching an item in both of its candidate buckets.
    ///
    /// This is not a counting filter: the result includes false positives and is
    /// at most `2 * BUCKET_SIZE`.
    pub fn count<T: ?Sized + Hash>(&self, item: &T) -> usize {
        let placement = self.placement(item);
        let count = self.bucket(placement.index).count(&placement.fingerprint);
        if placement.alt_index == placement.index {
            count
        } else {
            count
                + self
                    .bucket(placement.alt_index)
                    .count(&placement.fingerprint)
        }
    }

    /// Clear the filter, removing all elements
    pub fn clear(&mut self) {
        self.buffer.fill(0);
        self.len = 0;
    }

    /// Get the number of elements in the filter
    pub fn size(&self) -> usize {
        self.len
    }

    /// Check if the filter is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the capacity of the filter, the total number of slots.
    ///
    /// This is `bucket_count() * BUCKET_SIZE`, which can exceed the configured
    /// `capacity` since the bucket count is rounded up to a power of two.
    pub fn capacity(&self) -> usize {
        self.bucket_count * BUCKET_SIZE
    }

    /// Number of buckets (a power of two)
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Size of fingerprints in bytes
    pub fn fingerprint_size(&self) -> usize {
        self.fingerprint_size
    }

    /// Maximum number of displacements tried per insertion
    pub fn max_relocations(&self) -> usize {
        self.max_relocations
    }

    /// Fraction of slots currently occupied
    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    /// Approximate number of bytes used by the filter, buffer included
    pub fn memory_usage(&self) -> usize {
        size_of::<Self>() + self.buffer.capacity()
    }

    /// Emit a debug event breaking up the memory usage of the filter
    pub fn memory_usage_info(&self) {
        debug!(
            struct_bytes = size_of::<Self>(),
            buffer_bytes = self.buffer.len(),
            excess_buffer_bytes = self.buffer.capacity() - self.buffer.len(),
            bucket_bytes = BUCKET_SIZE * self.fingerprint_size,
            bucket_count = self.bucket_count,
            total_bytes = self.memory_usage(),
            "cuckoo filter memory usage"
        );
    }

    /// Human-readable listing of the non-empty buckets, for debugging only.
    /// The format is not stable.
    pub fn dump(&self) -> BucketDump<'_> {
        BucketDump {
            buffer: &self.buffer,
            fingerprint_size: self.fingerprint_size,
        }
    }

    /// Reset the random source to a known state
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Compute both candidate buckets and the fingerprint of an item
    pub fn placement<T: ?Sized + Hash>(&self, item: &T) -> Placement {
        fingerprint::placement(
            &self.strong_hash,
            self.hash(item),
            self.fingerprint_size,
            self.bucket_count - 1,
        )
    }

    /// Computes the alternative bucket index for a given fingerprint.
    ///
    /// Properties:
    /// 1. Symmetry: `alt_index(alt_index(i, f), f) == i` for any index `i` and fingerprint `f`.
    /// 2. The result is always a valid bucket index.
    pub fn alt_index(&self, index: usize, fingerprint: &Fingerprint) -> usize {
        fingerprint::alt_index(&self.strong_hash, index, fingerprint, self.bucket_count - 1)
    }

    /// Read-only view of the bucket at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= bucket_count()`.
    pub fn bucket(&self, index: usize) -> Bucket<&[u8]> {
        let width = BUCKET_SIZE * self.fingerprint_size;
        Bucket::new(
            &self.buffer[index * width..(index + 1) * width],
            self.fingerprint_size,
        )
    }

    fn bucket_mut(&mut self, index: usize) -> Bucket<&mut [u8]> {
        let width = BUCKET_SIZE * self.fingerprint_size;
        Bucket::new(
            &mut self.buffer[index * width..(index + 1) * width],
            self.fingerprint_size,
        )
    }

    /// Place `fingerprint` by cuckoo displacement, starting at the full bucket `index`.
    ///
    /// Each step swaps the fingerprint in hand with a random resident, then tries to
    /// store the evicted one in its alternate bucket, computed from the bucket it was
    /// evicted from. Returns `false` once `max_relocations` steps have failed; the
    /// fingerprint in hand at that point is dropped.
    fn relocate(&mut self, mut index: usize, mut fingerprint: Fingerprint) -> bool {
        for _ in 0..self.max_relocations {
            let slot = self.rng.random_range(0..BUCKET_SIZE);
            self.bucket_mut(index).swap(&mut fingerprint, slot);
            index = self.alt_index(index, &fingerprint);
            if self.bucket_mut(index).insert(&fingerprint) {
                return true;
            }
        }
        debug!(
            max_relocations = self.max_relocations,
            dropped = ?fingerprint.as_bytes(),
            len = self.len,
            "relocation cascade exhausted, dropping displaced fingerprint"
        );
        false
    }

    /// Normalise an item to 64 bits with the item hasher H
    fn hash<T: ?Sized + Hash>(&self, data: &T) -> u64 {
        let mut hasher = <H as Default>::default();
        data.hash(&mut hasher);
        hasher.finish()
    }
}

impl CuckooFilter<Xxh3Hash, DefaultHasher> {
    /// Create a new CuckooFilterBuilder with default settings
    pub fn builder() -> CuckooFilterBuilder<Xxh3Hash, DefaultHasher> {
        CuckooFilterBuilder::default()
    }

    /// Create a new CuckooFilter with default settings
    pub fn new() -> Self {
        Self::builder()
            .build()
            .expect("default configuration is valid")
    }

    /// Create a new CuckooFilter with the specified capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or too large to address.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder()
            .capacity(capacity)
            .build()
            .expect("invalid capacity")
    }
}

impl Default for CuckooFilter<Xxh3Hash, DefaultHasher> {
    /// Create a new CuckooFilter with default settings
    fn default() -> Self {
        Self::new()
    }
}

impl<S, H> CuckooFilterBuilder<S, H>
where
    S: StrongHash + Default,
    H: Hasher + Default,
{
    /// Validate the builder configuration
    fn validate(&self) -> Result<(), Error> {
        if let Some(fingerprint_size) = self.fingerprint_size
            && !(1..=MAX_FINGERPRINT_SIZE).contains(&fingerprint_size)
        {
            return Err(Error::InvalidFingerprintSize(fingerprint_size));
        }
        if self.capacity == Some(0) {
            return Err(Error::ZeroCapacity);
        }
        Ok(())
    }

    /// Build a CuckooFilter with the specified configuration
    pub fn build(self) -> Result<CuckooFilter<S, H>, Error> {
        let mut filter = self.base_build()?;
        let capacity = filter.capacity;
        // Calculate the number of buckets (power of 2)
        let min_buckets = capacity.div_ceil(BUCKET_SIZE);
        if min_buckets as u64 > MAX_BUCKET_COUNT {
            return Err(Error::CapacityOverflow(capacity));
        }
        filter.bucket_count = ceil_to_power_of_two(min_buckets);
        // Initialize the buckets
        let buffer_size = filter
            .bucket_count
            .checked_mul(BUCKET_SIZE * filter.fingerprint_size)
            .ok_or(Error::CapacityOverflow(capacity))?;
        filter.buffer = vec![0; buffer_size];
        if let Some(seed) = filter.seed {
            filter.reseed(seed);
        }
        debug!(
            capacity,
            bucket_count = filter.bucket_count,
            fingerprint_size = filter.fingerprint_size,
            max_relocations = filter.max_relocations,
            buffer_bytes = buffer_size,
            "cuckoo filter allocated"
        );
        Ok(filter)
    }
}

/// Display adapter returned by [`CuckooFilter::dump`]
pub struct BucketDump<'a> {
    buffer: &'a [u8],
    fingerprint_size: usize,
}

impl fmt::Display for BucketDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = BUCKET_SIZE * self.fingerprint_size;
        for (index, bytes) in self.buffer.chunks_exact(width).enumerate() {
            let bucket = Bucket::new(bytes, self.fingerprint_size);
            if bucket.is_empty() {
                continue;
            }
            write!(f, "bucket {index}:")?;
            for slot in bucket.slots() {
                f.write_str(" [")?;
                for (i, byte) in slot.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
