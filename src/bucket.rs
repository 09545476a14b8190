use crate::fingerprint::Fingerprint;

/// Number of fingerprint slots in every bucket.
///
/// Larger buckets allow a higher load factor at the cost of more comparisons
/// per lookup; four is the usual sweet spot.
pub const BUCKET_SIZE: usize = 4;

/// A view over one bucket of a filter's byte buffer.
///
/// The view borrows `BUCKET_SIZE * fingerprint_size` bytes of the buffer; slot `i`
/// occupies bytes `i * fingerprint_size..(i + 1) * fingerprint_size`. A slot of
/// all zero bytes is empty.
///
/// `Bucket<&[u8]>` supports the read-only operations, `Bucket<&mut [u8]>` the
/// mutating ones as well.
#[derive(Debug)]
pub struct Bucket<B> {
    bytes: B,
    fingerprint_size: usize,
}

impl<B: AsRef<[u8]>> Bucket<B> {
    /// Wrap `bytes` as a bucket of `fingerprint_size`-byte slots.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is not exactly `BUCKET_SIZE * fingerprint_size` long.
    pub fn new(bytes: B, fingerprint_size: usize) -> Self {
        assert_eq!(
            bytes.as_ref().len(),
            BUCKET_SIZE * fingerprint_size,
            "bucket view has the wrong length"
        );
        Self {
            bytes,
            fingerprint_size,
        }
    }

    /// Iterate over the raw bytes of every slot, empty ones included
    pub fn slots(&self) -> impl Iterator<Item = &[u8]> {
        self.bytes.as_ref().chunks_exact(self.fingerprint_size)
    }

    /// Check whether any slot holds `fingerprint`
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.position(fingerprint.as_bytes()).is_some()
    }

    /// Count the slots holding `fingerprint`
    pub fn count(&self, fingerprint: &Fingerprint) -> usize {
        self.slots()
            .filter(|slot| *slot == fingerprint.as_bytes())
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.slots().all(|slot| !is_empty_slot(slot))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.as_ref().iter().all(|&b| b == 0)
    }

    fn position(&self, pattern: &[u8]) -> Option<usize> {
        self.slots().position(|slot| slot == pattern)
    }

    fn empty_position(&self) -> Option<usize> {
        self.slots().position(is_empty_slot)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Bucket<B> {
    /// Store `fingerprint` in the first empty slot.
    ///
    /// Returns `false` without touching the bucket if every slot is taken.
    pub fn insert(&mut self, fingerprint: &Fingerprint) -> bool {
        debug_assert!(!fingerprint.is_empty(), "cannot store the empty sentinel");
        match self.empty_position() {
            Some(slot) => {
                self.slot_mut(slot).copy_from_slice(fingerprint.as_bytes());
                true
            }
            None => false,
        }
    }

    /// Clear the first slot holding `fingerprint`.
    /// Returns `false` if no slot holds it.
    pub fn erase(&mut self, fingerprint: &Fingerprint) -> bool {
        match self.position(fingerprint.as_bytes()) {
            Some(slot) => {
                self.slot_mut(slot).fill(0);
                true
            }
            None => false,
        }
    }

    /// Exchange `fingerprint` with the content of slot `slot`; used to evict a
    /// resident during relocation.
    pub fn swap(&mut self, fingerprint: &mut Fingerprint, slot: usize) {
        debug_assert_eq!(fingerprint.size(), self.fingerprint_size);
        self.slot_mut(slot)
            .swap_with_slice(fingerprint.as_mut_bytes());
    }

    pub fn clear(&mut self) {
        self.bytes.as_mut().fill(0);
    }

    fn slot_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.fingerprint_size;
        &mut self.bytes.as_mut()[start..start + self.fingerprint_size]
    }
}

fn is_empty_slot(slot: &[u8]) -> bool {
    slot.iter().all(|&b| b == 0)
}
