use flat_cuckoo_filter::{
    CuckooFilter, CuckooFilterBuilder, Fingerprint, MultiplyShift, SeededXxh3Hash, StrongHash,
    ceil_to_power_of_two, from_bytes, into_bytes,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

fn assert_alt_index_symmetric<S: StrongHash + Default, H: Hasher + Default>(
    filter: &CuckooFilter<S, H>,
    fingerprints: impl Iterator<Item = u32> + Clone,
) {
    let size = filter.fingerprint_size();
    for index in 0..filter.bucket_count() {
        for value in fingerprints.clone() {
            let fingerprint = Fingerprint::new(value, size);
            let alt = filter.alt_index(index, &fingerprint);
            assert!(alt < filter.bucket_count());
            assert_eq!(
                filter.alt_index(alt, &fingerprint),
                index,
                "alt_index is not self-inverse for bucket {index}, fingerprint {value:#x}"
            );
        }
    }
}

#[test]
fn test_alt_index_symmetry_every_one_byte_fingerprint() {
    let filter = CuckooFilter::builder()
        .capacity(1024)
        .fingerprint_size(1)
        .build()
        .unwrap();
    assert_alt_index_symmetric(&filter, 1..=u8::MAX as u32);
}

#[test]
fn test_alt_index_symmetry_wide_fingerprints() {
    for size in 2..=4 {
        let filter = CuckooFilter::builder()
            .capacity(4096)
            .fingerprint_size(size)
            .build()
            .unwrap();
        let max = if size == 4 {
            u32::MAX
        } else {
            (1u32 << (size * 8)) - 1
        };
        // Sample across the whole value range, including both extremes
        let step = (max / 251).max(1);
        assert_alt_index_symmetric(&filter, (1..=max).step_by(step as usize).chain([max]));
    }
}

#[test]
fn test_alt_index_symmetry_other_strong_hashes() {
    let filter = CuckooFilterBuilder::<SeededXxh3Hash, DefaultHasher>::default()
        .capacity(512)
        .fingerprint_size(1)
        .strong_hash(SeededXxh3Hash::new(0x5eed))
        .build()
        .unwrap();
    assert_alt_index_symmetric(&filter, 1..=u8::MAX as u32);

    let filter = CuckooFilterBuilder::<MultiplyShift, DefaultHasher>::default()
        .capacity(512)
        .fingerprint_size(1)
        .build()
        .unwrap();
    assert_alt_index_symmetric(&filter, 1..=u8::MAX as u32);
}

#[test]
fn test_placement_matches_alt_index() {
    let filter = CuckooFilter::builder()
        .capacity(1 << 12)
        .fingerprint_size(2)
        .build()
        .unwrap();

    for item in 0..10_000u64 {
        let placement = filter.placement(&item);
        assert!(placement.index < filter.bucket_count());
        assert_eq!(
            filter.alt_index(placement.index, &placement.fingerprint),
            placement.alt_index
        );
        assert_eq!(
            filter.alt_index(placement.alt_index, &placement.fingerprint),
            placement.index
        );
        assert_ne!(placement.fingerprint.value(), 0);
    }
}

#[test]
fn test_single_bucket_filter() {
    let mut filter = CuckooFilter::builder()
        .capacity(3)
        .fingerprint_size(1)
        .max_relocations(20)
        .seed(1)
        .build()
        .unwrap();
    assert_eq!(filter.bucket_count(), 1);

    // With one bucket both candidates coincide
    let placement = filter.placement(&"only");
    assert_eq!(placement.index, 0);
    assert_eq!(placement.alt_index, 0);

    let inserted = (0..4u8).take_while(|i| filter.insert(i)).count();
    assert_eq!(inserted, 4);
    assert!(!filter.insert(&99u8));
    assert_eq!(filter.size(), 4);
}

fn occupied_slots<S: StrongHash + Default, H: Hasher + Default>(
    filter: &CuckooFilter<S, H>,
) -> usize {
    (0..filter.bucket_count())
        .map(|index| {
            filter
                .bucket(index)
                .slots()
                .filter(|slot| slot.iter().any(|&b| b != 0))
                .count()
        })
        .sum()
}

#[test]
fn test_relocated_items_stay_locatable() {
    // Fill a filter up to the first failed insert. Everything stored before has been
    // through relocation cascades and must still be found, except for the single
    // fingerprint the failed cascade drops.
    for size in 1..=4 {
        let mut filter = CuckooFilter::builder()
            .capacity(1 << 12)
            .fingerprint_size(size)
            .seed(size as u64)
            .build()
            .unwrap();
        let inserted = (0u64..).take_while(|i| filter.insert(i)).count() as u64;

        assert!(
            filter.load_factor() > 0.85,
            "load factor {} too low for fingerprint size {size}",
            filter.load_factor()
        );
        let lost: Vec<u64> = (0..inserted).filter(|i| !filter.contains(i)).collect();
        assert!(
            lost.len() <= 1,
            "items {lost:?} lost after relocation with fingerprint size {size}"
        );
    }
}

#[test]
fn test_failed_insert_drops_at_most_one_item() {
    let mut filter = CuckooFilter::builder()
        .capacity(256)
        .fingerprint_size(2)
        .max_relocations(50)
        .seed(17)
        .build()
        .unwrap();

    // Up to the first failure nothing is lost
    let mut next = 0u64;
    loop {
        for i in 0..next {
            assert!(filter.contains(&i), "item {i} lost before any failed insert");
        }
        if !filter.insert(&next) {
            break;
        }
        next += 1;
    }

    // The failed insert leaves the count alone and drops at most one earlier item
    assert_eq!(filter.size(), next as usize);
    assert_eq!(occupied_slots(&filter), filter.size());
    let lost = (0..next).filter(|i| !filter.contains(i)).count();
    assert!(lost <= 1, "{lost} items lost by one failed insert");

    // Further failures keep the count in line with the occupied slots
    let mut failures = 0;
    for i in next + 1..next + 500 {
        let size = filter.size();
        if filter.insert(&i) {
            assert_eq!(filter.size(), size + 1);
        } else {
            failures += 1;
            assert_eq!(filter.size(), size);
        }
        assert_eq!(occupied_slots(&filter), filter.size());
    }
    assert!(failures > 0);
    assert!(filter.size() <= filter.capacity());
}

#[test]
fn test_zero_fingerprint_is_remapped() {
    for size in 1..=4 {
        let fingerprint = Fingerprint::new(0, size);
        assert_eq!(fingerprint.value(), 1);
        assert_eq!(fingerprint.size(), size);

        // Only the low `size` bytes count, so 256 truncates to zero for one byte
        let truncated = Fingerprint::new(1 << (size * 8 % 32), size);
        assert_ne!(truncated.value(), 0);
    }
    assert_eq!(Fingerprint::new(256, 1).value(), 1);
}

#[test]
fn test_codec() {
    let mut bytes = [0u8; 3];
    into_bytes(0x00C0_FFEE, &mut bytes);
    assert_eq!(bytes, [0xEE, 0xFF, 0xC0]);
    assert_eq!(from_bytes(&bytes), 0x00C0_FFEE);

    let mut bytes = [0u8; 2];
    into_bytes(0x1234_5678, &mut bytes);
    assert_eq!(bytes, [0x78, 0x56]);
    assert_eq!(from_bytes(&bytes), 0x5678);

    assert_eq!(from_bytes(&[]), 0);
    assert_eq!(from_bytes(&[0xFF; 4]), u32::MAX);

    assert_eq!(ceil_to_power_of_two(0), 1);
    assert_eq!(ceil_to_power_of_two(1), 1);
    assert_eq!(ceil_to_power_of_two(3), 4);
    assert_eq!(ceil_to_power_of_two(256), 256);
    assert_eq!(ceil_to_power_of_two(257), 512);
}
