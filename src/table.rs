//! Bucketed fingerprint storage.
//!
//! Fingerprints are packed into `u64` words, `64 / fingerprint_size` per word,
//! so a slot never spans two words. Occupancy lives in a separate bitmap, one
//! bit per slot, which keeps the zero fingerprint usable.

use crate::hash::{FINGERPRINT_SIZES, Fingerprint};
use rand::Rng;
use rand::rngs::StdRng;

const WORD_BITS: usize = u64::BITS as usize;

/// Result of [`Table::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The fingerprint went into an empty slot.
    Inserted,
    /// The bucket was full and `force` was set: `victim` was displaced from
    /// position `slot` of the bucket and handed back to the caller.
    Evicted { victim: Fingerprint, slot: usize },
    /// The bucket was full and `force` was not set. Nothing changed.
    Failed,
}

impl InsertOutcome {
    pub fn is_inserted(self) -> bool {
        self == InsertOutcome::Inserted
    }
}

/// A fixed array of buckets, each holding `bucket_size` fingerprint slots.
///
/// Bucket keys are reduced modulo the bucket count, which is always a power of
/// two, so the reduction is a mask. Every operation touches a single bucket
/// and runs in O(bucket_size). The table is never resized.
///
/// The table owns the random source used to pick eviction victims; inject a
/// seeded generator for reproducible eviction chains.
#[derive(Debug)]
pub struct Table<R = StdRng> {
    /// Packed fingerprints
    words: Vec<u64>,
    /// One bit per slot
    occupied: Vec<u64>,
    num_buckets: usize,
    bucket_size: usize,
    fingerprint_size: usize,
    fingerprint_mask: u64,
    /// Number of occupied slots
    len: usize,
    rng: R,
}

impl<R: Rng> Table<R> {
    /// Allocate an empty table.
    ///
    /// # Panics
    /// Panics if `num_buckets` is not a power of two, if `bucket_size` is zero,
    /// or if `fingerprint_size` is not 4, 8, 16 or 32.
    pub fn new(num_buckets: usize, bucket_size: usize, fingerprint_size: usize, rng: R) -> Self {
        assert!(num_buckets.is_power_of_two(), "num_buckets must be a power of two");
        assert!(bucket_size > 0, "bucket_size must be greater than zero");
        assert!(
            FINGERPRINT_SIZES.contains(&fingerprint_size),
            "Invalid fingerprint_size: {fingerprint_size}"
        );
        let slot_count = num_buckets * bucket_size;
        Self {
            words: vec![0; (slot_count * fingerprint_size).div_ceil(WORD_BITS)],
            occupied: vec![0; slot_count.div_ceil(WORD_BITS)],
            num_buckets,
            bucket_size,
            fingerprint_size,
            fingerprint_mask: u64::MAX >> (WORD_BITS - fingerprint_size),
            len: 0,
            rng,
        }
    }

    /// Place `fingerprint` in the bucket addressed by `key`.
    ///
    /// The first empty slot is used. If the bucket is full and `force` is set,
    /// a uniformly random slot is overwritten and its previous fingerprint is
    /// returned as the victim; the occupied-slot count does not change.
    pub fn insert(&mut self, key: u64, fingerprint: Fingerprint, force: bool) -> InsertOutcome {
        let bucket = self.bucket_index(key);
        let empty = self.read_bucket(bucket).position(|fp| fp.is_none());
        if let Some(slot) = empty {
            let index = self.slot_index(bucket, slot);
            self.write_fingerprint(index, fingerprint);
            self.set_occupied(index, true);
            self.len += 1;
            return InsertOutcome::Inserted;
        }
        if !force {
            return InsertOutcome::Failed;
        }
        let slot = self.rng.random_range(0..self.bucket_size);
        let index = self.slot_index(bucket, slot);
        let victim = self.read_fingerprint(index);
        self.write_fingerprint(index, fingerprint);
        InsertOutcome::Evicted { victim, slot }
    }

    /// Clear the first slot of the addressed bucket holding `fingerprint`.
    ///
    /// Only one slot is cleared even if the fingerprint occurs several times.
    /// Returns `false` if the bucket does not hold it.
    pub fn delete(&mut self, key: u64, fingerprint: Fingerprint) -> bool {
        let bucket = self.bucket_index(key);
        let found = self
            .read_bucket(bucket)
            .position(|fp| fp == Some(fingerprint));
        match found {
            Some(slot) => {
                let index = self.slot_index(bucket, slot);
                self.set_occupied(index, false);
                self.write_fingerprint(index, Fingerprint::default());
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Whether an occupied slot of the addressed bucket holds `fingerprint`.
    pub fn lookup(&self, key: u64, fingerprint: Fingerprint) -> bool {
        self.read_bucket(self.bucket_index(key))
            .any(|fp| fp == Some(fingerprint))
    }

    /// Put `fingerprint` back into position `slot` of the addressed bucket.
    ///
    /// Used to unwind an eviction chain: the slot must currently be occupied,
    /// and the occupied-slot count does not change.
    pub fn restore(&mut self, key: u64, slot: usize, fingerprint: Fingerprint) {
        let index = self.slot_index(self.bucket_index(key), slot);
        debug_assert!(self.is_occupied(index), "restoring into an empty slot");
        self.write_fingerprint(index, fingerprint);
    }

    /// Empty every slot.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.occupied.fill(0);
        self.len = 0;
    }
}

impl<R> Table<R> {
    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn fingerprint_size(&self) -> usize {
        self.fingerprint_size
    }

    /// Total number of slots, the hard ceiling on stored fingerprints.
    pub fn slot_count(&self) -> usize {
        self.num_buckets * self.bucket_size
    }

    /// Reduce a 64-bit key to a bucket index (`key mod num_buckets`).
    fn bucket_index(&self, key: u64) -> usize {
        (key & (self.num_buckets as u64 - 1)) as usize
    }

    fn slot_index(&self, bucket: usize, slot: usize) -> usize {
        bucket * self.bucket_size + slot
    }

    /// Iterate over a bucket's slots in scan order; `None` marks an empty slot.
    fn read_bucket(&self, bucket: usize) -> impl Iterator<Item = Option<Fingerprint>> + '_ {
        let start = bucket * self.bucket_size;
        (start..start + self.bucket_size).map(move |index| {
            self.is_occupied(index)
                .then(|| self.read_fingerprint(index))
        })
    }

    fn read_fingerprint(&self, index: usize) -> Fingerprint {
        let bit_index = index * self.fingerprint_size;
        let word = self.words[bit_index / WORD_BITS];
        Fingerprint::new(((word >> (bit_index % WORD_BITS)) & self.fingerprint_mask) as u32)
    }

    fn write_fingerprint(&mut self, index: usize, fingerprint: Fingerprint) {
        let bit_index = index * self.fingerprint_size;
        let shift = bit_index % WORD_BITS;
        let mask = self.fingerprint_mask << shift;
        let word = &mut self.words[bit_index / WORD_BITS];
        *word = (*word & !mask) | ((u64::from(fingerprint.value()) << shift) & mask);
    }

    fn is_occupied(&self, index: usize) -> bool {
        (self.occupied[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    fn set_occupied(&mut self, index: usize, occupied: bool) {
        let bit = 1u64 << (index % WORD_BITS);
        let word = &mut self.occupied[index / WORD_BITS];
        if occupied {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    /// Raw storage, for asserting that a failed insert left the table untouched.
    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> (Vec<u64>, Vec<u64>) {
        (self.words.clone(), self.occupied.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn table(num_buckets: usize, bucket_size: usize, fingerprint_size: usize) -> Table {
        Table::new(
            num_buckets,
            bucket_size,
            fingerprint_size,
            StdRng::seed_from_u64(0),
        )
    }

    fn fp(value: u32) -> Fingerprint {
        Fingerprint::new(value)
    }

    #[test]
    fn fills_bucket_then_fails_without_force() {
        let mut t = table(4, 4, 8);
        for i in 0..4 {
            assert_eq!(t.insert(1, fp(i + 10), false), InsertOutcome::Inserted);
        }
        assert_eq!(t.len(), 4);
        assert_eq!(t.insert(1, fp(99), false), InsertOutcome::Failed);
        assert_eq!(t.len(), 4);
        assert!(!t.lookup(1, fp(99)));
        // other buckets are unaffected
        assert_eq!(t.insert(2, fp(99), false), InsertOutcome::Inserted);
    }

    #[test]
    fn forced_insert_evicts_previous_occupant() {
        let mut t = table(4, 4, 8);
        for i in 0..4 {
            t.insert(0, fp(i), false);
        }
        match t.insert(0, fp(200), true) {
            InsertOutcome::Evicted { victim, slot } => {
                assert!(victim.value() < 4);
                assert!(slot < 4);
                assert!(t.lookup(0, fp(200)));
                assert!(!t.lookup(0, victim));
            }
            other => panic!("expected an eviction, got {other:?}"),
        }
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn forced_insert_prefers_empty_slot() {
        let mut t = table(4, 4, 8);
        t.insert(0, fp(1), false);
        assert_eq!(t.insert(0, fp(2), true), InsertOutcome::Inserted);
        assert!(t.lookup(0, fp(1)));
        assert!(t.lookup(0, fp(2)));
    }

    #[test]
    fn delete_clears_a_single_duplicate() {
        let mut t = table(4, 4, 8);
        t.insert(3, fp(7), false);
        t.insert(3, fp(7), false);
        assert!(t.delete(3, fp(7)));
        assert!(t.lookup(3, fp(7)));
        assert!(t.delete(3, fp(7)));
        assert!(!t.lookup(3, fp(7)));
        assert!(!t.delete(3, fp(7)));
        assert!(t.is_empty());
    }

    #[test]
    fn empty_slots_never_match_zero_fingerprint() {
        let mut t = table(4, 4, 8);
        assert!(!t.lookup(0, fp(0)));
        assert!(!t.delete(0, fp(0)));
        t.insert(0, fp(0), false);
        assert!(t.lookup(0, fp(0)));
        assert!(t.delete(0, fp(0)));
        assert!(!t.lookup(0, fp(0)));
    }

    #[test]
    fn keys_are_reduced_modulo_bucket_count() {
        let mut t = table(16, 2, 8);
        t.insert(5, fp(42), false);
        assert!(t.lookup(5 + 16, fp(42)));
        assert!(t.lookup(5 + 16 * 1000, fp(42)));
        assert!(t.lookup(u64::MAX - 10, fp(42))); // u64::MAX - 10 ≡ 5 (mod 16)
        assert!(!t.lookup(6, fp(42)));
    }

    #[test]
    fn packed_slots_do_not_overlap() {
        for size in FINGERPRINT_SIZES {
            let mut t = table(8, 3, size);
            let mask = (1u64 << size) - 1;
            let value = |b: u64, s: u64| (((b * 3 + s) * 0x9E37_79B9) & mask) as u32;
            for b in 0..8u64 {
                for s in 0..3u64 {
                    assert!(t.insert(b, fp(value(b, s)), false).is_inserted());
                }
            }
            assert_eq!(t.len(), t.slot_count());
            for b in 0..8u64 {
                let stored: Vec<_> = t.read_bucket(b as usize).collect();
                let expected: Vec<_> = (0..3).map(|s| Some(fp(value(b, s)))).collect();
                assert_eq!(stored, expected, "fingerprint_size {size}");
            }
        }
    }

    #[test]
    fn restore_undoes_an_eviction() {
        let mut t = table(2, 2, 16);
        t.insert(1, fp(100), false);
        t.insert(1, fp(101), false);
        let before = t.snapshot();
        let InsertOutcome::Evicted { victim, slot } = t.insert(1, fp(555), true) else {
            panic!("bucket should be full");
        };
        assert_ne!(t.snapshot(), before);
        t.restore(1, slot, victim);
        assert_eq!(t.snapshot(), before);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn seeded_rng_gives_reproducible_victims() {
        let run = || {
            let mut t = table(1, 8, 8);
            for i in 0..8 {
                t.insert(0, fp(i), false);
            }
            (0..32)
                .map(|i| match t.insert(0, fp(100 + i), true) {
                    InsertOutcome::Evicted { slot, .. } => slot,
                    other => panic!("unexpected {other:?}"),
                })
                .collect::<Vec<_>>()
        };
        let slots = run();
        assert_eq!(slots, run());
        assert!(slots.iter().any(|&s| s != slots[0]));
    }

    #[test]
    fn clear_empties_every_slot() {
        let mut t = table(4, 4, 4);
        for i in 0..16u32 {
            t.insert(u64::from(i), fp(i & 0xf), false);
        }
        assert!(!t.is_empty());
        t.clear();
        assert!(t.is_empty());
        for i in 0..16u32 {
            assert!(!t.lookup(u64::from(i), fp(i & 0xf)));
        }
    }

    #[test]
    #[should_panic(expected = "num_buckets must be a power of two")]
    fn rejects_non_power_of_two_bucket_count() {
        let _ = table(12, 4, 8);
    }
}
