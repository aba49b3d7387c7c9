//! Cuckoo filter: approximate set membership with deletions.
//!
//! A [`CuckooFilter`] answers "has this item possibly been inserted?" with no
//! false negatives and a false positive rate bounded by the fingerprint size.
//! Unlike a Bloom filter, items can be deleted.
//!
//! ```
//! use cuckoo_amq::{CuckooFilter, Error};
//!
//! let mut filter = CuckooFilter::builder()
//!     .capacity(1024)
//!     .bucket_size(8)
//!     .max_kicks(500)
//!     .build()
//!     .unwrap();
//!
//! filter.insert("apple").unwrap();
//! assert!(filter.lookup("apple"));
//! assert_eq!(filter.delete("apple"), Ok(()));
//! assert_eq!(filter.delete("apple"), Err(Error::NotFound));
//! ```
//!
//! The filter does no internal locking. Mutations take `&mut self` and
//! lookups `&self`, so sharing across threads goes through an `RwLock` or
//! `Mutex` owned by the caller.

pub mod config;
pub mod hash;
pub mod table;

pub use config::{CuckooFilterBuilder, CuckooFilterBuilderError, FilterConfig};
pub use hash::{Fingerprint, HashDeriver};
pub use table::{InsertOutcome, Table};

use log::{debug, trace};
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

/// Error type for Cuckoo Filter operations
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// Returned when an insert exhausts its eviction budget. The filter is
    /// left exactly as it was before the call.
    #[error("Not enough space to store this item (gave up after {max_kicks} kicks).")]
    InsertFailed { max_kicks: usize },
    /// Returned by delete when neither candidate bucket holds the item's fingerprint
    #[error("Item is not present in the filter.")]
    NotFound,
}

/// A probabilistic set built on partial-key cuckoo hashing.
///
/// ## Algorithm Overview
///
/// 1. **Fingerprints**: items are reduced to small fingerprints (4-32 bits)
///    instead of being stored in full.
///
/// 2. **Two candidate buckets**: the primary bucket comes from hashing the
///    item, the secondary is `primary ^ hash(fingerprint)`. Because the
///    secondary only depends on the fingerprint, a stored fingerprint can
///    always find its other bucket.
///
/// 3. **Eviction chains**: when the primary bucket is full, the fingerprint
///    is forced into the secondary bucket, displacing a random occupant. The
///    victim moves on to its own alternate bucket, and so on, for at most
///    `max_kicks` steps. If the chain does not end in an empty slot, all
///    displacements are undone and the insert fails.
///
/// ## Known limitations
///
/// - Lookups may report items that were never inserted (false positives).
/// - Two items sharing a fingerprint and bucket pair are indistinguishable:
///   deleting one may remove the fingerprint stored for the other. Only
///   delete items that were inserted.
/// - The number of buckets is fixed; the filter never resizes.
///
/// ## Time Complexity
///
/// - **Lookup / Delete**: O(bucket_size), at most two buckets
/// - **Insert**: O(bucket_size × max_kicks) worst case
#[derive(Debug)]
pub struct CuckooFilter<H = DefaultHasher, R = StdRng> {
    /// Maximum number of evictions to try before giving up
    max_kicks: usize,

    hasher: HashDeriver<H>,

    table: Table<R>,
}

impl<H: Hasher + Default, R: Rng> CuckooFilter<H, R> {
    pub(crate) fn from_config(config: FilterConfig, mut rng: R) -> Self {
        let seed = config.seed.unwrap_or_else(|| rng.random());
        let num_buckets = config.capacity.next_power_of_two();
        debug!(
            "creating cuckoo filter: {} buckets x {} slots, {}-bit fingerprints, {} max kicks",
            num_buckets, config.bucket_size, config.fingerprint_size, config.max_kicks
        );
        Self {
            max_kicks: config.max_kicks,
            hasher: HashDeriver::with_seed(seed, config.fingerprint_size),
            table: Table::new(num_buckets, config.bucket_size, config.fingerprint_size, rng),
        }
    }

    /// Insert an item into the filter
    ///
    /// The primary bucket is tried first. If it is full, the item enters the
    /// eviction loop through its secondary bucket.
    ///
    /// Returns `Error::InsertFailed` when the eviction budget runs out, in
    /// which case the filter is unchanged.
    pub fn insert<T: ?Sized + AsRef<[u8]>>(&mut self, item: &T) -> Result<(), Error> {
        let (index, alt_index, fingerprint) = self.hasher.derive_candidates(item.as_ref());
        if self.table.insert(index, fingerprint, false).is_inserted() {
            return Ok(());
        }
        self.insert_with_evictions(alt_index, fingerprint)
    }

    /// Insert an item only if it is not already (possibly) present
    ///
    /// Returns Ok(true) if the item was inserted, Ok(false) if a lookup
    /// already reported it, or `Error::InsertFailed` if the filter is full.
    /// A false positive makes this skip an item that was never inserted.
    pub fn insert_unique<T: ?Sized + AsRef<[u8]>>(&mut self, item: &T) -> Result<bool, Error> {
        if self.lookup(item) {
            return Ok(false);
        }
        self.insert(item).map(|_| true)
    }

    /// Remove one copy of an item's fingerprint.
    ///
    /// The primary bucket is tried before the secondary. Returns
    /// `Error::NotFound` when neither holds the fingerprint.
    ///
    /// Note:
    /// - An item should only be removed if it was previously added. Removing a
    ///   non-existent item may remove a different item that shares its
    ///   fingerprint and buckets.
    pub fn delete<T: ?Sized + AsRef<[u8]>>(&mut self, item: &T) -> Result<(), Error> {
        let (index, alt_index, fingerprint) = self.hasher.derive_candidates(item.as_ref());
        if self.table.delete(index, fingerprint) || self.table.delete(alt_index, fingerprint) {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Check if an item is in the filter
    ///
    /// Returns `true` if the item is possibly in the filter (may have false positives),
    /// `false` if it is definitely not in the filter
    pub fn lookup<T: ?Sized + AsRef<[u8]>>(&self, item: &T) -> bool {
        let (index, alt_index, fingerprint) = self.hasher.derive_candidates(item.as_ref());
        self.table.lookup(index, fingerprint) || self.table.lookup(alt_index, fingerprint)
    }

    /// Clear the filter, removing all elements
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Run the eviction loop starting from the secondary bucket.
    ///
    /// Each step forces `fingerprint` into the bucket at `alt_index`. A
    /// displaced victim becomes the next fingerprint to place, and the next
    /// key is `alt_index ^ hash(victim)`. The bucket count is a power of two,
    /// so that key always addresses the victim's other candidate bucket.
    ///
    /// Every displacement is recorded so that a chain which runs out of kicks
    /// can be unwound, leaving no fingerprint lost.
    fn insert_with_evictions(
        &mut self,
        mut alt_index: u64,
        mut fingerprint: Fingerprint,
    ) -> Result<(), Error> {
        let mut evictions = Vec::with_capacity(self.max_kicks.min(32));
        for _ in 0..self.max_kicks {
            match self.table.insert(alt_index, fingerprint, true) {
                InsertOutcome::Inserted => return Ok(()),
                InsertOutcome::Evicted { victim, slot } => {
                    trace!("kick {}: {} evicted {}", evictions.len(), fingerprint, victim);
                    evictions.push((alt_index, slot, victim));
                    alt_index ^= self.hasher.hash_fingerprint(victim);
                    fingerprint = victim;
                }
                InsertOutcome::Failed => break,
            }
        }
        // Unwind newest first so every slot gets back what it held before this call.
        let unwound = evictions.len();
        while let Some((index, slot, victim)) = evictions.pop() {
            self.table.restore(index, slot, victim);
        }
        debug!(
            "insert failed after {} kicks, {} evictions undone, load factor {:.3}",
            self.max_kicks,
            unwound,
            self.load_factor()
        );
        Err(Error::InsertFailed {
            max_kicks: self.max_kicks,
        })
    }
}

impl<H, R> CuckooFilter<H, R> {
    /// Get the number of stored fingerprints
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the filter is empty
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Maximum number of fingerprints the filter can hold (`num_buckets * bucket_size`)
    pub fn capacity(&self) -> usize {
        self.table.slot_count()
    }

    /// Number of buckets, the requested capacity rounded up to a power of two
    pub fn num_buckets(&self) -> usize {
        self.table.num_buckets()
    }

    pub fn bucket_size(&self) -> usize {
        self.table.bucket_size()
    }

    /// Fingerprint width in bits
    pub fn fingerprint_size(&self) -> usize {
        self.table.fingerprint_size()
    }

    pub fn max_kicks(&self) -> usize {
        self.max_kicks
    }

    /// Fraction of occupied slots
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.capacity() as f64
    }

    /// The hash deriver, for recomputing candidate buckets from a fingerprint
    pub fn hasher(&self) -> &HashDeriver<H> {
        &self.hasher
    }
}

impl CuckooFilter<DefaultHasher> {
    /// Create a new CuckooFilterBuilder with default settings
    pub fn builder() -> CuckooFilterBuilder {
        CuckooFilterBuilder::default()
    }

    /// Create a new CuckooFilter with default settings
    pub fn new() -> CuckooFilter<DefaultHasher> {
        Self::builder()
            .build()
            .expect("default configuration is valid")
    }

    /// Create a new CuckooFilter with the specified number of buckets
    ///
    /// # Panics
    /// Panics if `capacity` is zero or too large to allocate.
    pub fn with_capacity(capacity: usize) -> CuckooFilter<DefaultHasher> {
        Self::builder()
            .capacity(capacity)
            .build()
            .expect("invalid capacity")
    }
}

impl Default for CuckooFilter<DefaultHasher> {
    /// Create a new CuckooFilter with default settings
    fn default() -> Self {
        Self::new()
    }
}
