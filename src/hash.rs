//! Fingerprint and candidate-bucket derivation.
//!
//! Every item is reduced to a short [`Fingerprint`] and two 64-bit bucket keys.
//! The second key is always `primary ^ hash_fingerprint(fp)`, so it can be
//! recomputed from a stored fingerprint without the original item. That is
//! what lets the filter relocate fingerprints during eviction chains.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;
use std::marker::PhantomData;

/// Fingerprint widths (in bits) the table can pack into 64-bit words.
pub(crate) const FINGERPRINT_SIZES: [usize; 4] = [4, 8, 16, 32];

/// Domain separators mixed into the seed before the two streams are expanded.
const FINGERPRINT_STREAM: u64 = 0x6670_7374_7265_616d;
const INDEX_STREAM: u64 = 0x6964_7873_7472_6d00;

/// A compact digest of an item; the only thing the table stores.
///
/// Only the low `fingerprint_size` bits are ever set. Zero is a valid value,
/// slot occupancy is tracked separately by the table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u32);

impl Fingerprint {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Derives fingerprints and candidate bucket keys from raw item bytes.
///
/// Two independent hash streams are used: one for fingerprints, one for bucket
/// keys (and for hashing fingerprints). Each stream is a generic hasher `H`
/// keyed by a 64-bit seed written before the data. No hasher state is kept
/// between calls: every digest starts from `H::default()`, so the deriver is
/// `Copy` and may be shared across threads.
///
/// Two derivers built with the same seed, width and hasher produce identical
/// output for every input.
#[derive(Debug)]
pub struct HashDeriver<H = DefaultHasher> {
    fingerprint_seed: u64,
    index_seed: u64,
    fingerprint_size: usize,
    _hasher: PhantomData<fn() -> H>,
}

impl<H> Clone for HashDeriver<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for HashDeriver<H> {}

impl<H: Hasher + Default> HashDeriver<H> {
    /// Create a deriver with a random seed.
    ///
    /// # Panics
    /// Panics if `fingerprint_size` is not 4, 8, 16 or 32.
    pub fn new(fingerprint_size: usize) -> Self {
        Self::with_seed(rand::random(), fingerprint_size)
    }

    /// Create a deterministic deriver. Both stream seeds are expanded from `seed`.
    ///
    /// # Panics
    /// Panics if `fingerprint_size` is not 4, 8, 16 or 32.
    pub fn with_seed(seed: u64, fingerprint_size: usize) -> Self {
        assert!(
            FINGERPRINT_SIZES.contains(&fingerprint_size),
            "Invalid fingerprint_size: {fingerprint_size}"
        );
        let mut state = seed;
        let fingerprint_seed = splitmix64(&mut state) ^ FINGERPRINT_STREAM;
        let index_seed = splitmix64(&mut state) ^ INDEX_STREAM;
        Self {
            fingerprint_seed,
            index_seed,
            fingerprint_size,
            _hasher: PhantomData,
        }
    }

    /// Width of produced fingerprints in bits.
    pub fn fingerprint_size(&self) -> usize {
        self.fingerprint_size
    }

    /// Digest `item` on the fingerprint stream and keep the top
    /// `fingerprint_size` bits.
    pub fn fingerprint(&self, item: &[u8]) -> Fingerprint {
        let hash = digest::<H>(self.fingerprint_seed, item);
        Fingerprint((hash >> (u64::BITS as usize - self.fingerprint_size)) as u32)
    }

    /// Primary bucket key (index stream) and fingerprint (fingerprint stream) of `item`.
    pub fn primary_and_fingerprint(&self, item: &[u8]) -> (u64, Fingerprint) {
        (digest::<H>(self.index_seed, item), self.fingerprint(item))
    }

    /// Hash of a fingerprint on its own, without the item it came from.
    ///
    /// The fingerprint is serialized as 4 little-endian bytes regardless of
    /// the configured width.
    pub fn hash_fingerprint(&self, fingerprint: Fingerprint) -> u64 {
        digest::<H>(self.index_seed, &fingerprint.0.to_le_bytes())
    }

    /// Both candidate bucket keys and the fingerprint of `item`.
    ///
    /// Returns `(primary, secondary, fingerprint)` where
    /// `secondary == primary ^ self.hash_fingerprint(fingerprint)`.
    pub fn derive_candidates(&self, item: &[u8]) -> (u64, u64, Fingerprint) {
        let (primary, fingerprint) = self.primary_and_fingerprint(item);
        let secondary = primary ^ self.hash_fingerprint(fingerprint);
        (primary, secondary, fingerprint)
    }
}

/// Seeded one-shot digest; the hasher lives only for this call.
fn digest<H: Hasher + Default>(seed: u64, bytes: &[u8]) -> u64 {
    let mut hasher = H::default();
    hasher.write_u64(seed);
    hasher.write(bytes);
    hasher.finish()
}

/// SplitMix64 step, used to expand one user seed into the stream seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
