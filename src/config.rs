//! Filter configuration and its builder.

use crate::CuckooFilter;
use crate::hash::FINGERPRINT_SIZES;
use derive_builder::Builder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_BUCKET_SIZE: usize = 8;
pub const DEFAULT_FINGERPRINT_SIZE: usize = 8;
pub const DEFAULT_MAX_KICKS: usize = 500;

/// Construction-time parameters of a [`CuckooFilter`].
///
/// Tuning:
/// - `fingerprint_size`: fewer bits use less space and raise the false positive rate.
/// - `bucket_size`: larger buckets tolerate a higher load factor at a slightly
///   higher false positive rate.
/// - `max_kicks`: more kicks mean fewer spurious insert failures and a longer
///   worst-case insert.
#[derive(Debug, Clone, Builder)]
#[builder(
    name = "CuckooFilterBuilder",
    pattern = "owned",
    build_fn(private, name = "base_build", validate = "Self::validate")
)]
pub struct FilterConfig {
    /// Number of buckets. Rounded up to the next power of two.
    #[builder(default = "DEFAULT_CAPACITY")]
    pub(crate) capacity: usize,

    /// Number of fingerprint slots per bucket
    #[builder(default = "DEFAULT_BUCKET_SIZE")]
    pub(crate) bucket_size: usize,

    /// Size of fingerprints in bits (must be 4, 8, 16, or 32)
    #[builder(default = "DEFAULT_FINGERPRINT_SIZE")]
    pub(crate) fingerprint_size: usize,

    /// Maximum number of evictions to try before giving up on an insert
    #[builder(default = "DEFAULT_MAX_KICKS")]
    pub(crate) max_kicks: usize,

    /// Seed for hashing and victim selection. Random when unset.
    #[builder(default, setter(strip_option))]
    pub(crate) seed: Option<u64>,
}

impl CuckooFilterBuilder {
    /// Validate the builder configuration
    fn validate(&self) -> Result<(), String> {
        if let Some(fingerprint_size) = self.fingerprint_size
            && !FINGERPRINT_SIZES.contains(&fingerprint_size)
        {
            return Err("Invalid fingerprint_size".into());
        }
        if self.bucket_size == Some(0) {
            return Err("bucket_size must be greater than zero".into());
        }
        if self.capacity == Some(0) {
            return Err("capacity must be greater than zero".into());
        }
        if self.max_kicks == Some(0) {
            return Err("max_kicks must be greater than zero".into());
        }
        let capacity = self.capacity.unwrap_or(DEFAULT_CAPACITY);
        let bucket_size = self.bucket_size.unwrap_or(DEFAULT_BUCKET_SIZE);
        let fingerprint_size = self.fingerprint_size.unwrap_or(DEFAULT_FINGERPRINT_SIZE);
        capacity
            .checked_next_power_of_two()
            .and_then(|buckets| buckets.checked_mul(bucket_size))
            .and_then(|slots| slots.checked_mul(fingerprint_size))
            .map(|_| ())
            .ok_or_else(|| "capacity is too large".into())
    }

    /// Build a filter using the default hasher.
    ///
    /// Victim selection draws from a `StdRng` seeded with `seed` when one was
    /// configured, and from the operating system otherwise.
    pub fn build(self) -> Result<CuckooFilter, CuckooFilterBuilderError> {
        self.build_with_hasher::<DefaultHasher>()
    }

    /// Build a filter hashing items with `H`.
    pub fn build_with_hasher<H: Hasher + Default>(
        self,
    ) -> Result<CuckooFilter<H>, CuckooFilterBuilderError> {
        let config = self.base_build()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(CuckooFilter::from_config(config, rng))
    }

    /// Build a filter hashing items with `H` and picking eviction victims with `rng`.
    ///
    /// Without a configured `seed`, the hash seed is drawn from `rng`, so a
    /// seeded generator makes the whole filter reproducible.
    pub fn build_with<H: Hasher + Default, R: Rng>(
        self,
        rng: R,
    ) -> Result<CuckooFilter<H, R>, CuckooFilterBuilderError> {
        Ok(CuckooFilter::from_config(self.base_build()?, rng))
    }
}
