//! Salt-prefix distribution of row keys across storage partitions.
//!
//! A key's primary bucket is `xxh3(key[hash_start..hash_end]) % max_buckets`.
//! Writes add a random secondary offset in `[0, secondary_modulus)`, so rows
//! sharing a hash window (one application/agent) spread over
//! `secondary_modulus` consecutive buckets instead of hammering one. Reads
//! fan out over exactly those buckets.
//!
//! The salt is one byte prepended to the unsalted key. Salted key ordering
//! only holds within one bucket; callers merge per-bucket scans.

use rand::Rng;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::DistributorConfig;
use crate::error::{Result, TraceError};
use crate::scan::ScanRange;

/// Salt buckets must fit in the one-byte prefix.
pub const MAX_SALT_BUCKETS: usize = 256;

const PREFIX_LENGTH: usize = 1;

/// Deterministic bucket hashing plus random secondary spreading.
#[derive(Debug, Clone)]
pub struct KeyDistributor {
    hash_start: usize,
    hash_end: usize,
    max_buckets: usize,
    secondary_modulus: usize,
    /// Row `b` lists every salt a key with primary bucket `b` can receive.
    prefixes: Vec<Vec<u8>>,
}

impl KeyDistributor {
    pub fn new(
        hash_start: usize,
        hash_end: usize,
        max_buckets: usize,
        secondary_modulus: usize,
    ) -> Result<Self> {
        if max_buckets == 0 || max_buckets > MAX_SALT_BUCKETS {
            return Err(TraceError::InvalidConfiguration(format!(
                "max_buckets must be in 1..={}, got {}",
                MAX_SALT_BUCKETS, max_buckets
            )));
        }
        if secondary_modulus == 0 || secondary_modulus > max_buckets {
            return Err(TraceError::InvalidConfiguration(format!(
                "secondary_modulus must be in 1..={}, got {}",
                max_buckets, secondary_modulus
            )));
        }
        if hash_start >= hash_end {
            return Err(TraceError::InvalidConfiguration(format!(
                "hash window {}..{} is empty",
                hash_start, hash_end
            )));
        }

        let prefixes = (0..max_buckets)
            .map(|bucket| {
                (0..secondary_modulus)
                    .map(|offset| ((bucket + offset) % max_buckets) as u8)
                    .collect()
            })
            .collect();

        Ok(Self {
            hash_start,
            hash_end,
            max_buckets,
            secondary_modulus,
            prefixes,
        })
    }

    pub fn from_config(config: &DistributorConfig) -> Result<Self> {
        Self::new(
            config.hash_start,
            config.hash_end,
            config.max_buckets,
            config.secondary_modulus,
        )
    }

    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    pub fn secondary_modulus(&self) -> usize {
        self.secondary_modulus
    }

    /// Bytes the salt occupies at the front of a salted key.
    pub fn prefix_length(&self) -> usize {
        PREFIX_LENGTH
    }

    /// Primary bucket: hash of the key's window, keys shorter than the window
    /// hash whatever part of it they have.
    pub fn bucket_of(&self, key: &[u8]) -> usize {
        let end = self.hash_end.min(key.len());
        let start = self.hash_start.min(end);
        (xxh3_64(&key[start..end]) % self.max_buckets as u64) as usize
    }

    /// Salt for a write, drawing the secondary offset from `rng`.
    pub fn salt_with<R: Rng + ?Sized>(&self, key: &[u8], rng: &mut R) -> u8 {
        let offset = rng.gen_range(0..self.secondary_modulus);
        ((self.bucket_of(key) + offset) % self.max_buckets) as u8
    }

    pub fn salt(&self, key: &[u8]) -> u8 {
        self.salt_with(key, &mut rand::thread_rng())
    }

    /// Every salt `salt` could return for `key`.
    pub fn all_possible_prefixes(&self, key: &[u8]) -> &[u8] {
        &self.prefixes[self.bucket_of(key)]
    }

    pub fn write_salted_key(&self, key: &[u8]) -> Vec<u8> {
        self.write_salted_key_with(key, &mut rand::thread_rng())
    }

    pub fn write_salted_key_with<R: Rng + ?Sized>(&self, key: &[u8], rng: &mut R) -> Vec<u8> {
        let salt = self.salt_with(key, rng);
        let mut salted = Vec::with_capacity(key.len() + PREFIX_LENGTH);
        salted.push(salt);
        salted.extend_from_slice(key);
        tracing::trace!(salt, bucket_count = self.max_buckets, "salted row key");
        salted
    }

    /// Strips the salt from a stored key.
    pub fn original_key<'k>(&self, salted: &'k [u8]) -> Result<&'k [u8]> {
        salted.get(PREFIX_LENGTH..).ok_or_else(|| {
            TraceError::CorruptRecord("salted key shorter than its prefix".into())
        })
    }

    /// One salted range per bucket the unsalted `[start, stop)` can live in.
    ///
    /// When both bounds share the hash window only that key's buckets are
    /// scanned; otherwise every bucket is.
    pub fn distributed_scan_ranges(&self, start: &[u8], stop: &[u8]) -> Vec<ScanRange> {
        let range = ScanRange::new(start.to_vec(), stop.to_vec());
        let same_window = !stop.is_empty() && self.window(start) == self.window(stop);
        if same_window {
            self.all_possible_prefixes(start)
                .iter()
                .map(|&salt| range.salted(salt))
                .collect()
        } else {
            (0..self.max_buckets)
                .map(|bucket| range.salted(bucket as u8))
                .collect()
        }
    }

    fn window<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        let end = self.hash_end.min(key.len());
        &key[self.hash_start.min(end)..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn distributor() -> KeyDistributor {
        KeyDistributor::new(0, 24, 32, 4).unwrap()
    }

    #[test]
    fn test_bucket_deterministic() {
        let d = distributor();
        let key = b"checkout-service\0\0\0\0\0\0\0\0rest";
        assert_eq!(d.bucket_of(key), d.bucket_of(key));
        assert!(d.bucket_of(key) < 32);
    }

    #[test]
    fn test_bucket_ignores_bytes_outside_window() {
        let d = KeyDistributor::new(0, 4, 64, 1).unwrap();
        assert_eq!(d.bucket_of(b"abcdXXXX"), d.bucket_of(b"abcdYYYY"));
        assert_eq!(d.bucket_of(b"abcd"), d.bucket_of(b"abcdZ"));
    }

    #[test]
    fn test_short_key_hashes_available_bytes() {
        let d = KeyDistributor::new(4, 8, 16, 2).unwrap();
        assert_eq!(d.bucket_of(b"ab"), d.bucket_of(b""));
        assert!(d.bucket_of(b"abcdef") < 16);
    }

    #[test]
    fn test_salt_within_possible_prefixes() {
        let d = distributor();
        let mut rng = StdRng::seed_from_u64(7);
        let key = b"app-key";
        let prefixes = d.all_possible_prefixes(key).to_vec();
        assert_eq!(prefixes.len(), 4);
        for _ in 0..200 {
            assert!(prefixes.contains(&d.salt_with(key, &mut rng)));
        }
    }

    #[test]
    fn test_prefix_table_wraps() {
        let d = KeyDistributor::new(0, 8, 4, 3).unwrap();
        for bucket in 0..4 {
            let row = &d.prefixes[bucket];
            assert_eq!(row[0] as usize, bucket);
            assert_eq!(row[2] as usize, (bucket + 2) % 4);
        }
    }

    #[test]
    fn test_full_byte_range() {
        let d = KeyDistributor::new(0, 8, 256, 256).unwrap();
        let prefixes = d.all_possible_prefixes(b"k");
        assert_eq!(prefixes.len(), 256);
        let mut sorted = prefixes.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..=255u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_configuration() {
        for (start, end, buckets, secondary) in [
            (0, 24, 0, 1),
            (0, 24, 257, 1),
            (0, 24, 32, 0),
            (0, 24, 32, 33),
            (24, 24, 32, 4),
            (30, 24, 32, 4),
        ] {
            let err = KeyDistributor::new(start, end, buckets, secondary).unwrap_err();
            assert!(matches!(err, TraceError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn test_salted_key_roundtrip() {
        let d = distributor();
        let mut rng = StdRng::seed_from_u64(1);
        let salted = d.write_salted_key_with(b"row", &mut rng);
        assert_eq!(salted.len(), 3 + d.prefix_length());
        assert!(d.all_possible_prefixes(b"row").contains(&salted[0]));
        assert_eq!(d.original_key(&salted).unwrap(), b"row");
        assert!(d.original_key(&[]).is_err());
    }

    #[test]
    fn test_distributed_scan_ranges_same_window() {
        let d = KeyDistributor::new(0, 3, 16, 4).unwrap();
        let ranges = d.distributed_scan_ranges(b"app\x01", b"app\x09");
        assert_eq!(ranges.len(), 4);
        let salts: Vec<u8> = ranges.iter().map(|r| r.start[0]).collect();
        assert_eq!(salts, d.all_possible_prefixes(b"app").to_vec());
        for range in &ranges {
            assert_eq!(&range.start[1..], b"app\x01");
            assert_eq!(&range.stop[1..], b"app\x09");
        }
    }

    #[test]
    fn test_distributed_scan_ranges_cross_window() {
        let d = KeyDistributor::new(0, 3, 16, 4).unwrap();
        let ranges = d.distributed_scan_ranges(b"aaa", b"zzz");
        assert_eq!(ranges.len(), 16);
        let unbounded = d.distributed_scan_ranges(b"aaa", b"");
        assert_eq!(unbounded.len(), 16);
    }
}
