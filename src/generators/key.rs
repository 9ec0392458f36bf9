//! Key generation.
//!
//! Maps a sample index in `[0, N)` to a key of the configured type. The
//! harness materializes the sequence once per run so that every phase visits
//! the same keys, including when the order is randomized or when UUID keys
//! are in play.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use uuid::Uuid;

use crate::config::KeyType;
use crate::generators::value::random_string;

/// Mixing constant spreading consecutive indices across the seed space.
const INDEX_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Render the key for one sample index.
///
/// Integer keys are decimal strings, string keys are fixed-length
/// alphanumeric strings derived deterministically from the index, and UUID
/// keys are freshly drawn v4 identifiers.
pub fn render_key(key_type: KeyType, index: u64) -> String {
    match key_type {
        KeyType::Integer => index.to_string(),
        KeyType::Uuid => Uuid::new_v4().to_string(),
        other => {
            let len = other
                .string_length()
                .expect("string key types carry a length");
            let mut rng = StdRng::seed_from_u64(index.wrapping_mul(INDEX_MIX));
            random_string(&mut rng, len)
        }
    }
}

/// Produce the key sequence for a run.
///
/// The sequence has length exactly `n`. When `random` is set the underlying
/// index space is a Fisher-Yates permutation of `[0, n)`; otherwise keys
/// appear in identity order.
pub fn generate_keys(key_type: KeyType, n: usize, random: bool, seed: Option<u64>) -> Vec<String> {
    let mut indices: Vec<u64> = (0..n as u64).collect();
    if random {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        indices.shuffle(&mut rng);
    }
    indices
        .into_iter()
        .map(|index| render_key(key_type, index))
        .collect()
}

/// Derive a per-worker RNG from the run seed, or from entropy when unseeded.
pub fn worker_rng(seed: Option<u64>, worker: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed ^ (worker as u64).wrapping_mul(INDEX_MIX)),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    #[test]
    fn test_sequence_length_is_exact() {
        for key_type in [
            KeyType::Integer,
            KeyType::String26,
            KeyType::String90,
            KeyType::String250,
            KeyType::String506,
            KeyType::Uuid,
        ] {
            for random in [false, true] {
                assert_eq!(generate_keys(key_type, 100, random, Some(7)).len(), 100);
            }
        }
    }

    #[test]
    fn test_integer_identity_order() {
        let keys = generate_keys(KeyType::Integer, 10, false, None);
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_random_integer_keys_are_a_permutation() {
        let keys = generate_keys(KeyType::Integer, 1000, true, Some(42));
        let mut buckets = vec![0usize; 1000];
        for key in &keys {
            buckets[key.parse::<usize>().unwrap()] += 1;
        }
        assert!(buckets.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_random_order_differs_from_identity() {
        let keys = generate_keys(KeyType::Integer, 1000, true, Some(42));
        let identity: Vec<String> = (0..1000).map(|i| i.to_string()).collect();
        assert_ne!(keys, identity);
    }

    #[test]
    fn test_string_keys_have_fixed_length_and_full_cardinality() {
        for (key_type, len) in [
            (KeyType::String26, 26),
            (KeyType::String90, 90),
            (KeyType::String250, 250),
            (KeyType::String506, 506),
        ] {
            let keys = generate_keys(key_type, 200, true, Some(9));
            let distinct: HashSet<&String> = keys.iter().collect();
            assert_eq!(distinct.len(), 200);
            for key in &keys {
                assert_eq!(key.len(), len);
                assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
            }
        }
    }

    #[test]
    fn test_string_keys_are_deterministic_per_index() {
        assert_eq!(
            render_key(KeyType::String26, 123),
            render_key(KeyType::String26, 123)
        );
        assert_ne!(
            render_key(KeyType::String26, 123),
            render_key(KeyType::String26, 124)
        );
    }

    #[test]
    fn test_uuid_keys_are_distinct_v4() {
        let keys = generate_keys(KeyType::Uuid, 500, false, None);
        let distinct: HashSet<&String> = keys.iter().collect();
        assert_eq!(distinct.len(), 500);
        for key in &keys {
            assert_eq!(Uuid::parse_str(key).unwrap().get_version_num(), 4);
        }
    }

    #[test]
    fn test_seeded_permutation_is_reproducible() {
        let a = generate_keys(KeyType::Integer, 100, true, Some(5));
        let b = generate_keys(KeyType::Integer, 100, true, Some(5));
        assert_eq!(a, b);
    }

    #[test]
    fn test_worker_rngs_diverge_under_one_seed() {
        let mut a = worker_rng(Some(1), 0);
        let mut b = worker_rng(Some(1), 1);
        let xs: Vec<u64> = (0..8).map(|_| a.gen()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.gen()).collect();
        assert_ne!(xs, ys);
    }
}
