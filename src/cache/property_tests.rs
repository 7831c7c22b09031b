//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache invariants over arbitrary operation
//! sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::thread::sleep;
use std::time::Duration;

use crate::cache::{normalize_key, LyricsCache};

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

// == Strategies ==
/// Generates lookup keys with mixed case
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _-]{1,48}".prop_map(|s| s)
}

/// Generates cache values
fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,256}".prop_map(|s| s)
}

/// Surrounds a key with random whitespace and flips its case
fn key_variant_strategy(key: String) -> impl Strategy<Value = String> {
    ("[ \t]{0,3}", "[ \t]{0,3}", any::<bool>()).prop_map(move |(lead, trail, upper)| {
        let body = if upper {
            key.to_uppercase()
        } else {
            key.to_lowercase()
        };
        format!("{lead}{body}{trail}")
    })
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Keys that normalize identically address the same entry.
    #[test]
    fn prop_equivalent_keys_collide(
        (key, variant) in key_strategy().prop_flat_map(|key| {
            (Just(key.clone()), key_variant_strategy(key))
        }),
        value in value_strategy()
    ) {
        let cache = LyricsCache::new(TEST_TTL, TEST_MAX_ENTRIES);

        cache.set(&key, value.clone());

        prop_assert_eq!(cache.get(&variant), Some(value));
        prop_assert_eq!(cache.len(), 1);
    }

    // Storing then retrieving before expiry returns the stored value.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let cache = LyricsCache::new(TEST_TTL, TEST_MAX_ENTRIES);

        cache.set(&key, value.clone());

        prop_assert_eq!(cache.get(&key), Some(value));
    }

    // A second write to the same key replaces the first.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let cache = LyricsCache::new(TEST_TTL, TEST_MAX_ENTRIES);

        cache.set(&key, value1);
        cache.set(&key, value2.clone());

        prop_assert_eq!(cache.get(&key), Some(value2));
        prop_assert_eq!(cache.len(), 1);
    }

    // The map never holds more than max_entries after a set returns.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..200)
    ) {
        let max_entries = 50;
        let cache = LyricsCache::new(TEST_TTL, max_entries);

        for (key, value) in entries {
            cache.set(&key, value);
            prop_assert!(
                cache.len() <= max_entries,
                "Cache size {} exceeds max {}",
                cache.len(),
                max_entries
            );
        }
    }

    // Hit and miss counters match the observed lookup outcomes.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let cache = LyricsCache::new(TEST_TTL, TEST_MAX_ENTRIES);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => cache.set(&key, value),
                CacheOp::Get { key } => match cache.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, cache.len(), "Total entries mismatch");
    }

    // Below capacity the cache behaves like a map keyed by normalized keys.
    #[test]
    fn prop_matches_model_below_capacity(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let cache = LyricsCache::new(TEST_TTL, 1000);
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    model.insert(normalize_key(&key), value.clone());
                    cache.set(&key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(cache.get(&key), model.get(&normalize_key(&key)).cloned());
                }
            }
        }

        prop_assert_eq!(cache.len(), model.len());
    }
}

// Separate proptest block with fewer cases for time-sensitive TTL tests
proptest! {
    #![proptest_config(ProptestConfig::with_cases(5))]

    // After the TTL elapses a lookup misses.
    #[test]
    fn prop_ttl_expiration_behavior(key in key_strategy(), value in value_strategy()) {
        let cache = LyricsCache::new(Duration::from_secs(1), TEST_MAX_ENTRIES);

        cache.set(&key, value.clone());
        prop_assert_eq!(cache.get(&key), Some(value), "Value should match before expiration");

        sleep(Duration::from_millis(1100));

        prop_assert!(cache.get(&key).is_none(), "Entry should not be found after TTL expires");
    }
}

// Property tests for earliest-expiry eviction
proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // With nothing expired, a full cache evicts the first-written key only.
    #[test]
    fn prop_evicts_earliest_expiry(
        keys in prop::collection::hash_set("[a-z]{1,16}", 3..10),
        new_key in "[A-Z]{1,16}",
        new_value in value_strategy()
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        // Upper-case letters normalize to lower case; skip collisions
        prop_assume!(!keys.contains(&normalize_key(&new_key)));

        let cache = LyricsCache::new(TEST_TTL, keys.len());

        for key in &keys {
            cache.set(key, "value");
            // Distinct insertion instants give distinct expirations
            sleep(Duration::from_millis(2));
        }

        cache.set(&new_key, new_value.clone());

        prop_assert_eq!(cache.len(), keys.len());
        prop_assert!(cache.get(&keys[0]).is_none(), "Earliest-expiring key should be evicted");
        for key in &keys[1..] {
            prop_assert!(cache.get(key).is_some(), "Key {} should survive", key);
        }
        prop_assert_eq!(cache.get(&new_key), Some(new_value));
    }
}
