//! Dev-only fixture generation for the `maph` workspace, in the shape of
//! `dolos-testing`: a non-published crate other crates' test suites pull
//! in via `dev-dependencies` for `rand`-based fixture generation and
//! shared `proptest` strategies, rather than every crate rolling its own
//! key/value corpus.

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use maph_core::slot::PAYLOAD_CAPACITY;

/// A deterministic RNG seeded for reproducible fixtures.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random byte-string key of length `1..=32`.
pub fn random_key(rng: &mut impl Rng) -> Vec<u8> {
    let len = rng.random_range(1..=32);
    (0..len).map(|_| rng.random()).collect()
}

/// `count` distinct random keys.
pub fn distinct_keys(rng: &mut impl Rng, count: usize) -> Vec<Vec<u8>> {
    let mut seen = std::collections::HashSet::with_capacity(count);
    while seen.len() < count {
        seen.insert(random_key(rng));
    }
    seen.into_iter().collect()
}

/// A value shaped like the canonical workload (SPEC_FULL.md §1): a short
/// JSON document, well within [`PAYLOAD_CAPACITY`].
pub fn json_like_value(rng: &mut impl Rng, id: u64) -> Vec<u8> {
    let tag: u32 = rng.random();
    format!(r#"{{"id":{id},"tag":{tag},"active":{}}}"#, tag % 2 == 0).into_bytes()
}

/// `n` `(key, value)` pairs with distinct keys and values under
/// [`PAYLOAD_CAPACITY`], suitable for populating a table end to end.
pub fn corpus(rng: &mut impl Rng, n: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    distinct_keys(rng, n)
        .into_iter()
        .enumerate()
        .map(|(i, key)| (key, json_like_value(rng, i as u64)))
        .collect()
}

/// `proptest` strategy for an arbitrary non-empty key, `1..=32` bytes.
pub fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop_vec(any::<u8>(), 1..=32)
}

/// `proptest` strategy for an arbitrary value within [`PAYLOAD_CAPACITY`].
pub fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    prop_vec(any::<u8>(), 0..=PAYLOAD_CAPACITY)
}

/// `proptest` strategy for `count` pairwise-distinct keys.
pub fn arb_distinct_keys(count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop_vec(arb_key(), count).prop_filter("keys must be pairwise distinct", |keys| {
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        unique.len() == keys.len()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keys_are_actually_distinct() {
        let mut rng = seeded_rng(1);
        let keys = distinct_keys(&mut rng, 50);
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 50);
    }

    #[test]
    fn json_like_value_stays_within_capacity() {
        let mut rng = seeded_rng(2);
        for i in 0..100 {
            let v = json_like_value(&mut rng, i);
            assert!(v.len() <= PAYLOAD_CAPACITY);
            assert!(std::str::from_utf8(&v).is_ok());
        }
    }

    #[test]
    fn corpus_has_no_duplicate_keys() {
        let mut rng = seeded_rng(3);
        let pairs = corpus(&mut rng, 200);
        let unique: std::collections::HashSet<_> = pairs.iter().map(|(k, _)| k).collect();
        assert_eq!(unique.len(), 200);
    }
}
