//! End-to-end scenarios against the public API only, one per literal
//! scenario in SPEC_FULL.md §8.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use maph::{Algorithm, Config, Error, Maph, Optimizer};
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("maph=debug")
        .with_writer(std::io::stderr)
        .try_init();
}

#[test]
fn update_then_remove_then_reinsert_scenario() {
    init_tracing();
    let maph = Maph::create_memory(Config {
        slot_count: 64,
        ..Config::default()
    })
    .unwrap();
    maph.set(b"alpha", b"1").unwrap();
    maph.set(b"beta", b"2").unwrap();
    maph.set(b"gamma", b"3").unwrap();

    maph.set(b"beta", b"22").unwrap();
    assert_eq!(maph.get(b"beta").unwrap(), b"22");
    assert_eq!(maph.size(), 3);

    maph.remove(b"beta").unwrap();
    assert!(matches!(maph.get(b"beta"), Err(Error::KeyNotFound)));
    maph.set(b"beta", b"222").unwrap();
    assert_eq!(maph.get(b"beta").unwrap(), b"222");
}

#[test]
fn persistence_scenario() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.maph");

    {
        let maph = Maph::create(
            &path,
            Config {
                slot_count: 64,
                ..Config::default()
            },
        )
        .unwrap();
        maph.set(b"alpha", b"1").unwrap();
        maph.set(b"beta", b"2").unwrap();
        maph.set(b"gamma", b"3").unwrap();
    }

    let maph = Maph::open(&path, true).unwrap();
    assert_eq!(maph.get(b"alpha").unwrap(), b"1");
    assert_eq!(maph.get(b"beta").unwrap(), b"2");
    assert_eq!(maph.get(b"gamma").unwrap(), b"3");
    assert!(matches!(maph.set(b"x", b"y"), Err(Error::PermissionDenied)));
}

#[test]
fn mphf_construction_and_query_scenario() {
    init_tracing();
    let maph = Maph::create_memory(Config {
        slot_count: 16,
        ..Config::default()
    })
    .unwrap();
    let keys: [&[u8]; 6] = [b"alpha", b"beta", b"gamma", b"delta", b"epsilon", b"zeta"];
    for (i, key) in keys.iter().enumerate() {
        maph.set(key, i.to_string().as_bytes()).unwrap();
    }

    maph.optimize(&Optimizer::new(Algorithm::RecSplit)).unwrap();

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(maph.get(key).unwrap(), i.to_string().as_bytes());
    }
    assert!(matches!(maph.get(b"eta"), Err(Error::KeyNotFound)));
}

#[test]
fn optimize_round_trips_through_every_algorithm() {
    init_tracing();
    for algorithm in [
        Algorithm::RecSplit,
        Algorithm::Chd,
        Algorithm::BbHash,
        Algorithm::Fch,
        Algorithm::PtHash,
    ] {
        let maph = Maph::create_memory(Config {
            slot_count: 32,
            ..Config::default()
        })
        .unwrap();
        for i in 0..10u32 {
            let key = format!("key-{i}");
            maph.set(key.as_bytes(), i.to_string().as_bytes()).unwrap();
        }
        maph.optimize(&Optimizer::new(algorithm)).unwrap();
        for i in 0..10u32 {
            let key = format!("key-{i}");
            assert_eq!(maph.get(key.as_bytes()).unwrap(), i.to_string().as_bytes());
        }
    }
}

/// SPEC_FULL.md §8 scenario 6: a writer overwrites one key with
/// monotonically increasing counters while a reader hammers `get` on that
/// same key. Every observed value must parse as an integer no greater than
/// the writer's current counter, and no read may panic on torn bytes.
#[test]
fn concurrent_reader_never_observes_torn_or_stale_future_values() {
    init_tracing();
    let maph = Arc::new(
        Maph::create_memory(Config {
            slot_count: 32_768,
            max_probes: 16,
            ..Config::default()
        })
        .unwrap(),
    );

    let mut rng = maph_testing::seeded_rng(99);
    for (key, value) in maph_testing::corpus(&mut rng, 10_000) {
        maph.set(&key, &value).unwrap();
    }
    maph.set(b"counter-key", b"0").unwrap();

    let counter = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let maph = Arc::clone(&maph);
        let counter = Arc::clone(&counter);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                maph.set(b"counter-key", n.to_string().as_bytes()).unwrap();
            }
        })
    };

    let reader = {
        let maph = Arc::clone(&maph);
        let counter = Arc::clone(&counter);
        std::thread::spawn(move || {
            for _ in 0..100_000u32 {
                if let Ok(bytes) = maph.get(b"counter-key") {
                    let text = std::str::from_utf8(&bytes).expect("torn bytes are not valid utf8");
                    let observed: u64 = text.parse().expect("torn bytes did not parse as an integer");
                    let upper_bound = counter.load(Ordering::Relaxed);
                    assert!(
                        observed <= upper_bound,
                        "observed {observed} ahead of writer's {upper_bound}"
                    );
                }
            }
        })
    };

    reader.join().unwrap();
    done.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}
