use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

#[derive(Debug, PartialEq)]
enum TestError {
    Cache(CacheError),
    Refused,
}

impl From<CacheError> for TestError {
    fn from(err: CacheError) -> Self {
        Self::Cache(err)
    }
}

// === Canonicalization ===

#[test]
fn constructs_once_per_key() {
    let cache: NodeCache<u32, usize> = NodeCache::new("test");
    let calls = AtomicUsize::new(0);
    let create = |k: &u32| -> Result<usize, TestError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(*k as usize * 10)
    };

    assert_eq!(cache.get_or_add(3, create), Ok(30));
    assert_eq!(cache.get_or_add(3, create), Ok(30));
    assert_eq!(cache.get_or_add(4, create), Ok(40));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get(&3), Some(30));
    assert_eq!(cache.get(&5), None);
}

#[test]
fn concurrent_callers_observe_one_construction() {
    let cache: NodeCache<&'static str, usize> = NodeCache::new("test");
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(8);

    let results: Vec<usize> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache
                        .get_or_add("shared", |_| -> Result<usize, TestError> {
                            let n = calls.fetch_add(1, Ordering::SeqCst);
                            thread::yield_now();
                            Ok(100 + n)
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|&r| r == results[0]));
}

// === Reentrancy ===

#[test]
fn nested_lookup_of_other_key_is_allowed() {
    let cache: NodeCache<u32, u32> = NodeCache::new("test");
    let outer = cache.get_or_add(1, |_| -> Result<u32, TestError> {
        let inner = cache.get_or_add::<TestError, _>(2, |_| Ok(20))?;
        Ok(inner + 1)
    });
    assert_eq!(outer, Ok(21));
    assert_eq!(cache.get(&2), Some(20));
}

#[test]
fn nested_lookup_across_caches_is_allowed() {
    let tracker = Arc::new(ConstructionTracker::new());
    let a: NodeCache<u32, u32> = NodeCache::with_tracker("a", Arc::clone(&tracker));
    let b: NodeCache<u32, u32> = NodeCache::with_tracker("b", tracker);
    let value = a.get_or_add(1, |_| -> Result<u32, TestError> {
        b.get_or_add(1, |_| Ok(7))
    });
    assert_eq!(value, Ok(7));
}

#[test]
fn same_key_reentrancy_is_a_cycle() {
    let cache: NodeCache<u32, u32> = NodeCache::new("methods");
    let result = cache.get_or_add(9, |_| -> Result<u32, TestError> {
        cache.get_or_add(9, |_| Ok(0))
    });
    assert_eq!(
        result,
        Err(TestError::Cache(CacheError::Cycle {
            cache: "methods",
            key: "9".to_string(),
        }))
    );
    assert!(cache.is_empty());
}

#[test]
fn cross_thread_cycle_is_detected() {
    let cache: NodeCache<u32, u32> = NodeCache::new("test");
    let barrier = Barrier::new(2);

    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| {
            cache.get_or_add(1, |_| -> Result<u32, TestError> {
                barrier.wait();
                cache.get_or_add(2, |_| Ok(2))
            })
        });
        let b = scope.spawn(|| {
            cache.get_or_add(2, |_| -> Result<u32, TestError> {
                barrier.wait();
                cache.get_or_add(1, |_| Ok(1))
            })
        });
        (a.join().unwrap(), b.join().unwrap())
    });

    let is_cycle = |r: &Result<u32, TestError>| {
        matches!(r, Err(TestError::Cache(CacheError::Cycle { .. })))
    };
    assert!(a.is_err() && b.is_err());
    assert!(is_cycle(&a) || is_cycle(&b));
}

#[test]
fn finished_dependency_does_not_block_later_requests() {
    // A builds 1 and waits on 2, owned by B. B finishes 2 and asks for 1
    // right away, before A has necessarily woken up. That is not a cycle.
    for _ in 0..50 {
        let cache: NodeCache<u32, u32> = NodeCache::new("test");
        let started = Barrier::new(2);

        let (a, b) = thread::scope(|scope| {
            let b = scope.spawn(|| {
                cache.get_or_add(2, |_| -> Result<u32, TestError> {
                    started.wait();
                    thread::sleep(Duration::from_millis(20));
                    Ok(2)
                })?;
                cache.get_or_add(1, |_| Ok(100))
            });
            let a = scope.spawn(|| {
                started.wait();
                cache.get_or_add(1, |_| -> Result<u32, TestError> {
                    Ok(cache.get_or_add::<TestError, _>(2, |_| Ok(0))? + 1)
                })
            });
            (a.join().unwrap(), b.join().unwrap())
        });

        assert!(a.is_ok(), "{a:?}");
        assert_eq!(a, b);
    }
}

// === Failure ===

#[test]
fn failed_construction_is_not_cached() {
    let cache: NodeCache<u32, u32> = NodeCache::new("test");
    assert_eq!(cache.get_or_add(1, |_| Err(TestError::Refused)), Err(TestError::Refused));
    assert_eq!(cache.get(&1), None);
    assert_eq!(cache.get_or_add(1, |_| -> Result<u32, TestError> { Ok(5) }), Ok(5));
}

#[test]
fn tracker_refuses_closing_wait() {
    let tracker = ConstructionTracker::new();
    let main = thread::current().id();
    let other = thread::spawn(|| thread::current().id()).join().unwrap();
    let running = || Arc::new(AtomicBool::new(false));

    assert!(tracker.begin_wait(main, other, running()));
    assert!(!tracker.begin_wait(other, main, running()));
    tracker.end_wait(main);
    assert!(tracker.begin_wait(other, main, running()));
}

#[test]
fn tracker_ignores_settled_edges() {
    let tracker = ConstructionTracker::new();
    let main = thread::current().id();
    let other = thread::spawn(|| thread::current().id()).join().unwrap();
    let settled = Arc::new(AtomicBool::new(false));

    assert!(tracker.begin_wait(main, other, Arc::clone(&settled)));
    settled.store(true, Ordering::Release);
    // main has not called end_wait yet, but its construction is done
    assert!(tracker.begin_wait(other, main, Arc::new(AtomicBool::new(false))));
}

mod proptest_cache {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn repeated_lookups_return_first_value(keys in proptest::collection::vec(0u8..8, 1..64)) {
            let cache: NodeCache<u8, usize> = NodeCache::new("prop");
            let counter = AtomicUsize::new(0);
            let first: Vec<usize> = keys
                .iter()
                .map(|&k| cache
                    .get_or_add(k, |_| -> Result<usize, TestError> {
                        Ok(counter.fetch_add(1, Ordering::SeqCst))
                    })
                    .unwrap())
                .collect();
            for (&k, &v) in keys.iter().zip(&first) {
                prop_assert_eq!(cache.get(&k), Some(v));
            }
            let distinct: std::collections::HashSet<u8> = keys.iter().copied().collect();
            prop_assert_eq!(counter.load(Ordering::SeqCst), distinct.len());
        }
    }
}
