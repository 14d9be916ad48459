//! Exhaustive pairwise compatibility over a small hierarchy
//!
//! Every ordered pair of single-path requests is held/attempted for real and
//! compared with the logical law: two requests conflict iff one names an
//! ancestor of (or the same node as) the other.

mod support;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use hierlock::hierarchy::{HierarchyLevel, LockMode, LockRequest, LockTarget};
use hierlock::tree::LockTree;

use support::{require_distinct, targets_of, PanicReporter, TestEnv};

const CONTENTION_WAIT: Duration = Duration::from_millis(30);

fn universe() -> Vec<LockRequest> {
    let mut requests = Vec::new();
    for top in ["u1", "u2"] {
        requests.push(LockRequest::top(top));
        for child in ["a1", "a2"] {
            requests.push(LockRequest::child(top, child));
            for leaf in ["r1", "r2"] {
                requests.push(LockRequest::leaf(top, child, leaf));
            }
        }
    }
    requests
}

fn node_path(request: &LockRequest) -> Vec<&str> {
    let all = [request.top.as_str(), request.child.as_str(), request.leaf.as_str()];
    all[..=request.level.depth()].to_vec()
}

fn logically_conflicts(a: &LockRequest, b: &LockRequest) -> bool {
    let (a, b) = (node_path(a), node_path(b));
    a.starts_with(&b) || b.starts_with(&a)
}

/// Skip the whole matrix if any two distinct nodes share a bucket
fn buckets_are_distinct(env: &TestEnv, requests: &[LockRequest]) -> bool {
    let hasher = env.hasher();
    let nodes: Vec<LockTarget> = requests
        .iter()
        .map(|request| *targets_of(&hasher, request).last().expect("non-empty path"))
        .collect();
    require_distinct(&PanicReporter, &nodes)
}

#[test]
fn universe_covers_every_level() {
    let requests = universe();
    assert_eq!(requests.len(), 14);
    for level in HierarchyLevel::ALL {
        assert!(requests.iter().any(|request| request.level == level));
    }
}

#[test]
fn resolved_paths_follow_logical_law() {
    let env = TestEnv::new();
    let requests = universe();
    if !buckets_are_distinct(&env, &requests) {
        return;
    }
    let hasher = env.hasher();

    for first in &requests {
        for second in &requests {
            let predicted = first
                .resolve(&hasher)
                .unwrap()
                .conflicts_with(&second.resolve(&hasher).unwrap());
            assert_eq!(
                predicted,
                logically_conflicts(first, second),
                "{first} vs {second}"
            );
        }
    }
}

#[test]
fn substrate_blocking_matches_logical_law() {
    let env = TestEnv::new();
    let requests = universe();
    if !buckets_are_distinct(&env, &requests) {
        return;
    }

    for first in &requests {
        let mut held = env.acquire(first).unwrap();
        for second in &requests {
            assert_eq!(
                env.blocks(second, CONTENTION_WAIT),
                logically_conflicts(first, second),
                "holding {first}, requesting {second}"
            );
        }
        held.release();
        assert_eq!(env.substrate.open_scopes(), 0, "after {first}");
    }
}

#[test]
fn lock_tree_blocking_matches_logical_law() {
    let tree = LockTree::new();
    let requests = universe();

    for first in &requests {
        let mut held = tree.lock(&node_path(first), LockMode::Exclusive).unwrap();
        for second in &requests {
            let path: Vec<String> = node_path(second).iter().map(|s| s.to_string()).collect();
            let (tx, rx) = mpsc::channel();
            let contender = tree.clone();
            let waiter = thread::spawn(move || {
                let mut guard = contender.lock(&path, LockMode::Exclusive).unwrap();
                let _ = tx.send(());
                guard.unlock();
            });

            if logically_conflicts(first, second) {
                assert!(
                    rx.recv_timeout(CONTENTION_WAIT).is_err(),
                    "holding {first}, {second} should block"
                );
                held.unlock();
                rx.recv_timeout(Duration::from_secs(2)).unwrap();
                waiter.join().unwrap();
                held = tree.lock(&node_path(first), LockMode::Exclusive).unwrap();
            } else {
                assert!(
                    rx.recv_timeout(Duration::from_secs(2)).is_ok(),
                    "holding {first}, {second} should not block"
                );
                waiter.join().unwrap();
            }
        }
        held.unlock();
    }
}
