#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hierlock::coordinator::{AcquireOptions, LockCoordinator};
use hierlock::hierarchy::{LockRequest, LockTarget};
use hierlock::memory::{MemorySettings, MemorySubstrate, Provisioning};
use hierlock::{BucketHasher, BucketSpace, LockHandle, Result};

/// How long a background acquisition may wait before the test gives up
pub const BACKGROUND_WAIT: Duration = Duration::from_secs(5);

/// How long the test waits to see a background acquisition suspend
pub const SUSPEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can stop a test as failed or as skipped
pub trait Reporter {
    fn fatal(&self, message: &str) -> !;
    fn skip(&self, message: &str);
}

/// Reporter for plain `#[test]` functions
pub struct PanicReporter;

impl Reporter for PanicReporter {
    fn fatal(&self, message: &str) -> ! {
        panic!("{message}");
    }

    fn skip(&self, message: &str) {
        eprintln!("skipped: {message}");
    }
}

pub struct TestEnv {
    pub substrate: MemorySubstrate,
    pub coordinator: LockCoordinator<MemorySubstrate>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(MemorySettings::default(), BucketSpace::default())
    }

    pub fn with_settings(settings: MemorySettings, space: BucketSpace) -> Self {
        let substrate = MemorySubstrate::new(settings);
        let coordinator = LockCoordinator::new(substrate.clone(), space);
        Self {
            substrate,
            coordinator,
        }
    }

    pub fn provisioned() -> Self {
        Self::with_settings(
            MemorySettings {
                provisioning: Provisioning::Provisioned,
                ..MemorySettings::default()
            },
            BucketSpace::default(),
        )
    }

    pub fn hasher(&self) -> BucketHasher {
        *self.coordinator.hasher()
    }

    pub fn acquire(&self, request: &LockRequest) -> Result<LockHandle> {
        self.coordinator
            .acquire(request.level, &request.top, &request.child, &request.leaf)
    }

    /// Try `request` with a short deadline; `true` if it had to give up waiting
    pub fn blocks(&self, request: &LockRequest, wait: Duration) -> bool {
        let options = AcquireOptions::with_timeout(wait);
        match self.coordinator.acquire_with(
            request.level,
            &request.top,
            &request.child,
            &request.leaf,
            &options,
        ) {
            Ok(mut handle) => {
                handle.release();
                false
            }
            Err(hierlock::Error::Timeout { .. }) => true,
            Err(err) => panic!("unexpected error for {request}: {err:?}"),
        }
    }

    /// Run `request` on another thread, reporting the outcome on a channel
    pub fn spawn_acquire(
        &self,
        request: LockRequest,
    ) -> (Receiver<Result<LockHandle>>, JoinHandle<()>) {
        let coordinator = self.coordinator.clone();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = coordinator.acquire_with(
                request.level,
                &request.top,
                &request.child,
                &request.leaf,
                &AcquireOptions::with_timeout(BACKGROUND_WAIT),
            );
            let _ = tx.send(result);
        });
        (rx, handle)
    }

    pub fn spawn_acquire_resources(
        &self,
        top: &str,
        child: &str,
        leaves: &[&str],
    ) -> (Receiver<Result<LockHandle>>, JoinHandle<()>) {
        let coordinator = self.coordinator.clone();
        let top = top.to_string();
        let child = child.to_string();
        let leaves: Vec<String> = leaves.iter().map(|leaf| leaf.to_string()).collect();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = coordinator.acquire_resources_with(
                &top,
                &child,
                &leaves,
                &AcquireOptions::with_timeout(BACKGROUND_WAIT),
            );
            let _ = tx.send(result);
        });
        (rx, handle)
    }
}

/// Every target a request resolves to
pub fn targets_of(hasher: &BucketHasher, request: &LockRequest) -> Vec<LockTarget> {
    request
        .resolve(hasher)
        .expect("valid request")
        .targets()
        .collect()
}

/// Create rows for `targets`, failing the test if a bucket is out of range
pub fn seed_buckets(
    reporter: &dyn Reporter,
    env: &TestEnv,
    targets: impl IntoIterator<Item = LockTarget>,
) {
    let space = env.hasher().space();
    let targets: Vec<LockTarget> = targets.into_iter().collect();
    for target in &targets {
        if target.bucket >= space.size(target.level) {
            reporter.fatal(&format!("bucket out of range: {target}"));
        }
    }
    env.substrate.provision(targets);
}

/// `false` (after reporting a skip) if any two targets share a bucket
pub fn require_distinct(reporter: &dyn Reporter, targets: &[LockTarget]) -> bool {
    let unique: HashSet<&LockTarget> = targets.iter().collect();
    if unique.len() != targets.len() {
        reporter.skip("identifier chains collide in the bucket space");
        return false;
    }
    true
}

/// First `base`, `base_2`, `base_3`, ... accepted by `accept`
pub fn pick_id(base: &str, accept: impl Fn(&str) -> bool) -> String {
    if accept(base) {
        return base.to_string();
    }
    (2..)
        .map(|idx| format!("{base}_{idx}"))
        .find(|candidate| accept(candidate))
        .expect("unbounded candidate search")
}

/// A top id whose top, child and leaf buckets all differ from `base`'s
pub fn pick_different_top(hasher: &BucketHasher, base: &str, child: &str, leaf: &str) -> String {
    pick_id(&format!("{base}_alt"), |candidate| {
        hasher.top_target(candidate) != hasher.top_target(base)
            && hasher.child_target(candidate, child) != hasher.child_target(base, child)
            && hasher.leaf_target(candidate, child, leaf) != hasher.leaf_target(base, child, leaf)
    })
}

/// A leaf id whose bucket differs from `base`'s under the same parent
pub fn pick_different_leaf(hasher: &BucketHasher, top: &str, child: &str, base: &str) -> String {
    pick_id(&format!("{base}_alt"), |candidate| {
        hasher.leaf_target(top, child, candidate) != hasher.leaf_target(top, child, base)
    })
}
