//! Ordered lock acquisition
//!
//! The coordinator turns a request into a [`ResolvedPath`], opens one
//! substrate scope and requests each target in order, blocking at each
//! step until the substrate grants it. The first failure discards the scope
//! (releasing whatever this attempt already holds) and is returned as a
//! classified [`Error`]. Callers therefore get either a handle holding every
//! target or an error with nothing held.
//!
//! There is no internal retry. `Deadlock` and `Timeout` mean the caller must
//! start the whole acquisition over.
//!
//! The coordinator keeps no mutable state of its own; it can be shared
//! freely between threads.

use std::time::Duration;

use tracing::{debug, warn};

use crate::bucket::{BucketHasher, BucketSpace};
use crate::error::{Error, Result};
use crate::handle::LockHandle;
use crate::hierarchy::{resolve_leaves, resolve_path, HierarchyLevel, ResolvedPath};
use crate::substrate::{CancelToken, LockSubstrate, SubstrateError, WaitPolicy};

/// Per-call bounds on how long an acquisition may wait
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Deadline for the whole acquisition, measured from the call
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl AcquireOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            timeout: None,
            cancel: Some(cancel),
        }
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            // A timeout too large to represent as an instant means no deadline.
            deadline: self
                .timeout
                .and_then(|timeout| std::time::Instant::now().checked_add(timeout)),
            cancel: self.cancel.clone(),
        }
    }
}

/// Acquires hierarchy locks against a blocking substrate
#[derive(Debug, Clone)]
pub struct LockCoordinator<S> {
    substrate: S,
    hasher: BucketHasher,
}

impl<S: LockSubstrate> LockCoordinator<S> {
    pub fn new(substrate: S, space: BucketSpace) -> Self {
        Self {
            substrate,
            hasher: BucketHasher::new(space),
        }
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    pub fn hasher(&self) -> &BucketHasher {
        &self.hasher
    }

    /// Lock `level` exclusively with shared locks on its ancestors
    pub fn acquire(
        &self,
        level: HierarchyLevel,
        top: &str,
        child: &str,
        leaf: &str,
    ) -> Result<LockHandle> {
        self.acquire_with(level, top, child, leaf, &AcquireOptions::default())
    }

    pub fn acquire_with(
        &self,
        level: HierarchyLevel,
        top: &str,
        child: &str,
        leaf: &str,
        options: &AcquireOptions,
    ) -> Result<LockHandle> {
        let path = resolve_path(&self.hasher, level, top, child, leaf)?;
        self.acquire_path(path, options)
    }

    /// Lock several leaves under one child exclusively, in canonical order
    pub fn acquire_resources<L: AsRef<str>>(
        &self,
        top: &str,
        child: &str,
        leaves: &[L],
    ) -> Result<LockHandle> {
        self.acquire_resources_with(top, child, leaves, &AcquireOptions::default())
    }

    pub fn acquire_resources_with<L: AsRef<str>>(
        &self,
        top: &str,
        child: &str,
        leaves: &[L],
        options: &AcquireOptions,
    ) -> Result<LockHandle> {
        let path = resolve_leaves(&self.hasher, top, child, leaves)?;
        self.acquire_path(path, options)
    }

    /// Acquire an already resolved path in order
    pub fn acquire_path(&self, path: ResolvedPath, options: &AcquireOptions) -> Result<LockHandle> {
        let wait = options.wait_policy();
        let mut scope = self.substrate.open_scope().map_err(open_failure)?;
        let scope_id = scope.id();

        for (idx, step) in path.steps().iter().enumerate() {
            let target = step.target;
            let outcome = if wait.is_cancelled() {
                Err(SubstrateError::Cancelled)
            } else {
                scope.lock_row(target, step.mode, &wait)
            };

            if let Err(err) = outcome {
                scope.discard();
                let err = Error::from_substrate(err, target.level, target.bucket, step.mode);
                warn!(
                    scope = %scope_id,
                    step = idx,
                    target = %target,
                    mode = %step.mode,
                    error = %err,
                    "aborted lock acquisition"
                );
                return Err(err);
            }

            debug!(
                scope = %scope_id,
                step = idx,
                target = %target,
                mode = %step.mode,
                chain = %step.chain,
                "granted"
            );
        }

        debug!(scope = %scope_id, targets = path.len(), "lock acquisition complete");
        Ok(LockHandle::new(scope, path))
    }
}

fn open_failure(err: SubstrateError) -> Error {
    match err {
        SubstrateError::Fault(message) => Error::SubstrateFault(message),
        other => Error::SubstrateFault(format!("open scope: {other}")),
    }
}
