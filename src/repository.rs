//! Per-level convenience calls over [`LockCoordinator`]
//!
//! Thin wrappers aligned with typical application call sites. The handle is
//! not hidden: callers release it (or let it drop) when they are done.

use crate::bucket::BucketSpace;
use crate::coordinator::{AcquireOptions, LockCoordinator};
use crate::error::Result;
use crate::handle::LockHandle;
use crate::hierarchy::HierarchyLevel;
use crate::substrate::LockSubstrate;

#[derive(Debug, Clone)]
pub struct LockRepository<S> {
    coordinator: LockCoordinator<S>,
    options: AcquireOptions,
}

impl<S: LockSubstrate> LockRepository<S> {
    pub fn new(substrate: S, space: BucketSpace) -> Self {
        Self::from_coordinator(LockCoordinator::new(substrate, space))
    }

    pub fn from_coordinator(coordinator: LockCoordinator<S>) -> Self {
        Self {
            coordinator,
            options: AcquireOptions::default(),
        }
    }

    /// Apply `options` to every call made through this repository
    pub fn with_options(mut self, options: AcquireOptions) -> Self {
        self.options = options;
        self
    }

    pub fn coordinator(&self) -> &LockCoordinator<S> {
        &self.coordinator
    }

    pub fn get_top_lock(&self, top: &str) -> Result<LockHandle> {
        self.coordinator
            .acquire_with(HierarchyLevel::Top, top, "", "", &self.options)
    }

    pub fn get_child_lock(&self, top: &str, child: &str) -> Result<LockHandle> {
        self.coordinator
            .acquire_with(HierarchyLevel::Child, top, child, "", &self.options)
    }

    pub fn get_leaf_lock(&self, top: &str, child: &str, leaf: &str) -> Result<LockHandle> {
        self.coordinator
            .acquire_with(HierarchyLevel::Leaf, top, child, leaf, &self.options)
    }

    pub fn get_leaves_lock<L: AsRef<str>>(
        &self,
        top: &str,
        child: &str,
        leaves: &[L],
    ) -> Result<LockHandle> {
        self.coordinator
            .acquire_resources_with(top, child, leaves, &self.options)
    }
}
