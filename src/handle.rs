//! Scoped capability over a set of held locks

use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::hierarchy::{LockTarget, ResolvedPath};
use crate::substrate::{LockScope, ScopeId};

/// Lifecycle of a [`LockHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Released,
}

/// Every lock of one successful acquisition, bound to one substrate scope
///
/// Only the coordinator creates handles, and only once every target is
/// held. Releasing discards the scope, which frees all targets at once.
/// Dropping an active handle releases it.
pub struct LockHandle {
    scope: Option<Box<dyn LockScope>>,
    scope_id: ScopeId,
    path: ResolvedPath,
}

impl LockHandle {
    pub(crate) fn new(scope: Box<dyn LockScope>, path: ResolvedPath) -> Self {
        Self {
            scope_id: scope.id(),
            scope: Some(scope),
            path,
        }
    }

    /// Release every held target. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.discard();
            debug!(scope = %self.scope_id, targets = self.path.len(), "released lock handle");
        }
    }

    /// Release a handle that may not exist
    pub fn release_opt(handle: Option<&mut LockHandle>) {
        if let Some(handle) = handle {
            handle.release();
        }
    }

    pub fn state(&self) -> HandleState {
        if self.scope.is_some() {
            HandleState::Active
        } else {
            HandleState::Released
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == HandleState::Active
    }

    /// Fail with `HandleReleased` unless the locks are still held
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::HandleReleased)
        }
    }

    pub fn scope_id(&self) -> ScopeId {
        self.scope_id
    }

    /// The path this handle was acquired for, in acquisition order
    pub fn path(&self) -> &ResolvedPath {
        &self.path
    }

    pub fn targets(&self) -> impl Iterator<Item = LockTarget> + '_ {
        self.path.targets()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("scope", &self.scope_id)
            .field("state", &self.state())
            .field("path", &self.path)
            .finish()
    }
}
