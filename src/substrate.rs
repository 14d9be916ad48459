//! Lock substrate interface
//!
//! The substrate owns every piece of shared mutable lock state: it grants
//! row locks inside scopes, blocks conflicting requests, detects deadlocks
//! and releases a scope's locks when the scope is discarded. The
//! coordinator only decides what to request and in which order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::hierarchy::{LockMode, LockTarget};

/// Failure reported by a single row-lock request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstrateError {
    /// Incompatible holder and the substrate does not wait
    #[error("lock conflict")]
    Conflict,

    /// The substrate's cycle detector chose this scope as the victim
    #[error("deadlock detected")]
    Deadlock,

    #[error("lock wait timeout after {waited:?}")]
    Timeout { waited: Duration },

    #[error("lock wait cancelled")]
    Cancelled,

    /// The row does not exist and the substrate does not create rows on demand
    #[error("lock row not provisioned")]
    MissingRow,

    #[error("{0}")]
    Fault(String),
}

/// Identifier of a substrate scope, unique for the substrate's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u64);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope-{}", self.0)
    }
}

/// A source of scopes
pub trait LockSubstrate: Send + Sync {
    fn open_scope(&self) -> Result<Box<dyn LockScope>, SubstrateError>;
}

impl<S: LockSubstrate + ?Sized> LockSubstrate for Arc<S> {
    fn open_scope(&self) -> Result<Box<dyn LockScope>, SubstrateError> {
        (**self).open_scope()
    }
}

/// Unit within which acquired row locks live and are released together
pub trait LockScope: Send {
    fn id(&self) -> ScopeId;

    /// Request `target` in `mode`, suspending until granted or failed
    ///
    /// A target already held by this scope in a covering mode is granted
    /// immediately.
    fn lock_row(
        &mut self,
        target: LockTarget,
        mode: LockMode,
        wait: &WaitPolicy,
    ) -> Result<(), SubstrateError>;

    /// Release every lock held by the scope. Idempotent.
    fn discard(&mut self);
}

// =============================================================================
// Cancellation and deadlines
// =============================================================================

/// Cooperative cancellation signal shared between a caller and its waits
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounds on how long a single row request may stay suspended
#[derive(Debug, Clone, Default)]
pub struct WaitPolicy {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
}

impl WaitPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Deadline `timeout` from now, or none when that instant is unrepresentable
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancel: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancelToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Earlier of the caller deadline and `other`
    pub fn earliest(&self, other: Option<Instant>) -> Option<Instant> {
        match (self.deadline, other) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
