//! In-process lock substrate
//!
//! `MemorySubstrate` behaves like a transactional row store used purely for
//! locking: each scope is a transaction, `lock_row` is a blocking
//! `SELECT ... FOR SHARE` / `FOR UPDATE` on a bucket row, and `discard` is a
//! rollback.
//!
//! # Waiting
//!
//! Conflicting requests record the scopes they wait for and suspend on a
//! condition variable until the row becomes compatible. A wait ends early
//! when:
//! - the lock-wait timeout or the caller's deadline passes (`Timeout`)
//! - the caller's cancel token fires (`Cancelled`)
//! - adding this wait would close a cycle in the waits-for graph
//!   (`Deadlock`, the requester is the victim)
//!
//! In `NoWait` mode a conflicting request fails at once with `Conflict`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::hierarchy::{LockMode, LockTarget};
use crate::substrate::{LockScope, LockSubstrate, ScopeId, SubstrateError, WaitPolicy};

/// Default lock wait timeout, matching InnoDB's `innodb_lock_wait_timeout`
pub const DEFAULT_LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(50);

/// Upper bound on a single condvar sleep so cancellation is noticed promptly
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What a conflicting request does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Suspend until granted (default)
    #[default]
    Blocking,
    /// Fail immediately with `Conflict`
    NoWait,
}

/// Whether lock rows spring into existence when first requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    #[default]
    OnDemand,
    /// Rows must be created up front with [`MemorySubstrate::provision`]
    Provisioned,
}

/// Tuning for [`MemorySubstrate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySettings {
    pub wait_mode: WaitMode,
    /// `None` waits forever unless the caller supplies a deadline
    pub lock_wait_timeout: Option<Duration>,
    pub deadlock_detection: bool,
    pub provisioning: Provisioning,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            wait_mode: WaitMode::Blocking,
            lock_wait_timeout: Some(DEFAULT_LOCK_WAIT_TIMEOUT),
            deadlock_detection: true,
            provisioning: Provisioning::OnDemand,
        }
    }
}

/// Snapshot of who holds a row
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowHolders {
    pub shared: Vec<ScopeId>,
    pub exclusive: Option<ScopeId>,
}

impl RowHolders {
    pub fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

#[derive(Debug, Default)]
struct Row {
    shared: HashSet<ScopeId>,
    exclusive: Option<ScopeId>,
}

impl Row {
    /// Scopes that must release before `scope` can hold this row in `mode`
    fn blockers(&self, scope: ScopeId, mode: LockMode) -> Vec<ScopeId> {
        if self.held_by(scope).is_some_and(|held| held.covers(&mode)) {
            return Vec::new();
        }
        if let Some(holder) = self.exclusive {
            return vec![holder];
        }
        match mode {
            LockMode::Shared => Vec::new(),
            LockMode::Exclusive => self
                .shared
                .iter()
                .copied()
                .filter(|holder| *holder != scope)
                .collect(),
        }
    }

    /// Strongest mode `scope` already holds on this row
    fn held_by(&self, scope: ScopeId) -> Option<LockMode> {
        if self.exclusive == Some(scope) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&scope) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn grant(&mut self, scope: ScopeId, mode: LockMode) {
        if self.held_by(scope).is_some_and(|held| held.covers(&mode)) {
            return;
        }
        match mode {
            LockMode::Shared => {
                self.shared.insert(scope);
            }
            LockMode::Exclusive => {
                self.shared.remove(&scope);
                self.exclusive = Some(scope);
            }
        }
    }

    fn release(&mut self, scope: ScopeId) {
        self.shared.remove(&scope);
        if self.exclusive == Some(scope) {
            self.exclusive = None;
        }
    }

    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }

    fn snapshot(&self) -> RowHolders {
        let mut shared: Vec<ScopeId> = self.shared.iter().copied().collect();
        shared.sort();
        RowHolders {
            shared,
            exclusive: self.exclusive,
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    rows: HashMap<LockTarget, Row>,
    /// Waits-for edges of currently suspended scopes
    waits: HashMap<ScopeId, Vec<ScopeId>>,
    open: HashSet<ScopeId>,
}

impl LockTable {
    /// Whether following waits-for edges from `start` leads back to it
    fn closes_cycle(&self, start: ScopeId) -> bool {
        let mut stack: Vec<ScopeId> = self.waits.get(&start).cloned().unwrap_or_default();
        let mut seen = HashSet::new();
        while let Some(scope) = stack.pop() {
            if scope == start {
                return true;
            }
            if !seen.insert(scope) {
                continue;
            }
            if let Some(next) = self.waits.get(&scope) {
                stack.extend(next.iter().copied());
            }
        }
        false
    }

    /// Forget `scope`'s wait edges and drop an on-demand row nobody holds
    fn abandon(&mut self, scope: ScopeId, target: &LockTarget, on_demand: bool) {
        self.waits.remove(&scope);
        if on_demand && self.rows.get(target).is_some_and(Row::is_free) {
            self.rows.remove(target);
        }
    }
}

#[derive(Debug)]
struct Shared {
    table: Mutex<LockTable>,
    released: Condvar,
    settings: MemorySettings,
    next_scope: AtomicU64,
}

/// In-process blocking row-lock store
#[derive(Debug, Clone)]
pub struct MemorySubstrate {
    shared: Arc<Shared>,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new(MemorySettings::default())
    }
}

impl MemorySubstrate {
    pub fn new(settings: MemorySettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(LockTable::default()),
                released: Condvar::new(),
                settings,
                next_scope: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> MemorySettings {
        self.shared.settings
    }

    /// Create lock rows ahead of use
    pub fn provision(&self, targets: impl IntoIterator<Item = LockTarget>) {
        let mut table = self.shared.table.lock();
        for target in targets {
            table.rows.entry(target).or_default();
        }
    }

    pub fn row_count(&self) -> usize {
        self.shared.table.lock().rows.len()
    }

    /// Current holders of `target`, `None` if the row does not exist
    pub fn holders(&self, target: &LockTarget) -> Option<RowHolders> {
        self.shared.table.lock().rows.get(target).map(Row::snapshot)
    }

    /// Number of scopes opened and not yet discarded
    pub fn open_scopes(&self) -> usize {
        self.shared.table.lock().open.len()
    }

    /// Number of scopes currently suspended in `lock_row`
    pub fn waiting_scopes(&self) -> usize {
        self.shared.table.lock().waits.len()
    }

    /// Poll until at least `count` scopes are suspended or `timeout` passes
    pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.waiting_scopes() >= count {
                return true;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl LockSubstrate for MemorySubstrate {
    fn open_scope(&self) -> Result<Box<dyn LockScope>, SubstrateError> {
        let id = ScopeId(self.shared.next_scope.fetch_add(1, Ordering::Relaxed));
        self.shared.table.lock().open.insert(id);
        Ok(Box::new(MemoryScope {
            id,
            shared: Arc::clone(&self.shared),
            held: Vec::new(),
            discarded: false,
        }))
    }
}

/// A transaction-like scope on a [`MemorySubstrate`]
#[derive(Debug)]
pub struct MemoryScope {
    id: ScopeId,
    shared: Arc<Shared>,
    held: Vec<LockTarget>,
    discarded: bool,
}

impl LockScope for MemoryScope {
    fn id(&self) -> ScopeId {
        self.id
    }

    fn lock_row(
        &mut self,
        target: LockTarget,
        mode: LockMode,
        wait: &WaitPolicy,
    ) -> Result<(), SubstrateError> {
        if self.discarded {
            return Err(SubstrateError::Fault(format!(
                "{} already discarded",
                self.id
            )));
        }

        let settings = self.shared.settings;
        let started = Instant::now();
        // A timeout too large to represent as an instant never expires.
        let deadline = wait.earliest(
            settings
                .lock_wait_timeout
                .and_then(|timeout| started.checked_add(timeout)),
        );

        let on_demand = settings.provisioning == Provisioning::OnDemand;
        let mut table = self.shared.table.lock();
        loop {
            // The last holder's discard may remove an on-demand row while we
            // wait on it, so it is looked up (and recreated) on every pass.
            let row = match (table.rows.contains_key(&target), on_demand) {
                (true, _) | (false, true) => table.rows.entry(target).or_default(),
                (false, false) => {
                    table.waits.remove(&self.id);
                    return Err(SubstrateError::MissingRow);
                }
            };
            let blockers = row.blockers(self.id, mode);

            if blockers.is_empty() {
                row.grant(self.id, mode);
                table.waits.remove(&self.id);
                if !self.held.contains(&target) {
                    self.held.push(target);
                }
                return Ok(());
            }

            if settings.wait_mode == WaitMode::NoWait {
                table.abandon(self.id, &target, on_demand);
                return Err(SubstrateError::Conflict);
            }

            if wait.is_cancelled() {
                table.abandon(self.id, &target, on_demand);
                return Err(SubstrateError::Cancelled);
            }

            table.waits.insert(self.id, blockers);
            if settings.deadlock_detection && table.closes_cycle(self.id) {
                table.abandon(self.id, &target, on_demand);
                debug!(scope = %self.id, target = %target, mode = %mode, "deadlock victim");
                return Err(SubstrateError::Deadlock);
            }

            let now = Instant::now();
            if let Some(deadline) = deadline {
                if now >= deadline {
                    table.abandon(self.id, &target, on_demand);
                    return Err(SubstrateError::Timeout {
                        waited: now - started,
                    });
                }
            }

            trace!(scope = %self.id, target = %target, mode = %mode, "waiting for row");
            let slice = now + CANCEL_POLL_INTERVAL;
            let wake_at = deadline.map_or(slice, |deadline| deadline.min(slice));
            let _ = self.shared.released.wait_until(&mut table, wake_at);
        }
    }

    fn discard(&mut self) {
        if self.discarded {
            return;
        }
        self.discarded = true;

        let mut table = self.shared.table.lock();
        let on_demand = self.shared.settings.provisioning == Provisioning::OnDemand;
        for target in self.held.drain(..) {
            let emptied = match table.rows.get_mut(&target) {
                Some(row) => {
                    row.release(self.id);
                    row.is_free()
                }
                None => false,
            };
            if emptied && on_demand {
                table.rows.remove(&target);
            }
        }
        table.waits.remove(&self.id);
        table.open.remove(&self.id);
        drop(table);
        self.shared.released.notify_all();
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        self.discard();
    }
}
