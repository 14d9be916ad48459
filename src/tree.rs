//! In-process lock tree
//!
//! An alternative to delegating to a substrate when every contender lives in
//! one process. Nodes are keyed by exact path segment (no bucketing, so no
//! false contention) and created on first use. Each node keeps a shared
//! count and an exclusive flag behind its own mutex, with a condvar to wake
//! waiters.
//!
//! Locking walks root → target taking `Shared` on every ancestor and the
//! requested mode on the last node. Guards release in reverse order. There
//! is no deadlock detection here: callers rely on the ancestor-first walk
//! and on [`LockTree::lock_leaves`] for sibling ordering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::hierarchy::LockMode;

#[derive(Debug, Default, Clone, Copy)]
struct NodeState {
    shared: usize,
    exclusive: bool,
}

impl NodeState {
    fn admits(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.exclusive,
            LockMode::Exclusive => !self.exclusive && self.shared == 0,
        }
    }
}

#[derive(Debug, Default)]
struct Node {
    state: Mutex<NodeState>,
    changed: Condvar,
    children: Mutex<HashMap<String, Arc<Node>>>,
}

impl Node {
    fn child(&self, name: &str) -> Arc<Node> {
        let mut children = self.children.lock();
        Arc::clone(children.entry(name.to_string()).or_default())
    }

    fn find(&self, name: &str) -> Option<Arc<Node>> {
        self.children.lock().get(name).cloned()
    }

    fn acquire(&self, mode: LockMode) {
        let mut state = self.state.lock();
        while !state.admits(mode) {
            self.changed.wait(&mut state);
        }
        match mode {
            LockMode::Shared => state.shared += 1,
            LockMode::Exclusive => state.exclusive = true,
        }
    }

    fn release(&self, mode: LockMode) {
        let mut state = self.state.lock();
        match mode {
            LockMode::Shared => state.shared = state.shared.saturating_sub(1),
            LockMode::Exclusive => state.exclusive = false,
        }
        drop(state);
        self.changed.notify_all();
    }
}

/// Tree of reader/writer nodes keyed by hierarchy path
#[derive(Debug, Clone, Default)]
pub struct LockTree {
    root: Arc<Node>,
}

impl LockTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the node at `path` in `mode`, sharing every ancestor
    pub fn lock<P: AsRef<str>>(&self, path: &[P], mode: LockMode) -> Result<TreeGuard> {
        validate_path(path)?;

        let mut guard = TreeGuard::default();
        let mut node = Arc::clone(&self.root);
        for (idx, segment) in path.iter().enumerate() {
            node = node.child(segment.as_ref());
            let step_mode = if idx + 1 == path.len() {
                mode
            } else {
                LockMode::Shared
            };
            node.acquire(step_mode);
            guard.held.push((Arc::clone(&node), step_mode));
        }
        Ok(guard)
    }

    /// Lock several siblings under `parent` exclusively, in ascending order
    pub fn lock_leaves<P: AsRef<str>, L: AsRef<str>>(
        &self,
        parent: &[P],
        leaves: &[L],
    ) -> Result<TreeGuard> {
        validate_path(parent)?;
        if leaves.is_empty() {
            return Err(Error::Validation("at least one leaf is required".to_string()));
        }
        if leaves.iter().any(|leaf| leaf.as_ref().is_empty()) {
            return Err(Error::Validation("leaf name is required".to_string()));
        }

        let mut ordered: Vec<&str> = leaves.iter().map(|leaf| leaf.as_ref()).collect();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guard = self.lock(parent, LockMode::Shared)?;
        let parent_node = match guard.held.last() {
            Some((node, _)) => Arc::clone(node),
            None => return Err(Error::Validation("parent path is required".to_string())),
        };
        for leaf in ordered {
            let node = parent_node.child(leaf);
            node.acquire(LockMode::Exclusive);
            guard.held.push((node, LockMode::Exclusive));
        }
        Ok(guard)
    }

    /// Shared holders of the node at `path`, `None` if it was never created
    pub fn shared_count<P: AsRef<str>>(&self, path: &[P]) -> Option<usize> {
        self.node(path).map(|node| node.state.lock().shared)
    }

    pub fn is_exclusive<P: AsRef<str>>(&self, path: &[P]) -> Option<bool> {
        self.node(path).map(|node| node.state.lock().exclusive)
    }

    fn node<P: AsRef<str>>(&self, path: &[P]) -> Option<Arc<Node>> {
        let mut node = Arc::clone(&self.root);
        for segment in path {
            node = node.find(segment.as_ref())?;
        }
        Some(node)
    }
}

fn validate_path<P: AsRef<str>>(path: &[P]) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Validation("lock path is empty".to_string()));
    }
    if path.iter().any(|segment| segment.as_ref().is_empty()) {
        return Err(Error::Validation("lock path has an empty segment".to_string()));
    }
    Ok(())
}

/// Nodes held by one [`LockTree`] acquisition, released in reverse on drop
#[derive(Default)]
pub struct TreeGuard {
    held: Vec<(Arc<Node>, LockMode)>,
}

impl TreeGuard {
    pub fn unlock(&mut self) {
        while let Some((node, mode)) = self.held.pop() {
            node.release(mode);
        }
    }

    pub fn is_held(&self) -> bool {
        !self.held.is_empty()
    }
}

impl Drop for TreeGuard {
    fn drop(&mut self) {
        self.unlock();
    }
}

impl fmt::Debug for TreeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeGuard")
            .field("nodes", &self.held.len())
            .finish()
    }
}
