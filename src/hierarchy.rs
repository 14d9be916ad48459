//! Hierarchy model and path resolution
//!
//! A lock request names a node in a three-level hierarchy
//! (top-level entity → child collection → leaf resource). Resolving it
//! produces the ordered list of bucket locks to request:
//!
//! - every ancestor is locked `Shared` (an intent lock)
//! - the requested node is locked `Exclusive`
//! - for multi-leaf requests, every leaf is `Exclusive` and leaves are
//!   ordered ascending by raw identifier
//!
//! Ancestors always come before descendants, which together with the
//! canonical leaf order gives every caller the same global acquisition order.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bucket::BucketHasher;
use crate::error::{Error, Result};

// =============================================================================
// Levels and modes
// =============================================================================

/// Level in the hierarchy, ordered ancestor → descendant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Top,
    Child,
    Leaf,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 3] = [
        HierarchyLevel::Top,
        HierarchyLevel::Child,
        HierarchyLevel::Leaf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HierarchyLevel::Top => "top",
            HierarchyLevel::Child => "child",
            HierarchyLevel::Leaf => "leaf",
        }
    }

    /// Depth of the level, starting at 0 for `Top`
    pub fn depth(&self) -> usize {
        match self {
            HierarchyLevel::Top => 0,
            HierarchyLevel::Child => 1,
            HierarchyLevel::Leaf => 2,
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "top" | "user" => Ok(HierarchyLevel::Top),
            "child" | "account" => Ok(HierarchyLevel::Child),
            "leaf" | "resource" => Ok(HierarchyLevel::Leaf),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid hierarchy level '{}'. Expected: top, child, leaf",
                s
            ))),
        }
    }
}

/// Lock mode requested on a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Compatible with other shared holders; used for ancestors
    Shared,
    /// Compatible with nothing
    Exclusive,
}

impl LockMode {
    /// Shared/Shared is the only compatible pair
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// Whether holding `self` already satisfies a request for `requested`
    pub fn covers(&self, requested: &LockMode) -> bool {
        self >= requested
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Targets and resolved paths
// =============================================================================

/// A single lockable row: identity is (level, bucket)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LockTarget {
    pub level: HierarchyLevel,
    pub bucket: u32,
}

impl LockTarget {
    pub fn new(level: HierarchyLevel, bucket: u32) -> Self {
        Self { level, bucket }
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.level, self.bucket)
    }
}

/// One step of a resolved path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep {
    pub target: LockTarget,
    pub mode: LockMode,
    /// Raw identifier chain the bucket was derived from, e.g. `u1:a1:r1`
    pub chain: String,
}

/// Ordered sequence of lock requests for one acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    steps: Vec<PathStep>,
}

impl ResolvedPath {
    fn from_steps(steps: Vec<PathStep>) -> Self {
        debug_assert!(steps
            .windows(2)
            .all(|pair| pair[0].target.level <= pair[1].target.level));
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = LockTarget> + '_ {
        self.steps.iter().map(|step| step.target)
    }

    /// Strongest mode this path requests on `target`, if it touches it at all
    ///
    /// A path can name the same target twice when two leaf chains collide
    /// into one bucket.
    pub fn mode_of(&self, target: &LockTarget) -> Option<LockMode> {
        self.steps
            .iter()
            .filter(|step| step.target == *target)
            .map(|step| step.mode)
            .max()
    }

    /// Whether two concurrent holders of these paths would block each other
    ///
    /// They conflict iff they share at least one target and at that target
    /// at least one side is exclusive.
    pub fn conflicts_with(&self, other: &ResolvedPath) -> bool {
        self.steps.iter().any(|step| match other.mode_of(&step.target) {
            Some(theirs) => !step.mode.is_compatible_with(&theirs),
            None => false,
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// A single-path lock request, parseable from `top:U`, `child:U/C`, `leaf:U/C/L`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub level: HierarchyLevel,
    pub top: String,
    #[serde(default)]
    pub child: String,
    #[serde(default)]
    pub leaf: String,
}

impl LockRequest {
    pub fn top(top: impl Into<String>) -> Self {
        Self {
            level: HierarchyLevel::Top,
            top: top.into(),
            child: String::new(),
            leaf: String::new(),
        }
    }

    pub fn child(top: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            level: HierarchyLevel::Child,
            top: top.into(),
            child: child.into(),
            leaf: String::new(),
        }
    }

    pub fn leaf(top: impl Into<String>, child: impl Into<String>, leaf: impl Into<String>) -> Self {
        Self {
            level: HierarchyLevel::Leaf,
            top: top.into(),
            child: child.into(),
            leaf: leaf.into(),
        }
    }

    pub fn resolve(&self, hasher: &BucketHasher) -> Result<ResolvedPath> {
        resolve_path(hasher, self.level, &self.top, &self.child, &self.leaf)
    }
}

impl fmt::Display for LockRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            HierarchyLevel::Top => write!(f, "top:{}", self.top),
            HierarchyLevel::Child => write!(f, "child:{}/{}", self.top, self.child),
            HierarchyLevel::Leaf => write!(f, "leaf:{}/{}/{}", self.top, self.child, self.leaf),
        }
    }
}

impl FromStr for LockRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (level, rest) = s.split_once(':').ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Invalid lock request '{}'. Expected: top:U, child:U/C, leaf:U/C/L",
                s
            ))
        })?;
        let level: HierarchyLevel = level.parse()?;
        let ids: Vec<&str> = rest.split('/').collect();
        if ids.len() != level.depth() + 1 {
            return Err(Error::InvalidArgument(format!(
                "Lock request '{}' needs {} identifier(s) for level {}",
                s,
                level.depth() + 1,
                level
            )));
        }

        let id = |idx: usize| ids.get(idx).map(|id| id.to_string()).unwrap_or_default();
        Ok(LockRequest {
            level,
            top: id(0),
            child: id(1),
            leaf: id(2),
        })
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Resolve a single-path request into its ordered lock steps
///
/// Identifiers below `level` are ignored.
pub fn resolve_path(
    hasher: &BucketHasher,
    level: HierarchyLevel,
    top: &str,
    child: &str,
    leaf: &str,
) -> Result<ResolvedPath> {
    require(top, "top id")?;
    if level >= HierarchyLevel::Child {
        require(child, "child id")?;
    }
    if level >= HierarchyLevel::Leaf {
        require(leaf, "leaf id")?;
    }

    let mode_for = |step: HierarchyLevel| {
        if step == level {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    };

    let mut steps = Vec::with_capacity(level.depth() + 1);
    steps.push(PathStep {
        target: hasher.top_target(top),
        mode: mode_for(HierarchyLevel::Top),
        chain: top.to_string(),
    });
    if level >= HierarchyLevel::Child {
        steps.push(PathStep {
            target: hasher.child_target(top, child),
            mode: mode_for(HierarchyLevel::Child),
            chain: format!("{top}:{child}"),
        });
    }
    if level >= HierarchyLevel::Leaf {
        steps.push(PathStep {
            target: hasher.leaf_target(top, child, leaf),
            mode: LockMode::Exclusive,
            chain: format!("{top}:{child}:{leaf}"),
        });
    }

    Ok(ResolvedPath::from_steps(steps))
}

/// Resolve a multi-leaf request: shared ancestors, then every leaf exclusive
/// in ascending raw-identifier order
///
/// Input order does not matter and duplicate leaf ids are collapsed.
pub fn resolve_leaves<S: AsRef<str>>(
    hasher: &BucketHasher,
    top: &str,
    child: &str,
    leaves: &[S],
) -> Result<ResolvedPath> {
    require(top, "top id")?;
    require(child, "child id")?;
    if leaves.is_empty() {
        return Err(Error::Validation("at least one leaf id is required".to_string()));
    }
    for leaf in leaves {
        require(leaf.as_ref(), "leaf id")?;
    }

    let mut ordered: Vec<&str> = leaves.iter().map(|leaf| leaf.as_ref()).collect();
    ordered.sort_unstable();
    ordered.dedup();

    let mut steps = Vec::with_capacity(ordered.len() + 2);
    steps.push(PathStep {
        target: hasher.top_target(top),
        mode: LockMode::Shared,
        chain: top.to_string(),
    });
    steps.push(PathStep {
        target: hasher.child_target(top, child),
        mode: LockMode::Shared,
        chain: format!("{top}:{child}"),
    });
    for leaf in ordered {
        steps.push(PathStep {
            target: hasher.leaf_target(top, child, leaf),
            mode: LockMode::Exclusive,
            chain: format!("{top}:{child}:{leaf}"),
        });
    }

    Ok(ResolvedPath::from_steps(steps))
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{what} is required")));
    }
    Ok(())
}
