//! Bucket hashing
//!
//! Identifier chains are unbounded, so lock rows are keyed by a bucket
//! derived from the chain instead. The bucket for a level is
//! `fnv1a32(prefix ++ chain) % space`, where the prefix is `user:`,
//! `account:` or `resource:` for the top, child and leaf level, and the chain
//! joins every identifier from the top down with `:`. These prefixes keep
//! buckets identical to rows already provisioned by existing deployments.
//!
//! Identical chains always land in the same bucket. Distinct chains may
//! collide and then contend with each other even though they are logically
//! unrelated; size the space for the expected cardinality.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hierarchy::{HierarchyLevel, LockTarget};

/// Default number of buckets per level
pub const DEFAULT_BUCKET_SPACE: u32 = 10_000_000;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Number of buckets available on each level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpace {
    pub top: u32,
    pub child: u32,
    pub leaf: u32,
}

impl BucketSpace {
    pub fn new(top: u32, child: u32, leaf: u32) -> Result<Self> {
        let space = Self { top, child, leaf };
        space.validate()?;
        Ok(space)
    }

    /// Same size on every level
    pub fn uniform(size: u32) -> Result<Self> {
        Self::new(size, size, size)
    }

    pub fn size(&self, level: HierarchyLevel) -> u32 {
        match level {
            HierarchyLevel::Top => self.top,
            HierarchyLevel::Child => self.child,
            HierarchyLevel::Leaf => self.leaf,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for level in HierarchyLevel::ALL {
            if self.size(level) == 0 {
                return Err(Error::InvalidConfig(format!(
                    "buckets.{level} must be > 0"
                )));
            }
        }
        Ok(())
    }
}

impl Default for BucketSpace {
    fn default() -> Self {
        Self {
            top: DEFAULT_BUCKET_SPACE,
            child: DEFAULT_BUCKET_SPACE,
            leaf: DEFAULT_BUCKET_SPACE,
        }
    }
}

/// Maps identifier chains onto bounded per-level bucket numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketHasher {
    space: BucketSpace,
}

impl BucketHasher {
    pub fn new(space: BucketSpace) -> Self {
        Self { space }
    }

    pub fn space(&self) -> BucketSpace {
        self.space
    }

    /// Bucket for a chain of identifiers ordered from the top down
    pub fn bucket(&self, level: HierarchyLevel, chain: &[&str]) -> u32 {
        let mut hash = fnv1a32(FNV_OFFSET_BASIS, level_prefix(level).as_bytes());
        for (idx, id) in chain.iter().enumerate() {
            if idx > 0 {
                hash = fnv1a32(hash, b":");
            }
            hash = fnv1a32(hash, id.as_bytes());
        }
        hash % self.space.size(level)
    }

    pub fn top_target(&self, top: &str) -> LockTarget {
        LockTarget::new(HierarchyLevel::Top, self.bucket(HierarchyLevel::Top, &[top]))
    }

    pub fn child_target(&self, top: &str, child: &str) -> LockTarget {
        LockTarget::new(
            HierarchyLevel::Child,
            self.bucket(HierarchyLevel::Child, &[top, child]),
        )
    }

    pub fn leaf_target(&self, top: &str, child: &str, leaf: &str) -> LockTarget {
        LockTarget::new(
            HierarchyLevel::Leaf,
            self.bucket(HierarchyLevel::Leaf, &[top, child, leaf]),
        )
    }
}

fn level_prefix(level: HierarchyLevel) -> &'static str {
    match level {
        HierarchyLevel::Top => "user:",
        HierarchyLevel::Child => "account:",
        HierarchyLevel::Leaf => "resource:",
    }
}

fn fnv1a32(mut hash: u32, bytes: &[u8]) -> u32 {
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_vectors() {
        assert_eq!(fnv1a32(FNV_OFFSET_BASIS, b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(FNV_OFFSET_BASIS, b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(FNV_OFFSET_BASIS, b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn incremental_hash_matches_joined_string() {
        let hasher = BucketHasher::new(BucketSpace::uniform(u32::MAX).unwrap());
        let joined = fnv1a32(FNV_OFFSET_BASIS, b"resource:u1:a1:r1") % u32::MAX;
        assert_eq!(hasher.bucket(HierarchyLevel::Leaf, &["u1", "a1", "r1"]), joined);
    }

    #[test]
    fn default_space_buckets_are_stable() {
        let hasher = BucketHasher::default();
        assert_eq!(hasher.top_target("u1").bucket, 3_142_546);
        assert_eq!(hasher.top_target("u2").bucket, 6_364_927);
        assert_eq!(hasher.child_target("u1", "a1").bucket, 5_156_936);
        assert_eq!(hasher.leaf_target("u1", "a1", "r1").bucket, 185_732);
    }

    #[test]
    fn buckets_are_deterministic_and_in_range() {
        let hasher = BucketHasher::new(BucketSpace::uniform(97).unwrap());
        for idx in 0..500 {
            let id = format!("user-{idx}");
            let first = hasher.top_target(&id);
            assert_eq!(first, hasher.top_target(&id));
            assert!(first.bucket < 97);
        }
    }

    #[test]
    fn child_bucket_depends_on_top_and_child() {
        let hasher = BucketHasher::default();
        assert_ne!(hasher.child_target("u1", "a1"), hasher.child_target("u2", "a1"));
        assert_ne!(hasher.child_target("u1", "a1"), hasher.child_target("u1", "a2"));
    }

    #[test]
    fn levels_use_distinct_prefixes() {
        let hasher = BucketHasher::default();
        assert_ne!(
            hasher.bucket(HierarchyLevel::Top, &["x"]),
            hasher.bucket(HierarchyLevel::Child, &["x"])
        );
    }

    #[test]
    fn tiny_space_forces_collisions() {
        let hasher = BucketHasher::new(BucketSpace::uniform(1).unwrap());
        assert_eq!(hasher.leaf_target("u1", "a1", "r1"), hasher.leaf_target("u9", "a9", "r9"));
    }

    #[test]
    fn zero_space_rejected() {
        assert!(matches!(BucketSpace::new(1, 0, 1), Err(Error::InvalidConfig(_))));
    }
}
