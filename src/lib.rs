//! hierlock - Hierarchical Intent Locking Library
//!
//! Coordinates multiple-granularity locking over a three-level hierarchy
//! (top-level entity → child collection → leaf resource) on top of a
//! blocking lock substrate that does the actual waiting and deadlock
//! detection.
//!
//! # Core Concepts
//!
//! - **Resolved paths**: ancestors locked shared, the target exclusive,
//!   always ancestor-first; sibling leaves in ascending id order
//! - **Buckets**: identifier chains hashed into a bounded key space per level
//! - **Scopes**: substrate-side units whose locks are released together
//! - **Handles**: the caller's capability over one fully acquired path
//!
//! # Module Organization
//!
//! - `hierarchy`: levels, modes, targets, path resolution, conflict law
//! - `bucket`: bounded bucket hashing
//! - `substrate`: the substrate traits and wait policy
//! - `memory`: in-process blocking substrate with deadlock detection
//! - `coordinator`: ordered acquisition with abort-on-failure
//! - `handle`: lock handles
//! - `repository`: per-level convenience facade
//! - `tree`: in-process lock tree alternative
//! - `config`: configuration loading from `.hierlock.toml`
//! - `error`: error types and result aliases
//! - `output`: CLI output formatting
//! - `cli`: command-line interface using clap

pub mod bucket;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod hierarchy;
pub mod memory;
pub mod output;
pub mod repository;
pub mod substrate;
pub mod tree;

pub use bucket::{BucketHasher, BucketSpace};
pub use coordinator::{AcquireOptions, LockCoordinator};
pub use error::{Error, Result};
pub use handle::LockHandle;
pub use hierarchy::{HierarchyLevel, LockMode, LockTarget, ResolvedPath};
pub use memory::MemorySubstrate;
pub use repository::LockRepository;
