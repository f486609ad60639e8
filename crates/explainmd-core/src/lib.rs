//! explainmd-core
//!
//! Core primitives for explainmd:
//! - Leaf/tree data models and their validation
//! - Canonical line-oriented rendering for deterministic hashing
//! - Configuration, config hashing, and the regeneration planner
//! - Dependency graph with SCC detection and support closures
//! - Deterministic child grouping (topological + complexity-banded)
//! - Pedagogical policy oracles (pre- and post-summary)
//! - The recursive tree builder with deterministic repartition
//! - Progressive disclosure views and tree-to-tree diffs
//!
//! The core crate performs no filesystem or network I/O, reads no clocks and
//! no environment variables, and never iterates a `HashMap` on the way to an
//! emitted artifact. Anything nondeterministic must be injected by the caller.

pub mod builder;
pub mod classify;
pub mod config;
pub mod determinism;
pub mod diff;
pub mod disclosure;
pub mod errors;
pub mod graph;
pub mod grouping;
pub mod model;
pub mod policy;
pub mod summarize;
pub mod version;

pub use crate::errors::{ExplainError, ExplainResult};

/// Convenience re-exports.
pub mod prelude {
    pub use crate::builder::{build_tree, TreeBuildError, TreePolicyError};
    pub use crate::config::{
        compute_config_hash, plan_regeneration, ExplainConfig, RegenerationScope,
    };
    pub use crate::determinism::canonical::{CanonicalRender, CanonicalWriter};
    pub use crate::determinism::hashing::hash_bytes_hex;
    pub use crate::graph::{DependencyGraph, GraphOptions};
    pub use crate::grouping::{partition_layer, GroupingNode, GroupingOptions};
    pub use crate::model::leaf::{IngestionRecord, LeafRecord, TheoremKind};
    pub use crate::model::tree::{ExplanationTree, TreeNode};
    pub use crate::summarize::{ParentSummarizer, ParentSummary, SummarizeGroupRequest};
    pub use crate::{ExplainError, ExplainResult};
}
