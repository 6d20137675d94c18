//! Graph infrastructure for the ilc closure engine.
//!
//! - [`NodeCache`]: one canonical value per key, constructed at most once
//!   even under concurrent and reentrant lookups.
//! - [`DependencyAnalyzer`]: fixed-point reachability from a root set,
//!   expanding each frontier round on a rayon pool while keeping the
//!   discovery order deterministic.
//!
//! Neither piece knows what a node *is*; the node factory plugs in through
//! the [`DependencyContext`] trait.

mod analyzer;
mod cache;

pub use analyzer::{AnalyzerConfig, AnalyzerError, DependencyAnalyzer, DependencyContext, MarkedGraph};
pub use cache::{CacheError, ConstructionTracker, NodeCache};
