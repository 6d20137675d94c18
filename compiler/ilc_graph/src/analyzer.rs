//! Fixed-point dependency closure.
//!
//! The analyzer owns the frontier. Each round every frontier node is asked
//! for its dependency *requests*, the requests are resolved to canonical
//! nodes through the context, and nodes seen for the first time form the
//! next frontier. Expansion never recurses, so deep instantiation chains
//! cost rounds, not stack.
//!
//! # Determinism
//!
//! Rounds run on a rayon pool and node creation inside `resolve` may race,
//! but results are merged sequentially in (frontier position, request
//! position) order. The marked list is therefore the same for any worker
//! count, which keeps emitted binaries reproducible.

use std::fmt;
use std::hash::Hash;
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// How the closure engine talks to whoever defines the nodes.
pub trait DependencyContext: Sync {
    type Node: Copy + Eq + Hash + Send + Sync + fmt::Debug;
    type Request: Send;
    type Error: Send;

    /// What `node` needs. Called once per marked node.
    fn dependencies(&self, node: Self::Node) -> Result<Vec<Self::Request>, Self::Error>;

    /// Map a request to its canonical node, creating it on first use.
    fn resolve(&self, request: Self::Request) -> Result<Self::Node, Self::Error>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Worker threads (0 = rayon default).
    pub jobs: usize,
}

impl AnalyzerConfig {
    #[must_use]
    pub fn with_jobs(jobs: usize) -> Self {
        Self { jobs }
    }

    #[must_use]
    pub fn single_threaded() -> Self {
        Self { jobs: 1 }
    }

    #[must_use]
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            rayon::current_num_threads()
        } else {
            self.jobs
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError<E> {
    #[error("failed to start closure workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("dependency expansion failed")]
    Context(E),
}

/// Result of a closure computation.
#[derive(Debug)]
pub struct MarkedGraph<N> {
    nodes: Vec<N>,
    dependencies: FxHashMap<N, Vec<N>>,
    rounds: usize,
}

impl<N: Copy + Eq + Hash> MarkedGraph<N> {
    /// Marked nodes in discovery order.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    pub fn contains(&self, node: N) -> bool {
        self.dependencies.contains_key(&node)
    }

    /// Resolved dependencies of a marked node.
    pub fn dependencies_of(&self, node: N) -> &[N] {
        self.dependencies.get(&node).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of expansion rounds the closure needed.
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

pub struct DependencyAnalyzer<'c, C: DependencyContext> {
    context: &'c C,
    config: AnalyzerConfig,
    roots: Vec<C::Node>,
}

impl<'c, C: DependencyContext> DependencyAnalyzer<'c, C> {
    pub fn new(context: &'c C, config: AnalyzerConfig) -> Self {
        Self {
            context,
            config,
            roots: Vec::new(),
        }
    }

    /// Add an always-required node.
    pub fn add_root(&mut self, node: C::Node, reason: &'static str) {
        tracing::debug!(?node, reason, "root");
        self.roots.push(node);
    }

    pub fn roots(&self) -> &[C::Node] {
        &self.roots
    }

    /// Run the closure to its fixed point.
    #[tracing::instrument(level = "debug", skip(self), fields(roots = self.roots.len()))]
    pub fn compute(self) -> Result<MarkedGraph<C::Node>, AnalyzerError<C::Error>> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.effective_jobs())
            .thread_name(|i| format!("ilc-closure-{i}"))
            .build()?;

        let mut nodes = Vec::new();
        let mut dependencies: FxHashMap<C::Node, Vec<C::Node>> = FxHashMap::default();
        let mut seen = rustc_hash::FxHashSet::default();

        let mut frontier: Vec<C::Node> = Vec::new();
        for &root in &self.roots {
            if seen.insert(root) {
                nodes.push(root);
                frontier.push(root);
            }
        }

        let context = self.context;
        let mut rounds = 0;
        while !frontier.is_empty() {
            rounds += 1;
            tracing::debug!(round = rounds, frontier = frontier.len(), "expanding");

            let expanded: Vec<Result<Vec<C::Node>, C::Error>> = pool.install(|| {
                frontier
                    .par_iter()
                    .map(|&node| -> Result<Vec<C::Node>, C::Error> {
                        context
                            .dependencies(node)?
                            .into_iter()
                            .map(|request| context.resolve(request))
                            .collect()
                    })
                    .collect()
            });

            let mut next = Vec::new();
            for (&node, deps) in frontier.iter().zip(expanded) {
                let deps = deps.map_err(AnalyzerError::Context)?;
                for &dep in &deps {
                    if seen.insert(dep) {
                        nodes.push(dep);
                        next.push(dep);
                    }
                }
                dependencies.insert(node, deps);
            }
            frontier = next;
        }

        tracing::info!(
            nodes = nodes.len(),
            rounds,
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "closure complete"
        );
        Ok(MarkedGraph {
            nodes,
            dependencies,
            rounds,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
