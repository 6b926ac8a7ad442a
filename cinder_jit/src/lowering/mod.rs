//! Lowering of high-level creation operators.
//!
//! # Pipeline
//!
//! 1. **CreateLowering** (`create.rs` and friends): inline fast paths. A
//!    creation node whose preconditions are provable is rewritten into an
//!    explicit `Allocate` + `StoreField`/`StoreElement` sequence; anything
//!    else is left untouched.
//! 2. **GenericLowering** (`generic.rs`): every creation node still present
//!    becomes a runtime or stub `Call`.
//!
//! Both are [`Reducer`]s driven by a [`GraphReducer`], which revisits
//! changed nodes and new nodes until no reducer reports progress.

pub mod access;
pub mod allocation;
mod arguments;
mod arrays;
mod contexts;
pub mod create;
pub mod generic;
mod literals;
#[cfg(test)]
mod testing;

pub use access::AccessBuilder;
pub use allocation::AllocationBuilder;
pub use create::CreateLowering;
pub use generic::GenericLowering;
pub use literals::LiteralDecline;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calls::Linkage;
use crate::config::LoweringConfig;
use crate::diagnostics::Diagnostics;
use crate::heap::HeapBroker;
use crate::ir::{BitSet, Graph, NodeId};

// =============================================================================
// Reducer Interface
// =============================================================================

/// Outcome of reducing one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// The node was left as it was.
    NoChange,
    /// The node was rewritten in place.
    Changed(NodeId),
    /// Every use of the node should move to the given node.
    Replace(NodeId),
}

impl Reduction {
    #[inline]
    pub fn changed(self) -> bool {
        !matches!(self, Reduction::NoChange)
    }
}

/// A local graph rewrite.
pub trait Reducer {
    /// Name used in statistics and logs.
    fn name(&self) -> &'static str;

    fn reduce(&mut self, graph: &mut Graph, node: NodeId) -> Reduction;
}

// =============================================================================
// Graph Reducer
// =============================================================================

struct ReducerEntry<'r> {
    reducer: Box<dyn Reducer + 'r>,
    changes: usize,
    replacements: usize,
    time: Duration,
}

/// Runs a set of reducers over a graph until none of them makes progress.
pub struct GraphReducer<'r> {
    reducers: Vec<ReducerEntry<'r>>,
    collect_timing: bool,
}

impl<'r> GraphReducer<'r> {
    pub fn new() -> Self {
        GraphReducer {
            reducers: Vec::new(),
            collect_timing: false,
        }
    }

    /// Record time spent per reducer.
    pub fn with_timing(mut self) -> Self {
        self.collect_timing = true;
        self
    }

    /// Add a reducer. Reducers are tried in registration order.
    pub fn add_reducer<R: Reducer + 'r>(&mut self, reducer: R) {
        self.reducers.push(ReducerEntry {
            reducer: Box::new(reducer),
            changes: 0,
            replacements: 0,
            time: Duration::ZERO,
        });
    }

    /// Reduce every live node, then every node changed or created on the
    /// way, to a fixpoint.
    pub fn reduce_graph(&mut self, graph: &mut Graph) -> ReductionStats {
        let start = Instant::now();
        let mut stats = ReductionStats {
            initial_size: graph.len(),
            ..Default::default()
        };

        let mut queued = BitSet::with_capacity(graph.len());
        let mut worklist: VecDeque<NodeId> = VecDeque::with_capacity(graph.len());
        for id in graph.live_ids() {
            queued.insert(id.as_usize());
            worklist.push_back(id);
        }

        while let Some(node) = worklist.pop_front() {
            queued.remove(node.as_usize());
            if graph.get(node).map_or(true, |n| n.is_dead()) {
                continue;
            }
            stats.visited += 1;
            let first_new = graph.len();

            let mut revisit = None;
            for entry in &mut self.reducers {
                let timer = self.collect_timing.then(Instant::now);
                let reduction = entry.reducer.reduce(graph, node);
                if let Some(timer) = timer {
                    entry.time += timer.elapsed();
                }
                match reduction {
                    Reduction::NoChange => continue,
                    Reduction::Changed(id) => {
                        entry.changes += 1;
                        stats.changed += 1;
                        log::debug!("{}: changed {} to {}", entry.reducer.name(), node, graph.op(id));
                        revisit = Some(id);
                    }
                    Reduction::Replace(replacement) => {
                        entry.replacements += 1;
                        stats.replaced += 1;
                        log::debug!("{}: replaced {} with {}", entry.reducer.name(), node, replacement);
                        if replacement != node {
                            graph.replace_all_uses(node, replacement);
                            graph.kill(node);
                        }
                        revisit = Some(replacement);
                    }
                }
                break;
            }

            let Some(revisit) = revisit else { continue };
            let fresh = (first_new..graph.len()).map(|raw| NodeId::new(raw as u32));
            for id in std::iter::once(revisit).chain(fresh) {
                if queued.insert(id.as_usize()) {
                    worklist.push_back(id);
                }
            }
        }

        stats.final_size = graph.len();
        stats.time = start.elapsed();
        stats.reducers = self
            .reducers
            .iter()
            .map(|entry| ReducerStat {
                name: entry.reducer.name(),
                changes: entry.changes,
                replacements: entry.replacements,
                time: entry.time,
            })
            .collect();
        stats
    }
}

impl Default for GraphReducer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from a single reducer.
#[derive(Debug, Clone)]
pub struct ReducerStat {
    pub name: &'static str,
    /// In-place rewrites.
    pub changes: usize,
    pub replacements: usize,
    /// Zero unless timing was requested.
    pub time: Duration,
}

/// Statistics from one `reduce_graph` run.
#[derive(Debug, Clone, Default)]
pub struct ReductionStats {
    /// Reduction attempts on live nodes.
    pub visited: usize,
    pub changed: usize,
    pub replaced: usize,
    pub initial_size: usize,
    pub final_size: usize,
    pub time: Duration,
    pub reducers: Vec<ReducerStat>,
}

impl ReductionStats {
    /// Total number of successful reductions.
    #[inline]
    pub fn reductions(&self) -> usize {
        self.changed + self.replaced
    }

    /// Growth of the graph, in nodes.
    pub fn nodes_added(&self) -> usize {
        self.final_size.saturating_sub(self.initial_size)
    }
}

// =============================================================================
// Convenience
// =============================================================================

/// Lower every creation node: inline fast paths first, then runtime and
/// stub calls for whatever declined.
pub fn lower_creations(
    graph: &mut Graph,
    broker: &dyn HeapBroker,
    linkage: &Linkage,
    config: &LoweringConfig,
    diagnostics: Arc<dyn Diagnostics>,
) -> ReductionStats {
    let mut create = GraphReducer::new();
    create.add_reducer(CreateLowering::new(broker, config, Arc::clone(&diagnostics)));
    let inline = create.reduce_graph(graph);

    let mut generic = GraphReducer::new();
    generic.add_reducer(GenericLowering::new(broker, linkage, diagnostics));
    let calls = generic.reduce_graph(graph);

    log::debug!(
        "lowered creations: {} inline, {} calls, {} nodes added",
        inline.reductions(),
        calls.reductions(),
        calls.final_size.saturating_sub(inline.initial_size)
    );
    ReductionStats {
        visited: inline.visited + calls.visited,
        changed: inline.changed + calls.changed,
        replaced: inline.replaced + calls.replaced,
        initial_size: inline.initial_size,
        final_size: calls.final_size,
        time: inline.time + calls.time,
        reducers: inline.reducers.into_iter().chain(calls.reducers).collect(),
    }
}
