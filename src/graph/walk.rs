//! The concurrent graph walk: vertices become runnable once every
//! dependency has completed, run under a global concurrency permit, and
//! are skipped when an upstream vertex failed or the walk was cancelled.

use super::node::Node;
use super::Graph;
use crate::diags::{Diagnostic, Diagnostics};
use async_trait::async_trait;
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, trace, warn};

/// What a walk is doing, dispatched on by the vertex visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkOperation {
    Validate,
    Plan,
    PlanDestroy,
    Apply,
    Eval,
    Import,
}

/// Per-vertex behavior. One visit per vertex; the walker guarantees all
/// dependencies completed without errors before calling.
#[async_trait]
pub trait Visitor: Send + Sync {
    async fn visit(&self, node: Node, operation: WalkOperation) -> Diagnostics;
}

pub struct Walker {
    pub parallelism: usize,
    /// Flips to true when the run is being interrupted; vertices not yet
    /// started are then skipped, in-flight ones run to completion.
    pub cancel: watch::Receiver<bool>,
}

impl Walker {
    pub async fn walk(
        &self,
        graph: &Graph,
        operation: WalkOperation,
        visitor: Arc<dyn Visitor>,
    ) -> Diagnostics {
        let total = graph.len();
        let mut diags = Diagnostics::new();
        if total == 0 {
            return diags;
        }

        let mut indegree: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: VecDeque<NodeIndex> = VecDeque::new();
        for idx in graph.indices() {
            let n = graph.dependencies(idx).len();
            indegree.insert(idx, n);
            if n == 0 {
                ready.push_back(idx);
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let (tx, mut rx) = mpsc::unbounded_channel::<(NodeIndex, Diagnostics)>();
        let mut poisoned: HashSet<NodeIndex> = HashSet::new();
        let mut in_flight = 0usize;
        let mut done = 0usize;

        debug!(vertices = total, parallelism = self.parallelism, ?operation, "starting walk");

        while done < total {
            while let Some(idx) = ready.pop_front() {
                if poisoned.contains(&idx) {
                    trace!(node = %graph.node(idx).id(), "skipping, upstream vertex failed");
                    done += 1;
                    for dependent in graph.dependents(idx) {
                        poisoned.insert(dependent);
                        Self::release(&mut indegree, &mut ready, dependent);
                    }
                    continue;
                }
                if *self.cancel.borrow() {
                    trace!(node = %graph.node(idx).id(), "skipping, walk cancelled");
                    done += 1;
                    for dependent in graph.dependents(idx) {
                        Self::release(&mut indegree, &mut ready, dependent);
                    }
                    continue;
                }

                in_flight += 1;
                let node = graph.node(idx).clone();
                let visitor = visitor.clone();
                let semaphore = semaphore.clone();
                let tx = tx.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let permit = semaphore.acquire_owned().await.ok();
                    // Re-check after waiting for a permit: a cancel that
                    // arrived meanwhile skips vertices still queued.
                    let result = if *cancel.borrow() {
                        trace!(node = %node.id(), "skipping, walk cancelled");
                        Diagnostics::new()
                    } else {
                        trace!(node = %node.id(), "visiting vertex");
                        visitor.visit(node, operation).await
                    };
                    drop(permit);
                    let _ = tx.send((idx, result));
                });
            }

            if done >= total {
                break;
            }
            if in_flight == 0 {
                // Nothing running and nothing runnable: the remaining
                // vertices can never start. Acyclicity is checked before
                // walking, so this indicates an internal ordering bug.
                let mut stuck: Vec<String> = indegree
                    .iter()
                    .filter(|(_, &n)| n > 0)
                    .map(|(&idx, _)| graph.node(idx).id())
                    .collect();
                stuck.sort();
                warn!(stuck = ?stuck, "walk stalled before all vertices ran");
                diags.push(Diagnostic::error(
                    "Graph walk stalled",
                    format!(
                        "The following graph vertices never became runnable: {}. This is a bug in the execution engine.",
                        stuck.join(", ")
                    ),
                ));
                break;
            }

            // in_flight > 0 guarantees live senders.
            let Some((idx, result)) = rx.recv().await else {
                break;
            };
            in_flight -= 1;
            done += 1;
            let failed = result.has_errors();
            if failed {
                debug!(node = %graph.node(idx).id(), "vertex failed");
            }
            diags.extend(result);
            for dependent in graph.dependents(idx) {
                if failed {
                    poisoned.insert(dependent);
                }
                Self::release(&mut indegree, &mut ready, dependent);
            }
        }

        debug!(visited = done, errors = diags.has_errors(), "walk finished");
        diags
    }

    fn release(
        indegree: &mut HashMap<NodeIndex, usize>,
        ready: &mut VecDeque<NodeIndex>,
        idx: NodeIndex,
    ) {
        if let Some(n) = indegree.get_mut(&idx) {
            *n -= 1;
            if *n == 0 {
                ready.push_back(idx);
            }
        }
    }
}
