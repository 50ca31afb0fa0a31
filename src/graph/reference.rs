//! Reference resolution: an index from `(module path, referenceable
//! address)` to vertices, and the pass that wires referrer → referenced
//! dependency edges from it.

use super::node::Node;
use super::Graph;
use crate::addrs::{ModulePath, Referenceable};
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use tracing::trace;

pub struct ReferenceMap {
    map: HashMap<(ModulePath, Referenceable), Vec<NodeIndex>>,
}

impl ReferenceMap {
    pub fn build(graph: &Graph) -> Self {
        let mut map: HashMap<(ModulePath, Referenceable), Vec<NodeIndex>> = HashMap::new();
        for idx in graph.indices() {
            for (path, addr) in graph.node(idx).referenceable() {
                map.entry((path, addr)).or_default().push(idx);
            }
        }
        ReferenceMap { map }
    }

    /// Resolve a reference made from `module`, falling back progressively
    /// (instance → containing resource, module-call-instance output →
    /// module-call output) before giving up.
    pub fn resolve(&self, module: &ModulePath, subject: &Referenceable) -> Vec<NodeIndex> {
        let mut current = Some(subject.clone());
        while let Some(addr) = current {
            if let Some(found) = self.map.get(&(module.clone(), addr.clone())) {
                return found.clone();
            }
            current = addr.fallback();
        }
        Vec::new()
    }
}

/// Wire dependency edges for every reference every vertex makes.
///
/// Unresolved references are non-fatal: the referenced node type may be
/// legitimately absent from this operation's graph (destroy graphs omit
/// several kinds), so a miss is only logged.
pub fn connect_references(graph: &mut Graph) {
    let map = ReferenceMap::build(graph);
    let mut edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();

    for referrer in graph.indices() {
        for (module, subject) in graph.node(referrer).references() {
            let found = map.resolve(&module, &subject);
            if found.is_empty() {
                trace!(reference = %subject, module = %module, "reference not in graph, skipping");
                continue;
            }
            for target in found {
                // A reference can resolve back to its own vertex (a
                // resource naming its own address); never self-loop.
                if target == referrer || !edge_allowed(graph, referrer, target) {
                    continue;
                }
                edges.push((referrer, target));

                // A dependency on a whole module call attaches to every
                // resource inside that module, so data sources wait for
                // explicit dependencies even when those are modules.
                if let Node::ModuleCall(call) = graph.node(target) {
                    let inside = call.parent.child(&call.name, None);
                    for candidate in graph.indices() {
                        if candidate == referrer {
                            continue;
                        }
                        if let Node::Resource(rn) = graph.node(candidate) {
                            if module_matches_call(&inside, &rn.addr.module)
                                && edge_allowed(graph, referrer, candidate)
                            {
                                edges.push((referrer, candidate));
                            }
                        }
                    }
                }
            }
        }
    }

    for (dependent, dependency) in edges {
        graph.connect(dependent, dependency);
    }
}

/// True when `path` lives inside the module named by `call` (instance
/// keys on the final step ignored, since a call reference covers every
/// instance of the call).
pub(super) fn module_matches_call(call: &ModulePath, path: &ModulePath) -> bool {
    if path.0.len() < call.0.len() {
        return false;
    }
    call.0.iter().zip(path.0.iter()).enumerate().all(|(i, (c, p))| {
        if i + 1 == call.0.len() {
            c.name == p.name
        } else {
            c == p
        }
    })
}

fn edge_allowed(graph: &Graph, referrer: NodeIndex, target: NodeIndex) -> bool {
    let from = graph.node(referrer);
    let to = graph.node(target);

    // Destroy subgraphs are ordered separately, in reverse; a live node
    // must not couple itself to a destroy-only node.
    if to.destroy_only() && !from.destroy_only() {
        return false;
    }

    // Instances of one resource living in different instances of the
    // same module must not order against each other.
    if let (Node::Resource(a), Node::Resource(b)) = (from, to) {
        if a.addr.resource.resource == b.addr.resource.resource
            && a.addr.module != b.addr.module
            && a.addr.module.call_names() == b.addr.module.call_names()
        {
            return false;
        }
    }

    true
}
