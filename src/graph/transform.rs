//! Graph construction as an ordered transformer pipeline. Each
//! transformer is a focused mutation of the graph under construction;
//! the builders run a fixed sequence, then insert the root vertex and
//! verify acyclicity.

use super::node::{
    LocalNode, ModuleCallNode, Node, OutputNode, ProviderNode, ResourceNode, ResourceNodeKind,
};
use super::reference::{connect_references, module_matches_call};
use super::Graph;
use crate::addrs::{AbsResource, ModulePath, ProviderConfig, Referenceable, ResourceMode, Target};
use crate::config::{Config, ResourceConfig};
use crate::diags::{Diagnostic, Diagnostics};
use crate::plan::{Action, Changes, PlanMode};
use crate::refactoring::{matching_remove, RemoveStatement};
use crate::state::State;
use petgraph::stable_graph::NodeIndex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

pub trait GraphTransformer {
    fn name(&self) -> &'static str;
    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics>;
}

// ─── Configuration nodes ──────────────────────────────────────

/// Adds vertices for everything the configuration declares: module
/// calls, locals, outputs and (optionally) resource instances expanded
/// per `count`/`for_each`.
pub struct ConfigTransformer<'a> {
    pub config: &'a Config,
    /// The apply graph gets its resource vertices from the change set
    /// instead.
    pub resources: bool,
}

impl GraphTransformer for ConfigTransformer<'_> {
    fn name(&self) -> &'static str {
        "config"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        for (path, module) in self.config.module_instances() {
            for call in &module.module_calls {
                graph.add(Node::ModuleCall(ModuleCallNode {
                    parent: path.clone(),
                    name: call.name.clone(),
                    depends_on: call.depends_on.clone(),
                }));
            }
            for local in &module.locals {
                graph.add(Node::Local(LocalNode {
                    module: path.clone(),
                    name: local.name.clone(),
                    value: local.value.clone(),
                    refs: local.refs.clone(),
                }));
            }
            for output in &module.outputs {
                graph.add(Node::Output(OutputNode {
                    module: path.clone(),
                    config: output.clone(),
                }));
            }
            if !self.resources {
                continue;
            }
            for rc in &module.resources {
                let kind = if rc.mode == ResourceMode::Managed {
                    ResourceNodeKind::Plan
                } else {
                    ResourceNodeKind::DataRead
                };
                for key in rc.expansion.keys() {
                    graph.add(Node::Resource(ResourceNode {
                        addr: rc.addr().absolute(path.clone()).instance(key),
                        kind,
                        config: Some(rc.clone()),
                        prior: None,
                        deposed: None,
                        provider: rc.provider_addr(),
                        state_dependencies: Vec::new(),
                        forget_on_orphan: false,
                    }));
                }
            }
        }
        Ok(())
    }
}

// ─── State nodes ──────────────────────────────────────────────

/// Attaches prior objects to configured vertices and adds vertices for
/// objects only the state knows about: orphans, deposed objects, and
/// (in destroy mode) a destroy vertex per tracked object.
pub struct StateTransformer<'a> {
    pub state: &'a State,
    pub mode: PlanMode,
    pub removes: &'a [RemoveStatement],
}

impl GraphTransformer for StateTransformer<'_> {
    fn name(&self) -> &'static str {
        "state"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        for (path, module) in &self.state.modules {
            for (resource, rs) in &module.resources {
                for (key, instance) in &rs.instances {
                    let addr = resource.absolute(path.clone()).instance(key.clone());
                    if let Some(object) = &instance.current {
                        if self.mode == PlanMode::Destroy {
                            graph.add(Node::Resource(ResourceNode {
                                addr: addr.clone(),
                                kind: ResourceNodeKind::Destroy,
                                config: None,
                                prior: Some(object.clone()),
                                deposed: None,
                                provider: rs.provider.clone(),
                                state_dependencies: object.dependencies.clone(),
                                forget_on_orphan: false,
                            }));
                        } else if let Some(idx) = graph.find(&addr.to_string()) {
                            if let Some(node) = graph.node_mut(idx).as_resource_mut() {
                                node.prior = Some(object.clone());
                                node.state_dependencies = object.dependencies.clone();
                            }
                        } else {
                            let forget = matching_remove(self.removes, &addr)
                                .map_or(false, |s| !s.destroy);
                            graph.add(Node::Resource(ResourceNode {
                                addr: addr.clone(),
                                kind: ResourceNodeKind::Orphan,
                                config: None,
                                prior: Some(object.clone()),
                                deposed: None,
                                provider: rs.provider.clone(),
                                state_dependencies: object.dependencies.clone(),
                                forget_on_orphan: forget,
                            }));
                        }
                    }
                    for (deposed_key, object) in &instance.deposed {
                        graph.add(Node::Resource(ResourceNode {
                            addr: addr.clone(),
                            kind: ResourceNodeKind::DestroyDeposed,
                            config: None,
                            prior: Some(object.clone()),
                            deposed: Some(deposed_key.clone()),
                            provider: rs.provider.clone(),
                            state_dependencies: object.dependencies.clone(),
                            forget_on_orphan: false,
                        }));
                    }
                }
            }
        }
        Ok(())
    }
}

// ─── Change nodes (apply graph) ───────────────────────────────

/// Adds one vertex per planned change, typed by the change's action.
pub struct ChangesTransformer<'a> {
    pub config: &'a Config,
    pub changes: &'a Changes,
    pub state: &'a State,
}

impl ChangesTransformer<'_> {
    fn config_for(&self, addr: &AbsResource) -> Option<ResourceConfig> {
        self.config
            .module_for_path(&addr.module)?
            .resource(&addr.resource)
            .cloned()
    }
}

impl GraphTransformer for ChangesTransformer<'_> {
    fn name(&self) -> &'static str {
        "changes"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        for change in &self.changes.resources {
            let prior = match &change.deposed {
                Some(key) => self.state.deposed_object(&change.addr, key).cloned(),
                None => self.state.current_object(&change.addr).cloned(),
            };
            let state_dependencies = prior
                .as_ref()
                .map(|o| o.dependencies.clone())
                .unwrap_or_default();
            let kind = match change.action {
                Action::NoOp => continue,
                Action::Read => ResourceNodeKind::DataRead,
                Action::Forget => ResourceNodeKind::Forget,
                Action::Delete => match change.deposed {
                    Some(_) => ResourceNodeKind::DestroyDeposed,
                    None => ResourceNodeKind::Destroy,
                },
                Action::Create
                | Action::Update
                | Action::DeleteThenCreate
                | Action::CreateThenDelete => ResourceNodeKind::Apply,
            };
            let config = if kind.destroy_only() {
                None
            } else {
                self.config_for(&change.addr.containing_resource())
            };
            graph.add(Node::Resource(ResourceNode {
                addr: change.addr.clone(),
                kind,
                config,
                prior,
                deposed: change.deposed.clone(),
                provider: change.provider.clone(),
                state_dependencies,
                forget_on_orphan: false,
            }));
        }
        Ok(())
    }
}

// ─── Providers ────────────────────────────────────────────────

/// Adds one vertex per provider configuration any resource vertex needs
/// and connects the resources to it. Configurations with no declaring
/// block are synthesized with empty config, so an implied default
/// provider still gets started and configured.
pub struct ProviderTransformer<'a> {
    pub config: &'a Config,
}

impl GraphTransformer for ProviderTransformer<'_> {
    fn name(&self) -> &'static str {
        "providers"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        let mut declared: HashMap<ProviderConfig, (ModulePath, Value, Vec<Referenceable>)> =
            HashMap::new();
        for (path, module) in self.config.module_instances() {
            for block in &module.providers {
                for addr in block.addrs() {
                    declared
                        .entry(addr)
                        .or_insert_with(|| (path.clone(), block.config.clone(), block.refs.clone()));
                }
            }
        }

        let mut needed: Vec<(NodeIndex, ProviderConfig)> = Vec::new();
        for idx in graph.indices() {
            if let Some(node) = graph.node(idx).as_resource() {
                needed.push((idx, node.provider.clone()));
            }
        }
        for (resource_idx, addr) in needed {
            let (module, config, refs) = declared
                .get(&addr)
                .cloned()
                .unwrap_or((ModulePath::root(), Value::Null, Vec::new()));
            let provider_idx = graph.add(Node::Provider(ProviderNode {
                addr,
                module,
                config,
                refs,
            }));
            graph.connect(resource_idx, provider_idx);
        }
        Ok(())
    }
}

/// Drops provider vertices no remaining vertex depends on, so pruning
/// passes never leave a provider being configured for nothing.
pub struct PruneProvidersTransformer;

impl GraphTransformer for PruneProvidersTransformer {
    fn name(&self) -> &'static str {
        "prune-providers"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        for idx in graph.indices() {
            if matches!(graph.node(idx), Node::Provider(_)) && graph.dependents(idx).is_empty() {
                trace!(provider = %graph.node(idx).id(), "pruning unused provider");
                graph.remove(idx);
            }
        }
        Ok(())
    }
}

// ─── References and ordering ──────────────────────────────────

pub struct ReferenceTransformer;

impl GraphTransformer for ReferenceTransformer {
    fn name(&self) -> &'static str {
        "references"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        connect_references(graph);
        Ok(())
    }
}

/// Connects every vertex inside a module instance to that module's call
/// vertex, so `depends_on` at call granularity gates the whole subtree.
pub struct ModuleExpansionTransformer;

impl GraphTransformer for ModuleExpansionTransformer {
    fn name(&self) -> &'static str {
        "module-expansion"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        let calls: Vec<(NodeIndex, ModulePath)> = graph
            .indices()
            .into_iter()
            .filter_map(|idx| match graph.node(idx) {
                Node::ModuleCall(call) => Some((idx, call.parent.child(&call.name, None))),
                _ => None,
            })
            .collect();
        for idx in graph.indices() {
            if graph.node(idx).destroy_only() {
                continue;
            }
            let path = graph.node(idx).module_path();
            for (call_idx, inside) in &calls {
                if idx != *call_idx && module_matches_call(inside, &path) {
                    graph.connect(idx, *call_idx);
                }
            }
        }
        Ok(())
    }
}

/// Orders destroys in reverse dependency order using the dependency
/// addresses persisted in state: the destroy of a resource waits for
/// every vertex whose object depended on it.
pub struct DestroyEdgeTransformer;

impl GraphTransformer for DestroyEdgeTransformer {
    fn name(&self) -> &'static str {
        "destroy-edges"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        let mut edges = Vec::new();
        for destroy_idx in graph.indices() {
            let Some(destroy) = graph.node(destroy_idx).as_resource() else {
                continue;
            };
            if !matches!(
                destroy.kind,
                ResourceNodeKind::Destroy
                    | ResourceNodeKind::DestroyDeposed
                    | ResourceNodeKind::Orphan
            ) {
                continue;
            }
            let destroyed = destroy.addr.containing_resource();
            for other_idx in graph.indices() {
                if other_idx == destroy_idx {
                    continue;
                }
                let Some(other) = graph.node(other_idx).as_resource() else {
                    continue;
                };
                if other.state_dependencies.contains(&destroyed) {
                    edges.push((destroy_idx, other_idx));
                }
            }
        }
        for (dependent, dependency) in edges {
            graph.connect(dependent, dependency);
        }
        Ok(())
    }
}

// ─── Targeting ────────────────────────────────────────────────

/// Applies `-target`/`-exclude` filters: targeting keeps the matched
/// resource vertices plus everything they transitively depend on;
/// excluding removes the matched vertices plus everything that
/// transitively depends on them.
pub struct TargetingTransformer<'a> {
    pub targets: &'a [Target],
    pub excludes: &'a [Target],
}

impl GraphTransformer for TargetingTransformer<'_> {
    fn name(&self) -> &'static str {
        "targeting"
    }

    fn transform(&self, graph: &mut Graph) -> Result<(), Diagnostics> {
        if !self.targets.is_empty() {
            let mut keep = HashSet::new();
            for idx in graph.indices() {
                let Some(node) = graph.node(idx).as_resource() else {
                    continue;
                };
                if self.targets.iter().any(|t| t.contains_instance(&node.addr)) {
                    keep.insert(idx);
                    keep.extend(graph.ancestors(idx));
                }
            }
            for idx in graph.indices() {
                if graph.node(idx).as_resource().is_some() && !keep.contains(&idx) {
                    debug!(node = %graph.node(idx).id(), "excluded by targeting");
                    graph.remove_preserving_order(idx);
                }
            }
        }

        if !self.excludes.is_empty() {
            let mut drop = HashSet::new();
            for idx in graph.indices() {
                let Some(node) = graph.node(idx).as_resource() else {
                    continue;
                };
                if self.excludes.iter().any(|t| t.contains_instance(&node.addr)) {
                    drop.insert(idx);
                    for dep in graph.descendants(idx) {
                        if graph.node(dep).as_resource().is_some() {
                            drop.insert(dep);
                        }
                    }
                }
            }
            for idx in drop {
                debug!(node = %graph.node(idx).id(), "removed by exclude");
                graph.remove_preserving_order(idx);
            }
        }
        Ok(())
    }
}

// ─── Finalize ─────────────────────────────────────────────────

/// Insert the synthetic root and verify the result is a DAG.
fn finalize(graph: &mut Graph) -> Result<(), Diagnostics> {
    let root = graph.add(Node::Root);
    for idx in graph.indices() {
        if idx != root && graph.dependents(idx).is_empty() {
            graph.connect(root, idx);
        }
    }
    graph.check_acyclic().map_err(|err| {
        Diagnostic::error(
            "Cycle in dependency graph",
            format!("The configuration produced a dependency cycle: {err}."),
        )
        .into()
    })
}

fn run(graph: &mut Graph, transformers: &[&dyn GraphTransformer]) -> Result<(), Diagnostics> {
    for t in transformers {
        trace!(transformer = t.name(), "running graph transformer");
        t.transform(graph)?;
    }
    finalize(graph)
}

// ─── Builders ─────────────────────────────────────────────────

/// Builds the plan walk graph for the given mode.
pub struct PlanGraphBuilder<'a> {
    pub config: &'a Config,
    pub state: &'a State,
    pub mode: PlanMode,
    pub targets: &'a [Target],
    pub excludes: &'a [Target],
    pub removes: &'a [RemoveStatement],
}

impl PlanGraphBuilder<'_> {
    pub fn build(&self) -> Result<Graph, Diagnostics> {
        let mut graph = Graph::new();
        let config = ConfigTransformer {
            config: self.config,
            resources: true,
        };
        let state = StateTransformer {
            state: self.state,
            mode: self.mode,
            removes: self.removes,
        };
        let providers = ProviderTransformer {
            config: self.config,
        };
        let targeting = TargetingTransformer {
            targets: self.targets,
            excludes: self.excludes,
        };
        let transformers: Vec<&dyn GraphTransformer> = if self.mode == PlanMode::Destroy {
            // A destroy plan works purely from state: no config vertices,
            // no reference edges, ordering comes from state dependencies.
            vec![
                &state,
                &providers,
                &DestroyEdgeTransformer,
                &targeting,
                &PruneProvidersTransformer,
            ]
        } else {
            vec![
                &config,
                &state,
                &providers,
                &ReferenceTransformer,
                &ModuleExpansionTransformer,
                &DestroyEdgeTransformer,
                &targeting,
                &PruneProvidersTransformer,
            ]
        };
        run(&mut graph, &transformers)?;
        debug!(vertices = graph.len(), mode = ?self.mode, "built plan graph");
        Ok(graph)
    }
}

/// Builds the apply walk graph from a plan's change set.
pub struct ApplyGraphBuilder<'a> {
    pub config: &'a Config,
    pub changes: &'a Changes,
    /// The plan's prior state, for prior objects and destroy ordering.
    pub state: &'a State,
}

impl ApplyGraphBuilder<'_> {
    pub fn build(&self) -> Result<Graph, Diagnostics> {
        let mut graph = Graph::new();
        let config = ConfigTransformer {
            config: self.config,
            resources: false,
        };
        let changes = ChangesTransformer {
            config: self.config,
            changes: self.changes,
            state: self.state,
        };
        let providers = ProviderTransformer {
            config: self.config,
        };
        let transformers: Vec<&dyn GraphTransformer> = vec![
            &config,
            &changes,
            &providers,
            &ReferenceTransformer,
            &ModuleExpansionTransformer,
            &DestroyEdgeTransformer,
            &PruneProvidersTransformer,
        ];
        run(&mut graph, &transformers)?;
        debug!(vertices = graph.len(), "built apply graph");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Resource;
    use crate::config::{Expansion, Module};
    use crate::plan::{Action, ActionReason, ResourceInstanceChange};
    use crate::state::InstanceObject;
    use serde_json::json;

    fn config_with(resources: Vec<ResourceConfig>) -> Config {
        Config {
            root: Module {
                resources,
                ..Module::default()
            },
        }
    }

    fn rc(name: &str, refs: Vec<Referenceable>) -> ResourceConfig {
        let mut rc = ResourceConfig::managed("test_thing", name, json!({"name": name}));
        rc.refs = refs;
        rc
    }

    fn state_with(name: &str, dependencies: Vec<AbsResource>) -> State {
        let mut state = State::new();
        let mut object = InstanceObject::ready(json!({"name": name, "id": "i-0"}));
        object.dependencies = dependencies;
        state.set_current(
            &Resource::managed("test_thing", name)
                .absolute(ModulePath::root())
                .instance(None),
            ProviderConfig::default_for("test"),
            object,
        );
        state
    }

    fn plan_graph(config: &Config, state: &State, mode: PlanMode) -> Graph {
        PlanGraphBuilder {
            config,
            state,
            mode,
            targets: &[],
            excludes: &[],
            removes: &[],
        }
        .build()
        .expect("graph")
    }

    #[test]
    fn normal_plan_graph_has_config_state_and_provider_nodes() {
        let config = config_with(vec![
            rc("a", vec![]),
            rc(
                "b",
                vec![Referenceable::Resource(Resource::managed("test_thing", "a"))],
            ),
        ]);
        let state = state_with("gone", vec![]);
        let g = plan_graph(&config, &state, PlanMode::Normal);

        let a = g.find("test_thing.a").expect("a");
        let b = g.find("test_thing.b").expect("b");
        assert!(g.find("test_thing.gone (orphan)").is_some());
        assert!(g.find("provider[\"test\"]").is_some());
        assert!(g.dependencies(b).contains(&a), "{}", g.render());
        assert!(g.find("root").is_some());
    }

    #[test]
    fn empty_config_and_state_builds_root_only_graph() {
        let g = plan_graph(&Config::empty(), &State::new(), PlanMode::Normal);
        assert_eq!(g.len(), 1);
        assert!(g.find("root").is_some());
    }

    #[test]
    fn destroy_plan_graph_orders_reverse() {
        // b depended on a when created; a's destroy must wait for b's.
        let config = config_with(vec![rc("a", vec![]), rc("b", vec![])]);
        let mut state = state_with("a", vec![]);
        let a_res = Resource::managed("test_thing", "a").absolute(ModulePath::root());
        let mut b_obj = InstanceObject::ready(json!({"name": "b", "id": "i-1"}));
        b_obj.dependencies = vec![a_res];
        state.set_current(
            &Resource::managed("test_thing", "b")
                .absolute(ModulePath::root())
                .instance(None),
            ProviderConfig::default_for("test"),
            b_obj,
        );

        let g = plan_graph(&config, &state, PlanMode::Destroy);
        let a = g.find("test_thing.a (destroy)").expect("a destroy");
        let b = g.find("test_thing.b (destroy)").expect("b destroy");
        assert!(g.find("test_thing.a").is_none(), "no config vertices");
        assert!(g.dependencies(a).contains(&b), "{}", g.render());
    }

    #[test]
    fn targeting_keeps_target_and_ancestors() {
        let config = config_with(vec![
            rc("a", vec![]),
            rc(
                "b",
                vec![Referenceable::Resource(Resource::managed("test_thing", "a"))],
            ),
            rc("c", vec![]),
        ]);
        let targets = vec![Target::Resource(
            Resource::managed("test_thing", "b").absolute(ModulePath::root()),
        )];
        let g = PlanGraphBuilder {
            config: &config,
            state: &State::new(),
            mode: PlanMode::Normal,
            targets: &targets,
            excludes: &[],
            removes: &[],
        }
        .build()
        .expect("graph");

        assert!(g.find("test_thing.a").is_some(), "dependency kept");
        assert!(g.find("test_thing.b").is_some());
        assert!(g.find("test_thing.c").is_none(), "untargeted removed");
    }

    #[test]
    fn exclude_removes_dependents_too() {
        let config = config_with(vec![
            rc("a", vec![]),
            rc(
                "b",
                vec![Referenceable::Resource(Resource::managed("test_thing", "a"))],
            ),
            rc("c", vec![]),
        ]);
        let excludes = vec![Target::Resource(
            Resource::managed("test_thing", "a").absolute(ModulePath::root()),
        )];
        let g = PlanGraphBuilder {
            config: &config,
            state: &State::new(),
            mode: PlanMode::Normal,
            targets: &[],
            excludes: &excludes,
            removes: &[],
        }
        .build()
        .expect("graph");

        assert!(g.find("test_thing.a").is_none());
        assert!(g.find("test_thing.b").is_none(), "dependent removed");
        assert!(g.find("test_thing.c").is_some());
    }

    #[test]
    fn unused_providers_are_pruned() {
        let config = Config {
            root: Module {
                providers: vec![crate::config::ProviderBlock::new("unused", json!({}))],
                resources: vec![rc("a", vec![])],
                ..Module::default()
            },
        };
        let g = plan_graph(&config, &State::new(), PlanMode::Normal);
        assert!(g.find("provider[\"test\"]").is_some());
        assert!(g.find("provider[\"unused\"]").is_none());
    }

    #[test]
    fn apply_graph_types_vertices_by_action() {
        let config = config_with(vec![rc("a", vec![])]);
        let state = state_with("gone", vec![]);
        let make = |name: &str, action: Action| {
            let addr = Resource::managed("test_thing", name)
                .absolute(ModulePath::root())
                .instance(None);
            ResourceInstanceChange {
                addr: addr.clone(),
                prev_run_addr: addr,
                deposed: None,
                provider: ProviderConfig::default_for("test"),
                action,
                reason: ActionReason::None,
                before: Value::Null,
                after: json!({"name": name}),
                private: Vec::new(),
            }
        };
        let changes = Changes {
            resources: vec![make("a", Action::Create), make("gone", Action::Delete)],
        };
        let g = ApplyGraphBuilder {
            config: &config,
            changes: &changes,
            state: &state,
        }
        .build()
        .expect("graph");

        let apply = g.find("test_thing.a").expect("apply vertex");
        assert!(g.find("test_thing.gone (destroy)").is_some());
        assert!(
            g.node(apply).as_resource().unwrap().config.is_some(),
            "config reattached for apply"
        );
    }

    #[test]
    fn noop_changes_produce_no_vertices() {
        let addr = Resource::managed("test_thing", "a")
            .absolute(ModulePath::root())
            .instance(None);
        let changes = Changes {
            resources: vec![ResourceInstanceChange {
                addr: addr.clone(),
                prev_run_addr: addr,
                deposed: None,
                provider: ProviderConfig::default_for("test"),
                action: Action::NoOp,
                reason: ActionReason::None,
                before: json!({}),
                after: json!({}),
                private: Vec::new(),
            }],
        };
        let g = ApplyGraphBuilder {
            config: &Config::empty(),
            changes: &changes,
            state: &State::new(),
        }
        .build()
        .expect("graph");
        assert_eq!(g.len(), 1, "root only: {}", g.render());
    }

    #[test]
    fn count_expansion_produces_keyed_vertices() {
        let mut expanded = rc("web", vec![]);
        expanded.expansion = Expansion::Count(2);
        let config = config_with(vec![expanded]);
        let g = plan_graph(&config, &State::new(), PlanMode::Normal);
        assert!(g.find("test_thing.web[0]").is_some());
        assert!(g.find("test_thing.web[1]").is_some());
        assert!(g.find("test_thing.web[2]").is_none());
    }
}
