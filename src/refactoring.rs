//! Pure helpers that resolve `moved` and `removed` statements against
//! configuration and prior state. These run before graph construction so
//! that targeting and diffing operate on post-move addresses.

use crate::addrs::{AbsResourceInstance, InstanceKey, ModulePath, Resource};
use crate::config::{Config, Expansion, MoveEndpoint};
use crate::diags::{Diagnostic, Diagnostics};
use crate::state::State;
use std::collections::BTreeMap;
use tracing::debug;

// ─── Move statements ──────────────────────────────────────────

/// A `moved` block resolved to its declaring module, plus implied moves
/// inferred from expansion changes.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveStatement {
    /// Call names of the declaring module; applies within every instance
    /// of that module.
    pub declared_in: Vec<String>,
    pub from: MoveEndpoint,
    pub to: MoveEndpoint,
    pub implied: bool,
}

/// One successfully applied move.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveResult {
    pub from: AbsResourceInstance,
    pub to: AbsResourceInstance,
}

/// A move that could not be applied because an object already occupied
/// the destination address.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveBlocked {
    pub wanted: AbsResourceInstance,
    pub actual: AbsResourceInstance,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MoveResults {
    /// Keyed by destination address.
    pub changes: BTreeMap<AbsResourceInstance, MoveResult>,
    pub blocked: Vec<MoveBlocked>,
}

impl MoveResults {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.blocked.is_empty()
    }
}

/// Collect the explicit `moved` blocks from the whole module tree.
pub fn find_move_statements(config: &Config) -> Vec<MoveStatement> {
    let mut out = Vec::new();
    collect_moves(&[], &config.root, &mut out);
    out
}

fn collect_moves(path: &[String], module: &crate::config::Module, out: &mut Vec<MoveStatement>) {
    for block in &module.moved {
        out.push(MoveStatement {
            declared_in: path.to_vec(),
            from: block.from.clone(),
            to: block.to.clone(),
            implied: false,
        });
    }
    for call in &module.module_calls {
        let mut child = path.to_vec();
        child.push(call.name.clone());
        collect_moves(&child, &call.module, out);
    }
}

/// Infer moves between the no-key and `[0]` addresses of a resource when
/// its configuration switched between single-instance and `count`. Only
/// inferred when no explicit statement already covers the resource.
pub fn implied_move_statements(
    config: &Config,
    state: &State,
    explicit: &[MoveStatement],
) -> Vec<MoveStatement> {
    let mut out = Vec::new();
    for (path, module) in config.module_instances() {
        for rc in &module.resources {
            let resource = rc.addr();
            let covered = explicit.iter().any(|s| {
                s.declared_in == path.call_names()
                    && endpoint_resource(&s.from) == &resource
            });
            if covered {
                continue;
            }
            let Some(rs) = state.resource(&resource.absolute(path.clone())) else {
                continue;
            };
            let has_nokey = rs.instances.contains_key(&None);
            let has_zero = rs.instances.contains_key(&Some(InstanceKey::Int(0)));
            let stmt = match (&rc.expansion, has_nokey, has_zero) {
                // count was added: no-key object becomes [0]
                (Expansion::Count(_), true, false) => Some((
                    MoveEndpoint::ResourceInstance(resource.instance(None)),
                    MoveEndpoint::ResourceInstance(
                        resource.instance(Some(InstanceKey::Int(0))),
                    ),
                )),
                // count was removed: [0] becomes the no-key object
                (Expansion::Single, false, true) => Some((
                    MoveEndpoint::ResourceInstance(
                        resource.instance(Some(InstanceKey::Int(0))),
                    ),
                    MoveEndpoint::ResourceInstance(resource.instance(None)),
                )),
                _ => None,
            };
            if let Some((from, to)) = stmt {
                debug!(resource = %resource, "inferred implied move statement");
                out.push(MoveStatement {
                    declared_in: path.call_names().iter().map(|s| s.to_string()).collect(),
                    from,
                    to,
                    implied: true,
                });
            }
        }
    }
    out
}

fn endpoint_resource(endpoint: &MoveEndpoint) -> &Resource {
    match endpoint {
        MoveEndpoint::Resource(r) => r,
        MoveEndpoint::ResourceInstance(i) => &i.resource,
    }
}

/// Apply move statements to the prior state in order. Moves whose
/// destination is occupied are recorded as blocked rather than applied.
pub fn apply_moves(statements: &[MoveStatement], state: &mut State) -> MoveResults {
    let mut results = MoveResults::default();

    for stmt in statements {
        // A statement applies within every instance of its declaring
        // module currently present in state.
        let module_paths: Vec<ModulePath> = state
            .modules
            .keys()
            .filter(|p| p.call_names() == stmt.declared_in)
            .cloned()
            .collect();

        for path in module_paths {
            match (&stmt.from, &stmt.to) {
                (MoveEndpoint::Resource(from), MoveEndpoint::Resource(to)) => {
                    let from_abs = from.absolute(path.clone());
                    let to_abs = to.absolute(path.clone());
                    let keys: Vec<Option<InstanceKey>> = match state.resource(&from_abs) {
                        Some(rs) => rs.instances.keys().cloned().collect(),
                        None => continue,
                    };
                    if state.move_resource(&from_abs, &to_abs) {
                        for key in keys {
                            let to_inst = to_abs.instance(key.clone());
                            results.changes.insert(
                                to_inst.clone(),
                                MoveResult {
                                    from: from_abs.instance(key),
                                    to: to_inst,
                                },
                            );
                        }
                    } else {
                        for key in keys {
                            results.blocked.push(MoveBlocked {
                                wanted: to_abs.instance(key.clone()),
                                actual: from_abs.instance(key),
                            });
                        }
                    }
                }
                (MoveEndpoint::ResourceInstance(from), MoveEndpoint::ResourceInstance(to)) => {
                    let from_abs = AbsResourceInstance {
                        module: path.clone(),
                        resource: from.clone(),
                    };
                    let to_abs = AbsResourceInstance {
                        module: path.clone(),
                        resource: to.clone(),
                    };
                    if state.instance(&from_abs).map_or(true, |i| i.is_empty()) {
                        continue;
                    }
                    if state.move_instance(&from_abs, &to_abs) {
                        results.changes.insert(
                            to_abs.clone(),
                            MoveResult {
                                from: from_abs,
                                to: to_abs,
                            },
                        );
                    } else {
                        results.blocked.push(MoveBlocked {
                            wanted: to_abs,
                            actual: from_abs,
                        });
                    }
                }
                // Mixed endpoint kinds are rejected by the configuration
                // parser; skip defensively if one slips through.
                _ => continue,
            }
        }
    }

    results
}

// ─── Remove statements ────────────────────────────────────────

/// A `removed` block resolved to its declaring module.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoveStatement {
    pub declared_in: Vec<String>,
    pub from: Resource,
    /// When false, matched objects are forgotten instead of destroyed.
    pub destroy: bool,
}

/// Collect `removed` blocks, rejecting any whose target still has a
/// configuration block (removing a still-configured resource is a
/// contradiction the user must resolve).
pub fn find_remove_statements(config: &Config) -> (Vec<RemoveStatement>, Diagnostics) {
    let mut out = Vec::new();
    let mut diags = Diagnostics::new();
    collect_removes(&[], &config.root, &mut out, &mut diags);
    (out, diags)
}

fn collect_removes(
    path: &[String],
    module: &crate::config::Module,
    out: &mut Vec<RemoveStatement>,
    diags: &mut Diagnostics,
) {
    for block in &module.removed {
        if module.resource(&block.from).is_some() {
            diags.push(
                Diagnostic::error(
                    "Removed resource still exists",
                    format!(
                        "This statement declares a move away from {}, but that resource block still exists in the configuration. Change or remove the resource block before removing it from state.",
                        block.from
                    ),
                )
                .with_address(&block.from),
            );
            continue;
        }
        out.push(RemoveStatement {
            declared_in: path.to_vec(),
            from: block.from.clone(),
            destroy: block.destroy,
        });
    }
    for call in &module.module_calls {
        let mut child = path.to_vec();
        child.push(call.name.clone());
        collect_removes(&child, &call.module, out, diags);
    }
}

/// The remove statement matching an orphaned instance, if any.
pub fn matching_remove<'a>(
    statements: &'a [RemoveStatement],
    addr: &AbsResourceInstance,
) -> Option<&'a RemoveStatement> {
    statements.iter().find(|s| {
        s.declared_in == addr.module.call_names() && s.from == addr.resource.resource
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ProviderConfig;
    use crate::config::{Module, MovedBlock, RemovedBlock, ResourceConfig};
    use crate::state::InstanceObject;
    use serde_json::json;

    fn state_with(name: &str, key: Option<InstanceKey>) -> State {
        let mut state = State::new();
        state.set_current(
            &Resource::managed("test_thing", name)
                .absolute(ModulePath::root())
                .instance(key),
            ProviderConfig::default_for("test"),
            InstanceObject::ready(json!({"id": name})),
        );
        state
    }

    #[test]
    fn explicit_move_applies_to_state() {
        let config = Config {
            root: Module {
                moved: vec![MovedBlock {
                    from: MoveEndpoint::Resource(Resource::managed("test_thing", "old")),
                    to: MoveEndpoint::Resource(Resource::managed("test_thing", "new")),
                }],
                ..Module::default()
            },
        };
        let mut state = state_with("old", None);
        let stmts = find_move_statements(&config);
        let results = apply_moves(&stmts, &mut state);

        let to = Resource::managed("test_thing", "new")
            .absolute(ModulePath::root())
            .instance(None);
        assert!(results.changes.contains_key(&to));
        assert!(state.current_object(&to).is_some());
        assert!(results.blocked.is_empty());
    }

    #[test]
    fn blocked_move_is_reported_not_applied() {
        let stmts = vec![MoveStatement {
            declared_in: vec![],
            from: MoveEndpoint::Resource(Resource::managed("test_thing", "old")),
            to: MoveEndpoint::Resource(Resource::managed("test_thing", "new")),
            implied: false,
        }];
        let mut state = state_with("old", None);
        // Destination already occupied.
        state.set_current(
            &Resource::managed("test_thing", "new")
                .absolute(ModulePath::root())
                .instance(None),
            ProviderConfig::default_for("test"),
            InstanceObject::ready(json!({"id": "squatter"})),
        );

        let results = apply_moves(&stmts, &mut state);
        assert_eq!(results.blocked.len(), 1);
        assert!(results.changes.is_empty());
        // Source object stays put.
        let from = Resource::managed("test_thing", "old")
            .absolute(ModulePath::root())
            .instance(None);
        assert!(state.current_object(&from).is_some());
    }

    #[test]
    fn implied_move_for_added_count() {
        let mut rc = ResourceConfig::managed("test_thing", "web", json!({}));
        rc.expansion = Expansion::Count(1);
        let config = Config {
            root: Module {
                resources: vec![rc],
                ..Module::default()
            },
        };
        let state = state_with("web", None);

        let implied = implied_move_statements(&config, &state, &[]);
        assert_eq!(implied.len(), 1);
        assert!(implied[0].implied);
        assert_eq!(
            implied[0].to,
            MoveEndpoint::ResourceInstance(
                Resource::managed("test_thing", "web").instance(Some(InstanceKey::Int(0)))
            )
        );
    }

    #[test]
    fn removed_block_for_configured_resource_errors() {
        let config = Config {
            root: Module {
                resources: vec![ResourceConfig::managed("test_thing", "web", json!({}))],
                removed: vec![RemovedBlock {
                    from: Resource::managed("test_thing", "web"),
                    destroy: false,
                }],
                ..Module::default()
            },
        };
        let (stmts, diags) = find_remove_statements(&config);
        assert!(stmts.is_empty());
        assert!(diags.has_errors());
    }

    #[test]
    fn matching_remove_honors_module_scope() {
        let stmts = vec![RemoveStatement {
            declared_in: vec!["net".into()],
            from: Resource::managed("test_thing", "web"),
            destroy: false,
        }];
        let in_module = Resource::managed("test_thing", "web")
            .absolute(ModulePath::root().child("net", None))
            .instance(None);
        let in_root = Resource::managed("test_thing", "web")
            .absolute(ModulePath::root())
            .instance(None);
        assert!(matching_remove(&stmts, &in_module).is_some());
        assert!(matching_remove(&stmts, &in_root).is_none());
    }
}
