//! The closed set of vertex variants. Each variant carries only the
//! fields its behavior needs; the walker dispatches on (operation, node)
//! rather than probing open-ended capability interfaces.

use crate::addrs::{
    AbsResource, AbsResourceInstance, DeposedKey, ModulePath, ProviderConfig, Referenceable,
};
use crate::config::{OutputConfig, ResourceConfig};
use crate::state::InstanceObject;
use serde_json::Value;

// ─── Resource node kinds ──────────────────────────────────────

/// What a resource-instance vertex does when visited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceNodeKind {
    /// Managed instance present in configuration: refresh + diff during
    /// a plan walk.
    Plan,
    /// Data source read.
    DataRead,
    /// In state but not configuration: plan destroy (or forget).
    Orphan,
    /// Destroy the current object (destroy-mode plan, or apply of a
    /// delete/replace change).
    Destroy,
    /// Destroy one deposed object.
    DestroyDeposed,
    /// Apply a create/update change from the plan.
    Apply,
    /// Drop from state without any provider call.
    Forget,
}

impl ResourceNodeKind {
    /// Destroy-only nodes are ordered separately (reverse dependency
    /// order); reference edges from non-destroy nodes must not attach
    /// to them.
    pub fn destroy_only(&self) -> bool {
        matches!(
            self,
            ResourceNodeKind::Destroy | ResourceNodeKind::DestroyDeposed | ResourceNodeKind::Forget
        )
    }
}

// ─── Variant payloads ─────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ResourceNode {
    pub addr: AbsResourceInstance,
    pub kind: ResourceNodeKind,
    /// Attached by the config transformer; absent for orphans.
    pub config: Option<ResourceConfig>,
    /// Attached by the state transformer.
    pub prior: Option<InstanceObject>,
    /// Set when this vertex concerns a deposed object.
    pub deposed: Option<DeposedKey>,
    pub provider: ProviderConfig,
    /// Dependency addresses persisted in state, used to order destroys
    /// when the configuration no longer declares the resource.
    pub state_dependencies: Vec<AbsResource>,
    /// Orphan matched by a non-destroying `removed` statement.
    pub forget_on_orphan: bool,
}

#[derive(Clone, Debug)]
pub struct ProviderNode {
    pub addr: ProviderConfig,
    pub module: ModulePath,
    pub config: Value,
    pub refs: Vec<Referenceable>,
}

#[derive(Clone, Debug)]
pub struct ModuleCallNode {
    pub parent: ModulePath,
    pub name: String,
    pub depends_on: Vec<Referenceable>,
}

#[derive(Clone, Debug)]
pub struct LocalNode {
    pub module: ModulePath,
    pub name: String,
    pub value: Value,
    pub refs: Vec<Referenceable>,
}

#[derive(Clone, Debug)]
pub struct OutputNode {
    pub module: ModulePath,
    pub config: OutputConfig,
}

// ─── The node ─────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum Node {
    /// Synthetic sink depending on everything else; the walk is complete
    /// when the root completes.
    Root,
    Provider(ProviderNode),
    ModuleCall(ModuleCallNode),
    Local(LocalNode),
    Output(OutputNode),
    Resource(ResourceNode),
}

impl Node {
    /// Stable unique identity within one graph.
    pub fn id(&self) -> String {
        match self {
            Node::Root => "root".to_string(),
            Node::Provider(n) => n.addr.to_string(),
            Node::ModuleCall(n) => {
                let prefix = module_prefix(&n.parent);
                format!("{prefix}module.{} (expand)", n.name)
            }
            Node::Local(n) => format!("{}local.{}", module_prefix(&n.module), n.name),
            Node::Output(n) => {
                format!("{}output.{}", module_prefix(&n.module), n.config.name)
            }
            Node::Resource(n) => {
                let base = n.addr.to_string();
                match (&n.deposed, n.kind) {
                    (Some(key), _) => format!("{base} (deposed {key})"),
                    (None, ResourceNodeKind::Orphan) => format!("{base} (orphan)"),
                    (None, ResourceNodeKind::Destroy) => format!("{base} (destroy)"),
                    (None, ResourceNodeKind::Forget) => format!("{base} (forget)"),
                    _ => base,
                }
            }
        }
    }

    /// The module instance the node's expressions evaluate within.
    pub fn module_path(&self) -> ModulePath {
        match self {
            Node::Root => ModulePath::root(),
            Node::Provider(n) => n.module.clone(),
            Node::ModuleCall(n) => n.parent.clone(),
            Node::Local(n) => n.module.clone(),
            Node::Output(n) => n.module.clone(),
            Node::Resource(n) => n.addr.module.clone(),
        }
    }

    /// Addresses other nodes may refer to this one by, paired with the
    /// module each address is visible in.
    pub fn referenceable(&self) -> Vec<(ModulePath, Referenceable)> {
        match self {
            Node::Root | Node::Provider(_) => Vec::new(),
            Node::ModuleCall(n) => vec![(
                n.parent.clone(),
                Referenceable::ModuleCall(n.name.clone()),
            )],
            Node::Local(n) => vec![(
                n.module.clone(),
                Referenceable::Local(n.name.clone()),
            )],
            Node::Output(n) => {
                let mut out = vec![(
                    n.module.clone(),
                    Referenceable::OutputValue(n.config.name.clone()),
                )];
                // Visible from the parent module as a module-call output.
                if let Some(last) = n.module.0.last() {
                    let parent = ModulePath(n.module.0[..n.module.0.len() - 1].to_vec());
                    out.push((
                        parent,
                        Referenceable::ModuleCallOutput {
                            call: last.name.clone(),
                            name: n.config.name.clone(),
                        },
                    ));
                }
                out
            }
            Node::Resource(n) => vec![
                (
                    n.addr.module.clone(),
                    Referenceable::ResourceInstance(n.addr.resource.clone()),
                ),
                (
                    n.addr.module.clone(),
                    Referenceable::Resource(n.addr.resource.resource.clone()),
                ),
            ],
        }
    }

    /// References this node makes, each resolved within the node's own
    /// module (`depends_on` included).
    pub fn references(&self) -> Vec<(ModulePath, Referenceable)> {
        let own = self.module_path();
        match self {
            Node::Root => Vec::new(),
            Node::Provider(n) => n.refs.iter().cloned().map(|r| (own.clone(), r)).collect(),
            Node::ModuleCall(n) => n
                .depends_on
                .iter()
                .cloned()
                .map(|r| (own.clone(), r))
                .collect(),
            Node::Local(n) => n.refs.iter().cloned().map(|r| (own.clone(), r)).collect(),
            Node::Output(n) => n
                .config
                .refs
                .iter()
                .cloned()
                .map(|r| (own.clone(), r))
                .collect(),
            Node::Resource(n) => match &n.config {
                Some(config) => config
                    .refs
                    .iter()
                    .chain(config.depends_on.iter())
                    .cloned()
                    .map(|r| (own.clone(), r))
                    .collect(),
                // Orphans and destroy nodes have no configuration left to
                // refer to; their ordering comes from state dependencies.
                None => Vec::new(),
            },
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceNode> {
        match self {
            Node::Resource(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_resource_mut(&mut self) -> Option<&mut ResourceNode> {
        match self {
            Node::Resource(n) => Some(n),
            _ => None,
        }
    }

    /// Whether reference edges from non-destroy nodes may attach here.
    pub fn destroy_only(&self) -> bool {
        matches!(self, Node::Resource(n) if n.kind.destroy_only())
    }
}

fn module_prefix(path: &ModulePath) -> String {
    if path.is_root() {
        String::new()
    } else {
        format!("{path}.")
    }
}
