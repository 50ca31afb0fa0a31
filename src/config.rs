//! The read-only configuration contract consumed from the external
//! configuration parser. The expression language itself is out of scope:
//! attribute values arrive as already-evaluated JSON envelopes, and the
//! references an expression makes arrive as explicit [`Referenceable`]
//! lists.

use crate::addrs::{
    InstanceKey, ModulePath, ProviderConfig, Referenceable, Resource, ResourceInstance,
    ResourceMode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Instance expansion ───────────────────────────────────────

/// How a resource block expands into instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Expansion {
    #[default]
    Single,
    Count(u64),
    ForEach(Vec<String>),
}

impl Expansion {
    /// The ordered instance keys this expansion produces.
    pub fn keys(&self) -> Vec<Option<InstanceKey>> {
        match self {
            Expansion::Single => vec![None],
            Expansion::Count(n) => (0..*n).map(|i| Some(InstanceKey::Int(i))).collect(),
            Expansion::ForEach(keys) => keys
                .iter()
                .map(|k| Some(InstanceKey::Str(k.clone())))
                .collect(),
        }
    }
}

// ─── Lifecycle ────────────────────────────────────────────────

/// A pre/postcondition as a simple attribute predicate. The original's
/// conditions are arbitrary expressions; with the expression language out
/// of scope they reduce to an attribute/value comparison plus the error
/// message to report on failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub equals: Value,
    pub error_message: String,
}

impl Condition {
    /// Evaluate against an object value. A missing attribute fails.
    pub fn holds(&self, object: &Value) -> bool {
        object.get(&self.attribute) == Some(&self.equals)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub create_before_destroy: bool,
    pub preconditions: Vec<Condition>,
    pub postconditions: Vec<Condition>,
}

impl Lifecycle {
    pub fn has_conditions(&self) -> bool {
        !self.preconditions.is_empty() || !self.postconditions.is_empty()
    }
}

// ─── Resource blocks ──────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
    /// Desired attribute values (already evaluated).
    pub config: Value,
    /// References made by the block's attribute expressions.
    pub refs: Vec<Referenceable>,
    /// Explicit `depends_on` entries.
    pub depends_on: Vec<Referenceable>,
    /// Explicit provider selection; when absent the provider type is
    /// implied by the resource type prefix and the default config used.
    pub provider: Option<ProviderConfig>,
    pub lifecycle: Lifecycle,
    pub expansion: Expansion,
    /// Attribute paths marked sensitive in configuration.
    pub sensitive_paths: Vec<String>,
}

impl ResourceConfig {
    pub fn managed(type_name: &str, name: &str, config: Value) -> Self {
        Self::new(ResourceMode::Managed, type_name, name, config)
    }

    pub fn data(type_name: &str, name: &str, config: Value) -> Self {
        Self::new(ResourceMode::Data, type_name, name, config)
    }

    fn new(mode: ResourceMode, type_name: &str, name: &str, config: Value) -> Self {
        ResourceConfig {
            mode,
            type_name: type_name.to_string(),
            name: name.to_string(),
            config,
            refs: Vec::new(),
            depends_on: Vec::new(),
            provider: None,
            lifecycle: Lifecycle::default(),
            expansion: Expansion::Single,
            sensitive_paths: Vec::new(),
        }
    }

    pub fn addr(&self) -> Resource {
        Resource {
            mode: self.mode,
            type_name: self.type_name.clone(),
            name: self.name.clone(),
        }
    }

    /// The provider type implied by the resource type prefix, e.g.
    /// `test_thing` is managed by provider `test`.
    pub fn implied_provider_type(&self) -> String {
        match self.type_name.split_once('_') {
            Some((prefix, _)) => prefix.to_string(),
            None => self.type_name.clone(),
        }
    }

    /// The provider configuration address this resource resolves to.
    pub fn provider_addr(&self) -> ProviderConfig {
        match &self.provider {
            Some(p) => p.clone(),
            None => ProviderConfig::default_for(&self.implied_provider_type()),
        }
    }
}

// ─── Provider blocks ──────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderBlock {
    pub type_name: String,
    pub alias: Option<String>,
    pub config: Value,
    /// `for_each` alias expansion keys; `None` means a single instance.
    pub for_each: Option<Vec<String>>,
    pub refs: Vec<Referenceable>,
}

impl ProviderBlock {
    pub fn new(type_name: &str, config: Value) -> Self {
        ProviderBlock {
            type_name: type_name.to_string(),
            alias: None,
            config,
            for_each: None,
            refs: Vec::new(),
        }
    }

    /// The provider configuration addresses this block declares.
    pub fn addrs(&self) -> Vec<ProviderConfig> {
        match &self.for_each {
            None => vec![ProviderConfig {
                type_name: self.type_name.clone(),
                alias: self.alias.clone(),
                key: None,
            }],
            Some(keys) => keys
                .iter()
                .map(|k| ProviderConfig {
                    type_name: self.type_name.clone(),
                    alias: self.alias.clone(),
                    key: Some(InstanceKey::Str(k.clone())),
                })
                .collect(),
        }
    }
}

// ─── Locals and outputs ───────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub name: String,
    pub value: Value,
    pub refs: Vec<Referenceable>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub value: Value,
    pub refs: Vec<Referenceable>,
    pub sensitive: bool,
}

// ─── Structural statements ────────────────────────────────────

/// One endpoint of a `moved` block, relative to the declaring module.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveEndpoint {
    Resource(Resource),
    ResourceInstance(ResourceInstance),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovedBlock {
    pub from: MoveEndpoint,
    pub to: MoveEndpoint,
}

/// A `removed` block: forget (or destroy) the matched objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemovedBlock {
    pub from: Resource,
    /// When false the matched objects are forgotten: dropped from state
    /// without invoking the provider's delete.
    pub destroy: bool,
}

/// An `import` block, root module only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportBlock {
    pub to: ResourceInstance,
    pub id: String,
}

// ─── Module tree ──────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleCall {
    pub name: String,
    pub depends_on: Vec<Referenceable>,
    /// `for_each` expansion keys for the call; `None` = single instance.
    pub for_each: Option<Vec<String>>,
    pub module: Module,
}

impl ModuleCall {
    pub fn instance_keys(&self) -> Vec<Option<InstanceKey>> {
        match &self.for_each {
            None => vec![None],
            Some(keys) => keys
                .iter()
                .map(|k| Some(InstanceKey::Str(k.clone())))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub resources: Vec<ResourceConfig>,
    pub providers: Vec<ProviderBlock>,
    pub locals: Vec<LocalConfig>,
    pub outputs: Vec<OutputConfig>,
    pub module_calls: Vec<ModuleCall>,
    pub moved: Vec<MovedBlock>,
    pub removed: Vec<RemovedBlock>,
    pub imports: Vec<ImportBlock>,
}

impl Module {
    pub fn resource(&self, addr: &Resource) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.addr() == *addr)
    }
}

/// The whole configuration tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub root: Module,
}

impl Config {
    pub fn empty() -> Self {
        Config::default()
    }

    /// All module instances this configuration expands to, paired with
    /// their module definitions, root first, parents before children.
    pub fn module_instances(&self) -> Vec<(ModulePath, &Module)> {
        let mut out = Vec::new();
        expand_into(&ModulePath::root(), &self.root, &mut out);
        out
    }

    /// The module definition reached by following call names, ignoring
    /// instance keys.
    pub fn module_for_path(&self, path: &ModulePath) -> Option<&Module> {
        let mut module = &self.root;
        for step in &path.0 {
            module = &module
                .module_calls
                .iter()
                .find(|c| c.name == step.name)?
                .module;
        }
        Some(module)
    }

    /// The provider types required anywhere in the tree, for the
    /// pre-graph dependency check.
    pub fn required_provider_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        for (_, module) in self.module_instances() {
            for block in &module.providers {
                types.push(block.type_name.clone());
            }
            for rc in &module.resources {
                types.push(rc.provider_addr().type_name);
            }
        }
        types.sort();
        types.dedup();
        types
    }
}

fn expand_into<'a>(path: &ModulePath, module: &'a Module, out: &mut Vec<(ModulePath, &'a Module)>) {
    out.push((path.clone(), module));
    for call in &module.module_calls {
        for key in call.instance_keys() {
            let child = path.child(&call.name, key);
            expand_into(&child, &call.module, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expansion_keys() {
        assert_eq!(Expansion::Single.keys(), vec![None]);
        assert_eq!(
            Expansion::Count(2).keys(),
            vec![Some(InstanceKey::Int(0)), Some(InstanceKey::Int(1))]
        );
        assert_eq!(
            Expansion::ForEach(vec!["a".into()]).keys(),
            vec![Some(InstanceKey::Str("a".into()))]
        );
    }

    #[test]
    fn implied_provider_type() {
        let rc = ResourceConfig::managed("test_thing", "web", json!({}));
        assert_eq!(rc.implied_provider_type(), "test");
        assert_eq!(rc.provider_addr(), ProviderConfig::default_for("test"));
    }

    #[test]
    fn module_instance_expansion() {
        let config = Config {
            root: Module {
                module_calls: vec![ModuleCall {
                    name: "net".into(),
                    depends_on: Vec::new(),
                    for_each: Some(vec!["a".into(), "b".into()]),
                    module: Module::default(),
                }],
                ..Module::default()
            },
        };
        let instances = config.module_instances();
        let paths: Vec<String> = instances.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, vec!["", "module.net[\"a\"]", "module.net[\"b\"]"]);
    }

    #[test]
    fn condition_holds() {
        let cond = Condition {
            attribute: "status".into(),
            equals: json!("ok"),
            error_message: "status must be ok".into(),
        };
        assert!(cond.holds(&json!({"status": "ok"})));
        assert!(!cond.holds(&json!({"status": "bad"})));
        assert!(!cond.holds(&json!({})));
    }
}
