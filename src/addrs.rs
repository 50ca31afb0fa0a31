use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ─── Instance keys ────────────────────────────────────────────

/// Key distinguishing one instance of a multi-instance object
/// (`count` produces `Int`, `for_each` produces `Str`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstanceKey {
    Int(u64),
    Str(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Int(n) => write!(f, "[{n}]"),
            InstanceKey::Str(s) => write!(f, "[\"{s}\"]"),
        }
    }
}

fn fmt_opt_key(key: &Option<InstanceKey>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match key {
        Some(k) => write!(f, "{k}"),
        None => Ok(()),
    }
}

// ─── Module paths ─────────────────────────────────────────────

/// One step in a module instance path: the call name plus the instance
/// key when the call uses `count`/`for_each`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleStep {
    pub name: String,
    pub key: Option<InstanceKey>,
}

/// A fully-qualified module instance path. Empty means the root module.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModulePath(pub Vec<ModuleStep>);

impl ModulePath {
    pub fn root() -> Self {
        ModulePath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, name: &str, key: Option<InstanceKey>) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleStep {
            name: name.to_string(),
            key,
        });
        ModulePath(steps)
    }

    /// The call names along this path, with instance keys stripped.
    /// Statements declared in a module definition match every instance
    /// of that module by comparing these.
    pub fn call_names(&self) -> Vec<String> {
        self.0.iter().map(|s| s.name.clone()).collect()
    }

    /// True if `self` is `other` or an ancestor of `other`.
    pub fn contains(&self, other: &ModulePath) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

// The root module renders as the empty string; non-root paths render as
// `module.a.module.b["key"]`.
impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "module.{}", step.name)?;
            fmt_opt_key(&step.key, f)?;
        }
        Ok(())
    }
}

// ─── Resources ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceMode {
    Managed,
    Data,
}

/// A resource block address within a module (no instance key).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub mode: ResourceMode,
    pub type_name: String,
    pub name: String,
}

impl Resource {
    pub fn managed(type_name: &str, name: &str) -> Self {
        Resource {
            mode: ResourceMode::Managed,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    pub fn data(type_name: &str, name: &str) -> Self {
        Resource {
            mode: ResourceMode::Data,
            type_name: type_name.to_string(),
            name: name.to_string(),
        }
    }

    pub fn instance(&self, key: Option<InstanceKey>) -> ResourceInstance {
        ResourceInstance {
            resource: self.clone(),
            key,
        }
    }

    pub fn absolute(&self, module: ModulePath) -> AbsResource {
        AbsResource {
            module,
            resource: self.clone(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// A resource instance address within a module.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub resource: Resource,
    pub key: Option<InstanceKey>,
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        fmt_opt_key(&self.key, f)
    }
}

/// A resource address qualified by module instance path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsResource {
    pub module: ModulePath,
    pub resource: Resource,
}

impl AbsResource {
    pub fn instance(&self, key: Option<InstanceKey>) -> AbsResourceInstance {
        AbsResourceInstance {
            module: self.module.clone(),
            resource: self.resource.instance(key),
        }
    }
}

impl fmt::Display for AbsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}", self.resource)
    }
}

/// A fully-qualified resource instance address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsResourceInstance {
    pub module: ModulePath,
    pub resource: ResourceInstance,
}

impl AbsResourceInstance {
    pub fn containing_resource(&self) -> AbsResource {
        AbsResource {
            module: self.module.clone(),
            resource: self.resource.resource.clone(),
        }
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}", self.resource)
    }
}

// ─── Deposed keys ─────────────────────────────────────────────

/// Identifies a previous incarnation of a resource instance displaced by
/// create-before-destroy replacement, pending its own destroy.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeposedKey(String);

impl DeposedKey {
    /// A fresh random key, eight hex digits.
    pub fn new() -> Self {
        let id = Uuid::now_v7();
        DeposedKey(id.simple().to_string()[..8].to_string())
    }
}

impl Default for DeposedKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeposedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Provider configurations ──────────────────────────────────

/// Address of one provider configuration: the provider type, an optional
/// alias, and an optional instance key when the alias uses `for_each`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub type_name: String,
    pub alias: Option<String>,
    pub key: Option<InstanceKey>,
}

impl ProviderConfig {
    pub fn default_for(type_name: &str) -> Self {
        ProviderConfig {
            type_name: type_name.to_string(),
            alias: None,
            key: None,
        }
    }
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider[\"{}\"]", self.type_name)?;
        if let Some(alias) = &self.alias {
            write!(f, ".{alias}")?;
        }
        fmt_opt_key(&self.key, f)
    }
}

// ─── Referenceable addresses ──────────────────────────────────

/// Everything a configuration expression can refer to, module-local.
/// Reference edges are wired by looking these up in the per-module index
/// built by the reference transformer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Referenceable {
    Resource(Resource),
    ResourceInstance(ResourceInstance),
    Local(String),
    OutputValue(String),
    ModuleCall(String),
    ModuleCallOutput { call: String, name: String },
}

impl Referenceable {
    /// The progressive fallback chain used during resolution: an exact
    /// instance reference falls back to its containing resource, and a
    /// module-call output falls back to the module call itself.
    pub fn fallback(&self) -> Option<Referenceable> {
        match self {
            Referenceable::ResourceInstance(inst) => {
                Some(Referenceable::Resource(inst.resource.clone()))
            }
            Referenceable::ModuleCallOutput { call, .. } => {
                Some(Referenceable::ModuleCall(call.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Referenceable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Referenceable::Resource(r) => write!(f, "{r}"),
            Referenceable::ResourceInstance(r) => write!(f, "{r}"),
            Referenceable::Local(name) => write!(f, "local.{name}"),
            Referenceable::OutputValue(name) => write!(f, "output.{name}"),
            Referenceable::ModuleCall(name) => write!(f, "module.{name}"),
            Referenceable::ModuleCallOutput { call, name } => {
                write!(f, "module.{call}.{name}")
            }
        }
    }
}

// ─── Targeting ────────────────────────────────────────────────

/// A user-supplied `-target`/`-exclude` filter address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Target {
    Module(ModulePath),
    Resource(AbsResource),
    ResourceInstance(AbsResourceInstance),
}

impl Target {
    /// Whether the given resource instance falls under this filter.
    pub fn contains_instance(&self, addr: &AbsResourceInstance) -> bool {
        match self {
            Target::Module(path) => path.contains(&addr.module),
            Target::Resource(res) => {
                res.module == addr.module && res.resource == addr.resource.resource
            }
            Target::ResourceInstance(inst) => inst == addr,
        }
    }

    /// Whether the given whole resource falls under this filter.
    pub fn contains_resource(&self, addr: &AbsResource) -> bool {
        match self {
            Target::Module(path) => path.contains(&addr.module),
            Target::Resource(res) => res == addr,
            Target::ResourceInstance(inst) => inst.containing_resource() == *addr,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Module(path) => write!(f, "{path}"),
            Target::Resource(res) => write!(f, "{res}"),
            Target::ResourceInstance(inst) => write!(f, "{inst}"),
        }
    }
}
