//! In-memory state snapshot model. Persistent serialization of state is
//! an external concern; the engine only needs structured read/write
//! access plus deep-copy semantics so a run never mutates caller-owned
//! data in place.

use crate::addrs::{
    AbsResource, AbsResourceInstance, DeposedKey, InstanceKey, ModulePath, ProviderConfig,
    Resource, ResourceInstance,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ─── Objects ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectStatus {
    Ready,
    /// A partially-created object from a failed apply; planned for
    /// replacement on the next run.
    Tainted,
}

/// One remote object tracked in state.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceObject {
    pub value: Value,
    pub status: ObjectStatus,
    /// Attribute paths carrying sensitivity marks, preserved across
    /// plan/apply so repeated runs neither lose nor re-derive them.
    pub sensitive_paths: Vec<String>,
    /// Addresses of resources this object depended on when created,
    /// persisted so a future destroy can be ordered correctly even if
    /// the configuration is gone by then.
    pub dependencies: Vec<AbsResource>,
    /// Opaque provider-private data carried between plan and apply.
    pub private: Vec<u8>,
}

impl InstanceObject {
    pub fn ready(value: Value) -> Self {
        InstanceObject {
            value,
            status: ObjectStatus::Ready,
            sensitive_paths: Vec::new(),
            dependencies: Vec::new(),
            private: Vec::new(),
        }
    }
}

// ─── Instances and resources ──────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceState {
    pub current: Option<InstanceObject>,
    pub deposed: BTreeMap<DeposedKey, InstanceObject>,
}

impl InstanceState {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.deposed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceState {
    /// The provider configuration managing every instance of this
    /// resource. Kept resource-level so partial applies converge all
    /// instances onto one provider address.
    pub provider: ProviderConfig,
    pub instances: BTreeMap<Option<InstanceKey>, InstanceState>,
}

// ─── Modules and the snapshot ─────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct OutputValue {
    pub value: Value,
    pub sensitive: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleState {
    pub resources: BTreeMap<Resource, ResourceState>,
    pub outputs: BTreeMap<String, OutputValue>,
}

/// Hierarchical state snapshot: module instance → resource → instance →
/// {current object, deposed objects}.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State {
    pub modules: BTreeMap<ModulePath, ModuleState>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.values().all(|m| {
            m.resources.values().all(|r| {
                r.instances.values().all(|i| i.is_empty())
            }) && m.outputs.is_empty()
        })
    }

    pub fn module(&self, path: &ModulePath) -> Option<&ModuleState> {
        self.modules.get(path)
    }

    pub fn module_mut(&mut self, path: &ModulePath) -> &mut ModuleState {
        self.modules.entry(path.clone()).or_default()
    }

    pub fn resource(&self, addr: &AbsResource) -> Option<&ResourceState> {
        self.modules.get(&addr.module)?.resources.get(&addr.resource)
    }

    pub fn instance(&self, addr: &AbsResourceInstance) -> Option<&InstanceState> {
        self.modules
            .get(&addr.module)?
            .resources
            .get(&addr.resource.resource)?
            .instances
            .get(&addr.resource.key)
    }

    pub fn current_object(&self, addr: &AbsResourceInstance) -> Option<&InstanceObject> {
        self.instance(addr)?.current.as_ref()
    }

    pub fn deposed_object(
        &self,
        addr: &AbsResourceInstance,
        key: &DeposedKey,
    ) -> Option<&InstanceObject> {
        self.instance(addr)?.deposed.get(key)
    }

    /// Record (or replace) the current object for an instance, creating
    /// the containing resource entry as needed.
    pub fn set_current(
        &mut self,
        addr: &AbsResourceInstance,
        provider: ProviderConfig,
        object: InstanceObject,
    ) {
        let module = self.module_mut(&addr.module);
        let resource = module
            .resources
            .entry(addr.resource.resource.clone())
            .or_insert_with(|| ResourceState {
                provider: provider.clone(),
                instances: BTreeMap::new(),
            });
        resource.provider = provider;
        resource
            .instances
            .entry(addr.resource.key.clone())
            .or_default()
            .current = Some(object);
    }

    /// Drop the current object for an instance, pruning empty containers.
    pub fn remove_current(&mut self, addr: &AbsResourceInstance) {
        if let Some(module) = self.modules.get_mut(&addr.module) {
            if let Some(resource) = module.resources.get_mut(&addr.resource.resource) {
                if let Some(instance) = resource.instances.get_mut(&addr.resource.key) {
                    instance.current = None;
                }
            }
        }
        self.prune();
    }

    /// Move the current object aside under a fresh deposed key, for
    /// create-before-destroy replacement. Returns the key, or None when
    /// there is no current object to depose.
    pub fn depose_current(&mut self, addr: &AbsResourceInstance) -> Option<DeposedKey> {
        let module = self.modules.get_mut(&addr.module)?;
        let resource = module.resources.get_mut(&addr.resource.resource)?;
        let instance = resource.instances.get_mut(&addr.resource.key)?;
        let object = instance.current.take()?;
        let key = DeposedKey::new();
        instance.deposed.insert(key.clone(), object);
        Some(key)
    }

    pub fn set_deposed(
        &mut self,
        addr: &AbsResourceInstance,
        provider: ProviderConfig,
        key: DeposedKey,
        object: InstanceObject,
    ) {
        let module = self.module_mut(&addr.module);
        let resource = module
            .resources
            .entry(addr.resource.resource.clone())
            .or_insert_with(|| ResourceState {
                provider: provider.clone(),
                instances: BTreeMap::new(),
            });
        resource
            .instances
            .entry(addr.resource.key.clone())
            .or_default()
            .deposed
            .insert(key, object);
    }

    pub fn remove_deposed(&mut self, addr: &AbsResourceInstance, key: &DeposedKey) {
        if let Some(module) = self.modules.get_mut(&addr.module) {
            if let Some(resource) = module.resources.get_mut(&addr.resource.resource) {
                if let Some(instance) = resource.instances.get_mut(&addr.resource.key) {
                    instance.deposed.remove(key);
                }
            }
        }
        self.prune();
    }

    /// Every resource instance address present in the snapshot, in
    /// deterministic order.
    pub fn all_instances(&self) -> Vec<AbsResourceInstance> {
        let mut out = Vec::new();
        for (path, module) in &self.modules {
            for (resource, rs) in &module.resources {
                for key in rs.instances.keys() {
                    out.push(AbsResourceInstance {
                        module: path.clone(),
                        resource: ResourceInstance {
                            resource: resource.clone(),
                            key: key.clone(),
                        },
                    });
                }
            }
        }
        out
    }

    /// Relocate a whole resource to a new address. Returns false when the
    /// source is missing or the destination is already occupied.
    pub fn move_resource(&mut self, from: &AbsResource, to: &AbsResource) -> bool {
        if self.resource(to).is_some() {
            return false;
        }
        let Some(module) = self.modules.get_mut(&from.module) else {
            return false;
        };
        let Some(rs) = module.resources.remove(&from.resource) else {
            return false;
        };
        self.module_mut(&to.module).resources.insert(to.resource.clone(), rs);
        self.prune();
        true
    }

    /// Relocate one instance within (or across) resources. Returns false
    /// when the source is missing or the destination occupied.
    pub fn move_instance(&mut self, from: &AbsResourceInstance, to: &AbsResourceInstance) -> bool {
        if self.instance(to).map_or(false, |i| !i.is_empty()) {
            return false;
        }
        let provider = match self.resource(&from.containing_resource()) {
            Some(rs) => rs.provider.clone(),
            None => return false,
        };
        let Some(module) = self.modules.get_mut(&from.module) else {
            return false;
        };
        let Some(rs) = module.resources.get_mut(&from.resource.resource) else {
            return false;
        };
        let Some(instance) = rs.instances.remove(&from.resource.key) else {
            return false;
        };
        let dest_module = self.module_mut(&to.module);
        let dest = dest_module
            .resources
            .entry(to.resource.resource.clone())
            .or_insert_with(|| ResourceState {
                provider,
                instances: BTreeMap::new(),
            });
        dest.instances.insert(to.resource.key.clone(), instance);
        self.prune();
        true
    }

    pub fn set_output(&mut self, path: &ModulePath, name: &str, value: OutputValue) {
        self.module_mut(path).outputs.insert(name.to_string(), value);
    }

    /// Drop empty instances, resources and modules.
    pub fn prune(&mut self) {
        for module in self.modules.values_mut() {
            for rs in module.resources.values_mut() {
                rs.instances.retain(|_, i| !i.is_empty());
            }
            module.resources.retain(|_, rs| !rs.instances.is_empty());
        }
        self.modules
            .retain(|path, m| path.is_root() || !m.resources.is_empty() || !m.outputs.is_empty());
    }
}

// ─── Concurrent wrapper ───────────────────────────────────────

/// Shared handle over a working state for the duration of one walk.
/// Vertices executing concurrently take the lock only for short
/// structured reads/writes; provider calls happen outside it.
#[derive(Clone, Debug)]
pub struct SyncState {
    inner: Arc<Mutex<State>>,
}

impl SyncState {
    pub fn new(state: State) -> Self {
        SyncState {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Run a closure with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn current_object(&self, addr: &AbsResourceInstance) -> Option<InstanceObject> {
        self.with(|s| s.current_object(addr).cloned())
    }

    pub fn set_current(
        &self,
        addr: &AbsResourceInstance,
        provider: ProviderConfig,
        object: InstanceObject,
    ) {
        self.with(|s| s.set_current(addr, provider, object));
    }

    pub fn remove_current(&self, addr: &AbsResourceInstance) {
        self.with(|s| s.remove_current(addr));
    }

    /// Take the state back out once the walk has finished. Panics if the
    /// walk still holds clones of the handle; that is a caller bug.
    pub fn close(self) -> State {
        let mutex = Arc::try_unwrap(self.inner)
            .expect("SyncState::close called while walk still holds the state");
        mutex.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    /// A plain copy of the current contents, for callers that need a
    /// snapshot while the walk may still be running.
    pub fn snapshot(&self) -> State {
        self.with(|s| s.clone())
    }
}
