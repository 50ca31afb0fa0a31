//! Per-vertex execution behavior for every walk operation. One visitor
//! instance is shared by all concurrently executing vertices; it holds
//! the working state, the change set under construction, and the walk's
//! option flags.

use crate::addrs::{AbsResource, AbsResourceInstance, DeposedKey, ModulePath, Referenceable};
use crate::config::{Condition, Config, ResourceConfig};
use crate::diags::{Diagnostic, Diagnostics};
use crate::graph::node::{Node, OutputNode, ProviderNode, ResourceNode, ResourceNodeKind};
use crate::graph::walk::{Visitor, WalkOperation};
use crate::hooks::Hooks;
use crate::plan::{Action, ActionReason, Changes, ResourceInstanceChange, SyncChanges};
use crate::provider::{
    ApplyChangeRequest, ImportRequest, PlanChangeRequest, Provider, ProviderCache,
    ReadDataSourceRequest, ReadResourceRequest,
};
use crate::state::{InstanceObject, ObjectStatus, OutputValue, SyncState};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) struct ExecVisitor {
    pub config: Config,
    pub providers: Arc<ProviderCache>,
    pub hooks: Hooks,
    /// Working state: becomes the planned state on a plan walk, the new
    /// state on an apply walk.
    pub state: SyncState,
    /// Refreshed prior state, maintained alongside the working state
    /// during plan walks only.
    pub refreshed: Option<SyncState>,
    /// Changes being recorded by a plan walk.
    pub changes: SyncChanges,
    /// Changes being replayed by an apply walk.
    pub planned: Changes,
    pub skip_refresh: bool,
    /// Refresh-only planning: refresh state, record no changes.
    pub skip_plan_changes: bool,
    pub force_replace: Vec<AbsResourceInstance>,
    /// Import ids keyed by the configured instance they import into.
    pub imports: HashMap<AbsResourceInstance, String>,
    /// Pre-walk move results, destination → source, for `prev_run_addr`.
    pub moved_from: HashMap<AbsResourceInstance, AbsResourceInstance>,
}

#[async_trait]
impl Visitor for ExecVisitor {
    async fn visit(&self, node: Node, operation: WalkOperation) -> Diagnostics {
        match node {
            Node::Root | Node::ModuleCall(_) => Diagnostics::new(),
            // Local values arrive pre-evaluated from the external parser;
            // the vertex exists only for ordering.
            Node::Local(_) => Diagnostics::new(),
            Node::Output(out) => self.visit_output(&out),
            Node::Provider(p) => self.visit_provider(&p, operation).await,
            Node::Resource(r) => match operation {
                WalkOperation::Validate => self.validate_resource(&r),
                WalkOperation::Eval => Diagnostics::new(),
                WalkOperation::Plan | WalkOperation::PlanDestroy | WalkOperation::Import => {
                    match r.kind {
                        ResourceNodeKind::Plan => self.plan_managed(&r).await,
                        ResourceNodeKind::DataRead => self.read_data(&r).await,
                        ResourceNodeKind::Orphan => self.plan_orphan(&r).await,
                        ResourceNodeKind::Destroy => self.plan_destroy(&r),
                        ResourceNodeKind::DestroyDeposed => self.plan_destroy_deposed(&r),
                        // Apply/forget vertices only exist in apply graphs.
                        _ => Diagnostics::new(),
                    }
                }
                WalkOperation::Apply => match r.kind {
                    ResourceNodeKind::Apply => self.apply_change(&r).await,
                    ResourceNodeKind::Destroy => self.apply_destroy(&r).await,
                    ResourceNodeKind::DestroyDeposed => self.apply_destroy_deposed(&r).await,
                    ResourceNodeKind::Forget => self.apply_forget(&r),
                    ResourceNodeKind::DataRead => self.read_data(&r).await,
                    _ => Diagnostics::new(),
                },
            },
        }
    }
}

impl ExecVisitor {
    // ─── Non-resource vertices ────────────────────────────────

    async fn visit_provider(&self, node: &ProviderNode, operation: WalkOperation) -> Diagnostics {
        if operation == WalkOperation::Validate {
            if !self.providers.has_type(&node.addr.type_name) {
                return Diagnostic::error(
                    "Missing required provider",
                    format!(
                        "This configuration requires provider {:?}, but no factory for it was registered with the context.",
                        node.addr.type_name
                    ),
                )
                .with_address(&node.addr)
                .into();
            }
            return Diagnostics::new();
        }
        match self.providers.ensure(&node.addr, node.config.clone()).await {
            Ok(_) => Diagnostics::new(),
            Err(diags) => diags,
        }
    }

    fn visit_output(&self, node: &OutputNode) -> Diagnostics {
        self.state.with(|s| {
            s.set_output(
                &node.module,
                &node.config.name,
                OutputValue {
                    value: node.config.value.clone(),
                    sensitive: node.config.sensitive,
                },
            )
        });
        Diagnostics::new()
    }

    fn validate_resource(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if !self.providers.has_type(&node.provider.type_name) {
            diags.push(
                Diagnostic::error(
                    "Missing required provider",
                    format!(
                        "Resource {} requires provider {:?}, which is not registered.",
                        node.addr, node.provider.type_name
                    ),
                )
                .with_address(&node.addr),
            );
        }
        if let Some(config) = &node.config {
            for cond in config
                .lifecycle
                .preconditions
                .iter()
                .chain(config.lifecycle.postconditions.iter())
            {
                if cond.attribute.is_empty() {
                    diags.push(
                        Diagnostic::error(
                            "Invalid lifecycle condition",
                            "A lifecycle condition must name the attribute it constrains.",
                        )
                        .with_address(&node.addr),
                    );
                }
            }
        }
        diags
    }

    // ─── Plan-walk behaviors ──────────────────────────────────

    /// Managed resource present in configuration: refresh (or import)
    /// the prior object, then diff against the desired configuration.
    async fn plan_managed(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(config) = &node.config else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };

        let mut prior = node.prior.clone();
        if let Some(object) = prior.clone() {
            if !self.skip_refresh {
                match self
                    .refresh_object(node, &config.type_name, &provider, &object)
                    .await
                {
                    Ok(refreshed) => prior = refreshed,
                    Err(d) => return d,
                }
            }
        } else if let Some(id) = self.imports.get(&node.addr).cloned() {
            match self.import_object(node, config, &provider, &id).await {
                Ok(imported) => prior = Some(imported),
                Err(d) => return d,
            }
        }

        if self.skip_plan_changes {
            return diags;
        }

        for cond in &config.lifecycle.preconditions {
            if !cond.holds(&config.config) {
                diags.push(condition_failure("Resource precondition failed", cond, &node.addr));
            }
        }
        if diags.has_errors() {
            return diags;
        }

        let prior_value = prior.as_ref().map_or(Value::Null, |o| o.value.clone());
        let private = prior.as_ref().map(|o| o.private.clone()).unwrap_or_default();
        let resp = provider
            .plan_resource_change(PlanChangeRequest {
                type_name: config.type_name.clone(),
                prior: prior_value.clone(),
                proposed: config.config.clone(),
                private,
            })
            .await;
        diags.extend(resp.diagnostics.clone());
        if resp.diagnostics.has_errors() {
            return diags;
        }

        let tainted = prior
            .as_ref()
            .map_or(false, |o| o.status == ObjectStatus::Tainted);
        let forced = self.force_replace.contains(&node.addr);
        let (action, reason) = if prior.is_none() {
            (Action::Create, ActionReason::None)
        } else if tainted {
            (replace_action(config), ActionReason::ReplaceBecauseTainted)
        } else if forced {
            (replace_action(config), ActionReason::ReplaceByRequest)
        } else if resp.requires_replace {
            (replace_action(config), ActionReason::ReplaceBecauseCannotUpdate)
        } else if resp.planned == prior_value {
            (Action::NoOp, ActionReason::None)
        } else {
            (Action::Update, ActionReason::None)
        };

        for cond in &config.lifecycle.postconditions {
            if !cond.holds(&resp.planned) {
                diags.push(condition_failure(
                    "Resource postcondition failed",
                    cond,
                    &node.addr,
                ));
            }
        }

        if action != Action::NoOp {
            let mut object = InstanceObject::ready(resp.planned.clone());
            object.sensitive_paths = self.sensitive_paths(config, prior.as_ref());
            object.dependencies = dependencies_from(config, &node.addr.module);
            object.private = resp.private.clone();
            self.state
                .set_current(&node.addr, node.provider.clone(), object);

            trace!(addr = %node.addr, ?action, "planned change");
            self.changes.append(ResourceInstanceChange {
                addr: node.addr.clone(),
                prev_run_addr: self.prev_run_addr(&node.addr),
                deposed: None,
                provider: node.provider.clone(),
                action,
                reason,
                before: prior_value,
                after: resp.planned,
                private: resp.private,
            });
        }
        diags
    }

    /// Data source: read and store the result. Reads run during both
    /// plan and apply walks so later vertices see fresh values.
    async fn read_data(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(config) = &node.config else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };
        let resp = provider
            .read_data_source(ReadDataSourceRequest {
                type_name: config.type_name.clone(),
                config: config.config.clone(),
            })
            .await;
        diags.extend(resp.diagnostics.clone());
        if resp.diagnostics.has_errors() {
            return diags;
        }
        let mut object = InstanceObject::ready(resp.value);
        object.sensitive_paths = config.sensitive_paths.clone();
        object.dependencies = dependencies_from(config, &node.addr.module);
        if let Some(refreshed) = &self.refreshed {
            refreshed.set_current(&node.addr, node.provider.clone(), object.clone());
        }
        // Plan walks record the read so the apply walk repeats it against
        // the remote value current at apply time.
        if self.refreshed.is_some() && !self.skip_plan_changes {
            trace!(addr = %node.addr, "planned data read");
            self.changes.append(ResourceInstanceChange {
                addr: node.addr.clone(),
                prev_run_addr: self.prev_run_addr(&node.addr),
                deposed: None,
                provider: node.provider.clone(),
                action: Action::Read,
                reason: ActionReason::None,
                before: node.prior.as_ref().map_or(Value::Null, |o| o.value.clone()),
                after: object.value.clone(),
                private: Vec::new(),
            });
        }
        self.state
            .set_current(&node.addr, node.provider.clone(), object);
        diags
    }

    /// In state but not in configuration: refresh, then plan a destroy
    /// (or a forget when a non-destroying `removed` statement matched).
    async fn plan_orphan(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(object) = node.prior.clone() else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };

        let mut prior = Some(object);
        if !self.skip_refresh {
            if let Some(current) = prior.clone() {
                let type_name = node.addr.resource.resource.type_name.clone();
                match self
                    .refresh_object(node, &type_name, &provider, &current)
                    .await
                {
                    Ok(refreshed) => prior = refreshed,
                    Err(d) => return d,
                }
            }
        }
        let Some(object) = prior else {
            // Already gone in the real world; nothing left to plan.
            return diags;
        };
        if self.skip_plan_changes {
            return diags;
        }

        if node.forget_on_orphan {
            diags.push(
                Diagnostic::warning(
                    "Resource will no longer be managed",
                    format!(
                        "{} will be removed from the state, but the real object it tracks will not be destroyed.",
                        node.addr
                    ),
                )
                .with_address(&node.addr),
            );
            self.record_removal(node, &object, Action::Forget, ActionReason::ForgetBecauseRemoved);
        } else {
            let reason = if self.config.module_for_path(&node.addr.module).is_none() {
                ActionReason::DeleteBecauseNoModule
            } else {
                ActionReason::DeleteBecauseNoResourceConfig
            };
            self.record_removal(node, &object, Action::Delete, reason);
        }
        self.state.remove_current(&node.addr);
        diags
    }

    /// Destroy-mode plan vertex: the pre-destroy refresh already ran as
    /// a separate sub-plan, so this only records the deletion.
    fn plan_destroy(&self, node: &ResourceNode) -> Diagnostics {
        let Some(object) = &node.prior else {
            return Diagnostics::new();
        };
        if !self.skip_plan_changes {
            self.record_removal(node, object, Action::Delete, ActionReason::None);
            self.state.remove_current(&node.addr);
        }
        Diagnostics::new()
    }

    fn plan_destroy_deposed(&self, node: &ResourceNode) -> Diagnostics {
        let (Some(object), Some(key)) = (&node.prior, &node.deposed) else {
            return Diagnostics::new();
        };
        if !self.skip_plan_changes {
            self.changes.append(ResourceInstanceChange {
                addr: node.addr.clone(),
                prev_run_addr: node.addr.clone(),
                deposed: Some(key.clone()),
                provider: node.provider.clone(),
                action: Action::Delete,
                reason: ActionReason::None,
                before: object.value.clone(),
                after: Value::Null,
                private: object.private.clone(),
            });
            self.state.with(|s| s.remove_deposed(&node.addr, key));
        }
        Diagnostics::new()
    }

    // ─── Apply-walk behaviors ─────────────────────────────────

    /// Create, update or replace per the planned change.
    async fn apply_change(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(change) = self.planned.change_for(&node.addr).cloned() else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };
        let type_name = node.addr.resource.resource.type_name.clone();

        if let Some(config) = &node.config {
            for cond in &config.lifecycle.preconditions {
                if !cond.holds(&config.config) {
                    diags.push(condition_failure(
                        "Resource precondition failed",
                        cond,
                        &node.addr,
                    ));
                }
            }
            if diags.has_errors() {
                return diags;
            }
        }

        match change.action {
            Action::CreateThenDelete => {
                // Depose the live object first so the replacement can be
                // created while the original still exists.
                let deposed_key = self.state.with(|s| s.depose_current(&node.addr));

                self.pre_apply(node, None, change.action, &change.before, &change.after)
                    .await;
                let resp = provider
                    .apply_resource_change(ApplyChangeRequest {
                        type_name: type_name.clone(),
                        prior: Value::Null,
                        planned: change.after.clone(),
                        private: change.private.clone(),
                    })
                    .await;
                let failed = resp.diagnostics.has_errors();
                diags.extend(resp.diagnostics.clone());
                self.write_applied(node, &resp.new_value, &resp.private, failed);
                self.post_apply(node, None, &resp.new_value, failed).await;
                if failed {
                    // The deposed object stays in state for the next run.
                    return diags;
                }

                if let Some(key) = deposed_key {
                    let deposed_value = self
                        .state
                        .with(|s| s.deposed_object(&node.addr, &key).map(|o| o.value.clone()))
                        .unwrap_or(Value::Null);
                    self.pre_apply(node, Some(&key), Action::Delete, &deposed_value, &Value::Null)
                        .await;
                    let resp = provider
                        .apply_resource_change(ApplyChangeRequest {
                            type_name,
                            prior: deposed_value,
                            planned: Value::Null,
                            private: Vec::new(),
                        })
                        .await;
                    let failed = resp.diagnostics.has_errors();
                    diags.extend(resp.diagnostics.clone());
                    if !failed {
                        self.state.with(|s| s.remove_deposed(&node.addr, &key));
                    }
                    self.post_apply(node, Some(&key), &Value::Null, failed).await;
                }
            }
            Action::DeleteThenCreate => {
                self.pre_apply(node, None, change.action, &change.before, &change.after)
                    .await;
                let destroy = provider
                    .apply_resource_change(ApplyChangeRequest {
                        type_name: type_name.clone(),
                        prior: change.before.clone(),
                        planned: Value::Null,
                        private: change.private.clone(),
                    })
                    .await;
                if destroy.diagnostics.has_errors() {
                    diags.extend(destroy.diagnostics);
                    self.post_apply(node, None, &change.before, true).await;
                    return diags;
                }
                self.state.remove_current(&node.addr);
                let resp = provider
                    .apply_resource_change(ApplyChangeRequest {
                        type_name,
                        prior: Value::Null,
                        planned: change.after.clone(),
                        private: change.private.clone(),
                    })
                    .await;
                let failed = resp.diagnostics.has_errors();
                diags.extend(resp.diagnostics.clone());
                self.write_applied(node, &resp.new_value, &resp.private, failed);
                self.post_apply(node, None, &resp.new_value, failed).await;
            }
            _ => {
                self.pre_apply(node, None, change.action, &change.before, &change.after)
                    .await;
                let resp = provider
                    .apply_resource_change(ApplyChangeRequest {
                        type_name,
                        prior: change.before.clone(),
                        planned: change.after.clone(),
                        private: change.private.clone(),
                    })
                    .await;
                let failed = resp.diagnostics.has_errors();
                diags.extend(resp.diagnostics.clone());
                self.write_applied(node, &resp.new_value, &resp.private, failed);
                self.post_apply(node, None, &resp.new_value, failed).await;
            }
        }

        if !diags.has_errors() {
            if let Some(config) = &node.config {
                let applied = self
                    .state
                    .current_object(&node.addr)
                    .map_or(Value::Null, |o| o.value);
                for cond in &config.lifecycle.postconditions {
                    if !cond.holds(&applied) {
                        diags.push(condition_failure(
                            "Resource postcondition failed",
                            cond,
                            &node.addr,
                        ));
                    }
                }
            }
        }
        diags
    }

    async fn apply_destroy(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(change) = self.planned.change_for(&node.addr).cloned() else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };
        self.pre_apply(node, None, Action::Delete, &change.before, &Value::Null)
            .await;
        let resp = provider
            .apply_resource_change(ApplyChangeRequest {
                type_name: node.addr.resource.resource.type_name.clone(),
                prior: change.before.clone(),
                planned: Value::Null,
                private: change.private.clone(),
            })
            .await;
        let failed = resp.diagnostics.has_errors();
        diags.extend(resp.diagnostics);
        if !failed {
            self.state.remove_current(&node.addr);
        }
        self.post_apply(node, None, &Value::Null, failed).await;
        diags
    }

    async fn apply_destroy_deposed(&self, node: &ResourceNode) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let Some(key) = &node.deposed else {
            return diags;
        };
        let Some(change) = self.planned.change_for_deposed(&node.addr, key).cloned() else {
            return diags;
        };
        let provider = match self.provider_for(node).await {
            Ok(p) => p,
            Err(d) => return d,
        };
        self.pre_apply(node, Some(key), Action::Delete, &change.before, &Value::Null)
            .await;
        let resp = provider
            .apply_resource_change(ApplyChangeRequest {
                type_name: node.addr.resource.resource.type_name.clone(),
                prior: change.before.clone(),
                planned: Value::Null,
                private: change.private.clone(),
            })
            .await;
        let failed = resp.diagnostics.has_errors();
        diags.extend(resp.diagnostics);
        if !failed {
            self.state.with(|s| s.remove_deposed(&node.addr, key));
        }
        self.post_apply(node, Some(key), &Value::Null, failed).await;
        diags
    }

    /// Forget: drop from state with no provider call.
    fn apply_forget(&self, node: &ResourceNode) -> Diagnostics {
        debug!(addr = %node.addr, "forgetting resource instance");
        self.state.remove_current(&node.addr);
        Diagnostics::new()
    }

    // ─── Shared helpers ───────────────────────────────────────

    async fn provider_for(&self, node: &ResourceNode) -> Result<Arc<dyn Provider>, Diagnostics> {
        // The provider vertex normally configured the instance already;
        // the fallback covers graphs where it was pruned.
        match self.providers.get(&node.provider).await {
            Some(p) => Ok(p),
            None => self.providers.ensure(&node.provider, Value::Null).await,
        }
    }

    /// Refresh one tracked object, updating both the refreshed and
    /// working states. `Ok(None)` means the object is gone upstream.
    async fn refresh_object(
        &self,
        node: &ResourceNode,
        type_name: &str,
        provider: &Arc<dyn Provider>,
        object: &InstanceObject,
    ) -> Result<Option<InstanceObject>, Diagnostics> {
        for hook in &self.hooks {
            hook.pre_refresh(&node.addr, &object.value).await;
        }
        let resp = provider
            .read_resource(ReadResourceRequest {
                type_name: type_name.to_string(),
                prior: object.value.clone(),
                private: object.private.clone(),
            })
            .await;
        if resp.diagnostics.has_errors() {
            return Err(resp.diagnostics);
        }
        for hook in &self.hooks {
            hook.post_refresh(&node.addr, &resp.new_value).await;
        }
        if resp.new_value.is_null() {
            debug!(addr = %node.addr, "object no longer exists, dropping from state");
            if let Some(refreshed) = &self.refreshed {
                refreshed.remove_current(&node.addr);
            }
            self.state.remove_current(&node.addr);
            return Ok(None);
        }
        let mut updated = object.clone();
        updated.value = resp.new_value;
        updated.private = resp.private;
        if let Some(refreshed) = &self.refreshed {
            refreshed.set_current(&node.addr, node.provider.clone(), updated.clone());
        }
        self.state
            .set_current(&node.addr, node.provider.clone(), updated.clone());
        Ok(Some(updated))
    }

    async fn import_object(
        &self,
        node: &ResourceNode,
        config: &ResourceConfig,
        provider: &Arc<dyn Provider>,
        id: &str,
    ) -> Result<InstanceObject, Diagnostics> {
        for hook in &self.hooks {
            hook.pre_import(&node.addr, id).await;
        }
        let resp = provider
            .import_resource_state(ImportRequest {
                type_name: config.type_name.clone(),
                id: id.to_string(),
            })
            .await;
        if resp.diagnostics.has_errors() {
            return Err(resp.diagnostics);
        }
        for hook in &self.hooks {
            hook.post_import(&node.addr, &resp.value).await;
        }
        debug!(addr = %node.addr, id, "imported remote object");
        let mut object = InstanceObject::ready(resp.value);
        object.sensitive_paths = config.sensitive_paths.clone();
        if let Some(refreshed) = &self.refreshed {
            refreshed.set_current(&node.addr, node.provider.clone(), object.clone());
        }
        self.state
            .set_current(&node.addr, node.provider.clone(), object.clone());
        Ok(object)
    }

    fn record_removal(
        &self,
        node: &ResourceNode,
        object: &InstanceObject,
        action: Action,
        reason: ActionReason,
    ) {
        trace!(addr = %node.addr, ?action, "planned removal");
        self.changes.append(ResourceInstanceChange {
            addr: node.addr.clone(),
            prev_run_addr: self.prev_run_addr(&node.addr),
            deposed: None,
            provider: node.provider.clone(),
            action,
            reason,
            before: object.value.clone(),
            after: Value::Null,
            private: object.private.clone(),
        });
    }

    /// Record the outcome of one provider apply call in the working
    /// state: a null result removes the object, an errored partial
    /// result is kept as tainted, success lands as ready.
    fn write_applied(&self, node: &ResourceNode, new_value: &Value, private: &[u8], failed: bool) {
        if new_value.is_null() {
            if failed {
                // Nothing was created; the prior object (if any) stays.
                return;
            }
            self.state.remove_current(&node.addr);
            return;
        }
        let mut object = InstanceObject::ready(new_value.clone());
        if failed {
            object.status = ObjectStatus::Tainted;
        }
        if let Some(config) = &node.config {
            object.sensitive_paths = self.sensitive_paths(config, node.prior.as_ref());
            object.dependencies = dependencies_from(config, &node.addr.module);
        } else if let Some(prior) = &node.prior {
            object.sensitive_paths = prior.sensitive_paths.clone();
            object.dependencies = prior.dependencies.clone();
        }
        object.private = private.to_vec();
        // Writing through set_current also converges the resource-level
        // provider address for every instance of this resource.
        self.state
            .set_current(&node.addr, node.provider.clone(), object);
    }

    /// Union of configured sensitive paths and those already recorded on
    /// the prior object, so repeated runs neither lose nor re-derive
    /// sensitivity marks.
    fn sensitive_paths(
        &self,
        config: &ResourceConfig,
        prior: Option<&InstanceObject>,
    ) -> Vec<String> {
        let mut paths = config.sensitive_paths.clone();
        if let Some(object) = prior {
            for p in &object.sensitive_paths {
                if !paths.contains(p) {
                    paths.push(p.clone());
                }
            }
        }
        paths.sort();
        paths
    }

    fn prev_run_addr(&self, addr: &AbsResourceInstance) -> AbsResourceInstance {
        self.moved_from.get(addr).cloned().unwrap_or_else(|| addr.clone())
    }

    async fn pre_apply(
        &self,
        node: &ResourceNode,
        deposed: Option<&DeposedKey>,
        action: Action,
        before: &Value,
        after: &Value,
    ) {
        for hook in &self.hooks {
            hook.pre_apply(&node.addr, deposed, action, before, after).await;
        }
    }

    async fn post_apply(
        &self,
        node: &ResourceNode,
        deposed: Option<&DeposedKey>,
        new_value: &Value,
        failed: bool,
    ) {
        let error = failed.then_some("apply failed");
        for hook in &self.hooks {
            hook.post_apply(&node.addr, deposed, new_value, error).await;
        }
    }
}

fn replace_action(config: &ResourceConfig) -> Action {
    if config.lifecycle.create_before_destroy {
        Action::CreateThenDelete
    } else {
        Action::DeleteThenCreate
    }
}

fn condition_failure(summary: &str, cond: &Condition, addr: &AbsResourceInstance) -> Diagnostic {
    Diagnostic::error(summary, cond.error_message.clone()).with_address(addr)
}

/// The resource addresses a configured block depends on, persisted on
/// new objects so a future destroy can be ordered after the config is
/// gone.
fn dependencies_from(config: &ResourceConfig, module: &ModulePath) -> Vec<AbsResource> {
    let mut out: Vec<AbsResource> = Vec::new();
    for r in config.refs.iter().chain(config.depends_on.iter()) {
        let dep = match r {
            Referenceable::Resource(res) => res.absolute(module.clone()),
            Referenceable::ResourceInstance(inst) => inst.resource.absolute(module.clone()),
            _ => continue,
        };
        if !out.contains(&dep) {
            out.push(dep);
        }
    }
    out
}
