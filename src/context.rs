//! The public entry point: a [`Context`] owns the provider factories,
//! hooks, and concurrency settings, and runs plan, apply, and validate
//! walks one at a time.

use crate::config::Config;
use crate::diags::{Diagnostic, Diagnostics};
use crate::engine::exec::ExecVisitor;
use crate::engine::{self, ApplyOpts, PlanOpts, RunEnv};
use crate::graph::transform::PlanGraphBuilder;
use crate::graph::walk::{WalkOperation, Walker};
use crate::hooks::Hooks;
use crate::plan::{Changes, Plan, PlanMode, SyncChanges};
use crate::provider::{ProviderCache, ProviderFactory};
use crate::state::{State, SyncState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, OwnedMutexGuard};
use tracing::{debug, warn};

/// Concurrency bound used when the caller passes zero.
pub const DEFAULT_PARALLELISM: usize = 10;

pub struct ContextOpts {
    /// Maximum concurrent graph vertices. Zero means
    /// [`DEFAULT_PARALLELISM`]; negative values are rejected.
    pub parallelism: i32,
    pub hooks: Hooks,
    pub providers: HashMap<String, ProviderFactory>,
}

impl Default for ContextOpts {
    fn default() -> Self {
        ContextOpts {
            parallelism: 0,
            hooks: Vec::new(),
            providers: HashMap::new(),
        }
    }
}

pub struct Context {
    parallelism: usize,
    hooks: Hooks,
    providers: Arc<ProviderCache>,
    /// Held for the duration of each run; `stop` blocks on it so that it
    /// returns only once the interrupted walk has drained.
    run_lock: Arc<tokio::sync::Mutex<()>>,
    /// Cancel signal for the run in progress, if any.
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(opts: ContextOpts) -> Result<Self, Diagnostics> {
        if opts.parallelism < 0 {
            return Err(Diagnostic::error(
                "Invalid parallelism value",
                format!(
                    "Parallelism must be zero (for the default of {DEFAULT_PARALLELISM}) or positive, not {}.",
                    opts.parallelism
                ),
            )
            .into());
        }
        let parallelism = if opts.parallelism == 0 {
            DEFAULT_PARALLELISM
        } else {
            opts.parallelism as usize
        };
        Ok(Context {
            parallelism,
            hooks: opts.hooks,
            providers: Arc::new(ProviderCache::new(opts.providers)),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            stop_tx: Mutex::new(None),
        })
    }

    /// Plan the changes needed to move from `prior_state` to the
    /// configuration, per the requested mode and options.
    ///
    /// Panics if another run is already in progress on this context;
    /// callers are expected to serialize runs themselves.
    pub async fn plan(
        &self,
        config: &Config,
        prior_state: &State,
        opts: &PlanOpts,
    ) -> (Option<Plan>, Diagnostics) {
        let (guard, env) = self.begin_run();
        let result = engine::plan::plan(config, prior_state, opts, &env).await;
        self.end_run(guard);
        result
    }

    /// Execute a previously created plan, returning the new state.
    ///
    /// Panics if another run is already in progress on this context.
    pub async fn apply(
        &self,
        config: &Config,
        plan: &Plan,
        opts: &ApplyOpts,
    ) -> (State, Diagnostics) {
        let (guard, env) = self.begin_run();
        let result = engine::apply::apply(config, plan, opts, &env).await;
        self.end_run(guard);
        result
    }

    /// Check the configuration for problems detectable without real
    /// provider calls or state.
    ///
    /// Panics if another run is already in progress on this context.
    pub async fn validate(&self, config: &Config) -> Diagnostics {
        let (guard, env) = self.begin_run();
        let diags = self.validate_walk(config, &env).await;
        self.end_run(guard);
        diags
    }

    async fn validate_walk(&self, config: &Config, env: &RunEnv) -> Diagnostics {
        let empty = State::default();
        let graph = match (PlanGraphBuilder {
            config,
            state: &empty,
            mode: PlanMode::Normal,
            targets: &[],
            excludes: &[],
            removes: &[],
        })
        .build()
        {
            Ok(g) => g,
            Err(d) => return d,
        };
        let visitor = Arc::new(ExecVisitor {
            config: config.clone(),
            providers: env.providers.clone(),
            hooks: env.hooks.clone(),
            state: SyncState::new(State::default()),
            refreshed: None,
            changes: SyncChanges::new(),
            planned: Changes::new(),
            skip_refresh: true,
            skip_plan_changes: true,
            force_replace: Vec::new(),
            imports: HashMap::new(),
            moved_from: HashMap::new(),
        });
        let walker = Walker {
            parallelism: env.parallelism,
            cancel: env.cancel.clone(),
        };
        walker.walk(&graph, WalkOperation::Validate, visitor).await
    }

    /// Interrupt the run in progress, if any. In-flight provider calls
    /// are asked to stop and vertices not yet started are skipped; this
    /// returns only once the walk has fully drained, so the context is
    /// immediately reusable afterwards.
    pub async fn stop(&self) {
        debug!("stopping current run");
        let sent = {
            let tx = self.stop_tx.lock().unwrap_or_else(|e| e.into_inner());
            match tx.as_ref() {
                Some(tx) => tx.send(true).is_ok(),
                None => false,
            }
        };
        if sent {
            for hook in &self.hooks {
                hook.stopping().await;
            }
            // Best effort: a provider that ignores the request just runs
            // its current call to completion.
            for (addr, instance) in self.providers.snapshot().await {
                if let Err(err) = instance.stop().await {
                    warn!(provider = %addr, error = %err, "provider failed to stop");
                }
            }
        }
        // Wait for the interrupted run to drain.
        drop(self.run_lock.lock().await);
    }

    fn begin_run(&self) -> (OwnedMutexGuard<()>, RunEnv) {
        let guard = self
            .run_lock
            .clone()
            .try_lock_owned()
            .expect("a run is already in progress on this context");
        let (tx, rx) = watch::channel(false);
        *self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        let env = RunEnv {
            providers: self.providers.clone(),
            hooks: self.hooks.clone(),
            parallelism: self.parallelism,
            cancel: rx,
        };
        (guard, env)
    }

    fn end_run(&self, guard: OwnedMutexGuard<()>) {
        *self.stop_tx.lock().unwrap_or_else(|e| e.into_inner()) = None;
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{AbsResourceInstance, ModulePath, ProviderConfig, Resource, Target};
    use crate::config::{
        ImportBlock, Lifecycle, MoveEndpoint, MovedBlock, ProviderBlock, RemovedBlock,
        ResourceConfig,
    };
    use crate::hooks::recording::RecordingHook;
    use crate::plan::{Action, ActionReason};
    use crate::provider::Provider;
    use crate::provider_mock::MockProvider;
    use crate::state::InstanceObject;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn test_config(resources: Vec<ResourceConfig>) -> Config {
        let mut config = Config::empty();
        config.root.providers.push(ProviderBlock::new("test", Value::Null));
        config.root.resources = resources;
        config
    }

    fn context_with(
        provider: Arc<MockProvider>,
        hooks: Hooks,
        parallelism: i32,
    ) -> Context {
        let mut providers: HashMap<String, ProviderFactory> = HashMap::new();
        providers.insert(
            "test".to_string(),
            Arc::new(move || Ok(provider.clone() as Arc<dyn Provider>)),
        );
        Context::new(ContextOpts {
            parallelism,
            hooks,
            providers,
        })
        .expect("valid context options")
    }

    fn root_instance(name: &str) -> AbsResourceInstance {
        Resource::managed("test_thing", name)
            .absolute(ModulePath::root())
            .instance(None)
    }

    fn state_with(objects: &[(&str, Value)]) -> State {
        let mut state = State::default();
        for (name, value) in objects {
            state.set_current(
                &root_instance(name),
                ProviderConfig::default_for("test"),
                InstanceObject::ready(value.clone()),
            );
        }
        state
    }

    async fn plan_ok(ctx: &Context, config: &Config, state: &State, opts: &PlanOpts) -> Plan {
        let (plan, diags) = ctx.plan(config, state, opts).await;
        assert!(!diags.has_errors(), "plan diagnostics: {diags}");
        plan.expect("plan should be produced")
    }

    async fn apply_ok(ctx: &Context, config: &Config, plan: &Plan) -> State {
        let (state, diags) = ctx.apply(config, plan, &ApplyOpts::default()).await;
        assert!(!diags.has_errors(), "apply diagnostics: {diags}");
        state
    }

    #[test]
    fn negative_parallelism_is_rejected() {
        let err = Context::new(ContextOpts {
            parallelism: -1,
            ..ContextOpts::default()
        })
        .expect_err("negative parallelism");
        assert!(err.to_string().contains("Invalid parallelism value"));
    }

    #[tokio::test]
    async fn create_then_converge_to_no_op() {
        let provider = Arc::new(MockProvider::new());
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let config = test_config(vec![ResourceConfig::managed(
            "test_thing",
            "web",
            json!({"name": "web"}),
        )]);

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        assert_eq!(plan.changes.resources.len(), 1);
        assert_eq!(plan.changes.resources[0].action, Action::Create);

        let state = apply_ok(&ctx, &config, &plan).await;
        let object = state
            .current_object(&root_instance("web"))
            .expect("object created");
        assert!(object.value.get("id").is_some());
        assert!(provider.calls().contains(&"create web".to_string()));

        // Nothing drifted, so a second plan is empty.
        let plan = plan_ok(&ctx, &config, &state, &PlanOpts::default()).await;
        assert!(plan.changes.is_empty(), "second plan should be a no-op");
    }

    #[tokio::test]
    async fn create_before_destroy_orders_create_first() {
        let provider = Arc::new(MockProvider::new());
        let hook = Arc::new(RecordingHook::new());
        let ctx = context_with(provider.clone(), vec![hook.clone()], 0);
        let mut rc = ResourceConfig::managed(
            "test_thing",
            "web",
            json!({"name": "web", "replace_me": "b"}),
        );
        rc.lifecycle = Lifecycle {
            create_before_destroy: true,
            ..Lifecycle::default()
        };
        let config = test_config(vec![rc]);
        let state = state_with(&[(
            "web",
            json!({"name": "web", "id": "i-old", "replace_me": "a"}),
        )]);

        let plan = plan_ok(&ctx, &config, &state, &PlanOpts::default()).await;
        assert_eq!(plan.changes.resources.len(), 1);
        assert_eq!(plan.changes.resources[0].action, Action::CreateThenDelete);

        let state = apply_ok(&ctx, &config, &plan).await;
        let calls = provider.calls();
        let create = calls.iter().position(|c| c == "create web");
        let destroy = calls.iter().position(|c| c == "destroy web");
        assert!(
            create.expect("create ran") < destroy.expect("destroy ran"),
            "replacement must create before destroying: {calls:?}"
        );

        // One current object with the new id, no deposed leftovers.
        let object = state
            .current_object(&root_instance("web"))
            .expect("replacement object");
        assert_ne!(object.value["id"], json!("i-old"));
        let events = hook.take();
        assert!(events
            .iter()
            .any(|e| e.starts_with("pre-apply test_thing.web CreateThenDelete")));
        assert!(
            events.iter().any(|e| e.contains("(deposed")),
            "deposed destroy should be announced: {events:?}"
        );
    }

    #[tokio::test]
    async fn destroy_refreshes_and_skips_vanished_objects() {
        let provider = Arc::new(MockProvider::new());
        provider.mark_gone("web");
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let config = test_config(vec![
            ResourceConfig::managed("test_thing", "web", json!({"name": "web"})),
            ResourceConfig::managed("test_thing", "db", json!({"name": "db"})),
        ]);
        let state = state_with(&[
            ("web", json!({"name": "web", "id": "i-1"})),
            ("db", json!({"name": "db", "id": "i-2"})),
        ]);

        let opts = PlanOpts {
            mode: PlanMode::Destroy,
            ..PlanOpts::default()
        };
        let plan = plan_ok(&ctx, &config, &state, &opts).await;
        let addrs: Vec<String> = plan
            .changes
            .resources
            .iter()
            .map(|c| c.addr.to_string())
            .collect();
        assert_eq!(addrs, vec!["test_thing.db"], "gone object not re-destroyed");

        let state = apply_ok(&ctx, &config, &plan).await;
        assert!(state.is_empty());
        let calls = provider.calls();
        assert!(calls.contains(&"destroy db".to_string()));
        assert!(!calls.contains(&"destroy web".to_string()));
    }

    #[tokio::test]
    async fn removed_block_forgets_without_destroying() {
        let provider = Arc::new(MockProvider::new());
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let mut config = test_config(vec![ResourceConfig::managed(
            "test_thing",
            "db",
            json!({"name": "db"}),
        )]);
        config.root.removed.push(RemovedBlock {
            from: Resource::managed("test_thing", "web"),
            destroy: false,
        });
        let state = state_with(&[
            ("web", json!({"name": "web", "id": "i-1"})),
            ("db", json!({"name": "db", "id": "i-2"})),
        ]);

        let (plan, diags) = ctx.plan(&config, &state, &PlanOpts::default()).await;
        assert!(!diags.has_errors(), "{diags}");
        assert!(
            diags
                .warnings()
                .any(|d| d.summary == "Resource will no longer be managed"),
            "{diags}"
        );
        let plan = plan.expect("plan");
        let change = plan
            .changes
            .change_for(&root_instance("web"))
            .expect("forget change");
        assert_eq!(change.action, Action::Forget);
        assert_eq!(change.reason, ActionReason::ForgetBecauseRemoved);

        let state = apply_ok(&ctx, &config, &plan).await;
        assert!(state.current_object(&root_instance("web")).is_none());
        assert!(state.current_object(&root_instance("db")).is_some());
        // Forgetting drops the tracking only; the real object survives.
        assert!(
            !provider.calls().contains(&"destroy web".to_string()),
            "{:?}",
            provider.calls()
        );
    }

    #[tokio::test]
    async fn import_block_adopts_remote_object() {
        let provider = Arc::new(MockProvider::new());
        provider.set_import_result("i-77", json!({"name": "web", "id": "i-77"}));
        let hook = Arc::new(RecordingHook::new());
        let ctx = context_with(provider.clone(), vec![hook.clone()], 0);
        let mut config = test_config(vec![ResourceConfig::managed(
            "test_thing",
            "web",
            json!({"name": "web"}),
        )]);
        config.root.imports.push(ImportBlock {
            to: Resource::managed("test_thing", "web").instance(None),
            id: "i-77".into(),
        });

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        assert!(provider.calls().contains(&"import i-77".to_string()));
        // The adopted object already matches the configuration.
        assert!(plan.changes.is_empty());
        let object = plan
            .prior_state
            .current_object(&root_instance("web"))
            .expect("imported object");
        assert_eq!(object.value["id"], json!("i-77"));
        let events = hook.take();
        assert!(
            events.contains(&"pre-import test_thing.web i-77".to_string()),
            "{events:?}"
        );
        assert!(
            events.contains(&"post-import test_thing.web".to_string()),
            "{events:?}"
        );
    }

    #[tokio::test]
    async fn import_into_unconfigured_resource_fails() {
        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let mut config = test_config(Vec::new());
        config.root.imports.push(ImportBlock {
            to: Resource::managed("test_thing", "ghost").instance(None),
            id: "i-1".into(),
        });
        let (plan, diags) = ctx.plan(&config, &State::default(), &PlanOpts::default()).await;
        assert!(plan.is_none());
        assert!(diags.to_string().contains("Invalid import target"), "{diags}");
    }

    #[tokio::test]
    async fn apply_rejects_changed_variable_values() {
        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let config = test_config(vec![ResourceConfig::managed(
            "test_thing",
            "web",
            json!({"name": "web"}),
        )]);
        let mut vars = BTreeMap::new();
        vars.insert("env".to_string(), json!("prod"));
        let opts = PlanOpts {
            variables: vars.clone(),
            ..PlanOpts::default()
        };
        let plan = plan_ok(&ctx, &config, &State::default(), &opts).await;

        let mut changed = BTreeMap::new();
        changed.insert("env".to_string(), json!("dev"));
        let (_, diags) = ctx
            .apply(&config, &plan, &ApplyOpts { variables: changed })
            .await;
        assert!(
            diags.to_string().contains("Inconsistent variable value"),
            "{diags}"
        );

        // Matching values plus an extra ephemeral variable are fine.
        vars.insert("token".to_string(), json!("s3cret"));
        let (state, diags) = ctx
            .apply(&config, &plan, &ApplyOpts { variables: vars })
            .await;
        assert!(!diags.has_errors(), "{diags}");
        assert!(state.current_object(&root_instance("web")).is_some());
    }

    #[tokio::test]
    async fn data_sources_are_read_at_plan_and_apply() {
        let provider = Arc::new(MockProvider::new());
        provider.set_data_result("lookup", json!({"name": "lookup", "id": "d-1"}));
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let config = test_config(vec![ResourceConfig::data(
            "test_thing",
            "lookup",
            json!({"name": "lookup"}),
        )]);

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        let change = plan
            .changes
            .resources
            .iter()
            .find(|c| c.action == Action::Read)
            .expect("read change");
        assert_eq!(change.after, json!({"name": "lookup", "id": "d-1"}));

        let state = apply_ok(&ctx, &config, &plan).await;
        let addr = Resource::data("test_thing", "lookup")
            .absolute(ModulePath::root())
            .instance(None);
        assert!(state.current_object(&addr).is_some());
        // Read once while planning, once more while applying.
        assert_eq!(
            provider
                .calls()
                .iter()
                .filter(|c| *c == "read-data lookup")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn refresh_only_plan_records_no_changes() {
        let provider = Arc::new(MockProvider::new());
        provider.mark_gone("web");
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let config = test_config(vec![ResourceConfig::managed(
            "test_thing",
            "web",
            json!({"name": "web"}),
        )]);
        let state = state_with(&[("web", json!({"name": "web", "id": "i-1"}))]);

        let opts = PlanOpts {
            mode: PlanMode::RefreshOnly,
            ..PlanOpts::default()
        };
        let plan = plan_ok(&ctx, &config, &state, &opts).await;
        assert!(plan.changes.is_empty());
        // The refresh result is still visible in the updated prior state.
        assert!(plan.prior_state.current_object(&root_instance("web")).is_none());
    }

    #[tokio::test]
    async fn target_and_exclude_are_symmetric() {
        let config = test_config(vec![
            ResourceConfig::managed("test_thing", "a", json!({"name": "a"})),
            ResourceConfig::managed("test_thing", "b", json!({"name": "b"})),
        ]);
        let a = Resource::managed("test_thing", "a").absolute(ModulePath::root());
        let b = Resource::managed("test_thing", "b").absolute(ModulePath::root());

        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let opts = PlanOpts {
            targets: vec![Target::Resource(a.clone())],
            ..PlanOpts::default()
        };
        let (plan, diags) = ctx.plan(&config, &State::default(), &opts).await;
        assert!(!diags.has_errors(), "{diags}");
        assert!(
            diags.warnings().next().is_some(),
            "targeting must warn about incompleteness"
        );
        let targeted = apply_ok(&ctx, &config, &plan.expect("plan")).await;

        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let opts = PlanOpts {
            excludes: vec![Target::Resource(b)],
            ..PlanOpts::default()
        };
        let plan = plan_ok(&ctx, &config, &State::default(), &opts).await;
        let excluded = apply_ok(&ctx, &config, &plan).await;

        assert!(targeted.current_object(&root_instance("a")).is_some());
        assert!(targeted.current_object(&root_instance("b")).is_none());
        assert_eq!(targeted, excluded, "targeting a equals excluding b here");
    }

    #[tokio::test]
    async fn moves_outside_the_target_set_fail_the_plan() {
        let mut config = test_config(vec![
            ResourceConfig::managed("test_thing", "new", json!({"name": "new"})),
            ResourceConfig::managed("test_thing", "other", json!({"name": "other"})),
        ]);
        config.root.moved.push(MovedBlock {
            from: MoveEndpoint::Resource(Resource::managed("test_thing", "old")),
            to: MoveEndpoint::Resource(Resource::managed("test_thing", "new")),
        });
        let state = state_with(&[("old", json!({"name": "old", "id": "i-1"}))]);

        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let opts = PlanOpts {
            targets: vec![Target::Resource(
                Resource::managed("test_thing", "other").absolute(ModulePath::root()),
            )],
            ..PlanOpts::default()
        };
        let (plan, diags) = ctx.plan(&config, &state, &opts).await;
        assert!(plan.is_none());
        assert!(
            diags
                .to_string()
                .contains("Moved resource instances excluded by targeting"),
            "{diags}"
        );
        assert!(diags.to_string().contains("test_thing.new"), "{diags}");
    }

    #[tokio::test]
    async fn parallelism_bounds_concurrent_provider_calls() {
        let provider = Arc::new(MockProvider::new().with_delay(30));
        let ctx = context_with(provider.clone(), Vec::new(), 2);
        let resources = (0..6)
            .map(|i| {
                ResourceConfig::managed("test_thing", &format!("r{i}"), json!({"name": format!("r{i}")}))
            })
            .collect();
        let config = test_config(resources);

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        assert_eq!(plan.changes.resources.len(), 6);
        assert!(
            provider.max_active() <= 2,
            "at most 2 provider calls in flight, saw {}",
            provider.max_active()
        );
    }

    #[tokio::test]
    async fn depends_on_orders_apply() {
        let provider = Arc::new(MockProvider::new());
        let ctx = context_with(provider.clone(), Vec::new(), 0);
        let db = ResourceConfig::managed("test_thing", "db", json!({"name": "db"}));
        let mut web = ResourceConfig::managed("test_thing", "web", json!({"name": "web"}));
        web.depends_on
            .push(crate::addrs::Referenceable::Resource(Resource::managed(
                "test_thing",
                "db",
            )));
        let config = test_config(vec![web, db]);

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        let state = apply_ok(&ctx, &config, &plan).await;
        assert!(state.current_object(&root_instance("web")).is_some());

        let calls = provider.calls();
        let db_pos = calls.iter().position(|c| c == "create db");
        let web_pos = calls.iter().position(|c| c == "create web");
        assert!(
            db_pos.expect("db created") < web_pos.expect("web created"),
            "db must be created before its dependent: {calls:?}"
        );
    }

    #[tokio::test]
    async fn stop_drains_the_run_and_leaves_the_context_reusable() {
        let provider = Arc::new(MockProvider::new().with_delay(60));
        let hook = Arc::new(RecordingHook::new());
        let ctx = Arc::new(context_with(provider.clone(), vec![hook.clone()], 1));
        let resources = (0..4)
            .map(|i| {
                ResourceConfig::managed("test_thing", &format!("r{i}"), json!({"name": format!("r{i}")}))
            })
            .collect();
        let config = test_config(resources);

        let plan = plan_ok(&ctx, &config, &State::default(), &PlanOpts::default()).await;
        let apply_ctx = ctx.clone();
        let apply_config = config.clone();
        let task = tokio::spawn(async move {
            apply_ctx
                .apply(&apply_config, &plan, &ApplyOpts::default())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        ctx.stop().await;
        // Once stop has returned the walk has drained, so the task result
        // is available immediately.
        let (state, diags) = tokio::time::timeout(Duration::from_millis(50), task)
            .await
            .expect("stop must block until the walk has drained")
            .expect("apply task");
        assert!(!diags.has_errors(), "{diags}");
        assert!(provider.was_stopped());
        assert!(hook.take().contains(&"stopping".to_string()));
        // Not everything ran; the walk was interrupted partway.
        let created = state.all_instances().len();
        assert!(created < 4, "some vertices skipped, got {created}");

        // The context accepts a fresh run afterwards.
        let plan = plan_ok(&ctx, &config, &state, &PlanOpts::default()).await;
        assert!(!plan.changes.is_empty());
    }

    #[tokio::test]
    async fn validate_reports_unknown_provider_types() {
        let ctx = context_with(Arc::new(MockProvider::new()), Vec::new(), 0);
        let mut config = Config::empty();
        config.root.resources.push(ResourceConfig::managed(
            "other_thing",
            "web",
            json!({"name": "web"}),
        ));
        let diags = ctx.validate(&config).await;
        assert!(diags.has_errors());
        assert!(diags.to_string().contains("Missing required provider"), "{diags}");
    }
}
