//! The apply engine: replays the changes recorded in a plan through an
//! apply graph walk and produces the new state.

use super::exec::ExecVisitor;
use super::RunEnv;
use crate::config::Config;
use crate::diags::{Diagnostic, Diagnostics};
use crate::graph::transform::ApplyGraphBuilder;
use crate::graph::walk::{WalkOperation, Walker};
use crate::plan::{Plan, SyncChanges};
use crate::state::{State, SyncState};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Options for one apply run.
#[derive(Clone, Debug, Default)]
pub struct ApplyOpts {
    /// Variable values supplied at apply time. Values for variables the
    /// plan already recorded must match the planned values; additional
    /// entries are ephemeral values that were not persisted in the plan.
    pub variables: BTreeMap<String, Value>,
}

pub(crate) async fn apply(
    config: &Config,
    plan: &Plan,
    opts: &ApplyOpts,
    env: &RunEnv,
) -> (State, Diagnostics) {
    let mut diags = Diagnostics::new();

    if !plan.applyable() {
        diags.push(Diagnostic::error(
            "Cannot apply failed plan",
            "The given plan is incomplete due to errors during planning, and so it cannot be applied.",
        ));
        return (plan.prior_state.clone(), diags);
    }

    // A plan is only valid for the variable values it was created with;
    // changing one invalidates every decision the plan recorded.
    for (name, value) in &opts.variables {
        if let Some(planned) = plan.variables.get(name) {
            if planned != value {
                diags.push(Diagnostic::error(
                    "Inconsistent variable value",
                    format!(
                        "The value supplied for variable {name:?} differs from the value the plan was created with. Create a new plan to change variable values."
                    ),
                ));
            }
        }
    }
    if diags.has_errors() {
        return (plan.prior_state.clone(), diags);
    }

    let graph = match (ApplyGraphBuilder {
        config,
        changes: &plan.changes,
        state: &plan.prior_state,
    })
    .build()
    {
        Ok(g) => g,
        Err(d) => {
            diags.extend(d);
            return (plan.prior_state.clone(), diags);
        }
    };

    let working = SyncState::new(plan.prior_state.clone());
    let visitor = Arc::new(ExecVisitor {
        config: config.clone(),
        providers: env.providers.clone(),
        hooks: env.hooks.clone(),
        state: working.clone(),
        refreshed: None,
        changes: SyncChanges::new(),
        planned: plan.changes.clone(),
        skip_refresh: true,
        skip_plan_changes: false,
        force_replace: Vec::new(),
        imports: HashMap::new(),
        moved_from: HashMap::new(),
    });
    let walker = Walker {
        parallelism: env.parallelism,
        cancel: env.cancel.clone(),
    };
    diags.extend(walker.walk(&graph, WalkOperation::Apply, visitor).await);

    let mut new_state = working.snapshot();
    new_state.prune();
    debug!(errors = diags.has_errors(), "apply complete");
    (new_state, diags)
}
