//! The plan engine: validates the requested mode, resolves move and
//! remove statements against the prior state, builds and walks the plan
//! graph, and assembles the outward [`Plan`] artifact.

use super::exec::ExecVisitor;
use super::RunEnv;
use crate::addrs::{AbsResourceInstance, ModulePath, Target};
use crate::config::Config;
use crate::diags::{Diagnostic, Diagnostics};
use crate::graph::transform::PlanGraphBuilder;
use crate::graph::walk::{WalkOperation, Walker};
use crate::plan::{Changes, Plan, PlanMode, SyncChanges};
use crate::refactoring::{
    apply_moves, find_move_statements, find_remove_statements, implied_move_statements,
    MoveResults, RemoveStatement,
};
use crate::state::{State, SyncState};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Options for one planning run.
#[derive(Clone, Debug)]
pub struct PlanOpts {
    pub mode: PlanMode,
    /// Variable values the configuration was evaluated with, recorded in
    /// the plan for later inspection.
    pub variables: BTreeMap<String, Value>,
    pub targets: Vec<Target>,
    pub excludes: Vec<Target>,
    /// Instances to replace even when an in-place update would do.
    /// Normal mode only.
    pub force_replace: Vec<AbsResourceInstance>,
    pub skip_refresh: bool,
}

impl Default for PlanOpts {
    fn default() -> Self {
        PlanOpts {
            mode: PlanMode::Normal,
            variables: BTreeMap::new(),
            targets: Vec::new(),
            excludes: Vec::new(),
            force_replace: Vec::new(),
            skip_refresh: false,
        }
    }
}

pub(crate) async fn plan(
    config: &Config,
    prior_state: &State,
    opts: &PlanOpts,
    env: &RunEnv,
) -> (Option<Plan>, Diagnostics) {
    let mut diags = Diagnostics::new();

    if let Err(d) = validate_opts(opts) {
        diags.extend(d);
        return (None, diags);
    }

    // Missing providers abort before any graph exists; everything
    // downstream would just be noise.
    for type_name in config.required_provider_types() {
        if !env.providers.has_type(&type_name) {
            diags.push(Diagnostic::error(
                "Missing required provider",
                format!(
                    "This configuration requires provider {type_name:?}, but no factory for it was registered with the context."
                ),
            ));
        }
    }
    if diags.has_errors() {
        return (None, diags);
    }

    if !opts.targets.is_empty() || !opts.excludes.is_empty() {
        diags.push(Diagnostic::warning(
            "Resource targeting is in effect",
            "You are creating a plan that covers only a subset of the configuration, so the result may be incomplete or inconsistent. Use targeting only to recover from unusual situations.",
        ));
    }

    // Moves apply to the prior state before anything else, so targeting
    // and diffing both operate on post-move addresses.
    let mut prev_run_state = prior_state.clone();
    let mut statements = find_move_statements(config);
    statements.extend(implied_move_statements(config, &prev_run_state, &statements));
    let move_results = apply_moves(&statements, &mut prev_run_state);
    if !move_results.blocked.is_empty() {
        let mut lines: Vec<String> = move_results
            .blocked
            .iter()
            .map(|b| format!("  - {} could not move to {}", b.actual, b.wanted))
            .collect();
        lines.sort();
        diags.push(Diagnostic::warning(
            "Unresolved resource instance address changes",
            format!(
                "The following moves were blocked because an object already exists at the destination address:\n{}",
                lines.join("\n")
            ),
        ));
    }
    if let Err(d) = check_moves_against_filters(&move_results, &opts.targets, &opts.excludes) {
        diags.extend(d);
        return (None, diags);
    }

    let (removes, remove_diags) = find_remove_statements(config);
    diags.extend(remove_diags);
    if diags.has_errors() {
        return (None, diags);
    }

    let mut imports: HashMap<AbsResourceInstance, String> = HashMap::new();
    for block in &config.root.imports {
        if config.root.resource(&block.to.resource).is_none() {
            diags.push(
                Diagnostic::error(
                    "Invalid import target",
                    format!(
                        "The import block for id {:?} refers to {}, which is not declared in the configuration.",
                        block.id, block.to
                    ),
                )
                .with_address(&block.to),
            );
            continue;
        }
        imports.insert(
            AbsResourceInstance {
                module: ModulePath::root(),
                resource: block.to.clone(),
            },
            block.id.clone(),
        );
    }
    if diags.has_errors() {
        return (None, diags);
    }

    let moved_from: HashMap<AbsResourceInstance, AbsResourceInstance> = move_results
        .changes
        .iter()
        .map(|(to, r)| (to.clone(), r.from.clone()))
        .collect();

    // A destroy plan first refreshes through an implicit normal-mode
    // sub-plan, so objects already gone upstream are not planned for
    // destruction.
    let mut base_state = prev_run_state.clone();
    if opts.mode == PlanMode::Destroy && !opts.skip_refresh && !base_state.is_empty() {
        debug!("running pre-destroy refresh");
        match walk_plan(
            config,
            &base_state,
            PlanMode::Normal,
            true,
            opts,
            env,
            &removes,
            &imports,
            &moved_from,
        )
        .await
        {
            Ok((refreshed, _, _, d)) => {
                diags.extend(d);
                base_state = refreshed;
            }
            Err(d) => {
                diags.extend(d);
                return (None, diags);
            }
        }
    }

    let skip_plan_changes = opts.mode == PlanMode::RefreshOnly;
    let (prior, planned, changes, walk_diags) = match walk_plan(
        config,
        &base_state,
        opts.mode,
        skip_plan_changes,
        opts,
        env,
        &removes,
        &imports,
        &moved_from,
    )
    .await
    {
        Ok(out) => out,
        Err(d) => {
            diags.extend(d);
            return (None, diags);
        }
    };
    diags.extend(walk_diags);

    if opts.mode == PlanMode::RefreshOnly && !changes.is_empty() {
        diags.push(Diagnostic::error(
            "Invalid refresh-only plan",
            "A refresh-only plan produced resource changes. This is a bug in the plan engine; please report it.",
        ));
    }

    let plan = Plan {
        mode: opts.mode,
        changes,
        prev_run_state,
        prior_state: prior,
        planned_state: planned,
        variables: opts.variables.clone(),
        targets: opts.targets.clone(),
        excludes: opts.excludes.clone(),
        move_results,
        timestamp: Utc::now(),
        errored: diags.has_errors(),
    };
    debug!(
        changes = plan.changes.resources.len(),
        errored = plan.errored,
        "plan complete"
    );
    (Some(plan), diags)
}

/// Build and walk one plan graph, returning the refreshed prior state,
/// the planned state, and the recorded changes.
#[allow(clippy::too_many_arguments)]
async fn walk_plan(
    config: &Config,
    base: &State,
    mode: PlanMode,
    skip_plan_changes: bool,
    opts: &PlanOpts,
    env: &RunEnv,
    removes: &[RemoveStatement],
    imports: &HashMap<AbsResourceInstance, String>,
    moved_from: &HashMap<AbsResourceInstance, AbsResourceInstance>,
) -> Result<(State, State, Changes, Diagnostics), Diagnostics> {
    let graph = PlanGraphBuilder {
        config,
        state: base,
        mode,
        targets: &opts.targets,
        excludes: &opts.excludes,
        removes,
    }
    .build()?;

    let refreshed = SyncState::new(base.clone());
    let working = SyncState::new(base.clone());
    let changes = SyncChanges::new();
    let visitor = Arc::new(ExecVisitor {
        config: config.clone(),
        providers: env.providers.clone(),
        hooks: env.hooks.clone(),
        state: working.clone(),
        refreshed: Some(refreshed.clone()),
        changes: changes.clone(),
        planned: Changes::new(),
        skip_refresh: opts.skip_refresh,
        skip_plan_changes,
        force_replace: opts.force_replace.clone(),
        imports: imports.clone(),
        moved_from: moved_from.clone(),
    });
    let walker = Walker {
        parallelism: env.parallelism,
        cancel: env.cancel.clone(),
    };
    let operation = if mode == PlanMode::Destroy {
        WalkOperation::PlanDestroy
    } else {
        WalkOperation::Plan
    };
    let walk_diags = walker.walk(&graph, operation, visitor).await;

    let mut prior = refreshed.snapshot();
    prior.prune();
    let mut planned = working.snapshot();
    planned.prune();
    Ok((prior, planned, changes.close(), walk_diags))
}

fn validate_opts(opts: &PlanOpts) -> Result<(), Diagnostics> {
    let mut diags = Diagnostics::new();
    if opts.mode == PlanMode::RefreshOnly && opts.skip_refresh {
        diags.push(Diagnostic::error(
            "Incompatible plan options",
            "Cannot skip refreshing in refresh-only mode, because refreshing is the only action in that mode.",
        ));
    }
    if opts.mode != PlanMode::Normal && !opts.force_replace.is_empty() {
        diags.push(Diagnostic::error(
            "Unsupported plan mode",
            "Forcing resource instance replacement is allowed only in normal planning mode.",
        ));
    }
    if !opts.targets.is_empty() && !opts.excludes.is_empty() {
        diags.push(Diagnostic::error(
            "Incompatible plan options",
            "The target and exclude options may not be used together.",
        ));
    }
    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(())
    }
}

/// Partial visibility into a move can leave state inconsistent, so a
/// move whose source or destination falls outside the visible set fails
/// the plan outright.
fn check_moves_against_filters(
    results: &MoveResults,
    targets: &[Target],
    excludes: &[Target],
) -> Result<(), Diagnostics> {
    if targets.is_empty() && excludes.is_empty() {
        return Ok(());
    }
    let visible = |addr: &AbsResourceInstance| -> bool {
        if !targets.is_empty() {
            targets.iter().any(|t| t.contains_instance(addr))
        } else {
            !excludes.iter().any(|t| t.contains_instance(addr))
        }
    };
    let mut missing: Vec<String> = Vec::new();
    for (to, result) in &results.changes {
        if !visible(&result.from) {
            missing.push(result.from.to_string());
        }
        if !visible(to) {
            missing.push(to.to_string());
        }
    }
    missing.sort();
    missing.dedup();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Diagnostic::error(
        "Moved resource instances excluded by targeting",
        format!(
            "Resource instances in your current state have moved to new addresses in the latest configuration, and the given targets or excludes do not cover all of them:\n  - {}\n\nEither disable targeting or include the addresses above.",
            missing.join("\n  - ")
        ),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Resource;
    use crate::refactoring::MoveResult;

    #[test]
    fn refresh_only_cannot_skip_refresh() {
        let opts = PlanOpts {
            mode: PlanMode::RefreshOnly,
            skip_refresh: true,
            ..PlanOpts::default()
        };
        assert!(validate_opts(&opts).is_err());
    }

    #[test]
    fn force_replace_requires_normal_mode() {
        let opts = PlanOpts {
            mode: PlanMode::Destroy,
            force_replace: vec![Resource::managed("test_thing", "web")
                .absolute(ModulePath::root())
                .instance(None)],
            ..PlanOpts::default()
        };
        assert!(validate_opts(&opts).is_err());
    }

    #[test]
    fn targets_and_excludes_are_mutually_exclusive() {
        let addr = Resource::managed("test_thing", "web").absolute(ModulePath::root());
        let opts = PlanOpts {
            targets: vec![Target::Resource(addr.clone())],
            excludes: vec![Target::Resource(addr)],
            ..PlanOpts::default()
        };
        assert!(validate_opts(&opts).is_err());
    }

    #[test]
    fn move_outside_target_set_is_rejected() {
        let from = Resource::managed("test_thing", "old")
            .absolute(ModulePath::root())
            .instance(None);
        let to = Resource::managed("test_thing", "new")
            .absolute(ModulePath::root())
            .instance(None);
        let mut results = MoveResults::default();
        results.changes.insert(
            to.clone(),
            MoveResult {
                from: from.clone(),
                to: to.clone(),
            },
        );

        // Source targeted, destination not.
        let targets = vec![Target::Resource(from.containing_resource())];
        let err = check_moves_against_filters(&results, &targets, &[])
            .expect_err("destination outside target set");
        let rendered = err.to_string();
        assert!(
            rendered.contains("Moved resource instances excluded by targeting"),
            "{rendered}"
        );
        assert!(rendered.contains("test_thing.new"), "{rendered}");

        // Both covered: fine.
        let both = vec![
            Target::Resource(from.containing_resource()),
            Target::Resource(to.containing_resource()),
        ];
        assert!(check_moves_against_filters(&results, &both, &[]).is_ok());
    }
}
