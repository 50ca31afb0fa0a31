//! A dependency-graph construction and execution engine for declarative
//! infrastructure: given a configuration, a prior state, and a set of
//! providers, it plans the changes needed to make the state match the
//! configuration and then applies them with bounded concurrency.
//!
//! The flow mirrors the usual plan/apply cycle:
//!
//! 1. Build a [`Context`] with provider factories and hooks.
//! 2. [`Context::plan`] walks a graph derived from configuration and
//!    state, refreshing tracked objects and recording one change per
//!    resource instance into a [`Plan`].
//! 3. [`Context::apply`] walks a second graph derived from the plan's
//!    changes and executes them, producing the new [`State`].
//!
//! Graph construction lives in [`graph`], where a transformer pipeline
//! turns configuration and state into typed vertices and dependency
//! edges, and a walker visits them concurrently in dependency order.

pub mod addrs;
pub mod config;
pub mod context;
pub mod diags;
pub mod engine;
pub mod graph;
pub mod hooks;
pub mod plan;
pub mod provider;
pub mod provider_mock;
pub mod refactoring;
pub mod state;

pub use context::{Context, ContextOpts, DEFAULT_PARALLELISM};
pub use diags::{Diagnostic, Diagnostics, Severity};
pub use engine::{ApplyOpts, PlanOpts};
pub use plan::{Action, Plan, PlanMode};
pub use state::State;
