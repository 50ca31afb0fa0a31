//! The plan and apply engines plus the per-vertex execution behaviors
//! they share.

pub mod apply;
pub mod exec;
pub mod plan;

pub use apply::ApplyOpts;
pub use plan::PlanOpts;

use crate::hooks::Hooks;
use crate::provider::ProviderCache;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-run environment handed down from the context: the shared provider
/// cache, hooks, the parallelism bound and the cancel signal.
pub(crate) struct RunEnv {
    pub providers: Arc<ProviderCache>,
    pub hooks: Hooks,
    pub parallelism: usize,
    pub cancel: watch::Receiver<bool>,
}
