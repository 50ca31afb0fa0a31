//! The plan model: the atomic [`Change`] unit, the aggregate [`Changes`]
//! set produced by a plan walk, and the outward [`Plan`] artifact the
//! apply engine replays.

use crate::addrs::{AbsResourceInstance, DeposedKey, ProviderConfig, Target};
use crate::refactoring::MoveResults;
use crate::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ─── Actions ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    NoOp,
    Create,
    Read,
    Update,
    /// Replace with destroy-before-create ordering (the default).
    DeleteThenCreate,
    /// Replace with create-before-destroy ordering; the displaced object
    /// is deposed and destroyed separately.
    CreateThenDelete,
    Delete,
    /// Remove from state without calling the provider's delete.
    Forget,
}

impl Action {
    pub fn is_replace(&self) -> bool {
        matches!(self, Action::DeleteThenCreate | Action::CreateThenDelete)
    }
}

/// Why a change carries the action it does, for UI explanation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionReason {
    #[default]
    None,
    ReplaceBecauseCannotUpdate,
    ReplaceBecauseTainted,
    ReplaceByRequest,
    DeleteBecauseNoResourceConfig,
    DeleteBecauseNoModule,
    ForgetBecauseRemoved,
}

// ─── Changes ──────────────────────────────────────────────────

/// The atomic unit of a plan: one action against one resource instance
/// object (the current object, or a deposed one when `deposed` is set).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstanceChange {
    pub addr: AbsResourceInstance,
    /// Where the object lived before move statements were applied.
    pub prev_run_addr: AbsResourceInstance,
    pub deposed: Option<DeposedKey>,
    pub provider: ProviderConfig,
    pub action: Action,
    pub reason: ActionReason,
    /// Value envelopes; `Value::Null` means "does not exist".
    pub before: Value,
    pub after: Value,
    /// Opaque provider-private data carried from plan to apply.
    pub private: Vec<u8>,
}

/// The ordered collection of planned changes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes {
    pub resources: Vec<ResourceInstanceChange>,
}

impl Changes {
    pub fn new() -> Self {
        Changes::default()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The change for an instance's current object, if any.
    pub fn change_for(&self, addr: &AbsResourceInstance) -> Option<&ResourceInstanceChange> {
        self.resources
            .iter()
            .find(|c| c.addr == *addr && c.deposed.is_none())
    }

    pub fn change_for_deposed(
        &self,
        addr: &AbsResourceInstance,
        key: &DeposedKey,
    ) -> Option<&ResourceInstanceChange> {
        self.resources
            .iter()
            .find(|c| c.addr == *addr && c.deposed.as_ref() == Some(key))
    }
}

/// Shared handle over the changes set during a walk.
#[derive(Clone, Debug, Default)]
pub struct SyncChanges {
    inner: Arc<Mutex<Changes>>,
}

impl SyncChanges {
    pub fn new() -> Self {
        SyncChanges::default()
    }

    pub fn append(&self, change: ResourceInstanceChange) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.resources.push(change);
    }

    pub fn snapshot(&self) -> Changes {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    pub fn close(self) -> Changes {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(arc) => arc.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }
}

// ─── Plan ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanMode {
    Normal,
    Destroy,
    RefreshOnly,
}

/// The plan artifact: immutable once returned, except that a failed plan
/// is marked `errored` (and thereby non-applyable).
#[derive(Clone, Debug)]
pub struct Plan {
    pub mode: PlanMode,
    pub changes: Changes,
    /// The caller's state exactly as given (post-move), before refresh.
    pub prev_run_state: State,
    /// The refreshed state planning diffed against.
    pub prior_state: State,
    /// The state as it would look after a successful apply.
    pub planned_state: State,
    /// Variable values the plan was built with.
    pub variables: BTreeMap<String, Value>,
    pub targets: Vec<Target>,
    pub excludes: Vec<Target>,
    pub move_results: MoveResults,
    pub timestamp: DateTime<Utc>,
    /// Set when planning hit error diagnostics; such a plan is returned
    /// for display purposes but must not be applied.
    pub errored: bool,
}

impl Plan {
    pub fn applyable(&self) -> bool {
        !self.errored
    }
}
