//! Progress-reporting hooks. Hook notifications are fire-and-forget:
//! nothing a hook does can fail the walk, so the methods return nothing.

use crate::addrs::{AbsResourceInstance, DeposedKey};
use crate::plan::Action;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[async_trait]
pub trait Hook: Send + Sync {
    async fn pre_apply(
        &self,
        _addr: &AbsResourceInstance,
        _deposed: Option<&DeposedKey>,
        _action: Action,
        _before: &Value,
        _after: &Value,
    ) {
    }

    async fn post_apply(
        &self,
        _addr: &AbsResourceInstance,
        _deposed: Option<&DeposedKey>,
        _new_value: &Value,
        _error: Option<&str>,
    ) {
    }

    async fn pre_refresh(&self, _addr: &AbsResourceInstance, _prior: &Value) {}

    async fn post_refresh(&self, _addr: &AbsResourceInstance, _new_value: &Value) {}

    async fn pre_import(&self, _addr: &AbsResourceInstance, _id: &str) {}

    async fn post_import(&self, _addr: &AbsResourceInstance, _value: &Value) {}

    /// The run is being interrupted; flush anything worth flushing
    /// before a possible hard kill.
    async fn stopping(&self) {}
}

pub type Hooks = Vec<Arc<dyn Hook>>;

#[cfg(test)]
pub(crate) mod recording {
    //! A hook that records its notifications, for tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingHook {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingHook {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn take(&self) -> Vec<String> {
            self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        fn record(&self, event: String) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        }
    }

    #[async_trait]
    impl Hook for RecordingHook {
        async fn pre_apply(
            &self,
            addr: &AbsResourceInstance,
            deposed: Option<&DeposedKey>,
            action: Action,
            _before: &Value,
            _after: &Value,
        ) {
            match deposed {
                Some(key) => self.record(format!("pre-apply {addr} (deposed {key}) {action:?}")),
                None => self.record(format!("pre-apply {addr} {action:?}")),
            }
        }

        async fn post_apply(
            &self,
            addr: &AbsResourceInstance,
            _deposed: Option<&DeposedKey>,
            _new_value: &Value,
            error: Option<&str>,
        ) {
            match error {
                Some(_) => self.record(format!("post-apply {addr} (failed)")),
                None => self.record(format!("post-apply {addr}")),
            }
        }

        async fn pre_import(&self, addr: &AbsResourceInstance, id: &str) {
            self.record(format!("pre-import {addr} {id}"));
        }

        async fn post_import(&self, addr: &AbsResourceInstance, _value: &Value) {
            self.record(format!("post-import {addr}"));
        }

        async fn stopping(&self) {
            self.record("stopping".to_string());
        }
    }
}
