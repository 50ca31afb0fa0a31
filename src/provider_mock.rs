//! An in-memory [`Provider`] implementation for tests and examples,
//! analogous to a real plugin but with scriptable behavior: simulated
//! latency, per-object failures, externally-deleted objects, and a call
//! trace for asserting execution order and concurrency bounds.

use crate::diags::{Diagnostic, Diagnostics};
use crate::provider::{
    ApplyChangeRequest, ApplyChangeResponse, ImportRequest, ImportResponse, PlanChangeRequest,
    PlanChangeResponse, Provider, ProviderError, ReadDataSourceRequest, ReadDataSourceResponse,
    ReadResourceRequest, ReadResourceResponse,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockProvider {
    /// Simulated per-call latency, for exercising the parallelism bound.
    delay_ms: u64,
    /// Markers (the object's `name` attribute) whose apply should fail.
    fail_apply: Mutex<HashSet<String>>,
    /// Markers whose refresh reports the object gone from the real world.
    gone: Mutex<HashSet<String>>,
    /// Scripted data source results keyed by the config `name` attribute.
    data_results: Mutex<HashMap<String, Value>>,
    /// Scripted import results keyed by import id.
    import_results: Mutex<HashMap<String, Value>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    stopped: AtomicBool,
    configured: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider::default()
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Make applies fail for objects whose `name` attribute matches.
    pub fn fail_apply_for(&self, marker: &str) {
        self.fail_apply
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(marker.to_string());
    }

    /// Report the object with the given `name` attribute as deleted
    /// outside the tool on the next refresh.
    pub fn mark_gone(&self, marker: &str) {
        self.gone
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(marker.to_string());
    }

    pub fn set_data_result(&self, marker: &str, value: Value) {
        self.data_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(marker.to_string(), value);
    }

    pub fn set_import_result(&self, id: &str, value: Value) {
        self.import_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), value);
    }

    /// The ordered trace of calls, rendered as `"op marker"` entries.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Highest number of provider calls that were ever in flight at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn marker(value: &Value) -> String {
        value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string()
    }

    fn record(&self, op: &str, marker: &str) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{op} {marker}"));
    }

    /// Track concurrency and simulate latency, returning early when the
    /// provider has been asked to stop.
    async fn working(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if self.delay_ms > 0 {
            let mut waited = 0;
            while waited < self.delay_ms && !self.stopped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
                waited += 5;
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn configure(&self, _config: Value) -> Diagnostics {
        self.configured.store(true, Ordering::SeqCst);
        self.record("configure", "-");
        Diagnostics::new()
    }

    async fn plan_resource_change(&self, req: PlanChangeRequest) -> PlanChangeResponse {
        self.working().await;
        let marker = Self::marker(&req.proposed);
        self.record("plan", &marker);
        if req.proposed.is_null() {
            return PlanChangeResponse {
                planned: Value::Null,
                ..PlanChangeResponse::default()
            };
        }
        // An explicit `replace_me` attribute change forces replacement,
        // standing in for a real provider's ForceNew schema flags.
        let requires_replace = !req.prior.is_null()
            && req.prior.get("replace_me") != req.proposed.get("replace_me")
            && req.proposed.get("replace_me").is_some();
        // Computed attributes: carry forward the prior id when updating
        // in place. A replacement gets a fresh id at apply time.
        let mut planned = req.proposed.clone();
        if !requires_replace {
            if let (Some(obj), Some(id)) = (
                planned.as_object_mut(),
                req.prior.get("id").and_then(Value::as_str),
            ) {
                obj.insert("id".to_string(), json!(id));
            }
        }
        PlanChangeResponse {
            planned,
            requires_replace,
            private: req.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn apply_resource_change(&self, req: ApplyChangeRequest) -> ApplyChangeResponse {
        self.working().await;
        if req.planned.is_null() {
            let marker = Self::marker(&req.prior);
            self.record("destroy", &marker);
            return ApplyChangeResponse::default();
        }
        let marker = Self::marker(&req.planned);
        let failing = self
            .fail_apply
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&marker);
        if failing {
            self.record("apply-fail", &marker);
            return ApplyChangeResponse {
                new_value: req.prior,
                private: req.private,
                diagnostics: Diagnostic::error(
                    "Provider refused the change",
                    format!("The provider reported an error while applying {marker:?}."),
                )
                .into(),
            };
        }
        self.record(if req.prior.is_null() { "create" } else { "update" }, &marker);
        let mut new_value = req.planned.clone();
        if let Some(obj) = new_value.as_object_mut() {
            if !obj.contains_key("id") {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                obj.insert("id".to_string(), json!(format!("i-{id}")));
            }
        }
        ApplyChangeResponse {
            new_value,
            private: req.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn read_resource(&self, req: ReadResourceRequest) -> ReadResourceResponse {
        self.working().await;
        let marker = Self::marker(&req.prior);
        self.record("read", &marker);
        let gone = self
            .gone
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&marker);
        ReadResourceResponse {
            new_value: if gone { Value::Null } else { req.prior },
            private: req.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn read_data_source(&self, req: ReadDataSourceRequest) -> ReadDataSourceResponse {
        self.working().await;
        let marker = Self::marker(&req.config);
        self.record("read-data", &marker);
        let scripted = self
            .data_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&marker)
            .cloned();
        ReadDataSourceResponse {
            value: scripted.unwrap_or(req.config),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn import_resource_state(&self, req: ImportRequest) -> ImportResponse {
        self.working().await;
        self.record("import", &req.id);
        let scripted = self
            .import_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&req.id)
            .cloned();
        match scripted {
            Some(value) => ImportResponse {
                value,
                diagnostics: Diagnostics::new(),
            },
            None => ImportResponse {
                value: Value::Null,
                diagnostics: Diagnostic::error(
                    "Cannot import non-existent remote object",
                    format!("The provider has no object with id {:?} to import.", req.id),
                )
                .into(),
            },
        }
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.stopped.store(true, Ordering::SeqCst);
        self.record("stop", "-");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_assigns_id_on_create() {
        let p = MockProvider::new();
        let resp = p
            .apply_resource_change(ApplyChangeRequest {
                type_name: "test_thing".into(),
                prior: Value::Null,
                planned: json!({"name": "web"}),
                private: Vec::new(),
            })
            .await;
        assert!(!resp.diagnostics.has_errors());
        assert!(resp.new_value.get("id").is_some());
        assert_eq!(p.calls(), vec!["create web"]);
    }

    #[tokio::test]
    async fn read_reports_gone_objects_as_null() {
        let p = MockProvider::new();
        p.mark_gone("web");
        let resp = p
            .read_resource(ReadResourceRequest {
                type_name: "test_thing".into(),
                prior: json!({"name": "web", "id": "i-0"}),
                private: Vec::new(),
            })
            .await;
        assert!(resp.new_value.is_null());
    }

    #[tokio::test]
    async fn plan_flags_replacement() {
        let p = MockProvider::new();
        let resp = p
            .plan_resource_change(PlanChangeRequest {
                type_name: "test_thing".into(),
                prior: json!({"name": "web", "replace_me": "a"}),
                proposed: json!({"name": "web", "replace_me": "b"}),
                private: Vec::new(),
            })
            .await;
        assert!(resp.requires_replace);
    }
}
