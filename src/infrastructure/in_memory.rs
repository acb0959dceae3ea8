use crate::domain::flow::FlowRunResult;
use crate::domain::ports::RunStore;
use crate::domain::status::StatusRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct RunMap {
    next_generation: u64,
    results: HashMap<String, FlowRunResult>,
}

impl RunMap {
    fn current_mut(&mut self, flow: &str, generation: u64) -> Option<&mut FlowRunResult> {
        self.results
            .get_mut(flow)
            .filter(|result| result.generation == generation)
    }
}

/// A thread-safe in-memory store for flow run results.
///
/// Uses `Arc<RwLock<..>>` so dispatch tasks can insert their own flow's slot concurrently.
/// Cloning shares the underlying map.
#[derive(Default, Clone)]
pub struct InMemoryRunStore {
    runs: Arc<RwLock<RunMap>>,
}

impl InMemoryRunStore {
    /// Creates a new, empty run store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert(&self, mut result: FlowRunResult) -> FlowRunResult {
        let mut runs = self.runs.write().await;
        runs.next_generation += 1;
        result.generation = runs.next_generation;
        runs.results.insert(result.flow.clone(), result.clone());
        result
    }

    async fn get(&self, flow: &str) -> Option<FlowRunResult> {
        let runs = self.runs.read().await;
        runs.results.get(flow).cloned()
    }

    async fn cache_root_id(&self, flow: &str, generation: u64, root_id: &str) -> bool {
        if root_id.is_empty() {
            return false;
        }
        let mut runs = self.runs.write().await;
        match runs.current_mut(flow, generation) {
            Some(result) => {
                result.root_id = root_id.to_string();
                true
            }
            None => false,
        }
    }

    async fn cache_secondary_id(&self, flow: &str, generation: u64, secondary_id: &str) -> bool {
        if secondary_id.is_empty() {
            return false;
        }
        let mut runs = self.runs.write().await;
        match runs.current_mut(flow, generation) {
            Some(result) => {
                result.secondary_id = secondary_id.to_string();
                true
            }
            None => false,
        }
    }

    async fn set_status(&self, flow: &str, generation: u64, status: Option<StatusRecord>) -> bool {
        let mut runs = self.runs.write().await;
        match runs.current_mut(flow, generation) {
            Some(result) => {
                result.status = status;
                true
            }
            None => false,
        }
    }

    async fn flows(&self) -> Vec<String> {
        let runs = self.runs.read().await;
        let mut flows: Vec<String> = runs.results.keys().cloned().collect();
        flows.sort();
        flows
    }

    async fn clear(&self) {
        let mut runs = self.runs.write().await;
        runs.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::DispatchOutcome;
    use serde_json::json;

    fn dispatched(flow: &str) -> FlowRunResult {
        FlowRunResult::new(
            flow,
            DispatchOutcome::Response {
                status: 200,
                body: json!({}),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_replaces_previous_result() {
        let store = InMemoryRunStore::new();
        let first = store.insert(dispatched("a")).await;
        assert!(store.cache_root_id("a", first.generation, "R1").await);

        let second = store.insert(dispatched("a")).await;
        assert!(second.generation > first.generation);

        let current = store.get("a").await.unwrap();
        assert_eq!(current.root_id, "");
        assert_eq!(store.flows().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_generation_write_is_discarded() {
        let store = InMemoryRunStore::new();
        let first = store.insert(dispatched("a")).await;
        store.insert(dispatched("a")).await;

        assert!(!store.cache_root_id("a", first.generation, "OLD").await);
        assert!(!store.set_status("a", first.generation, Some(StatusRecord::default())).await);
        let current = store.get("a").await.unwrap();
        assert_eq!(current.root_id, "");
        assert!(current.status.is_none());
    }

    #[tokio::test]
    async fn test_empty_identifier_never_overwrites() {
        let store = InMemoryRunStore::new();
        let result = store.insert(dispatched("a")).await;
        store.cache_root_id("a", result.generation, "R1").await;
        assert!(!store.cache_root_id("a", result.generation, "").await);
        assert!(!store.cache_secondary_id("a", result.generation, "").await);
        assert_eq!(store.get("a").await.unwrap().root_id, "R1");
    }

    #[tokio::test]
    async fn test_concurrent_inserts_keep_every_flow() {
        let store = InMemoryRunStore::new();
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert(dispatched(&format!("flow_{i:02}"))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let flows = store.flows().await;
        assert_eq!(flows.len(), 50);
        assert_eq!(flows[0], "flow_00");

        store.clear().await;
        assert!(store.flows().await.is_empty());
    }
}
