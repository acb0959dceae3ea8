use crate::domain::flow::{END_TO_END_ID, FIRM_ROOT_ID, P3_ID};
use crate::domain::ports::{GatewayRef, IdKind, RunStoreRef, SearchRegion};
use serde_json::Value;
use tracing::{debug, warn};

/// Resolves the root and secondary identifiers of dispatched flows.
///
/// Resolution prefers the identifier echoed in the upload response, then the value cached
/// on the run result, and only then queries the `TransactionDetail` search. Whatever a
/// search finds is cached, so each identifier is looked up at most once per dispatch.
/// An empty string means "not resolved yet".
#[derive(Clone)]
pub struct Correlator {
    gateway: GatewayRef,
}

impl Correlator {
    pub fn new(gateway: GatewayRef) -> Self {
        Self { gateway }
    }

    pub async fn resolve_root_id(&self, flow: &str, store: &RunStoreRef) -> String {
        let Some(result) = store.get(flow).await else {
            return String::new();
        };

        let embedded = result.body_field(FIRM_ROOT_ID);
        if !embedded.is_empty() {
            if result.root_id.is_empty() {
                store.cache_root_id(flow, result.generation, embedded).await;
            }
            return embedded.to_string();
        }
        if !result.root_id.is_empty() {
            return result.root_id;
        }

        let end_to_end_id = result.body_field(END_TO_END_ID);
        if end_to_end_id.is_empty() {
            return String::new();
        }
        match self
            .lookup(end_to_end_id, IdKind::EndToEndId, FIRM_ROOT_ID)
            .await
        {
            Some(root_id) => {
                store.cache_root_id(flow, result.generation, &root_id).await;
                root_id
            }
            None => String::new(),
        }
    }

    pub async fn resolve_secondary_id(&self, flow: &str, store: &RunStoreRef) -> String {
        let Some(result) = store.get(flow).await else {
            return String::new();
        };

        let embedded = result.body_field(P3_ID);
        if !embedded.is_empty() {
            if result.secondary_id.is_empty() {
                store
                    .cache_secondary_id(flow, result.generation, embedded)
                    .await;
            }
            return embedded.to_string();
        }
        if !result.secondary_id.is_empty() {
            return result.secondary_id;
        }

        let root_id = self.resolve_root_id(flow, store).await;
        if root_id.is_empty() {
            return String::new();
        }
        match self.lookup(&root_id, IdKind::FirmRootId, P3_ID).await {
            Some(secondary_id) => {
                store
                    .cache_secondary_id(flow, result.generation, &secondary_id)
                    .await;
                secondary_id
            }
            None => String::new(),
        }
    }

    /// Reads `field` from the first `TransactionDetail` record matching `id`.
    async fn lookup(&self, id: &str, kind: IdKind, field: &str) -> Option<String> {
        let response = match self
            .gateway
            .search(SearchRegion::TransactionDetail, id, kind)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Detail search for [{id}] failed: {e}");
                return None;
            }
        };
        if !response.is_ok() {
            debug!(status = response.status, "Detail search for [{id}] was unsuccessful");
            return None;
        }
        response
            .first_record()
            .and_then(|record| record.get(field))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::{DispatchOutcome, FlowRunResult};
    use crate::domain::ports::GatewayResponse;
    use crate::infrastructure::in_memory::InMemoryRunStore;
    use crate::infrastructure::scripted::ScriptedGateway;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup(
        gateway: ScriptedGateway,
        body: Value,
    ) -> (Arc<ScriptedGateway>, Correlator, RunStoreRef) {
        let gateway = Arc::new(gateway);
        let store: RunStoreRef = Arc::new(InMemoryRunStore::new());
        store
            .insert(FlowRunResult::new(
                "sgp_irct_dmct",
                DispatchOutcome::Response { status: 200, body },
            ))
            .await;
        (gateway.clone(), Correlator::new(gateway), store)
    }

    #[tokio::test]
    async fn test_embedded_identifiers_need_no_search() {
        let (gateway, correlator, store) = setup(
            ScriptedGateway::new(),
            json!({"firmRootId": "A1", "p3Id": "B1", "endToEndId": "E1"}),
        )
        .await;

        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "A1");
        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "B1");
        assert!(gateway.searches().is_empty());

        let cached = store.get("sgp_irct_dmct").await.unwrap();
        assert_eq!(cached.root_id, "A1");
        assert_eq!(cached.secondary_id, "B1");
    }

    #[tokio::test]
    async fn test_fallback_search_is_cached() {
        let (gateway, correlator, store) = setup(
            ScriptedGateway::new().with_detail("R123", "P123", "E1"),
            json!({"firmRootId": "", "p3Id": "", "endToEndId": "E1"}),
        )
        .await;

        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "R123");
        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "R123");

        let searches = gateway.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(
            searches[0],
            (SearchRegion::TransactionDetail, "E1".to_string(), IdKind::EndToEndId)
        );
    }

    #[tokio::test]
    async fn test_secondary_id_searches_by_root_id() {
        let (gateway, correlator, store) = setup(
            ScriptedGateway::new().with_detail("R123", "P123", "E1"),
            json!({"firmRootId": "R123", "endToEndId": "E1"}),
        )
        .await;

        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "P123");
        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "P123");

        let searches = gateway.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].1, "R123");
        assert_eq!(searches[0].2, IdKind::FirmRootId);
    }

    #[tokio::test]
    async fn test_unresolvable_yields_empty() {
        let (_, correlator, store) = setup(
            ScriptedGateway::new(),
            json!({"firmRootId": "", "p3Id": "", "endToEndId": "E404"}),
        )
        .await;

        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "");
        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "");
        assert_eq!(correlator.resolve_root_id("never_dispatched", &store).await, "");
    }

    async fn assert_root_retried(gateway: ScriptedGateway) {
        let (gateway, correlator, store) = setup(
            gateway.with_detail("R123", "P123", "E1"),
            json!({"endToEndId": "E1"}),
        )
        .await;

        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "");
        assert_eq!(store.get("sgp_irct_dmct").await.unwrap().root_id, "");

        assert_eq!(correlator.resolve_root_id("sgp_irct_dmct", &store).await, "R123");
        assert_eq!(store.get("sgp_irct_dmct").await.unwrap().root_id, "R123");
        assert_eq!(gateway.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_unsuccessful_search_is_unresolved_and_not_cached() {
        assert_root_retried(
            ScriptedGateway::new().with_search_reply(GatewayResponse::new(404, json!([]))),
        )
        .await;
    }

    #[tokio::test]
    async fn test_failed_search_is_unresolved_and_not_cached() {
        assert_root_retried(ScriptedGateway::new().with_search_failure("connection reset")).await;
    }

    #[tokio::test]
    async fn test_blank_root_in_search_record_is_not_cached() {
        assert_root_retried(ScriptedGateway::new().with_search_reply(GatewayResponse::new(
            200,
            json!([{"firmRootId": "", "p3Id": "P123"}]),
        )))
        .await;
    }

    #[tokio::test]
    async fn test_missing_secondary_in_search_record_is_not_cached() {
        let (gateway, correlator, store) = setup(
            ScriptedGateway::new()
                .with_detail("R123", "P123", "E1")
                .with_search_reply(GatewayResponse::new(200, json!([{"firmRootId": "R123"}]))),
            json!({"firmRootId": "R123"}),
        )
        .await;

        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "");
        assert_eq!(store.get("sgp_irct_dmct").await.unwrap().secondary_id, "");

        assert_eq!(correlator.resolve_secondary_id("sgp_irct_dmct", &store).await, "P123");
        assert_eq!(store.get("sgp_irct_dmct").await.unwrap().secondary_id, "P123");
        assert_eq!(gateway.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_unresolved_without_search() {
        let gateway = Arc::new(ScriptedGateway::new());
        let store: RunStoreRef = Arc::new(InMemoryRunStore::new());
        store
            .insert(FlowRunResult::new(
                "x",
                DispatchOutcome::Failed("timeout".to_string()),
            ))
            .await;
        let correlator = Correlator::new(gateway.clone());

        assert_eq!(correlator.resolve_root_id("x", &store).await, "");
        assert!(gateway.searches().is_empty());
    }
}
