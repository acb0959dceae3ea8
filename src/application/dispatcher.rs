use super::batch::Batch;
use super::registry::SharedRegistry;
use crate::domain::flow::{
    DispatchOutcome, END_TO_END_ID, FIRM_ROOT_ID, FlowRunResult, P3_ID, RunKind,
};
use crate::domain::ports::{GatewayRef, RunStoreRef};
use crate::domain::service::PAYMENT_SERVICE;
use crate::error::{Result, SmokeError};
use serde_json::Value;
use tracing::{error, info, warn};

pub const PARENT_FIRM_ROOT_ID: &str = "parentFirmRootId";
pub const PARENT_P3_ID: &str = "parentP3Id";

/// Everything a joined batch produced: one entry per submitted flow.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub results: Vec<FlowRunResult>,
    pub errors: Vec<(String, SmokeError)>,
}

impl BatchOutcome {
    fn collect(outcomes: Vec<(String, Result<FlowRunResult>)>) -> Self {
        let mut batch = Self::default();
        for (flow, outcome) in outcomes {
            match outcome {
                Ok(result) => batch.results.push(result),
                Err(e) => batch.errors.push((flow, e)),
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.results.len() + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// Submits flow payloads to the upload service and records the outcome in a run store.
#[derive(Clone)]
pub struct Dispatcher {
    gateway: GatewayRef,
    registry: SharedRegistry,
}

impl Dispatcher {
    pub fn new(gateway: GatewayRef, registry: SharedRegistry) -> Self {
        Self { gateway, registry }
    }

    /// Dispatches one leg of a flow, replacing the flow's previous result in `store`.
    ///
    /// A flow without a template is an error and nothing is sent; a failed or non-200
    /// upload is still a stored result.
    pub async fn dispatch(
        &self,
        flow: &str,
        kind: RunKind,
        store: &RunStoreRef,
    ) -> Result<FlowRunResult> {
        let body = self.registry.read().await.prepare(flow, kind);
        let body = body.inspect_err(|_| error!("[{flow}] not found."))?;
        Ok(self.submit(flow, body, store).await)
    }

    /// Dispatches the return leg of a flow, linked to its forward result.
    pub async fn dispatch_return(
        &self,
        flow: &str,
        parent: &FlowRunResult,
        store: &RunStoreRef,
    ) -> Result<FlowRunResult> {
        let mut body = self.registry.read().await.prepare(flow, RunKind::Return)?;
        if let Some(fields) = body.as_object_mut() {
            fields.insert(
                PARENT_FIRM_ROOT_ID.into(),
                parent.body_field(FIRM_ROOT_ID).into(),
            );
            fields.insert(PARENT_P3_ID.into(), parent.body_field(P3_ID).into());
            fields.insert(
                END_TO_END_ID.into(),
                parent.body_field(END_TO_END_ID).into(),
            );
        }
        let result = self.submit(flow, body, store).await;
        if result.is_success() {
            info!(
                "Return for [{flow}] linked to parent_firm_root_id = {}, parent_p3_id = {}",
                parent.body_field(FIRM_ROOT_ID),
                parent.body_field(P3_ID)
            );
        }
        Ok(result)
    }

    async fn submit(&self, flow: &str, body: Value, store: &RunStoreRef) -> FlowRunResult {
        let outcome = match self.gateway.upload(PAYMENT_SERVICE, &body).await {
            Ok(response) => DispatchOutcome::Response {
                status: response.status,
                body: response.body,
            },
            Err(e) => DispatchOutcome::Failed(e.to_string()),
        };
        let result = store.insert(FlowRunResult::new(flow, outcome)).await;
        match &result.outcome {
            DispatchOutcome::Response { status: 200, .. } => {
                info!("Request for [{flow}] was successful, id = {}", request_id(&result));
            }
            DispatchOutcome::Response { status, .. } => {
                warn!("Request for [{flow}] was unsuccessful, status = {status}");
            }
            DispatchOutcome::Failed(reason) => {
                warn!("Request for [{flow}] was unsuccessful: {reason}");
            }
        }
        result
    }

    /// Dispatches every flow concurrently and waits for all of them.
    pub async fn dispatch_batch(
        &self,
        flows: &[String],
        kind: RunKind,
        store: &RunStoreRef,
    ) -> BatchOutcome {
        let mut batch = Batch::new();
        for flow in flows {
            let dispatcher = self.clone();
            let store = store.clone();
            let name = flow.clone();
            batch.spawn(flow.clone(), async move {
                dispatcher.dispatch(&name, kind, &store).await
            });
        }
        BatchOutcome::collect(batch.join().await)
    }

    /// Dispatches the return leg of every forward result that has a return template.
    ///
    /// Forward results that never got a successful response are skipped.
    pub async fn dispatch_returns(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> BatchOutcome {
        let mut batch = Batch::new();
        for flow in forward.flows().await {
            if !self.registry.read().await.has_return(&flow) {
                continue;
            }
            let Some(parent) = forward.get(&flow).await else {
                continue;
            };
            if !parent.is_success() {
                warn!("Skipping return for [{flow}], forward request was unsuccessful");
                continue;
            }
            let dispatcher = self.clone();
            let store = returns.clone();
            let name = flow.clone();
            batch.spawn(flow, async move {
                dispatcher.dispatch_return(&name, &parent, &store).await
            });
        }
        BatchOutcome::collect(batch.join().await)
    }
}

/// The identifier logged for a successful upload: root id, or end-to-end id as fallback.
fn request_id(result: &FlowRunResult) -> &str {
    [FIRM_ROOT_ID, END_TO_END_ID]
        .into_iter()
        .map(|field| result.body_field(field))
        .find(|id| !id.is_empty())
        .unwrap_or("Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::{BUSINESS_LIVE, FlowRegistry};
    use crate::domain::ports::GatewayResponse;
    use crate::infrastructure::in_memory::InMemoryRunStore;
    use crate::infrastructure::scripted::ScriptedGateway;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn setup(gateway: ScriptedGateway) -> (Arc<ScriptedGateway>, Dispatcher, RunStoreRef) {
        let mut registry = FlowRegistry::new(BTreeSet::new(), BTreeSet::new());
        for flow in ["sgp_irct_dmct", "mys_irct_dmct", "au_book"] {
            registry.insert_forward(flow, json!({"amount": 100}).as_object().cloned().unwrap());
        }
        registry.insert_return("sgp_irct_dmct", json!({"amount": 100}).as_object().cloned().unwrap());
        let gateway = Arc::new(gateway);
        let dispatcher = Dispatcher::new(gateway.clone(), Arc::new(RwLock::new(registry)));
        (gateway, dispatcher, Arc::new(InMemoryRunStore::new()))
    }

    #[tokio::test]
    async fn test_dispatch_records_response() {
        let (gateway, dispatcher, store) = setup(ScriptedGateway::new());
        let result = dispatcher
            .dispatch("sgp_irct_dmct", RunKind::Forward, &store)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.body_field(FIRM_ROOT_ID), "FR000001");
        assert_eq!(gateway.uploads()[0][BUSINESS_LIVE], "Y");
        assert_eq!(store.get("sgp_irct_dmct").await.unwrap(), result);
    }

    #[tokio::test]
    async fn test_unknown_flow_is_a_no_op() {
        let (gateway, dispatcher, store) = setup(ScriptedGateway::new());
        let result = dispatcher.dispatch("missing", RunKind::Forward, &store).await;
        assert!(matches!(result, Err(SmokeError::UnknownFlow(_))));
        assert!(gateway.uploads().is_empty());
        assert!(store.flows().await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_keys_match_submitted_flows() {
        let gateway = ScriptedGateway::new()
            .with_upload_reply(GatewayResponse::new(500, json!({})))
            .with_upload_failure("connection refused");
        let (_, dispatcher, store) = setup(gateway);
        let flows: Vec<String> = ["sgp_irct_dmct", "mys_irct_dmct", "au_book"]
            .map(String::from)
            .to_vec();

        let outcome = dispatcher.dispatch_batch(&flows, RunKind::Forward, &store).await;

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.succeeded(), 1);
        let mut expected = flows.clone();
        expected.sort();
        assert_eq!(store.flows().await, expected);
    }

    #[tokio::test]
    async fn test_batch_with_unknown_flow_keeps_siblings() {
        let (_, dispatcher, store) = setup(ScriptedGateway::new());
        let flows = vec!["sgp_irct_dmct".to_string(), "missing".to_string()];

        let outcome = dispatcher.dispatch_batch(&flows, RunKind::Forward, &store).await;

        assert_eq!(outcome.len(), 2);
        assert_eq!(outcome.errors[0].0, "missing");
        assert_eq!(store.flows().await, vec!["sgp_irct_dmct".to_string()]);
    }

    #[tokio::test]
    async fn test_redispatch_replaces_previous_result() {
        let (_, dispatcher, store) = setup(ScriptedGateway::new());
        let first = dispatcher
            .dispatch("au_book", RunKind::Forward, &store)
            .await
            .unwrap();
        store.cache_root_id("au_book", first.generation, "CACHED").await;

        dispatcher
            .dispatch("au_book", RunKind::Forward, &store)
            .await
            .unwrap();

        let current = store.get("au_book").await.unwrap();
        assert_eq!(current.root_id, "");
        assert_eq!(current.body_field(FIRM_ROOT_ID), "FR000002");
    }

    #[tokio::test]
    async fn test_returns_link_parent_identifiers() {
        let (gateway, dispatcher, forward) = setup(ScriptedGateway::new());
        let returns: RunStoreRef = Arc::new(InMemoryRunStore::new());
        let flows = vec!["sgp_irct_dmct".to_string(), "au_book".to_string()];
        dispatcher.dispatch_batch(&flows, RunKind::Forward, &forward).await;

        let outcome = dispatcher.dispatch_returns(&forward, &returns).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(returns.flows().await, vec!["sgp_irct_dmct".to_string()]);
        let parent = forward.get("sgp_irct_dmct").await.unwrap();
        let body = gateway.uploads().last().cloned().unwrap();
        assert_eq!(body[PARENT_FIRM_ROOT_ID], parent.body_field(FIRM_ROOT_ID));
        assert_eq!(body[PARENT_P3_ID], parent.body_field(P3_ID));
        assert_eq!(body[END_TO_END_ID], parent.body_field(END_TO_END_ID));
    }

    #[tokio::test]
    async fn test_returns_skip_failed_forward() {
        let gateway = ScriptedGateway::new().with_upload_reply(GatewayResponse::new(400, json!({})));
        let (_, dispatcher, forward) = setup(gateway);
        let returns: RunStoreRef = Arc::new(InMemoryRunStore::new());
        dispatcher
            .dispatch("sgp_irct_dmct", RunKind::Forward, &forward)
            .await
            .unwrap();

        let outcome = dispatcher.dispatch_returns(&forward, &returns).await;
        assert!(outcome.is_empty());
        assert!(returns.flows().await.is_empty());
    }
}
