use super::batch::Batch;
use super::correlator::Correlator;
use super::registry::{FlowRegistry, SharedRegistry};
use crate::config::MockServiceConfig;
use crate::domain::flow::{FIRM_ROOT_ID, RunKind};
use crate::domain::ports::{GatewayRef, RunStoreRef};
use crate::domain::service::{
    BOOK_FUNDS_ACK, BOOK_POSTING_ACK, CLEARING, CLEARING_ACK, ClearingSystem, Direction,
    FUND_CONTROL, POSTING, SANCTIONS, SANCTIONS_PASSED, SANCTIONS_REJECTED,
};
use crate::error::{Result, SmokeError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const CLEARING_SYSTEM: &str = "clearingSystem";

/// What happened to one mocked response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Accepted { root_id: String },
    Rejected { root_id: String, status: u16 },
    Failed { root_id: String, reason: String },
    /// The flow's root identifier could not be resolved; nothing was sent.
    LookupFailed,
    /// The flow has no result in the run map; nothing was sent.
    NotDispatched,
}

impl MockOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// One entry per mocked flow leg; return legs are named `<flow> (return)`.
pub type MockReport = Vec<(String, Result<MockOutcome>)>;

struct Assignment {
    flow: String,
    kind: RunKind,
    value: String,
    store: RunStoreRef,
}

/// Posts simulated downstream responses for dispatched flows.
#[derive(Clone)]
pub struct MockController {
    gateway: GatewayRef,
    correlator: Correlator,
    registry: SharedRegistry,
    services: Arc<BTreeMap<String, MockServiceConfig>>,
}

impl MockController {
    pub fn new(
        gateway: GatewayRef,
        correlator: Correlator,
        registry: SharedRegistry,
        services: BTreeMap<String, MockServiceConfig>,
    ) -> Self {
        Self {
            gateway,
            correlator,
            registry,
            services: Arc::new(services),
        }
    }

    fn service(&self, service: &str) -> Result<&MockServiceConfig> {
        self.services
            .get(service)
            .ok_or_else(|| SmokeError::UnknownService(service.to_string()))
    }

    /// Sends `value` as the `service` response for the flow's transaction.
    pub async fn mock_response(
        &self,
        service: &str,
        flow: &str,
        value: &str,
        store: &RunStoreRef,
    ) -> Result<MockOutcome> {
        let key = self.service(service)?.key.clone();
        if store.get(flow).await.is_none() {
            error!("[{flow}] not found");
            return Ok(MockOutcome::NotDispatched);
        }
        let root_id = self.correlator.resolve_root_id(flow, store).await;
        if root_id.is_empty() {
            warn!("Mocking {service} for [{flow}] skipped, firmRootId could not be resolved");
            return Ok(MockOutcome::LookupFailed);
        }

        let mut entry = Map::new();
        entry.insert(FIRM_ROOT_ID.into(), root_id.clone().into());
        entry.insert(key, value.into());
        entry.insert(
            CLEARING_SYSTEM.into(),
            ClearingSystem::for_flow(flow).as_str().into(),
        );
        let payload = Value::Array(vec![Value::Object(entry)]);

        let shown = value.to_uppercase();
        Ok(match self.gateway.mock(service, &payload).await {
            Ok(response) if response.is_ok() => {
                info!(
                    "Mocking {service} with {shown} for [{flow}] was successful, firmRootId = {root_id}"
                );
                MockOutcome::Accepted { root_id }
            }
            Ok(response) => {
                warn!(
                    "Mocking {service} with {shown} for [{flow}] failed, firmRootId = {root_id}, status = {}",
                    response.status
                );
                MockOutcome::Rejected {
                    root_id,
                    status: response.status,
                }
            }
            Err(e) => {
                warn!("Mocking {service} with {shown} for [{flow}] failed: {e}");
                MockOutcome::Failed {
                    root_id,
                    reason: e.to_string(),
                }
            }
        })
    }

    /// Operator-driven mock of selected flows; `value` must be one of the service's
    /// configured values.
    pub async fn mock_flows(
        &self,
        service: &str,
        value: &str,
        flows: &[String],
        store: &RunStoreRef,
    ) -> Result<MockReport> {
        let config = self.service(service)?;
        if !config.values.is_empty() && !config.values.iter().any(|allowed| allowed == value) {
            return Err(SmokeError::InvalidMockValue {
                service: service.to_string(),
                value: value.to_string(),
            });
        }
        let assignments = flows
            .iter()
            .map(|flow| Assignment {
                flow: flow.clone(),
                kind: RunKind::Forward,
                value: value.to_string(),
                store: store.clone(),
            })
            .collect();
        Ok(self.run(service, assignments).await)
    }

    /// Sanctions: `FAILED_REJECT` for flows in the reject set, `PASSED` otherwise.
    pub async fn mock_sanctions(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(SANCTIONS, forward, returns, |registry, flow, _| {
            let value = if registry.is_sanctions_reject(flow) {
                SANCTIONS_REJECTED
            } else {
                SANCTIONS_PASSED
            };
            Some(value.to_string())
        })
        .await
    }

    pub async fn mock_funds(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(FUND_CONTROL, forward, returns, |registry, flow, kind| {
            Some(Direction::of(registry.is_debit(flow), kind).funds_mock().to_string())
        })
        .await
    }

    pub async fn mock_posting(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(POSTING, forward, returns, |registry, flow, kind| {
            Some(Direction::of(registry.is_debit(flow), kind).posting_mock().to_string())
        })
        .await
    }

    pub async fn mock_clearing(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(CLEARING, forward, returns, |_, _, _| {
            Some(CLEARING_ACK.to_string())
        })
        .await
    }

    /// Funds acknowledgement for forward book transfers only.
    pub async fn mock_funds_book(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(FUND_CONTROL, forward, returns, |_, flow, kind| {
            book_only(flow, kind, BOOK_FUNDS_ACK)
        })
        .await
    }

    /// Posting acknowledgement for forward book transfers only.
    pub async fn mock_posting_book(
        &self,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
    ) -> Result<MockReport> {
        self.mock_all(POSTING, forward, returns, |_, flow, kind| {
            book_only(flow, kind, BOOK_POSTING_ACK)
        })
        .await
    }

    async fn mock_all<F>(
        &self,
        service: &str,
        forward: &RunStoreRef,
        returns: &RunStoreRef,
        value_for: F,
    ) -> Result<MockReport>
    where
        F: Fn(&FlowRegistry, &str, RunKind) -> Option<String>,
    {
        self.service(service)?;
        info!("Mocking {service} for all transactions ...");
        let mut assignments = Vec::new();
        for (kind, store) in [(RunKind::Forward, forward), (RunKind::Return, returns)] {
            let flows = store.flows().await;
            let registry = self.registry.read().await;
            for flow in flows {
                if let Some(value) = value_for(&*registry, &flow, kind) {
                    assignments.push(Assignment {
                        flow,
                        kind,
                        value,
                        store: store.clone(),
                    });
                }
            }
        }
        Ok(self.run(service, assignments).await)
    }

    async fn run(&self, service: &str, assignments: Vec<Assignment>) -> MockReport {
        let mut batch = Batch::new();
        for assignment in assignments {
            let name = match assignment.kind {
                RunKind::Forward => assignment.flow.clone(),
                RunKind::Return => format!("{} (return)", assignment.flow),
            };
            let controller = self.clone();
            let service = service.to_string();
            batch.spawn(name, async move {
                controller
                    .mock_response(
                        &service,
                        &assignment.flow,
                        &assignment.value,
                        &assignment.store,
                    )
                    .await
            });
        }
        let mut report = batch.join().await;
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}

fn book_only(flow: &str, kind: RunKind, value: &str) -> Option<String> {
    (kind == RunKind::Forward && flow.contains("book")).then(|| value.to_string())
}
