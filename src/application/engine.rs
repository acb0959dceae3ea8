use super::batch::Batch;
use super::correlator::Correlator;
use super::dispatcher::{BatchOutcome, Dispatcher};
use super::mock::{MockController, MockReport};
use super::poller::StatusPoller;
use super::registry::{FlowRegistry, SharedRegistry};
use super::report::{Report, ReportLine};
use super::scheduler::{BurstReport, IntervalReport, LoadScheduler, TimingBudget};
use crate::config::Config;
use crate::domain::flow::{FlowRunResult, RunKind, flow_key};
use crate::domain::ports::{GatewayRef, RunStoreRef};
use crate::error::{Result, SmokeError};
use crate::infrastructure::in_memory::InMemoryRunStore;
use crate::interfaces::json::template_reader::{TemplateReader, TemplateSet};
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// The main entry point of a smoke session.
///
/// `SmokeEngine` owns the flow registry and both run maps (forward and return) and
/// drives every operation against the payment gateway: dispatch, correlation, status
/// polling, mocking, reporting and scheduled load.
pub struct SmokeEngine {
    env: String,
    value_date: Option<NaiveDate>,
    gateway: GatewayRef,
    registry: SharedRegistry,
    forward: RunStoreRef,
    returns: RunStoreRef,
    dispatcher: Dispatcher,
    correlator: Correlator,
    poller: StatusPoller,
    mocks: MockController,
    scheduler: LoadScheduler,
    extraction: LoadScheduler,
}

impl SmokeEngine {
    /// Creates an engine with empty run maps and no templates loaded.
    pub fn new(config: &Config, gateway: GatewayRef) -> Self {
        let registry: SharedRegistry = Arc::new(RwLock::new(FlowRegistry::new(
            config.debit.clone(),
            config.sanctions_reject.clone(),
        )));
        let correlator = Correlator::new(gateway.clone());
        let scheduler = LoadScheduler::new(
            TimingBudget::new(config.scheduler.spacing()),
            config.scheduler.max_in_flight,
        );
        let extraction = scheduler.with_spacing(config.scheduler.extraction_spacing());

        Self {
            env: config.env().to_string(),
            value_date: config.payload.upload.value_dt,
            dispatcher: Dispatcher::new(gateway.clone(), registry.clone()),
            poller: StatusPoller::new(gateway.clone()),
            mocks: MockController::new(
                gateway.clone(),
                correlator.clone(),
                registry.clone(),
                config.payload.mock.clone(),
            ),
            correlator,
            gateway,
            registry,
            forward: Arc::new(InMemoryRunStore::new()),
            returns: Arc::new(InMemoryRunStore::new()),
            scheduler,
            extraction,
        }
    }

    /// Replaces the wall-clock source the schedulers align to.
    pub fn with_clock(mut self, clock: fn() -> Duration) -> Self {
        self.scheduler = self.scheduler.with_clock(clock);
        self.extraction = self.extraction.with_clock(clock);
        self
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn forward_results(&self) -> &RunStoreRef {
        &self.forward
    }

    pub fn return_results(&self) -> &RunStoreRef {
        &self.returns
    }

    /// Installs a template set, stamping the configured value date. Returns the number of
    /// forward and return templates installed.
    pub async fn install_templates(&self, set: TemplateSet) -> (usize, usize) {
        let mut registry = self.registry.write().await;
        registry.replace_templates(set.forward, set.returns);
        if let Some(date) = self.value_date {
            registry.stamp_value_date(date);
        }
        let counts = (registry.forward_flows().len(), registry.return_flows().len());
        info!("Loaded {} flows ({} with returns)", counts.0, counts.1);
        counts
    }

    pub async fn reload(&self, reader: &TemplateReader) -> Result<(usize, usize)> {
        let set = reader.read()?;
        Ok(self.install_templates(set).await)
    }

    /// Flips the mocked flag of each flow; unknown names are logged and returned.
    pub async fn toggle_mocked(&self, flows: &[String]) -> Vec<String> {
        let flows = normalize(flows);
        let unknown = self.registry.write().await.toggle_mocked(&flows);
        for flow in &unknown {
            error!("[{flow}] not found.");
        }
        unknown
    }

    pub async fn set_all_live(&self) {
        self.registry.write().await.set_all_live();
        info!("All flows will be triggered live");
    }

    pub async fn set_all_mocked(&self) {
        self.registry.write().await.set_all_mocked();
        info!("All flows will be triggered with isBusinessLive 'N'");
    }

    pub async fn toggle_source_system(&self) -> Vec<(String, String)> {
        self.registry.write().await.toggle_source_system()
    }

    pub async fn set_remittance_info(&self, flow: &str, text: &str) -> Result<()> {
        self.registry
            .write()
            .await
            .set_remittance_info(flow_key(flow), text)
    }

    pub async fn reset_remittance_info(&self) {
        self.registry.write().await.reset_remittance_info();
    }

    /// Clears both run maps and dispatches every forward flow.
    pub async fn smokes(&self) -> BatchOutcome {
        self.forward.clear().await;
        self.returns.clear().await;
        let flows = self.registry.read().await.forward_flows();
        info!("Triggering {} flows ...", flows.len());
        self.dispatcher
            .dispatch_batch(&flows, RunKind::Forward, &self.forward)
            .await
    }

    /// Dispatches the return leg of every successful forward flow that has one.
    pub async fn smokes_return(&self) -> BatchOutcome {
        info!("Triggering returns ...");
        self.dispatcher
            .dispatch_returns(&self.forward, &self.returns)
            .await
    }

    /// Re-dispatches the given forward flows, replacing their previous results.
    pub async fn smoke(&self, flows: &[String]) -> BatchOutcome {
        self.dispatcher
            .dispatch_batch(&normalize(flows), RunKind::Forward, &self.forward)
            .await
    }

    /// Forward flows with no result, no status, or a status that is not terminal.
    pub async fn incomplete_flows(&self) -> Vec<String> {
        let flows = self.registry.read().await.forward_flows();
        let mut incomplete = Vec::new();
        for flow in flows {
            let complete = self
                .forward
                .get(&flow)
                .await
                .is_some_and(|result| result.is_complete());
            if !complete {
                incomplete.push(flow);
            }
        }
        incomplete
    }

    /// Re-dispatches every incomplete forward flow, using the statuses of the last refresh.
    pub async fn update_incomplete(&self) -> BatchOutcome {
        let flows = self.incomplete_flows().await;
        info!("Re-triggering {} incomplete flows ...", flows.len());
        self.smoke(&flows).await
    }

    /// Resolves identifiers and polls a fresh status for every flow in both run maps.
    pub async fn refresh(&self) {
        info!("Updating statuses and p3_id ...");
        let mut batch = Batch::new();
        for store in [&self.forward, &self.returns] {
            for flow in store.flows().await {
                let correlator = self.correlator.clone();
                let poller = self.poller.clone();
                let store = store.clone();
                batch.spawn(flow.clone(), async move {
                    refresh_flow(&flow, &correlator, &poller, &store).await;
                    Ok(())
                });
            }
        }
        for (flow, outcome) in batch.join().await {
            if let Err(e) = outcome {
                error!("Refreshing [{flow}] failed: {e}");
            }
        }
    }

    /// Refreshes, then renders one line per forward flow. With `prefer_returns`, flows that
    /// have a return result are reported from it.
    pub async fn report(&self, prefer_returns: bool) -> Report {
        self.refresh().await;
        let registry = self.registry.read().await;
        let mut lines = Vec::new();
        for flow in self.forward.flows().await {
            let from_return = if prefer_returns {
                self.returns.get(&flow).await
            } else {
                None
            };
            let Some(result) = from_return.or(self.forward.get(&flow).await) else {
                continue;
            };
            lines.push(ReportLine {
                mocked: registry.is_mocked(&flow),
                flow,
                root_id: result.root_id,
                secondary_id: result.secondary_id,
                status: result.status,
            });
        }
        Report::new(&self.env, lines)
    }

    pub async fn mock_sanctions(&self) -> Result<MockReport> {
        self.mocks.mock_sanctions(&self.forward, &self.returns).await
    }

    pub async fn mock_funds(&self) -> Result<MockReport> {
        self.mocks.mock_funds(&self.forward, &self.returns).await
    }

    pub async fn mock_posting(&self) -> Result<MockReport> {
        self.mocks.mock_posting(&self.forward, &self.returns).await
    }

    pub async fn mock_clearing(&self) -> Result<MockReport> {
        self.mocks.mock_clearing(&self.forward, &self.returns).await
    }

    pub async fn mock_funds_book(&self) -> Result<MockReport> {
        self.mocks.mock_funds_book(&self.forward, &self.returns).await
    }

    pub async fn mock_posting_book(&self) -> Result<MockReport> {
        self.mocks.mock_posting_book(&self.forward, &self.returns).await
    }

    pub async fn mock_flows(
        &self,
        service: &str,
        value: &str,
        flows: &[String],
    ) -> Result<MockReport> {
        self.mocks
            .mock_flows(service, value, &normalize(flows), &self.forward)
            .await
    }

    /// Fires `tps` dispatches of `flow` per second for `minutes`.
    ///
    /// The flow's remittance info is stamped for the run (a generated `NFT_...` label when
    /// none is given) and every flow is reset to the default afterwards. Burst results go
    /// to a scratch run map so the smoke results are left alone.
    pub async fn run_burst_schedule(
        &self,
        flow: &str,
        tps: u32,
        minutes: u64,
        remittance: Option<String>,
    ) -> Result<BurstReport> {
        let flow = flow_key(flow).to_string();
        let text = remittance
            .unwrap_or_else(|| format!("NFT_{tps}TPS_{minutes}MIN_{}", run_stamp()));
        self.stamp_remittance(&[&flow], &text).await?;

        let dispatcher = self.dispatcher.clone();
        let scratch: RunStoreRef = Arc::new(InMemoryRunStore::new());
        let target = flow.clone();
        let report = self
            .scheduler
            .run_burst(&flow, tps, Duration::from_secs(minutes * 60), move |_| {
                let (dispatcher, store, flow) = (dispatcher.clone(), scratch.clone(), target.clone());
                async move { dispatched(&dispatcher, &flow, &store).await }
            })
            .await;

        self.reset_remittance_info().await;
        Ok(report)
    }

    /// Every `interval_minutes`, dispatches `count` of each flow until `shutdown` resolves.
    /// `total_minutes` only sizes the logged expectation.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_interval_schedule<S>(
        &self,
        flow_a: &str,
        flow_b: &str,
        count: usize,
        interval_minutes: u64,
        total_minutes: u64,
        remittance: Option<String>,
        shutdown: S,
    ) -> Result<IntervalReport>
    where
        S: Future<Output = ()>,
    {
        if interval_minutes == 0 {
            return Err(SmokeError::Config(
                "Soak interval must be at least one minute".to_string(),
            ));
        }
        let (flow_a, flow_b) = (flow_key(flow_a).to_string(), flow_key(flow_b).to_string());
        let text = remittance.unwrap_or_else(|| {
            format!(
                "NFT_{count}TPI_{interval_minutes}MI_{total_minutes}MIN_{}",
                run_stamp()
            )
        });
        self.stamp_remittance(&[&flow_a, &flow_b], &text).await?;

        let intervals = total_minutes / interval_minutes;
        info!(
            "Soak: {count} x [{flow_a}] and {count} x [{flow_b}] every {interval_minutes} min, \
             expecting {} requests in {total_minutes} min",
            intervals * 2 * count as u64
        );
        let mut plan = vec![flow_a; count];
        plan.extend(vec![flow_b; count]);

        let dispatcher = self.dispatcher.clone();
        let scratch: RunStoreRef = Arc::new(InMemoryRunStore::new());
        let report = self
            .scheduler
            .run_interval(
                &plan,
                Duration::from_secs(interval_minutes * 60),
                move |flow| {
                    let (dispatcher, store, flow) = (dispatcher.clone(), scratch.clone(), flow.to_string());
                    async move { dispatched(&dispatcher, &flow, &store).await }
                },
                shutdown,
            )
            .await;

        self.reset_remittance_info().await;
        Ok(report)
    }

    /// Fires `tps` extraction triggers per second for `minutes`.
    pub async fn run_extraction_schedule(&self, tps: u32, minutes: u64) -> BurstReport {
        let gateway = self.gateway.clone();
        self.extraction
            .run_burst("extraction", tps, Duration::from_secs(minutes * 60), move |n| {
                let gateway = gateway.clone();
                async move {
                    match gateway.extract().await {
                        Ok(response) => {
                            debug!(shot = n, ids = %response.body, "Extraction triggered");
                            response.is_ok()
                        }
                        Err(e) => {
                            debug!(shot = n, "Extraction failed: {e}");
                            false
                        }
                    }
                }
            })
            .await
    }

    async fn stamp_remittance(&self, flows: &[&String], text: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        for flow in flows {
            if !registry.contains(flow) {
                error!("[{flow}] not found.");
                return Err(SmokeError::UnknownFlow(flow.to_string()));
            }
            registry.set_remittance_info(flow, text)?;
        }
        info!("Remittance info set to [{text}]");
        Ok(())
    }
}

async fn refresh_flow(
    flow: &str,
    correlator: &Correlator,
    poller: &StatusPoller,
    store: &RunStoreRef,
) {
    let Some(FlowRunResult { generation, .. }) = store.get(flow).await else {
        return;
    };
    let root_id = correlator.resolve_root_id(flow, store).await;
    let status = poller.poll_status(&root_id).await;
    store.set_status(flow, generation, status).await;
    correlator.resolve_secondary_id(flow, store).await;
}

async fn dispatched(dispatcher: &Dispatcher, flow: &str, store: &RunStoreRef) -> bool {
    dispatcher
        .dispatch(flow, RunKind::Forward, store)
        .await
        .is_ok_and(|result| result.is_success())
}

fn normalize(flows: &[String]) -> Vec<String> {
    flows.iter().map(|flow| flow_key(flow).to_string()).collect()
}

fn run_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
