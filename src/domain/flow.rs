use super::status::StatusRecord;
use serde_json::{Map, Value};

/// Root transaction identifier field of an upload or detail response.
pub const FIRM_ROOT_ID: &str = "firmRootId";
/// Secondary (P3) identifier field of an upload or detail response.
pub const P3_ID: &str = "p3Id";
/// End-to-end identifier field of an upload or detail response.
pub const END_TO_END_ID: &str = "endToEndId";

/// A JSON payload template keyed by field name.
pub type FlowTemplate = Map<String, Value>;

/// Which run map a dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunKind {
    /// The main payment leg, submitted from the forward template set.
    Forward,
    /// The return/reversal leg, linked to a previously dispatched forward flow.
    Return,
}

/// Raw outcome of one upload request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The service answered; any status code is recorded as-is.
    Response { status: u16, body: Value },
    /// The request never produced a response (connection error, timeout, ...).
    Failed(String),
}

/// The result of dispatching a single flow, enriched as correlation proceeds.
///
/// `root_id` and `secondary_id` are empty until resolved. `generation` is assigned by the
/// run store on insert and guards cache writes against a result that has since been
/// replaced by a newer dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRunResult {
    pub flow: String,
    pub generation: u64,
    pub outcome: DispatchOutcome,
    pub root_id: String,
    pub secondary_id: String,
    pub status: Option<StatusRecord>,
}

impl FlowRunResult {
    pub fn new(flow: impl Into<String>, outcome: DispatchOutcome) -> Self {
        Self {
            flow: flow.into(),
            generation: 0,
            outcome,
            root_id: String::new(),
            secondary_id: String::new(),
            status: None,
        }
    }

    /// True when the upload was answered with HTTP 200.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Response { status: 200, .. })
    }

    pub fn body(&self) -> Option<&Value> {
        match &self.outcome {
            DispatchOutcome::Response { body, .. } => Some(body),
            DispatchOutcome::Failed(_) => None,
        }
    }

    /// Returns a string field of the response body, or `""` when absent.
    pub fn body_field(&self, field: &str) -> &str {
        self.body()
            .and_then(|body| body.get(field))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// A flow is complete once its transaction reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.status.as_ref().is_some_and(StatusRecord::is_terminal)
    }
}

/// Normalizes a flow name given with or without the `.json` extension.
pub fn flow_key(name: &str) -> &str {
    name.strip_suffix(".json").unwrap_or(name)
}

/// Human-readable flow name used in reports: `sgp_irct_dmct` -> `SGP IRCT DMCT`.
pub fn display_name(flow: &str) -> String {
    flow_key(flow).replace('_', " ").to_uppercase()
}
