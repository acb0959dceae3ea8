use crate::domain::flow::{END_TO_END_ID, FIRM_ROOT_ID, P3_ID};
use crate::domain::ports::{GatewayResponse, IdKind, PaymentGateway, SearchRegion};
use crate::domain::status::StatusRecord;
use crate::error::{Result, SmokeError};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Calls kept by default; older ones are dropped first.
pub const DEFAULT_CALL_LOG: usize = 10_000;

type Reply = std::result::Result<GatewayResponse, String>;

/// A request received by the scripted gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Upload { service: String, body: Value },
    Mock { service: String, body: Value },
    Search {
        region: SearchRegion,
        ids: String,
        kind: IdKind,
    },
    Extract,
}

/// A call together with the (tokio) instant it arrived.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: GatewayCall,
    pub at: Instant,
}

struct ScriptState {
    next_id: u64,
    upload_replies: VecDeque<Reply>,
    search_replies: VecDeque<Reply>,
    auto_status: Option<StatusRecord>,
    statuses: HashMap<String, StatusRecord>,
    /// Detail records keyed by root id.
    details: HashMap<String, Value>,
    /// End-to-end id to root id.
    end_to_end: HashMap<String, String>,
    mock_status: u16,
    calls: VecDeque<RecordedCall>,
    call_log: usize,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            next_id: 0,
            upload_replies: VecDeque::new(),
            search_replies: VecDeque::new(),
            auto_status: None,
            statuses: HashMap::new(),
            details: HashMap::new(),
            end_to_end: HashMap::new(),
            mock_status: 200,
            calls: VecDeque::new(),
            call_log: DEFAULT_CALL_LOG,
        }
    }
}

impl ScriptState {
    fn add_detail(&mut self, root_id: &str, p3_id: &str, end_to_end_id: &str) -> Value {
        let record = json!({
            FIRM_ROOT_ID: root_id,
            P3_ID: p3_id,
            END_TO_END_ID: end_to_end_id,
        });
        self.details.insert(root_id.to_string(), record.clone());
        self.end_to_end
            .insert(end_to_end_id.to_string(), root_id.to_string());
        record
    }

    fn detail(&self, ids: &str, kind: IdKind) -> Option<&Value> {
        match kind {
            IdKind::FirmRootId => self.details.get(ids),
            IdKind::EndToEndId => self
                .end_to_end
                .get(ids)
                .and_then(|root_id| self.details.get(root_id)),
        }
    }

    fn status(&self, root_id: &str) -> Option<&StatusRecord> {
        self.statuses.get(root_id).or_else(|| {
            self.auto_status
                .as_ref()
                .filter(|_| self.details.contains_key(root_id))
        })
    }
}

/// In-process `PaymentGateway` that answers from a script and records recent calls.
///
/// Uploads without a queued reply succeed with generated identifiers
/// (`FR000001` / `P3000001` / `E2E000001`), which are also registered for detail
/// searches. Backs the CLI's dry-run mode.
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<ScriptState>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the response for the next upload that arrives.
    pub fn with_upload_reply(self, response: GatewayResponse) -> Self {
        self.state().upload_replies.push_back(Ok(response));
        self
    }

    /// Queues a transport failure for the next upload that arrives.
    pub fn with_upload_failure(self, reason: &str) -> Self {
        self.state().upload_replies.push_back(Err(reason.to_string()));
        self
    }

    /// Queues the response for the next search that arrives.
    pub fn with_search_reply(self, response: GatewayResponse) -> Self {
        self.state().search_replies.push_back(Ok(response));
        self
    }

    /// Queues a transport failure for the next search that arrives.
    pub fn with_search_failure(self, reason: &str) -> Self {
        self.state().search_replies.push_back(Err(reason.to_string()));
        self
    }

    /// Every known transaction without a scripted status reports this one.
    pub fn with_auto_status(self, status: StatusRecord) -> Self {
        self.state().auto_status = Some(status);
        self
    }

    pub fn with_status(self, root_id: &str, status: StatusRecord) -> Self {
        self.state().statuses.insert(root_id.to_string(), status);
        self
    }

    pub fn with_detail(self, root_id: &str, p3_id: &str, end_to_end_id: &str) -> Self {
        self.state().add_detail(root_id, p3_id, end_to_end_id);
        self
    }

    pub fn with_mock_status(self, status: u16) -> Self {
        self.state().mock_status = status;
        self
    }

    /// Keeps at most `limit` recent calls; zero turns recording off.
    pub fn with_call_log(self, limit: usize) -> Self {
        {
            let mut state = self.state();
            state.call_log = limit;
            while state.calls.len() > limit {
                state.calls.pop_front();
            }
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.iter().cloned().collect()
    }

    pub fn uploads(&self) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter_map(|recorded| match recorded.call {
                GatewayCall::Upload { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn mocks(&self) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|recorded| match recorded.call {
                GatewayCall::Mock { service, body } => Some((service, body)),
                _ => None,
            })
            .collect()
    }

    pub fn searches(&self) -> Vec<(SearchRegion, String, IdKind)> {
        self.calls()
            .into_iter()
            .filter_map(|recorded| match recorded.call {
                GatewayCall::Search { region, ids, kind } => Some((region, ids, kind)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: impl FnOnce() -> GatewayCall) {
        let mut state = self.state();
        if state.call_log == 0 {
            return;
        }
        if state.calls.len() == state.call_log {
            state.calls.pop_front();
        }
        state.calls.push_back(RecordedCall {
            call: call(),
            at: Instant::now(),
        });
    }

    fn generate(&self, body: &Value) -> GatewayResponse {
        let mut state = self.state();
        state.next_id += 1;
        let n = state.next_id;
        let end_to_end_id = body
            .get(END_TO_END_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("E2E{n:06}"));

        let record = state.add_detail(&format!("FR{n:06}"), &format!("P3{n:06}"), &end_to_end_id);
        GatewayResponse::new(200, record)
    }
}

fn replay(reply: Reply) -> Result<GatewayResponse> {
    reply.map_err(|reason| SmokeError::Io(std::io::Error::other(reason)))
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn upload(&self, service: &str, body: &Value) -> Result<GatewayResponse> {
        self.record(|| GatewayCall::Upload {
            service: service.to_string(),
            body: body.clone(),
        });
        let reply = self.state().upload_replies.pop_front();
        match reply {
            Some(reply) => replay(reply),
            None => Ok(self.generate(body)),
        }
    }

    async fn mock(&self, service: &str, body: &Value) -> Result<GatewayResponse> {
        self.record(|| GatewayCall::Mock {
            service: service.to_string(),
            body: body.clone(),
        });
        let status = self.state().mock_status;
        Ok(GatewayResponse::new(status, Value::Null))
    }

    async fn search(
        &self,
        region: SearchRegion,
        ids: &str,
        kind: IdKind,
    ) -> Result<GatewayResponse> {
        self.record(|| GatewayCall::Search {
            region,
            ids: ids.to_string(),
            kind,
        });
        let mut state = self.state();
        if let Some(reply) = state.search_replies.pop_front() {
            return replay(reply);
        }
        let record = match region {
            SearchRegion::TransactionStatus => state
                .status(ids)
                .and_then(|status| serde_json::to_value(status).ok()),
            SearchRegion::TransactionDetail => state.detail(ids, kind).cloned(),
        };
        Ok(GatewayResponse::new(
            200,
            Value::Array(record.into_iter().collect()),
        ))
    }

    async fn extract(&self) -> Result<GatewayResponse> {
        self.record(|| GatewayCall::Extract);
        let mut state = self.state();
        state.next_id += 1;
        Ok(GatewayResponse::new(
            200,
            json!([format!("FR{:06}", state.next_id)]),
        ))
    }
}
