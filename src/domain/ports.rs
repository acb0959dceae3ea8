use super::flow::FlowRunResult;
use super::status::StatusRecord;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Status code and decoded JSON body of a gateway call.
///
/// A body that is not valid JSON is recorded as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: Value,
}

impl GatewayResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// First element of an array body, if any.
    pub fn first_record(&self) -> Option<&Value> {
        self.body.as_array().and_then(|records| records.first())
    }
}

/// Search region of the lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchRegion {
    TransactionStatus,
    TransactionDetail,
}

impl SearchRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransactionStatus => "TransactionStatus",
            Self::TransactionDetail => "TransactionDetail",
        }
    }
}

impl fmt::Display for SearchRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier kind a search is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    FirmRootId,
    EndToEndId,
}

impl IdKind {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::FirmRootId => "FIRM_ROOT_ID",
            Self::EndToEndId => "END_TO_END_ID",
        }
    }
}

/// The payments backend as seen by the exerciser.
///
/// `Err` means the request produced no response at all; any HTTP status, including
/// failures, comes back as a `GatewayResponse`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn upload(&self, service: &str, body: &Value) -> Result<GatewayResponse>;
    async fn mock(&self, service: &str, body: &Value) -> Result<GatewayResponse>;
    async fn search(&self, region: SearchRegion, ids: &str, kind: IdKind)
    -> Result<GatewayResponse>;
    async fn extract(&self) -> Result<GatewayResponse>;
}

/// Keyed store of run results, one slot per flow name.
///
/// Implementations must accept concurrent writers; the `cache_*` and `set_status`
/// methods only apply when `generation` still matches the stored result and report
/// whether the write happened.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Replaces any previous result for the flow and returns it with its new generation.
    async fn insert(&self, result: FlowRunResult) -> FlowRunResult;
    async fn get(&self, flow: &str) -> Option<FlowRunResult>;
    async fn cache_root_id(&self, flow: &str, generation: u64, root_id: &str) -> bool;
    async fn cache_secondary_id(&self, flow: &str, generation: u64, secondary_id: &str) -> bool;
    async fn set_status(&self, flow: &str, generation: u64, status: Option<StatusRecord>) -> bool;
    /// Flow names in ascending order.
    async fn flows(&self) -> Vec<String>;
    async fn clear(&self);
}

pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type RunStoreRef = Arc<dyn RunStore>;
