use crate::domain::flow::{FlowTemplate, RunKind};
use crate::domain::service::{Direction, SANCTIONS_PASSED};
use crate::error::{Result, SmokeError};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub const BUSINESS_LIVE: &str = "businessLive";
pub const SANCTIONS_RESPONSE: &str = "sanctionsResponse";
pub const FAS_RESPONSE: &str = "fasResponse";
pub const POSTING_RESPONSE: &str = "postingResponse";
pub const SOURCE_SYSTEM: &str = "sourceSystem";
pub const REMITTANCE_INFO: &str = "additionalRemittanceInfo";
pub const VALUE_DATE: &str = "valueDt";
pub const DEFAULT_REMITTANCE_INFO: &str = "Additional Remittance Info";

/// Registry shared between the engine and its dispatch tasks.
pub type SharedRegistry = Arc<RwLock<FlowRegistry>>;

/// Forward and return templates, keyed by flow name, plus the operator's flow sets.
#[derive(Debug, Default, Clone)]
pub struct FlowRegistry {
    forward: BTreeMap<String, FlowTemplate>,
    returns: BTreeMap<String, FlowTemplate>,
    mocked: BTreeSet<String>,
    debit: BTreeSet<String>,
    sanctions_reject: BTreeSet<String>,
}

impl FlowRegistry {
    pub fn new(debit: BTreeSet<String>, sanctions_reject: BTreeSet<String>) -> Self {
        Self {
            debit,
            sanctions_reject,
            ..Self::default()
        }
    }

    /// Replaces every template. Return templates without a forward counterpart are dropped.
    pub fn replace_templates(
        &mut self,
        forward: BTreeMap<String, FlowTemplate>,
        mut returns: BTreeMap<String, FlowTemplate>,
    ) {
        returns.retain(|flow, _| forward.contains_key(flow));
        self.forward = forward;
        self.returns = returns;
    }

    pub fn insert_forward(&mut self, flow: &str, template: FlowTemplate) {
        self.forward.insert(flow.to_string(), template);
    }

    pub fn insert_return(&mut self, flow: &str, template: FlowTemplate) {
        self.returns.insert(flow.to_string(), template);
    }

    pub fn forward_flows(&self) -> Vec<String> {
        self.forward.keys().cloned().collect()
    }

    pub fn return_flows(&self) -> Vec<String> {
        self.returns.keys().cloned().collect()
    }

    pub fn contains(&self, flow: &str) -> bool {
        self.forward.contains_key(flow)
    }

    pub fn has_return(&self, flow: &str) -> bool {
        self.returns.contains_key(flow)
    }

    pub fn template(&self, flow: &str, kind: RunKind) -> Option<&FlowTemplate> {
        match kind {
            RunKind::Forward => self.forward.get(flow),
            RunKind::Return => self.returns.get(flow),
        }
    }

    pub fn is_mocked(&self, flow: &str) -> bool {
        self.mocked.contains(flow)
    }

    pub fn is_debit(&self, flow: &str) -> bool {
        self.debit.contains(flow)
    }

    pub fn is_sanctions_reject(&self, flow: &str) -> bool {
        self.sanctions_reject.contains(flow)
    }

    pub fn mocked(&self) -> &BTreeSet<String> {
        &self.mocked
    }

    /// Flips the mocked flag of each named flow. Returns the names that are not registered.
    pub fn toggle_mocked(&mut self, flows: &[String]) -> Vec<String> {
        let mut unknown = Vec::new();
        for flow in flows {
            if !self.contains(flow) {
                unknown.push(flow.clone());
            } else if !self.mocked.remove(flow) {
                self.mocked.insert(flow.clone());
            }
        }
        unknown
    }

    pub fn set_all_live(&mut self) {
        self.mocked.clear();
    }

    pub fn set_all_mocked(&mut self) {
        self.mocked = self.forward.keys().cloned().collect();
    }

    /// Builds the request body for one leg of a flow.
    ///
    /// The template is copied and overlaid with the liveness flag and, for mocked flows,
    /// the downstream acknowledgement placeholders for the leg's direction.
    pub fn prepare(&self, flow: &str, kind: RunKind) -> Result<Value> {
        let mut body = self
            .template(flow, kind)
            .cloned()
            .ok_or_else(|| SmokeError::UnknownFlow(flow.to_string()))?;

        if self.is_mocked(flow) {
            let direction = Direction::of(self.is_debit(flow), kind);
            body.insert(BUSINESS_LIVE.into(), "N".into());
            body.insert(SANCTIONS_RESPONSE.into(), SANCTIONS_PASSED.into());
            body.insert(FAS_RESPONSE.into(), direction.fas_ack().into());
            body.insert(POSTING_RESPONSE.into(), direction.posting_ack().into());
        } else {
            body.insert(BUSINESS_LIVE.into(), "Y".into());
            body.insert(SANCTIONS_RESPONSE.into(), "".into());
            body.insert(FAS_RESPONSE.into(), "".into());
            body.insert(POSTING_RESPONSE.into(), "".into());
        }
        Ok(Value::Object(body))
    }

    /// Switches incoming flows (`rrct`, `rddt`) between the `gc2` and `gxp` source systems.
    pub fn toggle_source_system(&mut self) -> Vec<(String, String)> {
        let mut toggled = Vec::new();
        for (flow, template) in self.forward.iter_mut() {
            if !(flow.contains("rrct") || flow.contains("rddt")) {
                continue;
            }
            let current = template
                .get(SOURCE_SYSTEM)
                .and_then(Value::as_str)
                .unwrap_or("");
            let next = if current.eq_ignore_ascii_case("gc2") { "gxp" } else { "gc2" };
            template.insert(SOURCE_SYSTEM.into(), next.into());
            info!("Source system for [{flow}] is now set to [{next}]");
            toggled.push((flow.clone(), next.to_string()));
        }
        toggled
    }

    pub fn set_remittance_info(&mut self, flow: &str, text: &str) -> Result<()> {
        let template = self
            .forward
            .get_mut(flow)
            .ok_or_else(|| SmokeError::UnknownFlow(flow.to_string()))?;
        template.insert(REMITTANCE_INFO.into(), text.into());
        Ok(())
    }

    pub fn remittance_info(&self, flow: &str) -> Option<&str> {
        self.forward
            .get(flow)
            .and_then(|template| template.get(REMITTANCE_INFO))
            .and_then(Value::as_str)
    }

    pub fn reset_remittance_info(&mut self) {
        for template in self.forward.values_mut() {
            template.insert(REMITTANCE_INFO.into(), DEFAULT_REMITTANCE_INFO.into());
        }
    }

    /// Stamps `valueDt` on both template sets. Flows whose name contains `-` take the
    /// ISO form, the rest the compact `YYYYMMDD` form.
    pub fn stamp_value_date(&mut self, date: NaiveDate) {
        let iso = date.format("%Y-%m-%d").to_string();
        let compact = date.format("%Y%m%d").to_string();
        for (flow, template) in self.forward.iter_mut().chain(self.returns.iter_mut()) {
            let value = if flow.contains('-') { &iso } else { &compact };
            template.insert(VALUE_DATE.into(), value.as_str().into());
        }
    }
}
