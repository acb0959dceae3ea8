use crate::domain::ports::{GatewayRef, IdKind, SearchRegion};
use crate::domain::status::StatusRecord;
use tracing::{debug, warn};

/// Looks up the current status of a transaction. Never caches: every call is a fresh query.
#[derive(Clone)]
pub struct StatusPoller {
    gateway: GatewayRef,
}

impl StatusPoller {
    pub fn new(gateway: GatewayRef) -> Self {
        Self { gateway }
    }

    /// Returns the first status record for `root_id`, or `None` when the id is blank,
    /// the query fails, or nothing matches.
    pub async fn poll_status(&self, root_id: &str) -> Option<StatusRecord> {
        if root_id.trim().is_empty() {
            return None;
        }
        let response = match self
            .gateway
            .search(SearchRegion::TransactionStatus, root_id, IdKind::FirmRootId)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Status search for [{root_id}] failed: {e}");
                return None;
            }
        };
        if !response.is_ok() {
            debug!(status = response.status, "Status search for [{root_id}] was unsuccessful");
            return None;
        }
        let record = response.first_record()?;
        match serde_json::from_value(record.clone()) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Status record for [{root_id}] is malformed: {e}");
                None
            }
        }
    }
}
