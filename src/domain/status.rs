use serde::{Deserialize, Serialize};

/// Transaction statuses that need no further re-run.
pub const TERMINAL_STATUSES: [&str; 2] = ["CMP", "RTN"];

/// Snapshot of a transaction's progress through the downstream services.
///
/// Produced fresh by every status poll; never merged with an earlier snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusRecord {
    pub qualification_status: String,
    pub sanctions_status: String,
    pub funds_control_status: String,
    pub post_status: String,
    pub sett_status: String,
    pub tran_status: String,
}

impl StatusRecord {
    pub fn is_terminal(&self) -> bool {
        TERMINAL_STATUSES.contains(&self.tran_status.as_str())
    }

    /// One-line summary of every stage, used by verbose reports.
    pub fn summary(&self) -> String {
        format!(
            "Qual = {}, Sanctions = {}, Funds = {}, Posting = {}, Sett = {}, Tran = {}",
            self.qualification_status,
            self.sanctions_status,
            self.funds_control_status,
            self.post_status,
            self.sett_status,
            self.tran_status
        )
    }
}
