use crate::domain::flow::display_name;
use crate::domain::status::StatusRecord;
use chrono::{DateTime, Local};
use std::fmt::Write;

pub const MOCKED_ANNOTATION: &str = "\t(Triggered with isBusinessLive 'N' and mocking)";

/// One flow's row in a smoke report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub flow: String,
    pub root_id: String,
    pub secondary_id: String,
    pub status: Option<StatusRecord>,
    pub mocked: bool,
}

impl ReportLine {
    /// `NAME: root / secondary - <status><annotation>`.
    ///
    /// Verbose lines carry every per-service status; short lines only `tranStatus`.
    /// A flow without a status renders an empty status field.
    pub fn render(&self, verbose: bool) -> String {
        let status = match (&self.status, verbose) {
            (Some(status), true) => status.summary(),
            (Some(status), false) => status.tran_status.clone(),
            (None, _) => String::new(),
        };
        let annotation = if self.mocked { MOCKED_ANNOTATION } else { "" };
        format!(
            "{}: {} / {} - {status}{annotation}",
            display_name(&self.flow),
            self.root_id,
            self.secondary_id
        )
    }
}

/// A rendered snapshot of every dispatched flow, sorted by flow name.
#[derive(Debug, Clone)]
pub struct Report {
    pub env: String,
    pub generated_at: DateTime<Local>,
    pub lines: Vec<ReportLine>,
}

impl Report {
    pub fn new(env: &str, mut lines: Vec<ReportLine>) -> Self {
        lines.sort_by(|a, b| a.flow.cmp(&b.flow));
        Self {
            env: env.to_string(),
            generated_at: Local::now(),
            lines,
        }
    }

    /// `[SMOKE TEST ON SUN OCT 18 09:30:00 2026 - UA1]`
    pub fn title(&self) -> String {
        format!(
            "[Smoke test on {} - {}]",
            self.generated_at.format("%a %b %e %H:%M:%S %Y"),
            self.env
        )
        .to_uppercase()
    }

    pub fn render(&self, verbose: bool) -> String {
        let mut out = format!("{}\n\n", self.title());
        for line in &self.lines {
            // Infallible for String.
            let _ = writeln!(out, "{}", line.render(verbose));
        }
        out.push_str("\n[END]\n");
        out
    }

    pub fn complete(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.status.as_ref().is_some_and(StatusRecord::is_terminal))
            .count()
    }
}
