use crate::application::report::Report;
use crate::error::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes smoke reports to any `Write` sink (e.g., stdout, a log file).
pub struct ReportWriter<W: Write> {
    sink: W,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write_report(&mut self, report: &Report, verbose: bool) -> Result<()> {
        self.sink.write_all(report.render(verbose).as_bytes())?;
        self.sink.flush()?;
        Ok(())
    }
}

/// Saves the verbose form of `report` under `{dir}/{env}/` and returns the file path.
pub fn save_report(dir: &Path, report: &Report) -> Result<PathBuf> {
    let target = dir.join(&report.env);
    fs::create_dir_all(&target)?;
    let path = target.join(format!(
        "smoke-report-{}.log",
        report.generated_at.format("%Y-%m-%d-%H-%M-%S")
    ));
    let file = fs::File::create(&path)?;
    ReportWriter::new(file).write_report(report, true)?;
    info!("Smoke test result saved to [{}]", path.display());
    Ok(path)
}
