use crate::domain::flow::FlowTemplate;
use crate::error::{Result, SmokeError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Forward templates and the return templates that match them, keyed by file stem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    pub forward: BTreeMap<String, FlowTemplate>,
    pub returns: BTreeMap<String, FlowTemplate>,
}

/// Loads flow templates from a main and a return directory.
///
/// Every `*.json` file in the main directory is one flow. A return template is the
/// same-named file in the return directory; flows without one have no return leg.
pub struct TemplateReader {
    main: PathBuf,
    returns: PathBuf,
}

impl TemplateReader {
    pub fn new(main: impl Into<PathBuf>, returns: impl Into<PathBuf>) -> Self {
        Self {
            main: main.into(),
            returns: returns.into(),
        }
    }

    pub fn read(&self) -> Result<TemplateSet> {
        let entries = fs::read_dir(&self.main).map_err(|e| {
            SmokeError::Template(format!("{} could not be read: {e}", self.main.display()))
        })?;

        let mut set = TemplateSet::default();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(flow) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            set.forward.insert(flow.to_string(), load(&path)?);
        }

        if !self.returns.is_dir() {
            warn!(
                "Return template directory {} not found, no returns loaded",
                self.returns.display()
            );
            return Ok(set);
        }
        for flow in set.forward.keys() {
            let path = self.returns.join(format!("{flow}.json"));
            if path.is_file() {
                set.returns.insert(flow.clone(), load(&path)?);
            }
        }
        debug!(
            forward = set.forward.len(),
            returns = set.returns.len(),
            "Templates loaded"
        );
        Ok(set)
    }
}

fn load(path: &Path) -> Result<FlowTemplate> {
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(template) => Ok(template),
        _ => Err(SmokeError::Template(format!(
            "{} is not a JSON object",
            path.display()
        ))),
    }
}
