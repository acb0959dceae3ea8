use crate::domain::flow::flow_key;
use crate::error::{Result, SmokeError};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment configuration, loaded from `config/{env}/config.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub payload: PayloadConfig,
    /// Flows whose forward leg is a debit.
    #[serde(default)]
    pub debit: BTreeSet<String>,
    /// Flows that get a rejecting sanctions response when mocked.
    #[serde(default)]
    pub sanctions_reject: BTreeSet<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Service locations. Paths are joined to `base` and may contain `{env}`, `{service}`,
/// `{region}` and `{ids}` placeholders.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base: String,
    pub env: String,
    pub upload: String,
    pub mock: String,
    pub search: String,
    /// Absolute URL of the extraction trigger.
    #[serde(default)]
    pub extraction: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadConfig {
    pub upload: UploadConfig,
    #[serde(default)]
    pub mock: BTreeMap<String, MockServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub json: TemplateDirs,
    /// Value date stamped on every template after loading.
    #[serde(rename = "valueDt", default)]
    pub value_dt: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDirs {
    pub main: String,
    #[serde(rename = "return")]
    pub returns: String,
}

/// Response field name and allowed values of one mock endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MockServiceConfig {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Gap between dispatch starts within one burst second.
    pub spacing_ms: u64,
    /// Gap between extraction trigger starts within one burst second.
    pub extraction_spacing_ms: u64,
    /// Ceiling on concurrently running scheduled requests. Unbounded when absent.
    pub max_in_flight: Option<usize>,
    /// Per-request timeout. The transport default applies when absent.
    pub request_timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            spacing_ms: 20,
            extraction_spacing_ms: 50,
            max_in_flight: None,
            request_timeout_ms: None,
        }
    }
}

impl SchedulerConfig {
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    pub fn extraction_spacing(&self) -> Duration {
        Duration::from_millis(self.extraction_spacing_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("smoke"),
        }
    }
}

impl Config {
    /// Parses a YAML document. Flow names in the debit and sanctions-reject lists may
    /// carry a `.json` extension.
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.debit = normalize(&config.debit);
        config.sanctions_reject = normalize(&config.sanctions_reject);
        if config.endpoint.base.trim().is_empty() {
            return Err(SmokeError::Config("endpoint.base must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SmokeError::Config(format!("{} not found: {e}", path.display())))?;
        Self::parse(&yaml)
    }

    /// Location of an environment's configuration under `config_dir`.
    pub fn path_for_env(config_dir: impl AsRef<Path>, env: &str) -> PathBuf {
        config_dir.as_ref().join(env).join("config.yaml")
    }

    pub fn env(&self) -> &str {
        &self.endpoint.env
    }

    pub fn main_dir(&self) -> PathBuf {
        PathBuf::from(self.with_env(&self.payload.upload.json.main))
    }

    pub fn return_dir(&self) -> PathBuf {
        PathBuf::from(self.with_env(&self.payload.upload.json.returns))
    }

    pub fn with_env(&self, template: &str) -> String {
        template.replace("{env}", &self.endpoint.env)
    }
}

fn normalize(flows: &BTreeSet<String>) -> BTreeSet<String> {
    flows.iter().map(|flow| flow_key(flow).to_string()).collect()
}
