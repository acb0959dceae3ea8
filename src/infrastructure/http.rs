use crate::config::EndpointConfig;
use crate::domain::ports::{GatewayResponse, IdKind, PaymentGateway, SearchRegion};
use crate::error::{Result, SmokeError};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// `PaymentGateway` backed by the live HTTP services.
///
/// URL templates are resolved against the base URL once at construction; only the
/// per-request placeholders (`{service}`, `{region}`, `{ids}`) are substituted later.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    upload: String,
    mock: String,
    search: String,
    extraction: Option<String>,
}

impl HttpGateway {
    pub fn new(endpoint: &EndpointConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let with_env = |path: &str| join(&endpoint.base, path).replace("{env}", &endpoint.env);
        Ok(Self {
            client,
            upload: with_env(&endpoint.upload),
            // the mock service is shared across environments
            mock: join(&endpoint.base, &endpoint.mock),
            search: with_env(&endpoint.search),
            extraction: endpoint.extraction.clone(),
        })
    }

    pub fn upload_url(&self, service: &str) -> String {
        self.upload.replace("{service}", service)
    }

    pub fn mock_url(&self, service: &str) -> String {
        self.mock.replace("{service}", service)
    }

    pub fn search_url(&self, region: SearchRegion, ids: &str, kind: IdKind) -> String {
        self.search
            .replace(IdKind::FirmRootId.marker(), kind.marker())
            .replace("{region}", region.as_str())
            .replace("{ids}", ids)
    }

    async fn post(&self, url: &str, body: Option<&Value>) -> Result<GatewayResponse> {
        debug!(url, "POST");
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }
        read_response(request.send().await?).await
    }
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn read_response(response: reqwest::Response) -> Result<GatewayResponse> {
    let status = response.status().as_u16();
    let bytes = response.bytes().await?;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok(GatewayResponse::new(status, body))
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn upload(&self, service: &str, body: &Value) -> Result<GatewayResponse> {
        self.post(&self.upload_url(service), Some(body)).await
    }

    async fn mock(&self, service: &str, body: &Value) -> Result<GatewayResponse> {
        self.post(&self.mock_url(service), Some(body)).await
    }

    async fn search(
        &self,
        region: SearchRegion,
        ids: &str,
        kind: IdKind,
    ) -> Result<GatewayResponse> {
        let url = self.search_url(region, ids, kind);
        debug!(url, "GET");
        read_response(self.client.get(&url).send().await?).await
    }

    async fn extract(&self) -> Result<GatewayResponse> {
        let url = self
            .extraction
            .as_deref()
            .ok_or_else(|| SmokeError::Config("endpoint.extraction is not set".to_string()))?;
        self.post(url, None).await
    }
}
