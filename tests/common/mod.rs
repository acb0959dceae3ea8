#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::Json;
use axum::response::IntoResponse;
use flowsmoke::config::Config;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request captured by the stub gateway.
#[derive(Clone, Debug)]
pub struct StubRequest {
    pub method: Method,
    pub path: String,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    routes: Arc<Vec<(String, u16, Value)>>,
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

/// Handle for a stub payments gateway bound to a random local port.
///
/// Requests whose path matches a route get its status and JSON body; anything else gets
/// `404` with an empty list.
pub struct StubGateway {
    base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
    task: JoinHandle<()>,
}

impl StubGateway {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests
            .lock()
            .map_or_else(|_| Vec::new(), |entries| entries.clone())
    }

    pub fn requests_to(&self, path: &str) -> Vec<StubRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

impl Drop for StubGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn spawn_stub(routes: Vec<(&str, u16, Value)>) -> StubGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        routes: Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.to_string(), status, body))
                .collect(),
        ),
        requests: Arc::clone(&requests),
    };
    let app = Router::new().fallback(handle).with_state(state);
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    StubGateway {
        base_url: format!("http://{addr}"),
        requests,
        task,
    }
}

async fn handle(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let request = StubRequest {
        method,
        path: uri.path().to_string(),
        content_type: header_value(header::CONTENT_TYPE),
        accept: header_value(header::ACCEPT),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };
    if let Ok(mut entries) = state.requests.lock() {
        entries.push(request);
    }

    match state.routes.iter().find(|(path, _, _)| path == uri.path()) {
        Some((_, status, body)) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(body.clone()),
        ),
        None => (StatusCode::NOT_FOUND, Json(json!([]))),
    }
}

pub fn config_yaml(base_url: &str, templates: &Path) -> String {
    format!(
        r#"
endpoint:
  base: {base_url}
  env: ua1
  upload: "{{env}}/upload/{{service}}"
  mock: "mock/{{service}}"
  search: "{{env}}/search/{{region}}/FIRM_ROOT_ID/{{ids}}"
  extraction: {base_url}/extract
payload:
  upload:
    json:
      main: {main}
      return: {returns}
  mock:
    sanctions:
      key: sanctionsResponse
      values: [PASSED, FAILED_REJECT]
    fundcontrol:
      key: fasResponse
    posting:
      key: postingResponse
    clearing:
      key: clearingResponse
debit: [sgp_iddt_pmdd]
"#,
        main = templates.join("{env}").join("main").display(),
        returns = templates.join("{env}").join("return").display(),
    )
}

pub fn config(base_url: &str, templates: &Path) -> Config {
    Config::parse(&config_yaml(base_url, templates)).unwrap()
}

/// Writes one forward template per flow, and a return template for each flow in `returns`,
/// under `<root>/ua1/{main,return}`.
pub fn write_templates(root: &Path, flows: &[&str], returns: &[&str]) {
    let main = root.join("ua1").join("main");
    let back = root.join("ua1").join("return");
    fs::create_dir_all(&main).unwrap();
    fs::create_dir_all(&back).unwrap();
    for flow in flows {
        fs::write(main.join(format!("{flow}.json")), r#"{"amount": 100}"#).unwrap();
    }
    for flow in returns {
        fs::write(back.join(format!("{flow}.json")), r#"{"amount": 100}"#).unwrap();
    }
}

pub fn status_record(tran: &str) -> Value {
    json!({
        "qualificationStatus": "QUALIFIED",
        "sanctionsStatus": "PASSED",
        "fundsControlStatus": "ACK",
        "postStatus": "ACK",
        "settStatus": "SETTLED",
        "tranStatus": tran
    })
}
