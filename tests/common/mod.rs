#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use lawmatics_mcp::mcp::catalog::EndpointCatalog;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> MockReply + Send + Sync>;

#[derive(Clone)]
struct MockState {
    requests: Arc<StdMutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

/// In-process upstream that records every request and answers through a closure.
pub struct MockUpstream {
    pub base_url: String,
    requests: Arc<StdMutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
    {
        let requests = Arc::new(StdMutex::new(Vec::new()));
        let state = MockState {
            requests: requests.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(record).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{}", addr),
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path equals `path` exactly.
    pub fn hits(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    pub fn total_hits(&self) -> usize {
        self.requests().len()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = uri
        .query()
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .unwrap_or_default();
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let request = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let reply = (state.responder)(&request);
    state.requests.lock().unwrap().push(request);
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
}

/// Small endpoint catalog pointing its OAuth2 token URL at `base_url`.
pub fn test_catalog(base_url: &str) -> EndpointCatalog {
    let raw = serde_json::json!({
        "securitySchemes": {
            "oauth2": {
                "type": "oauth2",
                "flows": { "clientCredentials": { "tokenUrl": format!("{}/oauth/token", base_url), "scopes": {} } }
            },
            "bearerAuth": { "type": "http", "scheme": "bearer" }
        },
        "tools": [
            {
                "name": "get_matter",
                "description": "Fetch one matter",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "prospectId": { "type": "string" },
                        "fields": { "type": "string" }
                    },
                    "required": ["prospectId"]
                },
                "method": "GET",
                "pathTemplate": "/prospects/{prospectId}",
                "executionParameters": [
                    { "name": "prospectId", "in": "path" },
                    { "name": "fields", "in": "query" }
                ],
                "securityRequirements": [ { "oauth2": [] }, { "bearerAuth": [] } ]
            },
            {
                "name": "broken_path",
                "description": "Declares a placeholder no parameter fills",
                "inputSchema": { "type": "object", "properties": {} },
                "method": "GET",
                "pathTemplate": "/prospects/{missing}",
                "executionParameters": [],
                "securityRequirements": []
            },
            {
                "name": "create_note",
                "description": "Create a note",
                "inputSchema": {
                    "type": "object",
                    "properties": { "requestBody": { "type": "object" } },
                    "required": ["requestBody"]
                },
                "method": "POST",
                "pathTemplate": "/notes",
                "executionParameters": [],
                "requestBodyContentType": "application/json",
                "securityRequirements": [ { "bearerAuth": [] } ]
            }
        ]
    });
    EndpointCatalog::from_json(&raw.to_string()).unwrap()
}
