#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use oci_registry::ClientBuilder;

/// A canned answer for one request.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn json(value: &Value) -> Self {
        Self::status(200)
            .header("content-type", "application/json")
            .body(serde_json::to_vec(value).unwrap())
    }

    pub fn bytes(data: Vec<u8>) -> Self {
        Self::status(200).body(data)
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302).header("location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// What the mock saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub path_and_query: String,
    /// Header names are lowercase
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, VecDeque<MockResponse>>,
    requests: Vec<RecordedRequest>,
}

impl MockState {
    /// Queued responses are served in order; the last one keeps answering.
    fn respond(&mut self, path_and_query: &str, path: &str) -> MockResponse {
        let key = if self.routes.contains_key(path_and_query) {
            path_and_query
        } else {
            path
        };
        match self.routes.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => MockResponse::status(404).body(format!("no route for {}", path_and_query)),
        }
    }
}

type Shared = Arc<Mutex<MockState>>;

/// An in-process registry on 127.0.0.1 with scripted responses.
pub struct MockRegistry {
    pub port: u16,
    state: Shared,
}

impl MockRegistry {
    pub fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        listener.set_nonblocking(true).unwrap();

        let app_state = Arc::clone(&state);
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let app = Router::new().fallback(handle).with_state(app_state);
                axum::serve(listener, app).await.unwrap();
            });
        });

        MockRegistry { port, state }
    }

    /// Base URL using the IP address.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Same server under a different host name.
    pub fn other_host_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Queue a response for a path (optionally with query string).
    pub fn on(&self, path: &str, response: MockResponse) -> &Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Client pointed at this registry, with its token endpoint at `/token`.
    pub fn client(&self) -> ClientBuilder {
        oci_registry::Client::builder()
            .host(self.url())
            .auth_realm(format!("{}/token", self.url()))
            .auth_service("registry.test")
    }

    /// Serve an anonymous token at `/token`.
    pub fn with_token(&self, token: &str) -> &Self {
        self.on("/token", MockResponse::json(&serde_json::json!({ "token": token })))
    }
}

async fn handle(State(state): State<Shared>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let headers = request
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let canned = {
        let mut state = state.lock().unwrap();
        state.requests.push(RecordedRequest {
            path: path.clone(),
            path_and_query: path_and_query.clone(),
            headers,
        });
        state.respond(&path_and_query, &path)
    };

    let mut builder = Response::builder().status(StatusCode::from_u16(canned.status).unwrap());
    for (name, value) in &canned.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Body::from(canned.body)).unwrap()
}

/// `sha256:` digest with `n` as its hex value.
pub fn digest(n: u64) -> String {
    format!("sha256:{:064x}", n)
}

/// Uncompressed, finished tar with the given regular files.
pub fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A gzip-compressed layer holding `files`.
pub fn layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    gzip(&tar_bytes(files))
}
