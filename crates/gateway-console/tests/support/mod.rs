//! In-process fake of the gateway backend.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use gateway_console::{ConsoleConfig, SyncConfig};

pub const LOCAL_FILES: &[&str] = &["traccar", "homeassistant"];

#[derive(Debug, Default)]
pub struct BackendState {
    pub services: Vec<Value>,
    /// Emit `ETag` and honour `If-Match`
    pub versioned: bool,
    pub version: u64,
    /// Number of upcoming pushes to answer with 503
    pub fail_pushes: usize,
    /// Number of upcoming pushes to store but answer with 504
    pub lost_acks: usize,
    /// Accepted push bodies
    pub pushes: Vec<Value>,
    /// `If-Match` header of every push request, accepted or not
    pub if_match_seen: Vec<Option<String>>,
}

impl BackendState {
    fn etag(&self) -> String {
        format!("\"{}\"", self.version)
    }
}

type Shared = Arc<Mutex<BackendState>>;

pub struct FakeBackend {
    pub addr: SocketAddr,
    state: Shared,
}

impl FakeBackend {
    pub fn start(services: Value, versioned: bool) -> Self {
        let state = Arc::new(Mutex::new(BackendState {
            services: services.as_array().cloned().unwrap_or_default(),
            versioned,
            version: 1,
            ..Default::default()
        }));

        let routes = routes(state.clone());
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ConsoleConfig {
        let mut config = ConsoleConfig::default().with_backend_url(self.url());
        config.sync = SyncConfig {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        };
        config
    }

    pub fn services(&self) -> Vec<Value> {
        self.state.lock().unwrap().services.clone()
    }

    pub fn pushes(&self) -> Vec<Value> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn if_match_seen(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().if_match_seen.clone()
    }

    pub fn fail_next_pushes(&self, count: usize) {
        self.state.lock().unwrap().fail_pushes = count;
    }

    pub fn lose_next_acks(&self, count: usize) {
        self.state.lock().unwrap().lost_acks = count;
    }

    /// Simulate another operator committing a snapshot.
    pub fn bump_version(&self) {
        self.state.lock().unwrap().version += 1;
    }
}

pub fn tides() -> Value {
    json!({"name": "tides", "endpoint": "https://a/api", "swagger": "swagger/docs/v1"})
}

pub fn pushed_names(push: &Value) -> Vec<String> {
    push["services"]
        .as_array()
        .map(|services| {
            services
                .iter()
                .filter_map(|s| s["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn with_state(
    state: Shared,
) -> impl Filter<Extract = (Shared,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn status(body: &'static str, code: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(body, code).into_response()
}

fn versioned_json(state: &BackendState, body: &Value) -> warp::reply::Response {
    let reply = warp::reply::json(body);
    if state.versioned {
        warp::reply::with_header(reply, "etag", state.etag()).into_response()
    } else {
        reply.into_response()
    }
}

fn routes(state: Shared) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let services = warp::path!("services")
        .and(warp::get())
        .and(with_state(state.clone()))
        .map(|state: Shared| {
            let state = state.lock().unwrap();
            versioned_json(&state, &Value::Array(state.services.clone()))
        });

    let update = warp::path!("update")
        .and(warp::post())
        .and(warp::header::optional::<String>("if-match"))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .map(|if_match: Option<String>, body: Value, state: Shared| {
            let mut state = state.lock().unwrap();
            state.if_match_seen.push(if_match.clone());

            if state.fail_pushes > 0 {
                state.fail_pushes -= 1;
                return status("upstream busy", StatusCode::SERVICE_UNAVAILABLE);
            }
            if state.versioned {
                if let Some(tag) = if_match {
                    if tag != state.etag() {
                        return status("stale snapshot", StatusCode::PRECONDITION_FAILED);
                    }
                }
            }

            state.services = body["services"].as_array().cloned().unwrap_or_default();
            state.pushes.push(body);
            state.version += 1;
            if state.lost_acks > 0 {
                state.lost_acks -= 1;
                return status("upstream timed out", StatusCode::GATEWAY_TIMEOUT);
            }
            versioned_json(&state, &Value::Array(state.services.clone()))
        });

    let check = warp::path!("check-website")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|query: HashMap<String, String>| {
            let exists = query
                .get("url")
                .is_some_and(|url| url.starts_with("https://") && !url.contains("down"));
            warp::reply::json(&json!({ "exists": exists }))
        });

    let original = warp::path("origswagger")
        .and(warp::get())
        .and(warp::path::full())
        .map(|full: warp::path::FullPath| format!("proxied {}", full.as_str()));

    let swagger = warp::path!("swagger" / String)
        .and(warp::get())
        .map(|name: String| warp::reply::html(format!("<html>test {}</html>", name)));

    let openapi = warp::path!("openapi" / String)
        .and(warp::get())
        .map(|name: String| {
            let mut paths = serde_json::Map::new();
            paths.insert(format!("/{}/ping", name), json!({}));
            warp::reply::json(&json!({
                "openapi": "3.1.0",
                "info": {"title": "API Gateway"},
                "paths": paths
            }))
        });

    let files = warp::path!("files")
        .and(warp::get())
        .map(|| warp::reply::json(&LOCAL_FILES));

    let swagger_file = warp::path!("swaggerfile" / String)
        .and(warp::get())
        .map(|name: String| {
            if LOCAL_FILES.contains(&name.as_str()) {
                let page = warp::reply::html(format!("<html>file {}</html>", name));
                page.into_response()
            } else {
                status("no such document", StatusCode::NOT_FOUND)
            }
        });

    let registry = services.or(update).boxed();
    let queries = check
        .or(original)
        .or(swagger)
        .or(openapi)
        .or(files)
        .or(swagger_file)
        .boxed();

    registry.or(queries)
}
