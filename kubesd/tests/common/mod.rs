#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use futures::stream;
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

use kubesd::types::SyncEvent;

/// One registered kind path: a canned list body plus a scriptable watch
/// stream.
#[derive(Clone)]
struct Fixture {
    list_body: String,
    frames_tx: broadcast::Sender<String>,
    watch_hits: Arc<AtomicUsize>,
    watch_queries: Arc<Mutex<Vec<String>>>,
    /// When false, watch streams end immediately after connecting, which
    /// drives the client's reconnect path.
    hold_open: bool,
}

#[derive(Default)]
struct ServerState {
    fixtures: Mutex<HashMap<String, Fixture>>,
}

/// In-process Kubernetes API server double.
///
/// Serves registered list bodies on plain GETs and long-lived frame streams
/// on `watch=1` GETs; frames are pushed live from the test body.
pub struct MockApiServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl MockApiServer {
    pub async fn spawn() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Registers a kind whose watch stream stays open and serves frames
    /// pushed through [`MockApiServer::push_frame`].
    pub async fn register(&self, path: &str, list_body: serde_json::Value) {
        self.register_with(path, list_body, true).await;
    }

    /// Registers a kind whose watch streams end immediately.
    pub async fn register_closing_watch(&self, path: &str, list_body: serde_json::Value) {
        self.register_with(path, list_body, false).await;
    }

    async fn register_with(&self, path: &str, list_body: serde_json::Value, hold_open: bool) {
        let (frames_tx, _) = broadcast::channel(64);
        let fixture = Fixture {
            list_body: list_body.to_string(),
            frames_tx,
            watch_hits: Arc::new(AtomicUsize::new(0)),
            watch_queries: Arc::new(Mutex::new(Vec::new())),
            hold_open,
        };
        self.state
            .fixtures
            .lock()
            .await
            .insert(path.to_string(), fixture);
    }

    /// Pushes one watch frame to every open stream of `path`.
    pub async fn push_frame(&self, path: &str, action: &str, object: serde_json::Value) {
        let frame = json!({"type": action, "object": object}).to_string() + "\n";
        let fixtures = self.state.fixtures.lock().await;
        let fixture = fixtures.get(path).expect("fixture not registered");
        let _ = fixture.frames_tx.send(frame);
    }

    /// Returns how many watch connections `path` has received.
    pub async fn watch_hits(&self, path: &str) -> usize {
        let fixtures = self.state.fixtures.lock().await;
        fixtures
            .get(path)
            .map(|fixture| fixture.watch_hits.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Returns the query strings of every watch connection to `path`.
    pub async fn watch_queries(&self, path: &str) -> Vec<String> {
        let fixtures = self.state.fixtures.lock().await;
        match fixtures.get(path) {
            Some(fixture) => fixture.watch_queries.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Waits until `path` has received at least `min` watch connections.
    pub async fn wait_for_watch_hits(&self, path: &str, min: usize) {
        self.wait_for_watch_hits_within(path, min, Duration::from_secs(5))
            .await;
    }

    /// Waits until `path` has received at least `min` watch connections,
    /// panicking after `timeout`.
    pub async fn wait_for_watch_hits_within(&self, path: &str, min: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.watch_hits(path).await < min {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {min} watch connections to {path}, got {}",
                    self.watch_hits(path).await
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockApiServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let query = uri.query().unwrap_or("").to_string();

    let fixture = {
        let fixtures = state.fixtures.lock().await;
        fixtures.get(&path).cloned()
    };
    let Some(fixture) = fixture else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let is_watch = query.split('&').any(|pair| pair == "watch=1");
    if !is_watch {
        return (
            [(header::CONTENT_TYPE, "application/json")],
            fixture.list_body.clone(),
        )
            .into_response();
    }

    fixture.watch_hits.fetch_add(1, Ordering::SeqCst);
    fixture.watch_queries.lock().await.push(query);

    if !fixture.hold_open {
        return (
            [(header::CONTENT_TYPE, "application/json")],
            Body::empty(),
        )
            .into_response();
    }

    let rx = fixture.frames_tx.subscribe();
    let frames = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(frame) => return Some((Ok::<_, Infallible>(frame.into_bytes()), rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Receives the next sync event, panicking after five seconds.
pub async fn recv_event(rx: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a sync event")
        .expect("the event channel closed unexpectedly")
}

/// Asserts that no event arrives within the given window.
pub async fn assert_no_event(rx: &mut mpsc::Receiver<SyncEvent>, window: Duration) {
    let received = tokio::time::timeout(window, rx.recv()).await;
    assert!(
        received.is_err(),
        "expected no sync event, got {:?}",
        received.unwrap()
    );
}

/// A pod with one container exposing ports 8080 (`http`) and 9090.
pub fn pod_object(name: &str, pod_ip: &str) -> serde_json::Value {
    json!({
        "metadata": {"name": name, "namespace": "ns1", "uid": format!("uid-{name}")},
        "spec": {
            "nodeName": "node-1",
            "containers": [{
                "name": "c1",
                "image": "app:1",
                "ports": [
                    {"name": "http", "containerPort": 8080, "protocol": "TCP"},
                    {"containerPort": 9090, "protocol": "TCP"}
                ]
            }]
        },
        "status": {
            "phase": "Running",
            "podIP": pod_ip,
            "hostIP": "172.16.0.5",
            "conditions": [{"type": "Ready", "status": "True"}]
        }
    })
}

/// A ClusterIP service named `svc1` in `ns1`.
pub fn service_object() -> serde_json::Value {
    json!({
        "metadata": {"name": "svc1", "namespace": "ns1"},
        "spec": {
            "type": "ClusterIP",
            "clusterIP": "10.96.0.10",
            "ports": [{"name": "http", "port": 80, "protocol": "TCP"}]
        }
    })
}

/// Endpoints for `svc1` pointing at `p1`'s port 8080.
pub fn endpoints_object() -> serde_json::Value {
    json!({
        "metadata": {"name": "svc1", "namespace": "ns1"},
        "subsets": [{
            "addresses": [{
                "ip": "10.0.0.1",
                "targetRef": {"kind": "Pod", "namespace": "ns1", "name": "p1"}
            }],
            "ports": [{"name": "http", "port": 8080, "protocol": "TCP"}]
        }]
    })
}

/// Wraps items into a Kubernetes list response body.
pub fn list_body(resource_version: &str, items: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "metadata": {"resourceVersion": resource_version},
        "items": items
    })
}
