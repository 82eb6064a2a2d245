//! In-memory session driven by canned responses.
//!
//! Used by tests and by the offline CLI commands. Responses are produced by
//! per-operation handlers, individual calls can be held back with a [`Gate`]
//! to force interleavings, and every request is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::event::{EventKind, RemoteEvent};
use crate::session::{EventStream, RemoteSession, SessionError};

type Handler = Arc<dyn Fn(&Value) -> Result<Value, SessionError> + Send + Sync>;

/// A request the session received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub op: String,
    pub params: Value,
}

/// Holds back one call until released or dropped.
pub struct Gate {
    tx: Option<oneshot::Sender<()>>,
}

impl Gate {
    pub fn release(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

pub struct ScriptedSession {
    connected: AtomicBool,
    handlers: Mutex<HashMap<String, Handler>>,
    gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<()>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    events: broadcast::Sender<RemoteEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedSession {
    /// A disconnected session with no handlers.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connected: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            events,
        }
    }

    /// A session that is already connected.
    pub fn connected() -> Self {
        let session = Self::new();
        session.connected.store(true, Ordering::SeqCst);
        session
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Answer `op` with whatever `handler` returns for the request params.
    pub fn on<F>(&self, op: &str, handler: F) -> &Self
    where
        F: Fn(&Value) -> Result<Value, SessionError> + Send + Sync + 'static,
    {
        lock(&self.handlers).insert(op.to_string(), Arc::new(handler));
        self
    }

    /// Answer `op` with a fixed payload.
    pub fn respond(&self, op: &str, response: Value) -> &Self {
        self.on(op, move |_| Ok(response.clone()))
    }

    /// Fail every `op` request with `error`.
    pub fn fail(&self, op: &str, error: SessionError) -> &Self {
        self.on(op, move |_| Err(error.clone()))
    }

    /// Hold back the next `op` request until the returned gate is released.
    pub fn gate(&self, op: &str) -> Gate {
        let (tx, rx) = oneshot::channel();
        lock(&self.gates)
            .entry(op.to_string())
            .or_default()
            .push_back(rx);
        Gate { tx: Some(tx) }
    }

    /// Push an event to every matching subscription. Returns receiver count.
    pub fn emit(&self, event: RemoteEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Params of every recorded `op` request, oldest first.
    pub fn requests_for(&self, op: &str) -> Vec<Value> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.op == op)
            .map(|r| r.params.clone())
            .collect()
    }

    pub fn request_count(&self, op: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.op == op).count()
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn connect(&self, endpoint: &str, _credential: Option<&str>) -> Result<(), SessionError> {
        debug!(endpoint, "scripted session connected");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn request(&self, op: &str, params: Value) -> Result<Value, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }

        lock(&self.requests).push(RecordedRequest {
            op: op.to_string(),
            params: params.clone(),
        });

        let gate = lock(&self.gates).get_mut(op).and_then(|q| q.pop_front());
        if let Some(rx) = gate {
            // A dropped gate counts as released
            let _ = rx.await;
        }

        let handler = lock(&self.handlers).get(op).cloned();
        match handler {
            Some(handler) => handler(&params),
            None => Err(SessionError::Remote {
                op: op.to_string(),
                code: 204,
                message: "unknown request type".to_string(),
            }),
        }
    }

    async fn subscribe(&self, kind: EventKind) -> Result<EventStream, SessionError> {
        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.kind() == kind => return Some((event, rx)),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
