//! The remote session seam.
//!
//! Deckhand never talks to a socket directly. A transport implements
//! [`RemoteSession`]; the core only sees requests, responses and event
//! streams.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{EventKind, RemoteEvent};

/// Stream of events for one subscription.
pub type EventStream = BoxStream<'static, RemoteEvent>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{op} failed ({code}): {message}")]
    Remote {
        op: String,
        code: i64,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),
}

impl SessionError {
    /// Transport-level failures, as opposed to the remote refusing a request.
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::NotConnected | SessionError::Transport(_))
    }
}

/// A request/response plus event-subscription channel to the remote tool.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    async fn connect(&self, endpoint: &str, credential: Option<&str>) -> Result<(), SessionError>;

    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Send a named request and wait for its response payload.
    async fn request(&self, op: &str, params: Value) -> Result<Value, SessionError>;

    async fn subscribe(&self, kind: EventKind) -> Result<EventStream, SessionError>;
}

/// Typed helpers over [`RemoteSession::request`].
#[async_trait]
pub trait SessionExt: RemoteSession {
    /// Send typed params and decode a typed response.
    async fn call<P, R>(&self, op: &str, params: &P) -> Result<R, SessionError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| SessionError::Decode(format!("{} params: {}", op, e)))?;
        let response = self.request(op, params).await?;
        serde_json::from_value(response)
            .map_err(|e| SessionError::Decode(format!("{} response: {}", op, e)))
    }

    /// Send typed params and ignore the response body.
    async fn send<P>(&self, op: &str, params: &P) -> Result<(), SessionError>
    where
        P: Serialize + Sync,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| SessionError::Decode(format!("{} params: {}", op, e)))?;
        self.request(op, params).await.map(|_| ())
    }
}

impl<T: RemoteSession + ?Sized> SessionExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(SessionError::NotConnected.is_transport());
        assert!(SessionError::Transport("reset".into()).is_transport());
        let remote = SessionError::Remote {
            op: "SetInputMute".into(),
            code: 600,
            message: "no such input".into(),
        };
        assert!(!remote.is_transport());
        assert_eq!(remote.to_string(), "SetInputMute failed (600): no such input");
    }
}
