//! deckproto - the contract between Deckhand and a remote production tool.
//!
//! Deckhand drives a live production tool (scenes, sources, audio) over a
//! request/response channel plus event subscriptions. This crate holds only
//! the contract:
//!
//! - [`RemoteSession`]: the transport seam. Implementations own sockets,
//!   authentication and timeouts.
//! - [`RemoteEvent`] / [`EventKind`]: the events the core reacts to, using
//!   the remote tool's wire names.
//! - [`ops`]: request names and typed payloads (camelCase on the wire).
//! - [`ScriptedSession`]: an in-memory session for tests.
//!
//! ```ignore
//! use deckproto::{ops, RemoteSession, SessionExt};
//!
//! let scenes: ops::SceneList = session.call(ops::GET_SCENE_LIST, &serde_json::json!({})).await?;
//! ```

pub mod event;
pub mod ops;
pub mod scripted;
pub mod session;

pub use event::{EventKind, RemoteEvent};
pub use scripted::{Gate, RecordedRequest, ScriptedSession};
pub use session::{EventStream, RemoteSession, SessionError, SessionExt};
