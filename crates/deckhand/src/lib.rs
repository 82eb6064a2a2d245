//! Deckhand - remote control surface core
//!
//! Mirrors the items of one scene of a remote production tool, decorates
//! them with control panels, and keeps the two in step.
//!
//! # Overview
//!
//! The remote is reached through [`deckproto::RemoteSession`]. On top of it:
//!
//! - **Reconciliation**: generation-counted loads; the newest request wins
//!   and stale results are dropped ([`reconcile`])
//! - **Capabilities**: priority-ordered, fault-isolated providers that build
//!   panels ([`capability`])
//! - **Plugins**: sandboxed Lua providers, loaded lazily and watched for
//!   changes ([`plugin`])
//! - **Scenes**: program vs. local preview, with commit ([`scene`])
//! - **Classification**: a short-lived cache of input kinds and roles
//!   ([`context`])
//! - **Events**: remote events routed to all of the above ([`router`])
//!
//! [`app::AppContext`] owns the lot.

pub mod app;
pub mod capability;
pub mod context;
pub mod error;
pub mod host;
pub mod model;
pub mod panel;
pub mod plugin;
pub mod reconcile;
pub mod router;
pub mod scene;
pub mod telemetry;

pub use app::AppContext;
pub use capability::{CapabilityProvider, CapabilityRegistry, Origin, ProviderInfo};
pub use context::{Classifier, Context, ContextCache, Role};
pub use error::{DeckError, Result};
pub use model::{Item, ItemChanges, ItemId, MirrorEntry, MirrorOp, MirrorStatus, UiState};
pub use panel::{Binding, Control, Panel};
pub use plugin::{PluginBridge, PluginChange, PluginLoader};
pub use reconcile::{LoadOutcome, LoadReport, ReconciliationEngine};
pub use router::{subscribe_all, EventRouter};
pub use scene::{SceneState, SceneStateMachine};
