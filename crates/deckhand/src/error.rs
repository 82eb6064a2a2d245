use deckproto::SessionError;
use thiserror::Error;

use crate::model::ItemId;

/// Errors surfaced to whoever drives the core (UI, CLI, tests).
///
/// Provider and plugin faults never show up here; they are logged and
/// isolated where they happen.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("not connected")]
    NotConnected,

    #[error("unknown scene '{0}'")]
    UnknownScene(String),

    #[error("no item {0} in the mirror")]
    UnknownItem(ItemId),

    #[error("item {item} has no control '{control}'")]
    UnknownControl { item: ItemId, control: String },

    #[error("operation '{0}' is not allowed from a control")]
    ForbiddenOp(String),

    #[error("no usable plugin directory: {0}")]
    PluginDir(String),
}

pub type Result<T, E = DeckError> = std::result::Result<T, E>;
