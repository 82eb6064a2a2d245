//! Mirrored item state.

use serde::{Deserialize, Serialize};

use crate::panel::Panel;

/// Remote scene item id, unique within one container.
pub type ItemId = i64;

/// A controllable remote item as the mirror sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// The remote identifier, prefix included.
    pub raw_name: String,
    pub display_name: String,
    /// Remote input kind, empty when unknown.
    pub kind: String,
    pub enabled: bool,
}

/// Local-only presentation state that survives reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiState {
    pub expanded: bool,
}

/// One row of the local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub item: Item,
    pub panel: Panel,
    /// At least one capability provider decorated this item.
    pub has_capabilities: bool,
    pub ui: UiState,
}

/// In-place changes to an existing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.display_name.is_none()
    }
}

/// A single mutation applied to the mirror by a reconciliation pass.
///
/// Rendering backends replay these instead of diffing a widget tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MirrorOp {
    Add { item: Item },
    Update {
        id: ItemId,
        changes: ItemChanges,
        /// Providers were re-run and the panel replaced.
        refreshed: bool,
    },
    Remove { id: ItemId },
    Reorder { ids: Vec<ItemId> },
}

/// What the mirror currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum MirrorStatus {
    #[default]
    Idle,
    Ready,
    /// The container has no items following the naming convention.
    Empty,
    Error(String),
}
