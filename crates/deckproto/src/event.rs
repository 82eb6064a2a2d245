//! Remote event taxonomy.
//!
//! Events arrive as `{ "eventType": ..., "eventData": {...} }`. Only the
//! events Deckhand reacts to are modelled; anything else fails to parse and
//! is dropped by the transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::SceneEntry;
use crate::SessionError;

/// Subscription key for a family of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SceneChanged,
    SceneItemChanged,
    SceneListChanged,
    SceneItemsReordered,
    SceneItemCreated,
    SceneItemRemoved,
    InputMuteChanged,
    InputVolumeChanged,
    InputNameChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::SceneChanged,
        EventKind::SceneItemChanged,
        EventKind::SceneListChanged,
        EventKind::SceneItemsReordered,
        EventKind::SceneItemCreated,
        EventKind::SceneItemRemoved,
        EventKind::InputMuteChanged,
        EventKind::InputVolumeChanged,
        EventKind::InputNameChanged,
    ];

    /// Short topic name, also what plugins see in `on_remote_update`.
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::SceneChanged => "scene-changed",
            EventKind::SceneItemChanged => "scene-item-changed",
            EventKind::SceneListChanged => "scene-list-changed",
            EventKind::SceneItemsReordered => "scene-items-reordered",
            EventKind::SceneItemCreated => "scene-item-created",
            EventKind::SceneItemRemoved => "scene-item-removed",
            EventKind::InputMuteChanged => "input-mute-changed",
            EventKind::InputVolumeChanged => "input-volume-changed",
            EventKind::InputNameChanged => "input-name-changed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// An event pushed by the remote tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "eventData")]
pub enum RemoteEvent {
    #[serde(rename_all = "camelCase")]
    CurrentProgramSceneChanged { scene_name: String },

    #[serde(rename_all = "camelCase")]
    SceneItemEnableStateChanged {
        scene_name: String,
        scene_item_id: i64,
        scene_item_enabled: bool,
    },

    #[serde(rename_all = "camelCase")]
    SceneListChanged {
        #[serde(default)]
        scenes: Vec<SceneEntry>,
    },

    #[serde(rename_all = "camelCase")]
    SceneItemListReindexed { scene_name: String },

    #[serde(rename_all = "camelCase")]
    SceneItemCreated {
        scene_name: String,
        scene_item_id: i64,
        #[serde(default)]
        source_name: String,
    },

    #[serde(rename_all = "camelCase")]
    SceneItemRemoved {
        scene_name: String,
        scene_item_id: i64,
        #[serde(default)]
        source_name: String,
    },

    #[serde(rename_all = "camelCase")]
    InputMuteStateChanged { input_name: String, input_muted: bool },

    #[serde(rename_all = "camelCase")]
    InputVolumeChanged {
        input_name: String,
        input_volume_mul: f64,
        #[serde(default)]
        input_volume_db: f64,
    },

    #[serde(rename_all = "camelCase")]
    InputNameChanged {
        old_input_name: String,
        input_name: String,
    },
}

impl RemoteEvent {
    /// Parse an event from its wire type and payload.
    pub fn from_wire(event_type: &str, data: Value) -> Result<Self, SessionError> {
        let envelope = serde_json::json!({ "eventType": event_type, "eventData": data });
        serde_json::from_value(envelope)
            .map_err(|e| SessionError::Decode(format!("{} event: {}", event_type, e)))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RemoteEvent::CurrentProgramSceneChanged { .. } => EventKind::SceneChanged,
            RemoteEvent::SceneItemEnableStateChanged { .. } => EventKind::SceneItemChanged,
            RemoteEvent::SceneListChanged { .. } => EventKind::SceneListChanged,
            RemoteEvent::SceneItemListReindexed { .. } => EventKind::SceneItemsReordered,
            RemoteEvent::SceneItemCreated { .. } => EventKind::SceneItemCreated,
            RemoteEvent::SceneItemRemoved { .. } => EventKind::SceneItemRemoved,
            RemoteEvent::InputMuteStateChanged { .. } => EventKind::InputMuteChanged,
            RemoteEvent::InputVolumeChanged { .. } => EventKind::InputVolumeChanged,
            RemoteEvent::InputNameChanged { .. } => EventKind::InputNameChanged,
        }
    }

    /// The input this event is about, for input-scoped events.
    ///
    /// Renames report the old name, since that is what providers keyed their
    /// state on.
    pub fn input_name(&self) -> Option<&str> {
        match self {
            RemoteEvent::InputMuteStateChanged { input_name, .. }
            | RemoteEvent::InputVolumeChanged { input_name, .. } => Some(input_name),
            RemoteEvent::InputNameChanged { old_input_name, .. } => Some(old_input_name),
            _ => None,
        }
    }

    /// The scene this event is about, for scene-scoped events.
    pub fn scene_name(&self) -> Option<&str> {
        match self {
            RemoteEvent::CurrentProgramSceneChanged { scene_name }
            | RemoteEvent::SceneItemEnableStateChanged { scene_name, .. }
            | RemoteEvent::SceneItemListReindexed { scene_name }
            | RemoteEvent::SceneItemCreated { scene_name, .. }
            | RemoteEvent::SceneItemRemoved { scene_name, .. } => Some(scene_name),
            _ => None,
        }
    }

    /// The event payload without its type tag.
    pub fn data(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("eventData").map(Value::take))
            .unwrap_or(Value::Null)
    }
}
