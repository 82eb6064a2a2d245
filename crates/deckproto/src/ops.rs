//! Request names and typed payloads for the remote operations Deckhand uses.
//!
//! Field names follow the remote tool's camelCase wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GET_SCENE_LIST: &str = "GetSceneList";
pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
pub const SET_SCENE_ITEM_ENABLED: &str = "SetSceneItemEnabled";
pub const GET_INPUT_LIST: &str = "GetInputList";
pub const GET_INPUT_SETTINGS: &str = "GetInputSettings";
pub const SET_INPUT_SETTINGS: &str = "SetInputSettings";
pub const GET_INPUT_MUTE: &str = "GetInputMute";
pub const SET_INPUT_MUTE: &str = "SetInputMute";
pub const GET_INPUT_VOLUME: &str = "GetInputVolume";
pub const SET_INPUT_VOLUME: &str = "SetInputVolume";
pub const PRESS_INPUT_PROPERTIES_BUTTON: &str = "PressInputPropertiesButton";
pub const TRIGGER_MEDIA_INPUT_ACTION: &str = "TriggerMediaInputAction";

/// Operations that control bindings may invoke. Everything else is refused.
pub const CONTROL_OPS: &[&str] = &[
    SET_SCENE_ITEM_ENABLED,
    SET_INPUT_SETTINGS,
    SET_INPUT_MUTE,
    SET_INPUT_VOLUME,
    PRESS_INPUT_PROPERTIES_BUTTON,
    TRIGGER_MEDIA_INPUT_ACTION,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneEntry {
    pub scene_name: String,
    #[serde(default)]
    pub scene_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneList {
    #[serde(default)]
    pub current_program_scene_name: Option<String>,
    #[serde(default)]
    pub current_preview_scene_name: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneEntry>,
}

impl SceneList {
    /// Scene names in the order the remote lists them.
    pub fn names(&self) -> Vec<String> {
        self.scenes.iter().map(|s| s.scene_name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNameParams {
    pub scene_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemEntry {
    pub scene_item_id: i64,
    pub source_name: String,
    #[serde(default)]
    pub scene_item_enabled: bool,
    #[serde(default)]
    pub scene_item_index: i64,
    #[serde(default)]
    pub input_kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneItemList {
    #[serde(default)]
    pub scene_items: Vec<SceneItemEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSceneItemEnabledParams {
    pub scene_name: String,
    pub scene_item_id: i64,
    pub scene_item_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputEntry {
    pub input_name: String,
    #[serde(default)]
    pub input_kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputList {
    #[serde(default)]
    pub inputs: Vec<InputEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputNameParams {
    pub input_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSettings {
    #[serde(default)]
    pub input_settings: Value,
    #[serde(default)]
    pub input_kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInputSettingsParams {
    pub input_name: String,
    pub input_settings: Value,
    /// Merge into existing settings rather than replacing them.
    pub overlay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMute {
    pub input_muted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInputMuteParams {
    pub input_name: String,
    pub input_muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputVolume {
    pub input_volume_mul: f64,
    #[serde(default)]
    pub input_volume_db: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetInputVolumeParams {
    pub input_name: String,
    pub input_volume_mul: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressInputPropertiesButtonParams {
    pub input_name: String,
    pub property_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMediaInputActionParams {
    pub input_name: String,
    pub media_action: String,
}
