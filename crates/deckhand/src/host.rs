//! Typed remote operations shared by built-in providers, plugins and the
//! app context. The only path from a control or a plugin to the session.

use std::sync::Arc;

use deckproto::ops::{
    self, InputList, InputMute, InputNameParams, InputSettings, InputVolume,
    PressInputPropertiesButtonParams, SceneItemList, SceneList, SceneNameParams,
    SetInputMuteParams, SetInputSettingsParams, SetInputVolumeParams, SetSceneItemEnabledParams,
    TriggerMediaInputActionParams,
};
use deckproto::{RemoteSession, SessionExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{DeckError, Result};
use crate::model::ItemId;

#[derive(Clone)]
pub struct Host {
    session: Arc<dyn RemoteSession>,
}

impl Host {
    pub fn new(session: Arc<dyn RemoteSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<dyn RemoteSession> {
        &self.session
    }

    pub async fn list_scenes(&self) -> Result<SceneList> {
        Ok(self.session.call(ops::GET_SCENE_LIST, &json!({})).await?)
    }

    pub async fn set_program_scene(&self, scene: &str) -> Result<()> {
        let params = SceneNameParams {
            scene_name: scene.to_string(),
        };
        Ok(self.session.send(ops::SET_CURRENT_PROGRAM_SCENE, &params).await?)
    }

    pub async fn list_items(&self, scene: &str) -> Result<SceneItemList> {
        let params = SceneNameParams {
            scene_name: scene.to_string(),
        };
        Ok(self.session.call(ops::GET_SCENE_ITEM_LIST, &params).await?)
    }

    pub async fn set_item_enabled(&self, scene: &str, id: ItemId, enabled: bool) -> Result<()> {
        let params = SetSceneItemEnabledParams {
            scene_name: scene.to_string(),
            scene_item_id: id,
            scene_item_enabled: enabled,
        };
        Ok(self.session.send(ops::SET_SCENE_ITEM_ENABLED, &params).await?)
    }

    pub async fn list_inputs(&self) -> Result<InputList> {
        Ok(self.session.call(ops::GET_INPUT_LIST, &json!({})).await?)
    }

    pub async fn get_settings(&self, input: &str) -> Result<InputSettings> {
        Ok(self.session.call(ops::GET_INPUT_SETTINGS, &input_params(input)).await?)
    }

    /// Merge `settings` into the input's current settings.
    pub async fn set_settings(&self, input: &str, settings: Value) -> Result<()> {
        let params = SetInputSettingsParams {
            input_name: input.to_string(),
            input_settings: settings,
            overlay: true,
        };
        Ok(self.session.send(ops::SET_INPUT_SETTINGS, &params).await?)
    }

    pub async fn get_mute(&self, input: &str) -> Result<bool> {
        let mute: InputMute = self
            .session
            .call(ops::GET_INPUT_MUTE, &input_params(input))
            .await?;
        Ok(mute.input_muted)
    }

    pub async fn set_mute(&self, input: &str, muted: bool) -> Result<()> {
        let params = SetInputMuteParams {
            input_name: input.to_string(),
            input_muted: muted,
        };
        Ok(self.session.send(ops::SET_INPUT_MUTE, &params).await?)
    }

    /// Linear volume multiplier (0.0 ..= 1.0 for unity and below).
    pub async fn get_volume(&self, input: &str) -> Result<f64> {
        let volume: InputVolume = self
            .session
            .call(ops::GET_INPUT_VOLUME, &input_params(input))
            .await?;
        Ok(volume.input_volume_mul)
    }

    pub async fn set_volume(&self, input: &str, volume_mul: f64) -> Result<()> {
        let params = SetInputVolumeParams {
            input_name: input.to_string(),
            input_volume_mul: volume_mul,
        };
        Ok(self.session.send(ops::SET_INPUT_VOLUME, &params).await?)
    }

    pub async fn press_button(&self, input: &str, property: &str) -> Result<()> {
        let params = PressInputPropertiesButtonParams {
            input_name: input.to_string(),
            property_name: property.to_string(),
        };
        Ok(self
            .session
            .send(ops::PRESS_INPUT_PROPERTIES_BUTTON, &params)
            .await?)
    }

    pub async fn trigger_media(&self, input: &str, action: &str) -> Result<()> {
        let params = TriggerMediaInputActionParams {
            input_name: input.to_string(),
            media_action: action.to_string(),
        };
        Ok(self
            .session
            .send(ops::TRIGGER_MEDIA_INPUT_ACTION, &params)
            .await?)
    }

    /// Run a control binding. Only operations in [`ops::CONTROL_OPS`] pass.
    pub async fn invoke(&self, op: &str, params: Value) -> Result<Value> {
        if !ops::CONTROL_OPS.contains(&op) {
            return Err(DeckError::ForbiddenOp(op.to_string()));
        }
        debug!(op, "invoking control binding");
        Ok(self.session.request(op, params).await?)
    }
}

fn input_params(input: &str) -> InputNameParams {
    InputNameParams {
        input_name: input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckproto::ScriptedSession;

    #[tokio::test]
    async fn test_invoke_refuses_unlisted_ops() {
        let session = Arc::new(ScriptedSession::connected());
        let host = Host::new(session.clone());

        let err = host
            .invoke(ops::SET_CURRENT_PROGRAM_SCENE, json!({"sceneName": "Live"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DeckError::ForbiddenOp(_)));
        assert!(session.requests().is_empty());
    }

    #[tokio::test]
    async fn test_set_settings_overlays() {
        let session = Arc::new(ScriptedSession::connected());
        session.respond(ops::SET_INPUT_SETTINGS, json!({}));
        let host = Host::new(session.clone());

        host.set_settings("_txt", json!({"text": "hi"})).await.unwrap();
        let sent = session.requests_for(ops::SET_INPUT_SETTINGS);
        assert_eq!(
            sent[0],
            json!({"inputName": "_txt", "inputSettings": {"text": "hi"}, "overlay": true})
        );
    }

    #[tokio::test]
    async fn test_get_volume_reads_multiplier() {
        let session = Arc::new(ScriptedSession::connected());
        session.respond(
            ops::GET_INPUT_VOLUME,
            json!({"inputVolumeMul": 0.25, "inputVolumeDb": -12.0}),
        );
        let host = Host::new(session);
        assert_eq!(host.get_volume("_mic1").await.unwrap(), 0.25);
    }
}
