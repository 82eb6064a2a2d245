//! Built-in capability providers.
//!
//! | provider | priority | role |
//! |----------|----------|------|
//! | [`BrowserSourceProvider`] | 10 | browser |
//! | [`MicrophoneProvider`] | 8 | microphone |
//! | [`AudioOutputProvider`] | 8 | audio output |
//! | [`TextSourceProvider`] | 5 | text |
//!
//! External plugins join through the plugin bridge at priority -100.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deckproto::ops;
use deckproto::RemoteEvent;
use serde_json::{json, Value};

use super::CapabilityProvider;
use crate::context::{Context, Role};
use crate::host::Host;
use crate::model::Item;
use crate::panel::{query_params, Binding, Control, Panel};

/// All built-in providers, ready to register.
pub fn providers(host: &Arc<Host>) -> Vec<Arc<dyn CapabilityProvider>> {
    vec![
        Arc::new(BrowserSourceProvider::new(host.clone())),
        Arc::new(MicrophoneProvider::new(host.clone())),
        Arc::new(AudioOutputProvider::new(host.clone())),
        Arc::new(TextSourceProvider::new(host.clone())),
    ]
}

/// Last mute/volume the remote side reported for one input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioState {
    pub muted: Option<bool>,
    pub volume_mul: Option<f64>,
}

/// Mute and volume tracking shared by every audio-capable provider.
#[derive(Default)]
struct AudioTracker {
    states: Mutex<HashMap<String, AudioState>>,
}

impl AudioTracker {
    fn get(&self, source: &str) -> Option<AudioState> {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(source)
            .copied()
    }

    fn seed(&self, source: &str, state: AudioState) {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(source.to_string(), state);
    }

    /// Update a source this provider already built controls for; events for
    /// any other input are ignored.
    fn update(&self, source: &str, f: impl FnOnce(&mut AudioState)) {
        let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(state) = states.get_mut(source) {
            f(state);
        }
    }

    fn forget(&self, source: &str) {
        self.states
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(source);
    }

    fn observe(&self, event: &RemoteEvent) {
        match event {
            RemoteEvent::InputMuteStateChanged {
                input_name,
                input_muted,
            } => self.update(input_name, |s| s.muted = Some(*input_muted)),
            RemoteEvent::InputVolumeChanged {
                input_name,
                input_volume_mul,
                ..
            } => self.update(input_name, |s| s.volume_mul = Some(*input_volume_mul)),
            RemoteEvent::InputNameChanged {
                old_input_name,
                input_name,
            } => {
                let mut states = self.states.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(state) = states.remove(old_input_name) {
                    states.insert(input_name.clone(), state);
                }
            }
            _ => {}
        }
    }

    /// Mute toggle plus volume slider, seeded from the remote.
    async fn controls(&self, host: &Host, panel: &mut Panel, source: &str) -> anyhow::Result<()> {
        let muted = host.get_mute(source).await?;
        let volume = host.get_volume(source).await?;
        self.seed(
            source,
            AudioState {
                muted: Some(muted),
                volume_mul: Some(volume),
            },
        );

        panel.add(Control::Toggle {
            id: "mute".to_string(),
            label: "Mute".to_string(),
            value: muted,
            binding: Some(
                Binding::new(ops::SET_INPUT_MUTE, json!({ "inputName": source }))
                    .with_value_path("inputMuted"),
            ),
        });
        panel.add(Control::Slider {
            id: "volume".to_string(),
            label: "Volume".to_string(),
            min: 0.0,
            max: 1.0,
            value: volume,
            binding: Some(
                Binding::new(ops::SET_INPUT_VOLUME, json!({ "inputName": source }))
                    .with_value_path("inputVolumeMul"),
            ),
        });
        Ok(())
    }
}

/// URL editor with query parameters, hard refresh, and audio controls.
pub struct BrowserSourceProvider {
    host: Arc<Host>,
    audio: AudioTracker,
}

impl BrowserSourceProvider {
    pub fn new(host: Arc<Host>) -> Self {
        Self {
            host,
            audio: AudioTracker::default(),
        }
    }

    pub fn audio_state(&self, source: &str) -> Option<AudioState> {
        self.audio.get(source)
    }
}

#[async_trait]
impl CapabilityProvider for BrowserSourceProvider {
    fn name(&self) -> &str {
        "BrowserSourceProvider"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn is_applicable(&self, item: &Item, ctx: &Context) -> anyhow::Result<bool> {
        Ok(ctx.has_role(&item.raw_name, Role::Browser))
    }

    async fn apply(&self, panel: &mut Panel, item: &Item, _ctx: &Context) -> anyhow::Result<()> {
        let source = item.raw_name.as_str();
        let settings = self.host.get_settings(source).await?;
        panel.set_icon(Role::Browser.icon());

        // No URL configured yet: nothing to edit.
        let Some(url) = settings.input_settings.get("url").and_then(Value::as_str) else {
            return Ok(());
        };

        panel.add(Control::Url {
            id: "url".to_string(),
            label: "Link".to_string(),
            value: url.to_string(),
            params: query_params(url),
            binding: Some(
                Binding::new(
                    ops::SET_INPUT_SETTINGS,
                    json!({ "inputName": source, "overlay": true }),
                )
                .with_value_path("inputSettings/url"),
            ),
        });
        panel.add(Control::Button {
            id: "hard_refresh".to_string(),
            label: "Hard Refresh".to_string(),
            binding: Some(Binding::new(
                ops::PRESS_INPUT_PROPERTIES_BUTTON,
                json!({ "inputName": source, "propertyName": "refreshnocache" }),
            )),
        });
        self.audio.controls(&self.host, panel, source).await
    }

    async fn cleanup(&self, source: &str) -> anyhow::Result<()> {
        self.audio.forget(source);
        Ok(())
    }

    async fn on_remote_event(&self, _source: &str, event: &RemoteEvent) -> anyhow::Result<()> {
        self.audio.observe(event);
        Ok(())
    }
}

macro_rules! audio_provider {
    ($(#[$doc:meta])* $ty:ident, $name:literal, $role:expr) => {
        $(#[$doc])*
        pub struct $ty {
            host: Arc<Host>,
            audio: AudioTracker,
        }

        impl $ty {
            pub fn new(host: Arc<Host>) -> Self {
                Self {
                    host,
                    audio: AudioTracker::default(),
                }
            }

            pub fn audio_state(&self, source: &str) -> Option<AudioState> {
                self.audio.get(source)
            }
        }

        #[async_trait]
        impl CapabilityProvider for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> &str {
                "1.0.0"
            }

            fn priority(&self) -> i32 {
                8
            }

            async fn is_applicable(&self, item: &Item, ctx: &Context) -> anyhow::Result<bool> {
                Ok(ctx.has_role(&item.raw_name, $role))
            }

            async fn apply(
                &self,
                panel: &mut Panel,
                item: &Item,
                _ctx: &Context,
            ) -> anyhow::Result<()> {
                panel.set_icon($role.icon());
                self.audio.controls(&self.host, panel, &item.raw_name).await
            }

            async fn cleanup(&self, source: &str) -> anyhow::Result<()> {
                self.audio.forget(source);
                Ok(())
            }

            async fn on_remote_event(
                &self,
                _source: &str,
                event: &RemoteEvent,
            ) -> anyhow::Result<()> {
                self.audio.observe(event);
                Ok(())
            }
        }
    };
}

audio_provider!(
    /// Mute and volume for capture devices.
    MicrophoneProvider,
    "MicrophoneProvider",
    Role::Microphone
);

audio_provider!(
    /// Mute and volume for desktop/output audio captures.
    AudioOutputProvider,
    "AudioOutputProvider",
    Role::AudioOutput
);

/// Editable text content.
pub struct TextSourceProvider {
    host: Arc<Host>,
}

impl TextSourceProvider {
    pub fn new(host: Arc<Host>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl CapabilityProvider for TextSourceProvider {
    fn name(&self) -> &str {
        "TextSourceProvider"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn priority(&self) -> i32 {
        5
    }

    async fn is_applicable(&self, item: &Item, ctx: &Context) -> anyhow::Result<bool> {
        Ok(ctx.has_role(&item.raw_name, Role::Text))
    }

    async fn apply(&self, panel: &mut Panel, item: &Item, _ctx: &Context) -> anyhow::Result<()> {
        let source = item.raw_name.as_str();
        let settings = self.host.get_settings(source).await?;
        let text = settings
            .input_settings
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();

        panel.set_icon(Role::Text.icon());
        panel.add(Control::Text {
            id: "text".to_string(),
            label: "Text Content".to_string(),
            value: text.to_string(),
            multiline: true,
            binding: Some(
                Binding::new(
                    ops::SET_INPUT_SETTINGS,
                    json!({ "inputName": source, "overlay": true }),
                )
                .with_value_path("inputSettings/text"),
            ),
        });
        Ok(())
    }
}
