//! Program/preview scene tracking.
//!
//! "Program" is what the remote tool is showing; "preview" is what the local
//! mirror is showing. Selecting a scene only moves preview. Commit pushes
//! preview to program.

use std::sync::{Arc, Mutex, MutexGuard};

use deckproto::ops::SceneList;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DeckError, Result};
use crate::host::Host;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SceneState {
    #[default]
    Disconnected,
    Connected {
        program: Option<String>,
        preview: Option<String>,
    },
}

#[derive(Default)]
struct Inner {
    state: SceneState,
    scenes: Vec<String>,
}

pub struct SceneStateMachine {
    host: Arc<Host>,
    inner: Mutex<Inner>,
}

impl SceneStateMachine {
    pub fn new(host: Arc<Host>) -> Self {
        Self {
            host,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> SceneState {
        self.lock().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.lock().state, SceneState::Connected { .. })
    }

    pub fn program(&self) -> Option<String> {
        match &self.lock().state {
            SceneState::Connected { program, .. } => program.clone(),
            SceneState::Disconnected => None,
        }
    }

    pub fn preview(&self) -> Option<String> {
        match &self.lock().state {
            SceneState::Connected { preview, .. } => preview.clone(),
            SceneState::Disconnected => None,
        }
    }

    /// Last known scene names, in remote order.
    pub fn scenes(&self) -> Vec<String> {
        self.lock().scenes.clone()
    }

    pub fn on_connected(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, SceneState::Disconnected) {
            inner.state = SceneState::Connected {
                program: None,
                preview: None,
            };
        }
    }

    /// Take in a fresh scene listing and return the scene to preview.
    ///
    /// The first listing points both program and preview at the remote's
    /// current scene. Later listings keep the preview unless it vanished.
    pub fn on_scene_list(&self, list: &SceneList) -> Result<Option<String>> {
        let mut inner = self.lock();
        let names = list.names();
        let current = list
            .current_program_scene_name
            .clone()
            .or_else(|| names.first().cloned());

        let SceneState::Connected { program, preview } = &mut inner.state else {
            return Err(DeckError::NotConnected);
        };

        *program = current.clone();
        let keep = preview.as_ref().is_some_and(|p| names.contains(p));
        if !keep {
            *preview = current;
        }
        let chosen = preview.clone();

        debug!(scenes = names.len(), program = ?program, preview = ?chosen, "scene list updated");
        inner.scenes = names;
        Ok(chosen)
    }

    /// Move the preview to `name`. No remote call is made.
    pub fn select(&self, name: &str) -> Result<()> {
        let mut inner = self.lock();
        if !inner.scenes.is_empty() && !inner.scenes.iter().any(|s| s == name) {
            return Err(DeckError::UnknownScene(name.to_string()));
        }
        let SceneState::Connected { preview, .. } = &mut inner.state else {
            return Err(DeckError::NotConnected);
        };
        *preview = Some(name.to_string());
        debug!(scene = name, "preview selected");
        Ok(())
    }

    /// Push the preview to program. Returns false when there was nothing to do.
    pub async fn commit(&self) -> Result<bool> {
        let target = {
            let inner = self.lock();
            match &inner.state {
                SceneState::Disconnected => return Err(DeckError::NotConnected),
                SceneState::Connected { program, preview } => match preview {
                    Some(preview) if Some(preview) != program.as_ref() => preview.clone(),
                    _ => return Ok(false),
                },
            }
        };

        self.host.set_program_scene(&target).await?;

        if let SceneState::Connected { program, .. } = &mut self.lock().state {
            *program = Some(target.clone());
        }
        info!(scene = %target, "preview committed to program");
        Ok(true)
    }

    /// The remote switched program on its own.
    pub fn on_remote_program_changed(&self, name: &str) {
        if let SceneState::Connected { program, .. } = &mut self.lock().state {
            *program = Some(name.to_string());
        }
    }

    pub fn on_disconnected(&self) {
        let mut inner = self.lock();
        inner.state = SceneState::Disconnected;
        inner.scenes.clear();
    }
}
