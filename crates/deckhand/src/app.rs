//! The application object: owns every component and exposes the actions a
//! front end drives.

use std::sync::Arc;

use deckconf::DeckConfig;
use deckproto::RemoteSession;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capability::{builtin, CapabilityRegistry, ProviderInfo};
use crate::context::{Classifier, ContextCache};
use crate::error::{DeckError, Result};
use crate::host::Host;
use crate::model::{ItemId, MirrorOp};
use crate::plugin::dirs::{candidate_dirs, resolve_plugin_dir};
use crate::plugin::{PluginBridge, PluginChange, PluginWatcher, SandboxConfig};
use crate::reconcile::{LoadReport, ReconciliationEngine};
use crate::scene::SceneStateMachine;

pub struct AppContext {
    config: DeckConfig,
    session: Arc<dyn RemoteSession>,
    host: Arc<Host>,
    context: Arc<ContextCache>,
    registry: Arc<CapabilityRegistry>,
    engine: ReconciliationEngine,
    scenes: SceneStateMachine,
    plugins: Option<Arc<PluginBridge>>,
}

impl AppContext {
    /// Wire everything up. Plugins are not loaded until first needed.
    ///
    /// An unusable plugin directory disables plugins rather than failing.
    pub fn new(config: DeckConfig, session: Arc<dyn RemoteSession>) -> Self {
        let host = Arc::new(Host::new(session.clone()));
        let context = Arc::new(ContextCache::new(
            session.clone(),
            Classifier::new(&config.surface.classification),
            config.context_max_age(),
        ));

        let registry = Arc::new(CapabilityRegistry::new());
        for provider in builtin::providers(&host) {
            registry.register(provider);
        }

        let plugins = if config.infra.plugins.enabled {
            let candidates = candidate_dirs(
                config.infra.paths.plugin_dir.as_deref(),
                &config.infra.paths.data_dir,
            );
            match resolve_plugin_dir(&candidates) {
                Ok(dir) => {
                    let sandbox = SandboxConfig {
                        timeout: config.lua_timeout(),
                    };
                    let bridge = Arc::new(PluginBridge::new(dir, Some(host.clone()), sandbox));
                    registry.register(bridge.clone());
                    Some(bridge)
                }
                Err(e) => {
                    warn!(error = %e, "plugins disabled");
                    None
                }
            }
        } else {
            debug!("plugins disabled by configuration");
            None
        };

        let engine = ReconciliationEngine::new(
            host.clone(),
            context.clone(),
            registry.clone(),
            config.surface.mirror.clone(),
        );
        let scenes = SceneStateMachine::new(host.clone());

        Self {
            config,
            session,
            host,
            context,
            registry,
            engine,
            scenes,
            plugins,
        }
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn RemoteSession> {
        &self.session
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    pub fn context(&self) -> &Arc<ContextCache> {
        &self.context
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn scenes(&self) -> &SceneStateMachine {
        &self.scenes
    }

    pub fn plugins(&self) -> Option<&Arc<PluginBridge>> {
        self.plugins.as_ref()
    }

    /// Providers in dispatch order, external ones included.
    pub async fn providers(&self) -> Vec<ProviderInfo> {
        let mut all = self.registry.list();
        if let Some(bridge) = &self.plugins {
            all.extend(bridge.load_all().await);
        }
        all
    }

    /// Open the session and show the remote's current scene.
    pub async fn connect(&self) -> Result<Option<LoadReport>> {
        let remote = &self.config.infra.remote;
        self.session
            .connect(&remote.endpoint, remote.credential())
            .await?;
        self.scenes.on_connected();
        info!(endpoint = %remote.endpoint, "connected");
        self.refresh_scenes().await
    }

    /// Re-read the scene list. Loads the preview scene if it moved.
    pub async fn refresh_scenes(&self) -> Result<Option<LoadReport>> {
        let list = self.host.list_scenes().await?;
        let preview = self.scenes.on_scene_list(&list)?;

        match preview {
            Some(scene) if self.engine.target().as_deref() != Some(scene.as_str()) => {
                Ok(Some(self.engine.load(&scene).await?))
            }
            _ => Ok(None),
        }
    }

    /// Preview `scene` locally. The remote program is untouched.
    pub async fn select(&self, scene: &str) -> Result<LoadReport> {
        self.scenes.select(scene)?;
        self.engine.load(scene).await
    }

    /// Push the preview scene to program.
    pub async fn commit(&self) -> Result<bool> {
        self.scenes.commit().await
    }

    /// Show or hide an item remotely. The mirror only changes once the
    /// remote accepted the change.
    pub async fn set_item_visibility(&self, id: ItemId, enabled: bool) -> Result<Option<MirrorOp>> {
        let scene = self
            .engine
            .current_container()
            .await
            .ok_or(DeckError::NotConnected)?;
        if self.engine.entry(id).await.is_none() {
            return Err(DeckError::UnknownItem(id));
        }

        if let Err(e) = self.host.set_item_enabled(&scene, id, enabled).await {
            warn!(scene = %scene, item = id, enabled, error = %e, "visibility change rejected");
            return Err(e);
        }
        Ok(self.engine.set_item_enabled(id, enabled).await)
    }

    /// Fire a panel control, optionally carrying a new value.
    pub async fn activate(&self, id: ItemId, control_id: &str, value: Option<Value>) -> Result<Value> {
        let entry = self.engine.entry(id).await.ok_or(DeckError::UnknownItem(id))?;
        let unknown = || DeckError::UnknownControl {
            item: id,
            control: control_id.to_string(),
        };
        let binding = entry
            .panel
            .control(control_id)
            .and_then(|control| control.binding())
            .ok_or_else(unknown)?;

        let params = binding.params_for(value.clone());
        let response = self.host.invoke(&binding.op, params).await?;

        if let Some(value) = value {
            self.engine
                .record_control_value(&entry.item.raw_name, control_id, &value)
                .await;
        }
        Ok(response)
    }

    /// Start watching the plugin directory, unless plugins or watching are off.
    pub fn watch_plugins(&self) -> Result<Option<(PluginWatcher, mpsc::UnboundedReceiver<PluginChange>)>> {
        let Some(bridge) = &self.plugins else {
            return Ok(None);
        };
        if !self.config.infra.plugins.watch {
            debug!("plugin watching disabled by configuration");
            return Ok(None);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = PluginWatcher::spawn(bridge.clone(), tx)
            .map_err(|e| DeckError::PluginDir(format!("{:#}", e)))?;
        Ok(Some((watcher, rx)))
    }

    /// React to a plugin file change by rebuilding the affected panels.
    pub async fn handle_plugin_change(&self, change: &PluginChange) -> Result<Option<LoadReport>> {
        let Some(bridge) = &self.plugins else {
            return Ok(None);
        };
        match change {
            PluginChange::ReloadRequired { path } => {
                info!(file = %path.display(), "reloading plugins");
                let sources: Vec<String> = self
                    .engine
                    .entries()
                    .await
                    .into_iter()
                    .map(|entry| entry.item.raw_name)
                    .collect();
                bridge.reload(&sources).await;
            }
            PluginChange::Removed { path, names } => {
                info!(file = %path.display(), providers = ?names, "plugin providers dropped");
            }
        }

        self.engine.invalidate_panels().await;
        match self.engine.target() {
            Some(target) => Ok(Some(self.engine.load(&target).await?)),
            None => Ok(None),
        }
    }

    /// Tear everything down. Always leaves the app disconnected.
    pub async fn disconnect(&self) -> Result<Vec<MirrorOp>> {
        let ops = self.forget_remote().await;
        if let Err(e) = self.session.disconnect().await {
            warn!(error = %e, "session disconnect failed");
        }
        info!("disconnected");
        Ok(ops)
    }

    /// The transport went away underneath us: drop everything mirrored from
    /// the remote without talking to it.
    pub async fn on_transport_lost(&self) -> Vec<MirrorOp> {
        warn!("remote transport lost");
        self.forget_remote().await
    }

    async fn forget_remote(&self) -> Vec<MirrorOp> {
        let ops = self.engine.clear().await;
        self.scenes.on_disconnected();
        self.context.invalidate();
        ops
    }
}
