//! The provider that stands in for every external plugin.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use deckproto::RemoteEvent;
use tracing::{info, warn};

use super::loader::PluginLoader;
use super::sandbox::SandboxConfig;
use crate::capability::{CapabilityProvider, ProviderInfo};
use crate::context::Context;
use crate::host::Host;
use crate::model::Item;
use crate::panel::Panel;

pub const PLUGIN_BRIDGE_NAME: &str = "plugin_bridge";

/// Runs after every built-in. Plugins are loaded lazily, on the first
/// applicability check.
pub struct PluginBridge {
    dir: PathBuf,
    host: Option<Arc<Host>>,
    sandbox: SandboxConfig,
    loader: RwLock<Arc<PluginLoader>>,
}

impl PluginBridge {
    pub const PRIORITY: i32 = -100;

    pub fn new(dir: impl Into<PathBuf>, host: Option<Arc<Host>>, sandbox: SandboxConfig) -> Self {
        let dir = dir.into();
        let loader = PluginLoader::new(dir.clone(), host.clone(), sandbox.clone());
        Self {
            dir,
            host,
            sandbox,
            loader: RwLock::new(Arc::new(loader)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn loader(&self) -> Arc<PluginLoader> {
        self.loader.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub async fn load_all(&self) -> Vec<ProviderInfo> {
        self.loader().load_all().await
    }

    /// Drop every loaded plugin and start over with a fresh loader.
    ///
    /// Nothing is loaded until the next applicability check or `load_all`.
    pub fn reset(&self) -> Arc<PluginLoader> {
        let fresh = Arc::new(PluginLoader::new(
            self.dir.clone(),
            self.host.clone(),
            self.sandbox.clone(),
        ));
        *self.loader.write().unwrap_or_else(|p| p.into_inner()) = fresh.clone();
        info!(dir = %self.dir.display(), "plugin set reset");
        fresh
    }

    /// Let the current plugins clean up after `sources`, then reset.
    pub async fn reload(&self, sources: &[String]) -> Arc<PluginLoader> {
        let retired = self.loader();
        if retired.is_loaded() {
            for source in sources {
                retired.registry().cleanup(source).await;
            }
        }
        self.reset()
    }
}

#[async_trait]
impl CapabilityProvider for PluginBridge {
    fn name(&self) -> &str {
        PLUGIN_BRIDGE_NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn is_applicable(&self, item: &Item, ctx: &Context) -> Result<bool> {
        let loader = self.loader();
        loader.load_all().await;

        for provider in loader.registry().snapshot() {
            match provider.is_applicable(item, ctx).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => warn!(
                    plugin = provider.name(),
                    item = %item.raw_name,
                    error = %e,
                    "plugin applicability check failed"
                ),
            }
        }
        Ok(false)
    }

    async fn apply(&self, panel: &mut Panel, item: &Item, ctx: &Context) -> Result<()> {
        if !self.loader().registry().process_item(panel, item, ctx).await {
            bail!("no plugin applied to {}", item.raw_name);
        }
        Ok(())
    }

    async fn cleanup(&self, source: &str) -> Result<()> {
        self.loader().registry().cleanup(source).await;
        Ok(())
    }

    async fn on_remote_event(&self, source: &str, event: &RemoteEvent) -> Result<()> {
        self.loader()
            .registry()
            .broadcast_remote_event(source, event)
            .await;
        Ok(())
    }
}
