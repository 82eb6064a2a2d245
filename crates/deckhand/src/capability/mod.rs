//! Capability providers and the registry that dispatches to them.
//!
//! Providers decide whether an item is theirs (`is_applicable`) and, if so,
//! contribute a panel section (`apply`). Dispatch is priority-ordered and
//! fault-isolated: a provider that errors is logged and skipped, and what it
//! half-built is discarded.

pub mod builtin;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use deckproto::RemoteEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::model::Item;
use crate::panel::Panel;

/// Where a provider came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Origin {
    BuiltIn,
    External { file: String },
}

#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn origin(&self) -> Origin {
        Origin::BuiltIn
    }

    async fn is_applicable(&self, item: &Item, ctx: &Context) -> anyhow::Result<bool>;

    async fn apply(&self, panel: &mut Panel, item: &Item, ctx: &Context) -> anyhow::Result<()>;

    /// The item named `source` left the mirror or is being rebuilt.
    async fn cleanup(&self, _source: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_remote_event(&self, _source: &str, _event: &RemoteEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Summary of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub version: String,
    pub priority: i32,
    pub origin: Origin,
}

impl ProviderInfo {
    fn of(provider: &dyn CapabilityProvider) -> Self {
        Self {
            name: provider.name().to_string(),
            version: provider.version().to_string(),
            priority: provider.priority(),
            origin: provider.origin(),
        }
    }
}

struct Registered {
    seq: u64,
    provider: Arc<dyn CapabilityProvider>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    providers: HashMap<String, Registered>,
}

/// Priority-ordered provider collection.
///
/// The lock is only held to snapshot or mutate the map, never across a
/// provider call.
#[derive(Default)]
pub struct CapabilityRegistry {
    inner: RwLock<Inner>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any provider with the same name.
    ///
    /// A replacement keeps the original registration order for tie-breaks.
    /// Returns false if the provider is rejected.
    pub fn register(&self, provider: Arc<dyn CapabilityProvider>) -> bool {
        let name = provider.name().trim().to_string();
        if name.is_empty() {
            warn!("rejected capability provider with empty name");
            return false;
        }

        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let seq = match inner.providers.get(&name) {
            Some(existing) => existing.seq,
            None => {
                inner.next_seq += 1;
                inner.next_seq
            }
        };
        let replaced = inner.providers.contains_key(&name);
        info!(
            provider = %name,
            version = provider.version(),
            priority = provider.priority(),
            replaced,
            "capability provider registered"
        );
        inner.providers.insert(name, Registered { seq, provider });
        true
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .providers
            .remove(name)
            .is_some();
        if removed {
            info!(provider = %name, "capability provider unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .providers
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Providers in dispatch order: priority descending, then registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn CapabilityProvider>> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        let mut ordered: Vec<(i32, u64, Arc<dyn CapabilityProvider>)> = inner
            .providers
            .values()
            .map(|r| (r.provider.priority(), r.seq, r.provider.clone()))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        ordered.into_iter().map(|(_, _, p)| p).collect()
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.snapshot()
            .iter()
            .map(|p| ProviderInfo::of(p.as_ref()))
            .collect()
    }

    /// Run every applicable provider against `item`, in dispatch order.
    ///
    /// Returns true if at least one provider applied successfully.
    pub async fn process_item(&self, panel: &mut Panel, item: &Item, ctx: &Context) -> bool {
        let mut applicable = Vec::new();
        for provider in self.snapshot() {
            match provider.is_applicable(item, ctx).await {
                Ok(true) => applicable.push(provider),
                Ok(false) => {}
                Err(e) => warn!(
                    provider = provider.name(),
                    item = %item.raw_name,
                    error = %e,
                    "applicability check failed; treating as not applicable"
                ),
            }
        }

        let mut has_any = false;
        for provider in applicable {
            let mut section = Panel::default();
            match provider.apply(&mut section, item, ctx).await {
                Ok(()) => {
                    debug!(provider = provider.name(), item = %item.raw_name, "provider applied");
                    panel.merge(section);
                    has_any = true;
                }
                Err(e) => warn!(
                    provider = provider.name(),
                    item = %item.raw_name,
                    error = %e,
                    "provider failed; skipping"
                ),
            }
        }
        has_any
    }

    /// Deliver a remote event to every provider.
    pub async fn broadcast_remote_event(&self, source: &str, event: &RemoteEvent) {
        for provider in self.snapshot() {
            if let Err(e) = provider.on_remote_event(source, event).await {
                warn!(
                    provider = provider.name(),
                    source,
                    event = %event.kind(),
                    error = %e,
                    "remote event handler failed"
                );
            }
        }
    }

    /// Tell every provider that `source` is going away.
    pub async fn cleanup(&self, source: &str) {
        for provider in self.snapshot() {
            if let Err(e) = provider.cleanup(source).await {
                warn!(provider = provider.name(), source, error = %e, "cleanup failed");
            }
        }
    }
}
