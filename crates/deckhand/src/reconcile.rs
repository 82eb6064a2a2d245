//! Keeps the local mirror in step with one remote container.
//!
//! Every [`ReconciliationEngine::load`] takes a generation number. Only the
//! newest generation may touch the mirror: an older load that finishes late
//! drops its results, and one that goes stale part-way through stops between
//! two items so no entry is ever left half-built.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use deckconf::MirrorConfig;
use deckproto::ops::SceneItemEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capability::CapabilityRegistry;
use crate::context::{Context, ContextCache};
use crate::error::{DeckError, Result};
use crate::host::Host;
use crate::model::{Item, ItemChanges, ItemId, MirrorEntry, MirrorOp, MirrorStatus, UiState};
use crate::panel::Panel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The mirror now shows the requested container.
    Applied,
    /// A newer load superseded this one; its results were dropped.
    Stale,
    /// The container has nothing that follows the naming convention.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub generation: u64,
    pub outcome: LoadOutcome,
    /// Operations applied to the mirror by this load.
    pub ops: Vec<MirrorOp>,
}

impl LoadReport {
    fn stale(generation: u64, ops: Vec<MirrorOp>) -> Self {
        Self {
            generation,
            outcome: LoadOutcome::Stale,
            ops,
        }
    }
}

#[derive(Default)]
struct Mirror {
    /// Container the entries were last fully reconciled against.
    container: Option<String>,
    entries: Vec<MirrorEntry>,
    status: MirrorStatus,
}

pub struct ReconciliationEngine {
    host: Arc<Host>,
    context: Arc<ContextCache>,
    registry: Arc<CapabilityRegistry>,
    config: MirrorConfig,
    generation: AtomicU64,
    target: Mutex<Option<String>>,
    mirror: tokio::sync::Mutex<Mirror>,
}

impl ReconciliationEngine {
    pub fn new(
        host: Arc<Host>,
        context: Arc<ContextCache>,
        registry: Arc<CapabilityRegistry>,
        config: MirrorConfig,
    ) -> Self {
        Self {
            host,
            context,
            registry,
            config,
            generation: AtomicU64::new(0),
            target: Mutex::new(None),
            mirror: tokio::sync::Mutex::new(Mirror::default()),
        }
    }

    /// Latest generation issued.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Container the most recent load asked for.
    pub fn target(&self) -> Option<String> {
        self.target.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Bring the mirror in line with `container`.
    ///
    /// Safe to call while another load is in flight; the newest call wins.
    pub async fn load(&self, container: &str) -> Result<LoadReport> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = Some(container.to_string());
        debug!(container, generation, "reconciliation started");

        let list = match self.host.list_items(container).await {
            Ok(list) => list,
            Err(e) => return self.fail(generation, container, e).await,
        };
        if self.is_stale(generation) {
            debug!(container, generation, "dropping stale item list");
            return Ok(LoadReport::stale(generation, Vec::new()));
        }

        let incoming: Vec<SceneItemEntry> = list
            .scene_items
            .into_iter()
            .filter(|entry| self.config.matches(&entry.source_name))
            .collect();

        if incoming.is_empty() {
            let mut mirror = self.mirror.lock().await;
            if self.is_stale(generation) {
                return Ok(LoadReport::stale(generation, Vec::new()));
            }
            let ops = self.drain(&mut mirror).await;
            mirror.container = Some(container.to_string());
            mirror.status = MirrorStatus::Empty;
            info!(container, generation, "no mirrored items in container");
            return Ok(LoadReport {
                generation,
                outcome: LoadOutcome::Empty,
                ops,
            });
        }

        let ctx = match self.context.get(false).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(container, error = %e, "classification unavailable, continuing without it");
                Arc::new(Context::default())
            }
        };
        if self.is_stale(generation) {
            return Ok(LoadReport::stale(generation, Vec::new()));
        }

        let mut mirror = self.mirror.lock().await;
        if self.is_stale(generation) {
            return Ok(LoadReport::stale(generation, Vec::new()));
        }

        self.apply_diff(&mut mirror, generation, container, incoming, &ctx)
            .await
    }

    async fn apply_diff(
        &self,
        mirror: &mut Mirror,
        generation: u64,
        container: &str,
        incoming: Vec<SceneItemEntry>,
        ctx: &Context,
    ) -> Result<LoadReport> {
        let container_changed = mirror.container.as_deref() != Some(container);
        let previous_order: Vec<ItemId> = mirror.entries.iter().map(|e| e.item.id).collect();
        let incoming_ids: HashSet<ItemId> = incoming.iter().map(|e| e.scene_item_id).collect();
        let mut previous: HashMap<ItemId, MirrorEntry> = mirror
            .entries
            .drain(..)
            .map(|entry| (entry.item.id, entry))
            .collect();

        let mut ops = Vec::new();
        let mut next: Vec<MirrorEntry> = Vec::with_capacity(incoming.len());
        let mut aborted = false;

        for id in previous_order.iter().filter(|id| !incoming_ids.contains(id)) {
            if self.is_stale(generation) {
                aborted = true;
                break;
            }
            if let Some(gone) = previous.remove(id) {
                self.registry.cleanup(&gone.item.raw_name).await;
                ops.push(MirrorOp::Remove { id: *id });
            }
        }

        if !aborted {
            for entry in incoming {
                if self.is_stale(generation) {
                    aborted = true;
                    break;
                }
                let item = self.item_from(entry, ctx);
                match previous.remove(&item.id) {
                    Some(existing) => {
                        let (updated, op) = self.update_entry(existing, item, container_changed, ctx).await;
                        ops.extend(op);
                        next.push(updated);
                    }
                    None => {
                        let mut panel = Panel::default();
                        let has_capabilities = self.registry.process_item(&mut panel, &item, ctx).await;
                        ops.push(MirrorOp::Add { item: item.clone() });
                        next.push(MirrorEntry {
                            item,
                            panel,
                            has_capabilities,
                            ui: UiState::default(),
                        });
                    }
                }
            }
        }

        if aborted {
            // Keep every untouched entry whole; the newer load converges.
            for id in &previous_order {
                if let Some(untouched) = previous.remove(id) {
                    next.push(untouched);
                }
            }
            mirror.entries = next;
            debug!(container, generation, applied = ops.len(), "reconciliation superseded mid-pass");
            return Ok(LoadReport::stale(generation, ops));
        }

        let persisting: HashSet<ItemId> = previous_order.iter().copied().collect();
        let old_relative: Vec<ItemId> = previous_order
            .iter()
            .copied()
            .filter(|id| incoming_ids.contains(id))
            .collect();
        let new_relative: Vec<ItemId> = next
            .iter()
            .map(|e| e.item.id)
            .filter(|id| persisting.contains(id))
            .collect();
        if old_relative != new_relative {
            ops.push(MirrorOp::Reorder {
                ids: next.iter().map(|e| e.item.id).collect(),
            });
        }

        mirror.entries = next;
        mirror.container = Some(container.to_string());
        mirror.status = MirrorStatus::Ready;
        info!(
            container,
            generation,
            entries = mirror.entries.len(),
            ops = ops.len(),
            "reconciliation applied"
        );

        Ok(LoadReport {
            generation,
            outcome: LoadOutcome::Applied,
            ops,
        })
    }

    fn item_from(&self, entry: SceneItemEntry, ctx: &Context) -> Item {
        let kind = entry
            .input_kind
            .filter(|kind| !kind.is_empty())
            .or_else(|| ctx.kind_of(&entry.source_name).map(str::to_string))
            .unwrap_or_default();
        Item {
            id: entry.scene_item_id,
            display_name: self.config.display_name(&entry.source_name),
            raw_name: entry.source_name,
            kind,
            enabled: entry.scene_item_enabled,
        }
    }

    async fn update_entry(
        &self,
        mut existing: MirrorEntry,
        item: Item,
        container_changed: bool,
        ctx: &Context,
    ) -> (MirrorEntry, Option<MirrorOp>) {
        let mut changes = ItemChanges::default();
        if existing.item.enabled != item.enabled {
            changes.enabled = Some(item.enabled);
        }
        if existing.item.display_name != item.display_name {
            changes.display_name = Some(item.display_name.clone());
        }

        let identity_changed =
            existing.item.raw_name != item.raw_name || existing.item.kind != item.kind;
        let refreshed = container_changed || identity_changed;
        if refreshed {
            self.registry.cleanup(&existing.item.raw_name).await;
            let mut panel = Panel::default();
            existing.has_capabilities = self.registry.process_item(&mut panel, &item, ctx).await;
            existing.panel = panel;
        }

        let id = item.id;
        existing.item = item;
        let op = (refreshed || !changes.is_empty()).then_some(MirrorOp::Update {
            id,
            changes,
            refreshed,
        });
        (existing, op)
    }

    async fn fail(&self, generation: u64, container: &str, error: DeckError) -> Result<LoadReport> {
        if self.is_stale(generation) {
            debug!(container, generation, error = %error, "stale load failed, ignoring");
            return Ok(LoadReport::stale(generation, Vec::new()));
        }

        let mut mirror = self.mirror.lock().await;
        warn!(
            container,
            generation,
            kept_entries = mirror.entries.len(),
            error = %error,
            "reconciliation failed"
        );
        mirror.status = MirrorStatus::Error(error.to_string());
        Err(error)
    }

    async fn drain(&self, mirror: &mut Mirror) -> Vec<MirrorOp> {
        let mut ops = Vec::with_capacity(mirror.entries.len());
        for entry in std::mem::take(&mut mirror.entries) {
            self.registry.cleanup(&entry.item.raw_name).await;
            ops.push(MirrorOp::Remove { id: entry.item.id });
        }
        ops
    }

    /// Empty the mirror and supersede any load in flight.
    pub async fn clear(&self) -> Vec<MirrorOp> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.target.lock().unwrap_or_else(|p| p.into_inner()) = None;
        let mut mirror = self.mirror.lock().await;
        let ops = self.drain(&mut mirror).await;
        mirror.container = None;
        mirror.status = MirrorStatus::Idle;
        ops
    }

    /// Make the next load re-run providers for every entry.
    pub async fn invalidate_panels(&self) {
        self.mirror.lock().await.container = None;
    }

    /// Record a visibility change for one entry.
    pub async fn set_item_enabled(&self, id: ItemId, enabled: bool) -> Option<MirrorOp> {
        let mut mirror = self.mirror.lock().await;
        let entry = mirror.entries.iter_mut().find(|e| e.item.id == id)?;
        if entry.item.enabled == enabled {
            return None;
        }
        entry.item.enabled = enabled;
        Some(MirrorOp::Update {
            id,
            changes: ItemChanges {
                enabled: Some(enabled),
                ..Default::default()
            },
            refreshed: false,
        })
    }

    pub async fn set_expanded(&self, id: ItemId, expanded: bool) -> Result<()> {
        let mut mirror = self.mirror.lock().await;
        let entry = mirror
            .entries
            .iter_mut()
            .find(|e| e.item.id == id)
            .ok_or(DeckError::UnknownItem(id))?;
        entry.ui.expanded = expanded;
        Ok(())
    }

    /// Store a value the remote reported into one control of every entry
    /// showing `source`. Returns the ids of the entries that changed.
    pub async fn record_control_value(&self, source: &str, control: &str, value: &Value) -> Vec<ItemId> {
        let mut mirror = self.mirror.lock().await;
        mirror
            .entries
            .iter_mut()
            .filter(|e| e.item.raw_name == source)
            .filter_map(|e| {
                let changed = e.panel.control_mut(control)?.set_value(value);
                changed.then_some(e.item.id)
            })
            .collect()
    }

    pub async fn entries(&self) -> Vec<MirrorEntry> {
        self.mirror.lock().await.entries.clone()
    }

    pub async fn entry(&self, id: ItemId) -> Option<MirrorEntry> {
        self.mirror
            .lock()
            .await
            .entries
            .iter()
            .find(|e| e.item.id == id)
            .cloned()
    }

    /// Whether `source` is shown by any entry.
    pub async fn shows(&self, source: &str) -> bool {
        self.mirror
            .lock()
            .await
            .entries
            .iter()
            .any(|e| e.item.raw_name == source)
    }

    pub async fn status(&self) -> MirrorStatus {
        self.mirror.lock().await.status.clone()
    }

    /// Container the mirror was last fully reconciled against.
    pub async fn current_container(&self) -> Option<String> {
        self.mirror.lock().await.container.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::tests::Recorder;
    use crate::context::Classifier;
    use deckproto::{ops, ScriptedSession, SessionError};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        session: Arc<ScriptedSession>,
        engine: ReconciliationEngine,
        log: Arc<std::sync::Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let session = Arc::new(ScriptedSession::connected());
        session.respond(ops::GET_INPUT_LIST, json!({"inputs": []}));
        let host = Arc::new(Host::new(session.clone()));
        let context = Arc::new(ContextCache::new(
            session.clone(),
            Classifier::default(),
            Duration::from_secs(10),
        ));
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = Arc::new(CapabilityRegistry::new());
        registry.register(Arc::new(Recorder::new("rec", 0, &log)));
        let engine = ReconciliationEngine::new(host, context, registry, MirrorConfig::default());
        Fixture { session, engine, log }
    }

    fn items(list: &[(i64, &str, bool)]) -> Value {
        let items: Vec<Value> = list
            .iter()
            .map(|(id, name, enabled)| {
                json!({"sceneItemId": id, "sourceName": name, "sceneItemEnabled": enabled})
            })
            .collect();
        json!({ "sceneItems": items })
    }

    fn applies(log: &Arc<std::sync::Mutex<Vec<String>>>) -> usize {
        log.lock().unwrap().iter().filter(|l| l.contains(":apply:")).count()
    }

    #[tokio::test]
    async fn test_first_load_adds_matching_items() {
        let f = fixture();
        f.session.respond(
            ops::GET_SCENE_ITEM_LIST,
            items(&[(1, "_cam1", true), (2, "background", true), (3, "_mic1", false)]),
        );

        let report = f.engine.load("Live").await.unwrap();

        assert_eq!(report.outcome, LoadOutcome::Applied);
        assert_eq!(report.generation, 1);
        let names: Vec<_> = f.engine.entries().await.iter().map(|e| e.item.display_name.clone()).collect();
        assert_eq!(names, vec!["cam1", "mic1"]);
        assert_eq!(f.engine.status().await, MirrorStatus::Ready);
        assert_eq!(f.engine.current_container().await.as_deref(), Some("Live"));
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let f = fixture();
        f.session
            .respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true), (3, "_mic1", true)]));

        f.engine.load("Live").await.unwrap();
        f.engine.set_expanded(3, true).await.unwrap();
        let before = f.engine.entries().await;
        let second = f.engine.load("Live").await.unwrap();

        assert!(second.ops.is_empty());
        assert_eq!(f.engine.entries().await, before);
        assert_eq!(applies(&f.log), 2);
    }

    #[tokio::test]
    async fn test_enabled_change_updates_in_place() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();
        f.engine.set_expanded(1, true).await.unwrap();

        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", false)]));
        let report = f.engine.load("Live").await.unwrap();

        assert_eq!(
            report.ops,
            vec![MirrorOp::Update {
                id: 1,
                changes: ItemChanges {
                    enabled: Some(false),
                    display_name: None
                },
                refreshed: false
            }]
        );
        let entry = f.engine.entry(1).await.unwrap();
        assert!(entry.ui.expanded);
        assert_eq!(applies(&f.log), 1);
    }

    #[tokio::test]
    async fn test_container_switch_refreshes_shared_ids() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();
        f.engine.set_expanded(1, true).await.unwrap();

        let report = f.engine.load("Backup").await.unwrap();

        assert!(matches!(report.ops[..], [MirrorOp::Update { id: 1, refreshed: true, .. }]));
        assert!(f.engine.entry(1).await.unwrap().ui.expanded);
        let log = f.log.lock().unwrap().clone();
        assert_eq!(log, vec!["rec:apply:_cam1", "rec:cleanup:_cam1", "rec:apply:_cam1"]);
    }

    #[tokio::test]
    async fn test_removed_items_are_cleaned_up_and_order_tracked() {
        let f = fixture();
        f.session.respond(
            ops::GET_SCENE_ITEM_LIST,
            items(&[(1, "_a", true), (2, "_b", true), (3, "_c", true)]),
        );
        f.engine.load("Live").await.unwrap();

        f.session
            .respond(ops::GET_SCENE_ITEM_LIST, items(&[(3, "_c", true), (1, "_a", true)]));
        let report = f.engine.load("Live").await.unwrap();

        assert_eq!(
            report.ops,
            vec![MirrorOp::Remove { id: 2 }, MirrorOp::Reorder { ids: vec![3, 1] }]
        );
        assert!(f.log.lock().unwrap().contains(&"rec:cleanup:_b".to_string()));
    }

    #[tokio::test]
    async fn test_empty_container_clears_mirror() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();

        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(5, "plain", true)]));
        let report = f.engine.load("Live").await.unwrap();

        assert_eq!(report.outcome, LoadOutcome::Empty);
        assert_eq!(report.ops, vec![MirrorOp::Remove { id: 1 }]);
        assert_eq!(f.engine.status().await, MirrorStatus::Empty);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_entries() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();

        f.session.fail(
            ops::GET_SCENE_ITEM_LIST,
            SessionError::Transport("socket closed".into()),
        );
        let err = f.engine.load("Live").await.unwrap_err();

        assert!(matches!(err, DeckError::Session(SessionError::Transport(_))));
        assert_eq!(f.engine.entries().await.len(), 1);
        assert!(matches!(f.engine.status().await, MirrorStatus::Error(msg) if msg.contains("socket closed")));
    }

    #[tokio::test]
    async fn test_classification_failure_is_not_fatal() {
        let f = fixture();
        f.session
            .fail(ops::GET_INPUT_LIST, SessionError::Transport("flaky".into()));
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));

        let report = f.engine.load("Live").await.unwrap();
        assert_eq!(report.outcome, LoadOutcome::Applied);
    }

    #[tokio::test]
    async fn test_generation_is_monotonic() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[]));
        let mut last = 0;
        for _ in 0..5 {
            let report = f.engine.load("Live").await.unwrap();
            assert!(report.generation > last);
            last = report.generation;
        }
        assert_eq!(f.engine.generation(), 5);
    }

    #[tokio::test]
    async fn test_record_control_value_and_visibility() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();

        // Recorder adds a button named after itself; buttons take no value
        assert!(f.engine.record_control_value("_cam1", "rec", &json!(true)).await.is_empty());
        assert!(f.engine.set_item_enabled(1, true).await.is_none());
        assert!(f.engine.set_item_enabled(1, false).await.is_some());
        assert!(!f.engine.entry(1).await.unwrap().item.enabled);
        assert!(f.engine.set_expanded(42, true).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_supersedes_and_empties() {
        let f = fixture();
        f.session.respond(ops::GET_SCENE_ITEM_LIST, items(&[(1, "_cam1", true)]));
        f.engine.load("Live").await.unwrap();
        let before = f.engine.generation();

        let ops = f.engine.clear().await;

        assert_eq!(ops, vec![MirrorOp::Remove { id: 1 }]);
        assert!(f.engine.generation() > before);
        assert_eq!(f.engine.status().await, MirrorStatus::Idle);
        assert!(f.engine.target().is_none());
    }
}
