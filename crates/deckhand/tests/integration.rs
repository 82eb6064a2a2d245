//! Integration tests for Deckhand
//!
//! These drive a full `AppContext` against a scripted remote: scene
//! selection, reconciliation races, capability dispatch, Lua plugins and
//! event routing. Nothing here needs a running production tool.

mod common {
    use std::path::Path;
    use std::sync::Arc;

    use deckconf::DeckConfig;
    use deckhand::AppContext;
    use deckproto::{ops, ScriptedSession};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    /// One scene item: id, source name, input kind, enabled.
    pub type Row<'a> = (i64, &'a str, &'a str, bool);

    pub const LIVE: &[Row] = &[
        (1, "_cam1", "v4l2_input", true),
        (2, "_mic1", "pulse_input_capture", true),
        (3, "other", "browser_source", true),
    ];

    pub const BACKUP: &[Row] = &[
        (1, "_web", "browser_source", true),
        (4, "_title", "text_ft2_source_v2", false),
    ];

    pub const INTRO: &[Row] = &[(9, "logo", "image_source", true)];

    pub fn items(rows: &[Row]) -> Value {
        let items: Vec<Value> = rows
            .iter()
            .enumerate()
            .map(|(index, (id, name, kind, enabled))| {
                json!({
                    "sceneItemId": id,
                    "sourceName": name,
                    "inputKind": kind,
                    "sceneItemEnabled": enabled,
                    "sceneItemIndex": index,
                })
            })
            .collect();
        json!({ "sceneItems": items })
    }

    /// Answer `GetSceneItemList` per scene name.
    pub fn serve_scenes(session: &ScriptedSession, scenes: &[(&str, &[Row])]) {
        let by_name: Vec<(String, Value)> = scenes
            .iter()
            .map(|(name, rows)| (name.to_string(), items(rows)))
            .collect();
        session.on(ops::GET_SCENE_ITEM_LIST, move |params| {
            let wanted = params["sceneName"].as_str().unwrap_or_default();
            Ok(by_name
                .iter()
                .find(|(name, _)| name == wanted)
                .map(|(_, list)| list.clone())
                .unwrap_or_else(|| json!({ "sceneItems": [] })))
        });
    }

    /// Answer `GetInputList` from every row across all scenes.
    pub fn serve_inputs(session: &ScriptedSession, rows: &[Row]) {
        let inputs: Vec<Value> = rows
            .iter()
            .map(|(_, name, kind, _)| json!({ "inputName": name, "inputKind": kind }))
            .collect();
        session.respond(ops::GET_INPUT_LIST, json!({ "inputs": inputs }));
    }

    /// A remote with three scenes, program on "Live", and every setter accepted.
    pub fn remote() -> Arc<ScriptedSession> {
        let session = Arc::new(ScriptedSession::new());
        session.respond(
            ops::GET_SCENE_LIST,
            json!({
                "currentProgramSceneName": "Live",
                "scenes": [
                    { "sceneName": "Live", "sceneIndex": 0 },
                    { "sceneName": "Backup", "sceneIndex": 1 },
                    { "sceneName": "Intro", "sceneIndex": 2 },
                ],
            }),
        );
        serve_scenes(&session, &[("Live", LIVE), ("Backup", BACKUP), ("Intro", INTRO)]);
        let all: Vec<Row> = LIVE.iter().chain(BACKUP).chain(INTRO).copied().collect();
        serve_inputs(&session, &all);

        session.respond(
            ops::GET_INPUT_SETTINGS,
            json!({
                "inputSettings": { "url": "https://overlay.local/chat?room=7&theme=dark", "text": "Welcome" },
                "inputKind": "browser_source",
            }),
        );
        session.respond(ops::GET_INPUT_MUTE, json!({ "inputMuted": false }));
        session.respond(
            ops::GET_INPUT_VOLUME,
            json!({ "inputVolumeMul": 0.8, "inputVolumeDb": -1.9 }),
        );
        for op in [
            ops::SET_CURRENT_PROGRAM_SCENE,
            ops::SET_SCENE_ITEM_ENABLED,
            ops::SET_INPUT_SETTINGS,
            ops::SET_INPUT_MUTE,
            ops::SET_INPUT_VOLUME,
            ops::PRESS_INPUT_PROPERTIES_BUTTON,
        ] {
            session.respond(op, json!({}));
        }
        session
    }

    pub fn config(plugin_dir: &Path, data_dir: &Path) -> DeckConfig {
        let mut config = DeckConfig::default();
        config.infra.paths.plugin_dir = Some(plugin_dir.to_path_buf());
        config.infra.paths.data_dir = data_dir.to_path_buf();
        config
    }

    pub struct Harness {
        pub session: Arc<ScriptedSession>,
        pub app: Arc<AppContext>,
        pub plugins: TempDir,
        _data: TempDir,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_session(remote())
        }

        pub fn with_session(session: Arc<ScriptedSession>) -> Self {
            let plugins = TempDir::new().unwrap();
            let data = TempDir::new().unwrap();
            let app = Arc::new(AppContext::new(
                config(plugins.path(), data.path()),
                session.clone(),
            ));
            Self {
                session,
                app,
                plugins,
                _data: data,
            }
        }

        /// Drop a Lua plugin into the plugin directory.
        pub fn plugin(&self, file: &str, body: &str) -> std::path::PathBuf {
            let path = self.plugins.path().join(file);
            std::fs::write(&path, body).unwrap();
            path
        }

        pub async fn names(&self) -> Vec<String> {
            self.app
                .engine()
                .entries()
                .await
                .iter()
                .map(|e| e.item.display_name.clone())
                .collect()
        }

        pub async fn control_ids(&self, id: i64) -> Vec<String> {
            self.app
                .engine()
                .entry(id)
                .await
                .unwrap()
                .panel
                .controls
                .iter()
                .map(|c| c.id().to_string())
                .collect()
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use deckhand::panel::{Control, Panel};
use deckhand::plugin::watcher::handle_fs_event;
use deckhand::{
    subscribe_all, CapabilityProvider, Context, DeckError, EventRouter, Item, LoadOutcome,
    MirrorOp, MirrorStatus, PluginChange, SceneState,
};
use deckproto::{ops, RemoteEvent, SessionError};
use pretty_assertions::assert_eq;
use serde_json::json;

use common::Harness;

const BUTTON_PLUGIN: &str = r#"
    deck.register {
        name = "overlay_tools",
        version = "1.2.0",
        priority = 20,
        can_handle = function(kind, source, ctx)
            return kind == "browser_source"
        end,
        execute = function(panel, source, display_name, ctx)
            panel:add { kind = "button", id = "reload_overlay", label = "Reload " .. display_name,
                        binding = { op = "PressInputPropertiesButton",
                                    params = { inputName = source, propertyName = "refreshnocache" } } }
        end,
    }
"#;

/// Claims browser sources ahead of every built-in.
struct Branding;

#[async_trait]
impl CapabilityProvider for Branding {
    fn name(&self) -> &str {
        "branding"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn is_applicable(&self, item: &Item, _ctx: &Context) -> anyhow::Result<bool> {
        Ok(item.kind == "browser_source")
    }

    async fn apply(&self, panel: &mut Panel, _item: &Item, _ctx: &Context) -> anyhow::Result<()> {
        panel.add(Control::Button {
            id: "branding".to_string(),
            label: "Brand".to_string(),
            binding: None,
        });
        panel.set_background("#202040");
        Ok(())
    }
}

// ============================================================================
// Connection and Scene Tests
// ============================================================================

#[tokio::test]
async fn test_connect_mirrors_program_scene() {
    let h = Harness::new();

    let report = h.app.connect().await.unwrap().unwrap();

    assert_eq!(report.outcome, LoadOutcome::Applied);
    assert_eq!(
        h.app.scenes().state(),
        SceneState::Connected {
            program: Some("Live".into()),
            preview: Some("Live".into()),
        }
    );
    // `other` does not follow the naming convention
    assert_eq!(h.names().await, vec!["cam1", "mic1"]);

    let cam = h.app.engine().entry(1).await.unwrap();
    assert!(!cam.has_capabilities);
    assert!(cam.panel.controls.is_empty());

    let mic = h.app.engine().entry(2).await.unwrap();
    assert!(mic.has_capabilities);
    assert_eq!(h.control_ids(2).await, vec!["mute", "volume"]);
    assert_eq!(mic.panel.icon.as_deref(), Some("microphone"));
}

#[tokio::test]
async fn test_reselecting_same_scene_is_idempotent() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    h.app.engine().set_expanded(2, true).await.unwrap();
    let before = h.app.engine().entries().await;
    let mute_reads = h.session.request_count(ops::GET_INPUT_MUTE);

    let report = h.app.select("Live").await.unwrap();

    assert_eq!(report.outcome, LoadOutcome::Applied);
    assert!(report.ops.is_empty());
    assert_eq!(h.app.engine().entries().await, before);
    assert_eq!(h.session.request_count(ops::GET_INPUT_MUTE), mute_reads);
}

#[tokio::test]
async fn test_select_previews_without_touching_program() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    h.app.select("Backup").await.unwrap();

    assert_eq!(h.app.scenes().program().as_deref(), Some("Live"));
    assert_eq!(h.app.scenes().preview().as_deref(), Some("Backup"));
    assert_eq!(h.session.request_count(ops::SET_CURRENT_PROGRAM_SCENE), 0);
    assert_eq!(h.names().await, vec!["web", "title"]);
}

#[tokio::test]
async fn test_commit_pushes_preview_once() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    h.app.select("Backup").await.unwrap();

    assert!(h.app.commit().await.unwrap());
    assert!(!h.app.commit().await.unwrap());

    assert_eq!(h.app.scenes().program().as_deref(), Some("Backup"));
    assert_eq!(
        h.session.requests_for(ops::SET_CURRENT_PROGRAM_SCENE),
        vec![json!({ "sceneName": "Backup" })]
    );
}

#[tokio::test]
async fn test_unknown_scene_is_rejected() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    let err = h.app.select("Nope").await.unwrap_err();
    assert!(matches!(err, DeckError::UnknownScene(name) if name == "Nope"));
    assert_eq!(h.app.scenes().preview().as_deref(), Some("Live"));
}

#[tokio::test]
async fn test_scene_without_mirrored_items_is_empty() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    let report = h.app.select("Intro").await.unwrap();

    assert_eq!(report.outcome, LoadOutcome::Empty);
    assert_eq!(report.ops, vec![MirrorOp::Remove { id: 1 }, MirrorOp::Remove { id: 2 }]);
    assert_eq!(h.app.engine().status().await, MirrorStatus::Empty);
}

#[tokio::test]
async fn test_event_stream_end_drops_to_disconnected() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    assert!(!h.app.engine().entries().await.is_empty());

    let router = EventRouter::new(h.app.clone());
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::time::timeout(
        Duration::from_secs(2),
        router.run(futures::stream::empty::<RemoteEvent>().boxed(), shutdown_rx),
    )
    .await
    .expect("router should stop when the stream ends");

    assert_eq!(h.app.scenes().state(), SceneState::Disconnected);
    assert!(h.app.engine().entries().await.is_empty());
    assert!(matches!(h.app.select("Live").await, Err(DeckError::NotConnected)));
}

#[tokio::test]
async fn test_disconnect_clears_everything() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    let ops = h.app.disconnect().await.unwrap();

    assert_eq!(ops.len(), 2);
    assert!(h.app.engine().entries().await.is_empty());
    assert_eq!(h.app.scenes().state(), SceneState::Disconnected);
    assert!(matches!(h.app.select("Live").await, Err(DeckError::NotConnected)));
}

// ============================================================================
// Reconciliation Race Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_newest_selection_wins() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let before = h.session.request_count(ops::GET_SCENE_ITEM_LIST);

    // Hold the Backup listing until Intro has been applied.
    let gate = h.session.gate(ops::GET_SCENE_ITEM_LIST);
    let app = h.app.clone();
    let slow = tokio::spawn(async move { app.select("Backup").await });
    while h.session.request_count(ops::GET_SCENE_ITEM_LIST) == before {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let fast = h.app.select("Intro").await.unwrap();
    gate.release();
    let slow = slow.await.unwrap().unwrap();

    assert_eq!(fast.outcome, LoadOutcome::Empty);
    assert_eq!(slow.outcome, LoadOutcome::Stale);
    assert!(slow.ops.is_empty());
    assert!(slow.generation < fast.generation);
    assert_eq!(h.app.engine().current_container().await.as_deref(), Some("Intro"));
    assert!(h.names().await.is_empty());
}

#[tokio::test]
async fn test_transport_failure_keeps_mirror() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let before = h.app.engine().entries().await;

    h.session.fail(
        ops::GET_SCENE_ITEM_LIST,
        SessionError::Transport("connection reset".into()),
    );
    let err = h.app.select("Backup").await.unwrap_err();

    assert!(matches!(err, DeckError::Session(SessionError::Transport(_))));
    assert_eq!(h.app.engine().entries().await, before);
    assert!(matches!(h.app.engine().status().await, MirrorStatus::Error(_)));
}

// ============================================================================
// Capability Dispatch Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_providers_run_in_priority_order() {
    let h = Harness::new();
    h.plugin("overlay.lua", BUTTON_PLUGIN);
    h.app.registry().register(Arc::new(Branding));
    h.app.connect().await.unwrap();

    h.app.select("Backup").await.unwrap();

    // branding (20), built-in browser (10), then the plugin bridge (-100)
    assert_eq!(
        h.control_ids(1).await,
        vec!["branding", "url", "hard_refresh", "mute", "volume", "reload_overlay"]
    );
    let web = h.app.engine().entry(1).await.unwrap();
    assert_eq!(web.panel.background.as_deref(), Some("#202040"));
    assert_eq!(web.panel.icon.as_deref(), Some("globe"));
    match web.panel.control("reload_overlay") {
        Some(Control::Button { label, .. }) => assert_eq!(label, "Reload web"),
        other => panic!("unexpected control: {:?}", other),
    }
    assert_eq!(h.control_ids(4).await, vec!["text"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_plugin_is_isolated() {
    let h = Harness::new();
    h.plugin(
        "broken.lua",
        r#"
        deck.register {
            name = "explodes",
            can_handle = function() return true end,
            execute = function(panel) panel:add { kind = "button", id = "half", label = "x" }; error("kaboom") end,
        }
        "#,
    );
    h.app.connect().await.unwrap();

    h.app.select("Backup").await.unwrap();

    assert_eq!(h.control_ids(1).await, vec!["url", "hard_refresh", "mute", "volume"]);
    assert!(h.app.engine().entry(1).await.unwrap().has_capabilities);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_plugin_file_registers_nothing() {
    let h = Harness::new();
    h.plugin("overlay.lua", BUTTON_PLUGIN);
    h.plugin(
        "half.lua",
        r#"
        deck.register { name = "half", can_handle = function() return true end, execute = function() end }
        local x = nil
        x.boom()
        "#,
    );

    let names: Vec<_> = h.app.providers().await.into_iter().map(|p| p.name).collect();

    assert!(names.contains(&"overlay_tools".to_string()));
    assert!(!names.contains(&"half".to_string()));
}

// ============================================================================
// Plugin Lifecycle Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_plugin_file_drops_its_controls() {
    let h = Harness::new();
    let path = h.plugin("overlay.lua", BUTTON_PLUGIN);
    h.app.connect().await.unwrap();
    h.app.select("Backup").await.unwrap();
    assert!(h.control_ids(1).await.contains(&"reload_overlay".to_string()));

    std::fs::remove_file(&path).unwrap();
    let bridge = h.app.plugins().unwrap();
    let event = notify::Event::new(notify::EventKind::Remove(notify::event::RemoveKind::File))
        .add_path(path.clone());
    let changes = handle_fs_event(&bridge.loader(), &event);

    assert_eq!(
        changes,
        vec![PluginChange::Removed {
            path,
            names: vec!["overlay_tools".into()],
        }]
    );
    let report = h.app.handle_plugin_change(&changes[0]).await.unwrap().unwrap();
    assert_eq!(report.outcome, LoadOutcome::Applied);
    assert!(!h.control_ids(1).await.contains(&"reload_overlay".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edited_plugin_is_reloaded() {
    let h = Harness::new();
    let path = h.plugin("overlay.lua", BUTTON_PLUGIN);
    h.app.connect().await.unwrap();
    h.app.select("Backup").await.unwrap();

    h.plugin("overlay.lua", &BUTTON_PLUGIN.replace("\"Reload \"", "\"Refresh \""));
    h.app
        .handle_plugin_change(&PluginChange::ReloadRequired { path })
        .await
        .unwrap();

    let web = h.app.engine().entry(1).await.unwrap();
    match web.panel.control("reload_overlay") {
        Some(Control::Button { label, .. }) => assert_eq!(label, "Refresh web"),
        other => panic!("unexpected control: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reload_runs_cleanup_of_replaced_plugin() {
    let h = Harness::new();
    let muting = r#"
        deck.register {
            name = "mute_on_exit",
            can_handle = function(kind) return kind == "browser_source" end,
            execute = function(panel) panel:set_icon("exit") end,
            cleanup = function(source) host.set_mute(source, true) end,
        }
    "#;
    let path = h.plugin("exit.lua", muting);
    h.app.connect().await.unwrap();
    h.app.select("Backup").await.unwrap();

    h.plugin("exit.lua", &muting.replace("host.set_mute(source, true)", "log.info(source)"));
    h.app
        .handle_plugin_change(&PluginChange::ReloadRequired { path })
        .await
        .unwrap();

    assert!(h
        .session
        .requests_for(ops::SET_INPUT_MUTE)
        .contains(&json!({"inputName": "_web", "inputMuted": true})));
}

#[tokio::test]
async fn test_unusable_plugin_dir_falls_back() {
    let scratch = tempfile::TempDir::new().unwrap();
    // a regular file where the plugin directory should be
    let blocked = scratch.path().join("plugins");
    std::fs::write(&blocked, "not a directory").unwrap();
    let data = scratch.path().join("data");

    let app = deckhand::AppContext::new(common::config(&blocked, &data), common::remote());

    let bridge = app.plugins().unwrap();
    assert_eq!(bridge.dir(), data.join("plugins"));
    assert!(bridge.dir().is_dir());
}

#[tokio::test]
async fn test_disabled_plugins_stay_out_of_the_registry() {
    let scratch = tempfile::TempDir::new().unwrap();
    let mut config = common::config(scratch.path(), scratch.path());
    config.infra.plugins.enabled = false;

    let app = deckhand::AppContext::new(config, common::remote());

    assert!(app.plugins().is_none());
    assert!(!app.registry().contains("plugin_bridge"));
    assert!(app.watch_plugins().unwrap().is_none());
}

// ============================================================================
// User Action Tests
// ============================================================================

#[tokio::test]
async fn test_visibility_change_waits_for_remote() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    let op = h.app.set_item_visibility(2, false).await.unwrap();

    assert!(matches!(op, Some(MirrorOp::Update { id: 2, .. })));
    assert!(!h.app.engine().entry(2).await.unwrap().item.enabled);
    assert_eq!(
        h.session.requests_for(ops::SET_SCENE_ITEM_ENABLED),
        vec![json!({ "sceneName": "Live", "sceneItemId": 2, "sceneItemEnabled": false })]
    );
}

#[tokio::test]
async fn test_rejected_visibility_change_leaves_mirror() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    h.session.fail(
        ops::SET_SCENE_ITEM_ENABLED,
        SessionError::Remote {
            op: ops::SET_SCENE_ITEM_ENABLED.into(),
            code: 600,
            message: "item locked".into(),
        },
    );

    assert!(h.app.set_item_visibility(2, false).await.is_err());
    assert!(h.app.engine().entry(2).await.unwrap().item.enabled);
    assert!(matches!(
        h.app.set_item_visibility(42, false).await,
        Err(DeckError::UnknownItem(42))
    ));
}

#[tokio::test]
async fn test_activate_sends_binding_and_records_value() {
    let h = Harness::new();
    h.app.connect().await.unwrap();

    h.app.activate(2, "mute", Some(json!(true))).await.unwrap();

    assert_eq!(
        h.session.requests_for(ops::SET_INPUT_MUTE),
        vec![json!({ "inputName": "_mic1", "inputMuted": true })]
    );
    let mic = h.app.engine().entry(2).await.unwrap();
    assert!(matches!(mic.panel.control("mute"), Some(Control::Toggle { value: true, .. })));

    let err = h.app.activate(2, "url", None).await.unwrap_err();
    assert!(matches!(err, DeckError::UnknownControl { item: 2, .. }));
}

// ============================================================================
// Event Routing Tests
// ============================================================================

#[tokio::test]
async fn test_remote_mute_updates_panel() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let router = EventRouter::new(h.app.clone());

    router
        .route(&RemoteEvent::InputMuteStateChanged {
            input_name: "_mic1".into(),
            input_muted: true,
        })
        .await
        .unwrap();
    router
        .route(&RemoteEvent::InputVolumeChanged {
            input_name: "_mic1".into(),
            input_volume_mul: 0.25,
            input_volume_db: -12.0,
        })
        .await
        .unwrap();

    let mic = h.app.engine().entry(2).await.unwrap();
    assert!(matches!(mic.panel.control("mute"), Some(Control::Toggle { value: true, .. })));
    assert!(
        matches!(mic.panel.control("volume"), Some(Control::Slider { value, .. }) if (*value - 0.25).abs() < f64::EPSILON)
    );
}

#[tokio::test]
async fn test_enable_change_only_applies_to_shown_scene() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let router = EventRouter::new(h.app.clone());

    for scene in ["Backup", "Live"] {
        router
            .route(&RemoteEvent::SceneItemEnableStateChanged {
                scene_name: scene.into(),
                scene_item_id: 1,
                scene_item_enabled: false,
            })
            .await
            .unwrap();
        let enabled = h.app.engine().entry(1).await.unwrap().item.enabled;
        assert_eq!(enabled, scene == "Backup", "after event for {}", scene);
    }
}

#[tokio::test]
async fn test_remote_program_change_keeps_preview() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    h.app.select("Backup").await.unwrap();
    let router = EventRouter::new(h.app.clone());

    router
        .route(&RemoteEvent::CurrentProgramSceneChanged {
            scene_name: "Intro".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.app.scenes().program().as_deref(), Some("Intro"));
    assert_eq!(h.app.scenes().preview().as_deref(), Some("Backup"));
    assert_eq!(h.names().await, vec!["web", "title"]);
}

#[tokio::test]
async fn test_renamed_input_reloads_scene() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let router = EventRouter::new(h.app.clone());

    let renamed: &[common::Row] = &[
        (1, "_cam1", "v4l2_input", true),
        (2, "_host_mic", "pulse_input_capture", true),
    ];
    common::serve_scenes(&h.session, &[("Live", renamed)]);
    common::serve_inputs(&h.session, renamed);

    router
        .route(&RemoteEvent::InputNameChanged {
            old_input_name: "_mic1".into(),
            input_name: "_host_mic".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.names().await, vec!["cam1", "host_mic"]);
    assert_eq!(h.control_ids(2).await, vec!["mute", "volume"]);
}

#[tokio::test]
async fn test_router_runs_until_shutdown() {
    let h = Harness::new();
    h.app.connect().await.unwrap();
    let events = subscribe_all(h.session.as_ref()).await.unwrap();
    let router = Arc::new(EventRouter::new(h.app.clone()));
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let task = {
        let router = router.clone();
        tokio::spawn(async move { router.run(events, shutdown_rx).await })
    };

    h.session.emit(RemoteEvent::SceneItemEnableStateChanged {
        scene_name: "Live".into(),
        scene_item_id: 2,
        scene_item_enabled: false,
    });
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.app.engine().entry(2).await.unwrap().item.enabled {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event should reach the mirror");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("router should stop")
        .unwrap();
}
