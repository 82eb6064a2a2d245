//! Fans remote events out to the mirror, the scene state and the providers.

use std::sync::Arc;

use deckproto::{EventKind, EventStream, RemoteEvent, RemoteSession, SessionError};
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::error::Result;

/// One stream carrying every event kind the core listens to.
pub async fn subscribe_all(session: &dyn RemoteSession) -> Result<EventStream, SessionError> {
    let mut streams = Vec::with_capacity(EventKind::ALL.len());
    for kind in EventKind::ALL {
        streams.push(session.subscribe(kind).await?);
    }
    Ok(stream::select_all(streams).boxed())
}

pub struct EventRouter {
    app: Arc<AppContext>,
}

impl EventRouter {
    pub fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }

    /// Handle one event.
    pub async fn route(&self, event: &RemoteEvent) -> Result<()> {
        let engine = self.app.engine();
        debug!(event = %event.kind(), "routing remote event");

        match event {
            RemoteEvent::CurrentProgramSceneChanged { scene_name } => {
                self.app.scenes().on_remote_program_changed(scene_name);
            }
            RemoteEvent::SceneItemEnableStateChanged {
                scene_name,
                scene_item_id,
                scene_item_enabled,
            } => {
                if engine.current_container().await.as_deref() == Some(scene_name.as_str()) {
                    engine
                        .set_item_enabled(*scene_item_id, *scene_item_enabled)
                        .await;
                }
            }
            RemoteEvent::SceneListChanged { .. } => {
                self.app.refresh_scenes().await?;
            }
            RemoteEvent::SceneItemListReindexed { scene_name }
            | RemoteEvent::SceneItemCreated { scene_name, .. }
            | RemoteEvent::SceneItemRemoved { scene_name, .. } => {
                if engine.target().as_deref() == Some(scene_name.as_str()) {
                    engine.load(scene_name).await?;
                }
            }
            RemoteEvent::InputMuteStateChanged {
                input_name,
                input_muted,
            } => {
                self.app.registry().broadcast_remote_event(input_name, event).await;
                engine
                    .record_control_value(input_name, "mute", &json!(input_muted))
                    .await;
            }
            RemoteEvent::InputVolumeChanged {
                input_name,
                input_volume_mul,
                ..
            } => {
                self.app.registry().broadcast_remote_event(input_name, event).await;
                engine
                    .record_control_value(input_name, "volume", &json!(input_volume_mul))
                    .await;
            }
            RemoteEvent::InputNameChanged { old_input_name, .. } => {
                self.app.context().invalidate();
                self.app
                    .registry()
                    .broadcast_remote_event(old_input_name, event)
                    .await;
                if engine.shows(old_input_name).await {
                    if let Some(target) = engine.target() {
                        engine.load(&target).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Route events until the stream ends or shutdown is signalled.
    ///
    /// Routing failures are logged; the loop keeps going. A stream that ends
    /// on its own means the transport is gone, and the app drops back to
    /// disconnected.
    pub async fn run(&self, mut events: EventStream, mut shutdown: broadcast::Receiver<()>) {
        info!("event router started");
        loop {
            tokio::select! {
                next = events.next() => {
                    let Some(event) = next else {
                        info!("event stream ended");
                        self.app.on_transport_lost().await;
                        break;
                    };
                    if let Err(e) = self.route(&event).await {
                        warn!(event = %event.kind(), error = %e, "event handling failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("event router shutting down");
                    break;
                }
            }
        }
    }
}
