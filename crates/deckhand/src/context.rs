//! Classification context and its short-lived cache.
//!
//! Built from one full input listing: which kind each input is, and which
//! roles (microphone, browser, ...) it plays. Providers consult it to decide
//! applicability without a request per item.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deckconf::ClassificationConfig;
use deckproto::ops::{self, InputList};
use deckproto::{RemoteSession, SessionExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Microphone,
    AudioOutput,
    Browser,
    Text,
    Media,
}

impl Role {
    /// Default icon name for items playing this role.
    pub fn icon(&self) -> &'static str {
        match self {
            Role::Microphone => "microphone",
            Role::AudioOutput => "speaker",
            Role::Browser => "globe",
            Role::Text => "text",
            Role::Media => "film",
        }
    }
}

/// Maps input kinds (and microphone-ish names) onto roles.
#[derive(Debug, Clone)]
pub struct Classifier {
    kinds: HashMap<String, Role>,
    microphone_hint: String,
}

impl Classifier {
    pub fn new(config: &ClassificationConfig) -> Self {
        let mut kinds = HashMap::new();
        let lists = [
            (Role::Microphone, &config.microphone_kinds),
            (Role::AudioOutput, &config.audio_output_kinds),
            (Role::Browser, &config.browser_kinds),
            (Role::Text, &config.text_kinds),
            (Role::Media, &config.media_kinds),
        ];
        for (role, list) in lists {
            for kind in list {
                kinds.insert(kind.to_lowercase(), role);
            }
        }

        Self {
            kinds,
            microphone_hint: config.microphone_name_hint.to_lowercase(),
        }
    }

    pub fn roles(&self, name: &str, kind: &str) -> Vec<Role> {
        let mut roles = Vec::new();
        if let Some(role) = self.kinds.get(&kind.to_lowercase()) {
            roles.push(*role);
        }
        if !self.microphone_hint.is_empty()
            && !roles.contains(&Role::Microphone)
            && name.to_lowercase().contains(&self.microphone_hint)
        {
            roles.push(Role::Microphone);
        }
        roles
    }

    /// Build a context from a full input listing. Nameless inputs are skipped.
    pub fn build(&self, inputs: &InputList) -> Context {
        let mut context = Context::default();
        for input in &inputs.inputs {
            if input.input_name.is_empty() {
                continue;
            }
            context
                .kind_by_name
                .insert(input.input_name.clone(), input.input_kind.clone());
            for role in self.roles(&input.input_name, &input.input_kind) {
                context
                    .roles
                    .entry(role)
                    .or_default()
                    .insert(input.input_name.clone());
            }
        }
        context
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassificationConfig::default())
    }
}

/// Per-input classification metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub kind_by_name: HashMap<String, String>,
    pub roles: BTreeMap<Role, BTreeSet<String>>,
}

impl Context {
    pub fn kind_of(&self, name: &str) -> Option<&str> {
        self.kind_by_name.get(name).map(String::as_str)
    }

    pub fn has_role(&self, name: &str, role: Role) -> bool {
        self.roles.get(&role).is_some_and(|names| names.contains(name))
    }

    /// The first role (in declaration order) the input plays.
    pub fn primary_role(&self, name: &str) -> Option<Role> {
        self.roles
            .iter()
            .find(|(_, names)| names.contains(name))
            .map(|(role, _)| *role)
    }
}

struct Cached {
    fetched_at: Instant,
    context: Arc<Context>,
}

#[derive(Default)]
struct Slot {
    /// Bumped by every invalidation.
    epoch: u64,
    cached: Option<Cached>,
}

/// Caches the classification context for `max_age`.
///
/// The slot is replaced in a single assignment; no lock is held while the
/// listing is fetched, so two concurrent misses may both fetch and the last
/// one wins. A fetch that straddles an [`invalidate`](Self::invalidate) is
/// returned to its caller but never cached.
pub struct ContextCache {
    session: Arc<dyn RemoteSession>,
    classifier: Classifier,
    max_age: Duration,
    slot: Mutex<Slot>,
}

impl ContextCache {
    pub fn new(session: Arc<dyn RemoteSession>, classifier: Classifier, max_age: Duration) -> Self {
        Self {
            session,
            classifier,
            max_age,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// The cached context if still fresh, else a freshly fetched one.
    pub async fn get(&self, force: bool) -> Result<Arc<Context>> {
        if !force {
            if let Some(context) = self.fresh() {
                return Ok(context);
            }
        }

        let epoch = self.lock_slot().epoch;
        let inputs: InputList = self
            .session
            .call(ops::GET_INPUT_LIST, &serde_json::json!({}))
            .await?;
        let context = Arc::new(self.classifier.build(&inputs));

        let mut slot = self.lock_slot();
        if slot.epoch == epoch {
            slot.cached = Some(Cached {
                fetched_at: Instant::now(),
                context: context.clone(),
            });
            debug!(inputs = inputs.inputs.len(), force, "classification context refreshed");
        } else {
            debug!("classification context invalidated mid-fetch; not caching");
        }
        Ok(context)
    }

    /// Drop the cached context so the next `get` refetches. Fetches already
    /// in flight will not repopulate the cache.
    pub fn invalidate(&self) {
        let mut slot = self.lock_slot();
        slot.epoch += 1;
        slot.cached = None;
    }

    fn fresh(&self) -> Option<Arc<Context>> {
        self.lock_slot()
            .cached
            .as_ref()
            .filter(|cached| cached.fetched_at.elapsed() < self.max_age)
            .map(|cached| cached.context.clone())
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }
}
