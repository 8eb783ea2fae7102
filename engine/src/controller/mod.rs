//! Conversation controller
//!
//! [`ConvoCtrl`] owns one conversation engine and drives its lifecycle:
//!
//! ```text
//! new() ──> Loading ──init()──> Ready
//!                                 │
//!                 reset_session() ┘ (stays Ready, reloads the seed)
//! ```
//!
//! `dispose()` can be called from any state. After it, no cell owned by the
//! controller changes again, commands that still resolve are discarded, and
//! new commands either do nothing (`init`, `reset_session`) or fail with
//! [`ConvoError::Disposed`].

use chrono::Utc;
use sdk::engine::{Conversation, ConversationEngine, EngineOptions, Retriever};
use sdk::errors::{ConvoError, Result};
use sdk::observable::{DisposeBag, Observable, ReadOnlyObservable};
use sdk::store::RecordStore;
use sdk::task::TaskProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::conversation::LocalEngine;
use crate::llm::CompletionService;
use crate::status::{derive_busy, status_indicator, StatusIndicator};
use crate::visibility::TaskVisibility;

/// Model requested for every completion
pub const DEFAULT_MODEL: &str = "us.anthropic.claude-3-7-sonnet-20250219-v1:0";

/// Record holding the list of saved sessions
pub const SESSION_INDEX_KEY: &str = "convo-sessions";

/// Record key of one saved session
pub fn session_key(id: &str) -> String {
    format!("convo-session:{}", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtrlState {
    Loading,
    Ready,
}

impl fmt::Display for CtrlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtrlState::Loading => f.write_str("loading"),
            CtrlState::Ready => f.write_str("ready"),
        }
    }
}

/// Construction options
#[derive(Clone, Default)]
pub struct ConvoCtrlOptions {
    /// Seed conversation text used when no saved session is bound
    pub template: Option<String>,

    /// Saved session to resume
    pub session_id: Option<String>,

    /// Where sessions are saved; required for `save_session` and `session_id`
    pub store: Option<Arc<dyn RecordStore>>,

    /// Passed to the engine for document retrieval
    pub retriever: Option<Arc<dyn Retriever>>,
}

impl fmt::Debug for ConvoCtrlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvoCtrlOptions")
            .field("template", &self.template.as_ref().map(String::len))
            .field("session_id", &self.session_id)
            .field("store", &self.store.is_some())
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

/// A saved conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub transcript: String,
    pub preview: String,
    pub updated_at: String,
}

/// Index entry for a saved conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub preview: String,
    pub updated_at: String,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            preview: record.preview.clone(),
            updated_at: record.updated_at.clone(),
        }
    }
}

/// Saved sessions, most recently updated first
pub async fn list_sessions(store: &dyn RecordStore) -> Result<Vec<SessionSummary>> {
    match store.get(SESSION_INDEX_KEY).await? {
        Some(value) if !value.is_null() => Ok(serde_json::from_value(value)?),
        _ => Ok(Vec::new()),
    }
}

/// Read one saved session
pub async fn load_session(store: &dyn RecordStore, id: &str) -> Result<Option<SessionRecord>> {
    match store.get(&session_key(id)).await? {
        Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value)?)),
        _ => Ok(None),
    }
}

/// Counts an in-flight reset for as long as it lives
struct ResetGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> ResetGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts an in-flight save; `saving` is true while any save is counted
struct SavingGuard<'a> {
    saves: &'a Mutex<usize>,
    saving: &'a Observable<bool>,
    disposed: &'a AtomicBool,
}

impl<'a> SavingGuard<'a> {
    fn enter(
        saves: &'a Mutex<usize>,
        saving: &'a Observable<bool>,
        disposed: &'a AtomicBool,
    ) -> Self {
        let mut count = lock(saves);
        *count += 1;
        saving.set(true);
        drop(count);
        Self {
            saves,
            saving,
            disposed,
        }
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        let mut count = lock(self.saves);
        *count -= 1;
        if *count == 0 && !self.disposed.load(Ordering::SeqCst) {
            self.saving.set(false);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ConvoCtrl {
    engine: Arc<dyn ConversationEngine>,
    options: ConvoCtrlOptions,
    state: Observable<CtrlState>,
    saving: Observable<bool>,
    saves: Mutex<usize>,
    save_lock: tokio::sync::Mutex<()>,
    session_id: Observable<Option<String>>,
    busy: Observable<bool>,
    visibility: TaskVisibility,
    reset_depth: AtomicUsize,
    disposed: AtomicBool,
    disposables: DisposeBag,
}

impl ConvoCtrl {
    /// Build the controller and its engine. Nothing is loaded until
    /// [`init`](Self::init) is awaited.
    ///
    /// Call inside a Tokio runtime so task reveal delays can be timed.
    pub fn new(
        options: ConvoCtrlOptions,
        build_engine: impl FnOnce(EngineOptions) -> Arc<dyn ConversationEngine>,
    ) -> Self {
        let engine = build_engine(Self::engine_options(&options));

        let saving = Observable::new(false);
        let disposables = DisposeBag::new();
        let busy = derive_busy(
            &engine.open_tasks(),
            &engine.current_task(),
            &saving.read_only(),
            &disposables,
        );
        let visibility = TaskVisibility::new(&engine.open_tasks());

        Self {
            session_id: Observable::new(options.session_id.clone()),
            engine,
            options,
            state: Observable::new(CtrlState::Loading),
            saving,
            saves: Mutex::new(0),
            save_lock: tokio::sync::Mutex::new(()),
            busy,
            visibility,
            reset_depth: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            disposables,
        }
    }

    /// Controller backed by a [`LocalEngine`]
    pub fn local(options: ConvoCtrlOptions, completion: Arc<dyn CompletionService>) -> Self {
        Self::new(options, move |engine_options| {
            let engine: Arc<dyn ConversationEngine> =
                Arc::new(LocalEngine::new(completion, engine_options));
            engine
        })
    }

    /// Options handed to the engine at construction
    pub fn engine_options(options: &ConvoCtrlOptions) -> EngineOptions {
        EngineOptions {
            default_model: DEFAULT_MODEL.to_string(),
            retriever: options.retriever.clone(),
        }
    }

    /// Load the conversation and become `Ready`
    pub async fn init(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        self.load().await?;

        if self.is_disposed() {
            debug!("Controller disposed during init");
            return Ok(());
        }
        self.state.set(CtrlState::Ready);
        info!("Conversation ready");
        Ok(())
    }

    /// Start the conversation fresh from its seed
    ///
    /// The seed is the saved transcript when a session is bound, otherwise
    /// the configured template. Without either the engine keeps its own.
    pub async fn load(&self) -> Result<()> {
        if self.is_disposed() {
            return Ok(());
        }

        let seed = self.resolve_seed().await?;
        if self.is_disposed() {
            debug!("Controller disposed while resolving seed");
            return Ok(());
        }

        if let Some(seed) = seed {
            self.engine.set_template(&seed)?;
        }
        self.engine.clear().await
    }

    async fn resolve_seed(&self) -> Result<Option<String>> {
        let Some(id) = self.session_id.get() else {
            return Ok(self.options.template.clone());
        };
        let store = self.store()?;

        match load_session(store.as_ref(), &id).await? {
            Some(record) => {
                debug!("Resuming session {}", id);
                Ok(Some(record.transcript))
            }
            None => Err(ConvoError::NotFound(format!("session {}", id))),
        }
    }

    fn store(&self) -> Result<Arc<dyn RecordStore>> {
        self.options
            .store
            .clone()
            .ok_or_else(|| ConvoError::Config("No record store configured".to_string()))
    }

    /// Reload the seed, discarding unsaved messages
    pub async fn reset_session(&self) -> Result<()> {
        let _guard = ResetGuard::enter(&self.reset_depth);
        info!("Resetting session");
        self.load().await
    }

    pub fn is_resetting(&self) -> bool {
        self.reset_depth() > 0
    }

    /// Number of resets currently in flight
    pub fn reset_depth(&self) -> usize {
        self.reset_depth.load(Ordering::SeqCst)
    }

    /// Release the engine, subscriptions, and reveal timers. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disposables.dispose();
        self.visibility.dispose();
        self.engine.dispose();
        info!("Conversation controller disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Send user input to the engine
    pub async fn append_user_message(&self, text: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(ConvoError::Disposed);
        }
        self.engine.append_user_message(text).await
    }

    /// Save the conversation and bind the controller to the saved session.
    /// Returns the session id.
    pub async fn save_session(&self) -> Result<String> {
        if self.is_disposed() {
            return Err(ConvoError::Disposed);
        }
        let store = self.store()?;
        let _saving = SavingGuard::enter(&self.saves, &self.saving, &self.disposed);

        // The id choice and the index upsert must not interleave between saves
        let _serial = self.save_lock.lock().await;
        if self.is_disposed() {
            debug!("Controller disposed while waiting to save");
            return Err(ConvoError::Disposed);
        }

        let id = self
            .session_id
            .get()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let conversation = self.engine.conversation().get();
        let record = SessionRecord {
            id: id.clone(),
            transcript: conversation.source.clone(),
            preview: conversation.user_preview(),
            updated_at: Utc::now().to_rfc3339(),
        };

        store
            .put(&session_key(&id), serde_json::to_value(&record)?)
            .await?;

        let mut index = list_sessions(store.as_ref()).await?;
        index.retain(|s| s.id != id);
        index.insert(0, SessionSummary::from(&record));
        store
            .put(SESSION_INDEX_KEY, serde_json::to_value(&index)?)
            .await?;

        if self.is_disposed() {
            warn!("Controller disposed while saving session {}", id);
            return Ok(id);
        }
        self.session_id.set(Some(id.clone()));
        info!("Saved session {}", id);
        Ok(id)
    }

    /// Raw conversation source
    pub fn transcript(&self) -> String {
        self.engine.conversation().with(|convo| convo.source.clone())
    }

    /// What the status area should show right now
    pub fn status(&self) -> StatusIndicator {
        let open = self.engine.open_tasks().with(Vec::len);
        let current = self.engine.current_task().get();
        status_indicator(
            open,
            &self.visible_tasks().get(),
            current.as_deref(),
            self.busy.get(),
        )
    }

    pub fn engine(&self) -> &Arc<dyn ConversationEngine> {
        &self.engine
    }

    pub fn state(&self) -> ReadOnlyObservable<CtrlState> {
        self.state.read_only()
    }

    pub fn saving(&self) -> ReadOnlyObservable<bool> {
        self.saving.read_only()
    }

    pub fn session_id(&self) -> ReadOnlyObservable<Option<String>> {
        self.session_id.read_only()
    }

    pub fn busy(&self) -> ReadOnlyObservable<bool> {
        self.busy.read_only()
    }

    /// Open tasks past their reveal delay
    pub fn visible_tasks(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>> {
        self.visibility.visible()
    }

    pub fn conversation(&self) -> ReadOnlyObservable<Conversation> {
        self.engine.conversation()
    }

    pub fn open_tasks(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>> {
        self.engine.open_tasks()
    }

    pub fn current_task(&self) -> ReadOnlyObservable<Option<String>> {
        self.engine.current_task()
    }

    pub fn show_source(&self) -> ReadOnlyObservable<bool> {
        self.engine.show_source()
    }

    pub fn set_show_source(&self, show: bool) {
        if !self.is_disposed() {
            self.engine.set_show_source(show);
        }
    }
}

impl Drop for ConvoCtrl {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::llm::OfflineCompletion;

    fn ctrl(options: ConvoCtrlOptions) -> ConvoCtrl {
        ConvoCtrl::local(options, Arc::new(OfflineCompletion::new()))
    }

    #[test]
    fn test_session_key() {
        assert_eq!(session_key("abc"), "convo-session:abc");
    }

    #[test]
    fn test_engine_options_use_default_model() {
        let options = ConvoCtrl::engine_options(&ConvoCtrlOptions::default());
        assert_eq!(options.default_model, DEFAULT_MODEL);
        assert!(options.retriever.is_none());
    }

    #[tokio::test]
    async fn test_starts_loading_without_side_effects() {
        let ctrl = ctrl(ConvoCtrlOptions {
            template: Some("> system\nHi".to_string()),
            ..Default::default()
        });
        assert_eq!(ctrl.state().get(), CtrlState::Loading);
        assert!(ctrl.conversation().get().is_empty());
        assert!(!ctrl.busy().get());
        assert_eq!(ctrl.status(), StatusIndicator::Idle);
    }

    #[tokio::test]
    async fn test_reset_guard_restores_depth_on_error() {
        let ctrl = ctrl(ConvoCtrlOptions {
            session_id: Some("missing".to_string()),
            store: Some(Arc::new(MemoryStore::new())),
            ..Default::default()
        });

        let err = ctrl.reset_session().await.unwrap_err();
        assert!(matches!(err, ConvoError::NotFound(_)));
        assert_eq!(ctrl.reset_depth(), 0);
        assert!(!ctrl.is_resetting());
    }

    #[tokio::test]
    async fn test_session_without_store_is_config_error() {
        let ctrl = ctrl(ConvoCtrlOptions {
            session_id: Some("s1".to_string()),
            ..Default::default()
        });
        assert!(matches!(ctrl.init().await, Err(ConvoError::Config(_))));
        assert_eq!(ctrl.state().get(), CtrlState::Loading);
    }

    #[tokio::test]
    async fn test_save_requires_store() {
        let ctrl = ctrl(ConvoCtrlOptions::default());
        ctrl.init().await.unwrap();
        assert!(matches!(ctrl.save_session().await, Err(ConvoError::Config(_))));
        assert!(!ctrl.saving().get());
    }

    #[tokio::test]
    async fn test_show_source_passthrough() {
        let ctrl = ctrl(ConvoCtrlOptions::default());
        ctrl.set_show_source(true);
        assert!(ctrl.show_source().get());
        ctrl.dispose();
        ctrl.set_show_source(false);
        assert!(ctrl.show_source().get());
    }
}
