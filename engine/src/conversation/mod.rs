//! Local conversation engine
//!
//! [`LocalEngine`] is the [`ConversationEngine`] used by the binary. It keeps
//! the conversation as `> role` text, asks a [`CompletionService`] for each
//! assistant reply, and reports its background work as task records.
//!
//! Every reply is tagged with the generation it was requested in. `clear()`
//! and `dispose()` start a new generation, so a reply that arrives afterwards
//! is dropped instead of being appended to a conversation it no longer
//! belongs to.

use async_trait::async_trait;
use sdk::engine::{
    Conversation, ConversationEngine, EngineOptions, Message, RetrievedDocument, Role,
};
use sdk::errors::{ConvoError, Result};
use sdk::observable::{Observable, ReadOnlyObservable};
use sdk::task::{TaskId, TaskList, TaskProgress};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::llm::{CompletionRequest, CompletionService};

/// Name of the task shown while documents are being retrieved
pub const RETRIEVAL_TASK: &str = "Searching documents";

/// Name of the task shown while the assistant reply is generated
pub const COMPLETION_TASK: &str = "Generating response";

/// Fast replies finish before this and never show a task line
pub const COMPLETION_REVEAL_DELAY_MS: u64 = 500;

/// Value of `current_task` while a user message is being answered
pub const RESPONDING: &str = "responding";

/// Seed used when no template is configured. The `> nop` block marks where
/// the system part ends; session previews start after it.
pub const DEFAULT_TEMPLATE: &str = "> system
You are a helpful assistant embedded in a todo list app. Help the user plan,
add, and complete their todos. Keep answers short.

> nop
// ======== END SYSTEM ========
";

pub struct LocalEngine {
    completion: Arc<dyn CompletionService>,
    options: Mutex<EngineOptions>,
    template: Mutex<String>,
    conversation: Observable<Conversation>,
    tasks: TaskList,
    current_task: Observable<Option<String>>,
    show_source: Observable<bool>,
    generation: AtomicU64,
    disposed: AtomicBool,
}

impl LocalEngine {
    pub fn new(completion: Arc<dyn CompletionService>, options: EngineOptions) -> Self {
        Self {
            completion,
            options: Mutex::new(options),
            template: Mutex::new(String::new()),
            conversation: Observable::new(Conversation::default()),
            tasks: TaskList::new(),
            current_task: Observable::new(None),
            show_source: Observable::new(false),
            generation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> EngineOptions {
        lock(&self.options).clone()
    }

    pub fn template(&self) -> String {
        lock(&self.template).clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Direct access to the open task list, for callers that report their
    /// own background work against this conversation
    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.is_disposed() && self.generation() == generation
    }

    async fn retrieve(
        &self,
        options: &EngineOptions,
        query: &str,
        generation: u64,
    ) -> Result<Vec<RetrievedDocument>> {
        let Some(retriever) = options.retriever.as_ref() else {
            return Ok(Vec::new());
        };

        let task = self.open_task(TaskProgress::new(RETRIEVAL_TASK));
        let documents = retriever.retrieve(query).await?;

        if self.is_current(generation) {
            task.task.set_status(Some(format!("{} document(s) found", documents.len())));
            if let Some(url) = documents.iter().find_map(|d| d.url.as_deref()) {
                debug!("Top retrieved document: {}", url);
            }
        }
        Ok(documents)
    }

    fn open_task(&self, task: TaskProgress) -> OpenTask<'_> {
        let task = self.tasks.open(task);
        debug!("Opened task {} ({})", task.id(), task.name());
        OpenTask { engine: self, task }
    }
}

/// Closes a task record when dropped, unless the engine was disposed
struct OpenTask<'a> {
    engine: &'a LocalEngine,
    task: Arc<TaskProgress>,
}

impl OpenTask<'_> {
    fn id(&self) -> TaskId {
        self.task.id()
    }
}

impl Drop for OpenTask<'_> {
    fn drop(&mut self) {
        if !self.engine.is_disposed() && self.engine.tasks.close(self.id()) {
            debug!("Closed task {} ({})", self.id(), self.task.name());
        }
    }
}

/// Clears `current_task` when the reply is settled, unless it went stale
struct Responding<'a> {
    engine: &'a LocalEngine,
    generation: u64,
}

impl Drop for Responding<'_> {
    fn drop(&mut self) {
        if self.engine.is_current(self.generation) {
            self.engine.current_task.set(None);
        }
    }
}

fn context_message(documents: &[RetrievedDocument]) -> Option<Message> {
    if documents.is_empty() {
        return None;
    }
    let mut content = String::from("Relevant documents:\n");
    for document in documents {
        content.push_str("\n## ");
        content.push_str(&document.title);
        content.push('\n');
        content.push_str(document.content.trim());
        content.push('\n');
    }
    Some(Message::new(Role::System, content))
}

#[async_trait]
impl ConversationEngine for LocalEngine {
    fn configure(&self, options: EngineOptions) {
        debug!("Configuring engine with model {}", options.default_model);
        *lock(&self.options) = options;
    }

    fn set_template(&self, template: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(ConvoError::Disposed);
        }
        if template.trim().is_empty() {
            return Err(ConvoError::Config("Conversation template is empty".to_string()));
        }
        *lock(&self.template) = template.to_string();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.is_disposed() {
            debug!("Ignoring clear on disposed engine");
            return Ok(());
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tasks.close_all();
        self.current_task.set(None);
        self.conversation.set(Conversation::parse(&self.template()));
        info!("Conversation cleared");
        Ok(())
    }

    async fn append_user_message(&self, text: &str) -> Result<()> {
        if self.is_disposed() {
            return Err(ConvoError::Disposed);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ConvoError::Validation("Message is empty".to_string()));
        }

        let generation = self.generation();
        let options = self.options();
        let conversation = self.conversation.get().append(Role::User, text);
        self.conversation.set(conversation.clone());
        self.current_task.set(Some(RESPONDING.to_string()));
        let _responding = Responding {
            engine: self,
            generation,
        };

        let documents = self.retrieve(&options, text, generation).await?;
        if !self.is_current(generation) {
            debug!("Conversation changed during retrieval, dropping message");
            return Ok(());
        }

        let mut messages = conversation.messages.clone();
        if let Some(context) = context_message(&documents) {
            let at = messages.len().saturating_sub(1);
            messages.insert(at, context);
        }
        let request = CompletionRequest::new(options.default_model.as_str(), &messages);

        let reply = {
            let _task = self.open_task(
                TaskProgress::new(COMPLETION_TASK).with_reveal_delay_ms(COMPLETION_REVEAL_DELAY_MS),
            );
            self.completion.complete(request).await
        };

        if !self.is_current(generation) {
            debug!("Discarding stale completion from generation {}", generation);
            return Ok(());
        }

        match reply {
            Ok(reply) => {
                self.conversation
                    .update(|convo| *convo = convo.append(Role::Assistant, &reply));
                Ok(())
            }
            Err(e) => {
                warn!("Completion failed: {}", e);
                Err(e)
            }
        }
    }

    fn conversation(&self) -> ReadOnlyObservable<Conversation> {
        self.conversation.read_only()
    }

    fn open_tasks(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>> {
        self.tasks.observable()
    }

    fn current_task(&self) -> ReadOnlyObservable<Option<String>> {
        self.current_task.read_only()
    }

    fn show_source(&self) -> ReadOnlyObservable<bool> {
        self.show_source.read_only()
    }

    fn set_show_source(&self, show: bool) {
        if !self.is_disposed() {
            self.show_source.set(show);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("Conversation engine disposed");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
