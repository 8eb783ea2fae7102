//! Task progress records
//!
//! A [`TaskProgress`] describes one in-flight background operation of a
//! conversation (retrieval, a tool call, a completion). Records are shared as
//! `Arc<TaskProgress>`: the same instance represents the same logical task
//! from open to close, and its `progress`/`status` cells are updated in place.
//!
//! [`TaskList`] is the open collection an engine adapter owns. Removal from
//! the list is the only close signal; there is no error field, failures are
//! reported through `status` text or the conversation itself.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observable::{Observable, ReadOnlyObservable};

/// Process-unique identifier of a task record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One in-flight background operation
pub struct TaskProgress {
    id: TaskId,
    name: String,
    reveal_delay: Duration,
    document_ref: Option<String>,
    progress: Observable<Option<f32>>,
    status: Observable<Option<String>>,
    closed: AtomicBool,
}

impl TaskProgress {
    /// Create a record that is revealed immediately
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TaskId::next(),
            name: name.into(),
            reveal_delay: Duration::ZERO,
            document_ref: None,
            progress: Observable::new(None),
            status: Observable::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Only render the task once it has been open for `delay`
    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    pub fn with_reveal_delay_ms(self, millis: u64) -> Self {
        self.with_reveal_delay(Duration::from_millis(millis))
    }

    /// Link the task to a document the UI can open
    pub fn with_document(mut self, document_ref: impl Into<String>) -> Self {
        self.document_ref = Some(document_ref.into());
        self
    }

    pub fn with_status(self, status: impl Into<String>) -> Self {
        self.status.set(Some(status.into()));
        self
    }

    pub fn with_progress(self, fraction: f32) -> Self {
        self.progress.set(Some(clamp_fraction(fraction)));
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reveal_delay(&self) -> Duration {
        self.reveal_delay
    }

    pub fn document_ref(&self) -> Option<&str> {
        self.document_ref.as_deref()
    }

    pub fn progress(&self) -> Option<f32> {
        self.progress.get()
    }

    pub fn status(&self) -> Option<String> {
        self.status.get()
    }

    pub fn progress_observable(&self) -> ReadOnlyObservable<Option<f32>> {
        self.progress.read_only()
    }

    pub fn status_observable(&self) -> ReadOnlyObservable<Option<String>> {
        self.status.read_only()
    }

    /// Update the progress fraction (clamped to `[0, 1]`, NaN clears it).
    ///
    /// Returns `false` and changes nothing once the task is closed.
    pub fn set_progress(&self, fraction: Option<f32>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.progress.set(fraction.and_then(|f| {
            if f.is_nan() {
                None
            } else {
                Some(clamp_fraction(f))
            }
        }));
        true
    }

    /// Update the status line. Returns `false` once the task is closed.
    pub fn set_status(&self, status: Option<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.status.set(status);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn clamp_fraction(fraction: f32) -> f32 {
    fraction.clamp(0.0, 1.0)
}

impl PartialEq for TaskProgress {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskProgress {}

impl fmt::Debug for TaskProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProgress")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reveal_delay", &self.reveal_delay)
            .field("document_ref", &self.document_ref)
            .field("progress", &self.progress())
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Ordered collection of open task records
#[derive(Clone, Default)]
pub struct TaskList {
    open: Observable<Vec<Arc<TaskProgress>>>,
}

impl TaskList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the open set and publish the new list
    pub fn open(&self, task: TaskProgress) -> Arc<TaskProgress> {
        let task = Arc::new(task);
        let entry = Arc::clone(&task);
        self.open.update(move |tasks| tasks.push(entry));
        task
    }

    /// Remove a record from the open set. Returns `false` if it was not open.
    pub fn close(&self, id: TaskId) -> bool {
        let mut closed = None;
        self.open.update(|tasks| {
            if let Some(index) = tasks.iter().position(|t| t.id() == id) {
                closed = Some(tasks.remove(index));
            }
        });
        match closed {
            Some(task) => {
                task.mark_closed();
                true
            }
            None => false,
        }
    }

    /// Close every open record
    pub fn close_all(&self) {
        let tasks = self.open.get();
        for task in &tasks {
            task.mark_closed();
        }
        self.open.set(Vec::new());
    }

    pub fn snapshot(&self) -> Vec<Arc<TaskProgress>> {
        self.open.get()
    }

    pub fn len(&self) -> usize {
        self.open.with(|tasks| tasks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observable(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>> {
        self.open.read_only()
    }
}

impl fmt::Debug for TaskList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot().iter()).finish()
    }
}
