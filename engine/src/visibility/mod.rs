//! Task visibility policy
//!
//! Short-lived tasks should not flicker in the status area. A task with a
//! non-zero reveal delay stays hidden until it has been open that long; a task
//! that closes first is never shown.
//!
//! Per task the states are:
//!
//! ```text
//! PendingReveal --(delay elapsed)--> Visible
//!       |                               |
//!       +--------(closed)-------> Closed <+
//! ```
//!
//! `PendingReveal` is skipped entirely when the delay is zero. Timers run on
//! the Tokio runtime that was current when [`TaskVisibility`] was created.

use sdk::observable::{DisposeBag, Observable, ReadOnlyObservable};
use sdk::task::{TaskId, TaskProgress};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Initial rendering decision for a newly opened task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// Render right away
    Visible,
    /// Render once the task has been open for this long
    After(Duration),
}

pub fn initial_reveal(delay: Duration) -> Reveal {
    if delay.is_zero() {
        Reveal::Visible
    } else {
        Reveal::After(delay)
    }
}

enum Phase {
    PendingReveal(Option<JoinHandle<()>>),
    Visible,
}

struct Entry {
    task: Arc<TaskProgress>,
    phase: Phase,
}

impl Entry {
    fn cancel_timer(&mut self) {
        if let Phase::PendingReveal(Some(timer)) = &self.phase {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    /// Bumped every time a visible list is computed
    generation: u64,
    disposed: bool,
}

struct Shared {
    state: Mutex<State>,
    visible: Observable<Vec<Arc<TaskProgress>>>,
    /// Generation of the list currently in `visible`
    published: AtomicU64,
    runtime: Option<Handle>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reconcile with the adapter's current open set
    fn sync(self: &Arc<Self>, open: &[Arc<TaskProgress>]) {
        let visible = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }

            let mut previous = std::mem::take(&mut state.entries);
            let mut entries = Vec::with_capacity(open.len());
            for task in open {
                match previous.iter().position(|e| e.task.id() == task.id()) {
                    Some(index) => entries.push(previous.swap_remove(index)),
                    None => entries.push(self.track(task)),
                }
            }
            for mut closed in previous {
                debug!("Task {} closed", closed.task.id());
                closed.cancel_timer();
            }

            state.entries = entries;
            state.snapshot()
        };
        self.publish(visible);
    }

    fn track(self: &Arc<Self>, task: &Arc<TaskProgress>) -> Entry {
        let phase = match initial_reveal(task.reveal_delay()) {
            Reveal::Visible => Phase::Visible,
            Reveal::After(delay) => match &self.runtime {
                Some(runtime) => {
                    let shared = Arc::downgrade(self);
                    let id = task.id();
                    Phase::PendingReveal(Some(runtime.spawn(reveal_after(shared, id, delay))))
                }
                None => {
                    warn!(
                        "No async runtime for reveal timer, showing task {} immediately",
                        task.id()
                    );
                    Phase::Visible
                }
            },
        };
        Entry {
            task: Arc::clone(task),
            phase,
        }
    }

    fn reveal(&self, id: TaskId) {
        let visible = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            let Some(entry) = state.entries.iter_mut().find(|e| e.task.id() == id) else {
                return;
            };
            if !matches!(entry.phase, Phase::PendingReveal(_)) {
                return;
            }
            entry.phase = Phase::Visible;
            debug!("Revealing task {} ({})", id, entry.task.name());
            state.snapshot()
        };
        self.publish(visible);
    }

    /// Lists are computed under the state lock but published after it is
    /// released, so a list older than the one already out is dropped.
    fn publish(&self, (generation, visible): (u64, Vec<Arc<TaskProgress>>)) {
        self.visible.set_if(visible, |_| {
            let newer = generation > self.published.load(Ordering::SeqCst);
            if newer {
                self.published.store(generation, Ordering::SeqCst);
            } else {
                debug!("Dropping stale visible list {}", generation);
            }
            newer
        });
    }
}

impl State {
    fn snapshot(&mut self) -> (u64, Vec<Arc<TaskProgress>>) {
        self.generation += 1;
        (self.generation, visible_tasks(&self.entries))
    }
}

async fn reveal_after(shared: Weak<Shared>, id: TaskId, delay: Duration) {
    tokio::time::sleep(delay).await;
    if let Some(shared) = shared.upgrade() {
        shared.reveal(id);
    }
}

fn visible_tasks(entries: &[Entry]) -> Vec<Arc<TaskProgress>> {
    entries
        .iter()
        .filter(|e| matches!(e.phase, Phase::Visible))
        .map(|e| Arc::clone(&e.task))
        .collect()
}

/// Applies reveal delays to an open-task stream and publishes the tasks that
/// should currently be rendered, in the stream's order.
pub struct TaskVisibility {
    shared: Arc<Shared>,
    subscriptions: DisposeBag,
}

impl TaskVisibility {
    /// Start tracking `open_tasks`. Must be called inside a Tokio runtime for
    /// reveal delays to be honoured.
    pub fn new(open_tasks: &ReadOnlyObservable<Vec<Arc<TaskProgress>>>) -> Self {
        let runtime = Handle::try_current().ok();
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            visible: Observable::new(Vec::new()),
            published: AtomicU64::new(0),
            runtime,
        });

        let subscriptions = DisposeBag::new();
        let weak = Arc::downgrade(&shared);
        subscriptions.add(open_tasks.subscribe(move |open| {
            if let Some(shared) = weak.upgrade() {
                shared.sync(open);
            }
        }));
        shared.sync(&open_tasks.get());

        Self {
            shared,
            subscriptions,
        }
    }

    /// Tasks to render right now
    pub fn visible(&self) -> ReadOnlyObservable<Vec<Arc<TaskProgress>>> {
        self.shared.visible.read_only()
    }

    pub fn is_visible(&self, id: TaskId) -> bool {
        self.shared.visible.with(|tasks| tasks.iter().any(|t| t.id() == id))
    }

    /// Number of open tasks still waiting out their reveal delay
    pub fn pending_count(&self) -> usize {
        self.shared
            .lock()
            .entries
            .iter()
            .filter(|e| matches!(e.phase, Phase::PendingReveal(_)))
            .count()
    }

    /// Stop tracking and cancel every reveal timer. Idempotent.
    pub fn dispose(&self) {
        self.subscriptions.dispose();
        let mut state = self.shared.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        for entry in &mut state.entries {
            entry.cancel_timer();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }
}

impl Drop for TaskVisibility {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::task::TaskList;

    #[test]
    fn test_initial_reveal() {
        assert_eq!(initial_reveal(Duration::ZERO), Reveal::Visible);
        assert_eq!(
            initial_reveal(Duration::from_millis(500)),
            Reveal::After(Duration::from_millis(500))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_is_visible_immediately() {
        let list = TaskList::new();
        let visibility = TaskVisibility::new(&list.observable());

        let task = list.open(TaskProgress::new("search"));
        assert!(visibility.is_visible(task.id()));
        assert_eq!(visibility.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_open_before_construction_are_tracked() {
        let list = TaskList::new();
        let task = list.open(TaskProgress::new("existing"));

        let visibility = TaskVisibility::new(&list.observable());
        assert_eq!(visibility.visible().get(), vec![task]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_timer() {
        let list = TaskList::new();
        let visibility = TaskVisibility::new(&list.observable());

        let task = list.open(TaskProgress::new("slow").with_reveal_delay_ms(300));
        assert_eq!(visibility.pending_count(), 1);
        list.close(task.id());
        assert_eq!(visibility.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(visibility.visible().get().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_tracking() {
        let list = TaskList::new();
        let visibility = TaskVisibility::new(&list.observable());
        let shown = list.open(TaskProgress::new("shown"));
        list.open(TaskProgress::new("hidden").with_reveal_delay_ms(100));

        visibility.dispose();
        visibility.dispose();
        assert!(visibility.is_disposed());
        assert_eq!(list.observable().subscriber_count(), 0);

        list.open(TaskProgress::new("late"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(visibility.visible().get(), vec![shown]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_visible_list_settles_on_latest_open_set() {
        let list = TaskList::new();
        let visibility = TaskVisibility::new(&list.observable());

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let list = list.clone();
                tokio::task::spawn_blocking(move || {
                    for i in 0..50 {
                        let task = list.open(
                            TaskProgress::new(format!("job {}-{}", worker, i))
                                .with_reveal_delay_ms(i % 3),
                        );
                        if i % 2 == 0 {
                            list.close(task.id());
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.unwrap();
        }
        // Let every reveal timer fire
        tokio::time::sleep(Duration::from_millis(50)).await;

        let open = list.observable().get();
        assert_eq!(open.len(), 100);
        assert_eq!(visibility.pending_count(), 0);
        assert_eq!(visibility.visible().get(), open);
    }

    #[test]
    fn test_without_runtime_delayed_tasks_show_immediately() {
        let list = TaskList::new();
        let visibility = TaskVisibility::new(&list.observable());

        let task = list.open(TaskProgress::new("slow").with_reveal_delay_ms(500));
        assert!(visibility.is_visible(task.id()));
    }
}
