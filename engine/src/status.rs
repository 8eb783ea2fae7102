//! Busy and status indicator derivation
//!
//! `busy` is true while any background work is visible to the user: an open
//! task, a named current task, or a save in flight. The status indicator
//! decides what the status area shows.

use sdk::observable::{DisposeBag, Observable, ReadOnlyObservable};
use sdk::task::TaskProgress;
use std::sync::{Arc, Mutex};

/// What the status area should show
#[derive(Debug, Clone, PartialEq)]
pub enum StatusIndicator {
    /// Tasks are open; render the ones past their reveal delay (possibly none)
    Tasks(Vec<Arc<TaskProgress>>),
    /// Work is in progress but no task describes it
    Working,
    Idle,
}

pub fn status_indicator(
    open_task_count: usize,
    visible: &[Arc<TaskProgress>],
    current_task: Option<&str>,
    busy: bool,
) -> StatusIndicator {
    if open_task_count > 0 {
        StatusIndicator::Tasks(visible.to_vec())
    } else if current_task.is_some() || busy {
        StatusIndicator::Working
    } else {
        StatusIndicator::Idle
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BusySignals {
    open_tasks: bool,
    current_task: bool,
    saving: bool,
}

impl BusySignals {
    fn busy(&self) -> bool {
        self.open_tasks || self.current_task || self.saving
    }
}

/// Keep an observable `busy` flag in sync with its three inputs.
///
/// The subscriptions are added to `bag`; disposing the bag freezes `busy` at
/// its last value.
pub fn derive_busy(
    open_tasks: &ReadOnlyObservable<Vec<Arc<TaskProgress>>>,
    current_task: &ReadOnlyObservable<Option<String>>,
    saving: &ReadOnlyObservable<bool>,
    bag: &DisposeBag,
) -> Observable<bool> {
    let signals = Arc::new(Mutex::new(BusySignals {
        open_tasks: open_tasks.with(|tasks| !tasks.is_empty()),
        current_task: current_task.with(Option::is_some),
        saving: saving.get(),
    }));
    let busy = Observable::new(lock(&signals).busy());

    bag.add(open_tasks.subscribe(watch(&signals, &busy, |s, tasks: &Vec<Arc<TaskProgress>>| {
        s.open_tasks = !tasks.is_empty()
    })));
    bag.add(current_task.subscribe(watch(&signals, &busy, |s, task: &Option<String>| {
        s.current_task = task.is_some()
    })));
    bag.add(saving.subscribe(watch(&signals, &busy, |s, saving: &bool| {
        s.saving = *saving
    })));

    busy
}

fn watch<T>(
    signals: &Arc<Mutex<BusySignals>>,
    busy: &Observable<bool>,
    apply: impl Fn(&mut BusySignals, &T) + Send + Sync + 'static,
) -> impl Fn(&T) + Send + Sync + 'static {
    let signals = Arc::clone(signals);
    let busy = busy.clone();
    move |value: &T| {
        let next = {
            let mut signals = lock(&signals);
            apply(&mut *signals, value);
            signals.busy()
        };
        busy.set(next);
    }
}

fn lock(signals: &Mutex<BusySignals>) -> std::sync::MutexGuard<'_, BusySignals> {
    signals
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
