//! Observable value cells
//!
//! [`Observable`] is the reactive primitive everything above it is built on:
//! a shared value plus an ordered list of subscriber callbacks that are
//! invoked synchronously whenever the value changes. Owners keep the
//! `Observable` and hand out [`ReadOnlyObservable`] views so nobody else can
//! mutate the cell.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order, exactly once per change.
//! 2. Setting a value equal to the current value is a no-op (no version bump,
//!    no notification).
//! 3. A `set` issued while the cell is already notifying is queued and
//!    delivered after the current round, so every subscriber sees changes in
//!    the order they were made and the last value delivered equals `get()`.
//! 4. Unsubscribing (explicitly or by dropping the [`Subscription`]) removes
//!    the callback before the next notification round.
//!
//! No lock is held while callbacks run, so callbacks may read, set, or
//! subscribe to any cell. The exceptions are [`Observable::with`],
//! [`Observable::update`] and the predicate of [`Observable::set_if`], whose
//! closures run under the cell's lock.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Inner<T> {
    value: T,
    version: u64,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
    notifying: bool,
    pending: VecDeque<T>,
}

/// Ends a notification round if a subscriber panics mid-delivery. Values
/// still queued for that round are dropped; the cell keeps the latest one.
struct NotifyRound<'a, T> {
    inner: &'a Mutex<Inner<T>>,
}

impl<T> Drop for NotifyRound<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut inner = lock(self.inner);
            inner.notifying = false;
            inner.pending.clear();
        }
    }
}

/// A shared, change-notifying value.
///
/// Cloning an `Observable` creates another handle to the **same** cell.
pub struct Observable<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + 'static> Observable<T> {
    /// Create a cell holding `value` at version 0
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                version: 0,
                next_id: 0,
                subscribers: Vec::new(),
                notifying: false,
                pending: VecDeque::new(),
            })),
        }
    }

    /// Return a clone of the current value
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Borrow the current value without cloning it.
    ///
    /// The cell is locked while `f` runs; `f` must not touch this cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = lock(&self.inner);
        f(&inner.value)
    }

    /// Number of accepted changes since creation
    pub fn version(&self) -> u64 {
        lock(&self.inner).version
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    /// Replace the value and notify subscribers if it changed
    pub fn set(&self, value: T) {
        self.commit(lock(&self.inner), value);
    }

    /// Like [`set`](Self::set), but only if `accept` approves the current
    /// value. `accept` runs under the cell's lock, so competing writers are
    /// decided in the order their values land. It must not touch the cell.
    pub fn set_if(&self, value: T, accept: impl FnOnce(&T) -> bool) {
        let inner = lock(&self.inner);
        if accept(&inner.value) {
            self.commit(inner, value);
        }
    }

    /// Edit the value in place, then apply the same change check as [`set`](Self::set).
    /// `f` runs under the cell's lock and must not touch the cell.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let inner = lock(&self.inner);
        let mut next = inner.value.clone();
        f(&mut next);
        self.commit(inner, next);
    }

    fn commit(&self, mut inner: MutexGuard<'_, Inner<T>>, value: T) {
        if inner.value == value {
            return;
        }
        inner.value = value.clone();
        inner.version += 1;

        if inner.notifying {
            inner.pending.push_back(value);
            return;
        }
        inner.notifying = true;
        drop(inner);
        let _round = NotifyRound { inner: &self.inner };

        let mut current = value;
        loop {
            let subscribers: Vec<Callback<T>> = lock(&self.inner)
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect();

            for callback in &subscribers {
                callback(&current);
            }

            let mut inner = lock(&self.inner);
            match inner.pending.pop_front() {
                Some(next) => current = next,
                None => {
                    inner.notifying = false;
                    break;
                }
            }
        }
    }

    /// Register a callback invoked with every new value
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::new(callback)));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let removed = {
                let mut guard = lock(&inner);
                guard
                    .subscribers
                    .iter()
                    .position(|(sid, _)| *sid == id)
                    .map(|index| guard.subscribers.remove(index))
            };
            // Dropped outside the lock: the callback may own subscriptions to this cell.
            drop(removed);
        })
    }

    /// A view of this cell that cannot be written through
    pub fn read_only(&self) -> ReadOnlyObservable<T> {
        ReadOnlyObservable { cell: self.clone() }
    }
}

impl<T: Clone + PartialEq + Send + Default + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Read and subscribe access to an [`Observable`] owned by someone else
pub struct ReadOnlyObservable<T> {
    cell: Observable<T>,
}

impl<T> Clone for ReadOnlyObservable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cell.fmt(f)
    }
}

impl<T: Clone + PartialEq + Send + 'static> ReadOnlyObservable<T> {
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.cell.with(f)
    }

    pub fn version(&self) -> u64 {
        self.cell.version()
    }

    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }
}

/// Handle returned by `subscribe`.
///
/// [`unsubscribe`](Self::unsubscribe) detaches the callback; further calls are
/// no-ops. Dropping the handle also detaches it.
pub struct Subscription {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    pub fn unsubscribe(&self) {
        let detach = lock(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.detach).is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns a group of subscriptions and releases them together.
///
/// Subscriptions added after `dispose` are released immediately.
#[derive(Debug, Default)]
pub struct DisposeBag {
    subscriptions: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: Subscription) {
        if self.disposed.load(Ordering::SeqCst) {
            subscription.unsubscribe();
            return;
        }
        lock(&self.subscriptions).push(subscription);
    }

    pub fn len(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Release every held subscription. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }
}
