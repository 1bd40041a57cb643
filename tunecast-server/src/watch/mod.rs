//! Shared state with live updates among multiple parties.
//!
//! A [`Value`] holds one value behind a lock and lets any number of watchers
//! observe it. Each watch runs its handler on its own Tokio task:
//!
//! - Handler executions for one watch never overlap.
//! - The first execution sees the value current when the watch was created.
//! - If the value changes while a handler is running, the handler runs once
//!   more with the latest value. Intermediate values are dropped.
//! - [`Watch::cancel`] never blocks and may be called from the handler itself.
//!   [`Watch::wait`] resolves once no handler is running and none will start.
//!
//! Writers are never blocked by slow handlers, and watchers are never blocked
//! by each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{trace, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

type Handler<T> = Box<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Synchronized storage for a value of type `T` that notifies watchers of
/// every update.
pub struct Value<T> {
    registry: Arc<RwLock<Registry<T>>>,
}

struct Registry<T> {
    // Every registered watch has been given every value stored here since it
    // was registered. The write lock protects this, and the value itself.
    value: T,
    watchers: HashMap<u64, Arc<WatchState<T>>>,
    next_id: u64,
}

impl<T> Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a value that initially stores `value`.
    pub fn new(value: T) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                value,
                watchers: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Get a copy of the current value.
    pub fn get(&self) -> T {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Store `value` and schedule its delivery to every active watch.
    ///
    /// Returns as soon as delivery is scheduled; handlers run elsewhere.
    pub fn set(&self, value: T) {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for watch in registry.watchers.values() {
            watch.update(value.clone());
        }
        registry.value = value;
    }

    /// Start watching this value.
    ///
    /// `handler` is first called with the value stored at the time of this
    /// call, then with later values as described in the module docs. The
    /// returned [`Watch`] controls the lifetime of the subscription.
    ///
    /// Handlers run on the Tokio runtime that is current when `watch` is
    /// called.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn watch<F, Fut>(&self, handler: F) -> Watch
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let id = registry.next_id;
        registry.next_id += 1;

        let state = Arc::new(WatchState {
            id,
            handler: Box::new(move |x| handler(x).boxed()),
            runtime: Handle::current(),
            slot: Mutex::new(Slot::default()),
            terminated: CancellationToken::new(),
            registry: Arc::downgrade(&self.registry),
        });

        state.update(registry.value.clone());
        registry.watchers.insert(id, Arc::clone(&state));
        trace!("[Watch {}] Registered ({} active)", id, registry.watchers.len());

        Watch { inner: state }
    }

    /// Number of watches that have not been cancelled.
    #[cfg(test)]
    pub fn watcher_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .watchers
            .len()
    }
}

impl<T> Default for Value<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Handle to a single watch on a [`Value`].
///
/// Clones refer to the same watch.
#[derive(Clone)]
pub struct Watch {
    inner: Arc<dyn Subscription>,
}

impl Watch {
    /// Request that this watch terminate as soon as possible.
    ///
    /// No handler execution is scheduled for values stored after this call.
    /// A handler that is already running is allowed to finish. Calling this
    /// more than once, or from inside the handler, is fine.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Wait until this watch has terminated following a call to
    /// [`cancel`](Self::cancel).
    ///
    /// Once this returns, no handler execution is running and none will ever
    /// start again.
    pub async fn wait(&self) {
        self.inner.terminated().cancelled().await;
    }

    /// Whether the watch has fully terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated().is_cancelled()
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// Type-erased view of a watch, so that [`Watch`] does not carry `T`.
trait Subscription: Send + Sync {
    fn cancel(&self);
    fn terminated(&self) -> &CancellationToken;
}

struct WatchState<T> {
    id: u64,
    handler: Handler<T>,
    runtime: Handle,
    slot: Mutex<Slot<T>>,
    terminated: CancellationToken,
    registry: Weak<RwLock<Registry<T>>>,
}

struct Slot<T> {
    /// Latest value not yet handed to the handler.
    pending: Option<T>,
    /// Whether a worker task currently owns delivery for this watch.
    running: bool,
    cancelled: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            pending: None,
            running: false,
            cancelled: false,
        }
    }
}

impl<T> WatchState<T>
where
    T: Send + Sync + 'static,
{
    fn lock_slot(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any pending value with `x`, starting a worker if needed.
    /// Never blocks on the handler.
    fn update(self: &Arc<Self>, x: T) {
        let mut slot = self.lock_slot();
        if slot.cancelled {
            return;
        }

        slot.pending = Some(x);
        if !slot.running {
            slot.running = true;
            self.runtime.spawn(Arc::clone(self).run());
        }
    }

    async fn run(self: Arc<Self>) {
        while let Some(x) = self.take_pending() {
            // The handler runs in its own task so that a panic only ends that
            // task, and later values are still delivered.
            let state = Arc::clone(&self);
            let execution = self.runtime.spawn(async move { (state.handler)(x).await });

            if let Err(e) = execution.await {
                if e.is_panic() {
                    warn!("[Watch {}] Handler panicked; continuing with later values", self.id);
                } else {
                    warn!("[Watch {}] Handler task did not complete: {}", self.id, e);
                }
            }
        }
    }

    /// Take the next value to deliver, or release ownership of delivery.
    fn take_pending(&self) -> Option<T> {
        let mut slot = self.lock_slot();
        if let Some(x) = slot.pending.take() {
            return Some(x);
        }

        slot.running = false;
        if slot.cancelled {
            self.terminated.cancel();
            trace!("[Watch {}] Terminated after final execution", self.id);
        }
        None
    }
}

impl<T> Subscription for WatchState<T>
where
    T: Send + Sync + 'static,
{
    fn cancel(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .watchers
                .remove(&self.id);
        }

        let mut slot = self.lock_slot();
        if slot.cancelled {
            return;
        }
        slot.cancelled = true;
        slot.pending = None;

        if !slot.running {
            self.terminated.cancel();
            trace!("[Watch {}] Terminated while idle", self.id);
        }
    }

    fn terminated(&self) -> &CancellationToken {
        &self.terminated
    }
}
