//! Subscriber registry and FIFO dispatch of session snapshots
//!
//! Committed snapshots are queued in commit order and delivered by whichever
//! caller finds the queue idle. A handler that triggers another transition
//! only enqueues it; the outer drain delivers it once the current delivery
//! returns. Handlers are always invoked without any lock held.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::session::Session;

/// Callback receiving session snapshots
pub type SessionHandler = Arc<dyn Fn(&Session) + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: SessionHandler,
    active: Arc<AtomicBool>,
    /// Generation of the snapshot the subscriber started from
    since: u64,
}

enum Delivery {
    Initial { subscriber: u64, session: Session },
    Broadcast(Session),
}

#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<Delivery>,
    draining: bool,
}

#[derive(Default)]
struct RegistryInner {
    subscribers: Mutex<Vec<Subscriber>>,
    queue: Mutex<DispatchQueue>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RegistryInner {
    fn remove(&self, id: u64) {
        lock(&self.subscribers).retain(|sub| sub.id != id);
    }
}

/// Registry of session subscribers with an ordered dispatch queue
#[derive(Clone, Default)]
pub(crate) struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `handler` and queue its initial notification with `current`
    ///
    /// Must be called while the caller holds the lock that orders commits, so
    /// no broadcast older than `current` can reach the new subscriber.
    pub(crate) fn register(&self, handler: SessionHandler, current: &Session) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        lock(&self.inner.subscribers).push(Subscriber {
            id,
            handler,
            active: active.clone(),
            since: current.generation,
        });
        lock(&self.inner.queue).pending.push_back(Delivery::Initial {
            subscriber: id,
            session: current.clone(),
        });

        Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Queue a committed snapshot for every current subscriber
    pub(crate) fn enqueue(&self, session: Session) {
        lock(&self.inner.queue)
            .pending
            .push_back(Delivery::Broadcast(session));
    }

    /// Deliver queued snapshots until the queue is empty
    ///
    /// Returns immediately if another caller is already draining; that caller
    /// delivers everything queued in the meantime.
    pub(crate) fn drain(&self) {
        {
            let mut queue = lock(&self.inner.queue);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }

        let _reset = DrainReset(&self.inner);
        loop {
            let next = {
                let mut queue = lock(&self.inner.queue);
                match queue.pending.pop_front() {
                    Some(delivery) => delivery,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.deliver(next);
        }
    }

    fn deliver(&self, delivery: Delivery) {
        match delivery {
            Delivery::Initial {
                subscriber,
                session,
            } => {
                let target = lock(&self.inner.subscribers)
                    .iter()
                    .find(|sub| sub.id == subscriber)
                    .map(|sub| (sub.handler.clone(), sub.active.clone()));

                if let Some((handler, active)) = target
                    && active.load(Ordering::SeqCst)
                {
                    handler(&session);
                }
            }
            Delivery::Broadcast(session) => {
                let targets: Vec<(SessionHandler, Arc<AtomicBool>)> =
                    lock(&self.inner.subscribers)
                        .iter()
                        .filter(|sub| sub.since < session.generation)
                        .map(|sub| (sub.handler.clone(), sub.active.clone()))
                        .collect();

                for (handler, active) in targets {
                    // Re-checked per handler so an earlier handler can
                    // unsubscribe a later one mid-delivery.
                    if active.load(Ordering::SeqCst) {
                        handler(&session);
                    }
                }
            }
        }
    }

    /// Detach every subscriber and drop undelivered snapshots
    pub(crate) fn clear(&self) {
        let removed: Vec<Subscriber> = lock(&self.inner.subscribers).drain(..).collect();
        for sub in &removed {
            sub.active.store(false, Ordering::SeqCst);
        }
        lock(&self.inner.queue).pending.clear();
    }

    /// Number of registered subscribers
    pub(crate) fn len(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// Clears the draining flag if a handler panics mid-drain
struct DrainReset<'a>(&'a RegistryInner);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(&self.0.queue).draining = false;
        }
    }
}

/// Handle for a session subscription
///
/// The handler is removed when `unsubscribe` is called or the handle is
/// dropped. Use [`Subscription::detach`] to keep the handler registered for
/// the lifetime of the manager.
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Subscriber id, unique within one manager
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the handler is still registered
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Permanently remove the handler; calling again is a no-op
    pub fn unsubscribe(&mut self) {
        if self.active.swap(false, Ordering::SeqCst)
            && let Some(registry) = self.registry.upgrade()
        {
            registry.remove(self.id);
        }
    }

    /// Give up the handle without removing the handler
    pub fn detach(mut self) {
        self.registry = Weak::new();
        self.active = Arc::new(AtomicBool::new(false));
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
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
