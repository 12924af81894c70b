//! Listener plumbing between identity providers and their consumers
//!
//! A provider pushes [`ProviderEvent`]s to every registered
//! [`ProviderListener`]. Registration hands back a [`ProviderSubscription`],
//! an RAII handle that removes the listener when released or dropped.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::types::{Identity, ProviderEvent};

/// Callback receiving provider session-change notifications
#[derive(Clone)]
pub struct ProviderListener {
    callback: Arc<dyn Fn(ProviderEvent) + Send + Sync>,
}

impl ProviderListener {
    /// Wrap a callback as a listener
    pub fn new(callback: impl Fn(ProviderEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Deliver an event to the listener
    pub fn notify(&self, event: ProviderEvent) {
        (self.callback)(event);
    }
}

impl fmt::Debug for ProviderListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderListener").finish_non_exhaustive()
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Handle for a live provider subscription
///
/// The listener is removed when the handle is released or dropped. Releasing
/// more than once is a no-op.
pub struct ProviderSubscription {
    release_fn: Option<ReleaseFn>,
}

impl ProviderSubscription {
    /// Create a handle that runs `release_fn` exactly once on release
    pub fn new(release_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release_fn: Some(Box::new(release_fn)),
        }
    }

    /// A handle with nothing to release
    pub fn detached() -> Self {
        Self { release_fn: None }
    }

    /// Whether the subscription is still held
    pub fn is_active(&self) -> bool {
        self.release_fn.is_some()
    }

    /// Release the subscription (normally done automatically on drop)
    pub fn release(&mut self) {
        if let Some(release_fn) = self.release_fn.take() {
            release_fn();
        }
    }
}

impl Drop for ProviderSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ProviderSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: Vec<(u64, ProviderListener)>,
}

/// Registry of listeners kept by a provider implementation
#[derive(Clone, Default)]
pub struct ProviderListeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl ProviderListeners {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` and immediately notify it of `current`
    pub fn register(
        &self,
        listener: ProviderListener,
        current: Option<Identity>,
    ) -> ProviderSubscription {
        let id = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            let id = table.next_id;
            table.next_id += 1;
            table.entries.push((id, listener.clone()));
            id
        };

        listener.notify(ProviderEvent::IdentityChanged(current));

        let table: Weak<Mutex<ListenerTable>> = Arc::downgrade(&self.table);
        ProviderSubscription::new(move || {
            if let Some(table) = table.upgrade() {
                table
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entries
                    .retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Deliver `event` to every registered listener
    ///
    /// Listeners are invoked outside the registry lock, so a listener may
    /// release its own subscription from inside the callback.
    pub fn emit(&self, event: ProviderEvent) {
        let listeners: Vec<ProviderListener> = self
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener.notify(event.clone());
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ProviderListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderListeners")
            .field("listeners", &self.len())
            .finish()
    }
}
