//! Shared fixtures for session manager integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cyclesync_core::domain::flags::{FlagResult, FlagStore, FlagStoreError};
use cyclesync_core::domain::identity::{
    Identity, IdentityProvider, ProviderError, ProviderEvent, ProviderListener, ProviderListeners,
    ProviderResult, ProviderSubscription,
};
use cyclesync_core::domain::session::{Session, SessionManager, SessionMode, Subscription};
use cyclesync_core::infrastructure::flags::MemoryFlagStore;
use tokio::sync::Notify;

struct Script {
    identity: Option<Identity>,
    sign_in_result: ProviderResult<Identity>,
    federated_result: ProviderResult<Identity>,
    subscribe_error: Option<ProviderError>,
    sign_out_error: Option<ProviderError>,
    gated: bool,
}

/// Identity provider whose answers and timing are set by the test
pub struct ScriptedProvider {
    configured: bool,
    script: Mutex<Script>,
    listeners: ProviderListeners,
    gate: Notify,
    entered: Notify,
    pub subscribe_calls: AtomicUsize,
    pub releases: Arc<AtomicUsize>,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

pub fn user(id: &str) -> Identity {
    Identity::new(id).with_email(format!("{}@example.com", id))
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::with_configured(true)
    }

    pub fn unconfigured() -> Self {
        Self::with_configured(false)
    }

    fn with_configured(configured: bool) -> Self {
        Self {
            configured,
            script: Mutex::new(Script {
                identity: None,
                sign_in_result: Ok(user("alice")),
                federated_result: Ok(user("gina")),
                subscribe_error: None,
                sign_out_error: None,
                gated: false,
            }),
            listeners: ProviderListeners::new(),
            gate: Notify::new(),
            entered: Notify::new(),
            subscribe_calls: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
            sign_in_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
        }
    }

    /// Provider-side identity reported on subscribe
    pub fn signed_in_as(self, identity: Identity) -> Self {
        self.script.lock().unwrap().identity = Some(identity);
        self
    }

    pub fn sign_in_result(&self, result: ProviderResult<Identity>) {
        self.script.lock().unwrap().sign_in_result = result;
    }

    pub fn fail_subscribe(&self, error: ProviderError) {
        self.script.lock().unwrap().subscribe_error = Some(error);
    }

    pub fn fail_sign_out(&self, error: ProviderError) {
        self.script.lock().unwrap().sign_out_error = Some(error);
    }

    /// Hold sign-in requests until `release_sign_in`
    pub fn gate_sign_in(&self) {
        self.script.lock().unwrap().gated = true;
    }

    pub fn release_sign_in(&self) {
        self.gate.notify_one();
    }

    /// Wait until a sign-in request has reached the provider
    pub async fn sign_in_started(&self) {
        self.entered.notified().await;
    }

    /// Push an event to every listener, as the provider would on its own
    pub fn emit(&self, event: ProviderEvent) {
        if let ProviderEvent::IdentityChanged(identity) = &event {
            self.script.lock().unwrap().identity = identity.clone();
        }
        self.listeners.emit(event);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.script.lock().unwrap().identity.clone()
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        Self::count(&self.subscribe_calls)
    }

    pub fn released(&self) -> usize {
        Self::count(&self.releases)
    }

    pub fn sign_ins(&self) -> usize {
        Self::count(&self.sign_in_calls)
    }

    pub fn sign_outs(&self) -> usize {
        Self::count(&self.sign_out_calls)
    }

    async fn resolve(&self, result: ProviderResult<Identity>) -> ProviderResult<Identity> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();

        let gated = self.script.lock().unwrap().gated;
        if gated {
            self.gate.notified().await;
        }

        if let Ok(identity) = &result {
            self.emit(ProviderEvent::IdentityChanged(Some(identity.clone())));
        }
        result
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn subscribe(&self, listener: ProviderListener) -> ProviderResult<ProviderSubscription> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let current = {
            let script = self.script.lock().unwrap();
            if let Some(err) = &script.subscribe_error {
                return Err(err.clone());
            }
            script.identity.clone()
        };

        let mut inner = self.listeners.register(listener, current);
        let releases = self.releases.clone();
        Ok(ProviderSubscription::new(move || {
            releases.fetch_add(1, Ordering::SeqCst);
            inner.release();
        }))
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> ProviderResult<Identity> {
        let result = self.script.lock().unwrap().sign_in_result.clone();
        self.resolve(result).await
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> ProviderResult<Identity> {
        let result = self.script.lock().unwrap().sign_in_result.clone();
        self.resolve(result).await
    }

    async fn sign_in_federated(&self) -> ProviderResult<Identity> {
        let result = self.script.lock().unwrap().federated_result.clone();
        self.resolve(result).await
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let error = self.script.lock().unwrap().sign_out_error.clone();
        match error {
            Some(err) => Err(err),
            None => {
                self.emit(ProviderEvent::IdentityChanged(None));
                Ok(())
            }
        }
    }
}

/// Flag store whose every operation fails
pub struct BrokenFlagStore;

#[async_trait]
impl FlagStore for BrokenFlagStore {
    async fn get(&self, _key: &str) -> FlagResult<Option<String>> {
        Err(FlagStoreError::Read("disk unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> FlagResult<()> {
        Err(FlagStoreError::Write("disk unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> FlagResult<()> {
        Err(FlagStoreError::Write("disk unavailable".to_string()))
    }
}

/// Flag store whose first read holds its answer until `release_read`
pub struct SlowFlagStore {
    inner: MemoryFlagStore,
    gated: AtomicBool,
    gate: Notify,
    entered: Notify,
}

impl SlowFlagStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryFlagStore::new(),
            gated: AtomicBool::new(true),
            gate: Notify::new(),
            entered: Notify::new(),
        }
    }

    /// Wait until the first read has fetched its value
    pub async fn read_started(&self) {
        self.entered.notified().await;
    }

    pub fn release_read(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl FlagStore for SlowFlagStore {
    async fn get(&self, key: &str) -> FlagResult<Option<String>> {
        let value = self.inner.get(key).await?;
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> FlagResult<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> FlagResult<()> {
        self.inner.remove(key).await
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub provider: Arc<ScriptedProvider>,
    pub flags: Arc<MemoryFlagStore>,
}

impl Harness {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self::with_flags(provider, Arc::new(MemoryFlagStore::new()))
    }

    pub fn with_flags(provider: ScriptedProvider, flags: Arc<MemoryFlagStore>) -> Self {
        let provider = Arc::new(provider);
        let manager = SessionManager::new(provider.clone(), flags.clone());
        Self {
            manager,
            provider,
            flags,
        }
    }

    /// A second manager over the same provider and flags, as after a restart
    pub fn restart(&self) -> SessionManager {
        SessionManager::new(self.provider.clone(), self.flags.clone())
    }
}

/// Snapshots seen by one subscriber
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Session>>>,
}

impl Recorder {
    pub fn attach(manager: &SessionManager) -> (Self, Subscription) {
        let recorder = Self::default();
        let sink = recorder.seen.clone();
        let subscription = manager.subscribe(move |session| sink.lock().unwrap().push(session.clone()));
        (recorder, subscription)
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.seen.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<SessionMode> {
        self.sessions().iter().map(Session::mode).collect()
    }

    pub fn generations(&self) -> Vec<u64> {
        self.sessions().iter().map(|s| s.generation).collect()
    }
}
