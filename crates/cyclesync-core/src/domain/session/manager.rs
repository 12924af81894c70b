//! Session manager: the single owner of session state
//!
//! Decides whether the application is loading, authenticated, in demo mode,
//! signed out, or in an error state, and notifies subscribers of every
//! transition in commit order.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::{AuthError, AuthResult};
use super::session::{MISCONFIGURED_REASON, Session, SessionMode, SessionState};
use super::subscription::{SubscriberRegistry, Subscription};
use super::validation::validate_credentials;
use super::view::View;
use crate::domain::flags::{DEMO_FLAG_KEY, DEMO_FLAG_VALUE, FlagStore, is_demo_flag_set};
use crate::domain::identity::{
    Identity, IdentityProvider, ProviderEvent, ProviderListener, ProviderResult,
    ProviderSubscription,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    Idle,
    Running,
    Done,
}

struct ManagerState {
    session: Session,
    init: InitPhase,
    /// Bumped by sign-out and shutdown; older results are discarded
    epoch: u64,
    provider_subscription: Option<ProviderSubscription>,
    /// Set once the provider listener reported an error
    listener_closed: bool,
    /// Whether the provider holds a signed-in user, whatever the mode
    provider_session: bool,
    /// Sign-in attempts of the current epoch still in flight
    pending_sign_ins: u32,
    /// Sign-in attempts of earlier epochs still in flight
    stale_sign_ins: u32,
    shut_down: bool,
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    flags: Arc<dyn FlagStore>,
    state: Mutex<ManagerState>,
    subscribers: SubscriberRegistry,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commit `next` and queue it for subscribers; the caller drains
    fn commit(&self, state: &mut ManagerState, next: SessionState) -> bool {
        if !state.session.transition(next) {
            return false;
        }
        info!(
            session_id = %state.session.id,
            mode = %state.session.mode(),
            generation = state.session.generation,
            "Session transition"
        );
        self.subscribers.enqueue(state.session.clone());
        true
    }

    /// Commit the outcome of initialization if `epoch` is still current
    ///
    /// Demo mode entered while initialization ran is kept.
    fn settle(&self, epoch: u64, next: SessionState) {
        {
            let mut state = self.lock();
            if state.epoch != epoch {
                debug!(epoch, "Discarding initialization result from an earlier epoch");
                return;
            }
            state.init = InitPhase::Done;
            if state.session.mode() == SessionMode::Demo {
                debug!(mode = %next.mode(), "Demo mode entered during initialization, keeping it");
                return;
            }
            self.commit(&mut state, next);
        }
        self.subscribers.drain();
    }

    /// Hold a provider subscription for `epoch` unless one is already held
    fn listen(self: &Arc<Self>, epoch: u64) -> ProviderResult<()> {
        let listener = Self::listener(Arc::downgrade(self), epoch);
        let subscription = self.provider.subscribe(listener)?;

        let leftover = {
            let mut state = self.lock();
            if state.epoch != epoch
                || state.listener_closed
                || state.shut_down
                || state.provider_subscription.is_some()
            {
                Some(subscription)
            } else {
                state.provider_subscription = Some(subscription);
                None
            }
        };
        match leftover {
            Some(mut subscription) => {
                debug!("Releasing provider subscription that is no longer needed");
                subscription.release();
            }
            None => debug!("Listening for identity provider session changes"),
        }
        Ok(())
    }

    async fn run_initialization(self: &Arc<Self>, epoch: u64) {
        let demo_flag = match self.flags.get(DEMO_FLAG_KEY).await {
            Ok(value) => is_demo_flag_set(value.as_deref()),
            Err(err) => {
                warn!(error = %err, "Failed to read demo flag, treating it as unset");
                false
            }
        };
        if demo_flag {
            info!("Demo flag set, entering demo mode without contacting the identity provider");
            self.settle(epoch, SessionState::demo());
            return;
        }

        if !self.provider.is_configured() {
            info!("Identity provider not configured, offering demo mode");
            self.settle(epoch, SessionState::ConfiguredAbsent);
            return;
        }

        match self.listen(epoch) {
            Ok(()) => {
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.init = InitPhase::Done;
                }
            }
            Err(err) => {
                warn!(error = %err, "Failed to subscribe to identity provider");
                self.settle(epoch, SessionState::error(MISCONFIGURED_REASON));
            }
        }
    }

    fn listener(shared: Weak<Self>, epoch: u64) -> ProviderListener {
        ProviderListener::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.on_provider_event(epoch, event);
            }
        })
    }

    fn on_provider_event(&self, epoch: u64, event: ProviderEvent) {
        let released = {
            let mut state = self.lock();
            if state.epoch != epoch || state.listener_closed || state.shut_down {
                debug!(epoch, "Ignoring notification from a released provider listener");
                return;
            }
            let in_demo = state.session.mode() == SessionMode::Demo;

            match event {
                ProviderEvent::IdentityChanged(identity) => {
                    if identity.is_some() && state.stale_sign_ins > 0 {
                        debug!("Ignoring identity from a sign-in superseded by sign out");
                        return;
                    }
                    state.provider_session = identity.is_some();
                    if in_demo {
                        debug!("Ignoring provider identity change while in demo mode");
                        return;
                    }
                    self.commit(&mut state, SessionState::from_provider_identity(identity));
                    None
                }
                ProviderEvent::Error(reason) => {
                    warn!(%reason, "Identity provider reported an error, listener closed");
                    state.listener_closed = true;
                    if !in_demo {
                        self.commit(&mut state, SessionState::error(reason));
                    }
                    state.provider_subscription.take()
                }
            }
        };

        if let Some(mut subscription) = released {
            subscription.release();
        }
        self.subscribers.drain();
    }
}

/// Tracks one in-flight sign-in so the counters stay right if it is dropped
struct SignInAttempt<'a> {
    shared: &'a Shared,
    epoch: u64,
    resolved: bool,
}

impl<'a> SignInAttempt<'a> {
    fn begin(shared: &'a Shared) -> Self {
        let epoch = {
            let mut state = shared.lock();
            state.pending_sign_ins += 1;
            state.epoch
        };
        Self {
            shared,
            epoch,
            resolved: false,
        }
    }

    /// Close the attempt, returning whether its epoch is still current
    fn finish(&mut self, state: &mut ManagerState) -> bool {
        self.resolved = true;
        if state.epoch == self.epoch {
            state.pending_sign_ins = state.pending_sign_ins.saturating_sub(1);
            true
        } else {
            state.stale_sign_ins = state.stale_sign_ins.saturating_sub(1);
            false
        }
    }
}

impl Drop for SignInAttempt<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            let shared = self.shared;
            let mut state = shared.lock();
            self.finish(&mut state);
        }
    }
}

/// Single source of truth for "is there a usable session, and what kind"
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Create a manager in `Loading`
    pub fn new(provider: Arc<dyn IdentityProvider>, flags: Arc<dyn FlagStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                flags,
                state: Mutex::new(ManagerState {
                    session: Session::new(),
                    init: InitPhase::Idle,
                    epoch: 0,
                    provider_subscription: None,
                    listener_closed: false,
                    provider_session: false,
                    pending_sign_ins: 0,
                    stale_sign_ins: 0,
                    shut_down: false,
                }),
                subscribers: SubscriberRegistry::new(),
            }),
        }
    }

    // ========== State ==========

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.shared.lock().session.clone()
    }

    /// View the presentation layer should render right now
    pub fn view(&self) -> View {
        View::for_session(&self.shared.lock().session)
    }

    /// Whether the identity provider has all its configuration
    pub fn provider_configured(&self) -> bool {
        self.shared.provider.is_configured()
    }

    /// Whether a live provider subscription is held
    pub fn is_listening(&self) -> bool {
        self.shared.lock().provider_subscription.is_some()
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    // ========== Subscriptions ==========

    /// Register `handler` for the current session and every later transition
    ///
    /// The handler runs before this returns unless another thread is
    /// delivering at the same moment, in which case that delivery picks it
    /// up in order. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self, handler: impl Fn(&Session) + Send + Sync + 'static) -> Subscription {
        let subscription = {
            let state = self.shared.lock();
            self.shared
                .subscribers
                .register(Arc::new(handler), &state.session)
        };
        self.shared.subscribers.drain();
        subscription
    }

    /// Wait until the session leaves `Loading`
    pub async fn settled(&self, timeout: Duration) -> Result<Session> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = self.subscribe(move |session| {
            let _ = tx.send(session.clone());
        });

        let wait = async {
            while let Some(session) = rx.recv().await {
                if !session.is_loading() {
                    return Some(session);
                }
            }
            None
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(Error::ShutDown),
            Err(_) => Err(Error::Timeout(timeout.as_secs())),
        }
    }

    // ========== Lifecycle ==========

    /// Determine the session state
    ///
    /// Idempotent: once started, further calls do nothing until a sign out
    /// resets the manager.
    pub async fn initialize(&self) {
        let epoch = {
            let mut state = self.shared.lock();
            if state.shut_down {
                debug!("Session manager shut down, not initializing");
                return;
            }
            if state.init != InitPhase::Idle {
                debug!(phase = ?state.init, "Initialization already started");
                return;
            }
            state.init = InitPhase::Running;
            state.epoch
        };

        self.shared.run_initialization(epoch).await;
    }

    /// Switch to demo mode with the fixed demo identity
    ///
    /// Always succeeds. The durable flag lets a cold start come back in demo
    /// mode; failing to write it only costs that.
    pub async fn enter_demo_mode(&self) {
        {
            let mut state = self.shared.lock();
            self.shared.commit(&mut state, SessionState::demo());
        }
        self.shared.subscribers.drain();
        info!("Entered demo mode");

        if let Err(err) = self.shared.flags.set(DEMO_FLAG_KEY, DEMO_FLAG_VALUE).await {
            warn!(error = %err, "Failed to persist demo flag, demo mode will not survive a restart");
        }
    }

    /// Clear the session and start over
    ///
    /// Removes the demo flag, signs out provider-side whenever the provider
    /// holds a user, even one hidden behind demo mode (failures are logged,
    /// never returned), releases the provider subscription, resets to
    /// `Loading`, and re-runs initialization. Any sign-in still in flight is
    /// discarded when it resolves.
    ///
    /// After a cold start straight into demo mode the provider was never
    /// consulted, so a user it still remembers comes back as
    /// `Authenticated` once demo mode is left.
    pub async fn sign_out(&self) {
        let (had_provider_session, subscription) = {
            let mut state = self.shared.lock();
            let had_provider_session = std::mem::take(&mut state.provider_session)
                || state.session.mode() == SessionMode::Authenticated;

            state.epoch += 1;
            state.stale_sign_ins += state.pending_sign_ins;
            state.pending_sign_ins = 0;
            state.listener_closed = false;
            state.session.reset();
            self.shared.subscribers.enqueue(state.session.clone());

            info!(
                session_id = %state.session.id,
                superseded = state.stale_sign_ins,
                "Signing out"
            );
            (had_provider_session, state.provider_subscription.take())
        };
        self.shared.subscribers.drain();

        if let Some(mut subscription) = subscription {
            subscription.release();
        }

        if let Err(err) = self.shared.flags.remove(DEMO_FLAG_KEY).await {
            warn!(error = %err, "Failed to clear demo flag");
        }

        if had_provider_session && let Err(err) = self.shared.provider.sign_out().await {
            warn!(error = %err, "Provider sign out failed, session cleared locally");
        }

        self.shared.lock().init = InitPhase::Idle;
        self.initialize().await;
    }

    /// Tear the manager down
    ///
    /// Releases the provider subscription and detaches every subscriber.
    /// Calling it again does nothing.
    pub fn shutdown(&self) {
        let subscription = {
            let mut state = self.shared.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.epoch += 1;
            state.stale_sign_ins += state.pending_sign_ins;
            state.pending_sign_ins = 0;
            state.provider_subscription.take()
        };

        if let Some(mut subscription) = subscription {
            subscription.release();
        }
        self.shared.subscribers.clear();
        info!("Session manager shut down");
    }

    // ========== Sign In ==========

    /// Sign in with email and password
    ///
    /// Invalid input never reaches the provider. Errors leave the mode as it
    /// was.
    pub async fn sign_in_with_credentials(&self, email: &str, password: &str) -> AuthResult<Session> {
        validate_credentials(email, password)?;
        let email = email.trim();
        self.attempt("credentials", |provider| async move {
            provider.sign_in(email, password).await
        })
        .await
    }

    /// Create an account with email and password, then sign it in
    pub async fn sign_up_with_credentials(&self, email: &str, password: &str) -> AuthResult<Session> {
        validate_credentials(email, password)?;
        let email = email.trim();
        self.attempt("sign_up", |provider| async move {
            provider.sign_up(email, password).await
        })
        .await
    }

    /// Sign in through the provider's interactive federated flow
    pub async fn sign_in_with_federated_provider(&self) -> AuthResult<Session> {
        self.attempt("federated", |provider| async move {
            provider.sign_in_federated().await
        })
        .await
    }

    async fn attempt<F, Fut>(&self, method: &'static str, op: F) -> AuthResult<Session>
    where
        F: FnOnce(Arc<dyn IdentityProvider>) -> Fut,
        Fut: Future<Output = ProviderResult<Identity>>,
    {
        if !self.shared.provider.is_configured() {
            warn!(method, "Sign in requested but the identity provider is not configured");
            return Err(AuthError::ProviderUnavailable(
                "identity provider is not configured".to_string(),
            ));
        }

        let mut attempt = SignInAttempt::begin(&self.shared);
        info!(method, "Requesting sign in from identity provider");
        let result = op(self.shared.provider.clone()).await;

        let mut needs_listener = false;
        let current = {
            let mut state = self.shared.lock();
            let current = attempt.finish(&mut state);
            if current && let Ok(identity) = &result {
                state.provider_session = true;
                self.shared
                    .commit(&mut state, SessionState::authenticated(identity.clone()));
                if state.provider_subscription.is_none() && !state.shut_down {
                    state.listener_closed = false;
                    needs_listener = true;
                }
            }
            current.then(|| state.session.clone())
        };
        self.shared.subscribers.drain();

        if needs_listener && let Err(err) = self.shared.listen(attempt.epoch) {
            warn!(error = %err, "Signed in but could not follow identity provider changes");
        }

        match (current, result) {
            (Some(session), Ok(_)) => {
                info!(method, "Signed in");
                Ok(session)
            }
            (Some(_), Err(err)) => {
                warn!(method, error = %err, "Sign in failed");
                Err(err.into())
            }
            (None, Ok(identity)) => {
                info!(
                    method,
                    user = %identity.id,
                    "Sign in resolved after sign out, discarding provider session"
                );
                if let Err(err) = self.shared.provider.sign_out().await {
                    warn!(error = %err, "Failed to discard superseded provider session");
                }
                Err(AuthError::Superseded)
            }
            (None, Err(err)) => {
                debug!(method, error = %err, "Superseded sign in failed");
                Err(AuthError::Superseded)
            }
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("SessionManager")
            .field("session", &state.session)
            .field("init", &state.init)
            .field("epoch", &state.epoch)
            .field("listening", &state.provider_subscription.is_some())
            .field("subscribers", &self.shared.subscribers.len())
            .finish()
    }
}
