//! Session lifecycle controller.
//!
//! # State machine
//! ```text
//!        activity (resets idle clock, best-effort heartbeat)
//!          ┌─────┐
//!          ▼     │
//!      ┌─ Active ┘◀────────────────────────────┐
//!      │     │                                 │
//! idle │     │ refresh tick every 4 min        │ reauthenticate
//! 15m  │     │ (failure SESSION_EXPIRED only)  │ (logout handshake first)
//!      ▼     ▼                                 │
//!      Expired ────────────────────────────────┘
//! ```
//!
//! On entry to `Expired` the held credential is cleared, the UI-freeze
//! flag is set and every background timer stops. Only an explicit
//! re-authentication leaves `Expired`; an atomic guard makes the
//! transition fire exactly once even if an idle check and a refresh
//! failure race.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::{ApiError, SessionClient};

/// Server-side access token lifetime assumed until a refresh reports one.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Backend operations the controller depends on.
///
/// Implemented by [`SessionClient`]; tests substitute a scripted fake.
pub trait SessionApi: Send + Sync + 'static {
    /// Exchange the current credential for a renewed one, returning the
    /// new token lifetime.
    fn refresh(&self) -> impl Future<Output = Result<Duration, ApiError>> + Send;

    /// Record user activity server-side.
    fn heartbeat(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// End the session server-side.
    fn end_session(&self) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl SessionApi for SessionClient {
    async fn refresh(&self) -> Result<Duration, ApiError> {
        let renewed = self.refresh_token().await?;
        Ok(Duration::from_secs(renewed.expires_in))
    }

    async fn heartbeat(&self) -> Result<(), ApiError> {
        self.record_activity().await
    }

    async fn end_session(&self) -> Result<(), ApiError> {
        self.logout().await
    }
}

/// Timing knobs for the session lifecycle.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity window after which the session is forcibly expired.
    pub idle_timeout: Duration,

    /// How often the idle clock is inspected.
    pub idle_check_interval: Duration,

    /// Cadence of proactive token refresh, ahead of the server-side expiry.
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            idle_check_interval: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(4 * 60),
        }
    }
}

/// Observable session state, published to the embedding UI.
///
/// Invariant: `ui_frozen` is true whenever `expired` is true.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub expired: bool,
    /// When set, the UI must block all pointer and keyboard interaction.
    pub ui_frozen: bool,
    /// Opaque label of the held credential; cleared on expiry.
    pub credential: Option<String>,
    pub last_activity: Instant,
    pub token_expires_at: Instant,
}

struct Inner<T: SessionApi> {
    api: Arc<T>,
    config: SessionConfig,
    state: Mutex<SessionSnapshot>,
    /// Exactly-once guard for the `Active -> Expired` transition.
    expiry_fired: AtomicBool,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Stop signal for the current timer generation.
    timer_stop: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: SessionApi> Inner<T> {
    fn expire(&self, reason: &str) {
        if self
            .expiry_fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::info!(reason, "Session expired, locking UI");
        {
            let mut state = self.state.lock().expect("session state mutex poisoned");
            state.expired = true;
            state.ui_frozen = true;
            state.credential = None;
            self.snapshot_tx.send_replace(state.clone());
        }
        self.stop_timers();
    }

    fn stop_timers(&self) {
        if let Some(stop) = self
            .timer_stop
            .lock()
            .expect("timer stop mutex poisoned")
            .take()
        {
            let _ = stop.send(true);
        }
    }
}

/// Drives idle detection, proactive refresh and the forced-logout lock
/// for one authenticated session.
///
/// Cheap to clone; all clones share the same session. Call
/// [`SessionController::shutdown`] on teardown so no timer outlives the UI.
pub struct SessionController<T: SessionApi> {
    inner: Arc<Inner<T>>,
}

impl<T: SessionApi> Clone for SessionController<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SessionApi> SessionController<T> {
    /// Start tracking a freshly authenticated session.
    pub fn start(api: Arc<T>, config: SessionConfig, credential: impl Into<String>) -> Self {
        let now = Instant::now();
        let state = SessionSnapshot {
            expired: false,
            ui_frozen: false,
            credential: Some(credential.into()),
            last_activity: now,
            token_expires_at: now + DEFAULT_TOKEN_TTL,
        };
        let (snapshot_tx, _) = watch::channel(state.clone());

        let controller = Self {
            inner: Arc::new(Inner {
                api,
                config,
                state: Mutex::new(state),
                expiry_fired: AtomicBool::new(false),
                snapshot_tx,
                timer_stop: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        controller.spawn_timers();
        controller
    }

    /// Watch channel the embedding UI observes for freeze and expiry.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner
            .state
            .lock()
            .expect("session state mutex poisoned")
            .clone()
    }

    pub fn is_expired(&self) -> bool {
        self.snapshot().expired
    }

    /// Record user interaction: resets the idle clock and fires a
    /// best-effort heartbeat. A failed heartbeat is logged, never
    /// state-changing.
    pub fn record_activity(&self) {
        {
            let mut state = self
                .inner
                .state
                .lock()
                .expect("session state mutex poisoned");
            if state.expired {
                return;
            }
            state.last_activity = Instant::now();
            self.inner.snapshot_tx.send_replace(state.clone());
        }

        let api = Arc::clone(&self.inner.api);
        tokio::spawn(async move {
            if let Err(e) = api.heartbeat().await {
                tracing::debug!(error = %e, "Activity heartbeat failed");
            }
        });
    }

    /// The only path out of `Expired`: a best-effort logout handshake,
    /// then a fresh credential and restarted timers.
    pub async fn reauthenticate(&self, credential: impl Into<String>) {
        if !self.is_expired() {
            return;
        }

        if let Err(e) = self.inner.api.end_session().await {
            tracing::debug!(error = %e, "Logout handshake failed, proceeding anyway");
        }

        {
            let mut state = self
                .inner
                .state
                .lock()
                .expect("session state mutex poisoned");
            let now = Instant::now();
            state.expired = false;
            state.ui_frozen = false;
            state.credential = Some(credential.into());
            state.last_activity = now;
            state.token_expires_at = now + DEFAULT_TOKEN_TTL;
            self.inner.snapshot_tx.send_replace(state.clone());
        }
        self.inner.expiry_fired.store(false, Ordering::SeqCst);
        self.spawn_timers();
    }

    /// Stop all background timers. Call on UI teardown; expiry stops them
    /// on its own.
    pub fn shutdown(&self) {
        self.inner.stop_timers();
        for task in self
            .inner
            .tasks
            .lock()
            .expect("task list mutex poisoned")
            .drain(..)
        {
            task.abort();
        }
    }

    fn spawn_timers(&self) {
        // Replace any previous generation before starting a new one.
        self.shutdown();

        let (stop_tx, stop_rx) = watch::channel(false);
        *self
            .inner
            .timer_stop
            .lock()
            .expect("timer stop mutex poisoned") = Some(stop_tx);

        let idle = self.spawn_idle_watcher(stop_rx.clone());
        let refresh = self.spawn_refresh_ticker(stop_rx);

        self.inner
            .tasks
            .lock()
            .expect("task list mutex poisoned")
            .extend([idle, refresh]);
    }

    fn spawn_idle_watcher(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let period = inner.config.idle_check_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let idle_for = {
                            let state = inner.state.lock().expect("session state mutex poisoned");
                            state.last_activity.elapsed()
                        };
                        if idle_for >= inner.config.idle_timeout {
                            inner.expire("idle timeout");
                            break;
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        })
    }

    fn spawn_refresh_ticker(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let period = inner.config.refresh_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match inner.api.refresh().await {
                            Ok(ttl) => {
                                let mut state = inner
                                    .state
                                    .lock()
                                    .expect("session state mutex poisoned");
                                if !state.expired {
                                    state.token_expires_at = Instant::now() + ttl;
                                    inner.snapshot_tx.send_replace(state.clone());
                                }
                                tracing::debug!(ttl_secs = ttl.as_secs(), "Access token refreshed");
                            }
                            Err(e) if e.is_session_expired() => {
                                inner.expire("refresh rejected");
                                break;
                            }
                            Err(e) => {
                                // Network blips must not force a logout.
                                tracing::warn!(error = %e, "Token refresh failed, retrying on next tick");
                            }
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[derive(Default)]
    struct MockApi {
        refresh_results: Mutex<VecDeque<Result<Duration, ApiError>>>,
        heartbeats: AtomicUsize,
        logouts: AtomicUsize,
        fail_heartbeat: AtomicBool,
    }

    impl MockApi {
        fn queue_refresh(&self, result: Result<Duration, ApiError>) {
            self.refresh_results
                .lock()
                .expect("mock mutex")
                .push_back(result);
        }

        fn api_error(code: &str) -> ApiError {
            ApiError::Api {
                code: code.to_string(),
                message: "scripted".to_string(),
            }
        }
    }

    impl SessionApi for MockApi {
        async fn refresh(&self) -> Result<Duration, ApiError> {
            self.refresh_results
                .lock()
                .expect("mock mutex")
                .pop_front()
                .unwrap_or(Ok(Duration::from_secs(300)))
        }

        async fn heartbeat(&self) -> Result<(), ApiError> {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if self.fail_heartbeat.load(Ordering::SeqCst) {
                Err(Self::api_error("NETWORK_ERROR"))
            } else {
                Ok(())
            }
        }

        async fn end_session(&self) -> Result<(), ApiError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * 60)
    }

    fn start(api: Arc<MockApi>) -> SessionController<MockApi> {
        SessionController::start(api, SessionConfig::default(), "dr-jones")
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_expires_session() {
        let api = Arc::new(MockApi::default());
        let controller = start(api);

        sleep(minutes(14)).await;
        assert!(!controller.is_expired());

        sleep(minutes(2)).await;
        let snapshot = controller.snapshot();
        assert!(snapshot.expired);
        assert!(snapshot.ui_frozen);
        assert!(snapshot.credential.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_fires_exactly_once() {
        let api = Arc::new(MockApi::default());
        let controller = start(api);

        sleep(minutes(16)).await;
        assert!(controller.is_expired());

        // A late second trigger must not re-run the transition.
        let mut rx = controller.subscribe();
        rx.mark_unchanged();
        controller.inner.expire("late refresh failure");
        assert!(!rx.has_changed().expect("sender alive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_idle_clock() {
        let api = Arc::new(MockApi::default());
        let controller = start(Arc::clone(&api));

        sleep(minutes(10)).await;
        controller.record_activity();
        sleep(minutes(10)).await;
        // 20 minutes in, but only 10 since the last interaction.
        assert!(!controller.is_expired());

        sleep(minutes(6)).await;
        assert!(controller.is_expired());
        assert!(api.heartbeats.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_session_expired_forces_expiry() {
        let api = Arc::new(MockApi::default());
        api.queue_refresh(Err(MockApi::api_error("SESSION_EXPIRED")));
        let controller = start(api);

        sleep(minutes(5)).await;
        let snapshot = controller.snapshot();
        assert!(snapshot.expired);
        assert!(snapshot.ui_frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_network_error_keeps_session_active() {
        let api = Arc::new(MockApi::default());
        api.queue_refresh(Err(MockApi::api_error("NETWORK_ERROR")));
        let controller = start(api);

        // First tick fails with a network error, second succeeds.
        sleep(minutes(9)).await;
        assert!(!controller.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_updates_token_expiry() {
        let api = Arc::new(MockApi::default());
        api.queue_refresh(Ok(Duration::from_secs(300)));
        let controller = start(api);

        let before = controller.snapshot().token_expires_at;
        sleep(minutes(5)).await;
        assert!(controller.snapshot().token_expires_at > before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failure_is_non_critical() {
        let api = Arc::new(MockApi::default());
        api.fail_heartbeat.store(true, Ordering::SeqCst);
        let controller = start(Arc::clone(&api));

        controller.record_activity();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(api.heartbeats.load(Ordering::SeqCst), 1);
        assert!(!controller.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reauthenticate_is_only_exit_from_expired() {
        let api = Arc::new(MockApi::default());
        let controller = start(Arc::clone(&api));

        sleep(minutes(16)).await;
        assert!(controller.is_expired());

        // Activity while expired changes nothing.
        controller.record_activity();
        assert!(controller.is_expired());

        controller.reauthenticate("dr-jones").await;
        assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
        let snapshot = controller.snapshot();
        assert!(!snapshot.expired);
        assert!(!snapshot.ui_frozen);
        assert_eq!(snapshot.credential.as_deref(), Some("dr-jones"));

        // The restarted timers and reset guard expire the session again.
        sleep(minutes(16)).await;
        assert!(controller.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timers() {
        let api = Arc::new(MockApi::default());
        let controller = start(api);

        controller.shutdown();
        sleep(minutes(60)).await;
        assert!(!controller.is_expired());
    }
}
