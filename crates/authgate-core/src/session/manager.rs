//! The session manager.
//!
//! Owns the live token, mirrors it to a `DurableStore` under the `token` and
//! `tokenTimestamp` keys, and runs a single deadline timer that forces a
//! logout once the client-side window has elapsed.
//!
//! In-memory changes happen under a short lock that is never held across an
//! await, so `logout()` takes effect before any storage I/O. Store I/O is
//! serialized through a separate async lock, and every change to the session
//! bumps a generation counter; I/O completions from an older generation are
//! discarded.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::types::{
    decode_timestamp, encode_timestamp, SessionEvent, SessionSettings, SessionStatus,
    TIMESTAMP_KEY, TOKEN_KEY,
};
use super::watchdog::{self, Watchdog};
use crate::clock::{self, Clock};
use crate::error::{SessionError, SessionResult};
use crate::exchange::{AuthMode, CredentialExchange};
use crate::store::DurableStore;

/// Buffer size for the session event channel.
/// Events are rare (a handful per session); 16 leaves room for slow UIs.
const EVENT_CHANNEL_CAPACITY: usize = 16;

type IoGuard<'a> = tokio::sync::MutexGuard<'a, ()>;

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    generation: u64,
    watchdog: Watchdog,
}

/// What `bootstrap` found in the store
enum Persisted {
    Live {
        token: String,
        issued_at: DateTime<Utc>,
    },
    Empty,
    /// Expired, incomplete or corrupt; erased on sight
    Stale,
}

struct Inner {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    io: tokio::sync::Mutex<()>,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

/// Handle to the process-wide session.
/// Clone is cheap and every clone sees the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unknown);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                settings,
                state: Mutex::new(SessionState::default()),
                io: tokio::sync::Mutex::new(()),
                status,
                events,
            }),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock_state().token.is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.lock_state().token.clone()
    }

    /// When this device first saw the current token. `None` while logged out,
    /// and briefly while a fresh token is still being persisted.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().issued_at
    }

    /// When the watchdog will force a logout, if armed
    pub fn watchdog_deadline(&self) -> Option<DateTime<Utc>> {
        self.inner.lock_state().watchdog.deadline()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve the startup status from the persisted mirror.
    ///
    /// Call once before showing any screen; the status stays `Unknown` until
    /// this returns. An expired persisted session is erased silently.
    pub async fn bootstrap(&self) -> SessionStatus {
        let inner = &self.inner;
        let generation = inner.lock_state().generation;

        let persisted = {
            let io = inner.io.lock().await;
            let persisted = inner.load_persisted(&io).await;
            if matches!(persisted, Persisted::Stale) && inner.is_current(generation) {
                inner.erase_persisted(&io).await;
            }
            persisted
        };

        let mut state = inner.lock_state();
        if state.generation != generation {
            debug!("Session changed during bootstrap, keeping newer state");
            return self.status();
        }

        match persisted {
            Persisted::Live { token, issued_at } => {
                state.generation += 1;
                state.token = Some(token);
                state.issued_at = Some(issued_at);
                inner.publish(SessionStatus::Authenticated);
                inner.arm(&mut state, issued_at);
                drop(state);

                info!(%issued_at, "Restored persisted session");
                inner.emit(SessionEvent::Restored);
                SessionStatus::Authenticated
            }
            Persisted::Empty | Persisted::Stale => {
                inner.publish(SessionStatus::Unauthenticated);
                SessionStatus::Unauthenticated
            }
        }
    }

    /// Accept a freshly obtained token.
    ///
    /// The in-memory session is live as soon as this is called; persistence
    /// follows and its failures are only logged. An unexpired persisted
    /// timestamp is kept, so re-authenticating never extends the window.
    pub async fn authenticate(&self, token: &str) -> SessionResult<()> {
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }

        let inner = &self.inner;
        let generation = {
            let mut state = inner.lock_state();
            state.generation += 1;
            state.token = Some(token.to_string());
            state.issued_at = None;
            state.watchdog.cancel();
            inner.publish(SessionStatus::Authenticated);
            state.generation
        };
        debug!(generation, token_len = token.len(), "Token accepted, persisting");

        let issued_at = {
            let io = inner.io.lock().await;
            if !inner.is_current(generation) {
                debug!(generation, "Authentication superseded before persisting");
                return Ok(());
            }

            let issued_at = inner.resolve_issued_at(&io).await;
            inner.write(TOKEN_KEY, token).await;

            if !inner.is_current(generation) {
                // Whatever superseded us queues its own store I/O behind this lock
                debug!(generation, "Authentication superseded while persisting, discarding writes");
                inner.erase_persisted(&io).await;
                return Ok(());
            }
            issued_at
        };

        let mut state = inner.lock_state();
        if state.generation != generation {
            return Ok(());
        }
        state.issued_at = Some(issued_at);
        inner.arm(&mut state, issued_at);
        drop(state);

        info!(%issued_at, "Session authenticated");
        inner.emit(SessionEvent::Authenticated);
        Ok(())
    }

    /// Exchange credentials for a token and authenticate with it.
    /// Rejections are returned as-is; there is no retry.
    pub async fn login(
        &self,
        exchange: &dyn CredentialExchange,
        mode: AuthMode,
        email: &str,
        password: &str,
    ) -> SessionResult<()> {
        let token = exchange.exchange(mode, email, password).await?;
        self.authenticate(&token).await
    }

    /// End the session. Safe to call at any time, any number of times.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let was_authenticated = {
            let mut state = inner.lock_state();
            state.watchdog.cancel();
            inner.end_session(&mut state)
        };

        if was_authenticated {
            info!("Session logged out");
            inner.emit(SessionEvent::LoggedOut);
        }

        let io = inner.io.lock().await;
        inner.erase_persisted(&io).await;
    }

    /// Probe the session against the persisted timestamp.
    ///
    /// Forces a logout if the window has elapsed, otherwise re-arms the
    /// watchdog for the same deadline. Never extends the window.
    pub async fn recheck(&self) -> SessionStatus {
        let inner = &self.inner;
        let (generation, in_memory) = {
            let state = inner.lock_state();
            if state.token.is_none() {
                return self.status();
            }
            (state.generation, state.issued_at)
        };

        let persisted = {
            let _io = inner.io.lock().await;
            inner.read(TIMESTAMP_KEY).await.as_deref().and_then(decode_timestamp)
        };

        // The earlier observation wins
        let Some(issued_at) = [in_memory, persisted].into_iter().flatten().min() else {
            return self.status();
        };

        let elapsed = inner
            .expires_at(issued_at)
            .is_some_and(|expires_at| inner.clock.now() >= expires_at);
        if elapsed {
            inner.expire(generation, false).await;
            return self.status();
        }

        let mut state = inner.lock_state();
        if state.generation == generation && state.token.is_some() {
            state.issued_at = Some(issued_at);
            inner.arm(&mut state, issued_at);
        }
        drop(state);
        self.status()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    fn ttl(&self) -> Duration {
        clock::to_chrono(self.settings.ttl)
    }

    /// End of the window that started at `issued_at`; `None` if it falls
    /// outside the representable date range
    fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        issued_at.checked_add_signed(self.ttl())
    }

    /// Current time at the store's millisecond resolution
    fn now_millis(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        Utc.timestamp_millis_opt(now.timestamp_millis())
            .single()
            .unwrap_or(now)
    }

    fn publish(&self, status: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(?event, "No session event subscribers");
        }
    }

    /// Clear the in-memory session. Returns whether a token was present.
    fn end_session(&self, state: &mut SessionState) -> bool {
        let had_token = state.token.take().is_some();
        state.issued_at = None;
        state.generation += 1;
        self.publish(SessionStatus::Unauthenticated);
        had_token
    }

    /// Start (or restart) the watchdog for `issued_at + ttl`.
    fn arm(self: &Arc<Self>, state: &mut SessionState, issued_at: DateTime<Utc>) {
        state.watchdog.cancel();

        let Some(fires_at) = self.expires_at(issued_at) else {
            warn!(%issued_at, "Session deadline out of range, watchdog left disarmed");
            return;
        };
        let generation = state.generation;
        let recheck_interval = self.settings.recheck_interval;
        let clock = Arc::clone(&self.clock);
        let weak = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            while let Some(wait) = watchdog::next_wake(clock.now(), fires_at, recheck_interval) {
                tokio::time::sleep(wait).await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.expire(generation, true).await;
            }
        });

        state.watchdog = Watchdog::Armed { fires_at, handle };
        debug!(%fires_at, generation, "Expiration watchdog armed");
    }

    /// Forced logout. Completes even when nobody is listening for `Expired`.
    async fn expire(&self, generation: u64, from_timer: bool) {
        {
            let mut state = self.lock_state();
            if state.generation != generation || state.token.is_none() {
                return;
            }
            if from_timer {
                state.watchdog.release();
            } else {
                state.watchdog.cancel();
            }
            self.end_session(&mut state);
        }
        info!("Session window elapsed, forcing logout");

        {
            let io = self.io.lock().await;
            self.erase_persisted(&io).await;
        }
        self.emit(SessionEvent::Expired);
    }

    // =========================================================================
    // Store access (failures are logged and swallowed)
    // =========================================================================

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read session store, treating as absent");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key, error = %e, "Failed to write session store");
        }
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(key, error = %e, "Failed to remove from session store");
        }
    }

    async fn erase_persisted(&self, _io: &IoGuard<'_>) {
        self.remove(TOKEN_KEY).await;
        self.remove(TIMESTAMP_KEY).await;
    }

    /// Keep an unexpired persisted timestamp, otherwise stamp now.
    async fn resolve_issued_at(&self, _io: &IoGuard<'_>) -> DateTime<Utc> {
        let now = self.now_millis();
        let persisted = self.read(TIMESTAMP_KEY).await;
        if let Some(existing) = persisted.as_deref().and_then(decode_timestamp) {
            if self.expires_at(existing).is_some_and(|expires_at| now < expires_at) {
                debug!(issued_at = %existing, "Keeping persisted token timestamp");
                return existing;
            }
            debug!(issued_at = %existing, "Persisted token timestamp already elapsed, restamping");
        }
        self.write(TIMESTAMP_KEY, &encode_timestamp(now)).await;
        now
    }

    async fn load_persisted(&self, _io: &IoGuard<'_>) -> Persisted {
        let token = match self.store.get(TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token, starting logged out");
                return Persisted::Empty;
            }
        };
        let raw_timestamp = match self.store.get(TIMESTAMP_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted timestamp, starting logged out");
                return Persisted::Empty;
            }
        };
        let issued_at = raw_timestamp.as_deref().and_then(decode_timestamp);

        match (token, issued_at) {
            (Some(token), Some(issued_at)) => match self.expires_at(issued_at) {
                Some(expires_at) if self.clock.now() < expires_at => {
                    Persisted::Live { token, issued_at }
                }
                Some(_) => {
                    info!(%issued_at, "Persisted session expired, discarding");
                    Persisted::Stale
                }
                None => {
                    warn!(%issued_at, "Persisted session deadline out of range, discarding");
                    Persisted::Stale
                }
            },
            (None, None) if raw_timestamp.is_none() => Persisted::Empty,
            _ => {
                debug!("Incomplete persisted session, discarding");
                Persisted::Stale
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.watchdog.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
