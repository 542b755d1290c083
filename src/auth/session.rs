//! In-process session registry
//!
//! Maps opaque session handles to identity snapshots with a sliding idle
//! timeout. Every successful lookup extends the session; a session that is
//! not used for longer than the idle timeout is removed, either lazily by the
//! next lookup or proactively by the background sweeper.
//!
//! The whole map sits behind a single mutex. Lookups mutate the record they
//! find, so there is no shared-read path: the expiry check and the refresh
//! happen under the same lock acquisition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::models::Identity;

use super::redact;

/// Inactivity period after which a session expires
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Period of the background sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Largest accepted idle timeout
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Largest accepted sweep period
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Random bytes per handle (256 bits)
const HANDLE_RANDOM_BYTES: usize = 32;

/// Configuration for the session registry
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding inactivity window
    pub idle_timeout: Duration,

    /// How often the sweeper evicts expired sessions
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionRecord {
    identity: Identity,
    last_activity: Instant,
    expires_at: Instant,
}

impl SessionRecord {
    fn new(identity: Identity, now: Instant, idle_timeout: Duration) -> Self {
        Self {
            identity,
            last_activity: now,
            expires_at: deadline(now, idle_timeout),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > idle_timeout
    }

    fn touch(&mut self, now: Instant, idle_timeout: Duration) {
        self.last_activity = now;
        self.expires_at = deadline(now, idle_timeout);
    }
}

/// `now + idle_timeout`, capped at [`MAX_IDLE_TIMEOUT`]
///
/// Never panics, so it is safe to call with the registry lock held.
fn deadline(now: Instant, idle_timeout: Duration) -> Instant {
    now.checked_add(idle_timeout.min(MAX_IDLE_TIMEOUT))
        .unwrap_or(now)
}

/// Concurrent session store
///
/// Construct one per process, wrap it in an [`Arc`], share it with the
/// router and start the sweeper with [`SessionRegistry::spawn_sweeper`].
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    /// Create a new registry with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new registry with the default 10 minute idle timeout
    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    /// Idle timeout applied to every session
    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout
    }

    /// Create a session for `identity` and return its handle
    ///
    /// Handles are 32 bytes from the OS generator, URL-safe base64 encoded.
    /// Collisions are not checked.
    pub fn create(&self, identity: Identity) -> String {
        let handle = generate_handle();
        let user_id = identity.user_id.clone();
        let record = SessionRecord::new(identity, Instant::now(), self.config.idle_timeout);

        let mut sessions = self.lock();
        sessions.insert(handle.clone(), record);
        let active = sessions.len();
        drop(sessions);

        debug!(
            user_id = %user_id,
            session = redact(&handle),
            active,
            "Session created"
        );
        handle
    }

    /// Resolve a handle to its identity, refreshing the idle window
    ///
    /// An expired record is removed in the same critical section that
    /// detected the expiry and is never returned.
    pub fn lookup(&self, handle: &str) -> Option<Identity> {
        let now = Instant::now();
        let mut sessions = self.lock();

        let record = sessions.get_mut(handle)?;
        if record.is_expired(now) {
            sessions.remove(handle);
            debug!(session = redact(handle), "Session expired on lookup");
            return None;
        }

        record.touch(now, self.config.idle_timeout);
        Some(record.identity.clone())
    }

    /// Remove a session; absent handles are ignored
    pub fn delete(&self, handle: &str) {
        if self.lock().remove(handle).is_some() {
            debug!(session = redact(handle), "Session deleted");
        }
    }

    /// Evict every expired or idle session, returning how many were removed
    ///
    /// The idle check duplicates the stored expiry under correct refresh
    /// logic and is kept so a record with a stale `expires_at` still goes.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;

        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, record| !(record.is_expired(now) || record.is_idle(now, idle_timeout)));
        let removed = before - sessions.len();
        let remaining = sessions.len();
        drop(sessions);

        if removed > 0 {
            debug!(removed, remaining, "Swept expired sessions");
        }
        removed
    }

    /// Whether a handle is currently stored; does not refresh the session
    pub fn contains(&self, handle: &str) -> bool {
        self.lock().contains_key(handle)
    }

    /// Number of stored sessions, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry holds no sessions
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Start the background sweeper
    ///
    /// The task runs until [`SweeperHandle::stop`] is called or the handle
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let registry = Arc::clone(self);
        let period = self
            .config
            .sweep_interval
            .clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_ms = period.as_millis() as u64, "Session sweeper started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        registry.sweep();
                    }
                }
            }
            info!("Session sweeper stopped");
        });

        SweeperHandle { shutdown_tx, task }
    }

    // A poisoned lock means a panic inside a critical section, which cannot
    // happen under the locking discipline above.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.lock().expect("session registry lock poisoned")
    }
}

/// Owner of the running sweeper task
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }

    /// Whether the sweeper task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn generate_handle() -> String {
    let mut bytes = [0u8; HANDLE_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
