//! Sweeps the elevation expiry index and tells users when an elevation lapses.
//!
//! Several instances may poll the same index. Each due member is removed
//! before it is processed, and only the caller whose removal succeeded goes on
//! to notify, so a lapse is reported once no matter how many watchers run.
//! A member whose session was re-elevated in the meantime goes back into the
//! index at the new expiry.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::repository::{ExpiryIndex, RealtimeNotifier, UserRepository};
use crate::domain::types::{ADMIN_REVOKED_EVENT, ExpiryMember};
use crate::error::AuthServiceError;
use crate::usecase::elevation::revoked_payload;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct ExpiryWatcher<X, U, N>
where
    X: ExpiryIndex,
    U: UserRepository,
    N: RealtimeNotifier,
{
    index: X,
    users: U,
    notifier: N,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl<X, U, N> ExpiryWatcher<X, U, N>
where
    X: ExpiryIndex + 'static,
    U: UserRepository + 'static,
    N: RealtimeNotifier + 'static,
{
    /// A zero `poll_interval` is raised to one millisecond.
    pub fn new(index: X, users: U, notifier: N, poll_interval: Duration) -> Self {
        Self {
            index,
            users,
            notifier,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            running: Mutex::new(None),
        }
    }

    /// Process every member due at `now`. Returns how many notifications went out.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due = match self.index.due(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = ?e, "expiry watcher: failed to read index");
                return 0;
            }
        };

        let mut notified = 0;
        for member in due {
            match self.process(&member, now).await {
                Ok(true) => notified += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(member = %member, error = ?e, "expiry watcher: entry failed"),
            }
        }
        notified
    }

    async fn process(&self, raw: &str, now: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        if !self.index.remove(raw).await? {
            return Ok(false);
        }
        let Some(member) = ExpiryMember::parse(raw) else {
            tracing::warn!(member = raw, "expiry watcher: dropping malformed member");
            return Ok(false);
        };
        let Some(user) = self.users.find_by_id(member.user_id).await? else {
            return Ok(false);
        };

        // Revoked, or superseded by another session.
        if user.elevated_session_id != Some(member.session_id) {
            return Ok(false);
        }
        let Some(until) = user.elevated_until else {
            return Ok(false);
        };
        if until > now {
            // Re-elevated on this session after the member was read; the grant
            // may already have re-added it, so put it back at the live expiry.
            self.index.add(member, until).await?;
            return Ok(false);
        }

        self.notifier
            .notify_user(
                member.user_id,
                ADMIN_REVOKED_EVENT,
                revoked_payload(member.session_id, "expired"),
            )
            .await?;
        tracing::info!(
            user_id = %member.user_id,
            session_id = %member.session_id,
            "admin elevation expired"
        );
        Ok(true)
    }

    /// Spawn the polling loop. Returns `false` if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(Running::is_alive) {
            return false;
        }

        let cancel = CancellationToken::new();
        let this = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { this.run(token).await });
        *running = Some(Running { cancel, handle });
        true
    }

    /// Cancel the pending tick and wait for the loop to exit. No-op when stopped.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "expiry watcher task ended abnormally");
            }
        }
    }

    /// `false` once stopped, or if the loop task exited on its own.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Running::is_alive)
    }

    async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "expiry watcher started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("expiry watcher stopping");
                    break;
                }
                _ = interval.tick() => {
                    let notified = self.tick(Utc::now()).await;
                    if notified > 0 {
                        tracing::debug!(notified, "expiry watcher tick");
                    }
                }
            }
        }
    }
}
