use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use tessera_auth::domain::repository::{
    AttemptLimiter, ElevationAllowList, ElevationRepository, ExpiryIndex, PasscodeMailer,
    PasscodeStore, RealtimeNotifier, SessionRepository, UserRepository,
};
use tessera_auth::domain::types::{
    AuthUser, ElevationRecord, ExpiryMember, GrantOutcome, JtiElevationEntry, PasscodeRecord,
    SessionRecord, UserElevationEntry, expiry_score,
};
use tessera_auth::error::AuthServiceError;
use tessera_auth::usecase::elevation::{ElevationPolicy, ElevationService};
use tessera_auth::usecase::passcode::{PasscodePolicy, PasscodeService};
use tessera_auth::usecase::session::SessionService;
use tessera_testing::auth::test_signer;

// ── MockUserRepo ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockUserRepo {
    pub users: Arc<Mutex<Vec<AuthUser>>>,
}

impl MockUserRepo {
    pub fn new(users: Vec<AuthUser>) -> Self {
        Self {
            users: Arc::new(Mutex::new(users)),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<AuthUser> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    /// Overwrite the elevation pointer, as if the database row changed.
    pub fn set_pointer(&self, id: Uuid, session_id: Option<Uuid>, until: Option<DateTime<Utc>>) {
        let mut users = self.users.lock().unwrap();
        if let Some(u) = users.iter_mut().find(|u| u.id == id) {
            u.elevated_session_id = session_id;
            u.elevated_until = until;
        }
    }
}

impl UserRepository for MockUserRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthServiceError> {
        Ok(self.get(id))
    }

    async fn find_or_create_by_email(&self, email: &str) -> Result<AuthUser, AuthServiceError> {
        let mut users = self.users.lock().unwrap();
        if let Some(u) = users.iter().find(|u| u.email == email) {
            return Ok(u.clone());
        }
        let user = test_user_with(Uuid::new_v4(), email);
        users.push(user.clone());
        Ok(user)
    }
}

// ── MockPasscodeStore ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockPasscodeStore {
    /// email -> (record, absolute expiry)
    pub records: Arc<Mutex<HashMap<String, (PasscodeRecord, DateTime<Utc>)>>>,
    /// Written just before the next `put_if_absent`, like a concurrent request.
    pub racer: Arc<Mutex<Option<(String, PasscodeRecord)>>>,
}

impl MockPasscodeStore {
    pub fn record(&self, email: &str) -> Option<PasscodeRecord> {
        self.records
            .lock()
            .unwrap()
            .get(email)
            .filter(|(_, at)| *at > Utc::now())
            .map(|(r, _)| r.clone())
    }

    /// Move `created_at` into the past, e.g. to get past the resend cooldown.
    pub fn backdate(&self, email: &str, by: Duration) {
        if let Some((r, _)) = self.records.lock().unwrap().get_mut(email) {
            r.created_at -= by;
        }
    }

    /// Have another request store `record` between our read and our insert.
    pub fn race_with(&self, email: &str, record: PasscodeRecord) {
        *self.racer.lock().unwrap() = Some((email.to_owned(), record));
    }

    /// Let the key lapse immediately.
    pub fn expire(&self, email: &str) {
        if let Some((_, at)) = self.records.lock().unwrap().get_mut(email) {
            *at = Utc::now() - Duration::seconds(1);
        }
    }
}

impl PasscodeStore for MockPasscodeStore {
    async fn get(&self, email: &str) -> Result<Option<PasscodeRecord>, AuthServiceError> {
        Ok(self.record(email))
    }

    async fn put(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: StdDuration,
    ) -> Result<(), AuthServiceError> {
        let at = Utc::now() + Duration::from_std(ttl).unwrap();
        self.records
            .lock()
            .unwrap()
            .insert(email.to_owned(), (record.clone(), at));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: StdDuration,
    ) -> Result<bool, AuthServiceError> {
        if let Some((racer_email, racer)) = self.racer.lock().unwrap().take() {
            self.put(&racer_email, &racer, ttl).await?;
        }
        if self.record(email).is_some() {
            return Ok(false);
        }
        self.put(email, record, ttl).await?;
        Ok(true)
    }

    async fn remaining_ttl(&self, email: &str) -> Result<Option<StdDuration>, AuthServiceError> {
        let now = Utc::now();
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(email)
            .and_then(|(_, at)| (*at - now).to_std().ok())
            .filter(|d| !d.is_zero()))
    }

    async fn delete(&self, email: &str) -> Result<(), AuthServiceError> {
        self.records.lock().unwrap().remove(email);
        Ok(())
    }
}

// ── MockMailer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SentPasscode {
    pub email: String,
    pub passcode: String,
    pub otp_id: Uuid,
}

#[derive(Clone, Default)]
pub struct MockMailer {
    pub sent: Arc<Mutex<Vec<SentPasscode>>>,
}

impl MockMailer {
    pub fn last_code(&self) -> String {
        self.sent.lock().unwrap().last().unwrap().passcode.clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl PasscodeMailer for MockMailer {
    async fn enqueue(
        &self,
        email: &str,
        passcode: &str,
        otp_id: Uuid,
        _discard_after: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        self.sent.lock().unwrap().push(SentPasscode {
            email: email.to_owned(),
            passcode: passcode.to_owned(),
            otp_id,
        });
        Ok(())
    }
}

// ── MockSessionRepo ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSessionRepo {
    pub sessions: Arc<Mutex<Vec<SessionRecord>>>,
    /// Simulate a logout landing between lookup and touch.
    pub lose_touch_race: Arc<AtomicBool>,
}

impl MockSessionRepo {
    pub fn get(&self, id: Uuid) -> Option<SessionRecord> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut SessionRecord)) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.id == id) {
            f(s);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

impl SessionRepository for MockSessionRepo {
    async fn create(&self, record: &SessionRecord) -> Result<(), AuthServiceError> {
        self.sessions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, AuthServiceError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.refresh_token_hash == token_hash)
            .cloned())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        if self.lose_touch_race.load(Ordering::SeqCst) {
            sessions.retain(|s| s.id != id);
        }
        match sessions.iter_mut().find(|s| s.id == id) {
            Some(s) => {
                s.last_used_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.refresh_token_hash != token_hash);
        Ok(sessions.len() < before)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| s.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_for_user(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| !(s.user_id == user_id && s.id == session_id));
        Ok(sessions.len() < before)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, AuthServiceError> {
        let mut list: Vec<SessionRecord> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id && !s.is_expired(now))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        Ok(list)
    }

    async fn exists_active(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.user_id == user_id && s.id == session_id && !s.is_expired(now)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| !s.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

// ── MockElevationRepo ────────────────────────────────────────────────────────

fn is_active(record: &ElevationRecord, now: DateTime<Utc>) -> bool {
    record.revoked_at.is_none() && record.expires_at > now
}

/// Elevation records sharing the user list with a `MockUserRepo`, so grants
/// and revokes move the same pointer the watcher and status checks read.
#[derive(Clone)]
pub struct MockElevationRepo {
    pub records: Arc<Mutex<Vec<ElevationRecord>>>,
    pub users: MockUserRepo,
}

impl MockElevationRepo {
    pub fn new(users: &MockUserRepo) -> Self {
        Self {
            records: Arc::default(),
            users: users.clone(),
        }
    }

    pub fn active_for(&self, user_id: Uuid) -> Vec<ElevationRecord> {
        let now = Utc::now();
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && is_active(r, now))
            .cloned()
            .collect()
    }
}

impl ElevationRepository for MockElevationRepo {
    async fn grant(&self, record: &ElevationRecord) -> Result<GrantOutcome, AuthServiceError> {
        if self.users.get(record.user_id).is_none() {
            return Err(anyhow::anyhow!("user {} not found", record.user_id).into());
        }
        let mut records = self.records.lock().unwrap();
        let now = record.issued_at;
        let active: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.user_id == record.user_id && is_active(r, now))
            .map(|(i, _)| i)
            .collect();
        if active
            .iter()
            .any(|&i| records[i].session_id != record.session_id)
        {
            return Ok(GrantOutcome::ActiveElsewhere);
        }
        let superseded = active
            .iter()
            .map(|&i| {
                records[i].revoked_at = Some(now);
                records[i].jti
            })
            .collect();
        records.push(record.clone());
        self.users.set_pointer(
            record.user_id,
            Some(record.session_id),
            Some(record.expires_at),
        );
        Ok(GrantOutcome::Granted { superseded })
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ElevationRecord>, AuthServiceError> {
        let Some(user) = self.users.get(user_id) else {
            return Ok(None);
        };
        let mut records = self.records.lock().unwrap();
        let Some(active) = records
            .iter_mut()
            .filter(|r| r.user_id == user_id && r.session_id == session_id && is_active(r, now))
            .max_by_key(|r| r.issued_at)
        else {
            return Ok(None);
        };
        active.revoked_at = Some(now);
        let revoked = active.clone();
        if user.elevated_session_id == Some(session_id) {
            self.users.set_pointer(user_id, None, None);
        }
        Ok(Some(revoked))
    }
}

// ── MockElevationCache (allow-list + expiry index) ───────────────────────────

#[derive(Clone, Default)]
pub struct MockElevationCache {
    pub by_user: Arc<Mutex<HashMap<Uuid, UserElevationEntry>>>,
    pub by_jti: Arc<Mutex<HashMap<Uuid, JtiElevationEntry>>>,
    /// member -> score (unix millis)
    pub index: Arc<Mutex<BTreeMap<String, i64>>>,
}

impl MockElevationCache {
    pub fn has_jti(&self, jti: Uuid) -> bool {
        self.by_jti.lock().unwrap().contains_key(&jti)
    }

    pub fn user_entry(&self, user_id: Uuid) -> Option<UserElevationEntry> {
        self.by_user.lock().unwrap().get(&user_id).cloned()
    }

    pub fn index_score(&self, member: &ExpiryMember) -> Option<i64> {
        self.index.lock().unwrap().get(&member.encode()).copied()
    }

    /// Insert a raw index member, bypassing the elevation flow.
    pub fn schedule(&self, raw: &str, at: DateTime<Utc>) {
        self.index
            .lock()
            .unwrap()
            .insert(raw.to_owned(), expiry_score(at));
    }
}

impl ElevationAllowList for MockElevationCache {
    async fn grant(
        &self,
        user_id: Uuid,
        entry: &UserElevationEntry,
        _ttl: StdDuration,
    ) -> Result<(), AuthServiceError> {
        let previous = self
            .by_user
            .lock()
            .unwrap()
            .insert(user_id, entry.clone());
        let mut by_jti = self.by_jti.lock().unwrap();
        if let Some(prev) = previous {
            by_jti.remove(&prev.jti);
        }
        by_jti.insert(
            entry.jti,
            JtiElevationEntry {
                user_id,
                session_id: entry.session_id,
            },
        );
        Ok(())
    }

    async fn revoke(&self, user_id: Uuid) -> Result<Option<Uuid>, AuthServiceError> {
        let removed = self.by_user.lock().unwrap().remove(&user_id);
        let jti = removed.map(|e| e.jti);
        if let Some(jti) = jti {
            self.by_jti.lock().unwrap().remove(&jti);
        }
        Ok(jti)
    }

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<JtiElevationEntry>, AuthServiceError> {
        Ok(self.by_jti.lock().unwrap().get(&jti).cloned())
    }
}

impl ExpiryIndex for MockElevationCache {
    async fn add(
        &self,
        member: ExpiryMember,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        self.schedule(&member.encode(), expires_at);
        Ok(())
    }

    async fn remove(&self, member: &str) -> Result<bool, AuthServiceError> {
        Ok(self.index.lock().unwrap().remove(member).is_some())
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<String>, AuthServiceError> {
        let cutoff = now.timestamp_millis();
        Ok(self
            .index
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, score)| **score <= cutoff)
            .map(|(member, _)| member.clone())
            .collect())
    }
}

// ── MockLimiter ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockLimiter {
    pub failures: Arc<Mutex<HashMap<Uuid, u32>>>,
    pub fail_reset: Arc<AtomicBool>,
}

impl MockLimiter {
    pub fn count(&self, user_id: Uuid) -> u32 {
        self.failures
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }
}

impl AttemptLimiter for MockLimiter {
    async fn failures(&self, user_id: Uuid) -> Result<u32, AuthServiceError> {
        Ok(self.count(user_id))
    }

    async fn record_failure(
        &self,
        user_id: Uuid,
        _window: StdDuration,
    ) -> Result<u32, AuthServiceError> {
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(user_id).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn reset(&self, user_id: Uuid) -> Result<(), AuthServiceError> {
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("limiter unavailable").into());
        }
        self.failures.lock().unwrap().remove(&user_id);
        Ok(())
    }
}

// ── MockNotifier ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Notification {
    pub user_id: Uuid,
    pub event: String,
    pub payload: Value,
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    pub events: Arc<Mutex<Vec<Notification>>>,
    pub fail: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }
}

impl RealtimeNotifier for MockNotifier {
    async fn notify_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: Value,
    ) -> Result<(), AuthServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("realtime bus unavailable").into());
        }
        self.events.lock().unwrap().push(Notification {
            user_id,
            event: event.to_owned(),
            payload,
        });
        Ok(())
    }
}

// ── Test fixture helpers ─────────────────────────────────────────────────────

pub const TEST_ADMIN_PASSWORD_HASH: &str = "5e884898da28047151d0e56f8dc6292773603d0d";

pub fn test_user_with(id: Uuid, email: &str) -> AuthUser {
    AuthUser {
        id,
        email: email.to_owned(),
        elevated_session_id: None,
        elevated_until: None,
    }
}

pub fn test_user() -> AuthUser {
    test_user_with(
        Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap(),
        "user@example.com",
    )
}

pub fn passcode_policy() -> PasscodePolicy {
    PasscodePolicy {
        length: 6,
        expiry: Duration::minutes(5),
        resend_cooldown: Duration::seconds(60),
        max_attempts: 5,
    }
}

pub fn elevation_policy() -> ElevationPolicy {
    ElevationPolicy {
        lifetime: Duration::minutes(15),
        admin_password_hash: TEST_ADMIN_PASSWORD_HASH.to_owned(),
        max_failed_attempts: 3,
        attempt_window: StdDuration::from_secs(600),
    }
}

pub fn passcode_service() -> (
    PasscodeService<MockPasscodeStore, MockMailer>,
    MockPasscodeStore,
    MockMailer,
) {
    let store = MockPasscodeStore::default();
    let mailer = MockMailer::default();
    let service = PasscodeService {
        store: store.clone(),
        mailer: mailer.clone(),
        policy: passcode_policy(),
    };
    (service, store, mailer)
}

pub fn session_service() -> (SessionService<MockSessionRepo>, MockSessionRepo) {
    let repo = MockSessionRepo::default();
    let service = SessionService {
        sessions: repo.clone(),
        signer: Arc::new(test_signer()),
    };
    (service, repo)
}

pub type MockElevationService = ElevationService<
    MockElevationRepo,
    MockElevationCache,
    MockElevationCache,
    MockLimiter,
    MockNotifier,
    MockUserRepo,
>;

/// Elevation service plus handles to every collaborator's shared state.
pub struct ElevationFixture {
    pub service: MockElevationService,
    pub users: MockUserRepo,
    pub elevations: MockElevationRepo,
    pub cache: MockElevationCache,
    pub limiter: MockLimiter,
    pub notifier: MockNotifier,
}

impl ElevationFixture {
    pub fn new(users: Vec<AuthUser>) -> Self {
        Self::with_policy(users, elevation_policy())
    }

    pub fn with_policy(users: Vec<AuthUser>, policy: ElevationPolicy) -> Self {
        let users = MockUserRepo::new(users);
        let elevations = MockElevationRepo::new(&users);
        let cache = MockElevationCache::default();
        let limiter = MockLimiter::default();
        let notifier = MockNotifier::default();
        let service = ElevationService {
            elevations: elevations.clone(),
            allow_list: cache.clone(),
            index: cache.clone(),
            limiter: limiter.clone(),
            notifier: notifier.clone(),
            users: users.clone(),
            signer: Arc::new(test_signer()),
            policy,
        };
        Self {
            service,
            users,
            elevations,
            cache,
            limiter,
            notifier,
        }
    }
}
