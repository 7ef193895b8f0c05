//! In-memory OAuth session for Drive.
//!
//! The token lives only in this struct; nothing is written to disk.

use super::consent::ConsentFlow;
use super::DriveError;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Bearer token handed to Drive requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visible: String = self.0.chars().take(6).collect();
        write!(f, "AccessToken({}…)", visible)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: AccessToken,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SessionConfig {
    client_id: String,
    scope: String,
}

pub struct DriveSession {
    flow: Arc<dyn ConsentFlow>,
    clock: Arc<dyn Clock>,
    config: Mutex<Option<SessionConfig>>,
    cached: Mutex<Option<CachedToken>>,
    // held for the whole consent round-trip so concurrent callers share it
    refresh: tokio::sync::Mutex<()>,
    // bumped by sign-out; a consent started under an older epoch is discarded
    epoch: watch::Sender<u64>,
}

impl DriveSession {
    pub fn new(flow: Arc<dyn ConsentFlow>) -> Self {
        Self::with_clock(flow, Arc::new(SystemClock))
    }

    pub fn with_clock(flow: Arc<dyn ConsentFlow>, clock: Arc<dyn Clock>) -> Self {
        Self {
            flow,
            clock,
            config: Mutex::new(None),
            cached: Mutex::new(None),
            refresh: tokio::sync::Mutex::new(()),
            epoch: watch::channel(0).0,
        }
    }

    pub fn initialize(&self, client_id: &str, scope: &str) -> Result<(), DriveError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(DriveError::Configuration("Google client id is empty".to_string()));
        }
        if !self.flow.is_available() {
            return Err(DriveError::ServiceUnavailable(
                "no web browser available for sign-in".to_string(),
            ));
        }

        let mut config = lock(&self.config);
        if config.is_some() {
            log::debug!("Drive session already initialized; updating settings");
        }
        *config = Some(SessionConfig {
            client_id: client_id.to_string(),
            scope: scope.to_string(),
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.config).is_some()
    }

    /// Returns the cached token, or runs the consent flow when there is no
    /// valid one. Can wait on the user for as long as the consent takes.
    pub async fn access_token(&self) -> Result<AccessToken, DriveError> {
        let config = lock(&self.config).clone().ok_or(DriveError::NotInitialized)?;

        if let Some(token) = self.valid_token() {
            return Ok(token);
        }
        let started_in = *self.epoch.borrow();

        let _refresh = self.refresh.lock().await;
        // another caller may have finished the consent while we waited
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        let mut epoch = self.epoch.subscribe();
        if *epoch.borrow_and_update() != started_in {
            return Err(DriveError::SignInCancelled);
        }

        log::info!("Requesting Drive access token");
        let grant = tokio::select! {
            grant = self.flow.request_token(&config.client_id, &config.scope) => grant?,
            _ = epoch.changed() => {
                log::info!("Drive sign-in abandoned");
                return Err(DriveError::SignInCancelled);
            }
        };

        let expires_at = self.clock.now() + Duration::seconds(grant.expires_in as i64);
        let token = AccessToken(grant.access_token);

        // checked under the cache lock; sign-out bumps the epoch before
        // taking it, so either we see the bump or it clears our write
        let mut cached = lock(&self.cached);
        if *self.epoch.borrow() != started_in {
            return Err(DriveError::SignInCancelled);
        }
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        drop(cached);
        log::info!("✅ Drive access token issued, valid until {}", expires_at.to_rfc3339());
        Ok(token)
    }

    /// Pure validity check; never starts a refresh.
    pub fn is_authenticated(&self) -> bool {
        self.valid_token().is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.cached).as_ref().map(|cached| cached.expires_at)
    }

    /// Stops a consent that is still waiting on the user. Its callers get
    /// [`DriveError::SignInCancelled`] and the cached token is kept.
    pub fn cancel_sign_in(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Forgets the token immediately and hands it back for revocation.
    /// A consent still in progress is cancelled and never lands in the cache.
    pub fn sign_out(&self) -> Option<AccessToken> {
        self.cancel_sign_in();
        let dropped = lock(&self.cached).take().map(|cached| cached.token);
        if dropped.is_some() {
            log::info!("Signed out of Drive");
        }
        dropped
    }

    /// Drops `token` if it is still the cached one (e.g. after a 401).
    pub fn invalidate(&self, token: &AccessToken) {
        let mut cached = lock(&self.cached);
        if cached.as_ref().is_some_and(|c| &c.token == token) {
            log::warn!("Drive rejected the cached token; it will be requested again");
            *cached = None;
        }
    }

    fn valid_token(&self) -> Option<AccessToken> {
        let now = self.clock.now();
        lock(&self.cached)
            .as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.token.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::drive::consent::TokenGrant;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self(Mutex::new(start))
        }

        pub fn advance(&self, seconds: i64) {
            *self.0.lock().unwrap() += Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Consent flow that issues numbered tokens or a scripted failure.
    pub struct FakeConsent {
        pub available: bool,
        pub expires_in: u64,
        pub deny: bool,
        pub calls: AtomicUsize,
    }

    impl FakeConsent {
        pub fn granting(expires_in: u64) -> Self {
            Self {
                available: true,
                expires_in,
                deny: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConsentFlow for FakeConsent {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn request_token(&self, _client_id: &str, _scope: &str) -> Result<TokenGrant, DriveError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.deny {
                return Err(DriveError::AuthenticationDenied);
            }
            Ok(TokenGrant {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    pub fn session_with(flow: Arc<FakeConsent>, clock: Arc<ManualClock>) -> DriveSession {
        let session = DriveSession::with_clock(flow, clock);
        session.initialize("client-id", "scope").unwrap();
        session
    }

    fn start() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_initialize_rejects_empty_client_id() {
        let session = DriveSession::new(Arc::new(FakeConsent::granting(3600)));
        let err = session.initialize("  ", "scope").unwrap_err();
        assert!(matches!(err, DriveError::Configuration(_)));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_initialize_requires_consent_capability() {
        let mut flow = FakeConsent::granting(3600);
        flow.available = false;
        let session = DriveSession::new(Arc::new(flow));
        let err = session.initialize("client", "scope").unwrap_err();
        assert!(matches!(err, DriveError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_token_before_initialize_fails() {
        let session = DriveSession::new(Arc::new(FakeConsent::granting(3600)));
        let err = session.access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::NotInitialized));
    }

    #[tokio::test]
    async fn test_token_validity_window() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = session_with(flow.clone(), clock.clone());

        assert!(!session.is_authenticated());
        let token = session.access_token().await.unwrap();
        assert_eq!(token.secret(), "token-1");

        clock.advance(3599);
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().await.unwrap().secret(), "token-1");

        clock.advance(2);
        assert!(!session.is_authenticated());
        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);

        let refreshed = session.access_token().await.unwrap();
        assert_eq!(refreshed.secret(), "token-2");
        assert_eq!(flow.calls.load(Ordering::SeqCst), 2);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_is_authenticated_never_refreshes() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = session_with(flow.clone(), clock);

        assert!(!session.is_authenticated());
        assert!(!session.is_authenticated());
        assert_eq!(flow.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sign_out_clears_token() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = session_with(flow.clone(), clock);

        session.access_token().await.unwrap();
        let dropped = session.sign_out().unwrap();
        assert_eq!(dropped.secret(), "token-1");
        assert!(!session.is_authenticated());
        assert!(session.expires_at().is_none());
        assert!(session.sign_out().is_none());

        assert_eq!(session.access_token().await.unwrap().secret(), "token-2");
    }

    #[tokio::test]
    async fn test_sign_out_during_consent_discards_grant() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = Arc::new(session_with(flow.clone(), clock));

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.access_token().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(session.sign_out().is_none());

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, DriveError::SignInCancelled));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(!session.is_authenticated());

        // the refresh slot is free again, so the next call prompts anew
        assert_eq!(session.access_token().await.unwrap().secret(), "token-2");
        assert_eq!(flow.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_sign_in_keeps_existing_token() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = session_with(flow, clock);

        let token = session.access_token().await.unwrap();
        session.cancel_sign_in();
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().await.unwrap(), token);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_consent() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = Arc::new(session_with(flow.clone(), clock));

        let (a, b) = tokio::join!(session.access_token(), session.access_token());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(flow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denied_consent_leaves_session_unauthenticated() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut flow = FakeConsent::granting(3600);
        flow.deny = true;
        let session = session_with(Arc::new(flow), clock);

        let err = session.access_token().await.unwrap_err();
        assert!(matches!(err, DriveError::AuthenticationDenied));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_invalidate_only_drops_matching_token() {
        let clock = Arc::new(ManualClock::new(start()));
        let flow = Arc::new(FakeConsent::granting(3600));
        let session = session_with(flow, clock);

        let token = session.access_token().await.unwrap();
        session.invalidate(&AccessToken("stale".to_string()));
        assert!(session.is_authenticated());
        session.invalidate(&token);
        assert!(!session.is_authenticated());
    }
}
