//! Credential management for the session layer
//!
//! Handles expiry checks, single-flight refresh, and the fallback chain from
//! refresh-token exchange to full re-authentication.
//!
//! At most one refresh runs per [`CredentialCoordinator`]. Every caller that
//! arrives while it is in flight, or within a short grace period after it
//! settles, awaits the same shared ticket and observes the same outcome.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, info, warn};

use crate::api::{AuthApi, LoginRequest};
use crate::error::SessionError;
use crate::login::NativeLogin;
use crate::store::CredentialStore;
use crate::types::{AccessToken, Credentials, ExpiresAt, TokenGrant};

const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);
const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_TICKET_GRACE: Duration = Duration::from_millis(200);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(2 * 60 * 60);

type RefreshTicket = Shared<BoxFuture<'static, Result<(), SessionError>>>;

/// Tuning for [`CredentialCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Refresh once the token expires within this window. Default: 5 minutes
    pub refresh_buffer: Duration,
    /// Absolute budget of one refresh attempt. Default: 15 seconds
    pub refresh_timeout: Duration,
    /// How long a settled ticket keeps answering callers. Default: 200 ms
    pub ticket_grace: Duration,
    /// Lifetime assumed when the backend omits the expiry. Default: 2 hours
    pub default_token_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            ticket_grace: DEFAULT_TICKET_GRACE,
            default_token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

struct Ticket {
    id: u64,
    future: RefreshTicket,
}

struct Inner {
    auth: AuthApi,
    login: Arc<dyn NativeLogin>,
    store: Arc<dyn CredentialStore>,
    config: CoordinatorConfig,
    ticket: Mutex<Option<Ticket>>,
    next_ticket_id: AtomicU64,
    auth_failed: AtomicBool,
}

/// Keeps the stored credentials valid with at most one refresh in flight.
#[derive(Clone)]
pub struct CredentialCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCoordinator")
            .field("config", &self.inner.config)
            .field("refresh_pending", &self.has_pending_refresh())
            .field("auth_failed", &self.is_auth_failed())
            .finish_non_exhaustive()
    }
}

impl CredentialCoordinator {
    pub fn new(
        auth: AuthApi,
        login: Arc<dyn NativeLogin>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self::with_config(auth, login, store, CoordinatorConfig::default())
    }

    pub fn with_config(
        auth: AuthApi,
        login: Arc<dyn NativeLogin>,
        store: Arc<dyn CredentialStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth,
                login,
                store,
                config,
                ticket: Mutex::new(None),
                next_ticket_id: AtomicU64::new(0),
                auth_failed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Stored credentials, without any network action.
    pub fn current_credentials(&self) -> Option<Credentials> {
        self.inner.store.get()
    }

    /// Stored access token, without any network action.
    pub fn current_access_token(&self) -> Option<String> {
        self.inner
            .store
            .get()
            .map(|c| c.access_token.as_str().to_string())
    }

    /// Whether a refresh ticket is in flight or inside its grace period.
    pub fn has_pending_refresh(&self) -> bool {
        self.inner.lock_ticket().is_some()
    }

    /// Whether the fallback chain was exhausted and no login has happened since.
    pub fn is_auth_failed(&self) -> bool {
        self.inner.auth_failed.load(Ordering::SeqCst)
    }

    /// Make sure the stored credentials are usable.
    ///
    /// Joins the in-flight refresh when there is one. Otherwise resolves
    /// immediately unless `force` is set or the token is missing or expires
    /// within [`CoordinatorConfig::refresh_buffer`].
    ///
    /// # Errors
    /// - `SessionError::Auth` once the fallback chain is exhausted, until
    ///   [`login`](Self::login) succeeds
    /// - `SessionError::Timeout` when the refresh exceeded its budget
    pub async fn ensure_valid(&self, force: bool) -> Result<(), SessionError> {
        match self.acquire_ticket(force)? {
            Some(ticket) => ticket.await,
            None => Ok(()),
        }
    }

    /// [`ensure_valid`](Self::ensure_valid) followed by a read of the token.
    pub async fn access_token(&self) -> Result<String, SessionError> {
        self.ensure_valid(false).await?;
        self.current_access_token()
            .ok_or_else(|| SessionError::Auth("no access token stored".to_string()))
    }

    /// Explicit login flow: lifts the auth-failure latch and forces a refresh.
    pub async fn login(&self) -> Result<(), SessionError> {
        {
            let mut slot = self.inner.lock_ticket();
            if slot
                .as_ref()
                .is_some_and(|ticket| ticket.future.peek().is_some())
            {
                *slot = None;
            }
        }
        self.inner.auth_failed.store(false, Ordering::SeqCst);
        self.ensure_valid(true).await
    }

    /// Forget the stored credentials.
    pub fn logout(&self) {
        info!("Clearing stored credentials on logout");
        self.inner.store.clear();
    }

    /// Check for an existing ticket and create one under a single guard.
    fn acquire_ticket(&self, force: bool) -> Result<Option<RefreshTicket>, SessionError> {
        let mut slot = self.inner.lock_ticket();

        if let Some(ticket) = slot.as_ref() {
            debug!("Joining refresh ticket #{}", ticket.id);
            return Ok(Some(ticket.future.clone()));
        }

        if self.inner.auth_failed.load(Ordering::SeqCst) {
            return Err(SessionError::Auth(
                "credentials exhausted; explicit login required".to_string(),
            ));
        }

        if !force && !self.inner.needs_refresh() {
            return Ok(None);
        }

        let id = self.inner.next_ticket_id.fetch_add(1, Ordering::SeqCst) + 1;
        let future = Arc::clone(&self.inner).refresh().boxed().shared();
        *slot = Some(Ticket {
            id,
            future: future.clone(),
        });
        drop(slot);

        debug!("Created refresh ticket #{} (force={})", id, force);

        let inner = Arc::clone(&self.inner);
        let settled = future.clone();
        tokio::spawn(async move {
            let _ = settled.await;
            tokio::time::sleep(inner.config.ticket_grace).await;
            inner.release_ticket(id);
        });

        Ok(Some(future))
    }
}

impl Inner {
    fn lock_ticket(&self) -> std::sync::MutexGuard<'_, Option<Ticket>> {
        self.ticket.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_ticket(&self, id: u64) {
        let mut slot = self.lock_ticket();
        if slot.as_ref().is_some_and(|ticket| ticket.id == id) {
            *slot = None;
            debug!("Released refresh ticket #{}", id);
        }
    }

    fn needs_refresh(&self) -> bool {
        match self.store.get() {
            Some(credentials) => credentials.is_expiring(self.config.refresh_buffer),
            None => true,
        }
    }

    /// Race the fallback chain against the refresh timeout.
    ///
    /// The chain runs on its own task. When the timer wins that task is left
    /// running, so a late result may still land in the store.
    async fn refresh(self: Arc<Self>) -> Result<(), SessionError> {
        let timeout = self.config.refresh_timeout;
        let chain = tokio::spawn(Arc::clone(&self).run_chain());

        match tokio::time::timeout(timeout, chain).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                error!("Credential refresh task failed: {}", join_error);
                Err(SessionError::Auth(format!(
                    "refresh task failed: {join_error}"
                )))
            }
            Err(_) => {
                warn!("Credential refresh timed out after {:?}", timeout);
                Err(SessionError::Timeout(format!(
                    "credential refresh exceeded {timeout:?}"
                )))
            }
        }
    }

    async fn run_chain(self: Arc<Self>) -> Result<(), SessionError> {
        let refresh_token = self.store.get().and_then(|c| c.refresh_token);

        if let Some(refresh_token) = refresh_token {
            match self.exchange_refresh_token(&refresh_token).await {
                Ok(()) => {
                    info!("Access token refreshed with refresh token");
                    self.auth_failed.store(false, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Refresh-token exchange failed, falling back to re-authentication: {}",
                        e
                    );
                }
            }
        }

        match self.reauthenticate().await {
            Ok(()) => {
                info!("Re-authenticated with native login");
                self.auth_failed.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                error!("Re-authentication failed, clearing credentials: {}", e);
                self.store.clear();
                self.auth_failed.store(true, Ordering::SeqCst);
                Err(SessionError::Auth(format!(
                    "refresh and re-authentication failed: {e}"
                )))
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<(), SessionError> {
        let grant = self.auth.refresh(refresh_token).await?;
        self.persist(grant, Some(refresh_token.to_string()))
    }

    async fn reauthenticate(&self) -> Result<(), SessionError> {
        let code = self.login.login_code().await?;
        let request = LoginRequest::new(code, self.login.device());
        let grant = self.auth.login(&request).await?;
        self.persist(grant, None)
    }

    fn persist(
        &self,
        grant: TokenGrant,
        previous_refresh_token: Option<String>,
    ) -> Result<(), SessionError> {
        let access_token =
            AccessToken::new(grant.access_token).map_err(SessionError::InvalidAccessToken)?;
        let expires_at = grant
            .access_token_expires_at
            .and_then(ExpiresAt::to_datetime)
            .unwrap_or_else(|| self.default_expiry());
        let refresh_token = grant.refresh_token.or(previous_refresh_token);

        self.store
            .set(Credentials::new(access_token, expires_at, refresh_token));
        Ok(())
    }

    fn default_expiry(&self) -> chrono::DateTime<Utc> {
        let now = Utc::now();
        chrono::Duration::from_std(self.config.default_token_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now)
    }
}
