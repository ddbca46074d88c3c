//! The process-wide authorization session.
//!
//! Exactly one [`AuthorizationSession`] exists per process. It is the only
//! way other components get at a usable access token: the first caller pays
//! for loading the client descriptor, the stored token, or an interactive
//! grant; everybody after that gets the cached [`ClientHandle`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use gcal_core::auth::CALENDAR_SCOPES;
use gcal_core::credentials::{ClientSecret, CredentialSet};
use gcal_core::store::CredentialStore;
use gcal_core::{CalendarError, Result};
use tokio::sync::{Mutex, OnceCell};

use crate::grant::GrantFlow;
use crate::oauth::TokenClient;

pub struct AuthorizationSession {
    credentials_path: PathBuf,
    store: Arc<dyn CredentialStore>,
    grant: Arc<dyn GrantFlow>,
    tokens: Arc<dyn TokenClient>,
    client: OnceCell<ClientHandle>,
}

impl AuthorizationSession {
    pub fn new(
        credentials_path: impl Into<PathBuf>,
        store: Arc<dyn CredentialStore>,
        grant: Arc<dyn GrantFlow>,
        tokens: Arc<dyn TokenClient>,
    ) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            store,
            grant,
            tokens,
            client: OnceCell::new(),
        }
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Handle to the current credentials, authorizing on first use.
    ///
    /// Concurrent first-time callers share one initialization: at most one
    /// grant flow runs and all of them receive the same handle.
    pub async fn authorize(&self) -> Result<ClientHandle> {
        self.client
            .get_or_try_init(|| self.initialize(false))
            .await
            .cloned()
    }

    /// Run a fresh grant even when a token is stored or cached.
    pub async fn reauthorize(&self) -> Result<ClientHandle> {
        let initialized_here = AtomicBool::new(false);
        let flag = &initialized_here;
        let handle = self
            .client
            .get_or_try_init(|| async move {
                flag.store(true, Ordering::SeqCst);
                self.initialize(true).await
            })
            .await?
            .clone();
        if initialized_here.load(Ordering::SeqCst) {
            return Ok(handle);
        }

        let credentials = self.grant.run(handle.secret(), &CALENDAR_SCOPES).await?;
        persist(self.store.as_ref(), &credentials).await;
        handle.replace(credentials).await;
        Ok(handle)
    }

    /// The cached handle, if authorization already happened.
    pub fn current(&self) -> Option<&ClientHandle> {
        self.client.get()
    }

    async fn initialize(&self, force_grant: bool) -> Result<ClientHandle> {
        let secret = ClientSecret::load(&self.credentials_path).await?;

        if !force_grant {
            if let Some(credentials) = self.store.load().await {
                tracing::info!(
                    event = "credentials_loaded",
                    renewable = credentials.is_renewable(),
                    "using stored calendar credentials"
                );
                return Ok(self.handle(secret, credentials));
            }
        }

        tracing::info!(event = "grant_started", "no usable token; starting authorization");
        let credentials = self.grant.run(&secret, &CALENDAR_SCOPES).await?;
        persist(self.store.as_ref(), &credentials).await;
        Ok(self.handle(secret, credentials))
    }

    fn handle(&self, secret: ClientSecret, credentials: CredentialSet) -> ClientHandle {
        ClientHandle {
            inner: Arc::new(HandleInner {
                secret,
                credentials: Mutex::new(credentials),
                store: Arc::clone(&self.store),
                tokens: Arc::clone(&self.tokens),
            }),
        }
    }
}

/// Authorized access to the provider. Cheap to clone; all clones share the
/// same credential set.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    secret: ClientSecret,
    credentials: Mutex<CredentialSet>,
    store: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenClient>,
}

impl ClientHandle {
    /// A bearer token that is not known to be expired. Refreshes (and
    /// persists the result) when the current one is.
    pub async fn access_token(&self) -> Result<String> {
        let mut credentials = self.inner.credentials.lock().await;
        if !credentials.is_expired(Utc::now()) {
            return Ok(credentials.access_token.clone());
        }

        let Some(refresh_token) = credentials.refresh_token.clone() else {
            return Err(CalendarError::Authorization(
                "Access token expired and no refresh token is available; run `gcal login`"
                    .to_string(),
            ));
        };

        let response = self
            .inner
            .tokens
            .refresh(&self.inner.secret, &refresh_token)
            .await
            .map_err(|e| match e {
                CalendarError::Authorization(_) => e,
                other => CalendarError::Authorization(format!("Token refresh failed: {other}")),
            })?;
        credentials.apply_refresh(response, Utc::now());
        tracing::info!(
            event = "token_refreshed",
            expires_at = ?credentials.expires_at,
            "access token refreshed"
        );
        persist(self.inner.store.as_ref(), &credentials).await;
        Ok(credentials.access_token.clone())
    }

    /// Forget the current access token's validity so the next call
    /// refreshes. Used after the provider rejects it.
    pub async fn invalidate(&self) {
        let mut credentials = self.inner.credentials.lock().await;
        if credentials.is_renewable() {
            credentials.expires_at = Some(Utc::now());
        }
    }

    pub async fn credentials(&self) -> CredentialSet {
        self.inner.credentials.lock().await.clone()
    }

    pub fn secret(&self) -> &ClientSecret {
        &self.inner.secret
    }

    async fn replace(&self, credentials: CredentialSet) {
        *self.inner.credentials.lock().await = credentials;
    }
}

async fn persist(store: &dyn CredentialStore, credentials: &CredentialSet) {
    if let Err(e) = store.save(credentials).await {
        tracing::warn!(error = %e, "failed to persist credentials; continuing with in-memory token");
    }
}
