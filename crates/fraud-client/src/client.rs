//! Client facade wiring storage, session, auth API and executor

use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::credential::CredentialStore;
use crate::crypto::Secret;
use crate::error::Result;
use crate::http::{
    ApiRequest, ApiResponse, AuthApi, HttpTransport, ReqwestTransport, RequestExecutor,
    UserProfile,
};
use crate::session::{CredentialSession, SessionState};
use crate::settings::ClientSettings;
use crate::storage::SecureStorage;

/// Fraud Fishing API client
///
/// Clone is cheap; clones share the session, so a refresh started through
/// one clone is joined by the others.
#[derive(Clone)]
pub struct FraudClient {
    base_url: Url,
    auth: AuthApi,
    executor: RequestExecutor,
}

impl FraudClient {
    /// Client over `reqwest` with the configured timeout
    pub async fn new(settings: &ClientSettings, storage: Arc<dyn SecureStorage>) -> Result<Self> {
        let http = Arc::new(ReqwestTransport::new(settings.request_timeout())?);
        Self::with_transport(settings, storage, http).await
    }

    /// Client over a caller-provided transport
    pub async fn with_transport(
        settings: &ClientSettings,
        storage: Arc<dyn SecureStorage>,
        http: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        settings.validate()?;
        let base_url = settings.base_url()?;

        let auth = AuthApi::new(http.clone(), &base_url)?;
        let store = CredentialStore::new(storage, settings.namespace.clone());
        let session = CredentialSession::new(store, Arc::new(auth.clone()));

        match session.restore().await {
            Ok(SessionState::Anonymous) => {
                // A profile without a pair belongs to a session that is gone
                if let Err(e) = session.store().delete_profile().await {
                    debug!("Could not remove stale profile: {}", e);
                }
            }
            Ok(_) => match session.store().get_profile::<UserProfile>().await {
                Ok(Some(user)) => info!("Restored session for {}", user.email),
                Ok(None) => debug!("Restored session without a saved profile"),
                Err(e) => warn!("Saved profile is unreadable: {}", e),
            },
            Err(e) => warn!("Could not read stored credentials, starting anonymous: {}", e),
        }

        Ok(Self {
            base_url,
            auth,
            executor: RequestExecutor::new(session, http),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &CredentialSession {
        self.executor.session()
    }

    pub fn state(&self) -> SessionState {
        self.session().state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.session().subscribe()
    }

    /// Create an account; does not sign in
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        self.auth.register(name, email, password).await
    }

    /// Log in with email and password, storing the issued pair and the
    /// user's profile
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        let response = self.auth.login(email, password).await?;
        self.session()
            .login(response.access, response.refresh)
            .await?;

        if let Err(e) = self.session().save_profile(&response.user).await {
            warn!("Signed in but the profile could not be saved: {}", e);
        }
        info!("Signed in as {}", response.user.email);
        Ok(response.user)
    }

    /// Store a pair obtained elsewhere. Any saved profile is dropped since
    /// it may belong to another account.
    pub async fn login_with_tokens(&self, access: Secret, refresh: Secret) -> Result<()> {
        self.session().store().delete_profile().await?;
        self.session().login(access, refresh).await
    }

    /// Remove the pair and the saved profile
    pub async fn logout(&self) -> Result<()> {
        self.session().logout().await
    }

    /// Profile saved at the last login, `None` when signed out
    pub async fn current_user(&self) -> Result<Option<UserProfile>> {
        self.session().store().get_profile().await
    }

    pub async fn current_user_id(&self) -> Result<Option<i64>> {
        Ok(self.current_user().await?.map(|user| user.id))
    }

    /// Build a request for `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        Ok(ApiRequest::new(method, url))
    }

    pub async fn send(&self, request: ApiRequest, requires_auth: bool) -> Result<ApiResponse> {
        self.executor.send(request, requires_auth).await
    }

    /// GET `path` and decode the JSON body. Non-2xx responses are errors
    /// for public calls too.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        requires_auth: bool,
    ) -> Result<T> {
        let request = self.request(Method::GET, path)?;
        self.send(request, requires_auth)
            .await?
            .error_for_status()?
            .json()
    }
}
