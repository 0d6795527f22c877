//! Credential session: the only writer of the credential pair
//!
//! Refreshes are single-flight. The first caller that needs a refresh spawns
//! it as a detached task and parks a shared handle in `RefreshSlot`; callers
//! arriving while it runs await the same handle. Dropping any caller never
//! cancels the task.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::credential::{CredentialStore, TokenKey};
use crate::crypto::Secret;
use crate::error::{ClientError, Result};

/// Exchanges a refresh credential for a new access credential.
///
/// One network exchange per call, no internal retries.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self, refresh: &Secret) -> Result<Secret>;
}

/// Credential lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable credential pair
    Anonymous,
    Authenticated,
    /// A refresh is in flight
    Refreshing,
}

/// Why a shared refresh produced no credential
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshFailure {
    /// No refresh credential stored
    Missing,
    /// The backend refused or could not be reached; the pair was cleared
    Rejected(String),
    /// The credential store could not be read
    Unavailable(String),
    /// Logout or a new login happened while the refresh ran
    Superseded,
    /// The refresh task panicked or was aborted
    Aborted,
}

type RefreshOutcome = std::result::Result<Secret, RefreshFailure>;
type RefreshHandle = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    in_flight: Option<RefreshHandle>,
}

struct Inner {
    store: CredentialStore,
    transport: Arc<dyn RefreshTransport>,
    slot: Mutex<RefreshSlot>,
    /// Serializes every mutation of the stored pair
    write_lock: Mutex<()>,
    state_tx: watch::Sender<SessionState>,
}

/// Credential session. Clone is cheap and clones share one session.
#[derive(Clone)]
pub struct CredentialSession {
    inner: Arc<Inner>,
}

impl CredentialSession {
    /// Create a session starting `Anonymous`; call [`restore`](Self::restore)
    /// to pick up credentials persisted by an earlier login
    pub fn new(store: CredentialStore, transport: Arc<dyn RefreshTransport>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Anonymous);
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                slot: Mutex::new(RefreshSlot::default()),
                write_lock: Mutex::new(()),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Receiver notified on every state change, forced logouts included
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Recompute the state from the stored pair
    pub async fn restore(&self) -> Result<SessionState> {
        self.inner.restore().await
    }

    /// Store a freshly issued pair. If the second write fails the first is
    /// rolled back so no half pair is left behind.
    pub async fn login(&self, access: Secret, refresh: Secret) -> Result<()> {
        if access.is_empty() || refresh.is_empty() {
            return Err(ClientError::AuthRequired);
        }

        let _guard = self.inner.write_lock.lock().await;
        let store = &self.inner.store;

        store.save(TokenKey::Access, &access).await?;
        if let Err(e) = store.save(TokenKey::Refresh, &refresh).await {
            warn!("Failed to store refresh credential, rolling back login: {}", e);
            if let Err(rollback) = store.delete(TokenKey::Access).await {
                warn!("Rollback of access credential failed: {}", rollback);
            }
            return Err(e);
        }

        self.inner.detach_refresh().await;
        self.inner.state_tx.send_replace(SessionState::Authenticated);
        info!("Session established in namespace {}", store.namespace());
        Ok(())
    }

    /// Store the signed-in user's profile next to the pair. Skipped when no
    /// pair is stored, so a logout racing a login never leaves one behind.
    pub async fn save_profile<T: Serialize + ?Sized>(&self, profile: &T) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        if !self.inner.read_pair().await? {
            debug!("No credential pair stored, not saving profile");
            return Ok(());
        }
        self.inner.store.save_profile(profile).await
    }

    /// Remove both credentials. Calling it on an empty store succeeds.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.inner.store.clear_all().await?;
        self.inner.detach_refresh().await;
        self.inner.state_tx.send_replace(SessionState::Anonymous);
        info!("Session cleared");
        Ok(())
    }

    /// Alias of [`logout`](Self::logout)
    pub async fn clear(&self) -> Result<()> {
        self.logout().await
    }

    /// Current access credential. While a refresh is in flight this waits
    /// for it instead of returning the value being replaced.
    pub async fn current_access(&self) -> Result<Option<Secret>> {
        let in_flight = self.inner.slot.lock().await.in_flight.clone();
        if let Some(handle) = in_flight {
            debug!("Access credential read is waiting for in-flight refresh");
            return Ok(handle.await.ok());
        }

        Ok(self
            .inner
            .store
            .get(TokenKey::Access)
            .await?
            .filter(|access| !access.is_empty()))
    }

    /// Refresh the access credential, joining a refresh already in flight
    pub async fn refresh_if_possible(&self) -> Result<Secret> {
        let handle = {
            let mut slot = self.inner.slot.lock().await;
            self.join_or_start(&mut slot)
        };
        await_refresh(handle).await
    }

    /// Refresh after the server rejected `rejected`.
    ///
    /// When the stored access credential already differs from the rejected
    /// one, another caller refreshed in the meantime and no new exchange is
    /// made.
    pub async fn refresh_after_rejection(&self, rejected: &Secret) -> Result<Secret> {
        let handle = {
            let mut slot = self.inner.slot.lock().await;

            if slot.in_flight.is_none() {
                let current = match self.inner.store.get(TokenKey::Access).await {
                    Ok(current) => current.filter(|access| !access.is_empty()),
                    Err(e) => {
                        warn!("Credential store unavailable during refresh: {}", e);
                        return Err(ClientError::AuthRequired);
                    }
                };

                match current {
                    Some(current) if current != *rejected => {
                        debug!("Access credential already refreshed by another caller");
                        return Ok(current);
                    }
                    Some(_) => {}
                    None => return Err(ClientError::AuthRequired),
                }
            }

            self.join_or_start(&mut slot)
        };
        await_refresh(handle).await
    }

    fn join_or_start(&self, slot: &mut RefreshSlot) -> RefreshHandle {
        if let Some(handle) = &slot.in_flight {
            debug!("Joining in-flight refresh {}", slot.generation);
            return handle.clone();
        }

        slot.generation += 1;
        let generation = slot.generation;
        self.inner.state_tx.send_replace(SessionState::Refreshing);
        debug!("Starting refresh {}", generation);

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let outcome = inner.run_refresh().await;
            inner.finish_refresh(generation).await;
            outcome
        });

        let inner = self.inner.clone();
        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Refresh task failed: {}", e);
                    // The task never reached finish_refresh
                    inner.finish_refresh(generation).await;
                    Err(RefreshFailure::Aborted)
                }
            }
        }
        .boxed()
        .shared();

        slot.in_flight = Some(handle.clone());
        handle
    }
}

async fn await_refresh(handle: RefreshHandle) -> Result<Secret> {
    handle.await.map_err(|failure| {
        debug!("Refresh produced no credential: {:?}", failure);
        ClientError::AuthRequired
    })
}

impl Inner {
    async fn run_refresh(&self) -> RefreshOutcome {
        let refresh = match self.store.get(TokenKey::Refresh).await {
            Ok(Some(refresh)) if !refresh.is_empty() => refresh,
            Ok(_) => {
                warn!("No refresh credential stored, clearing session");
                self.clear_if_unchanged(None).await;
                return Err(RefreshFailure::Missing);
            }
            Err(e) => {
                warn!("Could not read refresh credential: {}", e);
                return Err(RefreshFailure::Unavailable(e.to_string()));
            }
        };

        match self.transport.refresh(&refresh).await {
            Ok(access) if !access.is_empty() => {
                let _guard = self.write_lock.lock().await;

                match self.store.get(TokenKey::Refresh).await {
                    Ok(Some(current)) if current == refresh => {}
                    Ok(_) => {
                        info!("Session changed during refresh, discarding new access credential");
                        return Err(RefreshFailure::Superseded);
                    }
                    Err(e) => {
                        warn!("Could not re-read refresh credential: {}", e);
                        return Err(RefreshFailure::Unavailable(e.to_string()));
                    }
                }

                if let Err(e) = self.store.save(TokenKey::Access, &access).await {
                    warn!("Refreshed access credential could not be persisted: {}", e);
                }
                info!("Access credential refreshed");
                Ok(access)
            }
            Ok(_) => {
                warn!("Refresh returned an empty access credential, clearing session");
                self.clear_if_unchanged(Some(&refresh)).await;
                Err(RefreshFailure::Rejected("empty access credential".to_string()))
            }
            Err(e) => {
                warn!("Refresh failed, clearing session: {}", e);
                self.clear_if_unchanged(Some(&refresh)).await;
                Err(RefreshFailure::Rejected(e.to_string()))
            }
        }
    }

    /// Clear the pair unless a new login replaced the refresh credential
    /// that was used
    async fn clear_if_unchanged(&self, used: Option<&Secret>) {
        let _guard = self.write_lock.lock().await;

        let unchanged = match (self.store.get(TokenKey::Refresh).await, used) {
            (Ok(Some(current)), Some(used)) => current == *used,
            (Ok(Some(current)), None) => current.is_empty(),
            (Ok(None), _) => true,
            // Unreadable: clear anyway
            (Err(_), _) => true,
        };

        if !unchanged {
            debug!("Newer session present, not clearing");
            return;
        }

        if let Err(e) = self.store.clear_all().await {
            warn!("Failed to clear credentials after refresh failure: {}", e);
        }
    }

    /// Forget the in-flight refresh, if any. Its task keeps running but its
    /// generation no longer matches, and its result is discarded because
    /// the refresh credential it used is gone or replaced.
    async fn detach_refresh(&self) {
        let mut slot = self.slot.lock().await;
        slot.generation += 1;
        slot.in_flight = None;
    }

    async fn finish_refresh(&self, generation: u64) {
        {
            let mut slot = self.slot.lock().await;
            if slot.generation == generation {
                slot.in_flight = None;
            }
        }
        if let Err(e) = self.restore().await {
            debug!("Could not recompute session state: {}", e);
        }
    }

    async fn restore(&self) -> Result<SessionState> {
        let state = match self.read_pair().await {
            Ok(true) => SessionState::Authenticated,
            Ok(false) => SessionState::Anonymous,
            Err(e) => {
                self.state_tx.send_replace(SessionState::Anonymous);
                return Err(e);
            }
        };
        self.state_tx.send_replace(state);
        Ok(state)
    }

    /// Both credentials present and non-empty
    async fn read_pair(&self) -> Result<bool> {
        let access = self.store.get(TokenKey::Access).await?;
        let refresh = self.store.get(TokenKey::Refresh).await?;
        Ok(matches!(
            (access, refresh),
            (Some(a), Some(r)) if !a.is_empty() && !r.is_empty()
        ))
    }
}
