//! Execute requests with the session's access credential, recovering from
//! one authorization failure per call

use std::sync::Arc;
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, HttpTransport};
use crate::error::{ClientError, Result};
use crate::session::CredentialSession;

/// Request executor
///
/// Per `send`: one or two HTTP calls, and at most one refresh (started or
/// joined).
#[derive(Clone)]
pub struct RequestExecutor {
    session: CredentialSession,
    http: Arc<dyn HttpTransport>,
}

impl RequestExecutor {
    pub fn new(session: CredentialSession, http: Arc<dyn HttpTransport>) -> Self {
        Self { session, http }
    }

    pub fn session(&self) -> &CredentialSession {
        &self.session
    }

    /// Send `request`.
    ///
    /// With `requires_auth == false` the request goes out as given and the
    /// response is returned whatever its status. Otherwise a bearer
    /// credential is attached, 2xx is returned, 401/403 triggers one
    /// refresh-and-retry, and any other status is an `HttpStatus` error.
    pub async fn send(&self, request: ApiRequest, requires_auth: bool) -> Result<ApiResponse> {
        if !requires_auth {
            return self.http.execute(request).await;
        }

        let access = match self.session.current_access().await {
            Ok(Some(access)) => access,
            Ok(None) => {
                debug!("No access credential for {} {}", request.method, request.url);
                return Err(ClientError::AuthRequired);
            }
            Err(e) => {
                warn!("Credential store unavailable: {}", e);
                return Err(ClientError::AuthRequired);
            }
        };

        let response = self.http.execute(request.with_bearer(&access)?).await?;
        if response.is_success() {
            return Ok(response);
        }
        if !response.is_auth_failure() {
            return Err(ClientError::from_status(
                response.status.as_u16(),
                &response.body,
            ));
        }

        debug!(
            "{} {} returned {}, refreshing access credential",
            request.method, request.url, response.status
        );

        let fresh = self.session.refresh_after_rejection(&access).await?;
        if fresh == access {
            warn!("Refresh returned the rejected access credential, not retrying");
            return Err(ClientError::AuthRequired);
        }

        let retried = self.http.execute(request.with_bearer(&fresh)?).await?;
        if retried.is_success() {
            return Ok(retried);
        }
        if retried.is_auth_failure() {
            warn!(
                "{} {} still returned {} after refresh, forcing logout",
                request.method, request.url, retried.status
            );
            if let Err(e) = self.session.logout().await {
                warn!("Forced logout could not clear credentials: {}", e);
            }
            return Err(ClientError::AuthRequired);
        }

        Err(ClientError::from_status(
            retried.status.as_u16(),
            &retried.body,
        ))
    }
}
