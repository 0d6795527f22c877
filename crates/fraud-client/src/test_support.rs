//! Fakes shared by the unit tests

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::crypto::Secret;
use crate::error::{ClientError, Result};
use crate::http::{ApiRequest, ApiResponse, HttpTransport};
use crate::session::RefreshTransport;
use crate::storage::{MemoryStorage, SecureStorage};

/// Refresh endpoint returning a fixed access credential or a fixed status
pub struct FakeRefresh {
    outcome: std::result::Result<String, u16>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl FakeRefresh {
    fn with_outcome(outcome: std::result::Result<String, u16>) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn returning(access: &str) -> Arc<Self> {
        Self::with_outcome(Ok(access.to_string()))
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Self::with_outcome(Err(status))
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock().unwrap() = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh credentials presented, in call order
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefreshTransport for FakeRefresh {
    async fn refresh(&self, refresh: &Secret) -> Result<Secret> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(refresh.expose().to_string());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Ok(access) => Ok(Secret::new(access.clone())),
            Err(status) => Err(ClientError::HttpStatus {
                status: *status,
                body: String::new(),
            }),
        }
    }
}

/// Memory storage that refuses to write the refresh credential
pub struct FailingRefreshWrite {
    inner: MemoryStorage,
}

impl FailingRefreshWrite {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
        }
    }
}

#[async_trait]
impl SecureStorage for FailingRefreshWrite {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        if key.ends_with("refresh_token") {
            return Err(ClientError::StorageError("write refused".to_string()));
        }
        self.inner.store(key, value).await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.retrieve(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "Failing Storage"
    }
}

/// Transport replaying canned responses in order and recording requests
pub struct ScriptedHttp {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedHttp {
    pub fn new(responses: Vec<ApiResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClientError::Network("no scripted response left".to_string()))
    }
}

/// Backend accepting one bearer credential and rejecting anything else,
/// with 401 unless told otherwise
pub struct FakeBackend {
    accepted: Option<String>,
    rejection: Mutex<StatusCode>,
    fail_next: Mutex<Option<StatusCode>>,
    bearers: Mutex<Vec<Option<String>>>,
}

impl FakeBackend {
    pub fn accepting(access: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted: Some(access.to_string()),
            rejection: Mutex::new(StatusCode::UNAUTHORIZED),
            fail_next: Mutex::new(None),
            bearers: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting_all() -> Arc<Self> {
        Arc::new(Self {
            accepted: None,
            rejection: Mutex::new(StatusCode::UNAUTHORIZED),
            fail_next: Mutex::new(None),
            bearers: Mutex::new(Vec::new()),
        })
    }

    /// Status used for rejected credentials, e.g. 403
    pub fn reject_with(&self, status: StatusCode) {
        *self.rejection.lock().unwrap() = status;
    }

    /// Answer the next accepted request with `status` instead of 200
    pub fn fail_next_accepted(&self, status: StatusCode) {
        *self.fail_next.lock().unwrap() = Some(status);
    }

    /// Bearer credential of every request received, `None` when absent
    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.bearers.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for FakeBackend {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let bearer = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);
        self.bearers.lock().unwrap().push(bearer.clone());

        // Let concurrent callers reach the server before anyone sees a reply
        tokio::task::yield_now().await;

        let accepted = bearer.is_some() && bearer == self.accepted;
        if !accepted {
            let status = *self.rejection.lock().unwrap();
            return Ok(ApiResponse::new(status, "rejected"));
        }
        match self.fail_next.lock().unwrap().take() {
            Some(status) => Ok(ApiResponse::new(status, "failure")),
            None => Ok(ApiResponse::new(StatusCode::OK, r#"{"ok":true}"#)),
        }
    }
}
