//! Backend authentication endpoints: login and access-token refresh

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::{ApiRequest, HttpTransport};
use crate::crypto::Secret;
use crate::error::Result;
use crate::session::RefreshTransport;

const LOGIN_PATH: &str = "auth/login";
const REFRESH_PATH: &str = "auth/refresh";
const REGISTER_PATH: &str = "users";

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Profile returned alongside the tokens at login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// 0 or 1
    pub is_admin: i64,
    pub is_super_admin: i64,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.is_admin != 0 || self.is_super_admin != 0
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLoginResponse {
    access_token: String,
    refresh_token: String,
    user: UserProfile,
}

/// Successful login: the credential pair and the user's profile
#[derive(Debug)]
pub struct LoginResponse {
    pub access: Secret,
    pub refresh: Secret,
    pub user: UserProfile,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Client for the `/auth` endpoints. Both calls are unauthenticated.
#[derive(Clone)]
pub struct AuthApi {
    http: Arc<dyn HttpTransport>,
    login_url: Url,
    refresh_url: Url,
    register_url: Url,
}

impl AuthApi {
    /// `base_url` must end with `/` for the endpoint paths to nest under it
    pub fn new(http: Arc<dyn HttpTransport>, base_url: &Url) -> Result<Self> {
        Ok(Self {
            http,
            login_url: base_url.join(LOGIN_PATH)?,
            refresh_url: base_url.join(REFRESH_PATH)?,
            register_url: base_url.join(REGISTER_PATH)?,
        })
    }

    /// Create an account. The backend issues no credentials here; log in
    /// afterwards.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post(self.register_url.clone()).json(&RegisterRequest {
            name,
            email,
            password,
        })?;

        self.http.execute(request).await?.error_for_status()?;
        info!("Registered account for {}", email);
        Ok(())
    }

    /// Exchange email and password for a credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let request = ApiRequest::post(self.login_url.clone())
            .json(&LoginRequest { email, password })?;

        let response = self.http.execute(request).await?.error_for_status()?;
        let raw: RawLoginResponse = response.json()?;

        info!("Logged in as user {}", raw.user.id);
        Ok(LoginResponse {
            access: Secret::new(raw.access_token),
            refresh: Secret::new(raw.refresh_token),
            user: raw.user,
        })
    }
}

#[async_trait]
impl RefreshTransport for AuthApi {
    async fn refresh(&self, refresh: &Secret) -> Result<Secret> {
        let request = ApiRequest::post(self.refresh_url.clone()).json(&RefreshRequest {
            refresh_token: refresh.expose(),
        })?;

        let response = self.http.execute(request).await?.error_for_status()?;
        let decoded: RefreshResponse = response.json()?;

        debug!("Refresh endpoint issued a new access credential");
        Ok(Secret::new(decoded.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ApiResponse;
    use crate::test_support::ScriptedHttp;
    use reqwest::header::AUTHORIZATION;
    use reqwest::{Method, StatusCode};

    fn base() -> Url {
        Url::parse("http://localhost:3000/").unwrap()
    }

    const LOGIN_BODY: &str = r#"{
        "accessToken": "A1",
        "refreshToken": "R1",
        "user": {
            "id": 7,
            "email": "ana@example.com",
            "name": "Ana",
            "isAdmin": 0,
            "isSuperAdmin": 0
        }
    }"#;

    #[tokio::test]
    async fn test_login_decodes_pair_and_profile() {
        let http = ScriptedHttp::new(vec![ApiResponse::new(StatusCode::OK, LOGIN_BODY)]);
        let api = AuthApi::new(http.clone(), &base()).unwrap();

        let login = api.login("ana@example.com", "pw").await.unwrap();

        assert_eq!(login.access, Secret::new("A1"));
        assert_eq!(login.refresh, Secret::new("R1"));
        assert_eq!(login.user.name, "Ana");
        assert!(!login.user.is_admin());

        let sent = http.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url.as_str(), "http://localhost:3000/auth/login");
        assert!(sent[0].headers.get(AUTHORIZATION).is_none());
        let body: serde_json::Value =
            serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["email"], "ana@example.com");
        assert_eq!(body["password"], "pw");
    }

    #[tokio::test]
    async fn test_register_posts_to_users() {
        let http = ScriptedHttp::new(vec![ApiResponse::new(StatusCode::CREATED, "")]);
        let api = AuthApi::new(http.clone(), &base()).unwrap();

        api.register("Ana", "ana@example.com", "pw").await.unwrap();

        let sent = http.requests();
        assert_eq!(sent[0].method, Method::POST);
        assert_eq!(sent[0].url.as_str(), "http://localhost:3000/users");
        assert!(sent[0].headers.get(AUTHORIZATION).is_none());
        let body: serde_json::Value =
            serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["name"], "Ana");
        assert_eq!(body["email"], "ana@example.com");
        assert_eq!(body["password"], "pw");
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let http = ScriptedHttp::new(vec![ApiResponse::new(
            StatusCode::CONFLICT,
            r#"{"message":"Email already registered"}"#,
        )]);
        let api = AuthApi::new(http, &base()).unwrap();

        let err = api.register("Ana", "ana@example.com", "pw").await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let http = ScriptedHttp::new(vec![ApiResponse::new(StatusCode::UNAUTHORIZED, "")]);
        let api = AuthApi::new(http, &base()).unwrap();

        let err = api.login("ana@example.com", "wrong").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_refresh_sends_snake_case_body() {
        let http =
            ScriptedHttp::new(vec![ApiResponse::new(StatusCode::OK, r#"{"access_token":"A2"}"#)]);
        let api = AuthApi::new(http.clone(), &base()).unwrap();

        let access = api.refresh(&Secret::new("R1")).await.unwrap();

        assert_eq!(access, Secret::new("A2"));
        let sent = http.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url.as_str(), "http://localhost:3000/auth/refresh");
        let body: serde_json::Value =
            serde_json::from_slice(sent[0].body.as_ref().unwrap()).unwrap();
        assert_eq!(body["refresh_token"], "R1");
    }

    #[tokio::test]
    async fn test_refresh_failures() {
        let http = ScriptedHttp::new(vec![
            ApiResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ApiResponse::new(StatusCode::OK, "not json"),
        ]);
        let api = AuthApi::new(http.clone(), &base()).unwrap();

        let err = api.refresh(&Secret::new("R1")).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(api.refresh(&Secret::new("R1")).await.is_err());
        assert_eq!(http.requests().len(), 2);
    }
}
