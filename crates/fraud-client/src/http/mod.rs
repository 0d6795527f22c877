//! HTTP layer: request model, transports, the auth API and the
//! credential-attaching executor

mod auth_api;
mod executor;
mod request;

pub use auth_api::{AuthApi, LoginResponse, UserProfile};
pub use executor::RequestExecutor;
pub use request::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
