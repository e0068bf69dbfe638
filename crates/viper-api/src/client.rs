//! HTTP implementation of [`VehicleApi`] for the Viper cloud service

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use viper_core::{Command, StatusRead, VehicleId, VehicleInfo};

use crate::error::{ApiError, ApiResult};
use crate::parse::{self, ActiveStatus, AuthToken, CurrentStatus};
use crate::VehicleApi;

/// Base URL of the production service
pub const DEFAULT_BASE_URL: &str = "https://www.vcp.cloud/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Login credentials for one account
#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

pub struct ViperClientBuilder {
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl ViperClientBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: username.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Upper bound on each HTTP request, connect included
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> ApiResult<ViperClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(ViperClient {
            http,
            base_url: self.base_url,
            timeout: self.timeout,
            credentials: RwLock::new(Credentials {
                username: self.username,
                password: self.password,
            }),
            token: RwLock::new(None),
        })
    }
}

/// Client for the Viper SmartStart cloud API
pub struct ViperClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    credentials: RwLock<Credentials>,
    token: RwLock<Option<AuthToken>>,
}

impl ViperClient {
    pub fn builder(username: impl Into<String>, password: impl Into<String>) -> ViperClientBuilder {
        ViperClientBuilder::new(username, password)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    async fn bearer(&self) -> ApiResult<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| format!("Bearer {}", t.access_token))
            .ok_or_else(|| ApiError::Auth("not authenticated".into()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::from(err)
        }
    }

    /// POST a device command and return the decoded body
    async fn post_command(&self, vehicle_id: &VehicleId, command: &str) -> ApiResult<Value> {
        let auth = self.bearer().await?;
        debug!(vehicle_id = %vehicle_id, command, "Sending device command");

        let response = self
            .http
            .post(self.url("/devices/command"))
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&json!({"command": command, "deviceId": vehicle_id.as_str()}))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        check_status(response.status())?;
        response.json::<Value>().await.map_err(|e| self.send_error(e))
    }
}

/// Map an HTTP status to the API error taxonomy
fn check_status(status: StatusCode) -> ApiResult<()> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::UNAUTHORIZED => Err(ApiError::Auth("token expired".into())),
        other => Err(ApiError::Status {
            status: other.as_u16(),
        }),
    }
}

#[async_trait]
impl VehicleApi for ViperClient {
    #[instrument(skip(self))]
    async fn login(&self) -> ApiResult<()> {
        let credentials = self.credentials.read().await.clone();
        debug!(username = %credentials.username, "Authenticating");

        let response = self
            .http
            .post(self.url("/auth/login"))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Authentication rejected");
            return Err(ApiError::Auth(format!(
                "authentication failed: HTTP {}",
                status.as_u16()
            )));
        }

        let body: Value = response.json().await.map_err(|e| self.send_error(e))?;
        let token = parse::parse_login(&body)?;
        *self.token.write().await = Some(token);

        debug!("Authentication successful");
        Ok(())
    }

    async fn set_credentials(&self, username: &str, password: &str) {
        *self.credentials.write().await = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        *self.token.write().await = None;
        debug!(username, "Credentials replaced");
    }

    #[instrument(skip(self))]
    async fn list_vehicles(&self) -> ApiResult<Vec<VehicleInfo>> {
        let auth = self.bearer().await?;

        let response = self
            .http
            .get(self.url("/devices/search/null"))
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        check_status(response.status())?;
        let body: Value = response.json().await.map_err(|e| self.send_error(e))?;
        parse::parse_devices(&body)
    }

    async fn get_active_status(&self, vehicle_id: &VehicleId) -> ApiResult<ActiveStatus> {
        let body = self
            .post_command(vehicle_id, StatusRead::Active.wire_name())
            .await?;
        parse::parse_active(&body)
    }

    async fn get_current_status(&self, vehicle_id: &VehicleId) -> ApiResult<CurrentStatus> {
        let body = self
            .post_command(vehicle_id, StatusRead::Current.wire_name())
            .await?;
        parse::parse_current(&body)
    }

    #[instrument(skip(self), fields(vehicle_id = %vehicle_id))]
    async fn send_command(&self, vehicle_id: &VehicleId, command: Command) -> ApiResult<()> {
        let body = self.post_command(vehicle_id, command.wire_name()).await?;

        if parse::command_accepted(&body) {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                command: command.wire_name().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status() {
        tokio_test::assert_ok!(check_status(StatusCode::OK));
        assert!(check_status(StatusCode::UNAUTHORIZED).unwrap_err().is_auth());
        assert_eq!(
            check_status(StatusCode::BAD_GATEWAY).unwrap_err(),
            ApiError::Status { status: 502 }
        );
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ViperClient::builder("user", "pass")
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(client.url("/auth/login"), "http://localhost:8080/v1/auth/login");
    }

    #[tokio::test]
    async fn test_requests_fail_fast_without_token() {
        let client = ViperClient::builder("user", "pass").build().unwrap();
        assert!(!client.is_authenticated().await);

        let err = client
            .send_command(&VehicleId::new("1"), Command::Lock)
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_set_credentials_drops_token() {
        let client = ViperClient::builder("user", "old").build().unwrap();
        *client.token.write().await = Some(AuthToken {
            access_token: "t".into(),
            expiration: None,
        });
        assert!(client.is_authenticated().await);

        client.set_credentials("user", "new").await;
        assert!(!client.is_authenticated().await);
        assert_eq!(client.credentials.read().await.password, "new");
    }
}
