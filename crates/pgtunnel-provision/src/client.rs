use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use pgtunnel_common::{AccessMode, DbConnectionInfo, ProvisionError, SshConnectionInfo};

use crate::provider::{AuthToken, CredentialProvisioner};

pub const DEFAULT_PLATFORM_API_URL: &str = "https://api.heroku.com";
pub const DEFAULT_ADDON_API_URL: &str = "https://pg-heroku-addon-api.borealis-data.com";

const PLATFORM_ACCEPT: &str = "application/vnd.heroku+json; version=3";
const AUTH_TOKEN_DESCRIPTION: &str = "Borealis PG CLI plugin temporary auth token";
const AUTH_TOKEN_TTL_SECS: u32 = 180;

/// Endpoints and operator identity for [`HttpProvisioner`]
#[derive(Clone)]
pub struct ProvisionerConfig {
    /// Platform API that issues temporary auth tokens
    pub platform_api_url: String,
    /// Add-on API that creates ad-hoc SSH and DB users
    pub addon_api_url: String,
    /// The operator's own platform API token
    pub api_token: String,
}

/// Provisioner backed by the platform and add-on HTTP APIs
pub struct HttpProvisioner {
    client: Client,
    config: ProvisionerConfig,
}

#[derive(Debug, Serialize)]
struct CreateAuthorization {
    description: &'static str,
    expires_in: u32,
    scope: [&'static str; 2],
}

#[derive(Debug, Deserialize)]
struct AuthorizationResponse {
    id: String,
    access_token: Option<AccessTokenInfo>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenInfo {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDbUser {
    enable_write_access: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    reason: Option<String>,
}

impl HttpProvisioner {
    pub fn new(config: ProvisionerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn platform_url(&self, path: &str) -> String {
        format!("{}{}", self.config.platform_api_url.trim_end_matches('/'), path)
    }

    /// `{addon_api}/heroku/resources/{addon}/{resource}`, with `addon`
    /// percent-encoded as a single path segment
    fn addon_url(&self, addon: &str, resource: &str) -> Result<Url, ProvisionError> {
        let mut url = Url::parse(&self.config.addon_api_url).map_err(|e| {
            ProvisionError::unavailable(format!(
                "invalid add-on API URL {}: {}",
                self.config.addon_api_url, e
            ))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                ProvisionError::unavailable(format!(
                    "add-on API URL {} cannot take a path",
                    self.config.addon_api_url
                ))
            })?
            .pop_if_empty()
            .extend(["heroku", "resources", addon, resource]);

        Ok(url)
    }

    /// POST to the add-on API and decode a success body, classifying failures
    async fn post_addon<B, T>(
        &self,
        token: &AuthToken,
        addon: &str,
        resource: &str,
        body: Option<&B>,
    ) -> Result<T, ProvisionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.addon_url(addon, resource)?;
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token.bearer()?);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProvisionError::unavailable(e.to_string()))?;

        decode_addon_response(addon, response).await
    }
}

async fn decode_addon_response<T: DeserializeOwned>(
    addon: &str,
    response: Response,
) -> Result<T, ProvisionError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProvisionError::unavailable(format!("malformed response: {}", e)));
    }

    let text = response.text().await.unwrap_or_default();
    let reason = serde_json::from_str::<ApiErrorBody>(&text)
        .ok()
        .and_then(|b| b.reason)
        .unwrap_or(text);

    tracing::debug!("Add-on API returned {}: {}", status, reason);
    Err(ProvisionError::from_status(addon, status.as_u16(), reason))
}

#[async_trait]
impl CredentialProvisioner for HttpProvisioner {
    async fn create_auth_token(&self) -> Result<AuthToken, ProvisionError> {
        let response = self
            .client
            .post(self.platform_url("/oauth/authorizations"))
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::ACCEPT, PLATFORM_ACCEPT)
            .json(&CreateAuthorization {
                description: AUTH_TOKEN_DESCRIPTION,
                expires_in: AUTH_TOKEN_TTL_SECS,
                scope: ["read", "identity"],
            })
            .send()
            .await
            .map_err(|e| ProvisionError::AuthToken(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProvisionError::NotLoggedIn);
        }
        if !status.is_success() {
            return Err(ProvisionError::AuthToken(format!("platform API returned {}", status)));
        }

        let body: AuthorizationResponse = response
            .json()
            .await
            .map_err(|e| ProvisionError::AuthToken(format!("malformed response: {}", e)))?;

        Ok(AuthToken {
            id: body.id,
            access_token: body.access_token.map(|t| t.token),
        })
    }

    async fn revoke_auth_token(&self, token: &AuthToken) -> Result<(), ProvisionError> {
        let response = self
            .client
            .delete(self.platform_url(&format!("/oauth/authorizations/{}", token.id)))
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::ACCEPT, PLATFORM_ACCEPT)
            .send()
            .await
            .map_err(|e| ProvisionError::AuthToken(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProvisionError::AuthToken(format!(
                "revoking {} returned {}",
                token.id,
                response.status()
            )))
        }
    }

    async fn create_ssh_user(
        &self,
        token: &AuthToken,
        addon: &str,
    ) -> Result<SshConnectionInfo, ProvisionError> {
        self.post_addon::<(), _>(token, addon, "adhoc-ssh-users", None)
            .await
    }

    async fn create_db_user(
        &self,
        token: &AuthToken,
        addon: &str,
        access_mode: AccessMode,
    ) -> Result<DbConnectionInfo, ProvisionError> {
        let body = CreateDbUser {
            enable_write_access: access_mode.allows_writes(),
        };
        let mut db: DbConnectionInfo = self
            .post_addon(token, addon, "adhoc-db-users", Some(&body))
            .await?;
        db.access_mode = access_mode;
        Ok(db)
    }
}
