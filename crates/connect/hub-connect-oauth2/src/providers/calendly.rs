use super::{OAuthProvider, array_field, missing_field, unsupported};
use crate::client::{OAuth2Client, send_empty, send_json};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use crate::types::{PlatformProfile, TokenTypeHint, str_field};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hub_connect_core::Platform;
use secrecy::ExposeSecret;

const CONTENT_TYPES: &[&str] = &["event_types", "scheduled_events", "invitees", "availability"];

/// Calendly OAuth. Resources are identified by URI rather than by bare id.
pub struct CalendlyProvider {
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
    client: OAuth2Client,
}

impl CalendlyProvider {
    pub fn new(config: OAuthConfig, endpoints: ProviderEndpoints, client: OAuth2Client) -> Self {
        Self {
            config,
            endpoints,
            client,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.api_base.trim_end_matches('/'), path)
    }

    async fn api_get(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ConnectResult<serde_json::Value> {
        let request = self
            .client
            .http()
            .get(self.api_url(path))
            .bearer_auth(access_token)
            .query(query);
        send_json(request, ConnectError::ContentFetch).await
    }

    /// The `resource` object of `/users/me`.
    async fn current_user(&self, access_token: &str) -> ConnectResult<serde_json::Value> {
        let body = self.api_get("users/me", access_token, &[]).await?;
        body.get("resource")
            .cloned()
            .ok_or_else(|| ConnectError::ContentFetch("users/me returned no resource".to_string()))
    }

    async fn organization(&self, access_token: &str) -> ConnectResult<String> {
        let user = self.current_user(access_token).await?;
        str_field(&user, "current_organization").ok_or_else(|| {
            ConnectError::ContentFetch("user has no current organization".to_string())
        })
    }

    async fn scheduled_events(&self, access_token: &str) -> ConnectResult<serde_json::Value> {
        let organization = self.organization(access_token).await?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let body = self
            .api_get(
                "scheduled_events",
                access_token,
                &[
                    ("organization", organization.as_str()),
                    ("status", "active"),
                    ("min_start_time", now.as_str()),
                    ("count", "50"),
                ],
            )
            .await?;
        Ok(array_field(&body, "collection"))
    }

    async fn invitees(&self, access_token: &str) -> ConnectResult<serde_json::Value> {
        let events = self.scheduled_events(access_token).await?;
        let Some(event_uri) = events.pointer("/0/uri").and_then(|v| v.as_str()) else {
            return Ok(serde_json::Value::Array(Vec::new()));
        };
        let event_id = uri_id(event_uri);
        let body = self
            .api_get(
                &format!("scheduled_events/{}/invitees", event_id),
                access_token,
                &[("count", "50")],
            )
            .await?;
        Ok(array_field(&body, "collection"))
    }
}

/// Last path segment of a Calendly resource URI.
fn uri_id(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}

#[async_trait]
impl OAuthProvider for CalendlyProvider {
    fn platform(&self) -> Platform {
        Platform::Calendly
    }

    fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn client(&self) -> &OAuth2Client {
        &self.client
    }

    fn content_types(&self) -> &'static [&'static str] {
        CONTENT_TYPES
    }

    async fn user_profile(&self, access_token: &str) -> ConnectResult<PlatformProfile> {
        let request = self
            .client
            .http()
            .get(self.api_url("users/me"))
            .bearer_auth(access_token);
        let body = send_json(request, ConnectError::ProfileFetch).await?;
        let user = body
            .get("resource")
            .ok_or_else(missing_field("a resource object"))?;

        let id = str_field(user, "uri").ok_or_else(missing_field("a user uri"))?;
        let mut metadata = serde_json::Map::new();
        for key in [
            "avatar_url",
            "timezone",
            "scheduling_url",
            "current_organization",
            "created_at",
        ] {
            if let Some(value) = user.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(PlatformProfile {
            id,
            username: str_field(user, "slug"),
            email: str_field(user, "email"),
            display_name: str_field(user, "name"),
            metadata,
        })
    }

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        match content_type {
            "event_types" => {
                let organization = self.organization(access_token).await?;
                let body = self
                    .api_get(
                        "event_types",
                        access_token,
                        &[
                            ("organization", organization.as_str()),
                            ("active", "true"),
                            ("count", "50"),
                        ],
                    )
                    .await?;
                Ok(array_field(&body, "collection"))
            }
            "scheduled_events" => self.scheduled_events(access_token).await,
            "invitees" => self.invitees(access_token).await,
            "availability" => {
                let user = self.current_user(access_token).await?;
                let user_uri = str_field(&user, "uri").ok_or_else(|| {
                    ConnectError::ContentFetch("users/me returned no uri".to_string())
                })?;
                let body = self
                    .api_get(
                        "availability_schedules",
                        access_token,
                        &[("user", user_uri.as_str())],
                    )
                    .await?;
                Ok(array_field(&body, "collection"))
            }
            other => Err(unsupported(Platform::Calendly, other)),
        }
    }

    fn supports_revocation(&self) -> bool {
        self.endpoints.revoke_url.is_some()
    }

    async fn revoke_token(&self, token: &str, _hint: TokenTypeHint) -> ConnectResult<()> {
        let url = self.endpoints.revoke_url.as_deref().ok_or_else(|| {
            ConnectError::NotImplemented("token revocation for calendly".to_string())
        })?;
        let request = self.client.http().post(url).form(&[
            ("token", token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ]);
        send_empty(request, ConnectError::Revocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_id() {
        assert_eq!(
            uri_id("https://api.calendly.com/scheduled_events/GBGBDCAADAEDCRZ2"),
            "GBGBDCAADAEDCRZ2"
        );
        assert_eq!(uri_id("plain"), "plain");
    }
}
