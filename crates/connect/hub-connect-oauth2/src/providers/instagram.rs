use super::{OAuthProvider, array_field, missing_field, unsupported};
use crate::client::{OAuth2Client, parse_token_set, send_json};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use crate::types::{PlatformProfile, TokenSet, id_string, str_field};
use async_trait::async_trait;
use hub_connect_core::Platform;
use secrecy::ExposeSecret;
use tracing::debug;

const CONTENT_TYPES: &[&str] = &["posts", "stories", "insights"];

/// Instagram business login.
///
/// Codes are exchanged for a short-lived token which is immediately traded
/// for a long-lived one (~60 days). There is no refresh token: the
/// long-lived token refreshes itself through a GET on the Graph API.
pub struct InstagramProvider {
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
    client: OAuth2Client,
}

impl InstagramProvider {
    pub fn new(config: OAuthConfig, endpoints: ProviderEndpoints, client: OAuth2Client) -> Self {
        Self {
            config,
            endpoints,
            client,
        }
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.api_base.trim_end_matches('/'), path)
    }

    async fn graph_get(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ConnectResult<serde_json::Value> {
        let request = self
            .client
            .http()
            .get(self.graph_url(path))
            .query(query)
            .query(&[("access_token", access_token)]);
        send_json(request, ConnectError::ContentFetch).await
    }
}

#[async_trait]
impl OAuthProvider for InstagramProvider {
    fn platform(&self) -> Platform {
        Platform::Instagram
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

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> ConnectResult<TokenSet> {
        let secret = self.config.client_secret.expose_secret();
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ];
        let request = self.client.http().post(&self.config.token_url).form(&form);
        let short_lived = parse_token_set(
            send_json(request, ConnectError::TokenExchange).await?,
            ConnectError::TokenExchange,
        )?;
        debug!("Obtained short-lived Instagram token, upgrading");

        let request = self
            .client
            .http()
            .get(self.graph_url("access_token"))
            .query(&[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", secret.as_str()),
                ("access_token", short_lived.access_token.as_str()),
            ]);
        let long_lived = parse_token_set(
            send_json(request, ConnectError::TokenExchange).await?,
            ConnectError::TokenExchange,
        )?;

        Ok(TokenSet {
            expires_in: long_lived.expires_in,
            ..TokenSet::bearer(long_lived.access_token)
        })
    }

    async fn refresh_access_token(&self, access_token: &str) -> ConnectResult<TokenSet> {
        let request = self
            .client
            .http()
            .get(self.graph_url("refresh_access_token"))
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", access_token),
            ]);
        let refreshed = parse_token_set(
            send_json(request, ConnectError::TokenRefresh).await?,
            ConnectError::TokenRefresh,
        )?;

        Ok(TokenSet {
            expires_in: refreshed.expires_in,
            ..TokenSet::bearer(refreshed.access_token)
        })
    }

    async fn user_profile(&self, access_token: &str) -> ConnectResult<PlatformProfile> {
        let request = self.client.http().get(self.graph_url("me")).query(&[
            ("fields", "id,username,account_type,media_count"),
            ("access_token", access_token),
        ]);
        let body = send_json(request, ConnectError::ProfileFetch).await?;

        let id = body
            .get("id")
            .and_then(id_string)
            .ok_or_else(missing_field("an account id"))?;
        let mut metadata = serde_json::Map::new();
        for key in ["account_type", "media_count"] {
            if let Some(value) = body.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(PlatformProfile {
            id,
            username: str_field(&body, "username"),
            email: None,
            display_name: str_field(&body, "username"),
            metadata,
        })
    }

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        match content_type {
            "posts" => {
                let body = self
                    .graph_get(
                        "me/media",
                        access_token,
                        &[
                            (
                                "fields",
                                "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,like_count,comments_count",
                            ),
                            ("limit", "25"),
                        ],
                    )
                    .await?;
                Ok(array_field(&body, "data"))
            }
            "stories" => {
                let body = self
                    .graph_get(
                        "me/stories",
                        access_token,
                        &[("fields", "id,media_type,media_url,permalink,timestamp")],
                    )
                    .await?;
                Ok(array_field(&body, "data"))
            }
            "insights" => {
                self.graph_get(
                    "me/insights",
                    access_token,
                    &[("metric", "impressions,reach,profile_views"), ("period", "day")],
                )
                .await
            }
            other => Err(unsupported(Platform::Instagram, other)),
        }
    }
}
