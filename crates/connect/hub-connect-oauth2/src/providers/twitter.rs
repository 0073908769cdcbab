use super::{OAuthProvider, array_field, missing_field, unsupported};
use crate::client::{OAuth2Client, send_empty, send_json};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use crate::types::{PlatformProfile, TokenTypeHint, id_string, str_field};
use async_trait::async_trait;
use hub_connect_core::Platform;
use secrecy::ExposeSecret;

const CONTENT_TYPES: &[&str] = &["tweets", "mentions", "followers"];
const USER_FIELDS: &str =
    "id,name,username,profile_image_url,description,public_metrics,created_at,verified";

/// Twitter/X OAuth 2.0. PKCE is always on.
pub struct TwitterProvider {
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
    client: OAuth2Client,
}

impl TwitterProvider {
    pub fn new(
        mut config: OAuthConfig,
        endpoints: ProviderEndpoints,
        client: OAuth2Client,
    ) -> Self {
        config.use_pkce = true;
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

    async fn own_user_id(&self, access_token: &str) -> ConnectResult<String> {
        let me = self.api_get("users/me", access_token, &[]).await?;
        me.pointer("/data/id")
            .and_then(id_string)
            .ok_or_else(|| ConnectError::ContentFetch("users/me returned no id".to_string()))
    }
}

#[async_trait]
impl OAuthProvider for TwitterProvider {
    fn platform(&self) -> Platform {
        Platform::Twitter
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
            .bearer_auth(access_token)
            .query(&[("user.fields", USER_FIELDS)]);
        let body = send_json(request, ConnectError::ProfileFetch).await?;
        let user = body.get("data").ok_or_else(missing_field("a data object"))?;

        let id = user
            .get("id")
            .and_then(id_string)
            .ok_or_else(missing_field("a user id"))?;
        let mut metadata = serde_json::Map::new();
        for key in [
            "profile_image_url",
            "description",
            "public_metrics",
            "verified",
            "created_at",
        ] {
            if let Some(value) = user.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(PlatformProfile {
            id,
            username: str_field(user, "username"),
            email: None,
            display_name: str_field(user, "name"),
            metadata,
        })
    }

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        let (path, query): (&str, &[(&str, &str)]) = match content_type {
            "tweets" => (
                "tweets",
                &[
                    (
                        "tweet.fields",
                        "id,text,created_at,public_metrics,referenced_tweets,attachments",
                    ),
                    ("max_results", "25"),
                    ("exclude", "retweets,replies"),
                ],
            ),
            "mentions" => (
                "mentions",
                &[
                    (
                        "tweet.fields",
                        "id,text,created_at,author_id,public_metrics",
                    ),
                    ("max_results", "25"),
                ],
            ),
            "followers" => (
                "followers",
                &[
                    (
                        "user.fields",
                        "id,name,username,profile_image_url,public_metrics",
                    ),
                    ("max_results", "25"),
                ],
            ),
            other => return Err(unsupported(Platform::Twitter, other)),
        };

        let user_id = self.own_user_id(access_token).await?;
        let body = self
            .api_get(&format!("users/{}/{}", user_id, path), access_token, query)
            .await?;
        Ok(array_field(&body, "data"))
    }

    fn supports_revocation(&self) -> bool {
        self.endpoints.revoke_url.is_some()
    }

    async fn revoke_token(&self, token: &str, hint: TokenTypeHint) -> ConnectResult<()> {
        let url = self.endpoints.revoke_url.as_deref().ok_or_else(|| {
            ConnectError::NotImplemented("token revocation for twitter".to_string())
        })?;
        let request = self
            .client
            .http()
            .post(url)
            .basic_auth(
                &self.config.client_id,
                Some(self.config.client_secret.expose_secret()),
            )
            .form(&[
                ("token", token),
                ("token_type_hint", hint.as_str()),
                ("client_id", self.config.client_id.as_str()),
            ]);
        send_empty(request, ConnectError::Revocation).await
    }
}
