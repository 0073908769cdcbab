use super::{OAuthProvider, array_field, missing_field, unsupported};
use crate::client::{OAuth2Client, parse_token_set, send_json};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use crate::types::{PlatformProfile, TokenSet, id_string, str_field};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use hub_connect_core::Platform;
use secrecy::ExposeSecret;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CONTENT_TYPES: &[&str] = &["products", "orders", "customers", "inventory"];
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Shopify admin OAuth for a single shop.
///
/// Every endpoint lives under the shop's own subdomain. Offline access
/// tokens never expire and there is no refresh grant.
pub struct ShopifyProvider {
    shop: String,
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
    client: OAuth2Client,
}

impl ShopifyProvider {
    pub fn new(
        shop: String,
        config: OAuthConfig,
        endpoints: ProviderEndpoints,
        client: OAuth2Client,
    ) -> Self {
        Self {
            shop,
            config,
            endpoints,
            client,
        }
    }

    pub fn shop(&self) -> &str {
        &self.shop
    }

    async fn admin_get(
        &self,
        resource: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ConnectResult<serde_json::Value> {
        let url = format!(
            "{}/{}.json",
            self.endpoints.api_base.trim_end_matches('/'),
            resource
        );
        let request = self
            .client
            .http()
            .get(url)
            .header(ACCESS_TOKEN_HEADER, access_token)
            .query(query);
        send_json(request, ConnectError::ContentFetch).await
    }

    async fn inventory(&self, access_token: &str) -> ConnectResult<serde_json::Value> {
        let locations = self.admin_get("locations", access_token, &[]).await?;
        let Some(location_id) = locations.pointer("/locations/0/id").and_then(id_string) else {
            return Ok(serde_json::Value::Array(Vec::new()));
        };
        let body = self
            .admin_get(
                "inventory_levels",
                access_token,
                &[("location_ids", location_id.as_str()), ("limit", "50")],
            )
            .await?;
        Ok(array_field(&body, "inventory_levels"))
    }
}

#[async_trait]
impl OAuthProvider for ShopifyProvider {
    fn platform(&self) -> Platform {
        Platform::Shopify
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
        let request = self
            .client
            .http()
            .post(&self.config.token_url)
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret.expose_secret(),
                "code": code,
            }));
        let tokens = parse_token_set(
            send_json(request, ConnectError::TokenExchange).await?,
            ConnectError::TokenExchange,
        )?;

        Ok(TokenSet {
            scope: tokens.scope,
            ..TokenSet::bearer(tokens.access_token)
        })
    }

    async fn refresh_access_token(&self, _token: &str) -> ConnectResult<TokenSet> {
        Err(ConnectError::TokenRefresh(
            "Shopify offline access tokens do not expire and cannot be refreshed".to_string(),
        ))
    }

    async fn user_profile(&self, access_token: &str) -> ConnectResult<PlatformProfile> {
        let url = format!(
            "{}/shop.json",
            self.endpoints.api_base.trim_end_matches('/')
        );
        let request = self
            .client
            .http()
            .get(url)
            .header(ACCESS_TOKEN_HEADER, access_token);
        let body = send_json(request, ConnectError::ProfileFetch).await?;
        let shop = body.get("shop").ok_or_else(missing_field("a shop object"))?;

        let id = shop
            .get("id")
            .and_then(id_string)
            .ok_or_else(missing_field("a shop id"))?;
        let mut metadata = serde_json::Map::new();
        metadata.insert("shop".to_string(), self.shop.clone().into());
        for key in [
            "domain",
            "currency",
            "timezone",
            "country_name",
            "phone",
            "plan_name",
            "primary_location_id",
        ] {
            if let Some(value) = shop.get(key) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        Ok(PlatformProfile {
            id,
            username: str_field(shop, "myshopify_domain")
                .or_else(|| Some(format!("{}.myshopify.com", self.shop))),
            email: str_field(shop, "email"),
            display_name: str_field(shop, "name"),
            metadata,
        })
    }

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        match content_type {
            "products" => {
                let body = self
                    .admin_get("products", access_token, &[("limit", "50")])
                    .await?;
                Ok(array_field(&body, "products"))
            }
            "orders" => {
                let body = self
                    .admin_get(
                        "orders",
                        access_token,
                        &[("status", "any"), ("limit", "50")],
                    )
                    .await?;
                Ok(array_field(&body, "orders"))
            }
            "customers" => {
                let body = self
                    .admin_get("customers", access_token, &[("limit", "50")])
                    .await?;
                Ok(array_field(&body, "customers"))
            }
            "inventory" => self.inventory(access_token).await,
            other => Err(unsupported(Platform::Shopify, other)),
        }
    }
}

/// Check a webhook's `X-Shopify-Hmac-Sha256` header against its raw body.
///
/// The header is the base64 HMAC-SHA256 of the body keyed with the app
/// secret. Comparison is constant-time.
pub fn verify_webhook_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_webhook_signature() {
        let body = br#"{"id":820982911946154508,"email":"jon@doe.ca"}"#;
        let signature = sign(body, "app-secret");

        assert!(verify_webhook_signature(body, &signature, "app-secret"));
        assert!(!verify_webhook_signature(body, &signature, "other-secret"));
        assert!(!verify_webhook_signature(b"tampered", &signature, "app-secret"));
        assert!(!verify_webhook_signature(body, "not base64!", "app-secret"));
    }
}
