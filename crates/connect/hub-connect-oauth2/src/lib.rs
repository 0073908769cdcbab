//! OAuth2 connection lifecycle for third-party creator platforms.
//!
//! [`ConnectionService`] drives authorize → callback → token exchange →
//! profile fetch → persist, plus refresh, disconnect and content reads.
//! Each platform's quirks live in an adapter implementing
//! [`OAuthProvider`]; [`resolve_provider`] picks the adapter for a
//! [`Platform`] from the static table and the credentials in
//! [`ConnectConfig`].
//!
//! The `state` sent to the provider is an opaque random token mapped
//! server-side to a [`PendingAuthorization`], which also carries the PKCE
//! verifier across the redirect.

pub mod client;
pub mod config;
pub mod error;
pub mod providers;
pub mod registry;
pub mod service;
pub mod state;
pub mod types;


pub use client::{OAuth2Client, PkceChallenge, build_authorization_url, generate_state};
pub use config::{
    ClientCredentials, ConnectConfig, OAuthConfig, ScopeDelimiter, credential_env_keys,
};
pub use error::{ConnectError, ConnectResult};
pub use providers::{
    CalendlyProvider, GoogleProvider, InstagramProvider, OAuthProvider, Provider,
    ShopifyProvider, TwitterProvider, verify_webhook_signature,
};
pub use registry::{
    PlatformSpec, ProviderEndpoints, normalize_shop, platform_spec, resolve_provider,
};
pub use service::{AttemptPhase, ConnectionService};
pub use state::{
    AuthorizationStateStore, InMemoryAuthorizationStore, MAX_STATE_TTL_SECONDS,
    PendingAuthorization,
};
pub use types::{
    AuthorizationParams, AuthorizationRedirect, CallbackParams, PlatformProfile, TokenResponse,
    TokenSet, TokenTypeHint,
};

pub use hub_connect_core::{
    Connection, ConnectionStore, InMemoryConnectionStore, Platform, StoreError, TokenStatus,
};
