//! HTTP surface for the platform connection service.
//!
//! [`router`] maps the authorize/callback redirects and the JSON
//! connection endpoints onto a [`ConnectionService`]; [`settings`] loads the
//! server configuration the binary starts from.

pub mod routes;
pub mod settings;

pub use routes::{AppState, router};
pub use settings::Settings;

pub use hub_connect_oauth2::ConnectionService;
