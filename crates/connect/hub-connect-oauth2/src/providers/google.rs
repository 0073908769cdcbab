use super::{OAuthProvider, array_field, missing_field, unsupported};
use crate::client::{OAuth2Client, send_json};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use crate::types::{PlatformProfile, id_string, str_field};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hub_connect_core::Platform;
use serde_json::json;

const YOUTUBE_CONTENT: &[&str] = &["videos", "channel", "playlists"];
const CALENDAR_CONTENT: &[&str] = &["events", "calendars"];

/// Google OAuth, shared by YouTube and Google Calendar.
///
/// Both platforms use the same client credentials and token endpoint and
/// differ only in scopes and the APIs their content is read from.
pub struct GoogleProvider {
    platform: Platform,
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
    client: OAuth2Client,
}

impl GoogleProvider {
    pub fn new(
        platform: Platform,
        config: OAuthConfig,
        endpoints: ProviderEndpoints,
        client: OAuth2Client,
    ) -> Self {
        Self {
            platform,
            config,
            endpoints,
            client,
        }
    }

    async fn api_get(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> ConnectResult<serde_json::Value> {
        let url = format!("{}/{}", self.endpoints.api_base.trim_end_matches('/'), path);
        let request = self
            .client
            .http()
            .get(url)
            .bearer_auth(access_token)
            .query(query);
        send_json(request, ConnectError::ContentFetch).await
    }

    async fn youtube_videos(&self, access_token: &str) -> ConnectResult<serde_json::Value> {
        let channels = self
            .api_get(
                "youtube/v3/channels",
                access_token,
                &[("part", "contentDetails"), ("mine", "true")],
            )
            .await?;
        let Some(uploads) = channels
            .pointer("/items/0/contentDetails/relatedPlaylists/uploads")
            .and_then(|v| v.as_str())
        else {
            return Ok(json!([]));
        };

        let playlist = self
            .api_get(
                "youtube/v3/playlistItems",
                access_token,
                &[
                    ("part", "snippet,contentDetails"),
                    ("playlistId", uploads),
                    ("maxResults", "25"),
                ],
            )
            .await?;
        let items = array_field(&playlist, "items");
        let items = items.as_array().map(Vec::as_slice).unwrap_or_default();

        let ids: Vec<&str> = items
            .iter()
            .filter_map(|item| item.pointer("/contentDetails/videoId")?.as_str())
            .collect();
        if ids.is_empty() {
            return Ok(json!([]));
        }
        let joined = ids.join(",");
        let stats = self
            .api_get(
                "youtube/v3/videos",
                access_token,
                &[("part", "statistics,contentDetails"), ("id", joined.as_str())],
            )
            .await?;
        let stats = array_field(&stats, "items");
        let stats = stats.as_array().map(Vec::as_slice).unwrap_or_default();

        let videos = items
            .iter()
            .filter_map(|item| {
                let id = item.pointer("/contentDetails/videoId")?.as_str()?;
                let detail = stats
                    .iter()
                    .find(|s| s.get("id").and_then(|v| v.as_str()) == Some(id));
                Some(json!({
                    "id": id,
                    "title": item.pointer("/snippet/title"),
                    "description": item.pointer("/snippet/description"),
                    "published_at": item.pointer("/snippet/publishedAt"),
                    "thumbnail_url": item
                        .pointer("/snippet/thumbnails/high/url")
                        .or_else(|| item.pointer("/snippet/thumbnails/default/url")),
                    "statistics": detail.and_then(|d| d.get("statistics")),
                    "duration": detail.and_then(|d| d.pointer("/contentDetails/duration")),
                }))
            })
            .collect();
        Ok(serde_json::Value::Array(videos))
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn client(&self) -> &OAuth2Client {
        &self.client
    }

    fn content_types(&self) -> &'static [&'static str] {
        match self.platform {
            Platform::GoogleCalendar => CALENDAR_CONTENT,
            _ => YOUTUBE_CONTENT,
        }
    }

    async fn user_profile(&self, access_token: &str) -> ConnectResult<PlatformProfile> {
        let url = format!(
            "{}/oauth2/v3/userinfo",
            self.endpoints.api_base.trim_end_matches('/')
        );
        let request = self.client.http().get(url).bearer_auth(access_token);
        let body = send_json(request, ConnectError::ProfileFetch).await?;

        let id = body
            .get("sub")
            .or_else(|| body.get("id"))
            .and_then(id_string)
            .ok_or_else(missing_field("a subject id"))?;
        let mut metadata = serde_json::Map::new();
        if let Some(picture) = body.get("picture") {
            metadata.insert("picture".to_string(), picture.clone());
        }

        Ok(PlatformProfile {
            id,
            username: None,
            email: str_field(&body, "email"),
            display_name: str_field(&body, "name"),
            metadata,
        })
    }

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        match (self.platform, content_type) {
            (Platform::Youtube, "videos") => self.youtube_videos(access_token).await,
            (Platform::Youtube, "channel") => {
                let body = self
                    .api_get(
                        "youtube/v3/channels",
                        access_token,
                        &[("part", "snippet,statistics"), ("mine", "true")],
                    )
                    .await?;
                Ok(body
                    .pointer("/items/0")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null))
            }
            (Platform::Youtube, "playlists") => {
                let body = self
                    .api_get(
                        "youtube/v3/playlists",
                        access_token,
                        &[
                            ("part", "snippet,contentDetails"),
                            ("mine", "true"),
                            ("maxResults", "25"),
                        ],
                    )
                    .await?;
                Ok(array_field(&body, "items"))
            }
            (Platform::GoogleCalendar, "events") => {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                let body = self
                    .api_get(
                        "calendar/v3/calendars/primary/events",
                        access_token,
                        &[
                            ("timeMin", now.as_str()),
                            ("maxResults", "25"),
                            ("singleEvents", "true"),
                            ("orderBy", "startTime"),
                        ],
                    )
                    .await?;
                Ok(array_field(&body, "items"))
            }
            (Platform::GoogleCalendar, "calendars") => {
                let body = self
                    .api_get("calendar/v3/users/me/calendarList", access_token, &[])
                    .await?;
                Ok(array_field(&body, "items"))
            }
            (platform, other) => Err(unsupported(platform, other)),
        }
    }
}
