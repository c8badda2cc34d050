//! Dropbox implementation of [`ObjectStore`]
//!
//! RPC calls go to `api_url` with JSON bodies, uploads go to `content_url`
//! with the request arguments in the `Dropbox-API-Arg` header. Dropbox
//! reports most endpoint-specific failures as HTTP 409 with an
//! `error_summary` such as `path/conflict/folder/..`; those are translated
//! into [`FolderCreation::AlreadyExists`], [`LinkCreation::AlreadyExists`],
//! [`PathStatus::NotFound`] or [`StoreError::Conflict`] per endpoint.

use super::{FolderCreation, FolderEntry, FolderPage, LinkCreation, ObjectStore, PathStatus};
use crate::config::{DropboxConfig, SecretString};
use crate::domain::{Result, RouteError, StoreError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Refresh the access token this long before Dropbox says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Result of a Dropbox call that did not fail at the transport or status level
enum Reply {
    Done(Value),
    Conflict(String),
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

enum DropboxAuth {
    Static(SecretString),
    Refresh {
        refresh_token: SecretString,
        app_key: String,
        app_secret: SecretString,
        cached: RwLock<Option<CachedToken>>,
    },
}

/// Dropbox object store
///
/// # Example
///
/// ```no_run
/// use scanroute::adapters::store::{DropboxStore, ObjectStore};
/// use scanroute::config::{secret_string, DropboxConfig};
///
/// # async fn example() -> scanroute::domain::Result<()> {
/// let config = DropboxConfig {
///     access_token: Some(secret_string("sl.token".to_string())),
///     ..DropboxConfig::default()
/// };
/// let store = DropboxStore::new(&config)?;
/// store.create_folder("/Store/orders/a@b.com").await?;
/// # Ok(())
/// # }
/// ```
pub struct DropboxStore {
    client: Client,
    api_url: String,
    content_url: String,
    auth: DropboxAuth,
}

impl DropboxStore {
    /// Create a new Dropbox store from configuration
    ///
    /// Refresh-token credentials take precedence over a static access token.
    pub fn new(config: &DropboxConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        let auth = match (&config.refresh_token, &config.app_key, &config.app_secret) {
            (Some(refresh_token), Some(app_key), Some(app_secret)) => DropboxAuth::Refresh {
                refresh_token: refresh_token.clone(),
                app_key: app_key.clone(),
                app_secret: app_secret.clone(),
                cached: RwLock::new(None),
            },
            _ => match &config.access_token {
                Some(token) => DropboxAuth::Static(token.clone()),
                None => {
                    return Err(RouteError::Configuration(
                        "Dropbox credentials are not configured".to_string(),
                    ))
                }
            },
        };

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            content_url: config.content_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Current bearer token, refreshing it when it is about to expire
    async fn bearer(&self) -> Result<String> {
        match &self.auth {
            DropboxAuth::Static(token) => Ok(token.expose_secret().as_str().to_string()),
            DropboxAuth::Refresh {
                refresh_token,
                app_key,
                app_secret,
                cached,
            } => {
                if let Some(token) = cached.read().await.as_ref() {
                    if token.expires_at > Instant::now() {
                        return Ok(token.value.clone());
                    }
                }

                let mut slot = cached.write().await;
                // Another task may have refreshed while we waited for the lock
                if let Some(token) = slot.as_ref() {
                    if token.expires_at > Instant::now() {
                        return Ok(token.value.clone());
                    }
                }

                let fresh = self
                    .refresh_access_token(refresh_token, app_key, app_secret)
                    .await?;
                let value = fresh.value.clone();
                *slot = Some(fresh);
                Ok(value)
            }
        }
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
        app_key: &str,
        app_secret: &SecretString,
    ) -> Result<CachedToken> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: Option<u64>,
        }

        tracing::debug!("Refreshing Dropbox access token");

        let url = format!("{}/oauth2/token", self.api_url);
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("client_id", app_key),
            ("client_secret", app_secret.expose_secret().as_str()),
        ];

        let resp = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(StoreError::ServerError {
                    status: status.as_u16(),
                    message: body,
                }
                .into());
            }
            return Err(StoreError::AuthenticationFailed(format!(
                "Token refresh failed with status {status}: {body}"
            ))
            .into());
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(14_400));
        let expires_at = Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);

        Ok(CachedToken {
            value: token.access_token,
            expires_at,
        })
    }

    async fn invalidate_token(&self) {
        if let DropboxAuth::Refresh { cached, .. } = &self.auth {
            *cached.write().await = None;
        }
    }

    /// POST a JSON body to an RPC endpoint
    async fn rpc(&self, endpoint: &str, body: Value) -> Result<Reply> {
        let url = format!("{}/2/{}", self.api_url, endpoint);
        let token = self.bearer().await?;

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        self.read_reply(endpoint, resp).await
    }

    /// POST raw bytes to a content endpoint with arguments in the header
    async fn content(&self, endpoint: &str, arg: Value, data: Vec<u8>) -> Result<Reply> {
        let url = format!("{}/2/{}", self.content_url, endpoint);
        let token = self.bearer().await?;

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Dropbox-API-Arg", api_arg_header(&arg))
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(transport_error)?;

        self.read_reply(endpoint, resp).await
    }

    async fn read_reply(&self, endpoint: &str, resp: Response) -> Result<Reply> {
        let status = resp.status();
        let retry_after = retry_after(resp.headers());
        let text = resp.text().await.map_err(transport_error)?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Reply::Done(Value::Null));
            }
            let value = serde_json::from_str(&text)
                .map_err(|e| StoreError::InvalidResponse(format!("{endpoint}: {e}")))?;
            return Ok(Reply::Done(value));
        }

        if status == StatusCode::CONFLICT {
            let summary = error_summary(&text);
            if summary.contains("too_many_write_operations") {
                return Err(StoreError::RateLimited {
                    retry_after,
                    message: summary,
                }
                .into());
            }
            return Ok(Reply::Conflict(summary));
        }

        if status == StatusCode::UNAUTHORIZED {
            if matches!(self.auth, DropboxAuth::Refresh { .. }) && text.contains("expired") {
                self.invalidate_token().await;
                return Err(StoreError::TokenExpired.into());
            }
            return Err(StoreError::AuthenticationFailed(error_summary(&text)).into());
        }

        Err(status_error(status, retry_after, &text).into())
    }
}

#[async_trait]
impl ObjectStore for DropboxStore {
    async fn create_folder(&self, path: &str) -> Result<FolderCreation> {
        let reply = self
            .rpc(
                "files/create_folder_v2",
                json!({ "path": path, "autorename": false }),
            )
            .await?;

        match reply {
            Reply::Done(_) => {
                tracing::debug!(path = %path, "Created folder");
                Ok(FolderCreation::Created)
            }
            Reply::Conflict(summary) if summary.starts_with("path/conflict") => {
                Ok(FolderCreation::AlreadyExists)
            }
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn list_folder(&self, path: &str) -> Result<FolderPage> {
        let reply = self
            .rpc(
                "files/list_folder",
                json!({ "path": path, "recursive": false }),
            )
            .await?;
        into_page(path, reply)
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage> {
        let reply = self
            .rpc("files/list_folder/continue", json!({ "cursor": cursor }))
            .await?;
        into_page("cursor", reply)
    }

    async fn upload(&self, data: Vec<u8>, path: &str, overwrite: bool) -> Result<()> {
        let arg = json!({
            "path": path,
            "mode": write_mode(overwrite),
            "autorename": false,
            "mute": true,
        });
        match self.content("files/upload", arg, data).await? {
            Reply::Done(_) => Ok(()),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn start_upload_session(&self, first_chunk: Vec<u8>) -> Result<String> {
        let reply = self
            .content(
                "files/upload_session/start",
                json!({ "close": false }),
                first_chunk,
            )
            .await?;

        match reply {
            Reply::Done(value) => value
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::InvalidResponse("upload session start without session_id".into())
                        .into()
                }),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn append_to_session(
        &self,
        session_id: &str,
        chunk: Vec<u8>,
        offset: u64,
    ) -> Result<()> {
        let arg = json!({
            "cursor": { "session_id": session_id, "offset": offset },
            "close": false,
        });
        match self
            .content("files/upload_session/append_v2", arg, chunk)
            .await?
        {
            Reply::Done(_) => Ok(()),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn finish_session(
        &self,
        session_id: &str,
        last_chunk: Vec<u8>,
        offset: u64,
        path: &str,
        overwrite: bool,
    ) -> Result<()> {
        let arg = json!({
            "cursor": { "session_id": session_id, "offset": offset },
            "commit": {
                "path": path,
                "mode": write_mode(overwrite),
                "autorename": false,
                "mute": true,
            },
        });
        match self
            .content("files/upload_session/finish", arg, last_chunk)
            .await?
        {
            Reply::Done(_) => Ok(()),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn create_shared_link(&self, path: &str) -> Result<LinkCreation> {
        let reply = self
            .rpc(
                "sharing/create_shared_link_with_settings",
                json!({ "path": path }),
            )
            .await?;

        match reply {
            Reply::Done(value) => value
                .get("url")
                .and_then(Value::as_str)
                .map(|url| LinkCreation::Created(url.to_string()))
                .ok_or_else(|| StoreError::InvalidResponse("shared link without url".into()).into()),
            Reply::Conflict(summary) if summary.contains("shared_link_already_exists") => {
                Ok(LinkCreation::AlreadyExists)
            }
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn list_shared_links(&self, path: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Links {
            links: Vec<Link>,
        }
        #[derive(Deserialize)]
        struct Link {
            url: String,
        }

        let reply = self
            .rpc(
                "sharing/list_shared_links",
                json!({ "path": path, "direct_only": true }),
            )
            .await?;

        match reply {
            Reply::Done(value) => {
                let links: Links = serde_json::from_value(value)
                    .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
                Ok(links.links.into_iter().map(|l| l.url).collect())
            }
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn resolve_shared_link(&self, url: &str) -> Result<Option<String>> {
        let reply = self
            .rpc("sharing/get_shared_link_metadata", json!({ "url": url }))
            .await?;

        match reply {
            Reply::Done(value) => Ok(value
                .get("path_lower")
                .and_then(Value::as_str)
                .map(str::to_string)),
            Reply::Conflict(summary) => {
                tracing::debug!(url = %url, summary = %summary, "Shared link no longer resolves");
                Ok(None)
            }
        }
    }

    async fn get_metadata(&self, path: &str) -> Result<PathStatus> {
        let reply = self
            .rpc("files/get_metadata", json!({ "path": path }))
            .await?;

        match reply {
            Reply::Done(value) => match value.get(".tag").and_then(Value::as_str) {
                Some("folder") => Ok(PathStatus::Folder),
                Some("file") => Ok(PathStatus::File {
                    size: value.get("size").and_then(Value::as_u64).unwrap_or(0),
                }),
                _ => Ok(PathStatus::NotFound),
            },
            Reply::Conflict(summary) if summary.contains("not_found") => Ok(PathStatus::NotFound),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        let reply = self
            .rpc(
                "files/move_v2",
                json!({ "from_path": from, "to_path": to, "autorename": false }),
            )
            .await?;

        match reply {
            Reply::Done(_) => Ok(()),
            Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
        }
    }
}

fn into_page(path: &str, reply: Reply) -> Result<FolderPage> {
    #[derive(Deserialize)]
    struct ListFolder {
        entries: Vec<Entry>,
        cursor: Option<String>,
        #[serde(default)]
        has_more: bool,
    }
    #[derive(Deserialize)]
    struct Entry {
        #[serde(rename = ".tag")]
        tag: String,
        name: String,
        path_display: Option<String>,
        path_lower: Option<String>,
    }

    match reply {
        Reply::Done(value) => {
            let listing: ListFolder = serde_json::from_value(value)
                .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;
            let entries = listing
                .entries
                .into_iter()
                .map(|e| FolderEntry {
                    path: e.path_display.or(e.path_lower).unwrap_or_default(),
                    is_folder: e.tag == "folder",
                    name: e.name,
                })
                .collect();
            Ok(FolderPage {
                entries,
                cursor: listing.cursor,
                has_more: listing.has_more,
            })
        }
        Reply::Conflict(summary) if summary.contains("not_found") => {
            Err(StoreError::NotFound(path.to_string()).into())
        }
        Reply::Conflict(summary) => Err(StoreError::Conflict(summary).into()),
    }
}

fn write_mode(overwrite: bool) -> &'static str {
    if overwrite {
        "overwrite"
    } else {
        "add"
    }
}

/// `Dropbox-API-Arg` must be ASCII; everything else is sent as `\uXXXX`
fn api_arg_header(arg: &Value) -> String {
    let raw = arg.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

fn error_summary(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error_summary").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> StoreError {
    let message = error_summary(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::RateLimited {
            retry_after,
            message,
        }
    } else if status.is_server_error() {
        StoreError::ServerError {
            status: status.as_u16(),
            message,
        }
    } else if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(message)
    } else {
        StoreError::ClientError {
            status: status.as_u16(),
            message,
        }
    }
}

fn transport_error(e: reqwest::Error) -> RouteError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string()).into()
    } else {
        StoreError::ConnectionFailed(e.to_string()).into()
    }
}
