use super::entry::{sort_entries, DriveEntry, RawFile};
use super::session::{AccessToken, DriveSession};
use super::DriveError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Drive caps general listings at 100 items per page.
pub const MAX_PAGE_SIZE: u32 = 100;

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, thumbnailLink, webViewLink, webContentLink, size, modifiedTime, iconLink)";

/// Source of folder listings for the navigator.
#[async_trait]
pub trait FolderLister: Send + Sync {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>, DriveError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<RawFile>,
    next_page_token: Option<String>,
}

#[derive(Debug)]
pub struct FilePage {
    pub entries: Vec<DriveEntry>,
    pub next_page_token: Option<String>,
}

pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    revoke_url: String,
    session: Arc<DriveSession>,
    page_size: u32,
    max_pages: usize,
}

impl DriveClient {
    pub fn new(session: Arc<DriveSession>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DRIVE_API_BASE.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            session,
            page_size: MAX_PAGE_SIZE,
            max_pages: 10,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_revoke_url(mut self, revoke_url: impl Into<String>) -> Self {
        self.revoke_url = revoke_url.into();
        self
    }

    pub fn with_paging(mut self, page_size: u32, max_pages: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn session(&self) -> &Arc<DriveSession> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// One page of non-trashed children of `folder_id`.
    pub async fn list_page(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FilePage, DriveError> {
        let token = self.session.access_token().await?;
        let query = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        let page_size = self.page_size.to_string();

        let mut params = vec![
            ("q", query.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", page_size.as_str()),
            ("orderBy", "folder,name"),
        ];
        if let Some(page_token) = page_token {
            params.push(("pageToken", page_token));
        }

        log::debug!("Listing Drive folder {} (page token: {:?})", folder_id, page_token);
        let response = self
            .client
            .get(self.url("files"))
            .bearer_auth(token.secret())
            .query(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            self.reject_token_on_401(status, &token);
            log::warn!("Drive listing of {} failed: HTTP {}", folder_id, status);
            return Err(DriveError::DirectoryFetch {
                status: status.as_u16(),
            });
        }

        let body: FileListResponse = response.json().await?;
        Ok(FilePage {
            entries: body.files.into_iter().map(DriveEntry::from).collect(),
            next_page_token: body.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    /// All children of `folder_id`, folders first then by name.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>, DriveError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = self.list_page(folder_id, page_token.as_deref()).await?;
            entries.extend(page.entries);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            log::warn!(
                "Folder {} has more than {} pages; showing the first {} entries",
                folder_id,
                self.max_pages,
                entries.len()
            );
        }

        sort_entries(&mut entries);
        log::info!("📂 Listed {} entries in folder {}", entries.len(), folder_id);
        Ok(entries)
    }

    /// Raw content of a file.
    pub async fn download(&self, entry: &DriveEntry) -> Result<Vec<u8>, DriveError> {
        let token = self.session.access_token().await?;
        let response = self
            .client
            .get(self.url(&format!("files/{}", entry.id)))
            .bearer_auth(token.secret())
            .query(&[("alt", "media")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            self.reject_token_on_401(status, &token);
            return Err(DriveError::Download {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        log::info!("⬇ Downloaded {} ({} bytes)", entry.name, bytes.len());
        Ok(bytes.to_vec())
    }

    /// Best-effort revocation of a token dropped by sign-out.
    pub async fn revoke(&self, token: &AccessToken) -> Result<(), DriveError> {
        let response = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", token.secret())])
            .send()
            .await?;
        if !response.status().is_success() {
            log::warn!("Token revocation returned HTTP {}", response.status());
        }
        Ok(())
    }

    fn reject_token_on_401(&self, status: reqwest::StatusCode, token: &AccessToken) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session.invalidate(token);
        }
    }
}

#[async_trait]
impl FolderLister for DriveClient {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>, DriveError> {
        DriveClient::list_children(self, folder_id).await
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
