use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::api::{
    Announcement, Assignment, Course, FileDescriptor, Folder, LmsApi, Module, ModuleItem, Page,
    PageSummary, RemoteFile,
};
use crate::config::Config;

/// Items requested per listing page
const PER_PAGE: &str = "100";

/// Upper bound on followed pagination links per listing
const MAX_PAGES: usize = 1000;

/// Canvas REST client with bearer authentication
pub struct CanvasClient {
    http: Client,
    base_url: String,
    token: String,
}

impl CanvasClient {
    /// Create a client from the runtime configuration
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("coursesync/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url).bearer_auth(&self.token)
    }

    /// Fetch a single JSON object
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);

        self.get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Request rejected: {}", url))?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))
    }

    /// Fetch every page of a collection by following `rel="next"` links
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut page = 1;

        while let Some(current) = next.take() {
            debug!("GET {} (page {})", current, page);

            // Follow-up links already carry the query string
            let request = if page == 1 {
                self.get(&current)
                    .query(&[("per_page", PER_PAGE)])
                    .query(query)
            } else {
                self.get(&current)
            };

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to fetch {} page {}", url, page))?
                .error_for_status()
                .with_context(|| format!("Listing rejected: {} page {}", url, page))?;

            next = next_link(response.headers());

            let batch: Vec<T> = response
                .json()
                .await
                .with_context(|| format!("Failed to decode {} page {}", url, page))?;
            items.extend(batch);

            if page >= MAX_PAGES {
                warn!("Reached maximum pagination limit ({} pages) for {}", MAX_PAGES, url);
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

/// Extract the `rel="next"` target from a `Link` header
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|p| {
                let p = p.trim();
                p == r#"rel="next""# || p == "rel=next"
            });
            if is_next {
                target
                    .strip_prefix('<')
                    .and_then(|t| t.strip_suffix('>'))
                    .map(str::to_string)
            } else {
                None
            }
        })
}

/// Sibling path used while a download is in flight
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Owns the `.part` file of one download
///
/// Dropping the guard before [`commit`](Self::commit) removes the partial
/// file, which also covers a download future dropped mid-stream by a
/// timeout or cancellation.
struct PartialDownloadGuard {
    final_path: PathBuf,
    part_path: PathBuf,
    committed: bool,
}

impl PartialDownloadGuard {
    fn new(dest: &Path) -> Self {
        Self {
            final_path: dest.to_path_buf(),
            part_path: partial_path(dest),
            committed: false,
        }
    }

    fn part_path(&self) -> &Path {
        &self.part_path
    }

    async fn commit(mut self) -> Result<()> {
        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to move download into place: {}",
                    self.final_path.display()
                )
            })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialDownloadGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.part_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.part_path.display(), e);
            }
        }
    }
}

#[async_trait]
impl LmsApi for CanvasClient {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.get_paginated(&self.api_url("courses"), &[]).await
    }

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>> {
        self.get_paginated(&self.api_url(&format!("courses/{}/folders", course_id)), &[])
            .await
    }

    async fn list_files(&self, course_id: u64) -> Result<Vec<RemoteFile>> {
        self.get_paginated(&self.api_url(&format!("courses/{}/files", course_id)), &[])
            .await
    }

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>> {
        self.get_paginated(&self.api_url(&format!("courses/{}/modules", course_id)), &[])
            .await
    }

    async fn list_module_items(&self, items_url: &str) -> Result<Vec<ModuleItem>> {
        self.get_paginated(items_url, &[]).await
    }

    async fn resolve_file(&self, locator: &str) -> Result<FileDescriptor> {
        self.get_json(locator).await
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>> {
        self.get_paginated(
            &self.api_url(&format!("courses/{}/assignments", course_id)),
            &[],
        )
        .await
    }

    async fn list_pages(&self, course_id: u64) -> Result<Vec<PageSummary>> {
        self.get_paginated(&self.api_url(&format!("courses/{}/pages", course_id)), &[])
            .await
    }

    async fn fetch_page(&self, course_id: u64, page_url: &str) -> Result<Page> {
        self.get_json(&self.api_url(&format!("courses/{}/pages/{}", course_id, page_url)))
            .await
    }

    async fn list_announcements(&self, course_id: u64) -> Result<Vec<Announcement>> {
        self.get_paginated(
            &self.api_url("announcements"),
            &[("context_codes[]", format!("course_{}", course_id))],
        )
        .await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if url.is_empty() {
            return Err(anyhow!("Empty download URL for {}", dest.display()));
        }

        let mut response = self
            .get(url)
            .send()
            .await
            .with_context(|| format!("Download request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Download rejected: {}", url))?;

        let guard = PartialDownloadGuard::new(dest);
        let part = guard.part_path();
        let mut file = tokio::fs::File::create(part)
            .await
            .with_context(|| format!("Failed to create {}", part.display()))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Download interrupted: {}", url))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", part.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", part.display()))?;
        drop(file);

        guard.commit().await
    }
}
