//! Timeout, retry and cancellation around every remote call
//!
//! [`ResilientApi`] decorates any [`LmsApi`] so the mirror engine gets the
//! same resilience policy for listings, locator resolution and downloads
//! without knowing about it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::api::{
    Announcement, Assignment, Course, FileDescriptor, Folder, LmsApi, Module, ModuleItem, Page,
    PageSummary, RemoteFile,
};
use crate::config::{Config, RetryConfig};
use crate::retry::with_retry;

pub struct ResilientApi<A> {
    inner: A,
    retry: RetryConfig,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<A: LmsApi> ResilientApi<A> {
    pub fn new(inner: A, config: &Config, cancel: CancellationToken) -> Self {
        Self::with_policy(inner, config.retry.clone(), config.request_timeout(), cancel)
    }

    pub fn with_policy(
        inner: A,
        retry: RetryConfig,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            retry,
            timeout,
            cancel,
        }
    }

    async fn call<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.timeout;

        with_retry(&self.retry, &self.cancel, what, || {
            let attempt = op();
            async move {
                tokio::time::timeout(timeout, attempt)
                    .await
                    .with_context(|| format!("timed out after {:?}", timeout))?
            }
        })
        .await
        .with_context(|| format!("Failed to {}", what))
    }
}

#[async_trait]
impl<A: LmsApi> LmsApi for ResilientApi<A> {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.call("list courses", || self.inner.list_courses()).await
    }

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>> {
        self.call("list folders", || self.inner.list_folders(course_id))
            .await
    }

    async fn list_files(&self, course_id: u64) -> Result<Vec<RemoteFile>> {
        self.call("list files", || self.inner.list_files(course_id))
            .await
    }

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>> {
        self.call("list modules", || self.inner.list_modules(course_id))
            .await
    }

    async fn list_module_items(&self, items_url: &str) -> Result<Vec<ModuleItem>> {
        self.call("list module items", || self.inner.list_module_items(items_url))
            .await
    }

    async fn resolve_file(&self, locator: &str) -> Result<FileDescriptor> {
        self.call("resolve locator", || self.inner.resolve_file(locator))
            .await
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>> {
        self.call("list assignments", || self.inner.list_assignments(course_id))
            .await
    }

    async fn list_pages(&self, course_id: u64) -> Result<Vec<PageSummary>> {
        self.call("list pages", || self.inner.list_pages(course_id))
            .await
    }

    async fn fetch_page(&self, course_id: u64, page_url: &str) -> Result<Page> {
        self.call("fetch page", || self.inner.fetch_page(course_id, page_url))
            .await
    }

    async fn list_announcements(&self, course_id: u64) -> Result<Vec<Announcement>> {
        self.call("list announcements", || {
            self.inner.list_announcements(course_id)
        })
        .await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.call("download", || self.inner.download(url, dest)).await
    }
}
