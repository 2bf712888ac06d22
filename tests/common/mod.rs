//! Common test utilities and helpers for coursesync tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use coursesync::api::{
    Announcement, Assignment, Course, FileDescriptor, Folder, LmsApi, Module, ModuleItem, Page,
    PageSummary, RemoteFile,
};
use coursesync::{Config, CourseSelection, Settings};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Midnight UTC on the given day
pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn course(id: u64, name: &str, code: Option<&str>) -> Course {
    Course {
        id,
        name: name.to_string(),
        course_code: code.map(str::to_string),
    }
}

pub fn test_config(target: &Path, selection: CourseSelection) -> Config {
    test_config_with(target, selection, &Settings::default())
}

pub fn test_config_with(target: &Path, selection: CourseSelection, settings: &Settings) -> Config {
    Config::new(
        "https://lms.example.edu",
        "test-token",
        target.to_str().expect("Temp path is not UTF-8"),
        selection,
        settings,
    )
    .expect("Failed to build test config")
}

/// Bytes the fake writes for a downloaded URL
pub fn content_for(url: &str) -> String {
    format!("content of {}", url)
}

/// In-memory learning-management API
///
/// Collections are keyed by course id. Operation names listed in `failing`
/// (`"list_files"`, `"download"`, ...) return an error instead; entries in
/// `failing_for` fail a listing for one course only.
#[derive(Default)]
pub struct FakeApi {
    pub courses: Vec<Course>,
    pub folders: HashMap<u64, Vec<Folder>>,
    pub files: HashMap<u64, Vec<RemoteFile>>,
    pub modules: HashMap<u64, Vec<Module>>,
    pub module_items: HashMap<String, Vec<ModuleItem>>,
    pub descriptors: HashMap<String, FileDescriptor>,
    pub assignments: HashMap<u64, Vec<Assignment>>,
    pub pages: HashMap<u64, Vec<Page>>,
    pub announcements: HashMap<u64, Vec<Announcement>>,
    pub failing: HashSet<&'static str>,
    pub failing_for: HashSet<(u64, &'static str)>,
    /// Time each `resolve_file` call spends in flight
    pub resolve_delay: Option<Duration>,
    pub resolves_in_flight: AtomicUsize,
    pub peak_resolves_in_flight: AtomicUsize,
    pub downloads: AtomicUsize,
    pub page_fetches: AtomicUsize,
    pub downloaded_urls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(courses: Vec<Course>) -> Self {
        Self {
            courses,
            ..Default::default()
        }
    }

    pub fn fail(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn fail_for(mut self, course_id: u64, operation: &'static str) -> Self {
        self.failing_for.insert((course_id, operation));
        self
    }

    pub fn with_resolve_delay(mut self, delay: Duration) -> Self {
        self.resolve_delay = Some(delay);
        self
    }

    pub fn peak_resolves(&self) -> usize {
        self.peak_resolves_in_flight.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn page_fetch_count(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.contains(operation) {
            Err(anyhow!("{} failed: 500 Internal Server Error", operation))
        } else {
            Ok(())
        }
    }

    fn listing<T: Clone>(&self, operation: &'static str, map: &HashMap<u64, Vec<T>>, id: u64) -> Result<Vec<T>> {
        self.check(operation)?;
        if self.failing_for.contains(&(id, operation)) {
            return Err(anyhow!("{} failed for course {}: 500 Internal Server Error", operation, id));
        }
        Ok(map.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl LmsApi for FakeApi {
    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.check("list_courses")?;
        Ok(self.courses.clone())
    }

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>> {
        self.listing("list_folders", &self.folders, course_id)
    }

    async fn list_files(&self, course_id: u64) -> Result<Vec<RemoteFile>> {
        self.listing("list_files", &self.files, course_id)
    }

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>> {
        self.listing("list_modules", &self.modules, course_id)
    }

    async fn list_module_items(&self, items_url: &str) -> Result<Vec<ModuleItem>> {
        self.check("list_module_items")?;
        Ok(self.module_items.get(items_url).cloned().unwrap_or_default())
    }

    async fn resolve_file(&self, locator: &str) -> Result<FileDescriptor> {
        self.check("resolve_file")?;

        if let Some(delay) = self.resolve_delay {
            let in_flight = self.resolves_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_resolves_in_flight.fetch_max(in_flight, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.resolves_in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        self.descriptors
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {}", locator))
    }

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>> {
        self.listing("list_assignments", &self.assignments, course_id)
    }

    async fn list_pages(&self, course_id: u64) -> Result<Vec<PageSummary>> {
        let pages = self.listing("list_pages", &self.pages, course_id)?;
        Ok(pages
            .into_iter()
            .map(|p| PageSummary {
                url: p.url,
                title: p.title,
                updated_at: p.updated_at,
            })
            .collect())
    }

    async fn fetch_page(&self, course_id: u64, page_url: &str) -> Result<Page> {
        self.check("fetch_page")?;
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(&course_id)
            .and_then(|pages| pages.iter().find(|p| p.url == page_url))
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: page {}", page_url))
    }

    async fn list_announcements(&self, course_id: u64) -> Result<Vec<Announcement>> {
        self.listing("list_announcements", &self.announcements, course_id)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.check("download")?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.downloaded_urls.lock().unwrap().push(url.to_string());
        tokio::fs::write(dest, content_for(url)).await?;
        Ok(())
    }
}
