//! Remote API abstraction layer
//!
//! The mirror engine only talks to the learning-management system through
//! [`LmsApi`]. Records arrive already decoded; the engine never sees HTTP,
//! pagination or JSON.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::hash::Hash;
use std::path::Path;

/// Shape shared by remote records that map onto local artifacts
pub trait RemoteRecord {
    /// Identity of the local destination (container + name)
    type Key: Eq + Hash;

    fn destination_key(&self) -> Self::Key;

    /// Remote modification time; becomes the artifact's mtime
    fn modified_at(&self) -> DateTime<Utc>;
}

/// A course, the top-level container mirrored as one local subtree
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Course {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub course_code: Option<String>,
}

/// Folder metadata; `full_name` is the slash-separated hierarchy
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Folder {
    pub id: u64,
    pub full_name: String,
}

/// Entry of the flat course file listing
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RemoteFile {
    pub id: u64,
    pub folder_id: u64,
    pub display_name: String,
    /// Download URL; empty or absent for locked files
    pub url: Option<String>,
    pub modified_at: DateTime<Utc>,
}

impl RemoteRecord for RemoteFile {
    type Key = (u64, String);

    fn destination_key(&self) -> Self::Key {
        (self.folder_id, self.display_name.clone())
    }

    fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Module {
    pub id: u64,
    pub name: String,
    pub items_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModuleItem {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// API locator of the underlying object, if it has one
    pub url: Option<String>,
}

/// Result of resolving a locator; any field may be missing
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct FileDescriptor {
    pub url: Option<String>,
    pub display_name: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A descriptor that carries everything needed for a download
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFile {
    pub url: String,
    pub filename: String,
    pub modified_at: DateTime<Utc>,
}

impl FileDescriptor {
    /// `None` unless the descriptor has a download URL, a name and a timestamp
    pub fn into_resolved(mut self) -> Option<ResolvedFile> {
        let filename = self.display_name.take().filter(|n| !n.is_empty())?;
        self.into_resolved_as(filename)
    }

    /// Like [`into_resolved`](Self::into_resolved) with a caller-chosen filename
    pub fn into_resolved_as(self, filename: String) -> Option<ResolvedFile> {
        let url = self.url.filter(|u| !u.is_empty())?;
        let modified_at = self.modified_at.or(self.updated_at)?;

        Some(ResolvedFile {
            url,
            filename,
            modified_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: u64,
    pub name: String,
    /// Rich-text description (HTML)
    pub description: Option<String>,
}

/// Page listing entry; `url` is the page slug, not a download URL
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub body: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Announcement {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    pub message: Option<String>,
    /// Unset for announcements scheduled in the future
    pub posted_at: Option<DateTime<Utc>>,
}

/// Remote learning-management API consumed by the mirror engine
#[async_trait]
pub trait LmsApi: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>>;

    async fn list_folders(&self, course_id: u64) -> Result<Vec<Folder>>;

    async fn list_files(&self, course_id: u64) -> Result<Vec<RemoteFile>>;

    async fn list_modules(&self, course_id: u64) -> Result<Vec<Module>>;

    async fn list_module_items(&self, items_url: &str) -> Result<Vec<ModuleItem>>;

    /// Resolve an API locator into a file descriptor
    async fn resolve_file(&self, locator: &str) -> Result<FileDescriptor>;

    async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>>;

    async fn list_pages(&self, course_id: u64) -> Result<Vec<PageSummary>>;

    async fn fetch_page(&self, course_id: u64, page_url: &str) -> Result<Page>;

    async fn list_announcements(&self, course_id: u64) -> Result<Vec<Announcement>>;

    /// Retrieve the bytes behind `url` into `dest`
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_listing_parsing() {
        let json = r#"[{
            "id": 11,
            "folder_id": 7,
            "display_name": "syllabus.pdf",
            "filename": "syllabus-1.pdf",
            "url": "https://lms.example.edu/files/11/download?download_frd=1",
            "size": 1024,
            "modified_at": "2023-06-01T00:00:00Z"
        }]"#;

        let files: Vec<RemoteFile> = serde_json::from_str(json).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].destination_key(), (7, "syllabus.pdf".to_string()));
        assert_eq!(
            files[0].modified_at.to_rfc3339(),
            "2023-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_descriptor_requires_url_name_and_time() {
        let complete = FileDescriptor {
            url: Some("https://lms.example.edu/files/1/download".to_string()),
            display_name: Some("lab.pdf".to_string()),
            modified_at: None,
            updated_at: Some("2023-03-01T12:00:00Z".parse().unwrap()),
        };
        let resolved = complete.clone().into_resolved().unwrap();
        assert_eq!(resolved.filename, "lab.pdf");

        let no_url = FileDescriptor {
            url: None,
            ..complete.clone()
        };
        assert!(no_url.into_resolved().is_none());

        let empty_name = FileDescriptor {
            display_name: Some(String::new()),
            ..complete.clone()
        };
        assert!(empty_name.into_resolved().is_none());

        let no_time = FileDescriptor {
            updated_at: None,
            ..complete
        };
        assert!(no_time.into_resolved().is_none());
    }

    #[test]
    fn test_page_descriptor_is_not_downloadable() {
        // Resolving a Page item yields page JSON without display_name
        let json = r#"{"url": "week-1-overview", "title": "Week 1", "updated_at": "2023-01-01T00:00:00Z"}"#;
        let descriptor: FileDescriptor = serde_json::from_str(json).unwrap();
        assert!(descriptor.into_resolved().is_none());
    }

    #[test]
    fn test_module_item_parsing() {
        let json = r#"[
            {"id": 1, "title": "Intro", "type": "SubHeader"},
            {"id": 2, "title": "Slides", "type": "File", "url": "https://lms.example.edu/api/v1/courses/4/files/9"}
        ]"#;

        let items: Vec<ModuleItem> = serde_json::from_str(json).unwrap();

        assert!(items[0].url.is_none());
        assert_eq!(items[1].kind.as_deref(), Some("File"));
    }

    #[test]
    fn test_announcement_without_post_date() {
        let json = r#"{"id": 3, "title": "Soon", "message": "<p>hi</p>", "posted_at": null}"#;
        let announcement: Announcement = serde_json::from_str(json).unwrap();
        assert!(announcement.posted_at.is_none());
    }
}
