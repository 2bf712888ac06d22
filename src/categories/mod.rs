//! Category downloaders
//!
//! Each category enumerates one kind of remote content for a course,
//! resolves local destinations and drives every item through the
//! freshness gate. An `Err` from [`Category::mirror`] means the category
//! could not enumerate and contributed nothing; per-item failures are
//! recorded in the [`CategoryReport`] and never abort the loop.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{Course, LmsApi};
use crate::config::Config;
use crate::freshness::GateOutcome;

pub mod announcements;
pub mod assignments;
pub mod files;
pub mod modules;
pub mod pages;

pub use announcements::AnnouncementsCategory;
pub use assignments::AssignmentsCategory;
pub use files::FilesCategory;
pub use modules::ModulesCategory;
pub use pages::PagesCategory;

/// Subdirectory of the course root used by the modules category
pub const MODULES_DIR: &str = "modules";
/// Subdirectory of the course root used by the assignments category
pub const ASSIGNMENTS_DIR: &str = "assignments";
/// Subdirectory of the course root used by the pages category
pub const PAGES_DIR: &str = "pages";
/// Subdirectory of the course root used by the announcements category
pub const ANNOUNCEMENTS_DIR: &str = "announcements";
/// Extension for textual content written from response bodies
pub const MARKUP_EXTENSION: &str = "html";

/// Everything a category needs to mirror one course
pub struct CourseContext<'a> {
    pub course: &'a Course,
    /// Local root of this course's subtree
    pub root: PathBuf,
    pub config: &'a Config,
    pub cancel: &'a CancellationToken,
}

impl CourseContext<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One kind of remote content
#[async_trait]
pub trait Category: Send + Sync {
    /// Category name for logs and summaries
    fn name(&self) -> &'static str;

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()>;
}

/// The five categories in the order they run for every course
pub fn default_categories() -> Vec<Box<dyn Category>> {
    vec![
        Box::new(FilesCategory),
        Box::new(ModulesCategory),
        Box::new(AssignmentsCategory),
        Box::new(PagesCategory),
        Box::new(AnnouncementsCategory),
    ]
}

/// Outcome counters for one category of one course
#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub category: &'static str,
    pub course: String,
    pub fetched: usize,
    pub up_to_date: usize,
    /// Items without enough information to download
    pub skipped: usize,
    pub failed: usize,
    /// One line per failed item
    pub errors: Vec<String>,
    /// Set when the category could not enumerate its collection
    pub enumeration_error: Option<String>,
    claimed: HashSet<PathBuf>,
}

impl CategoryReport {
    pub fn new(category: &'static str, course: impl Into<String>) -> Self {
        Self {
            category,
            course: course.into(),
            ..Default::default()
        }
    }

    /// Reserve `dest` for this run; false when another item already holds it
    pub fn claim(&mut self, dest: &Path) -> bool {
        if self.claimed.insert(dest.to_path_buf()) {
            true
        } else {
            debug!(
                "[{}] {} already claimed by another item, skipping",
                self.category,
                dest.display()
            );
            self.skipped += 1;
            false
        }
    }

    /// Count the result of one gate invocation
    pub fn record(&mut self, dest: &Path, result: Result<GateOutcome>) {
        match result {
            Ok(GateOutcome::Fetched) => self.fetched += 1,
            Ok(GateOutcome::UpToDate) => self.up_to_date += 1,
            Err(e) => self.fail(&dest.display().to_string(), &e),
        }
    }

    /// Count an item that lacks what it needs to be mirrored
    pub fn skip(&mut self, what: &str, reason: &str) {
        debug!("[{}] {}: skipping {} ({})", self.course, self.category, what, reason);
        self.skipped += 1;
    }

    /// Count and log a failed item
    pub fn fail(&mut self, what: &str, err: &anyhow::Error) {
        warn!(
            "[{}] {}: failed {}: {:#}",
            self.course, self.category, what, err
        );
        self.failed += 1;
        self.errors.push(format!("{}: {:#}", what, err));
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.enumeration_error.is_none()
    }
}
