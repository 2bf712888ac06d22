//! Mirror Engine - Orchestrates per-course, per-category mirroring
//!
//! Courses run strictly one after another, and so do the categories inside
//! a course. A category that cannot enumerate is logged and recorded; it
//! never stops its siblings or the remaining courses.

use crate::api::{Course, LmsApi};
use crate::categories::{default_categories, Category, CategoryReport, CourseContext};
use crate::config::{Config, CourseSelection};
use crate::paths::course_dir_name;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Results for one course
#[derive(Debug, Clone)]
pub struct CourseReport {
    pub course: Course,
    pub categories: Vec<CategoryReport>,
}

impl CourseReport {
    pub fn is_clean(&self) -> bool {
        self.categories.iter().all(CategoryReport::is_clean)
    }
}

/// Results from a complete mirror run
#[derive(Debug, Clone)]
pub struct MirrorSummary {
    pub courses: Vec<CourseReport>,
    pub duration: Duration,
    /// The run stopped early because it was cancelled
    pub cancelled: bool,
}

impl MirrorSummary {
    fn total(&self, count: impl Fn(&CategoryReport) -> usize) -> usize {
        self.courses
            .iter()
            .flat_map(|c| c.categories.iter())
            .map(count)
            .sum()
    }

    pub fn fetched(&self) -> usize {
        self.total(|r| r.fetched)
    }

    pub fn up_to_date(&self) -> usize {
        self.total(|r| r.up_to_date)
    }

    pub fn skipped(&self) -> usize {
        self.total(|r| r.skipped)
    }

    pub fn failed(&self) -> usize {
        self.total(|r| r.failed)
    }

    /// Categories that could not enumerate, across all courses
    pub fn failed_categories(&self) -> usize {
        self.total(|r| usize::from(r.enumeration_error.is_some()))
    }
}

/// The engine that mirrors selected courses into the target directory
pub struct MirrorEngine {
    config: Arc<Config>,
    api: Arc<dyn LmsApi>,
    categories: Vec<Box<dyn Category>>,
    cancel: CancellationToken,
}

impl MirrorEngine {
    /// Create an engine running every category
    pub fn new(config: Arc<Config>, api: Arc<dyn LmsApi>, cancel: CancellationToken) -> Self {
        Self::with_categories(config, api, cancel, default_categories())
    }

    pub fn with_categories(
        config: Arc<Config>,
        api: Arc<dyn LmsApi>,
        cancel: CancellationToken,
        categories: Vec<Box<dyn Category>>,
    ) -> Self {
        Self {
            config,
            api,
            categories,
            cancel,
        }
    }

    /// Run a complete mirror: select courses and mirror each of them
    pub async fn run(&self) -> Result<MirrorSummary> {
        let start_time = Instant::now();

        info!("Starting course mirror into {}", self.config.target_dir.display());

        let courses = self.select_courses().await?;

        info!("Selected {} courses", courses.len());

        let mut reports = Vec::with_capacity(courses.len());
        for course in &courses {
            if self.cancel.is_cancelled() {
                warn!("Mirror cancelled, {} courses not processed", courses.len() - reports.len());
                break;
            }
            reports.push(self.mirror_course(course).await);
        }

        let summary = MirrorSummary {
            courses: reports,
            duration: start_time.elapsed(),
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            "Mirror completed in {:.2}s: {} fetched, {} up to date, {} skipped, {} failed",
            summary.duration.as_secs_f64(),
            summary.fetched(),
            summary.up_to_date(),
            summary.skipped(),
            summary.failed()
        );

        Ok(summary)
    }

    /// List courses and keep the ones the configuration selects
    pub async fn select_courses(&self) -> Result<Vec<Course>> {
        let courses = self
            .api
            .list_courses()
            .await
            .context("Failed to list courses")?;

        let selected: Vec<Course> = courses
            .into_iter()
            .filter(|c| {
                self.config
                    .selection
                    .matches(&c.name, c.course_code.as_deref())
            })
            .collect();

        if let CourseSelection::Named(wanted) = &self.config.selection {
            if selected.is_empty() {
                return Err(anyhow!("No course matches '{}'", wanted));
            }
        }

        Ok(selected)
    }

    /// Mirror every category of one course; never fails as a whole
    pub async fn mirror_course(&self, course: &Course) -> CourseReport {
        let root = self
            .config
            .target_dir
            .join(course_dir_name(&course.name, course.id));

        info!("Mirroring course {} into {}", course.name, root.display());

        let ctx = CourseContext {
            course,
            root,
            config: &self.config,
            cancel: &self.cancel,
        };

        let mut categories = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut report = CategoryReport::new(category.name(), course.name.clone());

            match category.mirror(self.api.as_ref(), &ctx, &mut report).await {
                Ok(()) => info!(
                    "[{}] {}: {} fetched, {} up to date, {} skipped, {} failed",
                    course.name,
                    category.name(),
                    report.fetched,
                    report.up_to_date,
                    report.skipped,
                    report.failed
                ),
                Err(e) => {
                    warn!("[{}] {} skipped: {:#}", course.name, category.name(), e);
                    report.enumeration_error = Some(format!("{:#}", e));
                }
            }

            categories.push(report);
        }

        CourseReport {
            course: course.clone(),
            categories,
        }
    }
}
