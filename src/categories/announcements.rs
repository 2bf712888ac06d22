use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Category, CategoryReport, CourseContext, ANNOUNCEMENTS_DIR, MARKUP_EXTENSION};
use crate::api::LmsApi;
use crate::freshness::{ensure, write_body};
use crate::paths::resolve;

/// Course announcements, one markup file per message
///
/// Filenames combine title and id so identically titled announcements
/// never share a destination.
pub struct AnnouncementsCategory;

#[async_trait]
impl Category for AnnouncementsCategory {
    fn name(&self) -> &'static str {
        "announcements"
    }

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let announcements = api
            .list_announcements(ctx.course.id)
            .await
            .context("Failed to list announcements")?;

        let dir = ctx.root.join(ANNOUNCEMENTS_DIR);

        for announcement in announcements {
            if ctx.is_cancelled() {
                break;
            }

            let Some(posted_at) = announcement.posted_at else {
                report.skip(&announcement.title, "not posted yet");
                continue;
            };

            let filename = format!(
                "{}_{}.{}",
                announcement.title, announcement.id, MARKUP_EXTENSION
            );
            let dest = resolve(&dir, "", &filename);
            if !report.claim(&dest) {
                continue;
            }

            let body = announcement.message.as_deref().unwrap_or_default();
            let result = ensure(&dest, posted_at, || write_body(&dest, body)).await;
            report.record(&dest, result);
        }

        Ok(())
    }
}
