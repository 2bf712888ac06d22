use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{Category, CategoryReport, CourseContext, MARKUP_EXTENSION, PAGES_DIR};
use crate::api::LmsApi;
use crate::freshness::{ensure, write_body};
use crate::paths::resolve;

/// Wiki pages, written from the page body as markup
///
/// The full page is only requested when the local copy is stale.
pub struct PagesCategory;

#[async_trait]
impl Category for PagesCategory {
    fn name(&self) -> &'static str {
        "pages"
    }

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let course_id = ctx.course.id;
        let pages = api
            .list_pages(course_id)
            .await
            .context("Failed to list pages")?;

        let dir = ctx.root.join(PAGES_DIR);

        for summary in pages {
            if ctx.is_cancelled() {
                break;
            }

            let filename = format!("{}.{}", summary.title, MARKUP_EXTENSION);
            let dest = resolve(&dir, "", &filename);
            if !report.claim(&dest) {
                continue;
            }

            let page_url = summary.url.as_str();
            let target = dest.as_path();
            let result = ensure(target, summary.updated_at, || async move {
                let page = api
                    .fetch_page(course_id, page_url)
                    .await
                    .with_context(|| format!("Failed to fetch page {}", page_url))?;
                write_body(target, page.body.as_deref().unwrap_or_default()).await
            })
            .await;
            report.record(&dest, result);
        }

        Ok(())
    }
}
