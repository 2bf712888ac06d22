use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use super::{Category, CategoryReport, CourseContext};
use crate::api::LmsApi;
use crate::dedup::dedupe;
use crate::freshness::ensure;
use crate::paths::resolve;

/// Course files, laid out by their folder hierarchy
pub struct FilesCategory;

#[async_trait]
impl Category for FilesCategory {
    fn name(&self) -> &'static str {
        "files"
    }

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let course_id = ctx.course.id;

        let folders: HashMap<u64, String> = api
            .list_folders(course_id)
            .await
            .context("Failed to list folders")?
            .into_iter()
            .map(|folder| (folder.id, folder.full_name))
            .collect();

        let listed = api
            .list_files(course_id)
            .await
            .context("Failed to list files")?;
        let files = dedupe(listed);

        info!(
            "[{}] {} files across {} folders",
            ctx.course.name,
            files.len(),
            folders.len()
        );

        for file in files {
            if ctx.is_cancelled() {
                break;
            }

            let Some(hierarchy) = folders.get(&file.folder_id) else {
                report.skip(&file.display_name, "folder not in folder listing");
                continue;
            };

            let Some(url) = file.url.as_deref().filter(|u| !u.is_empty()) else {
                report.skip(&file.display_name, "no download URL (locked?)");
                continue;
            };

            let dest = resolve(&ctx.root, hierarchy, &file.display_name);
            if !report.claim(&dest) {
                continue;
            }

            let result = ensure(&dest, file.modified_at, || api.download(url, &dest)).await;
            report.record(&dest, result);
        }

        Ok(())
    }
}
