use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{Category, CategoryReport, CourseContext, MODULES_DIR};
use crate::api::LmsApi;
use crate::freshness::ensure;
use crate::paths::{resolve, sanitize_segment};

/// Module items that resolve to downloadable files
pub struct ModulesCategory;

#[async_trait]
impl Category for ModulesCategory {
    fn name(&self) -> &'static str {
        "modules"
    }

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let modules = api
            .list_modules(ctx.course.id)
            .await
            .context("Failed to list modules")?;

        for module in modules {
            if ctx.is_cancelled() {
                break;
            }

            let Some(items_url) = module.items_url.as_deref() else {
                debug!("Module {} has no items listing", module.name);
                continue;
            };

            let items = match api.list_module_items(items_url).await {
                Ok(items) => items,
                Err(e) => {
                    report.fail(&format!("items of module {}", module.name), &e);
                    continue;
                }
            };

            let dir = ctx
                .root
                .join(MODULES_DIR)
                .join(sanitize_segment(&module.name));

            for item in items {
                if ctx.is_cancelled() {
                    break;
                }

                // Headers, external links and the like carry no locator
                let Some(locator) = item.url.as_deref() else {
                    continue;
                };

                let descriptor = match api.resolve_file(locator).await {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        report.fail(&format!("module item {}", item.title), &e);
                        continue;
                    }
                };

                let Some(target) = descriptor.into_resolved() else {
                    report.skip(&item.title, "descriptor lacks URL, name or timestamp");
                    continue;
                };

                let dest = resolve(&dir, "", &target.filename);
                if !report.claim(&dest) {
                    continue;
                }

                let result = ensure(&dest, target.modified_at, || {
                    api.download(&target.url, &dest)
                })
                .await;
                report.record(&dest, result);
            }
        }

        Ok(())
    }
}
