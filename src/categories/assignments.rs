use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{Category, CategoryReport, CourseContext, ASSIGNMENTS_DIR};
use crate::api::LmsApi;
use crate::freshness::{ensure, GateOutcome};
use crate::html::extract_attachment_links;
use crate::paths::{resolve, sanitize_segment};
use crate::retry::Cancelled;

/// Attachments linked from assignment descriptions
///
/// References are resolved and fetched by a bounded pool of
/// `sync.max_parallel` workers; the category returns only after every
/// dispatched unit has finished.
pub struct AssignmentsCategory;

/// One attachment reference waiting for resolution
struct AttachmentJob {
    assignment: String,
    endpoint: String,
    filename: String,
    dest: PathBuf,
}

/// `Ok(None)`: the descriptor could not be downloaded
async fn fetch_attachment(
    api: &dyn LmsApi,
    job: &AttachmentJob,
) -> Result<Option<GateOutcome>> {
    let descriptor = api
        .resolve_file(&job.endpoint)
        .await
        .with_context(|| format!("Failed to resolve {}", job.endpoint))?;

    let Some(target) = descriptor.into_resolved_as(job.filename.clone()) else {
        return Ok(None);
    };

    let outcome = ensure(&job.dest, target.modified_at, || {
        api.download(&target.url, &job.dest)
    })
    .await?;

    Ok(Some(outcome))
}

#[async_trait]
impl Category for AssignmentsCategory {
    fn name(&self) -> &'static str {
        "assignments"
    }

    async fn mirror(
        &self,
        api: &dyn LmsApi,
        ctx: &CourseContext<'_>,
        report: &mut CategoryReport,
    ) -> Result<()> {
        let assignments = api
            .list_assignments(ctx.course.id)
            .await
            .context("Failed to list assignments")?;

        let mut jobs = Vec::new();
        for assignment in &assignments {
            let Some(description) = assignment.description.as_deref() else {
                continue;
            };

            let dir = ctx
                .root
                .join(ASSIGNMENTS_DIR)
                .join(sanitize_segment(&assignment.name));

            for link in extract_attachment_links(description) {
                let dest = resolve(&dir, "", &link.text);
                if !report.claim(&dest) {
                    continue;
                }
                jobs.push(AttachmentJob {
                    assignment: assignment.name.clone(),
                    endpoint: link.endpoint,
                    filename: link.text,
                    dest,
                });
            }
        }

        info!(
            "[{}] {} attachment references in {} assignments",
            ctx.course.name,
            jobs.len(),
            assignments.len()
        );

        let semaphore = &Semaphore::new(ctx.config.sync.max_parallel);
        let cancel = ctx.cancel;

        let mut pending: FuturesUnordered<_> = jobs
            .iter()
            .map(|job| async move {
                let result = async {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| anyhow!("worker pool closed"))?;
                    if cancel.is_cancelled() {
                        return Err(Cancelled.into());
                    }
                    fetch_attachment(api, job).await
                }
                .await;
                (job, result)
            })
            .collect();

        while let Some((job, result)) = pending.next().await {
            match result {
                Ok(Some(outcome)) => report.record(&job.dest, Ok(outcome)),
                Ok(None) => report.skip(
                    &format!("{} / {}", job.assignment, job.filename),
                    "descriptor lacks URL or timestamp",
                ),
                Err(e) => report.fail(&format!("{} / {}", job.assignment, job.filename), &e),
            }
        }

        debug!("[{}] all attachment workers finished", ctx.course.name);
        Ok(())
    }
}
