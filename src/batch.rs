//! Batch execution: iterate a generated batch plan, drive the orchestrator per
//! item, publish accepted drafts, and record everything into the shared job
//! state.
//!
//! Items are processed strictly sequentially. Section generation is
//! context-dependent and the overlap accumulator must be updated before the
//! next item starts, so there is nothing to parallelize here.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::model::{
    ArticleBrief, ArticleDraft, ArticlePlan, BatchBrief, BatchPlanItem, JobResultItem, JobState,
    JobStatus, QcReport,
};
use crate::orchestrator::DraftOrchestrator;
use crate::ports::{JobStorePort, PlanContext};
use crate::publisher::DraftPublisher;
use crate::qc::run_qc;

fn batch_item_to_brief(item: &BatchPlanItem, batch_brief: &BatchBrief) -> ArticleBrief {
    ArticleBrief {
        topic: batch_brief.topic.clone(),
        target_site: batch_brief.target_site.clone(),
        seed_title: Some(item.title.clone()),
        audience: Some(item.target_audience.clone()),
        purpose: Some(item.search_intent.clone()),
        constraints: Some(serde_json::json!({
            "angle": item.angle,
            "differentiator": item.differentiator,
            "avoid_overlap_with": item.avoid_overlap_with,
        })),
    }
}

/// Plan, draft, soft-revise (bounded) and enrich one batch item. A hard QC
/// failure is not an error here; it comes back in the report and the caller
/// records it. Errors are LLM/parse failures.
async fn drive_item(
    orchestrator: &DraftOrchestrator,
    brief: &ArticleBrief,
    ctx: &PlanContext,
) -> Result<(ArticlePlan, ArticleDraft, QcReport)> {
    let plan = orchestrator.plan_article(brief, ctx).await?;
    let (mut draft, mut report) = orchestrator.draft_article(&plan).await?;

    if !report.hard_failed {
        for _ in 0..orchestrator.soft_qc_retries() {
            if !report.soft_failed {
                break;
            }
            let advice = orchestrator.soft_qc(&draft).await;
            if advice.fix_targets.is_empty() {
                break;
            }
            let instructions: Vec<String> = advice
                .fix_targets
                .iter()
                .map(|t| {
                    advice
                        .fix_instructions
                        .get(t)
                        .cloned()
                        .unwrap_or_else(|| format!("Fix {}", t))
                })
                .collect();
            let (revised, revised_report) = orchestrator
                .apply_revise(draft, &plan, &advice.fix_targets, &instructions)
                .await?;
            draft = revised;
            report = revised_report;
            if report.hard_failed {
                break;
            }
        }

        if !report.hard_failed {
            draft.faq = orchestrator.generate_faq(&draft).await;
            report = run_qc(&draft);
            draft.quality_self_check = Some(report.measurements.clone());
        }
    }

    Ok((plan, draft, report))
}

/// Run one batch job to its terminal status. Per-item failures are isolated:
/// the loop always advances and always bumps the progress counter. Only a
/// batch-wide error (e.g. the batch plan itself failing) marks the whole job
/// `failed` and stops early.
#[instrument(skip_all, fields(job_id = %job_id))]
pub async fn run_batch_job(
    job_id: &str,
    batch_brief: &BatchBrief,
    orchestrator: &DraftOrchestrator,
    publisher: &dyn DraftPublisher,
    job_store: &dyn JobStorePort,
) -> JobState {
    let mut job = job_store
        .get(job_id)
        .unwrap_or_else(|| JobState::new(job_id, batch_brief.desired_count));
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    job.total = batch_brief.desired_count;
    job_store.create(job.clone());

    match execute(&mut job, batch_brief, orchestrator, publisher, job_store).await {
        Ok(()) => {
            job.status = JobStatus::Done;
            job.finished_at = Some(Utc::now());
            job_store.update(job.clone());
            info!(current = job.current, total = job.total, "batch job done");
        }
        Err(err) => {
            warn!(?err, "batch job failed");
            job.log(format!("Job failed: {:#}", err));
            job.status = JobStatus::Failed;
            job.finished_at = Some(Utc::now());
            job_store.update(job.clone());
        }
    }
    job
}

async fn execute(
    job: &mut JobState,
    batch_brief: &BatchBrief,
    orchestrator: &DraftOrchestrator,
    publisher: &dyn DraftPublisher,
    job_store: &dyn JobStorePort,
) -> Result<()> {
    let batch_plan = orchestrator.batch_plan(batch_brief).await?;
    job.total = batch_plan.items.len();
    job_store.update(job.clone());

    let mut ctx = PlanContext::default();

    for (idx, item) in batch_plan.items.iter().enumerate() {
        let brief = batch_item_to_brief(item, batch_brief);
        let mut result = JobResultItem::new(idx, &item.title);

        match drive_item(orchestrator, &brief, &ctx).await {
            Ok((plan, draft, report)) => {
                result.title = draft.title.clone();
                if report.hard_failed {
                    result.draft_ok = false;
                    let reasons: Vec<String> =
                        report.issues.iter().map(|i| i.message.clone()).collect();
                    result.error = Some(reasons.join("; "));
                    job.log(format!(
                        "[{}/{}] Draft failed: {}",
                        idx + 1,
                        job.total,
                        result.error.as_deref().unwrap_or_default()
                    ));
                } else {
                    result.draft_ok = true;
                    let published = publisher.create_draft(&draft).await;
                    result.wp_ok = published.success;
                    result.wp_post_id = published.post_id;
                    result.wp_url = published.url.clone();
                    result.error = published.error_message.clone();
                    if result.wp_ok {
                        job.log(format!(
                            "[{}/{}] WP draft created: {}",
                            idx + 1,
                            job.total,
                            result.wp_url.as_deref().unwrap_or("-")
                        ));
                    } else {
                        job.log(format!(
                            "[{}/{}] WP draft failed: {}",
                            idx + 1,
                            job.total,
                            result.error.as_deref().unwrap_or_default()
                        ));
                    }
                }

                // Overlap accumulator for the next sibling article.
                ctx.existing_titles.push(plan.title.clone());
                ctx.existing_angles.push(item.angle.clone());
                ctx.existing_avoid.extend(item.avoid_overlap_with.iter().cloned());
            }
            Err(err) => {
                result.draft_ok = false;
                result.error = Some(format!("{:#}", err));
                job.log(format!(
                    "[{}/{}] Item failed: {}",
                    idx + 1,
                    job.total,
                    result.error.as_deref().unwrap_or_default()
                ));
            }
        }

        job.results.push(result);
        job.current += 1;
        job_store.update(job.clone());
    }

    Ok(())
}
