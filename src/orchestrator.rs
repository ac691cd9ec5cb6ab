//! Plan → Draft → QC → Revise → FAQ phase machine.
//!
//! Collaborators are injected trait objects; the orchestrator owns no network
//! or persistence state of its own. Sections are always generated strictly in
//! outline order, each prompt carrying every previously generated section, so
//! continuity depends on never parallelizing this loop.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::markdown::assemble_markdown;
use crate::model::{
    ArticleBrief, ArticleDraft, ArticlePlan, BatchBrief, BatchPlan, FaqItem, OutlineItem, QcReport,
    ReviseRequest, SectionDraft,
};
use crate::ports::{LlmPort, PlanContext, PromptRendererPort, SiteAdapterPort};
use crate::qc::run_qc;

const PLAN_TEMPERATURE: f32 = 0.2;
const SECTION_TEMPERATURE: f32 = 0.7;
const SOFT_QC_TEMPERATURE: f32 = 0.0;
const REVISE_TEMPERATURE: f32 = 0.3;
const FAQ_TEMPERATURE: f32 = 0.2;

pub const DEFAULT_SOFT_QC_RETRIES: usize = 2;

/// Terminal outcome of one article's pipeline run.
#[derive(Debug)]
pub enum DraftOutcome {
    Accepted {
        draft: ArticleDraft,
        report: QcReport,
    },
    /// Not publishable; the request explains what to regenerate and why.
    Escalated {
        draft: ArticleDraft,
        report: QcReport,
        request: ReviseRequest,
    },
}

/// Secondary-opinion output of the soft-QC call. Malformed model output
/// degrades to the empty advice, which ends the soft loop.
#[derive(Debug, Default)]
pub struct SoftQcAdvice {
    pub fix_targets: Vec<String>,
    pub fix_instructions: HashMap<String, String>,
    pub overall_notes: String,
}

#[derive(Debug, Deserialize)]
struct SoftQcRaw {
    #[serde(default)]
    fix_targets: Vec<String>,
    #[serde(default)]
    fix_instructions: HashMap<String, String>,
    #[serde(default)]
    overall_notes: String,
}

#[derive(Debug, Deserialize)]
struct ReviseRaw {
    #[serde(default)]
    sections: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FaqRaw {
    #[serde(default)]
    faq: Vec<serde_json::Value>,
}

pub struct DraftOrchestrator {
    llm: Arc<dyn LlmPort>,
    prompt_renderer: Arc<dyn PromptRendererPort>,
    site_adapter: Arc<dyn SiteAdapterPort>,
    soft_qc_retries: usize,
}

impl DraftOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        prompt_renderer: Arc<dyn PromptRendererPort>,
        site_adapter: Arc<dyn SiteAdapterPort>,
    ) -> Self {
        Self {
            llm,
            prompt_renderer,
            site_adapter,
            soft_qc_retries: DEFAULT_SOFT_QC_RETRIES,
        }
    }

    pub fn with_soft_qc_retries(mut self, retries: usize) -> Self {
        self.soft_qc_retries = retries;
        self
    }

    pub fn soft_qc_retries(&self) -> usize {
        self.soft_qc_retries
    }

    /// Plan the whole batch in one call. A malformed response here is fatal to
    /// the batch, unlike the degradable per-article calls.
    pub async fn batch_plan(&self, brief: &BatchBrief) -> Result<BatchPlan> {
        let prompt = self.prompt_renderer.render_batch_plan_prompt(brief);
        let raw = self
            .llm
            .complete(&prompt, PLAN_TEMPERATURE, None)
            .await
            .context("batch plan generation failed")?;
        self.site_adapter
            .parse_batch_plan_response(&raw)
            .context("batch plan response could not be parsed")
    }

    /// Brief -> validated plan. `ctx` carries titles/angles/avoid lists from
    /// sibling articles already produced in the same batch.
    pub async fn plan_article(&self, brief: &ArticleBrief, ctx: &PlanContext) -> Result<ArticlePlan> {
        let prompt = self.prompt_renderer.render_plan_prompt(brief, ctx);
        let prompt = self.site_adapter.apply_site_tone(&prompt);
        let raw = self
            .llm
            .complete(&prompt, PLAN_TEMPERATURE, None)
            .await
            .context("plan generation failed")?;
        let mut plan = self.site_adapter.parse_plan_response(&raw)?;
        plan.slug = self.site_adapter.normalize_slug(&plan.slug);
        info!(title = %plan.title, sections = plan.outline.len(), "plan generated");
        Ok(plan)
    }

    async fn draft_section(
        &self,
        plan: &ArticlePlan,
        outline_item: &OutlineItem,
        previous_sections: &[SectionDraft],
    ) -> Result<SectionDraft> {
        let prompt = self
            .prompt_renderer
            .render_section_prompt(plan, outline_item, previous_sections);
        let prompt = self.site_adapter.apply_site_tone(&prompt);
        let raw = self
            .llm
            .complete(&prompt, SECTION_TEMPERATURE, None)
            .await
            .with_context(|| format!("section generation failed for {}", outline_item.id))?;
        self.site_adapter.parse_section_response(&raw, outline_item)
    }

    /// Draft every section in outline order, assemble, and run the first QC.
    pub async fn draft_article(&self, plan: &ArticlePlan) -> Result<(ArticleDraft, QcReport)> {
        let mut sections: Vec<SectionDraft> = Vec::with_capacity(plan.outline.len());
        for item in &plan.outline {
            let section = self.draft_section(plan, item, &sections).await?;
            sections.push(section);
        }

        let markdown = assemble_markdown(plan, &sections);
        let mut draft = ArticleDraft {
            title: plan.title.clone(),
            slug: plan.slug.clone(),
            meta_description: plan.meta_description.clone(),
            outline: plan.outline.clone(),
            markdown,
            sections,
            faq: Vec::new(),
            tags_suggestions: plan.tags_suggestions.clone(),
            volatile_topics: plan.volatile_topics.clone(),
            safe_assertions: plan.safe_assertions.clone(),
            notes: plan.notes.clone(),
            quality_self_check: None,
        };
        let report = run_qc(&draft);
        draft.quality_self_check = Some(report.measurements.clone());
        Ok((draft, report))
    }

    /// Build the escalation artifact from a QC report. Level-2 targets are
    /// mapped to their parent level-1 section; sub-sections are never
    /// regenerated standalone. Other metrics contribute reasons only.
    pub fn revise(&self, report: &QcReport) -> ReviseRequest {
        let reasons: Vec<String> = report.issues.iter().map(|i| i.message.clone()).collect();
        let mut sections_to_regenerate: Vec<String> = Vec::new();
        let mut push_unique = |id: String, out: &mut Vec<String>| {
            if !out.contains(&id) {
                out.push(id);
            }
        };
        for issue in &report.issues {
            let metric = issue.metric.as_deref();
            if let Some(target) = issue.target_id.as_deref() {
                match metric {
                    Some("min_h2_length") | Some("outline_id") => {
                        push_unique(target.to_string(), &mut sections_to_regenerate);
                    }
                    Some("h3_length") | Some("outline_h3_id") => {
                        if let Some(parent) = parent_h2_id(target) {
                            push_unique(parent, &mut sections_to_regenerate);
                        }
                    }
                    _ => {}
                }
            }
        }
        ReviseRequest {
            sections_to_regenerate,
            reasons,
            hard_fail: report.hard_failed,
        }
    }

    /// Ask the model where the soft issues are and how to fix them.
    pub async fn soft_qc(&self, draft: &ArticleDraft) -> SoftQcAdvice {
        let prompt = self.prompt_renderer.render_qc_soft_prompt(draft);
        let raw = match self.llm.complete(&prompt, SOFT_QC_TEMPERATURE, None).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "soft QC call failed; continuing without advice");
                return SoftQcAdvice::default();
            }
        };
        match serde_json::from_str::<SoftQcRaw>(&raw) {
            Ok(parsed) => SoftQcAdvice {
                fix_targets: parsed.fix_targets,
                fix_instructions: parsed.fix_instructions,
                overall_notes: parsed.overall_notes,
            },
            Err(_) => SoftQcAdvice {
                overall_notes: "JSON parse failed".to_string(),
                ..Default::default()
            },
        }
    }

    /// Positional merge over the ordered section list: replacements land at
    /// the index of the id they replace, untouched entries keep their order,
    /// genuinely new ids are appended.
    fn replace_sections(
        base_sections: Vec<SectionDraft>,
        replacements: Vec<SectionDraft>,
    ) -> Vec<SectionDraft> {
        let replacement_order: Vec<String> =
            replacements.iter().map(|s| s.h2_id.clone()).collect();
        let mut replace_map: HashMap<String, SectionDraft> = replacements
            .into_iter()
            .map(|s| (s.h2_id.clone(), s))
            .collect();
        let mut result: Vec<SectionDraft> = base_sections
            .into_iter()
            .map(|sec| replace_map.remove(&sec.h2_id).unwrap_or(sec))
            .collect();
        for id in replacement_order {
            if let Some(sec) = replace_map.remove(&id) {
                result.push(sec);
            }
        }
        result
    }

    /// Regenerate the named sections and fold them back into the draft. The
    /// draft is rebuilt from scratch (markdown + QC), never patched.
    pub async fn apply_revise(
        &self,
        draft: ArticleDraft,
        plan: &ArticlePlan,
        targets: &[String],
        instructions: &[String],
    ) -> Result<(ArticleDraft, QcReport)> {
        let prompt = self
            .prompt_renderer
            .render_revise_prompt(&draft, instructions, targets);
        let raw = self
            .llm
            .complete(&prompt, REVISE_TEMPERATURE, None)
            .await
            .context("revise generation failed")?;
        let sections_data = match serde_json::from_str::<ReviseRaw>(&raw) {
            Ok(parsed) => parsed.sections,
            Err(_) => Vec::new(),
        };
        let new_sections: Vec<SectionDraft> = sections_data
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();

        let merged = Self::replace_sections(draft.sections, new_sections);
        let markdown = assemble_markdown(plan, &merged);
        let mut revised = ArticleDraft {
            markdown,
            sections: merged,
            outline: plan.outline.clone(),
            tags_suggestions: plan.tags_suggestions.clone(),
            volatile_topics: plan.volatile_topics.clone(),
            safe_assertions: plan.safe_assertions.clone(),
            ..draft
        };
        let report = run_qc(&revised);
        revised.quality_self_check = Some(report.measurements.clone());
        Ok((revised, report))
    }

    /// FAQ enrichment. Never fatal: malformed or non-list responses degrade to
    /// an empty FAQ.
    pub async fn generate_faq(&self, draft: &ArticleDraft) -> Vec<FaqItem> {
        let prompt = self.prompt_renderer.render_faq_prompt(draft);
        let raw = match self.llm.complete(&prompt, FAQ_TEMPERATURE, None).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(?err, "FAQ call failed; continuing without FAQ");
                return Vec::new();
            }
        };
        match serde_json::from_str::<FaqRaw>(&raw) {
            Ok(parsed) => parsed
                .faq
                .into_iter()
                .filter_map(|value| serde_json::from_value(value).ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Full single-article pipeline: plan, draft, bounded soft-revision loop,
    /// FAQ, final QC gate.
    pub async fn produce_draft(
        &self,
        brief: &ArticleBrief,
        ctx: &PlanContext,
    ) -> Result<DraftOutcome> {
        let plan = self.plan_article(brief, ctx).await?;
        let (draft, report) = self.draft_article(&plan).await?;

        if report.hard_failed {
            let request = self.revise(&report);
            return Ok(DraftOutcome::Escalated { draft, report, request });
        }

        let (mut draft, mut report) = (draft, report);
        for attempt in 0..self.soft_qc_retries {
            if !report.soft_failed {
                break;
            }
            let advice = self.soft_qc(&draft).await;
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
            info!(attempt = attempt + 1, targets = advice.fix_targets.len(), "soft revision");
            let (revised, revised_report) = self
                .apply_revise(draft, &plan, &advice.fix_targets, &instructions)
                .await?;
            draft = revised;
            report = revised_report;
            if report.hard_failed {
                let mut request = self.revise(&report);
                request
                    .reasons
                    .push("hard failure introduced during soft revision".to_string());
                return Ok(DraftOutcome::Escalated { draft, report, request });
            }
        }

        draft.faq = self.generate_faq(&draft).await;
        let final_report = run_qc(&draft);
        draft.quality_self_check = Some(final_report.measurements.clone());

        if final_report.hard_failed {
            let mut request = self.revise(&final_report);
            request.reasons.push("final QC failed hard".to_string());
            return Ok(DraftOutcome::Escalated {
                draft,
                report: final_report,
                request,
            });
        }
        if final_report.soft_failed {
            let mut request = self.revise(&final_report);
            request
                .reasons
                .push("final QC still soft-failed (acceptance is the reviewer's call)".to_string());
            return Ok(DraftOutcome::Escalated {
                draft,
                report: final_report,
                request,
            });
        }

        Ok(DraftOutcome::Accepted {
            draft,
            report: final_report,
        })
    }
}

/// `h3-2-1` -> `h2-2`. Sub-section issues always escalate to the owning
/// section.
fn parent_h2_id(h3_id: &str) -> Option<String> {
    let mut parts = h3_id.split('-');
    let _prefix = parts.next()?;
    let parent_index = parts.next()?;
    if parent_index.is_empty() {
        return None;
    }
    Some(format!("h2-{}", parent_index))
}
