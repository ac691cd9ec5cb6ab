//! Trait seams for the external collaborators of the generation engine.
//!
//! Everything that talks to the outside world (the language model, prompt
//! templates, site-specific parsing, job persistence) is injected through one
//! of these traits; the engine never reads ambient global state.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::model::{
    ArticleBrief, ArticleDraft, ArticlePlan, BatchBrief, BatchPlan, JobState, OutlineItem,
    SectionDraft,
};

/// Overlap context accumulated across sibling articles of one batch. Passed
/// into plan prompts so later articles steer away from earlier ones.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub existing_titles: Vec<String>,
    pub existing_angles: Vec<String>,
    pub existing_avoid: Vec<String>,
}

/// Language-model call. Output is opaque text; parsing is the site adapter's
/// business.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}

/// Per-phase prompt assembly.
pub trait PromptRendererPort: Send + Sync {
    fn render_plan_prompt(&self, brief: &ArticleBrief, ctx: &PlanContext) -> String;
    fn render_batch_plan_prompt(&self, brief: &BatchBrief) -> String;
    fn render_section_prompt(
        &self,
        plan: &ArticlePlan,
        outline_item: &OutlineItem,
        previous_sections: &[SectionDraft],
    ) -> String;
    fn render_qc_soft_prompt(&self, draft: &ArticleDraft) -> String;
    fn render_revise_prompt(
        &self,
        draft: &ArticleDraft,
        instructions: &[String],
        targets: &[String],
    ) -> String;
    fn render_faq_prompt(&self, draft: &ArticleDraft) -> String;
}

/// Site-specific behavior: slug rules, tone, response parsing, publish payload
/// extension. `normalize_slug` must be idempotent. Parse methods either return
/// a validated typed object or fail; the engine propagates those failures.
pub trait SiteAdapterPort: Send + Sync {
    fn normalize_slug(&self, slug: &str) -> String;
    fn apply_site_tone(&self, prompt: &str) -> String;
    fn parse_plan_response(&self, raw: &str) -> Result<ArticlePlan>;
    fn parse_batch_plan_response(&self, raw: &str) -> Result<BatchPlan>;
    fn parse_section_response(&self, raw: &str, outline_item: &OutlineItem) -> Result<SectionDraft>;
    /// Site-specific categories/tags/custom fields on top of the base payload.
    fn extend_wp_payload(&self, draft: &ArticleDraft, payload: Map<String, Value>)
        -> Map<String, Value>;
}

/// Job-state persistence. Implementations must support concurrent
/// create/get/update of independent job ids; `get` returns a snapshot, never a
/// handle into a job being mutated.
pub trait JobStorePort: Send + Sync {
    fn create(&self, job: JobState);
    fn get(&self, job_id: &str) -> Option<JobState>;
    fn update(&self, job: JobState);
}

/// Markdown -> HTML conversion for the publish payload.
pub trait MarkdownRenderer: Send + Sync {
    fn to_html(&self, markdown: &str) -> String;
}
