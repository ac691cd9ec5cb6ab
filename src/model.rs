use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("outline id '{0}' must start with 'h2-'")]
    BadOutlineId(String),
    #[error("outline h3 id '{0}' must start with 'h3-'")]
    BadOutlineH3Id(String),
    #[error("duplicate outline id '{0}'")]
    DuplicateOutlineId(String),
    #[error("duplicate h3 id '{0}' under '{1}'")]
    DuplicateH3Id(String, String),
}

/// Input brief describing one desired article. Starting point of plan generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleBrief {
    pub topic: String,
    pub target_site: String,
    pub seed_title: Option<String>,
    pub audience: Option<String>,
    pub purpose: Option<String>,
    /// Free-form constraints passed through to prompts, never interpreted here.
    pub constraints: Option<serde_json::Value>,
}

/// Brief for planning a whole batch of related articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchBrief {
    pub topic: String,
    pub target_site: String,
    pub desired_count: usize,
    pub audience: Option<String>,
    pub purpose: Option<String>,
    pub constraints: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineH3 {
    pub id: String,
    pub h3: String,
    #[serde(default)]
    pub must_include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineItem {
    pub id: String,
    pub h2: String,
    pub intent: String,
    #[serde(default)]
    pub focus_keywords: Vec<String>,
    #[serde(default)]
    pub must_include: Vec<String>,
    #[serde(default)]
    pub must_avoid: Vec<String>,
    #[serde(default)]
    pub h3: Vec<OutlineH3>,
}

/// Structured outline produced before any prose is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticlePlan {
    pub title: String,
    pub slug: String,
    pub meta_description: String,
    pub outline: Vec<OutlineItem>,
    #[serde(default)]
    pub tags_suggestions: Vec<String>,
    #[serde(default)]
    pub volatile_topics: Vec<String>,
    #[serde(default)]
    pub safe_assertions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ArticlePlan {
    /// Structural validation: id prefixes and uniqueness. Parse sites call this
    /// before a plan enters the pipeline; violations are construction failures,
    /// not QC issues.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = std::collections::HashSet::new();
        for item in &self.outline {
            if !item.id.starts_with("h2-") {
                return Err(ModelError::BadOutlineId(item.id.clone()));
            }
            if !seen.insert(item.id.clone()) {
                return Err(ModelError::DuplicateOutlineId(item.id.clone()));
            }
            let mut seen_h3 = std::collections::HashSet::new();
            for h3 in &item.h3 {
                if !h3.id.starts_with("h3-") {
                    return Err(ModelError::BadOutlineH3Id(h3.id.clone()));
                }
                if !seen_h3.insert(h3.id.clone()) {
                    return Err(ModelError::DuplicateH3Id(h3.id.clone(), item.id.clone()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionH3Draft {
    pub id: String,
    pub h3: String,
    pub body: String,
}

/// Generated body for one outline item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDraft {
    pub h2_id: String,
    pub h2: String,
    pub body: String,
    #[serde(default)]
    pub h3_blocks: Vec<SectionH3Draft>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqItem {
    pub question: String,
    pub answer: String,
}

/// Fully assembled article. Every mutation re-derives `markdown` and re-runs QC
/// before the draft is considered current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub slug: String,
    pub meta_description: String,
    pub outline: Vec<OutlineItem>,
    pub markdown: String,
    pub sections: Vec<SectionDraft>,
    #[serde(default)]
    pub faq: Vec<FaqItem>,
    #[serde(default)]
    pub tags_suggestions: Vec<String>,
    #[serde(default)]
    pub volatile_topics: Vec<String>,
    #[serde(default)]
    pub safe_assertions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub quality_self_check: Option<QualitySelfCheck>,
}

/// Counts and lengths derived from a draft during QC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySelfCheck {
    pub meta_description_length: usize,
    pub markdown_length: usize,
    pub h2_count: usize,
    pub h3_count: usize,
    pub min_h2_length: usize,
    pub min_h3_length: usize,
    pub faq_count: usize,
    pub assertive_language_found: bool,
    pub regenerate_required: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QcSeverity {
    Hard,
    Soft,
}

impl QcSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcSeverity::Hard => "hard",
            QcSeverity::Soft => "soft",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcIssue {
    pub message: String,
    pub severity: QcSeverity,
    pub target_id: Option<String>,
    pub metric: Option<String>,
}

/// Recomputed from scratch on every draft change, never patched incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcReport {
    pub hard_failed: bool,
    pub soft_failed: bool,
    pub issues: Vec<QcIssue>,
    pub measurements: QualitySelfCheck,
}

/// Output artifact summarizing why a draft could not be finalized. Consumed by
/// external escalation (human review / retry pipeline), not by this engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviseRequest {
    pub sections_to_regenerate: Vec<String>,
    pub reasons: Vec<String>,
    pub hard_fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlanItem {
    pub article_id: String,
    pub title: String,
    pub angle: String,
    pub target_audience: String,
    pub search_intent: String,
    pub differentiator: String,
    #[serde(default)]
    pub avoid_overlap_with: Vec<String>,
    #[serde(default)]
    pub outline_hint: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_id: String,
    pub items: Vec<BatchPlanItem>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultItem {
    pub index: usize,
    pub title: String,
    pub draft_ok: bool,
    pub error: Option<String>,
    pub wp_ok: bool,
    pub wp_post_id: Option<i64>,
    pub wp_url: Option<String>,
}

impl JobResultItem {
    pub fn new(index: usize, title: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            draft_ok: false,
            error: None,
            wp_ok: false,
            wp_post_id: None,
            wp_url: None,
        }
    }
}

/// Single mutable aggregate observed by pollers. The batch runner is the sole
/// writer while a job is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub status: JobStatus,
    pub total: usize,
    pub current: usize,
    pub logs: Vec<String>,
    pub results: Vec<JobResultItem>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(job_id: impl Into<String>, total: usize) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            total,
            current: 0,
            logs: Vec::new(),
            results: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(message.into());
    }
}
