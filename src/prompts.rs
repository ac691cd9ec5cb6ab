//! Prompt template store and renderer.
//!
//! Templates are plain text with `${name}` placeholders. The built-in set can
//! be overridden per deployment from a YAML file mapping template keys to
//! bodies; unknown keys in the override file are rejected so typos surface at
//! startup instead of producing silently-default prompts.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::model::{ArticleBrief, ArticleDraft, ArticlePlan, BatchBrief, OutlineItem, SectionDraft};
use crate::ports::{PlanContext, PromptRendererPort};

const TEMPLATE_KEYS: [&str; 6] =
    ["plan", "batch_plan", "section_draft", "qc_soft", "revise", "faq"];

const DEFAULT_TEMPLATES: &str = include_str!("prompts/default_templates.yaml");

pub struct PromptRenderer {
    templates: HashMap<String, String>,
}

impl PromptRenderer {
    pub fn new() -> Self {
        let templates: HashMap<String, String> =
            serde_yaml::from_str(DEFAULT_TEMPLATES).expect("built-in templates parse");
        debug_assert!(TEMPLATE_KEYS.iter().all(|k| templates.contains_key(*k)));
        Self { templates }
    }

    /// Built-in templates with per-key overrides from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt templates {}", path.display()))?;
        let overrides: HashMap<String, String> = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse prompt templates {}", path.display()))?;
        let mut renderer = Self::new();
        for (key, body) in overrides {
            if !TEMPLATE_KEYS.contains(&key.as_str()) {
                bail!("unknown prompt template key '{}' in {}", key, path.display());
            }
            renderer.templates.insert(key, body);
        }
        Ok(renderer)
    }

    fn render(&self, key: &str, vars: &[(&str, String)]) -> String {
        let mut out = self.templates[key].clone();
        for (name, value) in vars {
            out = out.replace(&format!("${{{}}}", name), value);
        }
        out
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

impl PromptRendererPort for PromptRenderer {
    fn render_plan_prompt(&self, brief: &ArticleBrief, ctx: &PlanContext) -> String {
        let brief_json = pretty(&json!({
            "topic": brief.topic,
            "target_site": brief.target_site,
            "seed_title": brief.seed_title,
            "audience": brief.audience,
            "purpose": brief.purpose,
            "constraints": brief.constraints,
        }));
        let context_json = pretty(&json!({
            "existing_titles": ctx.existing_titles,
            "existing_angles": ctx.existing_angles,
            "avoid_overlap_with": ctx.existing_avoid,
        }));
        self.render("plan", &[("brief", brief_json), ("context", context_json)])
    }

    fn render_batch_plan_prompt(&self, brief: &BatchBrief) -> String {
        let brief_json = pretty(&json!({
            "topic": brief.topic,
            "target_site": brief.target_site,
            "desired_count": brief.desired_count,
            "audience": brief.audience,
            "purpose": brief.purpose,
            "constraints": brief.constraints,
        }));
        self.render(
            "batch_plan",
            &[("brief", brief_json), ("count", brief.desired_count.to_string())],
        )
    }

    fn render_section_prompt(
        &self,
        plan: &ArticlePlan,
        outline_item: &OutlineItem,
        previous_sections: &[SectionDraft],
    ) -> String {
        let item_json =
            serde_json::to_string_pretty(outline_item).unwrap_or_else(|_| String::new());
        // Only headings of earlier sections; full bodies would blow the window.
        let previous: Vec<String> =
            previous_sections.iter().map(|s| format!("- {} ({})", s.h2, s.h2_id)).collect();
        self.render(
            "section_draft",
            &[
                ("title", plan.title.clone()),
                ("meta_description", plan.meta_description.clone()),
                ("outline_item", item_json),
                ("previous_headings", previous.join("\n")),
            ],
        )
    }

    fn render_qc_soft_prompt(&self, draft: &ArticleDraft) -> String {
        self.render(
            "qc_soft",
            &[("title", draft.title.clone()), ("markdown", draft.markdown.clone())],
        )
    }

    fn render_revise_prompt(
        &self,
        draft: &ArticleDraft,
        instructions: &[String],
        targets: &[String],
    ) -> String {
        self.render(
            "revise",
            &[
                ("title", draft.title.clone()),
                ("markdown", draft.markdown.clone()),
                ("targets", targets.join(", ")),
                ("instructions", instructions.join("\n")),
            ],
        )
    }

    fn render_faq_prompt(&self, draft: &ArticleDraft) -> String {
        self.render(
            "faq",
            &[("title", draft.title.clone()), ("markdown", draft.markdown.clone())],
        )
    }
}
