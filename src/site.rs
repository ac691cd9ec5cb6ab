//! Default site adapter: slug rules, tone, and strict parsing of model
//! responses into validated domain types.
//!
//! Site-specific deployments implement [`SiteAdapterPort`] themselves; this
//! one covers a generic tech-blog setup and doubles as the reference for what
//! each hook is expected to do.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use crate::model::{ArticleDraft, ArticlePlan, BatchPlan, OutlineItem, SectionDraft};
use crate::ports::SiteAdapterPort;

pub struct DefaultSiteAdapter {
    tone_preamble: Option<String>,
}

impl DefaultSiteAdapter {
    pub fn new() -> Self {
        Self { tone_preamble: None }
    }

    /// A tone line prepended to every generation prompt, e.g. house style.
    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone_preamble = Some(tone.into());
        self
    }
}

impl Default for DefaultSiteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Models often wrap JSON in a markdown fence despite instructions. Strip one
/// outer fence if present; everything else passes through untouched.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening fence line.
    match inner.split_once('\n') {
        Some((first, body)) if !first.trim().contains(' ') => body.trim(),
        _ => inner.trim(),
    }
}

impl SiteAdapterPort for DefaultSiteAdapter {
    /// Lowercase, runs of anything non-alphanumeric collapse to one hyphen,
    /// no leading/trailing hyphens. Idempotent.
    fn normalize_slug(&self, slug: &str) -> String {
        let mut out = String::with_capacity(slug.len());
        let mut pending_hyphen = false;
        for ch in slug.chars() {
            if ch.is_ascii_alphanumeric() {
                if pending_hyphen && !out.is_empty() {
                    out.push('-');
                }
                pending_hyphen = false;
                out.push(ch.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
        }
        out
    }

    fn apply_site_tone(&self, prompt: &str) -> String {
        match &self.tone_preamble {
            Some(tone) => format!("{}\n\n{}", tone, prompt),
            None => prompt.to_string(),
        }
    }

    fn parse_plan_response(&self, raw: &str) -> Result<ArticlePlan> {
        let plan: ArticlePlan = serde_json::from_str(strip_code_fence(raw))
            .context("plan response is not valid JSON")?;
        plan.validate().context("plan failed outline validation")?;
        Ok(plan)
    }

    fn parse_batch_plan_response(&self, raw: &str) -> Result<BatchPlan> {
        let plan: BatchPlan = serde_json::from_str(strip_code_fence(raw))
            .context("batch plan response is not valid JSON")?;
        Ok(plan)
    }

    /// Parse one section and pin its identity to the outline item it was
    /// generated for; the model does not get to rename or re-id sections.
    fn parse_section_response(&self, raw: &str, outline_item: &OutlineItem) -> Result<SectionDraft> {
        let mut section: SectionDraft = serde_json::from_str(strip_code_fence(raw))
            .with_context(|| format!("section response for {} is not valid JSON", outline_item.id))?;
        section.h2_id = outline_item.id.clone();
        section.h2 = outline_item.h2.clone();
        Ok(section)
    }

    fn extend_wp_payload(
        &self,
        draft: &ArticleDraft,
        mut payload: Map<String, Value>,
    ) -> Map<String, Value> {
        if !draft.tags_suggestions.is_empty() {
            payload.insert("meta".into(), json!({ "tag_suggestions": draft.tags_suggestions }));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> DefaultSiteAdapter {
        DefaultSiteAdapter::new()
    }

    #[test]
    fn slug_lowercases_and_collapses_separators() {
        let a = adapter();
        assert_eq!(a.normalize_slug("Rust Async  --  Explained!"), "rust-async-explained");
        assert_eq!(a.normalize_slug("--edge--"), "edge");
        assert_eq!(a.normalize_slug("already-clean"), "already-clean");
    }

    #[test]
    fn slug_is_idempotent() {
        let a = adapter();
        let once = a.normalize_slug("Qué pasa_2024?");
        assert_eq!(a.normalize_slug(&once), once);
    }

    #[test]
    fn tone_preamble_is_prepended() {
        let a = DefaultSiteAdapter::new().with_tone("Write for beginners.");
        assert_eq!(a.apply_site_tone("prompt"), "Write for beginners.\n\nprompt");
        assert_eq!(adapter().apply_site_tone("prompt"), "prompt");
    }

    #[test]
    fn strip_code_fence_handles_fenced_and_bare() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn plan_parse_rejects_bad_outline_ids() {
        let raw = r#"{
            "title": "T", "slug": "t", "meta_description": "m",
            "outline": [{"id": "sec-1", "h2": "H", "intent": "i"}]
        }"#;
        assert!(adapter().parse_plan_response(raw).is_err());
    }

    #[test]
    fn plan_parse_accepts_fenced_valid_plan() {
        let raw = "```json\n{\"title\":\"T\",\"slug\":\"My Slug\",\"meta_description\":\"m\",\"outline\":[{\"id\":\"h2-1\",\"h2\":\"H\",\"intent\":\"i\"}]}\n```";
        let plan = adapter().parse_plan_response(raw).unwrap();
        assert_eq!(plan.outline.len(), 1);
        // Slug normalization happens in the orchestrator, not here.
        assert_eq!(plan.slug, "My Slug");
    }

    #[test]
    fn section_parse_pins_id_and_heading_to_outline() {
        let item = OutlineItem {
            id: "h2-3".into(),
            h2: "Real Heading".into(),
            intent: "i".into(),
            focus_keywords: vec![],
            must_include: vec![],
            must_avoid: vec![],
            h3: vec![],
        };
        let raw = r#"{"h2_id": "h2-99", "h2": "Made Up", "body": "text"}"#;
        let section = adapter().parse_section_response(raw, &item).unwrap();
        assert_eq!(section.h2_id, "h2-3");
        assert_eq!(section.h2, "Real Heading");
        assert_eq!(section.body, "text");
    }

    #[test]
    fn payload_extension_adds_tag_suggestions_when_present() {
        let mut draft = crate::model::ArticleDraft {
            title: "T".into(),
            slug: "t".into(),
            meta_description: "m".into(),
            outline: vec![],
            markdown: String::new(),
            sections: vec![],
            faq: vec![],
            tags_suggestions: vec!["rust".into()],
            volatile_topics: vec![],
            safe_assertions: vec![],
            notes: None,
            quality_self_check: None,
        };
        let payload = adapter().extend_wp_payload(&draft, Map::new());
        assert_eq!(payload["meta"]["tag_suggestions"][0], "rust");

        draft.tags_suggestions.clear();
        let payload = adapter().extend_wp_payload(&draft, Map::new());
        assert!(payload.is_empty());
    }
}
