//! Deterministic quality control over an assembled draft.
//!
//! Fixed rule set, each rule emitting zero or one issue per target. Pure
//! function of the draft's markdown/outline/FAQ state, so two runs over an
//! unchanged draft always produce identical reports and the revision loop
//! stays bounded.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::markdown::extract_body_lengths;
use crate::model::{ArticleDraft, QcIssue, QcReport, QcSeverity, QualitySelfCheck};

const META_DESCRIPTION_MIN: usize = 80;
const META_DESCRIPTION_MAX: usize = 140;
const H2_COUNT_MIN: usize = 4;
const H2_COUNT_MAX: usize = 8;
const H2_BODY_MIN: usize = 300;
const H3_BODY_HARD_MIN: usize = 80;
const H3_BODY_SOFT_MIN: usize = 120;

/// Absolute-claim markers. Matching any of these flags the draft for a softer
/// rewrite; volatile topics must not be asserted outright.
static ASSERTIVE_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new("必ず|絶対|断言|保証").expect("assertive language regex"));

fn code_points(text: &str) -> usize {
    text.chars().count()
}

fn hard(message: String, target_id: Option<String>, metric: &str) -> QcIssue {
    QcIssue {
        message,
        severity: QcSeverity::Hard,
        target_id,
        metric: Some(metric.to_string()),
    }
}

fn soft(message: String, target_id: Option<String>, metric: &str) -> QcIssue {
    QcIssue {
        message,
        severity: QcSeverity::Soft,
        target_id,
        metric: Some(metric.to_string()),
    }
}

pub fn run_qc(draft: &ArticleDraft) -> QcReport {
    let (h2_lengths, h3_lengths) = extract_body_lengths(&draft.markdown);

    let meta_description_length = code_points(draft.meta_description.trim());
    let h2_count = h2_lengths.len();
    let h3_count = h3_lengths.len();
    let min_h2_length = h2_lengths.iter().map(|(_, l)| *l).min().unwrap_or(0);
    let min_h3_length = h3_lengths.iter().map(|(_, l)| *l).min().unwrap_or(0);
    let assertive_language_found = ASSERTIVE_LANGUAGE.is_match(&draft.markdown);

    let mut measurements = QualitySelfCheck {
        meta_description_length,
        markdown_length: code_points(&draft.markdown),
        h2_count,
        h3_count,
        min_h2_length,
        min_h3_length,
        faq_count: draft.faq.len(),
        assertive_language_found,
        regenerate_required: false,
    };

    let mut issues: Vec<QcIssue> = Vec::new();

    if !(META_DESCRIPTION_MIN..=META_DESCRIPTION_MAX).contains(&meta_description_length) {
        issues.push(hard(
            format!("meta description length out of range: {}", meta_description_length),
            None,
            "meta_description_length",
        ));
    }

    if !(H2_COUNT_MIN..=H2_COUNT_MAX).contains(&h2_count) {
        issues.push(hard(
            format!("h2 count out of range: {}", h2_count),
            None,
            "h2_count",
        ));
    }

    if min_h2_length < H2_BODY_MIN {
        let target = h2_lengths
            .iter()
            .find(|(_, l)| *l == min_h2_length)
            .map(|(id, _)| id.clone());
        issues.push(hard(
            format!("h2 body too short ({} chars)", min_h2_length),
            target,
            "min_h2_length",
        ));
    }

    for (h3_id, length) in &h3_lengths {
        if *length < H3_BODY_HARD_MIN {
            issues.push(hard(
                format!("h3 body too short ({} chars)", length),
                Some(h3_id.clone()),
                "h3_length",
            ));
        } else if *length < H3_BODY_SOFT_MIN {
            issues.push(soft(
                format!("h3 body on the short side ({} chars)", length),
                Some(h3_id.clone()),
                "h3_length",
            ));
        }
    }

    if assertive_language_found {
        issues.push(soft(
            "assertive language detected".to_string(),
            None,
            "assertive_language_found",
        ));
    }

    // Structural completeness: every planned id must appear embedded in the
    // markdown. Outline order keeps the issue list deterministic.
    for item in &draft.outline {
        if !draft.markdown.contains(&format!("id:{}", item.id)) {
            issues.push(hard(
                format!("outline id missing from markdown: {}", item.id),
                Some(item.id.clone()),
                "outline_id",
            ));
        }
    }
    for item in &draft.outline {
        for h3 in &item.h3 {
            if !draft.markdown.contains(&format!("id:{}", h3.id)) {
                issues.push(hard(
                    format!("h3 id missing from markdown: {}", h3.id),
                    Some(h3.id.clone()),
                    "outline_h3_id",
                ));
            }
        }
    }

    let hard_failed = issues.iter().any(|i| i.severity == QcSeverity::Hard);
    let soft_failed = issues.iter().any(|i| i.severity == QcSeverity::Soft);
    measurements.regenerate_required = hard_failed;

    QcReport {
        hard_failed,
        soft_failed,
        issues,
        measurements,
    }
}
