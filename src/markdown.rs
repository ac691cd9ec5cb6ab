//! Markdown assembly and the inverse body-length scan.
//!
//! Headings carry an inline id comment (`## Title <!-- id:h2-1 -->`). That
//! embedded id is the contract that lets QC map markdown spans back to outline
//! identifiers without keeping a separate structural document.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::model::{ArticlePlan, SectionDraft};

static H2_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^## (.+?) <!-- id:([^>]+) -->\s*$").expect("h2 line regex"));
static H3_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^### (.+?) <!-- id:([^>]+) -->\s*$").expect("h3 line regex"));

fn embed_h2(title: &str, h2_id: &str) -> String {
    format!("## {} <!-- id:{} -->", title, h2_id)
}

fn embed_h3(title: &str, h3_id: &str) -> String {
    format!("### {} <!-- id:{} -->", title, h3_id)
}

fn render_section(section: &SectionDraft) -> String {
    let mut parts = vec![embed_h2(&section.h2, &section.h2_id), section.body.trim().to_string()];
    for h3 in &section.h3_blocks {
        parts.push(embed_h3(&h3.h3, &h3.id));
        parts.push(h3.body.trim().to_string());
    }
    parts.join("\n") + "\n"
}

/// Merge per-section drafts into one document in plan order. A plan item with
/// no matching section is omitted, not an error (QC flags the missing id
/// later). The result always ends with exactly one trailing newline.
pub fn assemble_markdown(plan: &ArticlePlan, sections: &[SectionDraft]) -> String {
    let by_id: HashMap<&str, &SectionDraft> =
        sections.iter().map(|s| (s.h2_id.as_str(), s)).collect();
    let ordered: Vec<String> = plan
        .outline
        .iter()
        .filter_map(|item| by_id.get(item.id.as_str()).map(|s| render_section(s)))
        .collect();
    format!("{}\n", ordered.join("\n").trim())
}

fn code_points(text: &str) -> usize {
    text.chars().count()
}

/// Forward scan over an assembled document, collecting per-heading body
/// lengths in document order.
///
/// Lengths are code-point counts of the trimmed non-blank body lines. A
/// level-1 body excludes nested level-2 heading lines (but keeps their body
/// text, so a level-1 length is never smaller than what was drafted for it).
/// Ids present in the plan but never reached simply do not appear.
#[derive(Default)]
struct LengthScanner {
    h2_lengths: Vec<(String, usize)>,
    h3_lengths: Vec<(String, usize)>,
    current_h2: Option<(String, usize)>,
    current_h3: Option<(String, usize)>,
    h3_lines_seen: usize,
}

impl LengthScanner {
    fn flush_h3(&mut self) {
        if let Some((id, len)) = self.current_h3.take() {
            if self.h3_lines_seen > 0 {
                self.h3_lengths.push((id, len));
            }
        }
        self.h3_lines_seen = 0;
    }

    fn flush_h2(&mut self) {
        if let Some((id, len)) = self.current_h2.take() {
            self.h2_lengths.push((id, len));
        }
    }

    fn feed(&mut self, line: &str) {
        if let Some(caps) = H2_LINE.captures(line) {
            self.flush_h3();
            self.flush_h2();
            self.current_h2 = Some((caps[2].to_string(), 0));
            return;
        }
        if let Some(caps) = H3_LINE.captures(line) {
            self.flush_h3();
            self.current_h3 = Some((caps[2].to_string(), 0));
            return;
        }
        let trimmed = line.trim();
        if self.current_h3.is_some() {
            self.h3_lines_seen += 1;
            if !trimmed.is_empty() {
                if let Some((_, len)) = self.current_h3.as_mut() {
                    *len += code_points(trimmed);
                }
            }
        }
        if !trimmed.is_empty() {
            if let Some((_, len)) = self.current_h2.as_mut() {
                *len += code_points(trimmed);
            }
        }
    }

    fn finish(mut self) -> (Vec<(String, usize)>, Vec<(String, usize)>) {
        self.flush_h3();
        self.flush_h2();
        (self.h2_lengths, self.h3_lengths)
    }
}

pub fn extract_body_lengths(markdown: &str) -> (Vec<(String, usize)>, Vec<(String, usize)>) {
    let mut scanner = LengthScanner::default();
    for line in markdown.lines() {
        scanner.feed(line);
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OutlineH3, OutlineItem, SectionH3Draft};

    fn outline_item(id: &str, h3_ids: &[&str]) -> OutlineItem {
        OutlineItem {
            id: id.into(),
            h2: format!("Heading {}", id),
            intent: "explain".into(),
            focus_keywords: vec![],
            must_include: vec![],
            must_avoid: vec![],
            h3: h3_ids
                .iter()
                .map(|hid| OutlineH3 {
                    id: hid.to_string(),
                    h3: format!("Sub {}", hid),
                    must_include: vec![],
                })
                .collect(),
        }
    }

    fn plan(items: Vec<OutlineItem>) -> ArticlePlan {
        ArticlePlan {
            title: "T".into(),
            slug: "t".into(),
            meta_description: "m".into(),
            outline: items,
            tags_suggestions: vec![],
            volatile_topics: vec![],
            safe_assertions: vec![],
            notes: None,
        }
    }

    fn section(id: &str, body: &str, h3: &[(&str, &str)]) -> SectionDraft {
        SectionDraft {
            h2_id: id.into(),
            h2: format!("Heading {}", id),
            body: body.into(),
            h3_blocks: h3
                .iter()
                .map(|(hid, b)| SectionH3Draft {
                    id: hid.to_string(),
                    h3: format!("Sub {}", hid),
                    body: b.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn assemble_embeds_ids_and_single_trailing_newline() {
        let plan = plan(vec![outline_item("h2-1", &["h3-1-1"])]);
        let sections = vec![section("h2-1", "body text", &[("h3-1-1", "sub body")])];
        let md = assemble_markdown(&plan, &sections);
        assert!(md.contains("## Heading h2-1 <!-- id:h2-1 -->"));
        assert!(md.contains("### Sub h3-1-1 <!-- id:h3-1-1 -->"));
        assert!(md.ends_with('\n'));
        assert!(!md.ends_with("\n\n"));
    }

    #[test]
    fn assemble_skips_plan_items_without_sections() {
        let plan = plan(vec![outline_item("h2-1", &[]), outline_item("h2-2", &[])]);
        let sections = vec![section("h2-2", "only this one", &[])];
        let md = assemble_markdown(&plan, &sections);
        assert!(!md.contains("id:h2-1"));
        assert!(md.contains("id:h2-2"));
    }

    #[test]
    fn assemble_preserves_plan_order() {
        let plan = plan(vec![outline_item("h2-1", &[]), outline_item("h2-2", &[])]);
        // Sections supplied out of order; plan order wins.
        let sections = vec![section("h2-2", "second", &[]), section("h2-1", "first", &[])];
        let md = assemble_markdown(&plan, &sections);
        let pos1 = md.find("id:h2-1").unwrap();
        let pos2 = md.find("id:h2-2").unwrap();
        assert!(pos1 < pos2);
    }

    #[test]
    fn extract_returns_lengths_in_document_order() {
        let plan = plan(vec![outline_item("h2-1", &["h3-1-1"]), outline_item("h2-2", &[])]);
        let sections = vec![
            section("h2-1", &"a".repeat(300), &[("h3-1-1", &"b".repeat(120))]),
            section("h2-2", &"c".repeat(350), &[]),
        ];
        let md = assemble_markdown(&plan, &sections);
        let (h2, h3) = extract_body_lengths(&md);

        assert_eq!(h2.len(), 2);
        assert_eq!(h2[0].0, "h2-1");
        assert_eq!(h2[1].0, "h2-2");
        // The level-1 length includes nested level-2 body text.
        assert_eq!(h2[0].1, 420);
        assert_eq!(h2[1].1, 350);

        assert_eq!(h3, vec![("h3-1-1".to_string(), 120)]);
    }

    #[test]
    fn round_trip_never_shrinks_sections() {
        let n = 5;
        let len = 310;
        let items: Vec<OutlineItem> =
            (1..=n).map(|i| outline_item(&format!("h2-{}", i), &[])).collect();
        let sections: Vec<SectionDraft> = (1..=n)
            .map(|i| section(&format!("h2-{}", i), &"x".repeat(len), &[]))
            .collect();
        let md = assemble_markdown(&plan(items), &sections);
        let (h2, _) = extract_body_lengths(&md);
        assert_eq!(h2.len(), n);
        for (_, l) in h2 {
            assert!(l >= len);
        }
    }

    #[test]
    fn lengths_are_code_points_not_bytes() {
        let plan = plan(vec![outline_item("h2-1", &[])]);
        let body = "あいうえお"; // 5 code points, 15 bytes
        let sections = vec![section("h2-1", body, &[])];
        let md = assemble_markdown(&plan, &sections);
        let (h2, _) = extract_body_lengths(&md);
        assert_eq!(h2[0].1, 5);
    }

    #[test]
    fn blank_lines_do_not_count() {
        let md = "## A <!-- id:h2-1 -->\nabc\n\ndef\n";
        let (h2, _) = extract_body_lengths(md);
        assert_eq!(h2, vec![("h2-1".to_string(), 6)]);
    }

    #[test]
    fn unreached_plan_ids_are_absent_from_scan() {
        let md = "## A <!-- id:h2-1 -->\nbody\n";
        let (h2, h3) = extract_body_lengths(md);
        assert_eq!(h2.len(), 1);
        assert!(h3.is_empty());
    }
}
