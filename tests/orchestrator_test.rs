use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use wp_draftbot::model::ArticleBrief;
use wp_draftbot::orchestrator::{DraftOrchestrator, DraftOutcome};
use wp_draftbot::ports::{LlmPort, PlanContext};
use wp_draftbot::prompts::PromptRenderer;
use wp_draftbot::site::DefaultSiteAdapter;

#[derive(Debug, Clone)]
struct LlmCall {
    prompt: String,
    temperature: f32,
}

/// Scripted language model: pops one canned response per call and records
/// every prompt it saw.
#[derive(Clone, Default)]
struct ScriptedLlm {
    responses: Arc<Mutex<VecDeque<Result<String>>>>,
    calls: Arc<Mutex<Vec<LlmCall>>>,
}

impl ScriptedLlm {
    fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().await.clone()
    }

    async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait::async_trait]
impl LlmPort for ScriptedLlm {
    async fn complete(&self, prompt: &str, temperature: f32, _: Option<u32>) -> Result<String> {
        self.calls.lock().await.push(LlmCall {
            prompt: prompt.to_string(),
            temperature,
        });
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted response left")))
    }
}

fn orchestrator_with(llm: &ScriptedLlm) -> DraftOrchestrator {
    DraftOrchestrator::new(
        Arc::new(llm.clone()),
        Arc::new(PromptRenderer::new()),
        Arc::new(DefaultSiteAdapter::new()),
    )
}

fn brief() -> ArticleBrief {
    ArticleBrief {
        topic: "async runtimes".into(),
        target_site: "devblog".into(),
        seed_title: None,
        audience: None,
        purpose: None,
        constraints: None,
    }
}

fn meta_description() -> String {
    "m".repeat(100)
}

/// Plan with `n` top-level sections, each optionally carrying one sub-heading.
fn plan_json(n: usize, with_h3: bool) -> String {
    let outline: Vec<_> = (1..=n)
        .map(|i| {
            let h3 = if with_h3 {
                json!([{"id": format!("h3-{}-1", i), "h3": format!("Sub {}", i)}])
            } else {
                json!([])
            };
            json!({
                "id": format!("h2-{}", i),
                "h2": format!("Heading {}", i),
                "intent": "explain",
                "h3": h3,
            })
        })
        .collect();
    json!({
        "title": "Async Runtimes",
        "slug": "Async Runtimes!",
        "meta_description": meta_description(),
        "outline": outline,
        "tags_suggestions": ["rust"],
    })
    .to_string()
}

fn section_json(i: usize, body_len: usize, h3_body_len: Option<usize>) -> String {
    let h3_blocks = match h3_body_len {
        Some(len) => json!([{
            "id": format!("h3-{}-1", i),
            "h3": format!("Sub {}", i),
            "body": "y".repeat(len),
        }]),
        None => json!([]),
    };
    json!({
        "h2_id": format!("h2-{}", i),
        "h2": format!("Heading {}", i),
        "body": "x".repeat(body_len),
        "h3_blocks": h3_blocks,
    })
    .to_string()
}

#[tokio::test]
async fn clean_pipeline_is_accepted_with_faq() {
    let mut responses: Vec<Result<String>> = vec![Ok(plan_json(4, false))];
    responses.extend((1..=4).map(|i| Ok(section_json(i, 350, None))));
    responses.push(Ok(json!({"faq": [
        {"question": "Q1", "answer": "A1"},
        {"question": "Q2", "answer": "A2"},
    ]})
    .to_string()));

    let llm = ScriptedLlm::with_responses(responses);
    let orch = orchestrator_with(&llm);

    let outcome = orch.produce_draft(&brief(), &PlanContext::default()).await.unwrap();
    let (draft, report) = match outcome {
        DraftOutcome::Accepted { draft, report } => (draft, report),
        DraftOutcome::Escalated { report, .. } => {
            panic!("expected acceptance, got escalation: {:?}", report.issues)
        }
    };

    assert!(!report.hard_failed);
    assert!(!report.soft_failed);
    assert_eq!(draft.faq.len(), 2);
    assert_eq!(draft.slug, "async-runtimes");
    assert!(draft.markdown.ends_with('\n'));
    assert_eq!(draft.quality_self_check.as_ref().unwrap().h2_count, 4);
    assert_eq!(llm.remaining().await, 0);

    // Plan at low temperature, sections at the creative one.
    let calls = llm.calls().await;
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[0].temperature, 0.2);
    assert_eq!(calls[1].temperature, 0.7);
    // Later section prompts list the earlier headings.
    assert!(calls[4].prompt.contains("Heading 1"));
}

#[tokio::test]
async fn hard_qc_failure_escalates_without_revision_calls() {
    let mut responses: Vec<Result<String>> = vec![Ok(plan_json(4, false))];
    responses.push(Ok(section_json(1, 350, None)));
    responses.push(Ok(section_json(2, 100, None))); // far below the body floor
    responses.push(Ok(section_json(3, 350, None)));
    responses.push(Ok(section_json(4, 350, None)));

    let llm = ScriptedLlm::with_responses(responses);
    let orch = orchestrator_with(&llm);

    let outcome = orch.produce_draft(&brief(), &PlanContext::default()).await.unwrap();
    let request = match outcome {
        DraftOutcome::Escalated { report, request, .. } => {
            assert!(report.hard_failed);
            request
        }
        DraftOutcome::Accepted { .. } => panic!("expected escalation"),
    };

    assert!(request.hard_fail);
    assert_eq!(request.sections_to_regenerate, vec!["h2-2".to_string()]);
    assert!(!request.reasons.is_empty());
    // No soft QC, revise or FAQ calls after a hard failure.
    assert_eq!(llm.calls().await.len(), 5);
}

#[tokio::test]
async fn soft_revision_loop_is_bounded() {
    // Sub-heading bodies sit in the soft band and every revision keeps them
    // there, so only the retry budget can end the loop.
    let soft_qc = json!({
        "fix_targets": ["h2-1"],
        "fix_instructions": {"h2-1": "expand the sub-section"},
        "overall_notes": "thin"
    })
    .to_string();
    let revise = json!({
        "sections": [serde_json::from_str::<serde_json::Value>(&section_json(1, 350, Some(100))).unwrap()]
    })
    .to_string();

    let mut responses: Vec<Result<String>> = vec![Ok(plan_json(4, true))];
    responses.extend((1..=4).map(|i| Ok(section_json(i, 350, Some(100)))));
    responses.push(Ok(soft_qc.clone()));
    responses.push(Ok(revise.clone()));
    responses.push(Ok(soft_qc));
    responses.push(Ok(revise));
    responses.push(Ok(json!({"faq": []}).to_string()));

    let llm = ScriptedLlm::with_responses(responses);
    let orch = orchestrator_with(&llm);

    let outcome = orch.produce_draft(&brief(), &PlanContext::default()).await.unwrap();
    match outcome {
        DraftOutcome::Escalated { report, request, .. } => {
            assert!(!report.hard_failed);
            assert!(report.soft_failed);
            assert!(!request.hard_fail);
            assert!(request
                .reasons
                .iter()
                .any(|r| r.contains("reviewer")));
        }
        DraftOutcome::Accepted { .. } => panic!("expected soft escalation"),
    }

    // plan + 4 sections + 2 * (soft qc + revise) + faq, then the loop stops.
    assert_eq!(llm.calls().await.len(), 10);
    assert_eq!(llm.remaining().await, 0);
}

#[tokio::test]
async fn malformed_soft_qc_json_degrades_and_ends_loop() {
    let mut responses: Vec<Result<String>> = vec![Ok(plan_json(4, true))];
    responses.extend((1..=4).map(|i| Ok(section_json(i, 350, Some(100)))));
    responses.push(Ok("this is not JSON".to_string()));
    responses.push(Ok(json!({"faq": []}).to_string()));

    let llm = ScriptedLlm::with_responses(responses);
    let orch = orchestrator_with(&llm);

    // Empty advice ends the loop; the draft still goes through FAQ and the
    // final gate instead of erroring out.
    let outcome = orch.produce_draft(&brief(), &PlanContext::default()).await.unwrap();
    assert!(matches!(outcome, DraftOutcome::Escalated { .. }));
    assert_eq!(llm.calls().await.len(), 7);
}

#[tokio::test]
async fn malformed_section_response_is_an_error() {
    let responses: Vec<Result<String>> =
        vec![Ok(plan_json(4, false)), Ok("not a section".to_string())];
    let llm = ScriptedLlm::with_responses(responses);
    let orch = orchestrator_with(&llm);

    let err = orch
        .produce_draft(&brief(), &PlanContext::default())
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("h2-1"));
}

#[tokio::test]
async fn plan_prompt_carries_overlap_context() {
    let llm = ScriptedLlm::with_responses(vec![Err(anyhow!("stop here"))]);
    let orch = orchestrator_with(&llm);
    let ctx = PlanContext {
        existing_titles: vec!["Blocking IO in Depth".into()],
        existing_angles: vec!["beginner tutorial".into()],
        existing_avoid: vec!["runtime benchmarks".into()],
    };

    let _ = orch.produce_draft(&brief(), &ctx).await;

    let calls = llm.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].prompt.contains("Blocking IO in Depth"));
    assert!(calls[0].prompt.contains("runtime benchmarks"));
}
