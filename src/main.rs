use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use wp_draftbot::batch::run_batch_job;
use wp_draftbot::config;
use wp_draftbot::llm::OpenAiClient;
use wp_draftbot::model::BatchBrief;
use wp_draftbot::orchestrator::DraftOrchestrator;
use wp_draftbot::ports::JobStorePort;
use wp_draftbot::prompts::PromptRenderer;
use wp_draftbot::publisher::WordPressClient;
use wp_draftbot::site::DefaultSiteAdapter;
use wp_draftbot::store::InMemoryJobStore;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Topic shared by the whole batch
    #[arg(long)]
    topic: String,

    /// Target site label passed into prompts
    #[arg(long, default_value = "blog")]
    site: String,

    /// Number of articles to plan and draft
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Audience description
    #[arg(long)]
    audience: Option<String>,

    /// Purpose / search intent description
    #[arg(long)]
    purpose: Option<String>,

    /// Main keyword the batch should center on
    #[arg(long)]
    main_keyword: Option<String>,

    /// Additional keywords (repeatable)
    #[arg(long)]
    sub_keyword: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let prompt_renderer: Arc<PromptRenderer> = match &cfg.prompts.template_path {
        Some(path) => Arc::new(PromptRenderer::from_file(std::path::Path::new(path))?),
        None => Arc::new(PromptRenderer::new()),
    };
    let site_adapter = Arc::new(DefaultSiteAdapter::new());
    let llm = Arc::new(OpenAiClient::new(
        &cfg.model.api_base_url,
        &cfg.model.api_key,
        &cfg.model.name,
    ));
    let orchestrator = Arc::new(
        DraftOrchestrator::new(llm, prompt_renderer, site_adapter.clone())
            .with_soft_qc_retries(cfg.app.soft_qc_retries),
    );
    let publisher = Arc::new(
        WordPressClient::new(
            &cfg.wordpress.base_url,
            &cfg.wordpress.username,
            &cfg.wordpress.app_password,
            site_adapter,
        )
        .with_timeout(Duration::from_secs(cfg.wordpress.timeout_secs))
        .with_retry_policy(cfg.wordpress.max_retries, cfg.wordpress.backoff_base_secs)
        .with_markdown_conversion(cfg.wordpress.convert_markdown),
    );
    let job_store = Arc::new(InMemoryJobStore::new());

    let brief = BatchBrief {
        topic: args.topic,
        target_site: args.site,
        desired_count: args.count,
        audience: args.audience,
        purpose: args.purpose,
        constraints: Some(serde_json::json!({
            "main_keyword": args.main_keyword,
            "sub_keywords": args.sub_keyword,
        })),
    };

    let job_id = uuid::Uuid::new_v4().to_string();
    info!(%job_id, count = brief.desired_count, "starting batch job");

    let worker_store = job_store.clone();
    let worker_id = job_id.clone();
    let handle = tokio::spawn(async move {
        run_batch_job(
            &worker_id,
            &brief,
            &orchestrator,
            publisher.as_ref(),
            worker_store.as_ref(),
        )
        .await
    });

    // Progress poller; logs are append-only so printing from the last seen
    // index never drops or repeats a line.
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);
    let mut printed = 0usize;
    loop {
        if let Some(job) = job_store.get(&job_id) {
            for line in &job.logs[printed..] {
                println!("{}", line);
            }
            printed = job.logs.len();
            if job.status.is_terminal() {
                println!(
                    "Job {}: {} ({}/{} items, {} published)",
                    job.job_id,
                    job.status.as_str(),
                    job.current,
                    job.total,
                    job.results.iter().filter(|r| r.wp_ok).count()
                );
                break;
            }
        }
        tokio::time::sleep(poll_sleep).await;
    }

    handle.await?;
    Ok(())
}
