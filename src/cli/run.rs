//! Run command: drive a prompt file through the queue with a simulated
//! processor and print the final status.
//!
//! Useful for sizing thresholds before pointing a real processor at an API:
//! the simulated call sleeps for `--latency-ms` and reports a plausible
//! token count.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::info;

use ratequeue::batch::{
    load_prompts, pack_batches, track_prompts, EmbeddingsBatch, MAX_EMBEDDING_BATCH_TOKENS,
};
use ratequeue::config::{Profile, QueueConfig};
use ratequeue::queue::{processor_fn, ProcessReport, StatusFormat, Task, TaskQueue};
use ratequeue::utils::tokens::{estimate_chat_tokens, estimate_tokens};

/// Options for `ratequeue run`.
pub(crate) struct RunArgs {
    pub file: PathBuf,
    pub profile: String,
    pub config: Option<PathBuf>,
    pub model: Option<String>,
    pub latency_ms: u64,
    pub max_tokens: u64,
    pub format: StatusFormat,
}

pub(crate) async fn cmd_run(args: RunArgs) -> Result<()> {
    let profile = super::parse_profile(&args.profile)?;
    let config = super::resolve_config(profile, args.config.as_deref())?;
    let prompts = load_prompts(&args.file)
        .with_context(|| format!("Failed to load prompts from {}", args.file.display()))?;
    let latency = Duration::from_millis(args.latency_ms);

    info!(
        prompts = prompts.len(),
        profile = ?profile,
        "Running prompts through the queue"
    );

    let report = match profile {
        Profile::ChatCompletion => {
            let model = args.model.unwrap_or_else(|| "gpt-3.5-turbo".to_string());
            run_chat(config, &model, prompts, args.max_tokens, latency).await?
        }
        Profile::Embeddings => {
            let model = args
                .model
                .unwrap_or_else(|| "text-embedding-ada-002".to_string());
            run_embeddings(config, &model, prompts, latency).await?
        }
    };

    println!("{}", report.status.render(args.format));
    if report.errored > 0 {
        eprintln!(
            "{} of {} tasks failed",
            report.errored,
            report.dispatched.len()
        );
    }
    Ok(())
}

async fn run_chat(
    config: QueueConfig,
    model: &str,
    prompts: Vec<String>,
    max_tokens: u64,
    latency: Duration,
) -> Result<ProcessReport> {
    let queue = TaskQueue::new(config)?;
    for prompt in prompts {
        let estimate = estimate_chat_tokens(&[prompt.as_str()], max_tokens);
        queue.submit(model, prompt, estimate)?;
    }

    let report = queue
        .process(processor_fn(move |task: Task<String>| async move {
            tokio::time::sleep(latency).await;
            let completion = rand::thread_rng().gen_range(0..=max_tokens);
            let measured = estimate_tokens(&task.payload) + completion;
            Ok(task.complete_with(measured))
        }))
        .await;
    Ok(report)
}

async fn run_embeddings(
    config: QueueConfig,
    model: &str,
    prompts: Vec<String>,
    latency: Duration,
) -> Result<ProcessReport> {
    let batches = pack_batches(track_prompts(prompts), MAX_EMBEDDING_BATCH_TOKENS);
    info!(batches = batches.len(), "Packed embedding batches");

    let queue = TaskQueue::new(config)?;
    for batch in batches {
        let estimate = batch.num_tokens;
        queue.submit(model, batch, estimate)?;
    }

    let report = queue
        .process(processor_fn(move |task: Task<EmbeddingsBatch>| async move {
            tokio::time::sleep(latency).await;
            let measured = task.payload.num_tokens;
            Ok(task.complete_with(measured))
        }))
        .await;
    Ok(report)
}
