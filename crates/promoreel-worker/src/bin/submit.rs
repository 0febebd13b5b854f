//! Create, resubmit or watch jobs from the command line.
//!
//! ```text
//! promoreel-submit create <owner_id> <request.json>
//! promoreel-submit resubmit <job_id>
//! promoreel-submit watch <job_id>
//! ```

use anyhow::{bail, Context};
use futures::StreamExt;

use promoreel_models::{JobId, NewJobRequest};
use promoreel_queue::{JobQueue, QueueConfig, RedisJobStore, StatusChannel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = QueueConfig::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create", owner, path] => create(&config, owner, path).await,
        ["resubmit", job_id] => resubmit(&config, JobId::from_string(*job_id)).await,
        ["watch", job_id] => watch(&config, JobId::from_string(*job_id)).await,
        _ => bail!(
            "usage: promoreel-submit create <owner_id> <request.json> | resubmit <job_id> | watch <job_id>"
        ),
    }
}

async fn create(config: &QueueConfig, owner: &str, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {path}"))?;
    let request: NewJobRequest = serde_json::from_str(&raw).context("parsing job request")?;
    let job = request.into_job(owner).context("invalid job request")?;

    let store = RedisJobStore::new(&config.redis_url)?;
    store.create(&job).await?;

    let queue = JobQueue::new(config.clone())?;
    queue.init().await?;
    queue.enqueue(&job.id).await?;

    println!("{}", job.id);
    Ok(())
}

async fn resubmit(config: &QueueConfig, job_id: JobId) -> anyhow::Result<()> {
    let store = RedisJobStore::new(&config.redis_url)?;
    let mut job = store.load(&job_id).await?;
    job.resubmit()?;
    store.commit(&mut job).await?;

    let queue = JobQueue::new(config.clone())?;
    queue.init().await?;
    queue.enqueue(&job.id).await?;

    println!("{} resubmitted at {}%", job.id, job.progress);
    Ok(())
}

async fn watch(config: &QueueConfig, job_id: JobId) -> anyhow::Result<()> {
    let channel = StatusChannel::new(&config.redis_url)?;
    let mut updates = channel.subscribe(&job_id).await?;

    while let Some(doc) = updates.next().await {
        println!("{}", serde_json::to_string(&doc)?);
        if doc.status.is_terminal() {
            break;
        }
    }
    Ok(())
}
