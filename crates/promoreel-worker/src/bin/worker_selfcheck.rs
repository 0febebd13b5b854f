use std::path::Path;

use promoreel_media::check_ffmpeg;
use promoreel_worker::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.worker.work_dir.display()
    );
    ensure_dir(&config.worker.work_dir).await?;
    ensure_dir(&config.local_storage.root).await?;

    let ffmpeg = check_ffmpeg().map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;
    println!("worker-selfcheck: ffmpeg at {}", ffmpeg.display());

    ensure_env_present(&["REDIS_URL"])?;
    ensure_redis(&config.queue.redis_url).await?;

    if !config.providers.music_dir.is_dir() {
        println!(
            "worker-selfcheck: warning: music directory {} missing, videos will have no music",
            config.providers.music_dir.display()
        );
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))
}

async fn ensure_redis(url: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    anyhow::ensure!(pong == "PONG", "unexpected PING reply: {}", pong);
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
