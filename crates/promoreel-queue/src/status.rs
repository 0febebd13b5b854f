//! Job status updates via Redis Pub/Sub.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use promoreel_models::{JobId, JobStatusDocument};

use crate::error::QueueResult;
use crate::keys;

/// Subscriber for the status documents published on every job commit.
pub struct StatusChannel {
    client: redis::Client,
}

impl StatusChannel {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Stream of status documents for one job. Undecodable payloads are skipped.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<Pin<Box<dyn Stream<Item = JobStatusDocument> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(keys::status_channel(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}
