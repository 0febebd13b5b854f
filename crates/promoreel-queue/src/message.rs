//! Stream message carrying a job reference.

use serde::{Deserialize, Serialize};

use promoreel_models::JobId;

/// Work item placed on the jobs stream. The job document itself lives in
/// the job store; the message only names it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
}

impl JobMessage {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}
