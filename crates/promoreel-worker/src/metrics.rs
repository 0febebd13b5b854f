//! Job and stage metrics.

use metrics::{counter, histogram};

use promoreel_models::Stage;

pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "promoreel_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "promoreel_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "promoreel_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "promoreel_job_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "promoreel_stage_duration_seconds";
    pub const CHECKPOINT_HITS_TOTAL: &str = "promoreel_checkpoint_hits_total";
    pub const CLIPS_GENERATED_TOTAL: &str = "promoreel_clips_generated_total";
    pub const ENHANCEMENTS_DEGRADED_TOTAL: &str = "promoreel_enhancements_degraded_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

pub fn record_job_failed(stage: Option<Stage>) {
    let labels = [("stage", stage.map(|s| s.as_str()).unwrap_or("unknown").to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// A paid call avoided because its result was already checkpointed.
pub fn record_checkpoint_hit(stage: Stage) {
    let labels = [("stage", stage.as_str().to_string())];
    counter!(names::CHECKPOINT_HITS_TOTAL, &labels).increment(1);
}

pub fn record_clip_generated(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(names::CLIPS_GENERATED_TOTAL, &labels).increment(1);
}

pub fn record_enhancements_degraded(count: u64) {
    counter!(names::ENHANCEMENTS_DEGRADED_TOTAL).increment(count);
}
