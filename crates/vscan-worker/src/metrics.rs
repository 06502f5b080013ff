//! Pipeline metrics.

use std::time::Duration;

use vscan_models::{OverallStatus, StageKind, StageStatus};

pub const STAGE_RUNS_TOTAL: &str = "vscan_stage_runs_total";
pub const STAGE_DURATION_SECONDS: &str = "vscan_stage_duration_seconds";
pub const PIPELINE_RUNS_TOTAL: &str = "vscan_pipeline_runs_total";
pub const PIPELINE_DURATION_SECONDS: &str = "vscan_pipeline_duration_seconds";
pub const JOBS_DEAD_LETTERED_TOTAL: &str = "vscan_jobs_dead_lettered_total";
pub const TRANSCRIBER_LOADS_TOTAL: &str = "vscan_transcriber_loads_total";

pub fn record_stage(stage: StageKind, status: StageStatus, elapsed: Duration) {
    metrics::counter!(
        STAGE_RUNS_TOTAL,
        "stage" => stage.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
    metrics::histogram!(STAGE_DURATION_SECONDS, "stage" => stage.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_run(mode: &'static str, status: OverallStatus, elapsed: Duration) {
    metrics::counter!(PIPELINE_RUNS_TOTAL, "mode" => mode, "status" => status.as_str()).increment(1);
    metrics::histogram!(PIPELINE_DURATION_SECONDS, "mode" => mode).record(elapsed.as_secs_f64());
}

pub fn record_dead_letter() {
    metrics::counter!(JOBS_DEAD_LETTERED_TOTAL).increment(1);
}

pub fn record_transcriber_load(ok: bool) {
    metrics::counter!(TRANSCRIBER_LOADS_TOTAL, "result" => if ok { "ok" } else { "error" })
        .increment(1);
}
