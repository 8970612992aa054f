use std::sync::LazyLock;

use prometheus::*;

static METRIC_TASK_SUBMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("papyrus_task_submitted", "count of the submitted retrieval tasks")
        .unwrap()
});

static METRIC_STAGE_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "papyrus_stage_finished",
        "count of the finished task stages",
        &["stage", "outcome"]
    )
    .unwrap()
});

static METRIC_STAGE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "papyrus_stage_duration",
        "duration of the per-stage execution in seconds",
        &["stage"]
    )
    .unwrap()
});

static METRIC_KNN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("papyrus_knn_duration", "duration of the k-nearest query in seconds")
        .unwrap()
});

pub fn inc_task_submitted() {
    METRIC_TASK_SUBMITTED.inc();
}

/// 记录一个阶段的执行结果和耗时
pub fn observe_stage(stage: &str, success: bool, duration: f64) {
    let outcome = if success { "success" } else { "failure" };
    METRIC_STAGE_FINISHED.with_label_values(&[stage, outcome]).inc();
    METRIC_STAGE_DURATION.with_label_values(&[stage]).observe(duration);
}

pub fn observe_knn_duration(duration: f64) {
    METRIC_KNN_DURATION.observe(duration);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&prometheus::gather()).unwrap_or_default()
}
