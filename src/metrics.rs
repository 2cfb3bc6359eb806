use std::sync::LazyLock;
use std::time::Duration;

use prometheus::*;

static METRIC_DECISION_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "dejaview_decision_count",
        "count of the decisions by status and method",
        &["status", "method"]
    )
    .unwrap()
});

static METRIC_CHECK_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "dejaview_check_duration",
        "duration of the per-image check in seconds",
        &["status"]
    )
    .unwrap()
});

static METRIC_MATCH_SIMILARITY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "dejaview_match_similarity",
        "similarity percentage of the matched image",
        &["method"],
        (5..=100).step_by(5).map(|x| x as f64).collect()
    )
    .unwrap()
});

static METRIC_INGEST_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("dejaview_ingest_count", "count of the ingested images", &["result"])
        .unwrap()
});

/// 记录一次检查的结果
pub fn observe_decision(status: &str, method: Option<&str>, similarity: f64, elapsed: Duration) {
    let method = method.unwrap_or("none");
    METRIC_DECISION_COUNT.with_label_values(&[status, method]).inc();
    METRIC_CHECK_DURATION.with_label_values(&[status]).observe(elapsed.as_secs_f64());
    if similarity > 0. {
        METRIC_MATCH_SIMILARITY.with_label_values(&[method]).observe(similarity);
    }
}

pub fn inc_ingest(ok: bool) {
    let result = if ok { "ok" } else { "failed" };
    METRIC_INGEST_COUNT.with_label_values(&[result]).inc();
}

/// 以文本格式导出所有指标
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    encoder.encode_to_string(&gather()).unwrap_or_else(|e| format!("# {e}\n"))
}
