use std::sync::LazyLock;

use prometheus::*;

use crate::scan::ScanReport;

static METRIC_SCAN_MEDIA: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "media_scan_media_count",
        "count of media changes applied by scans",
        &["change"]
    )
    .unwrap()
});

static METRIC_SCAN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("media_scan_duration", "duration of the full scan in seconds").unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "media_search_duration",
        "duration of the per-query search in seconds",
        &["kind"]
    )
    .unwrap()
});

static METRIC_UNRESOLVED_HITS: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "media_search_unresolved_hits",
        "count of search hits whose metadata row no longer exists"
    )
    .unwrap()
});

/// 记录一次扫描的结果
pub fn observe_scan(report: &ScanReport, duration: f32) {
    METRIC_SCAN_MEDIA.with_label_values(&["new"]).inc_by(report.new as u64);
    METRIC_SCAN_MEDIA.with_label_values(&["updated"]).inc_by(report.updated as u64);
    METRIC_SCAN_MEDIA.with_label_values(&["deleted"]).inc_by(report.deleted as u64);
    METRIC_SCAN_MEDIA.with_label_values(&["skipped"]).inc_by(report.skipped as u64);
    METRIC_SCAN_DURATION.observe(duration as f64);
}

pub fn observe_search(kind: &str, duration: f32) {
    METRIC_SEARCH_DURATION.with_label_values(&[kind]).observe(duration as f64);
}

pub fn inc_unresolved_hits(count: usize) {
    METRIC_UNRESOLVED_HITS.inc_by(count as u64);
}

/// 以 prometheus 文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}
