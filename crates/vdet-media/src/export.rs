//! CSV and JSON exports of detection results.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use vdet_models::{ClassStatistics, Detection, DetectionLogEntry};

use crate::error::MediaResult;

/// Column header of the statistics CSV.
pub const STATS_CSV_HEADER: &str =
    "Class,Count,Avg_Confidence,Min_Confidence,Max_Confidence,First_Seen,Last_Seen";

/// Column header of the single-image detection CSV.
pub const IMAGE_CSV_HEADER: &str = "ID,Class,Confidence,Location";

/// Per-class statistics as CSV, one row per class in key order.
pub fn stats_to_csv(stats: &BTreeMap<String, ClassStatistics>) -> String {
    let mut out = String::from(STATS_CSV_HEADER);
    out.push('\n');
    for s in stats.values() {
        let _ = writeln!(
            out,
            "{},{},{:.2},{:.2},{:.2},{:.1}s,{:.1}s",
            csv_field(&s.class_name),
            s.count,
            s.avg_confidence,
            s.min_confidence,
            s.max_confidence,
            s.first_seen,
            s.last_seen
        );
    }
    out
}

/// Detection log as a pretty-printed JSON array, one record per box.
pub fn detections_to_json(log: &[DetectionLogEntry]) -> MediaResult<String> {
    Ok(serde_json::to_string_pretty(log)?)
}

/// Detections of one image as CSV with 1-based ids.
pub fn image_detections_to_csv(detections: &[Detection]) -> String {
    let mut out = String::from(IMAGE_CSV_HEADER);
    out.push('\n');
    for (i, d) in detections.iter().enumerate() {
        let _ = writeln!(
            out,
            "{},{},{:.2},{}",
            i + 1,
            csv_field(&d.class_name),
            d.confidence,
            csv_field(&d.bbox.location_label())
        );
    }
    out
}

/// Quote a field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
