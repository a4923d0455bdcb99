//! Per-class statistics over the detection log.

use std::collections::BTreeMap;

use vdet_models::{ClassStatistics, DetectionLogEntry};

/// Aggregate the detection log by class.
///
/// Pure and order-independent: confidences are summed in sorted order, so
/// any permutation of `log` yields bit-identical results. An empty log
/// yields an empty map.
pub fn summarize(log: &[DetectionLogEntry]) -> BTreeMap<String, ClassStatistics> {
    let mut by_class: BTreeMap<&str, Vec<&DetectionLogEntry>> = BTreeMap::new();
    for entry in log {
        by_class.entry(entry.class_name.as_str()).or_default().push(entry);
    }

    by_class
        .into_iter()
        .map(|(class_name, entries)| (class_name.to_string(), class_statistics(class_name, &entries)))
        .collect()
}

fn class_statistics(class_name: &str, entries: &[&DetectionLogEntry]) -> ClassStatistics {
    let mut confidences: Vec<f64> = entries.iter().map(|e| f64::from(e.confidence)).collect();
    confidences.sort_by(f64::total_cmp);

    let count = confidences.len() as u64;
    let sum: f64 = confidences.iter().sum();
    let min_confidence = confidences.first().copied().unwrap_or(0.0);
    let max_confidence = confidences.last().copied().unwrap_or(0.0);

    let first_seen = entries.iter().map(|e| e.time).fold(f64::INFINITY, f64::min);
    let last_seen = entries.iter().map(|e| e.time).fold(f64::NEG_INFINITY, f64::max);

    ClassStatistics {
        class_name: class_name.to_string(),
        count,
        avg_confidence: if count > 0 { sum / count as f64 } else { 0.0 },
        min_confidence,
        max_confidence,
        first_seen,
        last_seen,
    }
}

/// Total number of detections across all classes.
pub fn total_count(stats: &BTreeMap<String, ClassStatistics>) -> u64 {
    stats.values().map(|s| s.count).sum()
}
