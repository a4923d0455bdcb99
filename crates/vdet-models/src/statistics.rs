//! Per-class detection statistics.

use serde::{Deserialize, Serialize};

/// Summary of every detection of one class over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    #[serde(rename = "class")]
    pub class_name: String,
    pub count: u64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// First timestamp (seconds) the class was seen
    pub first_seen: f64,
    /// Last timestamp (seconds) the class was seen
    pub last_seen: f64,
}

impl ClassStatistics {
    /// Seconds between the first and last sighting.
    pub fn visible_span(&self) -> f64 {
        (self.last_seen - self.first_seen).max(0.0)
    }

    /// Timeline line shown next to the table, e.g. `person: 0.0s → 4.5s`.
    pub fn timeline_label(&self) -> String {
        format!(
            "{}: {:.1}s → {:.1}s",
            self.class_name, self.first_seen, self.last_seen
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_label() {
        let stats = ClassStatistics {
            class_name: "dog".into(),
            count: 3,
            avg_confidence: 0.7,
            min_confidence: 0.6,
            max_confidence: 0.8,
            first_seen: 1.5,
            last_seen: 4.5,
        };
        assert_eq!(stats.timeline_label(), "dog: 1.5s → 4.5s");
        assert!((stats.visible_span() - 3.0).abs() < 1e-9);
    }
}
