//! Process-wide quality metrics, aggregated per category. Writes are atomic
//! per category; readers may observe eventually-consistent aggregates across
//! categories.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Data-quality dimension a schema check or business rule scores against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityCategory {
    Accuracy,
    Completeness,
    Consistency,
    Timeliness,
    Validity,
}

impl QualityCategory {
    pub const ALL: [QualityCategory; 5] = [
        QualityCategory::Accuracy,
        QualityCategory::Completeness,
        QualityCategory::Consistency,
        QualityCategory::Timeliness,
        QualityCategory::Validity,
    ];
}

impl fmt::Display for QualityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityCategory::Accuracy => write!(f, "accuracy"),
            QualityCategory::Completeness => write!(f, "completeness"),
            QualityCategory::Consistency => write!(f, "consistency"),
            QualityCategory::Timeliness => write!(f, "timeliness"),
            QualityCategory::Validity => write!(f, "validity"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub passed: u64,
    pub failed: u64,
}

impl CategoryCounts {
    pub fn rejection_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            return 0.0;
        }
        self.failed as f64 / total as f64
    }
}

/// Shared counter store the quality gate reports into. One handle is shared
/// by all pipelines in the process.
#[derive(Default)]
pub struct QualityMetrics {
    counts: RwLock<HashMap<QualityCategory, CategoryCounts>>,
}

impl QualityMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, category: QualityCategory, passed: bool) {
        let mut counts = self.counts.write();
        let entry = counts.entry(category).or_default();
        if passed {
            entry.passed += 1;
        } else {
            entry.failed += 1;
        }
    }

    pub fn snapshot(&self) -> HashMap<QualityCategory, CategoryCounts> {
        self.counts.read().clone()
    }

    pub fn rejection_rate(&self, category: QualityCategory) -> f64 {
        self.counts
            .read()
            .get(&category)
            .copied()
            .unwrap_or_default()
            .rejection_rate()
    }

    /// Human-readable per-category summary for operators.
    pub fn report(&self) -> String {
        let counts = self.counts.read();
        let mut out = String::from("quality metrics:\n");
        for category in QualityCategory::ALL {
            let c = counts.get(&category).copied().unwrap_or_default();
            out.push_str(&format!(
                "  {category}: passed={} failed={} rejection_rate={:.2}%\n",
                c.passed,
                c.failed,
                c.rejection_rate() * 100.0
            ));
        }
        out
    }
}
