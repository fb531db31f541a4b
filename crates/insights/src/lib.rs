//! Learning insights over stored assessment history
//!
//! Pure aggregation and analysis behind the dashboard, the study report,
//! and resource personalization. `curator` orchestrates the cached
//! per-user resource rebuilds shared by the HTTP API and the refresh
//! worker; everything else is side-effect free and unit tested.

pub mod curator;
pub mod patterns;
pub mod progress;
pub mod report;
pub mod resources;

pub use curator::{CuratedResources, LearningAnalysis, ResourceCurator};
pub use patterns::PatternReport;
pub use progress::{build_progress, ProgressReport};
pub use report::PerformanceSnapshot;
pub use resources::{TaggedResource, WeaknessProfile};

/// String items of a jsonb array column, non-strings skipped.
pub(crate) fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
