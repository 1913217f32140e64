use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::foundation::core::Observation;
use crate::foundation::error::{CardError, CardResult};

/// Read-only access to display names and metric series.
///
/// Codes are the upper-case forms produced by the parameter codec: three-letter entity codes in
/// country scope, region codes (`IN-MH`) in region scope.
pub trait SeriesStore: Send + Sync {
    /// Display name of an entity or region.
    fn entity_name(&self, code: &str) -> Option<&str>;

    /// Display name of a metric.
    fn metric_name(&self, metric: &str) -> Option<&str>;

    /// Observations of `metric` for `code`, sorted by year. Empty when unknown.
    fn history(&self, metric: &str, code: &str) -> &[Observation];

    /// Most recent usable observation.
    fn latest(&self, metric: &str, code: &str) -> Option<Observation> {
        self.history(metric, code)
            .iter()
            .copied()
            .filter(|o| o.is_usable())
            .max_by_key(|o| o.year)
    }
}

/// In-memory series table, usually loaded from JSON:
///
/// ```json
/// {
///   "entities": { "IND": "India", "USA": "United States" },
///   "metrics": { "NY_GDP_PCAP_KD": "GDP per capita" },
///   "series": { "NY_GDP_PCAP_KD": { "IND": [{ "year": 2023, "value": 2480.0 }] } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticStore {
    entities: BTreeMap<String, String>,
    metrics: BTreeMap<String, String>,
    series: BTreeMap<String, BTreeMap<String, Vec<Observation>>>,
}

impl StaticStore {
    /// Store with no entities.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a series table from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> CardResult<Self> {
        let raw: Self = serde_json::from_reader(r)
            .map_err(|e| CardError::validation(format!("parse series JSON: {e}")))?;
        Ok(raw.normalized())
    }

    /// Parse a series table from a JSON string.
    pub fn from_json_str(s: &str) -> CardResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse a series table from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> CardResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            CardError::validation(format!("open series JSON '{}': {e}", path.display()))
        })?;
        let store = Self::from_reader(BufReader::new(f))?;
        tracing::info!(
            path = %path.display(),
            entities = store.entities.len(),
            metrics = store.series.len(),
            "series table loaded"
        );
        Ok(store)
    }

    /// Add or replace an entity name.
    pub fn with_entity(mut self, code: &str, name: &str) -> Self {
        self.entities.insert(normalize_code(code), name.to_string());
        self
    }

    /// Add or replace a metric name.
    pub fn with_metric(mut self, metric: &str, name: &str) -> Self {
        self.metrics.insert(normalize_code(metric), name.to_string());
        self
    }

    /// Add or replace a series.
    pub fn with_series(mut self, metric: &str, code: &str, mut points: Vec<Observation>) -> Self {
        points.sort_by_key(|o| o.year);
        self.series
            .entry(normalize_code(metric))
            .or_default()
            .insert(normalize_code(code), points);
        self
    }

    fn normalized(self) -> Self {
        let rekey = |m: BTreeMap<String, String>| {
            m.into_iter()
                .map(|(k, v)| (normalize_code(&k), v))
                .collect::<BTreeMap<_, _>>()
        };
        let series = self
            .series
            .into_iter()
            .map(|(metric, by_code)| {
                let by_code = by_code
                    .into_iter()
                    .map(|(code, mut points)| {
                        points.sort_by_key(|o| o.year);
                        (normalize_code(&code), points)
                    })
                    .collect();
                (normalize_code(&metric), by_code)
            })
            .collect();
        Self {
            entities: rekey(self.entities),
            metrics: rekey(self.metrics),
            series,
        }
    }
}

impl SeriesStore for StaticStore {
    fn entity_name(&self, code: &str) -> Option<&str> {
        self.entities.get(code).map(String::as_str)
    }

    fn metric_name(&self, metric: &str) -> Option<&str> {
        self.metrics.get(metric).map(String::as_str)
    }

    fn history(&self, metric: &str, code: &str) -> &[Observation] {
        self.series
            .get(metric)
            .and_then(|by_code| by_code.get(code))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
#[path = "../../tests/unit/service/store.rs"]
mod tests;
