//! Versioned metric registry with provenance.
//!
//! Every reproducible formula the engine computes -- attribution deltas,
//! skip probabilities, recovery composites, window scores -- is registered
//! under a version. Each computation appends a provenance entry to a
//! bounded ring buffer so any decision can be traced back to its inputs.
//! A version mismatch against persisted provenance triggers a provenance
//! reset, never a silent miscalculation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

/// Capacity of the provenance ring buffer.
pub const PROVENANCE_CAPACITY: usize = 1_000;

/// Version of a metric formula. A major bump means the formula's outputs
/// are not comparable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricVersion {
    pub major: u16,
    pub minor: u16,
}

impl MetricVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse "major.minor".
    pub fn parse(raw: &str) -> Option<Self> {
        let (major, minor) = raw.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    /// Outputs are comparable when the major version matches.
    pub fn is_compatible(&self, other: &MetricVersion) -> bool {
        self.major == other.major
    }
}

impl std::fmt::Display for MetricVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Well-known metric identifiers.
pub mod metric_ids {
    pub const TRUST_ATTRIBUTION: &str = "trust.attribution";
    pub const SKIP_PROBABILITY: &str = "skip.probability";
    pub const RECOVERY_COMPOSITE: &str = "recovery.composite";
    pub const WINDOW_SCORE: &str = "window.score";
}

/// One recorded computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub metric: String,
    pub version: MetricVersion,
    /// Order-sensitive digest of the numeric inputs.
    pub input_digest: u64,
    pub output: f64,
    pub at: DateTime<Utc>,
}

/// Registry of metric versions plus the provenance ring buffer.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    versions: BTreeMap<&'static str, MetricVersion>,
    log: VecDeque<ProvenanceEntry>,
    capacity: usize,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    /// Registry with the engine's current formula versions.
    pub fn new() -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(metric_ids::TRUST_ATTRIBUTION, MetricVersion::new(1, 0));
        versions.insert(metric_ids::SKIP_PROBABILITY, MetricVersion::new(1, 0));
        versions.insert(metric_ids::RECOVERY_COMPOSITE, MetricVersion::new(1, 0));
        versions.insert(metric_ids::WINDOW_SCORE, MetricVersion::new(1, 0));
        Self {
            versions,
            log: VecDeque::with_capacity(PROVENANCE_CAPACITY),
            capacity: PROVENANCE_CAPACITY,
        }
    }

    pub fn version_of(&self, metric: &str) -> Option<MetricVersion> {
        self.versions.get(metric).copied()
    }

    pub fn versions(&self) -> impl Iterator<Item = (&'static str, MetricVersion)> + '_ {
        self.versions.iter().map(|(k, v)| (*k, *v))
    }

    /// Deterministic, order-sensitive digest over numeric inputs
    /// (FNV-1a over the IEEE-754 bits).
    pub fn digest(inputs: &[f64]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for value in inputs {
            for byte in value.to_bits().to_le_bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x1000_0000_01b3);
            }
        }
        hash
    }

    /// Append a provenance entry for a computation of a registered metric.
    /// Unknown metrics are logged and skipped.
    pub fn record(&mut self, metric: &str, inputs: &[f64], output: f64, at: DateTime<Utc>) {
        let Some((id, version)) = self.versions.get_key_value(metric).map(|(k, v)| (*k, *v)) else {
            warn!(metric, "provenance record for unregistered metric skipped");
            return;
        };
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(ProvenanceEntry {
            metric: id.to_string(),
            version,
            input_digest: Self::digest(inputs),
            output,
            at,
        });
    }

    pub fn provenance(&self) -> impl Iterator<Item = &ProvenanceEntry> {
        self.log.iter()
    }

    pub fn provenance_len(&self) -> usize {
        self.log.len()
    }

    /// Restore a persisted provenance log, verifying stored versions.
    ///
    /// If any stored metric's version is incompatible with the current
    /// registry the whole log is discarded and `false` is returned: a
    /// changed formula makes old provenance unreproducible.
    pub fn restore(&mut self, entries: Vec<ProvenanceEntry>) -> bool {
        for entry in &entries {
            match self.versions.get(entry.metric.as_str()) {
                Some(current) if current.is_compatible(&entry.version) => {}
                Some(current) => {
                    warn!(
                        metric = entry.metric,
                        stored = %entry.version,
                        current = %current,
                        "metric version mismatch, provenance reset"
                    );
                    self.log.clear();
                    return false;
                }
                None => {
                    warn!(metric = entry.metric, "unknown stored metric, provenance reset");
                    self.log.clear();
                    return false;
                }
            }
        }
        let skip = entries.len().saturating_sub(self.capacity);
        self.log = entries.into_iter().skip(skip).collect();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap()
    }

    #[test]
    fn test_digest_deterministic_and_order_sensitive() {
        let a = MetricRegistry::digest(&[1.0, 2.0, 3.0]);
        let b = MetricRegistry::digest(&[1.0, 2.0, 3.0]);
        let c = MetricRegistry::digest(&[3.0, 2.0, 1.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let mut registry = MetricRegistry::new();
        for i in 0..(PROVENANCE_CAPACITY + 50) {
            registry.record(metric_ids::SKIP_PROBABILITY, &[i as f64], 0.5, t0());
        }
        assert_eq!(registry.provenance_len(), PROVENANCE_CAPACITY);
        // The oldest entries were dropped.
        let first = registry.provenance().next().unwrap();
        assert_eq!(first.input_digest, MetricRegistry::digest(&[50.0]));
    }

    #[test]
    fn test_unknown_metric_skipped() {
        let mut registry = MetricRegistry::new();
        registry.record("nonsense.metric", &[1.0], 0.0, t0());
        assert_eq!(registry.provenance_len(), 0);
    }

    #[test]
    fn test_restore_compatible() {
        let mut registry = MetricRegistry::new();
        let entries = vec![ProvenanceEntry {
            metric: metric_ids::RECOVERY_COMPOSITE.into(),
            version: MetricVersion::new(1, 3),
            input_digest: 7,
            output: 62.0,
            at: t0(),
        }];
        assert!(registry.restore(entries));
        assert_eq!(registry.provenance_len(), 1);
    }

    #[test]
    fn test_restore_resets_on_major_mismatch() {
        let mut registry = MetricRegistry::new();
        let entries = vec![ProvenanceEntry {
            metric: metric_ids::RECOVERY_COMPOSITE.into(),
            version: MetricVersion::new(2, 0),
            input_digest: 7,
            output: 62.0,
            at: t0(),
        }];
        assert!(!registry.restore(entries));
        assert_eq!(registry.provenance_len(), 0);
    }

    #[test]
    fn test_version_parse_display_round_trip() {
        let version = MetricVersion::new(1, 4);
        assert_eq!(MetricVersion::parse(&version.to_string()), Some(version));
        assert_eq!(MetricVersion::parse("bogus"), None);
    }
}
