//! Discrete-value analyzer: counts good/bad label values per pod.

use std::collections::BTreeMap;

use crate::anomaly::prometheus::Sample;
use crate::anomaly::{Verdict, GLOBAL_VERDICT_KEY};
use crate::controller::error::{Error, Result};
use crate::crd::DiscreteValueOutOfListAnalysis;

/// Classifies per-pod sample counts by the configured discrete label.
///
/// Each sample contributes its value as a count of observations carrying
/// `key=<label value>`; observations land in the ok or ko bucket depending
/// on the good/bad value lists.
#[derive(Clone, Debug)]
pub struct DiscreteValueAnalyzer {
    config: DiscreteValueOutOfListAnalysis,
}

impl DiscreteValueAnalyzer {
    pub fn new(config: DiscreteValueOutOfListAnalysis) -> Self {
        Self { config }
    }

    fn is_good_value(&self, value: &str) -> bool {
        if !self.config.good_values.is_empty() {
            self.config.good_values.iter().any(|v| v == value)
        } else {
            !self.config.bad_values.iter().any(|v| v == value)
        }
    }

    /// Accumulate ok/ko counts per pod from the query samples.
    pub fn verdicts(
        &self,
        samples: &[Sample],
        pod_name_key: &str,
        all_pods_query: bool,
    ) -> Result<BTreeMap<String, Verdict>> {
        let mut verdicts: BTreeMap<String, Verdict> = BTreeMap::new();
        for sample in samples {
            let pod = if all_pods_query {
                GLOBAL_VERDICT_KEY.to_string()
            } else {
                match sample.labels.get(pod_name_key) {
                    Some(pod) => pod.clone(),
                    // Sample not bound to a pod: nothing to attribute it to.
                    None => continue,
                }
            };
            let Some(discrete_value) = sample.labels.get(&self.config.key) else {
                continue;
            };
            let count = sample.value.max(0.0).round() as u64;

            let entry = verdicts
                .entry(pod)
                .or_insert(Verdict::Counts { ok: 0, ko: 0 });
            if let Verdict::Counts { ok, ko } = entry {
                if self.is_good_value(discrete_value) {
                    *ok += count;
                } else {
                    *ko += count;
                }
            }
        }
        Ok(verdicts)
    }

    /// A pod is out of bounds when it produced at least one observation and
    /// its bad share exceeds the tolerance percentage.
    pub fn is_out_of_bounds(&self, verdict: &Verdict) -> Result<bool> {
        let Verdict::Counts { ok, ko } = verdict else {
            return Err(Error::MetricQuery(
                "discrete analyzer received a non-count verdict".to_string(),
            ));
        };
        let total = ok + ko;
        if total == 0 {
            return Ok(false);
        }
        Ok((ko * 100) / total > u64::from(self.config.tolerance_percent()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(good: &[&str], bad: &[&str], tolerance: u32) -> DiscreteValueAnalyzer {
        DiscreteValueAnalyzer::new(DiscreteValueOutOfListAnalysis {
            key: "code".to_string(),
            good_values: good.iter().map(|s| s.to_string()).collect(),
            bad_values: bad.iter().map(|s| s.to_string()).collect(),
            tolerance_percent: Some(tolerance),
        })
    }

    fn sample(pod: &str, code: &str, count: f64) -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("pod".to_string(), pod.to_string());
        labels.insert("code".to_string(), code.to_string());
        Sample {
            labels,
            value: count,
        }
    }

    #[test]
    fn test_counts_accumulate_per_pod() {
        let analyzer = analyzer(&["200"], &[], 0);
        let samples = vec![
            sample("a", "200", 90.0),
            sample("a", "500", 10.0),
            sample("b", "200", 50.0),
        ];
        let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
        assert_eq!(verdicts.get("a"), Some(&Verdict::Counts { ok: 90, ko: 10 }));
        assert_eq!(verdicts.get("b"), Some(&Verdict::Counts { ok: 50, ko: 0 }));
    }

    #[test]
    fn test_bad_values_classification() {
        let analyzer = analyzer(&[], &["500"], 0);
        let samples = vec![sample("a", "404", 5.0), sample("a", "500", 5.0)];
        let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
        // 404 is not in the bad list, so it counts as good.
        assert_eq!(verdicts.get("a"), Some(&Verdict::Counts { ok: 5, ko: 5 }));
    }

    #[test]
    fn test_no_observations_is_in_bounds() {
        let analyzer = analyzer(&["200"], &[], 0);
        assert!(!analyzer
            .is_out_of_bounds(&Verdict::Counts { ok: 0, ko: 0 })
            .expect("verdict"));
    }

    #[test]
    fn test_tolerance_boundary() {
        let analyzer = analyzer(&["200"], &[], 10);
        // Exactly 10% bad: not out of bounds (strict inequality).
        assert!(!analyzer
            .is_out_of_bounds(&Verdict::Counts { ok: 90, ko: 10 })
            .expect("verdict"));
        // 11% bad: out of bounds.
        assert!(analyzer
            .is_out_of_bounds(&Verdict::Counts { ok: 89, ko: 11 })
            .expect("verdict"));
    }

    #[test]
    fn test_single_bad_observation_with_zero_tolerance() {
        let analyzer = analyzer(&["200"], &[], 0);
        assert!(analyzer
            .is_out_of_bounds(&Verdict::Counts { ok: 0, ko: 1 })
            .expect("verdict"));
    }

    #[test]
    fn test_all_pods_query_uses_global_key() {
        let analyzer = analyzer(&["200"], &[], 0);
        let samples = vec![sample("ignored", "500", 3.0)];
        let verdicts = analyzer.verdicts(&samples, "pod", true).expect("verdicts");
        assert!(verdicts.contains_key(GLOBAL_VERDICT_KEY));
        assert_eq!(verdicts.len(), 1);
    }

    #[test]
    fn test_sample_without_pod_label_is_skipped() {
        let analyzer = analyzer(&["200"], &[], 0);
        let mut labels = BTreeMap::new();
        labels.insert("code".to_string(), "500".to_string());
        let samples = vec![Sample { labels, value: 1.0 }];
        let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
        assert!(verdicts.is_empty());
    }

    #[test]
    fn test_wrong_verdict_shape_is_rejected() {
        let analyzer = analyzer(&["200"], &[], 0);
        assert!(analyzer.is_out_of_bounds(&Verdict::Deviation(1.0)).is_err());
    }
}
