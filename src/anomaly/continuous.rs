//! Continuous-deviation analyzer: per-pod deviation from a 1.0 target.

use std::collections::BTreeMap;

use crate::anomaly::prometheus::Sample;
use crate::anomaly::{Verdict, GLOBAL_VERDICT_KEY};
use crate::controller::error::{Error, Result};
use crate::crd::ContinuousValueDeviationAnalysis;

/// Judges per-pod deviation values, where 1.0 means exactly on target.
#[derive(Clone, Debug)]
pub struct ContinuousValueAnalyzer {
    config: ContinuousValueDeviationAnalysis,
}

impl ContinuousValueAnalyzer {
    pub fn new(config: ContinuousValueDeviationAnalysis) -> Self {
        Self { config }
    }

    /// One deviation verdict per pod; a later sample for the same pod wins.
    pub fn verdicts(
        &self,
        samples: &[Sample],
        pod_name_key: &str,
        all_pods_query: bool,
    ) -> Result<BTreeMap<String, Verdict>> {
        let mut verdicts = BTreeMap::new();
        for sample in samples {
            let pod = if all_pods_query {
                GLOBAL_VERDICT_KEY.to_string()
            } else {
                match sample.labels.get(pod_name_key) {
                    Some(pod) => pod.clone(),
                    None => continue,
                }
            };
            verdicts.insert(pod, Verdict::Deviation(sample.value));
        }
        Ok(verdicts)
    }

    /// Out of bounds when |1 - deviation| strictly exceeds the allowed
    /// percentage. A zero or missing `maxDeviationPercent` is a
    /// configuration error.
    pub fn is_out_of_bounds(&self, verdict: &Verdict) -> Result<bool> {
        let max_deviation_percent = self
            .config
            .max_deviation_percent
            .filter(|p| *p > 0.0)
            .ok_or_else(|| {
                Error::Validation("maxDeviationPercent must be strictly positive".to_string())
            })?;
        let Verdict::Deviation(deviation) = verdict else {
            return Err(Error::MetricQuery(
                "continuous analyzer received a non-deviation verdict".to_string(),
            ));
        };
        // Tolerance absorbs f64 representation noise so a deviation sitting
        // exactly on the bound (say 1.33 at 33 percent) stays in bounds.
        let limit = max_deviation_percent / 100.0;
        Ok((1.0 - deviation).abs() - limit > 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(max_deviation_percent: Option<f64>) -> ContinuousValueAnalyzer {
        ContinuousValueAnalyzer::new(ContinuousValueDeviationAnalysis {
            max_deviation_percent,
        })
    }

    fn sample(pod: &str, value: f64) -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("pod".to_string(), pod.to_string());
        Sample { labels, value }
    }

    #[test]
    fn test_on_target_is_in_bounds() {
        let analyzer = analyzer(Some(33.0));
        assert!(!analyzer
            .is_out_of_bounds(&Verdict::Deviation(1.0))
            .expect("verdict"));
    }

    #[test]
    fn test_boundary_is_exactly_in_bounds() {
        let analyzer = analyzer(Some(33.0));
        // 1 ± 0.33 sits exactly on the bound: in bounds.
        assert!(!analyzer
            .is_out_of_bounds(&Verdict::Deviation(1.33))
            .expect("verdict"));
        assert!(!analyzer
            .is_out_of_bounds(&Verdict::Deviation(0.67))
            .expect("verdict"));
        // Strictly outside: out of bounds.
        assert!(analyzer
            .is_out_of_bounds(&Verdict::Deviation(1.34))
            .expect("verdict"));
        assert!(analyzer
            .is_out_of_bounds(&Verdict::Deviation(0.66))
            .expect("verdict"));
    }

    #[test]
    fn test_boundary_survives_float_representation() {
        // None of these limits are exactly representable in binary; the
        // matching deviation must still count as in bounds.
        for (percent, low, high) in [(33.0, 0.67, 1.33), (10.0, 0.9, 1.1), (0.1, 0.999, 1.001)] {
            let analyzer = analyzer(Some(percent));
            assert!(
                !analyzer
                    .is_out_of_bounds(&Verdict::Deviation(high))
                    .expect("verdict"),
                "deviation {} at {}% flagged",
                high,
                percent
            );
            assert!(
                !analyzer
                    .is_out_of_bounds(&Verdict::Deviation(low))
                    .expect("verdict"),
                "deviation {} at {}% flagged",
                low,
                percent
            );
        }
    }

    #[test]
    fn test_zero_max_deviation_is_config_error() {
        assert!(analyzer(Some(0.0))
            .is_out_of_bounds(&Verdict::Deviation(1.0))
            .is_err());
        assert!(analyzer(None)
            .is_out_of_bounds(&Verdict::Deviation(1.0))
            .is_err());
    }

    #[test]
    fn test_verdicts_keyed_by_pod() {
        let analyzer = analyzer(Some(10.0));
        let samples = vec![sample("a", 0.42), sample("b", 1.02)];
        let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
        assert_eq!(verdicts.get("a"), Some(&Verdict::Deviation(0.42)));
        assert_eq!(verdicts.get("b"), Some(&Verdict::Deviation(1.02)));
    }

    #[test]
    fn test_all_pods_query_collapses_to_global() {
        let analyzer = analyzer(Some(10.0));
        let samples = vec![sample("a", 0.42)];
        let verdicts = analyzer.verdicts(&samples, "pod", true).expect("verdicts");
        assert_eq!(
            verdicts.get(GLOBAL_VERDICT_KEY),
            Some(&Verdict::Deviation(0.42))
        );
    }
}
