//! Value-in-range analyzer: per-pod value must sit within [min, max].

use std::collections::BTreeMap;

use crate::anomaly::prometheus::Sample;
use crate::anomaly::{Verdict, GLOBAL_VERDICT_KEY};
use crate::controller::error::{Error, Result};
use crate::crd::ValueInRangeAnalysis;

/// Judges per-pod sample values against inclusive bounds.
#[derive(Clone, Debug)]
pub struct ValueInRangeAnalyzer {
    config: ValueInRangeAnalysis,
}

impl ValueInRangeAnalyzer {
    pub fn new(config: ValueInRangeAnalysis) -> Self {
        Self { config }
    }

    /// One in-range verdict per pod; a later sample for the same pod wins.
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
            let in_range = sample.value >= self.config.min && sample.value <= self.config.max;
            verdicts.insert(pod, Verdict::InRange(in_range));
        }
        Ok(verdicts)
    }

    pub fn is_out_of_bounds(&self, verdict: &Verdict) -> Result<bool> {
        let Verdict::InRange(in_range) = verdict else {
            return Err(Error::MetricQuery(
                "range analyzer received a non-range verdict".to_string(),
            ));
        };
        Ok(!in_range)
    }
}
