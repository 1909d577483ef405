//! End-to-end anomaly pipeline tests: a raw query response, through an
//! analyzer, to per-pod verdicts.

use kanary_operator::anomaly::prometheus::parse_instant_query_response;
use kanary_operator::anomaly::{
    ContinuousValueAnalyzer, DiscreteValueAnalyzer, ValueInRangeAnalyzer, Verdict, parse_pod_list,
};
use kanary_operator::crd::{
    ContinuousValueDeviationAnalysis, DiscreteValueOutOfListAnalysis, ValueInRangeAnalysis,
};

/// HTTP status-code counters for two canary pods, one of them failing.
const STATUS_CODE_RESPONSE: &str = r#"{
    "status": "success",
    "data": {
        "resultType": "vector",
        "result": [
            {"metric": {"pod": "web-kanary-aaa", "code": "200"}, "value": [1693000000.0, "95"]},
            {"metric": {"pod": "web-kanary-aaa", "code": "500"}, "value": [1693000000.0, "5"]},
            {"metric": {"pod": "web-kanary-bbb", "code": "200"}, "value": [1693000000.0, "40"]},
            {"metric": {"pod": "web-kanary-bbb", "code": "500"}, "value": [1693000000.0, "60"]}
        ]
    }
}"#;

#[test]
fn test_status_code_query_flags_the_failing_pod() {
    let samples = parse_instant_query_response(STATUS_CODE_RESPONSE).expect("parse");
    let analyzer = DiscreteValueAnalyzer::new(DiscreteValueOutOfListAnalysis {
        key: "code".to_string(),
        good_values: vec!["200".to_string()],
        bad_values: Vec::new(),
        tolerance_percent: Some(10),
    });

    let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
    assert_eq!(verdicts.len(), 2);

    // 5% errors sits under the 10% tolerance.
    assert!(!analyzer
        .is_out_of_bounds(&verdicts["web-kanary-aaa"])
        .expect("verdict"));
    // 60% errors does not.
    assert!(analyzer
        .is_out_of_bounds(&verdicts["web-kanary-bbb"])
        .expect("verdict"));
}

#[test]
fn test_latency_ratio_query_within_deviation() {
    let body = r#"{
        "status": "success",
        "data": {
            "result": [
                {"metric": {"pod": "web-kanary-aaa"}, "value": [0.0, "1.2"]},
                {"metric": {"pod": "web-kanary-bbb"}, "value": [0.0, "1.8"]}
            ]
        }
    }"#;
    let samples = parse_instant_query_response(body).expect("parse");
    let analyzer = ContinuousValueAnalyzer::new(ContinuousValueDeviationAnalysis {
        max_deviation_percent: Some(50.0),
    });

    let verdicts = analyzer.verdicts(&samples, "pod", false).expect("verdicts");
    // 20% above the 1.0 target: fine.
    assert!(!analyzer
        .is_out_of_bounds(&verdicts["web-kanary-aaa"])
        .expect("verdict"));
    // 80% above: flagged.
    assert!(analyzer
        .is_out_of_bounds(&verdicts["web-kanary-bbb"])
        .expect("verdict"));
}

#[test]
fn test_scalar_query_broadcasts_one_verdict() {
    let body = r#"{
        "status": "success",
        "data": {"result": [{"metric": {}, "value": [0.0, "0.42"]}]}
    }"#;
    let samples = parse_instant_query_response(body).expect("parse");
    let analyzer = ValueInRangeAnalyzer::new(ValueInRangeAnalysis { min: 0.0, max: 0.5 });

    let verdicts = analyzer.verdicts(&samples, "pod", true).expect("verdicts");
    assert_eq!(verdicts.len(), 1);
    let verdict = verdicts.values().next().unwrap();
    assert_eq!(verdict, &Verdict::InRange(true));
    assert!(!analyzer.is_out_of_bounds(verdict).expect("verdict"));
}

#[test]
fn test_custom_probe_answer_decodes_to_pod_names() {
    let body = r#"{
        "apiVersion": "v1",
        "kind": "PodList",
        "items": [{"metadata": {"name": "web-kanary-ccc", "namespace": "default"}}]
    }"#;
    assert_eq!(parse_pod_list(body).expect("parse"), vec!["web-kanary-ccc"]);
}

#[test]
fn test_metric_store_error_is_not_a_rollout_failure() {
    let err =
        parse_instant_query_response(r#"{"status": "error", "error": "timeout"}"#).expect_err("err");
    // Retryable: the reconciler requeues instead of invalidating.
    assert!(err.is_retryable());
}
