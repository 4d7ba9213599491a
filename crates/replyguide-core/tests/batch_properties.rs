//! Batch evaluator behaviour under concurrency and failure.

use std::sync::Arc;
use std::time::Duration;

use replyguide_core::{
    BatchConfig, BatchEvaluator, ComplianceMetric, EvalError, FailurePolicy, Guideline,
    GuidelineSet, MultiGuidelineComplianceMetric, Row,
};
use replyguide_llm::fakes::ScriptedModel;
use replyguide_llm::{ChatModel, GaugedModel, LlmError};

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn guidelines(titles: &[&str]) -> GuidelineSet {
    GuidelineSet::new(
        titles
            .iter()
            .map(|t| Guideline::new(*t, format!("Follow rule {t}.")))
            .collect(),
    )
    .expect("valid guideline set")
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn single_evaluator(model: Arc<dyn ChatModel>, config: BatchConfig) -> BatchEvaluator {
    BatchEvaluator::new(Arc::new(ComplianceMetric::new(model))).with_config(config)
}

#[tokio::test(start_paused = true)]
async fn test_output_order_follows_declaration_not_completion() {
    // Column A and guideline G1 finish last.
    let model = ScriptedModel::always(r#"{"score":9,"reasons":["ok"]}"#).with_delay(|req| {
        let content = req.user_content();
        let mut ms = 10;
        if content.contains("reply in column A") {
            ms += 100;
        }
        if content.contains("Follow rule G1.") {
            ms += 50;
        }
        Duration::from_millis(ms)
    });
    let eval = single_evaluator(Arc::new(model), BatchConfig::default());
    let rows = vec![row(&[("A", "reply in column A"), ("B", "reply in column B")])];

    let report = eval
        .evaluate(&rows, &columns(&["A", "B"]), &guidelines(&["G1", "G2"]))
        .await
        .expect("evaluate");

    let json = serde_json::to_string(&report.table).expect("serialize table");
    let a = json.find("\"A\"").expect("group A");
    let b = json.find("\"B\"").expect("group B");
    assert!(a < b, "groups out of order: {json}");

    for group in report.table.groups() {
        let titles: Vec<_> = group.guidelines.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(titles, vec!["G1", "G2"]);
    }
    let first_g1 = json.find("\"G1\"").expect("G1");
    let first_g2 = json.find("\"G2\"").expect("G2");
    assert!(first_g1 < first_g2);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_calls_never_exceed_cap() {
    let gauged = GaugedModel::new(
        ScriptedModel::always(r#"{"score":5,"reasons":[]}"#)
            .with_delay(|_| Duration::from_secs(1)),
    );
    let gauge = gauged.gauge();
    let eval = single_evaluator(
        Arc::new(gauged),
        BatchConfig {
            max_concurrent: 10,
            ..BatchConfig::default()
        },
    )
    .with_gauge(Arc::clone(&gauge));
    let rows: Vec<Row> = (0..50)
        .map(|i| row(&[("reply", &format!("reply number {i}"))]))
        .collect();

    let report = eval
        .evaluate(&rows, &columns(&["reply"]), &guidelines(&["G"]))
        .await
        .expect("evaluate");

    assert_eq!(gauge.started(), 50);
    assert_eq!(gauge.peak(), 10);
    assert_eq!(gauge.in_flight(), 0);
    assert_eq!(report.peak_in_flight, Some(10));
    assert_eq!(report.table.get("reply", "G").expect("cell").count, 50);
}

fn flaky_model() -> ScriptedModel {
    ScriptedModel::from_fn(|req| {
        if req.user_content().contains("garbled") {
            Ok("not json at all".to_string())
        } else {
            Ok(r#"{"score":8,"reasons":["fine"]}"#.to_string())
        }
    })
}

#[tokio::test]
async fn test_exclude_policy_drops_tagged_failures() {
    let eval = single_evaluator(Arc::new(flaky_model()), BatchConfig::default());
    let rows = vec![
        row(&[("reply", "a good reply")]),
        row(&[("reply", "garbled output")]),
    ];

    let report = eval
        .evaluate(&rows, &columns(&["reply"]), &guidelines(&["G"]))
        .await
        .expect("evaluate");

    let cell = report.table.get("reply", "G").expect("cell");
    assert_eq!(cell.count, 1);
    assert!((cell.average - 0.8).abs() < 1e-9);
    assert_eq!(cell.stddev, 0.0);
    assert_eq!(cell.failures, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(report.excluded, 1);
    assert_eq!(report.measurements, 2);
}

#[tokio::test]
async fn test_substitute_policy_keeps_fallback_values() {
    let eval = single_evaluator(
        Arc::new(flaky_model()),
        BatchConfig {
            failure_policy: FailurePolicy::Substitute,
            ..BatchConfig::default()
        },
    );
    let rows = vec![
        row(&[("reply", "a good reply")]),
        row(&[("reply", "garbled output")]),
    ];

    let report = eval
        .evaluate(&rows, &columns(&["reply"]), &guidelines(&["G"]))
        .await
        .expect("evaluate");

    let cell = report.table.get("reply", "G").expect("cell");
    assert_eq!(cell.count, 2);
    assert!((cell.average - 0.4).abs() < 1e-9);
    assert_eq!(cell.failures, 1);
    assert_eq!(report.excluded, 0);
}

#[tokio::test]
async fn test_all_failures_leave_empty_sample_sentinel() {
    let eval = single_evaluator(
        Arc::new(ScriptedModel::failing("connection reset")),
        BatchConfig::default(),
    );
    let rows = vec![row(&[("reply", "first reply")]), row(&[("reply", "second reply")])];

    let report = eval
        .evaluate(&rows, &columns(&["reply"]), &guidelines(&["G"]))
        .await
        .expect("batch completes despite failures");

    let cell = report.table.get("reply", "G").expect("cell");
    assert_eq!(cell.count, 0);
    assert!(cell.average.is_nan());
    assert!(cell.stddev.is_nan());
    assert_eq!(cell.failures, 2);

    let json = serde_json::to_value(&report.table).expect("serialize");
    assert!(json["reply"]["G"]["average"].is_null());
}

#[tokio::test]
async fn test_multi_call_failure_substitutes_midpoint() {
    let eval = BatchEvaluator::new(Arc::new(MultiGuidelineComplianceMetric::new(Arc::new(
        ScriptedModel::from_fn(|_| Err(LlmError::Status {
            status: 429,
            body: "rate limited".to_string(),
        })),
    ))))
    .with_config(BatchConfig {
        failure_policy: FailurePolicy::Substitute,
        ..BatchConfig::default()
    });
    let rows = vec![row(&[("reply", "thanks for the review")])];

    let report = eval
        .evaluate(&rows, &columns(&["reply"]), &guidelines(&["G1", "G2"]))
        .await
        .expect("evaluate");

    for title in ["G1", "G2"] {
        let cell = report.table.get("reply", title).expect("cell");
        assert_eq!(cell.average, 0.5);
        assert_eq!(cell.failures, 1);
    }
}

#[tokio::test]
async fn test_missing_column_is_fatal() {
    let model = Arc::new(ScriptedModel::always(r#"{"score":5,"reasons":[]}"#));
    let eval = single_evaluator(model.clone(), BatchConfig::default());
    let rows = vec![
        row(&[("A", "present"), ("B", "present")]),
        row(&[("A", "B is missing here")]),
    ];

    let err = eval
        .evaluate(&rows, &columns(&["A", "B"]), &guidelines(&["G"]))
        .await
        .expect_err("missing column must abort");

    match err {
        EvalError::MissingColumn { column, row } => {
            assert_eq!(column, "B");
            assert_eq!(row, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(model.calls(), 0, "no model calls before validation passes");
}

#[tokio::test]
async fn test_repeated_samples_aggregate_into_one_cell() {
    let counter = std::sync::atomic::AtomicUsize::new(0);
    // Scores cycle 2,4,4,4,5,5,7,9 across eight samples of one row.
    let scores = [2, 4, 4, 4, 5, 5, 7, 9];
    let model = ScriptedModel::from_fn(move |_| {
        let i = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(format!(r#"{{"score":{},"reasons":[]}}"#, scores[i % scores.len()]))
    });
    let eval = single_evaluator(
        Arc::new(model),
        BatchConfig {
            samples: 8,
            max_concurrent: 1,
            ..BatchConfig::default()
        },
    );

    let report = eval
        .evaluate(
            &[row(&[("reply", "one reply sampled")])],
            &columns(&["reply"]),
            &guidelines(&["G"]),
        )
        .await
        .expect("evaluate");

    let cell = report.table.get("reply", "G").expect("cell");
    assert_eq!(cell.count, 8);
    assert!((cell.average - 0.5).abs() < 1e-9);
    assert!((cell.stddev - 0.2).abs() < 1e-9);
    assert_eq!(cell.min, Some(0.2));
    assert_eq!(cell.max, Some(0.9));
    assert!(report
        .table
        .groups()
        .iter()
        .all(|g| g.guidelines.iter().all(|s| s.summary.failures == 0)));
}
