//! Test assertions for pipeline reports.

use crate::pipeline::PipelineReport;
use crate::stages::StageOutcome;

/// Asserts that every stage of the run succeeded.
pub fn assert_succeeded(report: &PipelineReport) {
    assert!(
        report.is_success(),
        "Expected a successful run, got failure: {:?}",
        report.failure
    );
}

/// Asserts that the run stopped at `stage` with the given failure kind.
pub fn assert_failed_with(report: &PipelineReport, stage: &str, kind: &str) {
    let failure = report
        .failure
        .as_ref()
        .unwrap_or_else(|| panic!("Expected run to fail at '{stage}', but it succeeded"));
    assert_eq!(
        (failure.stage.as_str(), failure.kind.as_str()),
        (stage, kind),
        "Unexpected failure: {failure:?}"
    );
}

/// Asserts how a stage ended.
pub fn assert_stage_outcome(report: &PipelineReport, stage: &str, expected: StageOutcome) {
    let record = report
        .stage(stage)
        .unwrap_or_else(|| panic!("No record for stage '{stage}'"));
    assert_eq!(
        record.outcome, expected,
        "Expected stage '{stage}' to be {expected}, got {}",
        record.outcome
    );
}

/// Asserts that the final context holds a string value.
pub fn assert_context_value(report: &PipelineReport, key: &str, expected: &str) {
    let actual = report.context.get_str(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected context '{key}' to be '{expected}', got {actual:?}. Keys: {:?}",
        report.context.keys().collect::<Vec<_>>()
    );
}
