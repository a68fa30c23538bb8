//! Deterministic score policy.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::grading::findings::{CorrectnessFindings, FeedbackFindings, ReasoningFindings};
use crate::ticket::{SubtaskKind, SubtaskRecord, SubtaskStatus};

/// Deduction per reported error when the correctness analysis gives no
/// explicit amount.
pub const DEDUCTION_PER_ERROR: f64 = 5.0;

/// Typed findings of a ticket whose subtasks are all terminal.
#[derive(Debug, Clone, Default)]
pub struct GradedFindings {
    pub correctness: Option<CorrectnessFindings>,
    pub reasoning: Option<ReasoningFindings>,
    pub feedback: Option<FeedbackFindings>,
    /// Some subtask ended in `error` or left unusable data behind.
    pub has_error: bool,
}

impl GradedFindings {
    pub fn from_subtasks(subtasks: &BTreeMap<SubtaskKind, SubtaskRecord>) -> Self {
        let mut findings = GradedFindings::default();

        for kind in SubtaskKind::ALL {
            let Some(record) = subtasks.get(&kind) else {
                findings.has_error = true;
                continue;
            };
            let data = match (record.status, &record.data) {
                (SubtaskStatus::Completed, Some(data)) => data.clone(),
                _ => {
                    findings.has_error = true;
                    continue;
                }
            };

            let parsed = match kind {
                SubtaskKind::Correctness => serde_json::from_value(data)
                    .map(|f| findings.correctness = Some(f))
                    .is_ok(),
                SubtaskKind::Reasoning => serde_json::from_value(data)
                    .map(|f| findings.reasoning = Some(f))
                    .is_ok(),
                SubtaskKind::Feedback => serde_json::from_value(data)
                    .map(|f| findings.feedback = Some(f))
                    .is_ok(),
            };
            if !parsed {
                findings.has_error = true;
            }
        }

        findings
    }

    /// Feedback used for the summary and report.
    pub fn effective_feedback(&self) -> FeedbackFindings {
        match (&self.feedback, self.has_error) {
            (Some(feedback), false) => feedback.clone(),
            _ => FeedbackFindings::system_failure_notice(),
        }
    }
}

/// How a final score was reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub logic_deduction: f64,
    pub formula_deduction: f64,
    pub base_score: u8,
    pub wrong_problem: bool,
    pub has_error: bool,
    pub final_score: u8,
}

/// Apply the score policy.
///
/// Deductions below zero count as zero. A wrong-problem flag from either the
/// correctness or the feedback analysis, or any failed subtask, zeroes the
/// score.
pub fn compute_score(findings: &GradedFindings) -> ScoreBreakdown {
    let logic_deduction = findings
        .reasoning
        .as_ref()
        .and_then(|r| r.score_deduction)
        .unwrap_or(0.0)
        .max(0.0);

    let formula_deduction = findings
        .correctness
        .as_ref()
        .map(|c| match c.score_deduction {
            Some(amount) => amount,
            None => DEDUCTION_PER_ERROR * c.errors.len() as f64,
        })
        .unwrap_or(0.0)
        .max(0.0);

    let base_score = (100.0 - logic_deduction - formula_deduction)
        .clamp(0.0, 100.0)
        .round() as u8;

    let wrong_problem = findings
        .correctness
        .as_ref()
        .and_then(|c| c.is_correct_problem)
        == Some(false)
        || findings
            .feedback
            .as_ref()
            .and_then(|f| f.is_correct_problem)
            == Some(false);

    let final_score = if wrong_problem || findings.has_error {
        0
    } else {
        base_score
    };

    ScoreBreakdown {
        logic_deduction,
        formula_deduction,
        base_score,
        wrong_problem,
        has_error: findings.has_error,
        final_score,
    }
}

/// Aggregated payload handed to report generation.
pub fn report_payload(findings: &GradedFindings, breakdown: &ScoreBreakdown) -> Value {
    json!({
        "score": breakdown.final_score,
        "is_wrong_problem": breakdown.wrong_problem,
        "has_error": breakdown.has_error,
        "correctness": findings.correctness,
        "reasoning": findings.reasoning,
        "feedback": findings.effective_feedback(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::grading::findings::SYSTEM_FAILURE_SUMMARY;

    fn completed(data: Value) -> SubtaskRecord {
        SubtaskRecord {
            status: SubtaskStatus::Completed,
            data: Some(data),
            error: None,
            attempts: 1,
            updated_at: Utc::now(),
        }
    }

    fn failed(message: &str) -> SubtaskRecord {
        SubtaskRecord {
            status: SubtaskStatus::Error,
            data: None,
            error: Some(message.to_string()),
            attempts: 3,
            updated_at: Utc::now(),
        }
    }

    fn subtasks(
        correctness: SubtaskRecord,
        reasoning: SubtaskRecord,
        feedback: SubtaskRecord,
    ) -> BTreeMap<SubtaskKind, SubtaskRecord> {
        BTreeMap::from([
            (SubtaskKind::Correctness, correctness),
            (SubtaskKind::Reasoning, reasoning),
            (SubtaskKind::Feedback, feedback),
        ])
    }

    fn feedback() -> Value {
        json!({"text": "Good work", "is_correct_problem": true})
    }

    #[test]
    fn test_deductions_subtract_from_hundred() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"score_deduction": 15})),
            completed(json!({"score_deduction": 10})),
            completed(feedback()),
        ));
        let score = compute_score(&findings);

        assert_eq!(score.final_score, 75);
        assert!(!score.wrong_problem);
        assert!(!score.has_error);
    }

    #[test]
    fn test_error_count_used_without_explicit_deduction() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"errors": ["a", "b", "c"]})),
            completed(json!({})),
            completed(feedback()),
        ));
        assert_eq!(compute_score(&findings).final_score, 85);
    }

    #[test]
    fn test_explicit_zero_deduction_wins_over_errors() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"errors": ["a"], "score_deduction": 0})),
            completed(json!({})),
            completed(feedback()),
        ));
        assert_eq!(compute_score(&findings).final_score, 100);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"score_deduction": 80})),
            completed(json!({"score_deduction": 70})),
            completed(feedback()),
        ));
        let score = compute_score(&findings);
        assert_eq!(score.base_score, 0);
        assert_eq!(score.final_score, 0);
    }

    #[test]
    fn test_negative_deductions_ignored() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"score_deduction": -20})),
            completed(json!({"score_deduction": 2.6})),
            completed(feedback()),
        ));
        assert_eq!(compute_score(&findings).final_score, 97);
    }

    #[test]
    fn test_wrong_problem_from_correctness() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"is_correct_problem": false, "score_deduction": 0})),
            completed(json!({"score_deduction": 0})),
            completed(feedback()),
        ));
        let score = compute_score(&findings);
        assert!(score.wrong_problem);
        assert_eq!(score.base_score, 100);
        assert_eq!(score.final_score, 0);
    }

    #[test]
    fn test_wrong_problem_from_feedback() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({})),
            completed(json!({})),
            completed(json!({"text": "Different problem", "is_correct_problem": false})),
        ));
        assert_eq!(compute_score(&findings).final_score, 0);
    }

    #[test]
    fn test_failed_subtask_zeroes_score_and_replaces_feedback() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({"score_deduction": 0})),
            failed("inference timed out"),
            completed(feedback()),
        ));
        let score = compute_score(&findings);

        assert!(score.has_error);
        assert_eq!(score.final_score, 0);
        assert_eq!(findings.effective_feedback().text, SYSTEM_FAILURE_SUMMARY);

        let payload = report_payload(&findings, &score);
        assert_eq!(payload["score"], 0);
        assert_eq!(payload["feedback"]["text"], SYSTEM_FAILURE_SUMMARY);
        assert!(payload["reasoning"].is_null());
    }

    #[test]
    fn test_unparseable_data_counts_as_error() {
        let findings = GradedFindings::from_subtasks(&subtasks(
            completed(json!({})),
            completed(json!({})),
            completed(json!({"strengths": "no text field"})),
        ));
        assert!(findings.has_error);
        assert_eq!(compute_score(&findings).final_score, 0);
    }
}
