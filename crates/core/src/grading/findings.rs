//! Typed shapes of the structured output each analysis returns.
//!
//! Models are loose with types, so deductions accept numeric strings and
//! error lists accept any JSON items. Anything else that does not fit is a
//! schema failure and the subtask is recorded as an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ticket::SubtaskKind;

/// Output of the correctness analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectnessFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct_problem: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub score_deduction: Option<f64>,
}

/// Output of the reasoning analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<String>,
    #[serde(default)]
    pub gaps: Vec<Value>,
    #[serde(
        default,
        deserialize_with = "lenient_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub score_deduction: Option<f64>,
}

/// Output of the feedback analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackFindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct_problem: Option<bool>,
    #[serde(default)]
    pub strengths: String,
    #[serde(default)]
    pub weaknesses: String,
    #[serde(default)]
    pub study_points: String,
    #[serde(default)]
    pub overall_eval: String,
    /// Short learner-facing text; becomes the ticket summary.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

impl FeedbackFindings {
    /// Feedback shown in place of the real analysis when any subtask failed.
    pub fn system_failure_notice() -> Self {
        Self {
            is_correct_problem: None,
            strengths: "N/A".to_string(),
            weaknesses: "The automated analysis could not be completed.".to_string(),
            study_points: "Please resubmit once the grading service is available.".to_string(),
            overall_eval: "No score was awarded because the analysis failed.".to_string(),
            text: SYSTEM_FAILURE_SUMMARY.to_string(),
            tone: None,
        }
    }
}

/// Summary text of the system-failure notice.
pub const SYSTEM_FAILURE_SUMMARY: &str =
    "시스템 오류: AI 분석에 실패했습니다. (AI Analysis Failed)";

/// Check that `data` fits the schema for `kind` and return it normalized.
pub fn normalize(kind: SubtaskKind, data: Value) -> Result<Value, String> {
    fn reencode<T>(data: Value) -> Result<Value, String>
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        let parsed: T = serde_json::from_value(data).map_err(|e| e.to_string())?;
        serde_json::to_value(parsed).map_err(|e| e.to_string())
    }

    if !data.is_object() {
        return Err(format!("{} output is not a JSON object", kind));
    }

    let result = match kind {
        SubtaskKind::Correctness => reencode::<CorrectnessFindings>(data),
        SubtaskKind::Reasoning => reencode::<ReasoningFindings>(data),
        SubtaskKind::Feedback => reencode::<FeedbackFindings>(data),
    };
    result.map_err(|e| format!("{} output does not match schema: {}", kind, e))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid number: {:?}", s))),
        Some(other) => Err(D::Error::custom(format!(
            "expected a number, got {}",
            other
        ))),
    }
}
