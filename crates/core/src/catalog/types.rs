//! Problem catalog types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PLACEHOLDER_QUESTION: &str = "Unknown Question";
pub const PLACEHOLDER_RUBRIC_FORMULA: &str = "General Math Rules";
pub const PLACEHOLDER_RUBRIC_LOGIC: &str = "Logical consistency";
pub const PLACEHOLDER_REFERENCE_ANSWER: &str = "N/A";

/// Prefix marking caller-supplied rubric text.
const OVERRIDE_PREFIX: &str = "[Custom Context Provided]:\n";

/// Errors loading a problem catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("duplicate problem id: {0}")]
    DuplicateId(String),
}

/// A problem as defined in the catalog file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub question: String,
    #[serde(default = "default_reference_answer")]
    pub reference_answer: String,
    #[serde(default = "default_rubric_formula")]
    pub rubric_formula: String,
    #[serde(default = "default_rubric_logic")]
    pub rubric_logic: String,
}

fn default_reference_answer() -> String {
    PLACEHOLDER_REFERENCE_ANSWER.to_string()
}

fn default_rubric_formula() -> String {
    PLACEHOLDER_RUBRIC_FORMULA.to_string()
}

fn default_rubric_logic() -> String {
    PLACEHOLDER_RUBRIC_LOGIC.to_string()
}

/// Context handed to the grading prompts for one subtask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemContext {
    pub question: String,
    pub reference_answer: String,
    pub rubric_formula: String,
    pub rubric_logic: String,
}

impl ProblemContext {
    /// Context used when the problem id is not in the catalog.
    pub fn placeholder() -> Self {
        Self {
            question: PLACEHOLDER_QUESTION.to_string(),
            reference_answer: PLACEHOLDER_REFERENCE_ANSWER.to_string(),
            rubric_formula: PLACEHOLDER_RUBRIC_FORMULA.to_string(),
            rubric_logic: PLACEHOLDER_RUBRIC_LOGIC.to_string(),
        }
    }

    /// Replace both rubric texts when a non-blank override is given.
    pub fn with_rubric_override(mut self, rubric_override: Option<&str>) -> Self {
        if let Some(text) = rubric_override.filter(|text| !text.trim().is_empty()) {
            let rubric = format!("{}{}", OVERRIDE_PREFIX, text);
            self.rubric_formula = rubric.clone();
            self.rubric_logic = rubric;
        }
        self
    }
}

impl From<&ProblemDefinition> for ProblemContext {
    fn from(problem: &ProblemDefinition) -> Self {
        Self {
            question: problem.question.clone(),
            reference_answer: problem.reference_answer.clone(),
            rubric_formula: problem.rubric_formula.clone(),
            rubric_logic: problem.rubric_logic.clone(),
        }
    }
}
