//! Prompt text for each inference role.

use serde_json::Value;

use crate::catalog::ProblemContext;
use crate::grading::GradingConfig;
use crate::ticket::SubtaskKind;

/// Instructions and context for one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub instructions: String,
    pub context: String,
}

/// Prompt for one analysis subtask.
///
/// `submission_text` carries the submission reference when it is not inline
/// media; inline media is attached to the request separately.
pub fn subtask_prompt(
    kind: SubtaskKind,
    problem: &ProblemContext,
    submission_text: Option<&str>,
    config: &GradingConfig,
) -> Prompt {
    let (instructions, mut context) = match kind {
        SubtaskKind::Correctness => correctness(problem),
        SubtaskKind::Reasoning => reasoning(problem),
        SubtaskKind::Feedback => feedback(problem, config),
    };

    if let Some(text) = submission_text {
        context.push_str("\n\n[Submission]:\n");
        context.push_str(text);
    }

    Prompt {
        instructions,
        context,
    }
}

fn correctness(problem: &ProblemContext) -> (String, String) {
    let instructions = "You grade mathematical work strictly. \
        Before anything else, confirm the submission answers the given question."
        .to_string();

    let context = format!(
        "[Question]: {question}\n\
         [Reference Answer]: {answer}\n\
         [Rubric]: {rubric}\n\n\
         Review the submitted solution.\n\
         1. If it solves a different problem, answer with \"valid\": false, \
         \"is_correct_problem\": false, \"score_deduction\": 100 and list the mismatch in \"errors\".\n\
         2. Otherwise extract the formulas used and check each step against the reference answer.\n\n\
         Respond with a JSON object only:\n\
         {{\"valid\": boolean, \"is_correct_problem\": boolean, \"latex\": string, \
         \"errors\": [string], \"score_deduction\": number}}",
        question = problem.question,
        answer = problem.reference_answer,
        rubric = problem.rubric_formula,
    );

    (instructions, context)
}

fn reasoning(problem: &ProblemContext) -> (String, String) {
    let instructions = "You analyse the logical structure of written arguments. \
        Look for unjustified steps and missing grounds."
        .to_string();

    let context = format!(
        "[Question]: {question}\n\
         [Rubric]: {rubric}\n\n\
         Follow the argument from start to finish and judge whether each transition holds.\n\n\
         Respond with a JSON object only:\n\
         {{\"structure\": \"Valid\" | \"Invalid\", \"gaps\": [string], \"score_deduction\": number}}",
        question = problem.question,
        rubric = problem.rubric_logic,
    );

    (instructions, context)
}

fn feedback(problem: &ProblemContext, config: &GradingConfig) -> (String, String) {
    let language = &config.feedback_language;
    let instructions = format!(
        "You are {}, a warm and encouraging tutor. Write every field in {}.",
        config.tutor_name, language
    );

    let context = format!(
        "[Question]: {question}\n\
         [Rubric]: {rubric}\n\n\
         Give the student detailed feedback.\n\
         1. Say whether the submission answers this question.\n\
         2. Name what they did well.\n\
         3. Name what they missed.\n\
         4. Suggest concepts to review.\n\
         5. Sum up the overall result.\n\n\
         Respond with a JSON object only:\n\
         {{\"is_correct_problem\": boolean, \"strengths\": string, \"weaknesses\": string, \
         \"study_points\": string, \"overall_eval\": string, \
         \"text\": \"one short encouraging paragraph in {language}\", \"tone\": string}}",
        question = problem.question,
        rubric = problem.rubric_logic,
        language = language,
    );

    (instructions, context)
}

/// Prompt for rendering the final report from the aggregated payload.
pub fn report_prompt(payload: &Value) -> Prompt {
    let instructions =
        "You turn grading results into a self-contained HTML fragment styled with Tailwind CSS."
            .to_string();

    let context = format!(
        "Render this grading result as a report.\n\n\
         [Data]:\n{payload}\n\n\
         Requirements:\n\
         - Dark theme; show the total score prominently.\n\
         - Separate sections for strengths, weaknesses, study points and the overall \
         evaluation, taken from data.feedback.\n\
         - If data.score is 0 and data.is_wrong_problem is true, show a large warning \
         reading \"Different Problem Detected\".\n\
         - Keep math as $...$ LaTeX.\n\
         - Emit only the inner container markup, without <html> or <body>.\n\n\
         Output the HTML only.",
        payload = payload,
    );

    Prompt {
        instructions,
        context,
    }
}

/// Prompt for drafting grading criteria of a past exam.
pub fn rubric_research_prompt(
    university: &str,
    year: &str,
    problem_type: Option<&str>,
    config: &GradingConfig,
) -> Prompt {
    let problem_type = problem_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Math Essay");

    let instructions = "You research how university entrance exams are scored.".to_string();

    let context = format!(
        "Summarise the official scoring criteria and grade distribution for the \
         {university} {year} {problem_type} exam. If {year} is not available, use the \
         most recent year you know.\n\n\
         Write a concise summary in {language} that a grader can use as context, \
         structured as:\n\
         - [Evaluation Standards]\n\
         - [Grade Distribution] (if known)\n\
         - [Critical Deductions]\n\n\
         Use plain text without code blocks.",
        language = config.feedback_language,
    );

    Prompt {
        instructions,
        context,
    }
}
