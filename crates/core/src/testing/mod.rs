//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the external collaborators (inference service, task
//! queue) so the whole grading flow can run against an in-memory store.
//!
//! # Example
//!
//! ```rust,ignore
//! use gradeflow_core::testing::{fixtures, MockInferenceClient, MockTaskQueue};
//!
//! let inference = Arc::new(MockInferenceClient::new());
//! let queue = Arc::new(MockTaskQueue::new());
//!
//! let ticket = dispatcher.submit(fixtures::submit_request("Q001")).await?;
//! for message in queue.drain().await {
//!     worker.handle(&message).await?;
//! }
//! ```

mod mock_inference;
mod mock_queue;

pub use mock_inference::{MockInferenceClient, RecordedInference};
pub use mock_queue::MockTaskQueue;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::catalog::{ProblemDefinition, StaticProblemCatalog};
    use crate::grading::SubmitRequest;

    /// A tiny PNG-typed data URL, enough for media extraction.
    pub const SAMPLE_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAE=";

    /// A problem definition with recognisable text.
    pub fn problem(id: &str) -> ProblemDefinition {
        ProblemDefinition {
            id: id.to_string(),
            subject: Some("Math Essay".to_string()),
            question: format!("Question {}: find the area under y = x^2 on [0, 1].", id),
            reference_answer: "1/3".to_string(),
            rubric_formula: "Correct antiderivative and bounds".to_string(),
            rubric_logic: "Each step follows from the previous one".to_string(),
        }
    }

    /// Catalog holding Q001 through Q003.
    pub fn catalog() -> StaticProblemCatalog {
        StaticProblemCatalog::new(vec![problem("Q001"), problem("Q002"), problem("Q003")])
            .unwrap_or_else(|_| StaticProblemCatalog::empty())
    }

    /// A valid submission for the given problem.
    pub fn submit_request(problem_id: &str) -> SubmitRequest {
        SubmitRequest {
            problem_id: problem_id.to_string(),
            requester_name: Some("Kim".to_string()),
            submission_ref: SAMPLE_DATA_URL.to_string(),
            rubric_override: None,
        }
    }
}
