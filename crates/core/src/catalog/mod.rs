//! Problem catalog: reference questions, answers and rubrics.
//!
//! Loaded once at process start and injected read-only into workers.

mod static_catalog;
mod types;

pub use static_catalog::StaticProblemCatalog;
pub use types::*;

/// Read-only lookup of problem definitions.
pub trait ProblemCatalog: Send + Sync {
    fn get(&self, problem_id: &str) -> Option<ProblemDefinition>;

    /// All problems, ordered by id.
    fn list(&self) -> Vec<ProblemDefinition>;

    /// Grading context for a problem, or the placeholder when unknown.
    fn lookup(&self, problem_id: &str) -> ProblemContext {
        self.get(problem_id)
            .as_ref()
            .map(ProblemContext::from)
            .unwrap_or_else(ProblemContext::placeholder)
    }
}
