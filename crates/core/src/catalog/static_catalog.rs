//! Read-only catalog loaded once at startup.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{CatalogError, ProblemCatalog, ProblemDefinition};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    problems: Vec<ProblemDefinition>,
}

/// In-memory problem catalog.
#[derive(Debug, Default)]
pub struct StaticProblemCatalog {
    problems: HashMap<String, ProblemDefinition>,
}

impl StaticProblemCatalog {
    pub fn new(problems: Vec<ProblemDefinition>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(problems.len());
        for problem in problems {
            if by_id.contains_key(&problem.id) {
                return Err(CatalogError::DuplicateId(problem.id));
            }
            by_id.insert(problem.id.clone(), problem);
        }
        Ok(Self { problems: by_id })
    }

    /// Catalog with no problems; every lookup yields the placeholder.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a TOML document of `[[problems]]` tables.
    pub fn from_toml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::new(file.problems)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let catalog = Self::from_toml_str(&content)?;
        info!(
            "Loaded {} problems from {}",
            catalog.problems.len(),
            path.display()
        );
        Ok(catalog)
    }
}

impl ProblemCatalog for StaticProblemCatalog {
    fn get(&self, problem_id: &str) -> Option<ProblemDefinition> {
        self.problems.get(problem_id).cloned()
    }

    fn list(&self) -> Vec<ProblemDefinition> {
        let mut problems: Vec<_> = self.problems.values().cloned().collect();
        problems.sort_by(|a, b| a.id.cmp(&b.id));
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProblemContext, PLACEHOLDER_QUESTION};
    use std::io::Write;

    const SAMPLE: &str = r#"
[[problems]]
id = "Q001"
subject = "calculus"
question = "Compute the integral of 2x from 0 to 3."
reference_answer = "9"
rubric_formula = "Correct antiderivative x^2"
rubric_logic = "Bounds applied in order"

[[problems]]
id = "Q002"
question = "Prove that there are infinitely many primes."
"#;

    #[test]
    fn test_lookup_known_problem() {
        let catalog = StaticProblemCatalog::from_toml_str(SAMPLE).unwrap();
        let context = catalog.lookup("Q001");
        assert_eq!(context.reference_answer, "9");
        assert_eq!(context.rubric_formula, "Correct antiderivative x^2");
    }

    #[test]
    fn test_lookup_unknown_problem_is_placeholder() {
        let catalog = StaticProblemCatalog::from_toml_str(SAMPLE).unwrap();
        assert_eq!(catalog.lookup("Q999"), ProblemContext::placeholder());
        assert_eq!(
            StaticProblemCatalog::empty().lookup("Q001").question,
            PLACEHOLDER_QUESTION
        );
    }

    #[test]
    fn test_list_is_sorted() {
        let catalog = StaticProblemCatalog::from_toml_str(SAMPLE).unwrap();
        let ids: Vec<_> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["Q001", "Q002"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let content = r#"
[[problems]]
id = "Q001"
question = "a"

[[problems]]
id = "Q001"
question = "b"
"#;
        let result = StaticProblemCatalog::from_toml_str(content);
        assert!(matches!(result, Err(CatalogError::DuplicateId(id)) if id == "Q001"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();

        let catalog = StaticProblemCatalog::from_file(file.path()).unwrap();
        assert!(catalog.get("Q002").is_some());

        let missing = StaticProblemCatalog::from_file(Path::new("/nonexistent/problems.toml"));
        assert!(matches!(missing, Err(CatalogError::Io { .. })));
    }
}
