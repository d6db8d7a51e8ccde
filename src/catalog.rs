//! Problem catalog
//!
//! The engine does not own problem authoring. It asks a `ProblemCatalog` for
//! the ordered problem set of a session when a candidate joins. `FileCatalog`
//! serves the set bundled in files/problems.json.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::languages::Language;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// One JSON value per line, one line per argument
    pub input: String,
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    #[serde(default)]
    pub starter_templates: BTreeMap<Language, String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// Empty means every configured language
    #[serde(default)]
    pub allowed_languages: Vec<Language>,
    #[serde(default = "default_time_limit_ms")]
    pub time_limit_ms: u32,
    /// Tiered hint content, index = tier - 1
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub expected_complexity: Option<String>,
}

fn default_time_limit_ms() -> u32 {
    2000
}

impl Problem {
    pub fn allows(&self, language: Language) -> bool {
        self.allowed_languages.is_empty() || self.allowed_languages.contains(&language)
    }
}

/// What a session gets to work on
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub session_id: String,
    pub candidate_email: Option<String>,
    pub problems: Vec<Problem>,
}

#[async_trait]
pub trait ProblemCatalog: Send + Sync {
    /// `Ok(None)` when the session is unknown, `Err` when the catalog is unreachable
    async fn session_plan(&self, session_id: &str) -> anyhow::Result<Option<SessionPlan>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    /// Unknown session ids get every problem when set
    #[serde(default)]
    open_enrollment: bool,
    #[serde(default)]
    sessions: Vec<SessionEntry>,
    problems: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEntry {
    session_id: String,
    #[serde(default)]
    candidate_email: Option<String>,
    problem_ids: Vec<String>,
}

/// Catalog backed by a JSON document
pub struct FileCatalog {
    problems: Vec<Problem>,
    sessions: HashMap<String, SessionEntry>,
    open_enrollment: bool,
}

impl FileCatalog {
    pub fn embedded() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/problems.json"));
        Self::from_json(content)
    }

    /// Load from `path` when given, the embedded file otherwise
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read problem catalog: {}", path))?;
                Self::from_json(&content)
                    .with_context(|| format!("Invalid problem catalog: {}", path))
            }
            None => Self::embedded(),
        }
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;

        for session in &file.sessions {
            for id in &session.problem_ids {
                if !file.problems.iter().any(|p| &p.id == id) {
                    anyhow::bail!(
                        "Session {} references unknown problem {}",
                        session.session_id,
                        id
                    );
                }
            }
        }

        Ok(Self {
            problems: file.problems,
            sessions: file
                .sessions
                .into_iter()
                .map(|s| (s.session_id.clone(), s))
                .collect(),
            open_enrollment: file.open_enrollment,
        })
    }

    pub fn problem(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }
}

#[async_trait]
impl ProblemCatalog for FileCatalog {
    async fn session_plan(&self, session_id: &str) -> anyhow::Result<Option<SessionPlan>> {
        if let Some(entry) = self.sessions.get(session_id) {
            let problems = entry
                .problem_ids
                .iter()
                .filter_map(|id| self.problem(id).cloned())
                .collect();
            return Ok(Some(SessionPlan {
                session_id: session_id.to_string(),
                candidate_email: entry.candidate_email.clone(),
                problems,
            }));
        }

        if self.open_enrollment {
            return Ok(Some(SessionPlan {
                session_id: session_id.to_string(),
                candidate_email: None,
                problems: self.problems.clone(),
            }));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "sessions": [
            { "sessionId": "s-1", "candidateEmail": "a@example.com", "problemIds": ["p2"] }
        ],
        "problems": [
            {
                "id": "p1", "title": "One", "difficulty": "easy", "description": "",
                "testCases": [{ "input": "1", "expectedOutput": "1" }],
                "allowedLanguages": ["python"]
            },
            { "id": "p2", "title": "Two", "difficulty": "hard", "description": "" }
        ]
    }"#;

    #[tokio::test]
    async fn test_known_session_gets_its_problems() {
        let catalog = FileCatalog::from_json(CATALOG).unwrap();
        let plan = catalog.session_plan("s-1").await.unwrap().unwrap();

        assert_eq!(plan.candidate_email.as_deref(), Some("a@example.com"));
        assert_eq!(plan.problems.len(), 1);
        assert_eq!(plan.problems[0].id, "p2");
        assert_eq!(plan.problems[0].time_limit_ms, 2000);
    }

    #[tokio::test]
    async fn test_unknown_session_without_open_enrollment() {
        let catalog = FileCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.session_plan("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_dangling_problem_reference_is_rejected() {
        let result = FileCatalog::from_json(
            r#"{ "sessions": [{ "sessionId": "s", "problemIds": ["missing"] }], "problems": [] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_allowed_languages() {
        let catalog = FileCatalog::from_json(CATALOG).unwrap();
        let restricted = catalog.problem("p1").unwrap();
        let open = catalog.problem("p2").unwrap();

        assert!(restricted.allows(Language::Python));
        assert!(!restricted.allows(Language::Cpp));
        assert!(open.allows(Language::Cpp));
    }

    #[tokio::test]
    async fn test_embedded_catalog_is_open() {
        let catalog = FileCatalog::embedded().unwrap();
        assert!(catalog.problem_count() >= 3);

        let plan = catalog.session_plan("any-session").await.unwrap().unwrap();
        assert_eq!(plan.problems.len(), catalog.problem_count());
        for problem in &plan.problems {
            assert!(!problem.test_cases.is_empty(), "{} has no tests", problem.id);
            assert_eq!(problem.hints.len(), 3, "{} needs three hints", problem.id);
        }
    }
}
