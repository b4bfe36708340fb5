//! Task and criterion configuration
//!
//! Each (exam level, task code) pair owns an ordered list of criteria with their
//! maximum scores, plus the level table used to label the final percentage.
//! The registry is built once at startup and shared read-only behind an `Arc`.
//!
//! # Example
//! ```rust,ignore
//! let registry = CriteriaRegistry::builtin();
//! let task = registry.get(ExamLevel::Advanced, "HSKKCC2").unwrap();
//! assert_eq!(task.max_total(), 20.0);
//! ```

use hskk_common::{Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Exam level
// ============================================================================

/// HSKK exam tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ExamLevel {
    #[serde(rename = "101")]
    Beginner,
    #[serde(rename = "102")]
    Intermediate,
    #[serde(rename = "103")]
    Advanced,
}

impl ExamLevel {
    pub fn code(&self) -> &'static str {
        match self {
            ExamLevel::Beginner => "101",
            ExamLevel::Intermediate => "102",
            ExamLevel::Advanced => "103",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExamLevel::Beginner => "beginner",
            ExamLevel::Intermediate => "intermediate",
            ExamLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ExamLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ExamLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "101" | "beginner" => Ok(ExamLevel::Beginner),
            "102" | "intermediate" => Ok(ExamLevel::Intermediate),
            "103" | "advanced" => Ok(ExamLevel::Advanced),
            other => Err(Error::InvalidInput(format!("Unknown exam level: {}", other))),
        }
    }
}

impl<'de> Deserialize<'de> for ExamLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Code(code) => code.to_string(),
            Raw::Text(text) => text,
        };
        text.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Criteria
// ============================================================================

/// Where a criterion's score comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Threshold rubric over acoustic measurements
    Acoustic,
    /// Language-model judgment over the canonical transcript
    Judgment,
}

/// Criterion identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    TaskAchievement,
    Pronunciation,
    Fluency,
    Grammar,
    Vocabulary,
    Coherence,
}

impl CriterionKind {
    pub fn id(&self) -> &'static str {
        match self {
            CriterionKind::TaskAchievement => "task_achievement",
            CriterionKind::Pronunciation => "pronunciation",
            CriterionKind::Fluency => "fluency",
            CriterionKind::Grammar => "grammar",
            CriterionKind::Vocabulary => "vocabulary",
            CriterionKind::Coherence => "coherence",
        }
    }

    pub fn data_source(&self) -> DataSource {
        match self {
            CriterionKind::Pronunciation | CriterionKind::Fluency => DataSource::Acoustic,
            _ => DataSource::Judgment,
        }
    }

    /// Display name used on exam score sheets
    pub fn default_display_name(&self) -> &'static str {
        match self {
            CriterionKind::TaskAchievement => "Khả năng hoàn thành yêu cầu",
            CriterionKind::Pronunciation => "Phát âm",
            CriterionKind::Fluency => "Độ trôi chảy",
            CriterionKind::Grammar => "Độ chính xác ngữ pháp",
            CriterionKind::Vocabulary => "Vốn từ vựng",
            CriterionKind::Coherence => "Tính mạch lạc và liên kết",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One scored criterion of a task
#[derive(Debug, Clone, Serialize)]
pub struct Criterion {
    pub id: CriterionKind,
    pub display_name: String,
    pub data_source: DataSource,
    pub max_score: f64,
    /// Share of the task's maximum total carried by this criterion
    pub weight_within_task: f64,
    /// Task achievement is judged against reference text
    pub requires_reference: bool,
}

/// Ordered level label entry; the first entry whose minimum is met wins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelThreshold {
    pub label: String,
    pub min_percentage: f64,
}

/// Complete scoring definition of one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskDefinition {
    pub exam_level: ExamLevel,
    pub task_code: String,
    pub name: String,
    /// Criteria in declared (report) order
    pub criteria: Vec<Criterion>,
    /// Ordered from highest to lowest minimum
    pub level_thresholds: Vec<LevelThreshold>,
    /// Default reference text; a request may supply its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_text: Option<String>,
}

impl TaskDefinition {
    /// Sum of every criterion's maximum score
    pub fn max_total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_score).sum()
    }

    pub fn criterion(&self, kind: CriterionKind) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == kind)
    }

    /// Criteria scored by the given source, in declared order
    pub fn criteria_from(&self, source: DataSource) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().filter(move |c| c.data_source == source)
    }

    /// Level label for a percentage; the last entry is the floor
    pub fn level_for(&self, percentage: f64) -> &str {
        self.level_thresholds
            .iter()
            .find(|t| percentage >= t.min_percentage)
            .or(self.level_thresholds.last())
            .map(|t| t.label.as_str())
            .unwrap_or("unrated")
    }
}

// ============================================================================
// Task file schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct TaskFile {
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
struct TaskSpec {
    exam_level: ExamLevel,
    task_code: String,
    name: String,
    criteria: Vec<CriterionSpec>,
    #[serde(default = "default_levels")]
    levels: Vec<LevelThreshold>,
    #[serde(default)]
    reference_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CriterionSpec {
    id: CriterionKind,
    max_score: f64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    requires_reference: bool,
}

fn default_levels() -> Vec<LevelThreshold> {
    [("advanced", 80.0), ("intermediate", 65.0), ("elementary", 0.0)]
        .into_iter()
        .map(|(label, min_percentage)| LevelThreshold {
            label: label.to_string(),
            min_percentage,
        })
        .collect()
}

impl TaskSpec {
    fn build(self) -> Result<TaskDefinition> {
        let code = self.task_code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(Error::Config("Task with empty task_code".to_string()));
        }
        if self.criteria.is_empty() {
            return Err(Error::Config(format!("Task {} has no criteria", code)));
        }
        if self.levels.is_empty() {
            return Err(Error::Config(format!("Task {} has an empty level table", code)));
        }

        let mut seen = HashSet::new();
        for spec in &self.criteria {
            if !seen.insert(spec.id) {
                return Err(Error::Config(format!(
                    "Task {} declares criterion {} twice",
                    code, spec.id
                )));
            }
            if !(spec.max_score.is_finite() && spec.max_score > 0.0) {
                return Err(Error::Config(format!(
                    "Task {} criterion {} has invalid max_score {}",
                    code, spec.id, spec.max_score
                )));
            }
        }

        let total: f64 = self.criteria.iter().map(|c| c.max_score).sum();
        let criteria = self
            .criteria
            .into_iter()
            .map(|spec| Criterion {
                id: spec.id,
                display_name: spec
                    .display_name
                    .unwrap_or_else(|| spec.id.default_display_name().to_string()),
                data_source: spec.id.data_source(),
                max_score: spec.max_score,
                weight_within_task: spec.max_score / total,
                requires_reference: spec.requires_reference,
            })
            .collect();

        let mut levels = self.levels;
        levels.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));

        Ok(TaskDefinition {
            exam_level: self.exam_level,
            task_code: code,
            name: self.name,
            criteria,
            level_thresholds: levels,
            reference_text: self.reference_text,
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable task table keyed by (exam level, task code)
#[derive(Debug, Clone)]
pub struct CriteriaRegistry {
    tasks: HashMap<(ExamLevel, String), Arc<TaskDefinition>>,
    /// Declaration order for listings
    order: Vec<(ExamLevel, String)>,
}

impl CriteriaRegistry {
    /// Built-in HSKK task table
    pub fn builtin() -> Self {
        use CriterionKind::*;

        let ta = |max: f64, reference: bool| (TaskAchievement, max, reference);
        let c = |kind: CriterionKind, max: f64| (kind, max, false);

        let table: Vec<(ExamLevel, &str, &str, Vec<(CriterionKind, f64, bool)>)> = vec![
            (ExamLevel::Beginner, "HSKKSC1", "Nghe và nhắc lại",
                vec![ta(1.0, true), c(Pronunciation, 0.5), c(Fluency, 0.5)]),
            (ExamLevel::Beginner, "HSKKSC2", "Nghe và trả lời (câu ngắn)",
                vec![ta(1.5, false), c(Grammar, 0.5), c(Pronunciation, 0.5), c(Fluency, 0.5)]),
            (ExamLevel::Beginner, "HSKKSC3", "Trả lời câu hỏi (đoạn ngắn)",
                vec![ta(6.0, false), c(Pronunciation, 4.0), c(Grammar, 4.0),
                     c(Vocabulary, 2.0), c(Coherence, 2.0), c(Fluency, 2.0)]),
            (ExamLevel::Intermediate, "HSKKTC1", "Nghe và nhắc lại",
                vec![ta(1.5, true), c(Pronunciation, 1.0), c(Fluency, 0.5)]),
            (ExamLevel::Intermediate, "HSKKTC2", "Mô tả tranh (đoạn văn ngắn)",
                vec![ta(5.0, false), c(Pronunciation, 3.0), c(Grammar, 3.0),
                     c(Vocabulary, 1.0), c(Coherence, 1.0), c(Fluency, 2.0)]),
            (ExamLevel::Intermediate, "HSKKTC3", "Trả lời câu hỏi (đoạn ngắn)",
                vec![ta(6.0, false), c(Pronunciation, 4.0), c(Grammar, 4.0),
                     c(Vocabulary, 2.0), c(Coherence, 2.0), c(Fluency, 2.0)]),
            (ExamLevel::Advanced, "HSKKCC1", "Nghe và nhắc lại",
                vec![ta(4.0, true), c(Pronunciation, 2.0), c(Grammar, 2.0), c(Fluency, 2.0)]),
            (ExamLevel::Advanced, "HSKKCC2", "Đọc đoạn văn",
                vec![ta(10.0, true), c(Pronunciation, 5.0), c(Fluency, 5.0)]),
            (ExamLevel::Advanced, "HSKKCC3", "Trả lời câu hỏi (đoạn ngắn)",
                vec![ta(8.0, false), c(Pronunciation, 5.0), c(Grammar, 4.0),
                     c(Vocabulary, 2.0), c(Coherence, 3.0), c(Fluency, 3.0)]),
        ];

        let specs = table.into_iter().map(|(level, code, name, criteria)| TaskSpec {
            exam_level: level,
            task_code: code.to_string(),
            name: name.to_string(),
            criteria: criteria
                .into_iter()
                .map(|(id, max_score, requires_reference)| CriterionSpec {
                    id,
                    max_score,
                    display_name: None,
                    requires_reference,
                })
                .collect(),
            levels: default_levels(),
            reference_text: None,
        });

        let mut registry = Self::empty();
        for spec in specs {
            // Built-in specs satisfy every check in TaskSpec::build
            if let Ok(task) = spec.build() {
                registry.insert(task);
            }
        }
        registry
    }

    /// Parse a `[[tasks]]` TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TaskFile = toml::from_str(content)?;
        if file.tasks.is_empty() {
            return Err(Error::Config("Task file declares no tasks".to_string()));
        }

        let mut registry = Self::empty();
        for spec in file.tasks {
            let task = spec.build()?;
            let key = (task.exam_level, task.task_code.clone());
            if registry.tasks.contains_key(&key) {
                return Err(Error::Config(format!(
                    "Task {} declared twice for level {}",
                    key.1, key.0
                )));
            }
            registry.insert(task);
        }
        Ok(registry)
    }

    /// Load a task file, replacing the built-in table
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&content)?;
        info!(
            tasks = registry.len(),
            "Task table loaded from {}",
            path.display()
        );
        Ok(registry)
    }

    fn empty() -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn insert(&mut self, task: TaskDefinition) {
        let key = (task.exam_level, task.task_code.clone());
        self.order.push(key.clone());
        self.tasks.insert(key, Arc::new(task));
    }

    pub fn get(&self, level: ExamLevel, task_code: &str) -> Option<Arc<TaskDefinition>> {
        self.tasks
            .get(&(level, task_code.trim().to_ascii_uppercase()))
            .cloned()
    }

    /// Whether the task code exists under any level
    pub fn knows_task_code(&self, task_code: &str) -> bool {
        let code = task_code.trim().to_ascii_uppercase();
        self.order.iter().any(|(_, c)| *c == code)
    }

    /// Tasks in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<TaskDefinition>> {
        self.order.iter().filter_map(|key| self.tasks.get(key))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_nine_tasks() {
        let registry = CriteriaRegistry::builtin();
        assert_eq!(registry.len(), 9);

        let codes: Vec<&str> = registry.tasks().map(|t| t.task_code.as_str()).collect();
        assert_eq!(codes[0], "HSKKSC1");
        assert_eq!(codes[8], "HSKKCC3");
    }

    #[test]
    fn test_builtin_max_totals() {
        let registry = CriteriaRegistry::builtin();
        let total = |level, code| registry.get(level, code).unwrap().max_total();

        assert_eq!(total(ExamLevel::Beginner, "HSKKSC1"), 2.0);
        assert_eq!(total(ExamLevel::Beginner, "HSKKSC3"), 20.0);
        assert_eq!(total(ExamLevel::Intermediate, "HSKKTC2"), 15.0);
        assert_eq!(total(ExamLevel::Advanced, "HSKKCC2"), 20.0);
        assert_eq!(total(ExamLevel::Advanced, "HSKKCC3"), 25.0);
    }

    #[test]
    fn test_declared_order_and_sources() {
        let registry = CriteriaRegistry::builtin();
        let task = registry.get(ExamLevel::Beginner, "HSKKSC2").unwrap();
        let ids: Vec<CriterionKind> = task.criteria.iter().map(|c| c.id).collect();
        assert_eq!(
            ids,
            vec![
                CriterionKind::TaskAchievement,
                CriterionKind::Grammar,
                CriterionKind::Pronunciation,
                CriterionKind::Fluency
            ]
        );
        assert_eq!(task.criteria_from(DataSource::Acoustic).count(), 2);
        assert_eq!(task.criteria_from(DataSource::Judgment).count(), 2);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let registry = CriteriaRegistry::builtin();
        for task in registry.tasks() {
            let sum: f64 = task.criteria.iter().map(|c| c.weight_within_task).sum();
            assert!((sum - 1.0).abs() < 1e-9, "{} weights sum to {}", task.task_code, sum);
        }
    }

    #[test]
    fn test_lookup_is_level_scoped() {
        let registry = CriteriaRegistry::builtin();
        assert!(registry.get(ExamLevel::Advanced, "hskkcc1").is_some());
        assert!(registry.get(ExamLevel::Beginner, "HSKKCC1").is_none());
        assert!(registry.knows_task_code("HSKKCC1"));
        assert!(!registry.knows_task_code("HSKKXX9"));
    }

    #[test]
    fn test_level_for_percentage() {
        let registry = CriteriaRegistry::builtin();
        let task = registry.get(ExamLevel::Advanced, "HSKKCC3").unwrap();
        assert_eq!(task.level_for(95.0), "advanced");
        assert_eq!(task.level_for(80.0), "advanced");
        assert_eq!(task.level_for(79.9), "intermediate");
        assert_eq!(task.level_for(10.0), "elementary");
    }

    #[test]
    fn test_exam_level_parsing() {
        assert_eq!("101".parse::<ExamLevel>().unwrap(), ExamLevel::Beginner);
        assert_eq!("Advanced".parse::<ExamLevel>().unwrap(), ExamLevel::Advanced);
        assert!("104".parse::<ExamLevel>().is_err());

        let from_number: ExamLevel = serde_json::from_str("102").unwrap();
        assert_eq!(from_number, ExamLevel::Intermediate);
        let from_text: ExamLevel = serde_json::from_str("\"103\"").unwrap();
        assert_eq!(from_text, ExamLevel::Advanced);
        assert_eq!(serde_json::to_string(&ExamLevel::Beginner).unwrap(), "\"101\"");
    }

    #[test]
    fn test_task_file_parsing() {
        let content = r#"
            [[tasks]]
            exam_level = "101"
            task_code = "demo1"
            name = "Demo"
            reference_text = "你好"

            [[tasks.criteria]]
            id = "task_achievement"
            max_score = 3.0
            requires_reference = true

            [[tasks.criteria]]
            id = "fluency"
            max_score = 1.0
            display_name = "Fluency"

            [[tasks.levels]]
            label = "pass"
            min_percentage = 60.0

            [[tasks.levels]]
            label = "fail"
            min_percentage = 0.0
        "#;
        let registry = CriteriaRegistry::from_toml_str(content).unwrap();
        let task = registry.get(ExamLevel::Beginner, "DEMO1").unwrap();
        assert_eq!(task.max_total(), 4.0);
        assert_eq!(task.criteria[1].display_name, "Fluency");
        assert!(task.criteria[0].requires_reference);
        assert_eq!(task.reference_text.as_deref(), Some("你好"));
        assert_eq!(task.level_for(59.0), "fail");
    }

    #[test]
    fn test_task_file_rejects_duplicate_criterion() {
        let content = r#"
            [[tasks]]
            exam_level = 101
            task_code = "X1"
            name = "Dup"
            [[tasks.criteria]]
            id = "grammar"
            max_score = 1.0
            [[tasks.criteria]]
            id = "grammar"
            max_score = 2.0
        "#;
        assert!(matches!(
            CriteriaRegistry::from_toml_str(content),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_task_file_rejects_non_positive_max() {
        let content = r#"
            [[tasks]]
            exam_level = 101
            task_code = "X1"
            name = "Zero"
            [[tasks.criteria]]
            id = "grammar"
            max_score = 0.0
        "#;
        assert!(CriteriaRegistry::from_toml_str(content).is_err());
    }
}
