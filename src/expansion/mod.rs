//! Rule-based query expansion
//!
//! A question is broadened into several related queries before retrieval so
//! that passages phrased differently from the question still get recalled.
//! Expansion is a declarative table: each rule lists trigger keywords and the
//! phrases appended when any trigger occurs in the lowercased question. Rules
//! are evaluated in table order and every matching rule contributes.

use crate::error::{KbError, Result};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default upper bound on expanded queries (root question included)
pub const DEFAULT_MAX_QUERIES: usize = 6;

/// One trigger-set → expansion-phrases entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpansionRule {
    pub name: String,
    /// Lowercase substrings; any match fires the rule
    pub triggers: Vec<String>,
    pub phrases: Vec<String>,
}

impl ExpansionRule {
    fn new(name: &str, triggers: &[&str], phrases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            triggers: triggers.iter().map(|t| t.to_lowercase()).collect(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Whether any trigger occurs in the already-lowercased question
    pub fn matches(&self, lowered: &str) -> bool {
        self.triggers
            .iter()
            .any(|t| !t.is_empty() && lowered.contains(t.as_str()))
    }
}

/// Expansion table file structure (`[[rule]]` entries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionFile {
    pub rule: Vec<ExpansionRule>,
}

/// Query expander driven by an ordered rule table
#[derive(Debug, Clone)]
pub struct QueryExpander {
    rules: Vec<ExpansionRule>,
}

impl QueryExpander {
    pub fn new(rules: Vec<ExpansionRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.triggers = rule.triggers.iter().map(|t| t.to_lowercase()).collect();
                rule
            })
            .collect();
        Self { rules }
    }

    /// Built-in FSHD rule table
    pub fn builtin() -> Self {
        Self::new(vec![
            ExpansionRule::new(
                "disease",
                &["fshd", "面肩肱", "肌营养不良", "肌肉萎缩", "dystrophy"],
                &[
                    "FSHD 面肩肱型肌营养不良症 概述",
                    "FSHD 症状 表现 病程进展",
                    "FSHD 治疗 管理 方法",
                ],
            ),
            ExpansionRule::new(
                "genetics",
                &[
                    "遗传", "基因", "家族", "dux4", "d4z4", "smchd1", "genetic", "inherit",
                ],
                &[
                    "FSHD 遗传方式 常染色体显性遗传",
                    "D4Z4 重复序列 缩短 DUX4 表达",
                    "FSHD 基因检测 遗传咨询",
                ],
            ),
            ExpansionRule::new(
                "symptoms_rehab",
                &[
                    "症状", "康复", "锻炼", "运动", "无力", "疼痛", "疲劳", "rehab", "exercise",
                    "pain",
                ],
                &[
                    "FSHD 康复训练 运动建议",
                    "FSHD 肌无力 疼痛 疲劳 管理",
                    "FSHD 日常生活 注意事项",
                ],
            ),
            ExpansionRule::new(
                "diagnosis",
                &["检查", "诊断", "肌电图", "活检", "核磁", "diagnos", "mri"],
                &["FSHD 诊断 检查 方法", "FSHD 肌电图 肌肉活检 MRI"],
            ),
            ExpansionRule::new(
                "treatment",
                &["治疗", "药物", "临床试验", "treatment", "trial", "drug"],
                &["FSHD 治疗 药物 研究进展", "FSHD 临床试验 招募"],
            ),
        ])
    }

    /// Load a rule table from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to read expansion rules: {:?}", path),
        })?;
        let file: ExpansionFile = toml::from_str(&content)?;
        Ok(Self::new(file.rule))
    }

    pub fn rules(&self) -> &[ExpansionRule] {
        &self.rules
    }

    /// Expand a question into at most `max_queries` related queries
    ///
    /// The trimmed question always comes first. Duplicates are removed keeping
    /// the first occurrence. Blank input yields an empty list.
    pub fn expand(&self, question: &str, max_queries: usize) -> Vec<String> {
        let root = question.trim();
        if root.is_empty() || max_queries == 0 {
            return Vec::new();
        }

        let lowered = root.to_lowercase();
        let candidates = std::iter::once(root.to_string()).chain(
            self.rules
                .iter()
                .filter(|rule| rule.matches(&lowered))
                .flat_map(|rule| rule.phrases.iter().map(|p| p.trim().to_string())),
        );

        let mut seen: AHashSet<String> = AHashSet::new();
        let queries: Vec<String> = candidates
            .filter(|q| !q.is_empty())
            .filter(|q| seen.insert(q.clone()))
            .take(max_queries)
            .collect();

        tracing::debug!(question = %root, queries = ?queries, "Query expanded");
        queries
    }
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::builtin()
    }
}
