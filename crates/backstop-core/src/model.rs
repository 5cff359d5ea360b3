use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(default)]
    pub no_include: bool,
    #[serde(default)]
    pub directories: Vec<Directory>,
    #[serde(default)]
    pub skips: Vec<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, Rule>,
}

impl Configuration {
    pub fn directory(&self, path: &str) -> Option<&Directory> {
        self.directories
            .iter()
            .find(|directory| directory.path == path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Directory {
    pub path: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rules: Vec::new(),
        }
    }
}

/// A named exclusion rule.
///
/// The wire form carries no tag: a bare array is a merge of other rules, a
/// record is a concrete rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Rule {
    Merge(Vec<String>),
    Concrete(ConcreteRule),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConcreteRule {
    pub excludes: Vec<String>,
    #[serde(default)]
    pub if_exists: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Concrete,
    Merge,
}

impl RuleKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Concrete => "concrete",
            Self::Merge => "merge",
        }
    }
}

impl Rule {
    pub fn empty(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Concrete => Self::Concrete(ConcreteRule::default()),
            RuleKind::Merge => Self::Merge(Vec::new()),
        }
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Concrete(_) => RuleKind::Concrete,
            Self::Merge(_) => RuleKind::Merge,
        }
    }
}

/// Backend-driven scan state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "step", content = "content", rename_all = "kebab-case")]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning {
        current_path: String,
        found: u64,
    },
    Result(ActionBatch),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActionBatch {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl ActionBatch {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.remove.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApplyErrors {
    #[serde(default)]
    pub errors: BTreeMap<String, String>,
}

impl ApplyErrors {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Metrics {
    #[serde(default)]
    pub files_excluded: u64,
    #[serde(default)]
    pub files_included: u64,
    #[serde(default)]
    pub last_excluded: String,
    #[serde(default)]
    pub last_excluded_time: u64,
}

pub type Properties = serde_json::Map<String, serde_json::Value>;
