use crate::message::MessageRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Substring conditions of a rule; every list is OR-combined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_contains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to_contains: Vec<String>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.from_contains.is_empty()
            && self.subject_contains.is_empty()
            && self.to_contains.is_empty()
    }

    /// True if any substring of any non-empty list occurs in its field
    pub fn matches(&self, message: &MessageRecord) -> bool {
        contains_any(&message.sender, &self.from_contains)
            || contains_any(&message.subject, &self.subject_contains)
            || contains_any(message.to(), &self.to_contains)
    }
}

fn contains_any(field: &str, needles: &[String]) -> bool {
    if needles.is_empty() {
        return false;
    }
    let field_lower = field.to_lowercase();
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .any(|needle| field_lower.contains(&needle.to_lowercase()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub folder: String,
    #[serde(default)]
    pub conditions: Conditions,
}

impl Rule {
    pub fn new(name: &str, folder: &str) -> Self {
        Self {
            name: name.to_string(),
            folder: folder.to_string(),
            conditions: Conditions::default(),
        }
    }

    pub fn from_contains(mut self, needles: &[&str]) -> Self {
        self.conditions
            .from_contains
            .extend(needles.iter().map(|s| s.to_string()));
        self
    }

    pub fn subject_contains(mut self, needles: &[&str]) -> Self {
        self.conditions
            .subject_contains
            .extend(needles.iter().map(|s| s.to_string()));
        self
    }

    pub fn to_contains(mut self, needles: &[&str]) -> Self {
        self.conditions
            .to_contains
            .extend(needles.iter().map(|s| s.to_string()));
        self
    }

    pub fn matches(&self, message: &MessageRecord) -> bool {
        self.conditions.matches(message)
    }
}

/// Result of merging candidate rules into a rule set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

/// Ordered rules; the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// First rule, in configured order, whose conditions hold
    pub fn evaluate(&self, message: &MessageRecord) -> Option<&Rule> {
        let matched = self.rules.iter().find(|rule| rule.matches(message));
        if let Some(rule) = matched {
            log::debug!("Rule '{}' matched sender '{}'", rule.name, message.sender);
        }
        matched
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.rules.iter().any(|rule| rule.name == name)
    }

    /// Whether some rule already filters on exactly this sender fragment
    pub fn has_from_entry(&self, entry: &str) -> bool {
        let entry = entry.trim().to_lowercase();
        self.rules.iter().any(|rule| {
            rule.conditions
                .from_contains
                .iter()
                .any(|existing| existing.trim().to_lowercase() == entry)
        })
    }

    /// Append rules whose name is not taken yet
    pub fn merge<I>(&mut self, candidates: I) -> MergeOutcome
    where
        I: IntoIterator<Item = Rule>,
    {
        let mut outcome = MergeOutcome::default();
        let mut names: HashSet<String> = self.rules.iter().map(|r| r.name.clone()).collect();

        for rule in candidates {
            if !rule.name.is_empty() && names.insert(rule.name.clone()) {
                log::info!("Added rule: {}", rule.name);
                outcome.added.push(rule.name.clone());
                self.rules.push(rule);
            } else {
                log::info!("Skipped duplicate: {}", rule.name);
                outcome.skipped.push(rule.name);
            }
        }

        outcome
    }

    /// Problems a user should fix; none of them stop classification.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (i, rule) in self.rules.iter().enumerate() {
            let label = if rule.name.is_empty() {
                format!("Rule {}", i + 1)
            } else {
                format!("Rule {} '{}'", i + 1, rule.name)
            };

            if rule.name.trim().is_empty() {
                problems.push(format!("{label}: empty name"));
            } else if !seen.insert(rule.name.as_str()) {
                problems.push(format!("{label}: duplicate name"));
            }
            if rule.folder.trim().is_empty() {
                problems.push(format!("{label}: empty folder"));
            }
            if rule.conditions.is_empty() {
                problems.push(format!("{label}: no conditions, never matches"));
            }
        }

        problems
    }

    /// Load a `{"rules": [...]}` document, JSON or YAML by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        let rules: RuleSet = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse rules file: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse rules file: {}", path.display()))?
        };
        Ok(rules)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if !content.ends_with('\n') {
            content.push('\n');
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write rules file: {}", path.display()))?;
        Ok(())
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
