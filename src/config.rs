use crate::rules::{is_json, Rule, RuleSet};
use crate::spam::SpamConfig;
use crate::suggest::{default_categories, Category, SuggestionConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Separate `{"rules": [...]}` document, replaces `rules` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
    #[serde(default)]
    pub spam: SpamConfig,
    /// Separate spam document, replaces `spam` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spam_file: Option<PathBuf>,
    #[serde(default = "default_categories")]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
    /// Directory relative `rules_file`/`spam_file` paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rules: vec![
                Rule::new("Newsletter", "Newsletter")
                    .from_contains(&["newsletter", "info@"])
                    .subject_contains(&["newsletter", "weekly digest"]),
                Rule::new("Social Media", "Social").from_contains(&[
                    "facebook.com",
                    "twitter.com",
                    "linkedin.com",
                ]),
                Rule::new("Shopping", "Shopping")
                    .from_contains(&["amazon", "ebay", "shop"])
                    .subject_contains(&["order", "shipped", "delivery"]),
            ],
            rules_file: None,
            spam: SpamConfig::default(),
            spam_file: None,
            categories: default_categories(),
            suggestions: SuggestionConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Config = if is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        };
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Like `from_file`, but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "Config file {} not found, using default configuration",
                path.display()
            );
            Ok(Self::default())
        }
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Resolved location of the external rules document, if any
    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules_file.as_ref().map(|p| self.base_dir.join(p))
    }

    pub fn spam_path(&self) -> Option<PathBuf> {
        self.spam_file.as_ref().map(|p| self.base_dir.join(p))
    }

    /// Rules for this run, from `rules_file` when configured
    pub fn rule_set(&self) -> Result<RuleSet> {
        match self.rules_path() {
            Some(path) => RuleSet::from_file(&path),
            None => Ok(RuleSet::new(self.rules.clone())),
        }
    }

    /// Spam settings for this run, from `spam_file` when configured
    pub fn spam_config(&self) -> Result<SpamConfig> {
        match self.spam_path() {
            Some(path) => SpamConfig::from_file(&path),
            None => Ok(self.spam.clone()),
        }
    }

    /// Everything worth telling the user about; empty when the config is sane
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut problems = self.rule_set()?.validate();
        problems.extend(
            self.spam_config()?
                .validate()
                .into_iter()
                .map(|p| format!("spam: {}", p)),
        );

        for (i, category) in self.categories.iter().enumerate() {
            if category.name.trim().is_empty() {
                problems.push(format!("Category {}: empty name", i + 1));
            }
            if category.keywords.iter().all(|k| k.trim().is_empty()) {
                problems.push(format!(
                    "Category {} '{}': no keywords",
                    i + 1,
                    category.name
                ));
            }
        }
        if self.suggestions.fallback_category.trim().is_empty() {
            problems.push("suggestions: fallback_category is empty".to_string());
        }

        Ok(problems)
    }
}
