//! Spam classification
//!
//! A whitelist gate followed by a fixed, ordered list of checks. The first
//! check that reports a reason decides the verdict.

pub mod checks;
pub mod whitelist;

pub use checks::{
    DomainBlacklistCheck, ExternalHeaderCheck, HeaderSanityCheck, KeywordBlacklistCheck,
    SuspiciousPatternCheck,
};
pub use whitelist::WhitelistSet;

use crate::message::MessageRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    pub enabled: bool,
    pub spam_folder: String,
    pub spam_score_threshold: f64,
    pub check_external_headers: bool,
    /// Headers whose positive value (`YES`, `TRUE`, `1`) marks spam
    pub external_flag_headers: Vec<String>,
    /// Headers carrying a numeric score, compared with the threshold
    pub external_score_headers: Vec<String>,
    /// Exact domains or `*.suffix` wildcards
    pub blacklist_domains: Vec<String>,
    pub blacklist_keywords_subject: Vec<String>,
    pub suspicious_subject_patterns: Vec<String>,
    pub whitelist_domains: Vec<String>,
    pub required_headers: Vec<String>,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spam_folder: "Spam".to_string(),
            spam_score_threshold: 5.0,
            check_external_headers: false,
            external_flag_headers: vec!["X-Spam-Flag".to_string(), "X-Spam-Status".to_string()],
            external_score_headers: vec![
                "X-Spam-Score".to_string(),
                "X-Rspamd-Score".to_string(),
                "X-Spam-Status".to_string(),
            ],
            blacklist_domains: Vec::new(),
            blacklist_keywords_subject: Vec::new(),
            suspicious_subject_patterns: Vec::new(),
            whitelist_domains: Vec::new(),
            required_headers: vec!["Message-ID".to_string(), "Date".to_string()],
        }
    }
}

impl SpamConfig {
    /// Load a stand-alone spam document, JSON or YAML by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spam rules: {}", path.display()))?;
        let config = if crate::rules::is_json(path) {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse spam rules: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse spam rules: {}", path.display()))?
        };
        Ok(config)
    }

    /// Problems that degrade classification without stopping it
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if !self.spam_score_threshold.is_finite() {
            problems.push(format!(
                "spam_score_threshold {} is not a finite number",
                self.spam_score_threshold
            ));
        }
        if self.enabled && self.spam_folder.trim().is_empty() {
            problems.push("spam_folder is empty".to_string());
        }
        for (i, pattern) in self.suspicious_subject_patterns.iter().enumerate() {
            if let Err(e) = checks::compile_pattern(pattern) {
                problems.push(format!("suspicious pattern #{} '{}' is invalid: {}", i, pattern, e));
            }
        }
        for entry in &self.blacklist_domains {
            let entry = entry.trim();
            if entry.is_empty() || entry == "*" || entry == "*." {
                problems.push(format!("blacklist domain '{}' matches nothing", entry));
            }
        }

        problems
    }
}

/// Why a message was classified as spam
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpamReason {
    ExternalHeader { header: String, value: String },
    BlacklistedDomain { pattern: String },
    BlacklistedKeyword { keyword: String },
    SuspiciousPattern { index: usize, pattern: String },
    MissingHeaders { headers: Vec<String> },
}

impl fmt::Display for SpamReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpamReason::ExternalHeader { header, value } => {
                write!(f, "external score/flag: {}={}", header, value)
            }
            SpamReason::BlacklistedDomain { pattern } => {
                write!(f, "blacklisted domain: {}", pattern)
            }
            SpamReason::BlacklistedKeyword { keyword } => {
                write!(f, "blacklisted keyword: {}", keyword)
            }
            SpamReason::SuspiciousPattern { index, pattern } => {
                write!(f, "suspicious subject pattern #{}: {}", index, pattern)
            }
            SpamReason::MissingHeaders { headers } => {
                write!(f, "missing required headers: {}", headers.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpamVerdict {
    pub is_spam: bool,
    pub reason: Option<SpamReason>,
}

impl SpamVerdict {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn spam(reason: SpamReason) -> Self {
        Self {
            is_spam: true,
            reason: Some(reason),
        }
    }
}

/// One stage of the spam pipeline
pub trait SpamCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, message: &MessageRecord) -> Option<SpamReason>;
}

pub struct SpamClassifier {
    enabled: bool,
    checks: Vec<Box<dyn SpamCheck>>,
}

impl SpamClassifier {
    pub fn new(config: &SpamConfig) -> Self {
        let mut checks: Vec<Box<dyn SpamCheck>> = Vec::new();

        if config.check_external_headers {
            checks.push(Box::new(ExternalHeaderCheck::new(config)));
        }
        checks.push(Box::new(DomainBlacklistCheck::new(&config.blacklist_domains)));
        checks.push(Box::new(KeywordBlacklistCheck::new(
            &config.blacklist_keywords_subject,
        )));
        checks.push(Box::new(SuspiciousPatternCheck::new(
            &config.suspicious_subject_patterns,
        )));
        checks.push(Box::new(HeaderSanityCheck::new(&config.required_headers)));

        Self {
            enabled: config.enabled,
            checks,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Names of the active checks in evaluation order
    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn classify(&self, message: &MessageRecord, whitelist: &WhitelistSet) -> SpamVerdict {
        if !self.enabled {
            return SpamVerdict::clean();
        }

        if let Some(domain) = message.sender_domain() {
            if whitelist.contains(&domain) {
                log::debug!("Sender domain {} is whitelisted", domain);
                return SpamVerdict::clean();
            }
        }

        for check in &self.checks {
            if let Some(reason) = check.check(message) {
                log::debug!(
                    "Spam check '{}' flagged '{}': {}",
                    check.name(),
                    message.sender,
                    reason
                );
                return SpamVerdict::spam(reason);
            }
        }

        SpamVerdict::clean()
    }
}
