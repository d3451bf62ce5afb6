use crate::message::MessageRecord;
use crate::rules::RuleSet;
use crate::spam::{SpamClassifier, SpamConfig, SpamReason, WhitelistSet};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Spam,
    RuleMatch,
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spam_reason: Option<SpamReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_folder: Option<String>,
}

impl ClassificationResult {
    pub fn spam(reason: SpamReason, folder: &str) -> Self {
        Self {
            disposition: Disposition::Spam,
            matched_rule_name: None,
            spam_reason: Some(reason),
            target_folder: Some(folder.to_string()),
        }
    }

    pub fn rule_match(name: &str, folder: &str) -> Self {
        Self {
            disposition: Disposition::RuleMatch,
            matched_rule_name: Some(name.to_string()),
            spam_reason: None,
            target_folder: Some(folder.to_string()),
        }
    }

    pub fn unmatched() -> Self {
        Self {
            disposition: Disposition::Unmatched,
            matched_rule_name: None,
            spam_reason: None,
            target_folder: None,
        }
    }

    pub fn is_spam(&self) -> bool {
        self.disposition == Disposition::Spam
    }
}

/// Spam gate first, then the first matching rule.
///
/// Built once per run; the whitelist is derived at construction.
pub struct ClassificationEngine {
    rules: RuleSet,
    spam_folder: String,
    classifier: SpamClassifier,
    whitelist: WhitelistSet,
}

impl ClassificationEngine {
    pub fn new(rules: RuleSet, spam: &SpamConfig) -> Self {
        let whitelist = WhitelistSet::from_rules(&rules, spam);
        let classifier = SpamClassifier::new(spam);
        log::debug!(
            "Classification engine: {} rules, spam filter {}",
            rules.len(),
            if classifier.is_enabled() { "enabled" } else { "disabled" }
        );
        Self {
            classifier,
            spam_folder: spam.spam_folder.clone(),
            rules,
            whitelist,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn whitelist(&self) -> &WhitelistSet {
        &self.whitelist
    }

    pub fn classifier(&self) -> &SpamClassifier {
        &self.classifier
    }

    pub fn classify_message(&self, message: &MessageRecord) -> ClassificationResult {
        let verdict = self.classifier.classify(message, &self.whitelist);
        if let (true, Some(reason)) = (verdict.is_spam, verdict.reason) {
            return ClassificationResult::spam(reason, &self.spam_folder);
        }

        match self.rules.evaluate(message) {
            Some(rule) => ClassificationResult::rule_match(&rule.name, &rule.folder),
            None => ClassificationResult::unmatched(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    fn rules() -> RuleSet {
        RuleSet::new(vec![
            Rule::new("Russia", "Foreign").from_contains(&["spam.ru"]),
            Rule::new("Prizes", "Prizes").subject_contains(&["won"]),
        ])
    }

    fn spam_config() -> SpamConfig {
        SpamConfig {
            enabled: true,
            blacklist_domains: vec!["*.ru".to_string()],
            required_headers: Vec::new(),
            ..SpamConfig::default()
        }
    }

    #[test]
    fn test_spam_skips_rules() {
        // spam.ru from a rule would whitelist it, so use a rule set without it
        let engine = ClassificationEngine::new(
            RuleSet::new(vec![Rule::new("Prizes", "Prizes").subject_contains(&["won"])]),
            &spam_config(),
        );
        let result = engine.classify_message(&MessageRecord::new("x@spam.ru", "YOU WON $$$"));
        assert_eq!(result.disposition, Disposition::Spam);
        assert_eq!(result.target_folder.as_deref(), Some("Spam"));
        assert!(result.matched_rule_name.is_none());
        assert_eq!(
            result.spam_reason.map(|r| r.to_string()),
            Some("blacklisted domain: *.ru".to_string())
        );
    }

    #[test]
    fn test_rule_domains_are_whitelisted() {
        let engine = ClassificationEngine::new(rules(), &spam_config());
        let result = engine.classify_message(&MessageRecord::new("x@spam.ru", "YOU WON $$$"));
        assert_eq!(result, ClassificationResult::rule_match("Russia", "Foreign"));
    }

    #[test]
    fn test_spam_disabled_only_rules_decide() {
        let engine = ClassificationEngine::new(
            rules(),
            &SpamConfig {
                enabled: false,
                ..spam_config()
            },
        );
        let result = engine.classify_message(&MessageRecord::new("x@other.ru", "you won"));
        assert_eq!(result, ClassificationResult::rule_match("Prizes", "Prizes"));

        let result = engine.classify_message(&MessageRecord::new("x@other.ru", "hello"));
        assert_eq!(result, ClassificationResult::unmatched());
        assert!(!result.is_spam());
    }

    #[test]
    fn test_no_rules_is_unmatched() {
        let engine = ClassificationEngine::new(RuleSet::default(), &SpamConfig::default());
        let result = engine.classify_message(&MessageRecord::new("", ""));
        assert_eq!(result.disposition, Disposition::Unmatched);
        assert!(result.target_folder.is_none());
    }
}
