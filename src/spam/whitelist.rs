use super::SpamConfig;
use crate::domain_utils::DomainUtils;
use crate::rules::RuleSet;
use std::collections::BTreeSet;

/// Sender domains that are never spam.
///
/// Built once per run from the domain-looking `from_contains` entries of the
/// rules plus the configured whitelist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhitelistSet {
    domains: Vec<String>,
    wildcards: Vec<String>,
}

impl WhitelistSet {
    pub fn new(entries: &[String]) -> Self {
        let mut set = Self::default();
        set.extend(entries.iter().map(String::as_str));
        set
    }

    pub fn from_rules(rules: &RuleSet, config: &SpamConfig) -> Self {
        let mut set = Self::new(&config.whitelist_domains);
        let from_rules: BTreeSet<String> = rules
            .iter()
            .flat_map(|rule| rule.conditions.from_contains.iter())
            .filter_map(|entry| DomainUtils::domain_from_condition(entry))
            .collect();
        set.extend(from_rules.iter().map(String::as_str));

        log::debug!(
            "Whitelist built with {} domains and {} wildcards",
            set.domains.len(),
            set.wildcards.len()
        );
        set
    }

    fn extend<'a, I: IntoIterator<Item = &'a str>>(&mut self, entries: I) {
        for entry in entries {
            let entry = entry.trim().trim_end_matches('.').to_lowercase();
            if entry.is_empty() {
                continue;
            }
            let target = if entry.starts_with("*.") {
                &mut self.wildcards
            } else {
                &mut self.domains
            };
            if !target.contains(&entry) {
                target.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len() + self.wildcards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact or subdomain match, `*.suffix` entries by label boundary
    pub fn contains(&self, domain: &str) -> bool {
        DomainUtils::matches_domain_list(domain, &self.domains)
            || self
                .wildcards
                .iter()
                .any(|pattern| DomainUtils::matches_pattern(domain, pattern))
    }
}
