use crate::aggregate::{DomainGroup, DEFAULT_EXAMPLE_LIMIT};
use crate::domain_utils::UNKNOWN_DOMAIN;
use crate::rules::{Rule, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Leading labels that say nothing about the sender
const INSIGNIFICANT_LABELS: &[&str] = &[
    "www", "mail", "mails", "email", "e", "news", "newsletter", "info", "noreply", "no-reply",
    "mailer", "bounce", "smtp", "m",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered category table; earlier categories win
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new(
            "Shopping",
            &["shop", "store", "retail", "amazon", "ebay", "kaufen", "sale"],
        ),
        Category::new(
            "Streaming",
            &["netflix", "spotify", "youtube", "prime", "video", "music", "disney"],
        ),
        Category::new(
            "Finance",
            &["bank", "paypal", "payment", "invoice", "rechnung", "zahlung", "finance"],
        ),
        Category::new("Newsletter", &["newsletter", "news", "blog", "update", "digest"]),
        Category::new(
            "Social",
            &["facebook", "twitter", "linkedin", "instagram", "xing", "social"],
        ),
        Category::new(
            "Contracts",
            &["vertrag", "contract", "subscription", "abo", "service"],
        ),
        Category::new(
            "DevOps",
            &["github", "gitlab", "docker", "aws", "cloud", "server", "deploy"],
        ),
        Category::new(
            "Notifications",
            &["notification", "alert", "benachrichtigung", "reminder"],
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    pub folder_prefix: String,
    pub fallback_category: String,
    /// Domains with fewer unmatched messages get no suggestion
    pub min_messages: usize,
    pub max_suggestions: Option<usize>,
    pub example_limit: usize,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            folder_prefix: "INBOX".to_string(),
            fallback_category: "Unsorted".to_string(),
            min_messages: 1,
            max_suggestions: None,
            example_limit: DEFAULT_EXAMPLE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedRule {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub source_domain: String,
    pub message_count: usize,
}

struct CategoryMatch<'a> {
    name: &'a str,
    /// Keyword that hit the domain, if the domain decided
    domain_keyword: Option<&'a str>,
}

/// Turns unmatched domain groups into candidate rules
pub struct RuleSuggester<'a> {
    categories: &'a [Category],
    rules: &'a RuleSet,
    config: &'a SuggestionConfig,
}

impl<'a> RuleSuggester<'a> {
    pub fn new(
        categories: &'a [Category],
        rules: &'a RuleSet,
        config: &'a SuggestionConfig,
    ) -> Self {
        Self {
            categories,
            rules,
            config,
        }
    }

    /// One suggestion per new domain group, in aggregation order
    pub fn suggest(&self, groups: &[DomainGroup]) -> Vec<SuggestedRule> {
        let mut suggestions = Vec::new();
        let mut names: HashSet<String> = HashSet::new();

        for group in groups {
            if let Some(max) = self.config.max_suggestions {
                if suggestions.len() >= max {
                    break;
                }
            }
            if group.domain == UNKNOWN_DOMAIN || group.domain.is_empty() {
                continue;
            }
            if group.count < self.config.min_messages {
                continue;
            }
            if self.rules.has_from_entry(&group.domain) {
                log::debug!("Domain {} already covered by a rule", group.domain);
                continue;
            }

            let suggestion = self.suggest_for(group);
            if self.rules.contains_name(&suggestion.rule.name)
                || !names.insert(suggestion.rule.name.clone())
            {
                log::debug!("Suggestion '{}' already exists", suggestion.rule.name);
                continue;
            }
            suggestions.push(suggestion);
        }

        log::info!("Generated {} rule suggestions", suggestions.len());
        suggestions
    }

    fn suggest_for(&self, group: &DomainGroup) -> SuggestedRule {
        let category = self.infer_category(group);
        let keyword = category.as_ref().and_then(|c| c.domain_keyword);
        let display = display_name(&group.domain, keyword);

        // fallback rules carry the full domain in name and folder
        let (category_name, leaf) = match &category {
            Some(c) => (c.name, display),
            None => (self.config.fallback_category.as_str(), group.domain.clone()),
        };

        let folder = [self.config.folder_prefix.as_str(), category_name, leaf.as_str()]
            .iter()
            .map(|part| part.trim_matches('/'))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");

        let mut rule = Rule::new(&format!("{} » {}", category_name, leaf), &folder);
        rule.conditions.from_contains.push(group.domain.clone());

        SuggestedRule {
            rule,
            category: category.map(|c| c.name.to_string()),
            source_domain: group.domain.clone(),
            message_count: group.count,
        }
    }

    fn infer_category(&self, group: &DomainGroup) -> Option<CategoryMatch<'a>> {
        let domain = group.domain.to_lowercase();
        for category in self.categories {
            if let Some(keyword) = category
                .keywords
                .iter()
                .find(|k| !k.is_empty() && domain.contains(&k.to_lowercase()))
            {
                return Some(CategoryMatch {
                    name: &category.name,
                    domain_keyword: Some(keyword),
                });
            }
        }

        let subjects = group
            .example_messages
            .iter()
            .take(self.config.example_limit)
            .map(|m| m.subject.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        self.categories
            .iter()
            .find(|category| {
                category
                    .keywords
                    .iter()
                    .any(|k| !k.is_empty() && subjects.contains(&k.to_lowercase()))
            })
            .map(|category| CategoryMatch {
                name: &category.name,
                domain_keyword: None,
            })
    }
}

/// Leading significant label of a domain, title-cased.
///
/// `mail.newstore.com` with keyword `store` gives `NewStore`,
/// `my-bank.de` gives `MyBank`.
pub fn display_name(domain: &str, keyword: Option<&str>) -> String {
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let mut start = 0;
    while labels.len() - start > 2 && INSIGNIFICANT_LABELS.contains(&labels[start]) {
        start += 1;
    }
    let label = match labels.get(start) {
        Some(label) => label.to_lowercase(),
        None => return capitalize(domain),
    };

    let keyword = keyword.map(str::to_lowercase);
    let mut display = String::new();
    for part in label.split(['-', '_']).filter(|p| !p.is_empty()) {
        match keyword.as_deref() {
            Some(k) if !k.is_empty() && part != k && part.contains(k) => {
                // "newstore" around "store" -> "new", "store"
                let mut rest = part;
                while let Some(pos) = rest.find(k) {
                    display.push_str(&capitalize(&rest[..pos]));
                    display.push_str(&capitalize(k));
                    rest = &rest[pos + k.len()..];
                }
                display.push_str(&capitalize(rest));
            }
            _ => display.push_str(&capitalize(part)),
        }
    }

    if display.is_empty() {
        capitalize(&label)
    } else {
        display
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ExampleMessage;

    fn group(domain: &str, count: usize, subjects: &[&str]) -> DomainGroup {
        DomainGroup {
            domain: domain.to_string(),
            count,
            example_messages: subjects
                .iter()
                .map(|s| ExampleMessage {
                    from: format!("info@{}", domain),
                    subject: s.to_string(),
                })
                .collect(),
        }
    }

    fn suggest(groups: &[DomainGroup], rules: &RuleSet) -> Vec<SuggestedRule> {
        let categories = default_categories();
        let config = SuggestionConfig::default();
        RuleSuggester::new(&categories, rules, &config).suggest(groups)
    }

    #[test]
    fn test_domain_keyword_category() {
        let suggestions = suggest(
            &[group("newstore.com", 1, &["Weekly deals inside!"])],
            &RuleSet::default(),
        );
        assert_eq!(suggestions.len(), 1);
        let s = &suggestions[0];
        assert_eq!(s.rule.name, "Shopping » NewStore");
        assert_eq!(s.rule.folder, "INBOX/Shopping/NewStore");
        assert_eq!(s.rule.conditions.from_contains, vec!["newstore.com"]);
        assert_eq!(s.category.as_deref(), Some("Shopping"));
        assert_eq!(s.source_domain, "newstore.com");
        assert_eq!(s.message_count, 1);
    }

    #[test]
    fn test_subject_keyword_category() {
        let suggestions = suggest(
            &[group("acme-corp.example", 4, &["Your invoice for March"])],
            &RuleSet::default(),
        );
        assert_eq!(suggestions[0].rule.name, "Finance » AcmeCorp");
        assert_eq!(suggestions[0].rule.folder, "INBOX/Finance/AcmeCorp");
    }

    #[test]
    fn test_fallback_uses_domain_folder() {
        let suggestions = suggest(&[group("zyx.example", 2, &["Hello"])], &RuleSet::default());
        assert_eq!(suggestions[0].category, None);
        assert_eq!(suggestions[0].rule.name, "Unsorted » zyx.example");
        assert_eq!(suggestions[0].rule.folder, "INBOX/Unsorted/zyx.example");
    }

    #[test]
    fn test_fallback_domains_with_same_label_both_suggested() {
        let groups = [
            group("zyx.example", 3, &["Hello"]),
            group("zyx.org", 1, &["Hi there"]),
        ];
        let suggestions = suggest(&groups, &RuleSet::default());
        let names: Vec<&str> = suggestions.iter().map(|s| s.rule.name.as_str()).collect();
        assert_eq!(names, vec!["Unsorted » zyx.example", "Unsorted » zyx.org"]);

        // once applied, neither comes back
        let mut rules = RuleSet::default();
        rules.merge(suggestions.into_iter().map(|s| s.rule));
        assert!(suggest(&groups, &rules).is_empty());
    }

    #[test]
    fn test_category_order_decides() {
        // "newsletter-shop" hits Shopping before Newsletter
        let suggestions = suggest(&[group("newsletter-shop.example", 1, &[])], &RuleSet::default());
        assert_eq!(suggestions[0].category.as_deref(), Some("Shopping"));
    }

    #[test]
    fn test_existing_rules_prevent_duplicates() {
        let rules = RuleSet::new(vec![
            Rule::new("Shopping » NewStore", "Elsewhere").from_contains(&["other.example"]),
            Rule::new("Spotify", "Music").from_contains(&["Spotify.com"]),
        ]);
        let suggestions = suggest(
            &[
                group("newstore.com", 3, &[]),
                group("spotify.com", 2, &[]),
                group("zyx.example", 1, &[]),
            ],
            &rules,
        );
        let domains: Vec<&str> = suggestions.iter().map(|s| s.source_domain.as_str()).collect();
        assert_eq!(domains, vec!["zyx.example"]);
    }

    #[test]
    fn test_same_name_within_run_suggested_once() {
        let suggestions = suggest(
            &[group("newstore.com", 3, &[]), group("newstore.de", 1, &[])],
            &RuleSet::default(),
        );
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].source_domain, "newstore.com");
    }

    #[test]
    fn test_unknown_and_small_groups_skipped() {
        let categories = default_categories();
        let rules = RuleSet::default();
        let config = SuggestionConfig {
            min_messages: 2,
            max_suggestions: Some(1),
            ..SuggestionConfig::default()
        };
        let suggester = RuleSuggester::new(&categories, &rules, &config);
        let suggestions = suggester.suggest(&[
            group("unknown", 9, &[]),
            group("a.example", 3, &[]),
            group("b.example", 2, &[]),
            group("c.example", 1, &[]),
        ]);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].source_domain, "a.example");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("mail.newstore.com", Some("store")), "NewStore");
        assert_eq!(display_name("www.my-bank.de", Some("bank")), "MyBank");
        assert_eq!(display_name("shop.example", Some("shop")), "Shop");
        assert_eq!(display_name("news.com", None), "News");
        assert_eq!(display_name("github.com", Some("github")), "Github");
    }

    #[test]
    fn test_serialized_shape_is_rule_shaped() {
        let suggestions = suggest(&[group("newstore.com", 1, &[])], &RuleSet::default());
        let value = serde_json::to_value(&suggestions[0]).unwrap();
        assert_eq!(value["name"], "Shopping » NewStore");
        assert_eq!(value["conditions"]["from_contains"][0], "newstore.com");
        assert_eq!(value["source_domain"], "newstore.com");

        let rule: Rule = serde_json::from_value(value).unwrap();
        assert_eq!(rule.folder, "INBOX/Shopping/NewStore");
    }
}
