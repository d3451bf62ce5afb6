use crate::aggregate::{DomainAggregator, DomainGroup};
use crate::config::Config;
use crate::domain_utils::DomainUtils;
use crate::engine::{ClassificationEngine, Disposition};
use crate::message::MessageRecord;
use crate::rules::{MergeOutcome, Rule, RuleSet};
use crate::suggest::{RuleSuggester, SuggestedRule};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

const TOP_FOLDERS: usize = 10;
const TOP_SPAM_DOMAINS: usize = 10;
const TOP_UNFILTERED_DOMAINS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            "json" => Ok(ReportFormat::Json),
            other => bail!("Unknown report format: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderCount {
    pub folder: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

/// Outcome of classifying a mailbox without touching it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub total: usize,
    pub filtered: usize,
    pub spam: usize,
    pub unfiltered: usize,
    pub top_folders: Vec<FolderCount>,
    pub spam_domains: Vec<DomainCount>,
    pub unfiltered_domains: Vec<DomainGroup>,
    pub suggestions: Vec<SuggestedRule>,
}

/// Count occurrences keeping first-seen order, then sort by count
fn ranked<'a, I: IntoIterator<Item = &'a str>>(items: I, limit: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(name, _)| name == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(limit);
    counts
}

impl AnalysisReport {
    pub fn analyze(
        messages: &[MessageRecord],
        engine: &ClassificationEngine,
        aggregator: &DomainAggregator,
        suggester: &RuleSuggester,
    ) -> Self {
        let mut folders: Vec<String> = Vec::new();
        let mut spam_domains: Vec<String> = Vec::new();
        let mut unmatched: Vec<&MessageRecord> = Vec::new();

        for message in messages {
            let result = engine.classify_message(message);
            match result.disposition {
                Disposition::Spam => {
                    spam_domains.push(DomainUtils::sender_domain(&message.sender));
                }
                Disposition::RuleMatch => {
                    folders.extend(result.target_folder);
                }
                Disposition::Unmatched => unmatched.push(message),
            }
        }

        let groups = aggregator.aggregate(unmatched.iter().copied());
        let suggestions = suggester.suggest(&groups);

        let report = Self {
            total: messages.len(),
            filtered: folders.len(),
            spam: spam_domains.len(),
            unfiltered: unmatched.len(),
            top_folders: ranked(folders.iter().map(String::as_str), TOP_FOLDERS)
                .into_iter()
                .map(|(folder, count)| FolderCount { folder, count })
                .collect(),
            spam_domains: ranked(spam_domains.iter().map(String::as_str), TOP_SPAM_DOMAINS)
                .into_iter()
                .map(|(domain, count)| DomainCount { domain, count })
                .collect(),
            unfiltered_domains: groups.into_iter().take(TOP_UNFILTERED_DOMAINS).collect(),
            suggestions,
        };

        log::info!(
            "Analyzed {} messages: {} filtered, {} spam, {} unfiltered",
            report.total,
            report.filtered,
            report.spam,
            report.unfiltered
        );
        report
    }

    pub fn percentage(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => {
                let mut json = serde_json::to_string_pretty(self)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total:      {} emails", self.total);
        let _ = writeln!(
            out,
            "Filtered:   {} emails ({:.1}%)",
            self.filtered,
            self.percentage(self.filtered)
        );
        let _ = writeln!(
            out,
            "Spam:       {} emails ({:.1}%)",
            self.spam,
            self.percentage(self.spam)
        );
        let _ = writeln!(
            out,
            "Unfiltered: {} emails ({:.1}%)",
            self.unfiltered,
            self.percentage(self.unfiltered)
        );

        if !self.top_folders.is_empty() {
            let _ = writeln!(out, "\nTop folders:");
            for f in &self.top_folders {
                let _ = writeln!(out, "  {:>5}  {}", f.count, f.folder);
            }
        }

        if !self.spam_domains.is_empty() {
            let _ = writeln!(out, "\nTop spam domains:");
            for d in &self.spam_domains {
                let _ = writeln!(out, "  {:>5}  {}", d.count, d.domain);
            }
        }

        if !self.unfiltered_domains.is_empty() {
            let _ = writeln!(out, "\nUnfiltered emails by domain:");
            for group in &self.unfiltered_domains {
                let _ = writeln!(out, "\n  {} ({} emails)", group.domain, group.count);
                for example in &group.example_messages {
                    let _ = writeln!(out, "    From:    {}", example.from);
                    let _ = writeln!(out, "    Subject: {}", example.subject);
                }
            }
        }

        if !self.suggestions.is_empty() {
            let _ = writeln!(out, "\nSuggested rules:");
            for s in &self.suggestions {
                let _ = writeln!(
                    out,
                    "  {} -> {} ({} emails from {})",
                    s.rule.name, s.rule.folder, s.message_count, s.source_domain
                );
            }
        }

        out
    }

    fn to_markdown(&self) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "## 📊 Statistics\n")?;
        writeln!(out, "- **Total emails in inbox:** {}", self.total)?;
        writeln!(
            out,
            "- **✅ Filtered:** {} ({:.1}%)",
            self.filtered,
            self.percentage(self.filtered)
        )?;
        writeln!(
            out,
            "- **🗑️ Spam detected:** {} ({:.1}%)",
            self.spam,
            self.percentage(self.spam)
        )?;
        writeln!(
            out,
            "- **❓ Unfiltered:** {} ({:.1}%)\n",
            self.unfiltered,
            self.percentage(self.unfiltered)
        )?;

        if self.unfiltered == 0 {
            writeln!(out, "## ✅ Perfect! All emails are filtered!\n")?;
            writeln!(
                out,
                "Your email sorting system is working perfectly. No action needed."
            )?;
            return Ok(out);
        }

        writeln!(out, "## ❓ Unfiltered Emails\n")?;
        for group in &self.unfiltered_domains {
            let plural = if group.count > 1 { "s" } else { "" };
            writeln!(out, "### {} ({} email{})\n", group.domain, group.count, plural)?;
            if let Some(example) = group.example_messages.first() {
                writeln!(out, "**From:** `{}`", example.from.trim())?;
                writeln!(out, "**Subject:** `{}`", example.subject.trim())?;
            }
            writeln!(out)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(out, "## 💡 Suggested Rules\n")?;
            writeln!(out, "Copy and paste these rules into your rules file:\n")?;
            let rules: Vec<&Rule> = self.suggestions.iter().map(|s| &s.rule).collect();
            writeln!(out, "```json\n{}\n```\n", serde_json::to_string_pretty(&rules)?)?;

            writeln!(out, "### 🚨 Potential Spam Detection\n")?;
            writeln!(
                out,
                "If any domains above look suspicious (random names, weird TLDs, scam keywords), \
                 add them to the spam blacklist instead:\n"
            )?;
            writeln!(
                out,
                "```yaml\nblacklist_domains:\n  - suspicious-domain.com\n```"
            )?;
        }

        Ok(out)
    }
}

/// Accepted shapes of a suggestions document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuggestionDocument {
    Report { suggestions: Vec<Rule> },
    Rules { rules: Vec<Rule> },
    List(Vec<Rule>),
}

/// Rules from an analysis report, a rules document or a plain list
pub fn read_suggestions<P: AsRef<Path>>(path: P) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read suggestions: {}", path.display()))?;
    let document: SuggestionDocument = serde_json::from_str(&content)
        .or_else(|_| serde_yaml::from_str(&content))
        .with_context(|| format!("Failed to parse suggestions: {}", path.display()))?;

    Ok(match document {
        SuggestionDocument::Report { suggestions } => suggestions,
        SuggestionDocument::Rules { rules } => rules,
        SuggestionDocument::List(rules) => rules,
    })
}

/// Merge suggested rules into the configured rules and save them.
///
/// Writes the rules document (or the config itself when the rules are
/// inline) only if at least one rule was added.
pub fn apply_suggestions(
    config: &mut Config,
    config_path: &Path,
    suggestions_path: &Path,
) -> Result<MergeOutcome> {
    let candidates = read_suggestions(suggestions_path)?;
    log::info!("Found {} suggested rules", candidates.len());

    match config.rules_path() {
        Some(rules_path) => {
            let mut rules = if rules_path.exists() {
                RuleSet::from_file(&rules_path)?
            } else {
                RuleSet::default()
            };
            let outcome = rules.merge(candidates);
            if !outcome.added.is_empty() {
                rules.to_file(&rules_path)?;
                log::info!("Saved {} rules to {}", rules.len(), rules_path.display());
            }
            Ok(outcome)
        }
        None => {
            let mut rules = RuleSet::new(std::mem::take(&mut config.rules));
            let outcome = rules.merge(candidates);
            config.rules = rules.rules;
            if !outcome.added.is_empty() {
                config.to_file(config_path)?;
                log::info!("Saved {} rules to {}", config.rules.len(), config_path.display());
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spam::SpamConfig;
    use crate::suggest::{default_categories, SuggestionConfig};

    fn analyze(messages: &[MessageRecord], rules: RuleSet, spam: &SpamConfig) -> AnalysisReport {
        let categories = default_categories();
        let config = SuggestionConfig::default();
        let suggester = RuleSuggester::new(&categories, &rules, &config);
        let engine = ClassificationEngine::new(rules.clone(), spam);
        AnalysisReport::analyze(messages, &engine, &DomainAggregator::default(), &suggester)
    }

    fn sample() -> AnalysisReport {
        let rules = RuleSet::new(vec![Rule::new("Bank", "Finance/Bank").from_contains(&["bank.example"])]);
        let spam = SpamConfig {
            enabled: true,
            blacklist_domains: vec!["*.ru".to_string()],
            required_headers: Vec::new(),
            ..SpamConfig::default()
        };
        analyze(
            &[
                MessageRecord::new("alerts@bank.example", "Balance"),
                MessageRecord::new("x@spam.ru", "YOU WON"),
                MessageRecord::new("Newsletter <info@newstore.com>", "Weekly deals inside!"),
                MessageRecord::new("info@newstore.com", "Sale"),
            ],
            rules,
            &spam,
        )
    }

    #[test]
    fn test_analysis_counts() {
        let report = sample();
        assert_eq!(report.total, 4);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.spam, 1);
        assert_eq!(report.unfiltered, 2);
        assert_eq!(report.top_folders[0], FolderCount { folder: "Finance/Bank".to_string(), count: 1 });
        assert_eq!(report.spam_domains[0].domain, "spam.ru");
        assert_eq!(report.unfiltered_domains[0].domain, "newstore.com");
        assert_eq!(report.suggestions[0].rule.name, "Shopping » NewStore");
        assert_eq!(report.percentage(report.unfiltered), 50.0);
    }

    #[test]
    fn test_markdown_sections() {
        let md = sample().render(ReportFormat::Markdown).unwrap();
        assert!(md.contains("- **Total emails in inbox:** 4"));
        assert!(md.contains("- **🗑️ Spam detected:** 1 (25.0%)"));
        assert!(md.contains("### newstore.com (2 emails)"));
        assert!(md.contains("**From:** `Newsletter <info@newstore.com>`"));
        assert!(md.contains("\"folder\": \"INBOX/Shopping/NewStore\""));
        assert!(md.contains("Potential Spam Detection"));
    }

    #[test]
    fn test_markdown_when_everything_is_filtered() {
        let rules = RuleSet::new(vec![Rule::new("All", "All").from_contains(&["@"])]);
        let report = analyze(
            &[MessageRecord::new("a@b.example", "x")],
            rules,
            &SpamConfig::default(),
        );
        let md = report.render(ReportFormat::Markdown).unwrap();
        assert!(md.contains("All emails are filtered"));
        assert!(!md.contains("Suggested Rules"));
    }

    #[test]
    fn test_text_report() {
        let text = sample().render(ReportFormat::Text).unwrap();
        assert!(text.contains("Unfiltered: 2 emails (50.0%)"));
        assert!(text.contains("Shopping » NewStore -> INBOX/Shopping/NewStore"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_apply_report_json_into_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("analysis.json");
        std::fs::write(&report_path, sample().render(ReportFormat::Json).unwrap()).unwrap();

        let rules_path = dir.path().join("email_rules.json");
        RuleSet::new(vec![Rule::new("Bank", "Finance/Bank").from_contains(&["bank.example"])])
            .to_file(&rules_path)
            .unwrap();

        let mut config = Config {
            rules_file: Some(rules_path.clone()),
            ..Config::default()
        };
        let config_path = dir.path().join("mail-sorter.yaml");

        let outcome = apply_suggestions(&mut config, &config_path, &report_path).unwrap();
        assert_eq!(outcome.added, vec!["Shopping » NewStore".to_string()]);
        let saved = RuleSet::from_file(&rules_path).unwrap();
        assert_eq!(saved.len(), 2);
        assert!(!config_path.exists());

        // nothing new the second time, file untouched
        let before = std::fs::metadata(&rules_path).unwrap().modified().unwrap();
        let outcome = apply_suggestions(&mut config, &config_path, &report_path).unwrap();
        assert!(outcome.added.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(std::fs::metadata(&rules_path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_apply_plain_list_into_inline_rules() {
        let dir = tempfile::tempdir().unwrap();
        let list_path = dir.path().join("rules.json");
        std::fs::write(
            &list_path,
            r#"[{"name": "Spotify", "folder": "Music", "conditions": {"from_contains": ["spotify.com"]}}]"#,
        )
        .unwrap();
        let config_path = dir.path().join("mail-sorter.yaml");
        let mut config = Config::default();

        let outcome = apply_suggestions(&mut config, &config_path, &list_path).unwrap();
        assert_eq!(outcome.added, vec!["Spotify".to_string()]);
        let saved = Config::from_file(&config_path).unwrap();
        assert_eq!(saved.rules.last().map(|r| r.name.as_str()), Some("Spotify"));
    }
}
