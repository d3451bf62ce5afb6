use super::{SpamCheck, SpamConfig, SpamReason};
use crate::domain_utils::DomainUtils;
use crate::message::MessageRecord;
use regex::{Regex, RegexBuilder};

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Spam verdicts already stamped on the message by an upstream filter
pub struct ExternalHeaderCheck {
    flag_headers: Vec<String>,
    score_headers: Vec<String>,
    threshold: f64,
}

impl ExternalHeaderCheck {
    pub fn new(config: &SpamConfig) -> Self {
        Self {
            flag_headers: config.external_flag_headers.clone(),
            score_headers: config.external_score_headers.clone(),
            threshold: config.spam_score_threshold,
        }
    }

    fn is_positive_flag(value: &str) -> bool {
        // "YES", "true", "1" or a SpamAssassin status like "Yes, score=7.1"
        let first = value
            .trim()
            .split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or("");
        matches!(first.to_ascii_lowercase().as_str(), "yes" | "true" | "1")
    }

    /// Numeric score of a header value; `None` when it does not hold one
    fn parse_score(value: &str) -> Option<f64> {
        let value = value.trim();
        let number = match value.find("score=") {
            Some(pos) => &value[pos + "score=".len()..],
            None => value,
        };
        let end = number
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(number.len());
        number[..end].parse::<f64>().ok().filter(|s| s.is_finite())
    }
}

impl SpamCheck for ExternalHeaderCheck {
    fn name(&self) -> &str {
        "external_headers"
    }

    fn check(&self, message: &MessageRecord) -> Option<SpamReason> {
        for header in &self.flag_headers {
            if let Some(value) = message.header(header) {
                if Self::is_positive_flag(value) {
                    return Some(SpamReason::ExternalHeader {
                        header: header.clone(),
                        value: value.trim().to_string(),
                    });
                }
            }
        }

        for header in &self.score_headers {
            let Some(value) = message.header(header) else {
                continue;
            };
            match Self::parse_score(value) {
                Some(score) if score > self.threshold => {
                    return Some(SpamReason::ExternalHeader {
                        header: header.clone(),
                        value: value.trim().to_string(),
                    });
                }
                Some(_) => {}
                None => log::debug!("Ignoring non-numeric {} header: {}", header, value),
            }
        }

        None
    }
}

pub struct DomainBlacklistCheck {
    patterns: Vec<String>,
}

impl DomainBlacklistCheck {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

impl SpamCheck for DomainBlacklistCheck {
    fn name(&self) -> &str {
        "domain_blacklist"
    }

    fn check(&self, message: &MessageRecord) -> Option<SpamReason> {
        let domain = message.sender_domain()?;
        self.patterns
            .iter()
            .find(|pattern| DomainUtils::matches_pattern(&domain, pattern))
            .map(|pattern| SpamReason::BlacklistedDomain {
                pattern: pattern.clone(),
            })
    }
}

pub struct KeywordBlacklistCheck {
    keywords: Vec<String>,
}

impl KeywordBlacklistCheck {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.trim().is_empty())
                .collect(),
        }
    }
}

impl SpamCheck for KeywordBlacklistCheck {
    fn name(&self) -> &str {
        "keyword_blacklist"
    }

    fn check(&self, message: &MessageRecord) -> Option<SpamReason> {
        let subject = message.subject.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| subject.contains(keyword.as_str()))
            .map(|keyword| SpamReason::BlacklistedKeyword {
                keyword: keyword.clone(),
            })
    }
}

/// Case-insensitive regexes over the subject, in configured order
pub struct SuspiciousPatternCheck {
    patterns: Vec<(usize, String, Regex)>,
}

impl SuspiciousPatternCheck {
    /// Invalid patterns are logged and skipped; indices keep their
    /// position in the configured list.
    pub fn new(patterns: &[String]) -> Self {
        let mut compiled = Vec::new();
        for (i, pattern) in patterns.iter().enumerate() {
            match compile_pattern(pattern) {
                Ok(regex) => compiled.push((i, pattern.clone(), regex)),
                Err(e) => {
                    log::warn!("Skipping invalid suspicious pattern #{} '{}': {}", i, pattern, e)
                }
            }
        }
        Self { patterns: compiled }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl SpamCheck for SuspiciousPatternCheck {
    fn name(&self) -> &str {
        "suspicious_patterns"
    }

    fn check(&self, message: &MessageRecord) -> Option<SpamReason> {
        self.patterns
            .iter()
            .find(|(_, _, regex)| regex.is_match(&message.subject))
            .map(|(index, pattern, _)| SpamReason::SuspiciousPattern {
                index: *index,
                pattern: pattern.clone(),
            })
    }
}

pub struct HeaderSanityCheck {
    required: Vec<String>,
}

impl HeaderSanityCheck {
    pub fn new(required: &[String]) -> Self {
        Self {
            required: required
                .iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }
}

impl SpamCheck for HeaderSanityCheck {
    fn name(&self) -> &str {
        "header_sanity"
    }

    fn check(&self, message: &MessageRecord) -> Option<SpamReason> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|h| {
                message
                    .header(h)
                    .map(|value| value.trim().is_empty())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        if missing.is_empty() {
            None
        } else {
            Some(SpamReason::MissingHeaders { headers: missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn external() -> ExternalHeaderCheck {
        ExternalHeaderCheck::new(&SpamConfig {
            check_external_headers: true,
            ..SpamConfig::default()
        })
    }

    #[test]
    fn test_flag_values() {
        let check = external();
        for value in ["YES", "true", "1", "Yes, score=7.2 required=5.0"] {
            let m = MessageRecord::new("a@b.example", "s").with_header("X-Spam-Flag", value);
            assert!(check.check(&m).is_some(), "{}", value);
        }
        for value in ["NO", "No, score=-0.1", "yesterday", ""] {
            let m = MessageRecord::new("a@b.example", "s").with_header("X-Spam-Flag", value);
            assert!(check.check(&m).is_none(), "{}", value);
        }
    }

    #[test]
    fn test_score_strictly_above_threshold() {
        let check = external();
        let at = MessageRecord::new("a@b.example", "s").with_header("X-Spam-Score", "5.0");
        assert!(check.check(&at).is_none());

        let above = MessageRecord::new("a@b.example", "s").with_header("X-Rspamd-Score", "5.01");
        assert_eq!(
            check.check(&above),
            Some(SpamReason::ExternalHeader {
                header: "X-Rspamd-Score".to_string(),
                value: "5.01".to_string()
            })
        );
    }

    #[test]
    fn test_score_inside_status_header() {
        let check = ExternalHeaderCheck::new(&SpamConfig {
            external_flag_headers: Vec::new(),
            ..SpamConfig::default()
        });
        let m = MessageRecord::new("a@b.example", "s")
            .with_header("X-Spam-Status", "No, score=6.3 required=5.0 tests=HTML");
        assert!(check.check(&m).is_some());
    }

    #[test]
    fn test_malformed_score_is_absent() {
        let check = external();
        let m = MessageRecord::new("a@b.example", "s").with_header("X-Spam-Score", "high");
        assert!(check.check(&m).is_none());
        assert_eq!(ExternalHeaderCheck::parse_score("NaN"), None);
        assert_eq!(ExternalHeaderCheck::parse_score("-2.5 / 15.0"), Some(-2.5));
    }

    #[test]
    fn test_domain_blacklist_wildcard_and_exact() {
        let check = DomainBlacklistCheck::new(&strings(&["*.ru", "Spam.Example"]));
        assert!(check.check(&MessageRecord::new("x@mail.spam.ru", "")).is_some());
        assert!(check.check(&MessageRecord::new("x@notspam.ru.example.com", "")).is_none());
        assert!(check.check(&MessageRecord::new("x@spam.example", "")).is_some());
        assert!(check.check(&MessageRecord::new("x@www.spam.example", "")).is_none());
        assert!(check.check(&MessageRecord::new("no address", "")).is_none());
    }

    #[test]
    fn test_keyword_blacklist_ignores_empty_keywords() {
        let check = KeywordBlacklistCheck::new(&strings(&["", "  ", "Lottery"]));
        assert!(check.check(&MessageRecord::new("a@b.example", "hello")).is_none());
        assert!(check.check(&MessageRecord::new("a@b.example", "LOTTERY results")).is_some());
    }

    #[test]
    fn test_invalid_pattern_skipped_keeps_indices() {
        let check = SuspiciousPatternCheck::new(&strings(&["[unclosed", r"\d{6,}"]));
        assert_eq!(check.len(), 1);
        assert_eq!(
            check.check(&MessageRecord::new("a@b.example", "Code 1234567")),
            Some(SpamReason::SuspiciousPattern {
                index: 1,
                pattern: r"\d{6,}".to_string()
            })
        );
    }

    #[test]
    fn test_header_sanity_lists_missing() {
        let check = HeaderSanityCheck::new(&strings(&["Message-ID", "Date"]));
        let m = MessageRecord::new("a@b.example", "s").with_header("date", "today");
        assert_eq!(
            check.check(&m),
            Some(SpamReason::MissingHeaders {
                headers: strings(&["Message-ID"])
            })
        );
        assert!(HeaderSanityCheck::new(&[]).check(&m).is_none());
    }
}
