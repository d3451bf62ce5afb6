/// Sentinel domain for senders without a parseable address
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// Minimal domain hierarchy utilities
pub struct DomainUtils;

impl DomainUtils {
    /// Extract the address portion of a raw sender header.
    ///
    /// `"Display Name <user@example.com>"` yields `user@example.com`, a bare
    /// address is returned trimmed.
    pub fn extract_address(sender: &str) -> &str {
        if let Some(start) = sender.rfind('<') {
            let rest = &sender[start + 1..];
            let end = rest.find('>').unwrap_or(rest.len());
            return rest[..end].trim();
        }
        sender.trim().trim_matches(['<', '>', '"'])
    }

    /// Extract domain from email address
    pub fn extract_domain(email: &str) -> Option<String> {
        let address = Self::extract_address(email);
        let (_, domain) = address.rsplit_once('@')?;
        let domain = domain.trim().trim_end_matches('.').to_lowercase();
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }

    /// Domain of a raw sender, or the `unknown` sentinel
    pub fn sender_domain(sender: &str) -> String {
        Self::extract_domain(sender).unwrap_or_else(|| UNKNOWN_DOMAIN.to_string())
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[String]) -> bool {
        let domain_lower = domain.to_lowercase();

        for pattern in domain_list {
            let pattern_lower = pattern.to_lowercase();

            // Exact match
            if domain_lower == pattern_lower {
                return true;
            }

            // Subdomain match (domain ends with .pattern)
            if domain_lower.ends_with(&format!(".{}", pattern_lower)) {
                return true;
            }
        }

        false
    }

    /// Match a domain against one blacklist entry.
    ///
    /// `*.suffix` matches any domain ending in `.suffix` at a label boundary
    /// (`*.ru` matches `foo.ru` and `mail.foo.ru`, not `ru` itself nor
    /// `notspam.ru.example.com`). Any other entry must match exactly.
    pub fn matches_pattern(domain: &str, pattern: &str) -> bool {
        let domain = domain.trim().to_lowercase();
        let pattern = pattern.trim().to_lowercase();
        if domain.is_empty() || pattern.is_empty() {
            return false;
        }

        match pattern.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('.') => {
                domain.len() > suffix.len() && domain.ends_with(suffix)
            }
            _ => domain == pattern,
        }
    }

    /// Whether a rule condition entry names a domain rather than a fragment.
    ///
    /// Returns the normalised domain: `info@shop.example` and `@shop.example`
    /// both yield `shop.example`, `amazon` and `info@` yield nothing.
    pub fn domain_from_condition(entry: &str) -> Option<String> {
        let entry = entry.trim();
        let candidate = match entry.rsplit_once('@') {
            Some((_, domain)) => domain,
            None => entry,
        };
        let candidate = candidate.trim_matches(['<', '>', '.']).to_lowercase();

        if candidate.contains('.') && !candidate.contains(char::is_whitespace) {
            Some(candidate)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            DomainUtils::extract_domain("user@example.com"),
            Some("example.com".to_string())
        );
        assert_eq!(
            DomainUtils::extract_domain("Newsletter <Info@NewStore.com>"),
            Some("newstore.com".to_string())
        );
        assert_eq!(
            DomainUtils::extract_domain("\"a@b via List\" <list@lists.example.org>"),
            Some("lists.example.org".to_string())
        );
        assert_eq!(DomainUtils::extract_domain("invalid"), None);
        assert_eq!(DomainUtils::extract_domain("broken@"), None);
    }

    #[test]
    fn test_sender_domain_sentinel() {
        assert_eq!(DomainUtils::sender_domain("MAILER-DAEMON"), "unknown");
        assert_eq!(DomainUtils::sender_domain(""), "unknown");
        assert_eq!(DomainUtils::sender_domain("x@spam.ru"), "spam.ru");
    }

    #[test]
    fn test_matches_domain_list() {
        let domains = vec!["example.com".to_string(), "test.org".to_string()];

        assert!(DomainUtils::matches_domain_list("example.com", &domains));
        assert!(DomainUtils::matches_domain_list(
            "mail.example.com",
            &domains
        ));
        assert!(!DomainUtils::matches_domain_list("other.com", &domains));
        assert!(!DomainUtils::matches_domain_list("notexample.com", &domains));
    }

    #[test]
    fn test_wildcard_pattern_is_label_bounded() {
        assert!(DomainUtils::matches_pattern("mail.spam.ru", "*.ru"));
        assert!(DomainUtils::matches_pattern("foo.ru", "*.ru"));
        assert!(!DomainUtils::matches_pattern("notspam.ru.example.com", "*.ru"));
        assert!(!DomainUtils::matches_pattern("ru", "*.ru"));
        assert!(!DomainUtils::matches_pattern("guru", "*.ru"));
    }

    #[test]
    fn test_exact_pattern() {
        assert!(DomainUtils::matches_pattern("spam.example", "Spam.Example"));
        assert!(!DomainUtils::matches_pattern("mail.spam.example", "spam.example"));
        assert!(!DomainUtils::matches_pattern("spam.example", ""));
    }

    #[test]
    fn test_domain_from_condition() {
        assert_eq!(
            DomainUtils::domain_from_condition("facebook.com"),
            Some("facebook.com".to_string())
        );
        assert_eq!(
            DomainUtils::domain_from_condition("info@Shop.Example"),
            Some("shop.example".to_string())
        );
        assert_eq!(DomainUtils::domain_from_condition("amazon"), None);
        assert_eq!(DomainUtils::domain_from_condition("info@"), None);
        assert_eq!(DomainUtils::domain_from_condition("weekly digest"), None);
    }
}
