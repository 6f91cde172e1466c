//! Memory capture policy: deny, redact, and truncate content before it is stored.

use crate::MemoryError;
use regex::Regex;

/// Policy for deciding what memory content is captured.
#[derive(Debug, Clone)]
pub struct MemoryCapturePolicy {
    /// Patterns that deny capture.
    pub deny_patterns: Vec<String>,
    /// Patterns to redact from captured content.
    pub redact_patterns: Vec<String>,
    /// Optional maximum content length to capture.
    pub max_chars: Option<usize>,
    /// Detect secrets using entropy heuristics.
    pub detect_secrets: bool,
    /// Entropy threshold for secret detection.
    pub secret_entropy_threshold: f32,
    /// Replacement string for redactions.
    pub redaction_replacement: String,
}

impl Default for MemoryCapturePolicy {
    /// Default capture policy settings.
    fn default() -> Self {
        Self {
            deny_patterns: Vec::new(),
            redact_patterns: Vec::new(),
            max_chars: None,
            detect_secrets: true,
            secret_entropy_threshold: 3.7,
            redaction_replacement: "[REDACTED]".to_string(),
        }
    }
}

/// Capture policy with its patterns compiled.
#[derive(Debug, Clone)]
pub struct CaptureFilter {
    deny: Vec<Regex>,
    redact: Vec<Regex>,
    secret_token: Regex,
    policy: MemoryCapturePolicy,
}

impl CaptureFilter {
    /// Compile a capture policy; invalid patterns are reported up front.
    pub fn new(policy: MemoryCapturePolicy) -> Result<Self, MemoryError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, MemoryError> {
            patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|err| MemoryError::Regex(err.to_string()))
                })
                .collect()
        };
        Ok(Self {
            deny: compile(&policy.deny_patterns)?,
            redact: compile(&policy.redact_patterns)?,
            secret_token: Regex::new(r"[A-Za-z0-9+/=_\-]{20,}")
                .map_err(|err| MemoryError::Regex(err.to_string()))?,
            policy,
        })
    }

    /// Apply the policy. `None` means the content must not be stored.
    pub fn apply(&self, content: &str) -> Option<String> {
        if self.deny.iter().any(|regex| regex.is_match(content)) {
            return None;
        }

        let replacement = self.policy.redaction_replacement.as_str();
        let mut content = content.to_string();
        for regex in &self.redact {
            content = regex.replace_all(&content, replacement).to_string();
        }

        if self.policy.detect_secrets {
            content = self.redact_high_entropy(&content);
        }

        if let Some(max_chars) = self.policy.max_chars {
            content = truncate_chars(&content, max_chars);
        }
        Some(content)
    }

    fn redact_high_entropy(&self, content: &str) -> String {
        let threshold = self.policy.secret_entropy_threshold;
        let replacement = self.policy.redaction_replacement.as_str();
        self.secret_token
            .replace_all(content, |caps: &regex::Captures<'_>| {
                let token = caps.get(0).map_or("", |m| m.as_str());
                if shannon_entropy(token) >= threshold {
                    replacement.to_string()
                } else {
                    token.to_string()
                }
            })
            .to_string()
    }
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect()
}

fn shannon_entropy(token: &str) -> f32 {
    let mut counts = [0usize; 256];
    let bytes = token.as_bytes();
    if bytes.is_empty() {
        return 0.0;
    }
    for byte in bytes {
        counts[*byte as usize] += 1;
    }
    let len = bytes.len() as f32;
    let mut entropy = 0.0;
    for count in counts.iter().copied().filter(|count| *count > 0) {
        let p = count as f32 / len;
        entropy -= p * p.log2();
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::{CaptureFilter, MemoryCapturePolicy, shannon_entropy, truncate_chars};
    use crate::MemoryError;
    use pretty_assertions::assert_eq;

    #[test]
    fn deny_patterns_reject_content() {
        let filter = CaptureFilter::new(MemoryCapturePolicy {
            deny_patterns: vec!["(?i)password".to_string()],
            ..MemoryCapturePolicy::default()
        })
        .expect("filter");
        assert_eq!(filter.apply("my Password is hunter2"), None);
        assert_eq!(
            filter.apply("the user prefers vim").as_deref(),
            Some("the user prefers vim")
        );
    }

    #[test]
    fn redacts_and_truncates() {
        let filter = CaptureFilter::new(MemoryCapturePolicy {
            redact_patterns: vec![r"\d{3}-\d{4}".to_string()],
            max_chars: Some(16),
            detect_secrets: false,
            ..MemoryCapturePolicy::default()
        })
        .expect("filter");
        assert_eq!(
            filter.apply("call 555-1234 tomorrow").as_deref(),
            Some("call [REDACTED] ")
        );
    }

    #[test]
    fn detects_secrets_by_entropy() {
        let filter = CaptureFilter::new(MemoryCapturePolicy::default()).expect("filter");
        let redacted = filter
            .apply("api key sk9Qw2Er7Ty4Ui1Op0AsDfGhJk is set")
            .expect("content");
        assert_eq!(redacted, "api key [REDACTED] is set");
        let plain = filter.apply("aaaaaaaaaaaaaaaaaaaaaaaa").expect("content");
        assert_eq!(plain, "aaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(shannon_entropy("abcd") > shannon_entropy("aaaa"));
    }

    #[test]
    fn invalid_patterns_fail_construction() {
        let err = CaptureFilter::new(MemoryCapturePolicy {
            deny_patterns: vec!["(".to_string()],
            ..MemoryCapturePolicy::default()
        })
        .unwrap_err();
        assert!(matches!(err, MemoryError::Regex(_)));
    }

    #[test]
    fn truncate_chars_handles_limits() {
        assert_eq!(truncate_chars("hello", 0), "");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
    }
}
