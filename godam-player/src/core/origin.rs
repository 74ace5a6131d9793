//! Origin Allowlist
//!
//! Decides whether an inbound message's origin may talk to the client.

use super::ANY_ORIGIN;

/// A single allowlist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    /// `*`: every origin
    Any,
    /// `*.<domain>`: any origin ending with `<domain>`
    Suffix(String),
    /// Exact origin string
    Exact(String),
}

impl OriginPattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == ANY_ORIGIN {
            OriginPattern::Any
        } else if let Some(domain) = pattern.strip_prefix("*.") {
            OriginPattern::Suffix(domain.to_string())
        } else {
            OriginPattern::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginPattern::Any => true,
            OriginPattern::Suffix(domain) => origin.ends_with(domain.as_str()),
            OriginPattern::Exact(exact) => origin == exact,
        }
    }
}

/// Parsed set of allowed origins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAllowlist {
    patterns: Vec<OriginPattern>,
}

impl OriginAllowlist {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .map(|p| OriginPattern::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Allowlist accepting every origin
    pub fn any() -> Self {
        Self {
            patterns: vec![OriginPattern::Any],
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(origin))
    }

    pub fn allows_any(&self) -> bool {
        self.patterns.contains(&OriginPattern::Any)
    }

    pub fn patterns(&self) -> &[OriginPattern] {
        &self.patterns
    }
}

impl Default for OriginAllowlist {
    fn default() -> Self {
        Self::any()
    }
}
