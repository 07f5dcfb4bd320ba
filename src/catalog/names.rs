use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("name '{0}' canonicalizes to an empty string")]
    EmptyName(String),
}

#[derive(Debug, Clone)]
enum Replacement {
    /// Regex replacement template (`$1` style captures).
    Template(String),
    /// Lower-case the matched text.
    Lowercase,
}

/// One step of the name rewrite pipeline.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: Replacement,
}

impl RewriteRule {
    pub fn new(
        pattern: &str,
        replacement: &str,
        case_insensitive: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: build(pattern, case_insensitive)?,
            replacement: Replacement::Template(replacement.to_string()),
        })
    }

    pub fn lowercase(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: build(pattern, case_insensitive)?,
            replacement: Replacement::Lowercase,
        })
    }

    pub fn apply(&self, name: &str) -> String {
        match &self.replacement {
            Replacement::Template(t) => self.pattern.replace_all(name, t.as_str()).into_owned(),
            Replacement::Lowercase => self
                .pattern
                .replace_all(name, |caps: &regex::Captures| caps[0].to_lowercase())
                .into_owned(),
        }
    }
}

fn build(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
}

/// Ordered rewrite rules. Each rule sees the output of the previous one.
#[derive(Debug, Clone)]
pub struct NameRules {
    rules: Vec<RewriteRule>,
}

impl NameRules {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// The catalog's naming conventions.
    pub fn standard() -> Self {
        let rules = vec![
            // 'IC 1234' -> 'IC1234'
            RewriteRule::new(r"IC ([0-9]{4})", "IC${1}", false),
            // 'Cygnus A' -> 'Cygnus-A'
            RewriteRule::new(r" ([A-Z])$", "-${1}", false),
            // Common names made only of words: 'Milky Way' -> 'milky way'
            RewriteRule::lowercase(r"^[ a-zA-Z]*$", false),
            // 'N3379' or 'N 3379' -> 'NGC3379'
            RewriteRule::new(r"\bN ?([0-9]{4})", "NGC${1}", false),
            // Everything specific is handled; drop remaining whitespace
            RewriteRule::new(r"\s+", "", false),
        ];
        Self::new(
            rules
                .into_iter()
                .collect::<Result<Vec<_>, _>>()
                .expect("built-in name rules are valid patterns"),
        )
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        self.rules
            .iter()
            .fold(raw.trim().to_string(), |name, rule| rule.apply(&name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for NameRules {
    fn default() -> Self {
        Self::standard()
    }
}
