//! Value/uncertainty grammar for raw table cells.
//!
//! Published tables encode the same measurement in many shapes: a bare number, `1.2 ± 0.3`,
//! `3.9 (0.4,0.6) e9`, `1.8e6(1.5,2.2)` or `7.230 (+0.042/-0.044)`. Everything here works on
//! the text so the printed significant figures survive untouched; exponents are spliced on as
//! strings, never evaluated.

pub mod cell;

pub use cell::{bibcode_from_url, cell_text, parse_cell, Citation, ParsedCell};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Markers tables use for "no measurement".
pub const MISSING_MARKERS: &[&str] = &["", "-", "--", "---", "...", "\u{2026}"];

/// Delimiter used by HTML tables that pack alternate names into one cell.
pub const ALIAS_DELIMITER: char = '\u{2003}';

const NUMBER: &str = r"[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?";

static BARE: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"^{NUMBER}$")).unwrap());

static SYMMETRIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<val>{NUMBER})\s*(?:±|\+/-|\+-)\s*(?P<err>{NUMBER})$"
    ))
    .unwrap()
});

static BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<val>{NUMBER})\s*\(\s*(?P<a>{NUMBER})\s*[,/]\s*(?P<b>{NUMBER})\s*\)\s*(?:[eE]\s*(?P<exp>[+-]?\d+))?$"
    ))
    .unwrap()
});

/// Uncertainty attached to a parsed value, kept in its printed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Uncertainty {
    Symmetric(String),
    Asymmetric { lower: String, upper: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: String,
    pub error: Option<Uncertainty>,
}

impl Measurement {
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            error: None,
        }
    }

    /// Numeric view of the value for arithmetic; the stored text is never replaced by it.
    pub fn as_f64(&self) -> Option<f64> {
        self.value.parse().ok()
    }

    pub fn lower_error(&self) -> Option<&str> {
        match &self.error {
            Some(Uncertainty::Asymmetric { lower, .. }) => Some(lower),
            _ => None,
        }
    }

    pub fn upper_error(&self) -> Option<&str> {
        match &self.error {
            Some(Uncertainty::Asymmetric { upper, .. }) => Some(upper),
            _ => None,
        }
    }

    pub fn symmetric_error(&self) -> Option<&str> {
        match &self.error {
            Some(Uncertainty::Symmetric(e)) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of parsing one cell. Call sites branch on it explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedValue {
    Missing,
    Parsed(Measurement),
    Malformed(String),
}

impl ParsedValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ParsedValue::Missing)
    }

    pub fn measurement(self) -> Option<Measurement> {
        match self {
            ParsedValue::Parsed(m) => Some(m),
            _ => None,
        }
    }
}

pub fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

/// Parse a raw cell string against the value grammar.
pub fn parse_value(raw: &str) -> ParsedValue {
    let text = raw.trim();
    if is_missing(text) {
        return ParsedValue::Missing;
    }

    if BARE.is_match(text) {
        return ParsedValue::Parsed(Measurement::bare(text));
    }

    if let Some(caps) = SYMMETRIC.captures(text) {
        return ParsedValue::Parsed(Measurement {
            value: caps["val"].to_string(),
            error: Some(Uncertainty::Symmetric(caps["err"].to_string())),
        });
    }

    if let Some(caps) = BRACKETED.captures(text) {
        return parse_bracketed(
            &caps["val"],
            &caps["a"],
            &caps["b"],
            caps.name("exp").map(|m| m.as_str()),
        );
    }

    ParsedValue::Malformed(format!("unrecognized value encoding '{}'", text))
}

fn parse_bracketed(value: &str, a: &str, b: &str, exponent: Option<&str>) -> ParsedValue {
    let (lower, upper) = match (sign_of(a), sign_of(b)) {
        (None, None) => (a.to_string(), b.to_string()),
        (Some('+'), Some('-')) => (unsigned(b), unsigned(a)),
        (Some('-'), Some('+')) => (unsigned(a), unsigned(b)),
        _ => {
            return ParsedValue::Malformed(format!(
                "inconsistent error signs in '({},{})'",
                a, b
            ))
        }
    };

    let (value, suffix) = match exponent {
        Some(exp) => {
            if exponent_part(value).is_some() {
                return ParsedValue::Malformed(format!(
                    "value '{}' carries its own exponent and a shared 'e{}'",
                    value, exp
                ));
            }
            let suffix = format!("e{}", exp);
            (format!("{}{}", value, suffix), Some(suffix))
        }
        None => (value.to_string(), exponent_part(value).map(str::to_string)),
    };

    let apply = |bound: String| match &suffix {
        Some(s) if exponent_part(&bound).is_none() => format!("{}{}", bound, s),
        _ => bound,
    };

    ParsedValue::Parsed(Measurement {
        value,
        error: Some(Uncertainty::Asymmetric {
            lower: apply(lower),
            upper: apply(upper),
        }),
    })
}

fn sign_of(token: &str) -> Option<char> {
    token.chars().next().filter(|c| *c == '+' || *c == '-')
}

fn unsigned(token: &str) -> String {
    token.trim_start_matches(['+', '-']).to_string()
}

/// The `eN` tail of a number, if it has one.
fn exponent_part(number: &str) -> Option<&str> {
    number.find(['e', 'E']).map(|idx| &number[idx..])
}

/// Split a cell that is known to hold alternate names.
pub fn split_aliases(text: &str, delimiter: char) -> Vec<String> {
    text.split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_missing(s))
        .map(str::to_string)
        .collect()
}
