use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CitationError {
    #[error("citation has no bibcode, url or name")]
    Empty,

    #[error("unknown reference code '{0}'")]
    UnknownReference(String),

    #[error("invalid source reference list '{0}'")]
    InvalidRefList(String),

    #[error("no entry named '{0}'")]
    UnknownEntry(String),

    #[error("source {0} is not registered for this record")]
    Unregistered(SourceRef),
}

/// Entry-local reference to a registered source. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(u32);

impl SourceRef {
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Reference for the zero-based position `i` in a registry.
    pub(crate) fn from_index(i: usize) -> Self {
        SourceRef(i as u32 + 1)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of source references a fact is attributed to; written as `"1,2,4"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SourceRefs(Vec<SourceRef>);

impl SourceRefs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(r: SourceRef) -> Self {
        Self(vec![r])
    }

    /// Appends unless already present; first occurrence keeps its position.
    pub fn push(&mut self, r: SourceRef) {
        if !self.0.contains(&r) {
            self.0.push(r);
        }
    }

    pub fn with(mut self, r: SourceRef) -> Self {
        self.push(r);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRef> {
        self.0.iter()
    }

    pub fn contains(&self, r: SourceRef) -> bool {
        self.0.contains(&r)
    }
}

impl FromIterator<SourceRef> for SourceRefs {
    fn from_iter<I: IntoIterator<Item = SourceRef>>(iter: I) -> Self {
        let mut refs = SourceRefs::new();
        for r in iter {
            refs.push(r);
        }
        refs
    }
}

impl fmt::Display for SourceRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for SourceRefs {
    type Err = CitationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.parse::<u32>() {
                Ok(n) if n > 0 => Ok(SourceRef(n)),
                _ => Err(CitationError::InvalidRefList(s.to_string())),
            })
            .collect()
    }
}

impl From<SourceRefs> for String {
    fn from(refs: SourceRefs) -> Self {
        refs.to_string()
    }
}

impl TryFrom<String> for SourceRefs {
    type Error = CitationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Citation details handed to [`SourceRegistry::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub bibcode: Option<String>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub secondary: bool,
}

impl SourceSpec {
    pub fn bibcode(bibcode: impl Into<String>) -> Self {
        Self {
            bibcode: Some(bibcode.into()),
            ..Default::default()
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_bibcode(mut self, bibcode: impl Into<String>) -> Self {
        self.bibcode = Some(bibcode.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    fn identity(&self) -> Option<SourceKey<'_>> {
        identity(&self.bibcode, &self.url, &self.name)
    }

    pub fn is_valid(&self) -> bool {
        self.identity().is_some()
    }
}

impl From<&crate::parser::Citation> for SourceSpec {
    fn from(c: &crate::parser::Citation) -> Self {
        Self {
            bibcode: c.bibcode.clone(),
            url: c.url.clone(),
            name: c.name.clone(),
            secondary: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKey<'a> {
    Bibcode(&'a str),
    Url(&'a str),
    Name(&'a str),
}

fn identity<'a>(
    bibcode: &'a Option<String>,
    url: &'a Option<String>,
    name: &'a Option<String>,
) -> Option<SourceKey<'a>> {
    let non_empty = |v: &'a Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty());
    non_empty(bibcode)
        .map(SourceKey::Bibcode)
        .or_else(|| non_empty(url).map(SourceKey::Url))
        .or_else(|| non_empty(name).map(SourceKey::Name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub alias: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secondary: bool,
}

impl Source {
    fn identity(&self) -> Option<SourceKey<'_>> {
        identity(&self.bibcode, &self.url, &self.name)
    }

    pub fn spec(&self) -> SourceSpec {
        SourceSpec {
            bibcode: self.bibcode.clone(),
            url: self.url.clone(),
            name: self.name.clone(),
            secondary: self.secondary,
        }
    }
}

/// Sources cited by one entry, deduplicated by bibcode, else url, else name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn add(&mut self, spec: SourceSpec) -> Result<SourceRef, CitationError> {
        let key = spec.identity().ok_or(CitationError::Empty)?;
        if let Some(existing) = self.sources.iter().find(|s| s.identity() == Some(key)) {
            return Ok(existing.alias);
        }

        let alias = SourceRef::from_index(self.sources.len());
        self.sources.push(Source {
            alias,
            name: spec.name,
            bibcode: spec.bibcode,
            url: spec.url,
            secondary: spec.secondary,
        });
        Ok(alias)
    }

    pub fn resolve(&self, r: SourceRef) -> Option<&Source> {
        self.sources.iter().find(|s| s.alias == r)
    }

    pub fn contains(&self, r: SourceRef) -> bool {
        self.resolve(r).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bibcode_returns_same_ref() {
        let mut reg = SourceRegistry::default();
        let a = reg
            .add(SourceSpec::bibcode("2002ApJ...574..740T").with_name("Tremaine+2002"))
            .unwrap();
        let b = reg
            .add(
                SourceSpec::bibcode("2002ApJ...574..740T")
                    .with_url("http://example.org/other")
                    .with_name("T02"),
            )
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_refs_are_assigned_in_first_seen_order() {
        let mut reg = SourceRegistry::default();
        let a = reg.add(SourceSpec::url("http://a.example")).unwrap();
        let b = reg.add(SourceSpec::named("Gebhardt et al. 2000")).unwrap();
        let a_again = reg.add(SourceSpec::url("http://a.example")).unwrap();
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
        assert_eq!(a_again, a);
    }

    #[test]
    fn test_empty_citation_is_rejected() {
        let mut reg = SourceRegistry::default();
        assert_eq!(reg.add(SourceSpec::default()), Err(CitationError::Empty));
        assert_eq!(reg.add(SourceSpec::named("  ")), Err(CitationError::Empty));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_source_refs_text_form() {
        let refs: SourceRefs = "1, 3,4".parse().unwrap();
        assert_eq!(refs.to_string(), "1,3,4");
        assert!("1,zero".parse::<SourceRefs>().is_err());
        assert!("0".parse::<SourceRefs>().is_err());

        let json = serde_json::to_string(&refs).unwrap();
        assert_eq!(json, "\"1,3,4\"");
        let back: SourceRefs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, refs);
    }
}
