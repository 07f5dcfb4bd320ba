use thiserror::Error;
use tracing::warn;

use crate::catalog::{
    Catalog, CitationError, FactAttrs, FailurePolicy, IdentityError, Photometry, QuantityError,
    SourceRef, SourceRefs, SourceSpec,
};
use crate::metrics::CatalogMetrics;
use crate::parser::{parse_value, Measurement, ParsedValue};
use crate::units::UnitError;
use crate::vocab::VocabularyError;

/// One tokenized row of an input document, with its position in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub index: usize,
    pub cells: Vec<String>,
}

impl RawRecord {
    pub fn new(index: usize, cells: Vec<String>) -> Self {
        Self { index, cells }
    }

    /// Cell text, or "" when the row is short.
    pub fn cell(&self, i: usize) -> &str {
        self.cells.get(i).map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The row carries nothing usable (header, separator, short row).
    #[error("row skipped: {0}")]
    Skipped(String),

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error(transparent)]
    Citation(#[from] CitationError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Quantity(#[from] QuantityError),

    /// The document no longer has the shape the task expects.
    #[error("structural failure: {0}")]
    Structural(String),
}

impl RecordError {
    /// Fatal errors abort the task; everything else drops the record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecordError::Structural(_) | RecordError::Quantity(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::Skipped(_) => "skipped",
            RecordError::Vocabulary(_) => "vocabulary",
            RecordError::Citation(_) => "citation",
            RecordError::Unit(_) => "unit",
            RecordError::Identity(_) => "identity",
            RecordError::Quantity(_) => "quantity",
            RecordError::Structural(_) => "structural",
        }
    }
}

/// Index into a draft's citation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cite(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct DraftFact {
    pub key: String,
    pub value: String,
    pub attrs: FactAttrs,
    pub cites: Vec<Cite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftPhotometry {
    pub photometry: Photometry,
    pub cites: Vec<Cite>,
}

/// Everything one record will contribute, built without touching the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub name: String,
    pub aliases: Vec<String>,
    pub citations: Vec<SourceSpec>,
    pub facts: Vec<DraftFact>,
    pub photometry: Vec<DraftPhotometry>,
    pub warnings: Vec<String>,
}

impl RecordDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            citations: Vec::new(),
            facts: Vec::new(),
            photometry: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if !alias.trim().is_empty() && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    /// Register a citation for this record; identical specs share one handle.
    pub fn cite(&mut self, spec: SourceSpec) -> Cite {
        if let Some(i) = self.citations.iter().position(|c| *c == spec) {
            return Cite(i);
        }
        self.citations.push(spec);
        Cite(self.citations.len() - 1)
    }

    pub fn fact(&mut self, key: &str, value: impl Into<String>, attrs: FactAttrs, cites: &[Cite]) {
        self.facts.push(DraftFact {
            key: key.to_string(),
            value: value.into(),
            attrs,
            cites: cites.to_vec(),
        });
    }

    /// Parse `raw` and add it as a fact. Missing values add nothing; malformed ones add a
    /// warning naming the object, key and raw text.
    pub fn measurement(
        &mut self,
        key: &str,
        raw: &str,
        attrs: FactAttrs,
        cites: &[Cite],
    ) -> Option<Measurement> {
        match parse_value(raw) {
            ParsedValue::Missing => None,
            ParsedValue::Malformed(reason) => {
                self.warn(format!("{}: {}: cannot parse '{}' ({})", self.name, key, raw, reason));
                None
            }
            ParsedValue::Parsed(m) => {
                let attrs = attrs.measured(&m);
                self.fact(key, m.value.clone(), attrs, cites);
                Some(m)
            }
        }
    }

    pub fn photometry(&mut self, photometry: Photometry, cites: &[Cite]) {
        self.photometry.push(DraftPhotometry {
            photometry,
            cites: cites.to_vec(),
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Check everything that could fail during commit. Whole-record problems are errors;
    /// malformed facts are dropped (or raised) according to `policy`.
    pub fn validate(&mut self, catalog: &Catalog) -> Result<(), RecordError> {
        if catalog.canonicalize(&self.name).is_empty() {
            return Err(IdentityError::EmptyName(self.name.clone()).into());
        }
        if self.citations.iter().any(|c| !c.is_valid()) {
            return Err(CitationError::Empty.into());
        }

        let n = self.citations.len();
        let dangling = self
            .facts
            .iter()
            .flat_map(|f| f.cites.iter())
            .chain(self.photometry.iter().flat_map(|p| p.cites.iter()))
            .find(|c| c.0 >= n);
        if let Some(c) = dangling {
            return Err(CitationError::Unregistered(SourceRef::from_index(c.0)).into());
        }

        let name = self.name.clone();
        let policy = catalog.policy();
        let mut problems = Vec::new();

        self.facts.retain(|f| {
            let err = if f.key.trim().is_empty() {
                Some(QuantityError::EmptyKey { entry: name.clone() })
            } else if f.cites.is_empty() {
                Some(QuantityError::NoSources {
                    entry: name.clone(),
                    key: f.key.clone(),
                })
            } else if f.attrs.has_conflicting_errors() {
                Some(QuantityError::ConflictingErrors {
                    entry: name.clone(),
                    key: f.key.clone(),
                })
            } else {
                None
            };
            match err {
                Some(e) => {
                    problems.push(e);
                    false
                }
                None => true,
            }
        });
        self.photometry.retain(|p| {
            if p.cites.is_empty() {
                problems.push(QuantityError::NoSources {
                    entry: name.clone(),
                    key: "photometry".to_string(),
                });
                false
            } else {
                true
            }
        });

        for problem in problems {
            CatalogMetrics::record_fact_rejected(policy.as_str());
            match policy {
                FailurePolicy::Raise => return Err(problem.into()),
                FailurePolicy::Warn => self.warn(problem.to_string()),
                FailurePolicy::Ignore => {}
            }
        }
        Ok(())
    }

    /// Apply a validated draft. Returns the canonical name of the entry it landed on.
    pub fn commit(self, catalog: &mut Catalog, task: &str) -> Result<String, RecordError> {
        let name = catalog.resolve_or_create(&self.name)?.name.clone();
        for alias in &self.aliases {
            catalog.add_alias(&name, alias);
        }

        let refs = self
            .citations
            .into_iter()
            .map(|spec| catalog.add_source(&name, spec))
            .collect::<Result<Vec<_>, _>>()?;
        let resolve = |cites: &[Cite]| -> SourceRefs {
            cites.iter().filter_map(|c| refs.get(c.0).copied()).collect()
        };

        for fact in self.facts {
            let sources = resolve(&fact.cites);
            catalog.add_quantity(&name, &fact.key, &fact.value, &sources, fact.attrs)?;
        }
        for draft in self.photometry {
            let mut photometry = draft.photometry;
            photometry.source = resolve(&draft.cites);
            catalog.add_photometry(&name, photometry)?;
        }
        catalog.add_task(&name, task);
        Ok(name)
    }
}

/// Log and return a draft's warnings.
pub(crate) fn drain_warnings(task: &str, draft: &mut RecordDraft) -> Vec<String> {
    for w in &draft.warnings {
        warn!(task = %task, "{}", w);
    }
    std::mem::take(&mut draft.warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Measure, NameRules};
    use crate::units::Unit;

    fn draft() -> RecordDraft {
        let mut d = RecordDraft::new("N 3379");
        let c = d.cite(SourceSpec::bibcode("2002ApJ...574..740T"));
        d.measurement("mass", "1.35e8 (0.73,1.65) ", FactAttrs::new().unit(Unit::SolarMass), &[c]);
        d
    }

    #[test]
    fn test_measurement_carries_errors() {
        let d = draft();
        assert_eq!(d.facts.len(), 1);
        assert_eq!(d.facts[0].value, "1.35e8");
        assert_eq!(d.facts[0].attrs.e_lower.as_deref(), Some("0.73e8"));
    }

    #[test]
    fn test_malformed_measurement_warns() {
        let mut d = RecordDraft::new("NGC3379");
        let c = d.cite(SourceSpec::named("T02"));
        assert!(d.measurement("mass", "about 1e8", FactAttrs::new(), &[c]).is_none());
        assert!(d.facts.is_empty());
        assert_eq!(d.warnings.len(), 1);
        assert!(d.warnings[0].contains("about 1e8"));
        assert!(d.measurement("mass", "--", FactAttrs::new(), &[c]).is_none());
        assert_eq!(d.warnings.len(), 1);
    }

    #[test]
    fn test_commit_lands_on_canonical_entry() {
        let mut catalog = Catalog::default();
        let mut d = draft();
        d.validate(&catalog).unwrap();
        let name = d.commit(&mut catalog, "tremaine2002").unwrap();
        assert_eq!(name, "NGC3379");
        let entry = catalog.entry("NGC3379").unwrap();
        assert_eq!(entry.facts("mass")[0].source.to_string(), "1");
        assert!(entry.tasks.contains("tremaine2002"));
    }

    #[test]
    fn test_invalid_citation_rejects_whole_record() {
        let catalog = Catalog::default();
        let mut d = draft();
        d.cite(SourceSpec::default());
        assert!(matches!(d.validate(&catalog), Err(RecordError::Citation(_))));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_unregistered_cite_rejects_whole_record_under_every_policy() {
        for policy in [FailurePolicy::Ignore, FailurePolicy::Warn, FailurePolicy::Raise] {
            let catalog = Catalog::new(NameRules::standard(), policy);

            let mut d = draft();
            d.fact("redshift", "0.003", FactAttrs::new(), &[Cite(0), Cite(4)]);
            let err = d.validate(&catalog).unwrap_err();
            assert!(matches!(
                err,
                RecordError::Citation(CitationError::Unregistered(r)) if r.get() == 5
            ));
            assert!(!err.is_fatal());

            let mut d = draft();
            d.photometry(Photometry::new(Measure::Magnitude, "-19.94"), &[Cite(1)]);
            assert!(matches!(
                d.validate(&catalog),
                Err(RecordError::Citation(CitationError::Unregistered(_)))
            ));
        }
    }

    #[test]
    fn test_uncited_fact_follows_policy() {
        let mut d = draft();
        d.fact("redshift", "0.003", FactAttrs::new(), &[]);

        let mut warned = d.clone();
        warned.validate(&Catalog::default()).unwrap();
        assert_eq!(warned.facts.len(), 1);
        assert_eq!(warned.warnings.len(), 1);

        let raise = Catalog::new(NameRules::standard(), FailurePolicy::Raise);
        let err = d.validate(&raise).unwrap_err();
        assert!(err.is_fatal());
    }
}
