//! The in-memory catalog: one [`Entry`] per canonical object name, append-only facts with
//! per-entry source registries, and tracking of which entries changed since the last flush.

pub mod entry;
pub mod names;
pub mod source;

pub use entry::{Entry, Fact, FactAttrs, Measure, Photometry, Property, QuantityError};
pub use names::{IdentityError, NameRules, RewriteRule};
pub use source::{CitationError, Source, SourceRef, SourceRefs, SourceRegistry, SourceSpec};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::metrics::CatalogMetrics;
use crate::parser::is_missing;

/// What to do with a fact that fails validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Ignore,
    #[default]
    Warn,
    Raise,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Ignore => "ignore",
            FailurePolicy::Warn => "warn",
            FailurePolicy::Raise => "raise",
        }
    }

    /// `Ok(None)` when the failure is swallowed, `Err` when it must propagate.
    pub fn handle<T>(self, err: QuantityError) -> Result<Option<T>, QuantityError> {
        CatalogMetrics::record_fact_rejected(self.as_str());
        match self {
            FailurePolicy::Ignore => Ok(None),
            FailurePolicy::Warn => {
                warn!(error = %err, "Skipping malformed fact");
                Ok(None)
            }
            FailurePolicy::Raise => Err(err),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(FailurePolicy::Ignore),
            "warn" => Ok(FailurePolicy::Warn),
            "raise" => Ok(FailurePolicy::Raise),
            other => Err(format!(
                "unknown failure policy '{}', expected ignore, warn or raise",
                other
            )),
        }
    }
}

pub struct Catalog {
    rules: NameRules,
    policy: FailurePolicy,
    entries: BTreeMap<String, Entry>,
    dirty: BTreeSet<String>,
}

impl Catalog {
    pub fn new(rules: NameRules, policy: FailurePolicy) -> Self {
        Self {
            rules,
            policy,
            entries: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        self.rules.canonicalize(raw)
    }

    /// The single entry for `raw`'s canonical name, created on first sight. A raw spelling that
    /// differs from the canonical name is kept as an alias.
    pub fn resolve_or_create(&mut self, raw: &str) -> Result<&mut Entry, IdentityError> {
        let name = self.rules.canonicalize(raw);
        if name.is_empty() {
            return Err(IdentityError::EmptyName(raw.to_string()));
        }

        let entry = match self.entries.entry(name.clone()) {
            std::collections::btree_map::Entry::Occupied(o) => o.into_mut(),
            std::collections::btree_map::Entry::Vacant(v) => {
                debug!(name = %name, "Creating entry");
                CatalogMetrics::record_entry_created();
                self.dirty.insert(name.clone());
                v.insert(Entry::new(name.clone()))
            }
        };

        let spelled = raw.trim();
        if spelled != name && entry.add_alias(spelled) {
            CatalogMetrics::record_alias_added();
            self.dirty.insert(name);
        }
        Ok(entry)
    }

    /// Record an alternate name on an existing entry.
    pub fn add_alias(&mut self, name: &str, alias: &str) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        let added = entry.add_alias(alias);
        if added {
            CatalogMetrics::record_alias_added();
            self.dirty.insert(name.to_string());
        }
        added
    }

    pub fn add_source(&mut self, name: &str, spec: SourceSpec) -> Result<SourceRef, CitationError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| CitationError::UnknownEntry(name.to_string()))?;
        let before = entry.sources.len();
        let r = entry.add_source(spec)?;
        if entry.sources.len() != before {
            self.dirty.insert(name.to_string());
        }
        Ok(r)
    }

    /// Append a fact under `key` on the entry `name`. A missing value is `Ok(None)`; malformed
    /// facts go through the failure policy; a duplicate returns the stored fact.
    pub fn add_quantity(
        &mut self,
        name: &str,
        key: &str,
        value: &str,
        sources: &SourceRefs,
        attrs: FactAttrs,
    ) -> Result<Option<&Fact>, QuantityError> {
        if is_missing(value) {
            return Ok(None);
        }
        let policy = self.policy;
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| QuantityError::UnknownEntry(name.to_string()))?;
        if let Err(err) = entry.validate_fact(key, sources, &attrs) {
            return policy.handle(err);
        }

        let (fact, added) = entry.append_fact(key, Fact::new(value.trim(), sources.clone(), attrs));
        if added {
            CatalogMetrics::record_fact_stored(key);
            self.dirty.insert(name.to_string());
        } else {
            CatalogMetrics::record_fact_duplicate();
        }
        Ok(Some(fact))
    }

    pub fn add_photometry(
        &mut self,
        name: &str,
        photometry: Photometry,
    ) -> Result<Option<&Photometry>, QuantityError> {
        if is_missing(&photometry.value) {
            return Ok(None);
        }
        let policy = self.policy;
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| QuantityError::UnknownEntry(name.to_string()))?;
        if let Err(err) = entry.check_sources("photometry", &photometry.source) {
            return policy.handle(err);
        }

        let (phot, added) = entry.append_photometry(photometry);
        if added {
            CatalogMetrics::record_photometry_stored();
            self.dirty.insert(name.to_string());
        }
        Ok(Some(phot))
    }

    pub fn add_task(&mut self, name: &str, task: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            if entry.tasks.insert(task.to_string()) {
                self.dirty.insert(name.to_string());
            }
        }
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Look an object up by any spelling.
    pub fn find(&self, raw: &str) -> Option<&Entry> {
        self.entries.get(&self.rules.canonicalize(raw))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries mutated since the last [`Catalog::mark_clean`], in name order.
    pub fn dirty_entries(&self) -> Vec<&Entry> {
        self.dirty
            .iter()
            .filter_map(|name| self.entries.get(name))
            .collect()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Add an entry read back from durable storage. Its name is re-canonicalized in case the
    /// rules changed; a clash with an existing entry merges the two.
    pub fn insert_loaded(&mut self, mut loaded: Entry) -> Result<(), CitationError> {
        let name = self.rules.canonicalize(&loaded.name);
        if name != loaded.name {
            let old = std::mem::replace(&mut loaded.name, name.clone());
            loaded.add_alias(&old);
            self.dirty.insert(name.clone());
        }
        match self.entries.get_mut(&name) {
            Some(existing) => {
                existing.absorb(loaded)?;
                self.dirty.insert(name);
            }
            None => {
                self.entries.insert(name, loaded);
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(NameRules::standard(), FailurePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn cited(catalog: &mut Catalog, raw: &str, bibcode: &str) -> (String, SourceRefs) {
        let name = catalog.resolve_or_create(raw).unwrap().name.clone();
        let r = catalog.add_source(&name, SourceSpec::bibcode(bibcode)).unwrap();
        (name, SourceRefs::single(r))
    }

    #[test]
    fn test_spellings_resolve_to_one_entry() {
        let mut catalog = Catalog::default();
        for raw in ["N3379", "NGC3379", "N 3379"] {
            catalog.resolve_or_create(raw).unwrap();
        }
        assert_eq!(catalog.len(), 1);
        let entry = catalog.entry("NGC3379").unwrap();
        assert_eq!(entry.aliases, vec!["N3379".to_string(), "N 3379".to_string()]);
        assert_eq!(catalog.find("N 3379").unwrap().name, "NGC3379");
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut catalog = Catalog::default();
        assert!(matches!(
            catalog.resolve_or_create("   "),
            Err(IdentityError::EmptyName(_))
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_facts_accumulate() {
        let mut catalog = Catalog::default();
        let (name, refs) = cited(&mut catalog, "NGC3379", "2002ApJ...574..740T");
        catalog
            .add_quantity(&name, "mass", "1.0e8", &refs, FactAttrs::new())
            .unwrap();
        catalog
            .add_quantity(&name, "mass", "1.35e8", &refs, FactAttrs::new())
            .unwrap();
        assert_eq!(catalog.entry(&name).unwrap().facts("mass").len(), 2);
    }

    #[test]
    fn test_missing_value_is_skipped() {
        let mut catalog = Catalog::default();
        let (name, refs) = cited(&mut catalog, "NGC3379", "2002ApJ...574..740T");
        let stored = catalog
            .add_quantity(&name, "mass", "--", &refs, FactAttrs::new())
            .unwrap();
        assert!(stored.is_none());
        assert!(catalog.entry(&name).unwrap().facts("mass").is_empty());
    }

    #[test]
    fn test_failure_policy() {
        let refs: SourceRefs = "3".parse().unwrap();

        let mut warn = Catalog::default();
        let name = warn.resolve_or_create("NGC3379").unwrap().name.clone();
        assert!(warn
            .add_quantity(&name, "mass", "1e8", &refs, FactAttrs::new())
            .unwrap()
            .is_none());

        let mut raise = Catalog::new(NameRules::standard(), FailurePolicy::Raise);
        raise.resolve_or_create("NGC3379").unwrap();
        assert!(matches!(
            raise.add_quantity(&name, "mass", "1e8", &refs, FactAttrs::new()),
            Err(QuantityError::UnresolvedSource { .. })
        ));
        assert!(matches!(
            raise.add_quantity(&name, "mass", "1e8", &SourceRefs::new(), FactAttrs::new()),
            Err(QuantityError::NoSources { .. })
        ));
    }

    #[test]
    fn test_duplicate_returns_existing_fact() {
        let mut catalog = Catalog::default();
        let (name, refs) = cited(&mut catalog, "NGC3379", "2002ApJ...574..740T");
        let attrs = FactAttrs::new().unit(Unit::SolarMass).kind("dynamics (stars)");
        catalog
            .add_quantity(&name, "mass", "1e8", &refs, attrs.clone())
            .unwrap();
        let again = catalog
            .add_quantity(&name, "mass", "1e8", &refs, attrs)
            .unwrap()
            .cloned();
        assert_eq!(again.unwrap().value, "1e8");
        assert_eq!(catalog.entry(&name).unwrap().facts("mass").len(), 1);
    }

    #[test]
    fn test_dirty_tracking() {
        let mut catalog = Catalog::default();
        let (name, refs) = cited(&mut catalog, "NGC3379", "2002ApJ...574..740T");
        cited(&mut catalog, "NGC4486", "2002ApJ...574..740T");
        assert_eq!(catalog.dirty_count(), 2);
        catalog.mark_clean();

        catalog
            .add_quantity(&name, "mass", "1e8", &refs, FactAttrs::new())
            .unwrap();
        let dirty: Vec<_> = catalog.dirty_entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(dirty, vec!["NGC3379".to_string()]);

        catalog.mark_clean();
        catalog
            .add_quantity(&name, "mass", "1e8", &refs, FactAttrs::new())
            .unwrap();
        assert_eq!(catalog.dirty_count(), 0);
    }

    #[test]
    fn test_photometry_requires_sources() {
        let mut catalog = Catalog::new(NameRules::standard(), FailurePolicy::Raise);
        let (name, refs) = cited(&mut catalog, "SDSS000132.83+145608.0", "2008ApJ...680..169S");
        let mut phot = Photometry::new(Measure::Magnitude, "-23.1").band("i");
        assert!(catalog.add_photometry(&name, phot.clone()).is_err());
        phot.source = refs;
        assert!(catalog.add_photometry(&name, phot).unwrap().is_some());
        assert_eq!(catalog.entry(&name).unwrap().photometry.len(), 1);
    }

    #[test]
    fn test_insert_loaded_merges_clash() {
        let mut catalog = Catalog::default();
        let (name, refs) = cited(&mut catalog, "NGC3379", "2002ApJ...574..740T");
        catalog
            .add_quantity(&name, "mass", "1e8", &refs, FactAttrs::new())
            .unwrap();

        let mut loaded = Entry::new("N3379");
        let r = loaded.add_source(SourceSpec::url("http://b.example")).unwrap();
        loaded.append_fact("mass", Fact::new("2e8", SourceRefs::single(r), FactAttrs::new()));
        catalog.insert_loaded(loaded).unwrap();

        let entry = catalog.entry("NGC3379").unwrap();
        assert_eq!(entry.facts("mass").len(), 2);
        assert!(entry.aliases.contains(&"N3379".to_string()));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("RAISE".parse::<FailurePolicy>().unwrap(), FailurePolicy::Raise);
        assert!("loud".parse::<FailurePolicy>().is_err());
    }
}
