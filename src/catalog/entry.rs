use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::source::{CitationError, SourceRef, SourceRefs, SourceRegistry, SourceSpec};
use crate::parser::{Measurement, Uncertainty};
use crate::units::Unit;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("no entry named '{0}'")]
    UnknownEntry(String),

    #[error("{entry}: property key is empty")]
    EmptyKey { entry: String },

    #[error("{entry}: '{key}' has no source references")]
    NoSources { entry: String, key: String },

    #[error("{entry}: '{key}' cites unregistered source {source_ref}")]
    UnresolvedSource {
        entry: String,
        key: String,
        source_ref: SourceRef,
    },

    #[error("{entry}: '{key}' mixes a symmetric error with asymmetric bounds")]
    ConflictingErrors { entry: String, key: String },
}

/// Optional attributes of a fact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactAttrs {
    pub error: Option<String>,
    pub e_lower: Option<String>,
    pub e_upper: Option<String>,
    pub unit: Option<Unit>,
    pub description: Option<String>,
    pub kind: Option<String>,
}

impl FactAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn bounds(mut self, lower: impl Into<String>, upper: impl Into<String>) -> Self {
        self.e_lower = Some(lower.into());
        self.e_upper = Some(upper.into());
        self
    }

    /// Copy the uncertainty of a parsed measurement onto these attributes.
    pub fn uncertainty(self, error: Option<&Uncertainty>) -> Self {
        match error {
            Some(Uncertainty::Symmetric(e)) => self.error(e.clone()),
            Some(Uncertainty::Asymmetric { lower, upper }) => {
                self.bounds(lower.clone(), upper.clone())
            }
            None => self,
        }
    }

    pub fn measured(self, m: &Measurement) -> Self {
        self.uncertainty(m.error.as_ref())
    }

    pub(crate) fn has_conflicting_errors(&self) -> bool {
        self.error.is_some() && (self.e_lower.is_some() || self.e_upper.is_some())
    }
}

/// One provenance-attributed measurement of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_lower_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_upper_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_value: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub source: SourceRefs,
}

impl Fact {
    pub fn new(value: impl Into<String>, source: SourceRefs, attrs: FactAttrs) -> Self {
        Self {
            value: value.into(),
            e_value: attrs.error,
            e_lower_value: attrs.e_lower,
            e_upper_value: attrs.e_upper,
            u_value: attrs.unit,
            description: attrs.description,
            kind: attrs.kind,
            source,
        }
    }

    /// Same measurement from the same citations; the description does not count.
    fn duplicates(&self, other: &Fact) -> bool {
        self.value == other.value
            && self.e_value == other.e_value
            && self.e_lower_value == other.e_lower_value
            && self.e_upper_value == other.e_upper_value
            && self.u_value == other.u_value
            && self.kind == other.kind
            && self.source == other.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    Magnitude,
    Luminosity,
    Flux,
}

/// Flux, luminosity or magnitude measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photometry {
    pub measure: Measure,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_value: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wavelength: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_wavelength: Option<Unit>,
    /// Measurement of the host galaxy rather than the nucleus.
    #[serde(default)]
    pub host: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcorrected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_time: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub source: SourceRefs,
}

impl Photometry {
    pub fn new(measure: Measure, value: impl Into<String>) -> Self {
        Self {
            measure,
            value: value.into(),
            e_value: None,
            u_value: None,
            band: None,
            wavelength: None,
            u_wavelength: None,
            host: false,
            includes_host: None,
            kcorrected: None,
            time: None,
            u_time: None,
            description: None,
            source: SourceRefs::new(),
        }
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.e_value = Some(error.into());
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.u_value = Some(unit);
        self
    }

    pub fn band(mut self, band: impl Into<String>) -> Self {
        self.band = Some(band.into());
        self
    }

    pub fn wavelength(mut self, wavelength: impl Into<String>, unit: Unit) -> Self {
        self.wavelength = Some(wavelength.into());
        self.u_wavelength = Some(unit);
        self
    }

    pub fn host(mut self, host: bool) -> Self {
        self.host = host;
        self
    }

    pub fn includes_host(mut self, includes: bool) -> Self {
        self.includes_host = Some(includes);
        self
    }

    pub fn kcorrected(mut self, kcorrected: bool) -> Self {
        self.kcorrected = Some(kcorrected);
        self
    }

    pub fn time(mut self, time: impl Into<String>, unit: Unit) -> Self {
        self.time = Some(time.into());
        self.u_time = Some(unit);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Facts recorded under one property key, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub facts: Vec<Fact>,
}

/// Canonical record for one physical object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub sources: SourceRegistry,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub photometry: Vec<Photometry>,
    #[serde(default)]
    pub tasks: BTreeSet<String>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            sources: SourceRegistry::default(),
            properties: Vec::new(),
            photometry: Vec::new(),
            tasks: BTreeSet::new(),
        }
    }

    /// Records `alias` unless it is the canonical name or already known.
    pub fn add_alias(&mut self, alias: &str) -> bool {
        let alias = alias.trim();
        if alias.is_empty() || alias == self.name || self.aliases.iter().any(|a| a == alias) {
            return false;
        }
        self.aliases.push(alias.to_string());
        true
    }

    pub fn add_source(&mut self, spec: SourceSpec) -> Result<SourceRef, CitationError> {
        self.sources.add(spec)
    }

    pub fn add_task(&mut self, task: &str) {
        self.tasks.insert(task.to_string());
    }

    pub fn facts(&self, key: &str) -> &[Fact] {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.facts.as_slice())
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.key.as_str())
    }

    pub fn fact_count(&self) -> usize {
        self.properties.iter().map(|p| p.facts.len()).sum()
    }

    pub(crate) fn check_sources(
        &self,
        key: &str,
        sources: &SourceRefs,
    ) -> Result<(), QuantityError> {
        if sources.is_empty() {
            return Err(QuantityError::NoSources {
                entry: self.name.clone(),
                key: key.to_string(),
            });
        }
        if let Some(missing) = sources.iter().find(|r| !self.sources.contains(**r)) {
            return Err(QuantityError::UnresolvedSource {
                entry: self.name.clone(),
                key: key.to_string(),
                source_ref: *missing,
            });
        }
        Ok(())
    }

    pub(crate) fn validate_fact(
        &self,
        key: &str,
        sources: &SourceRefs,
        attrs: &FactAttrs,
    ) -> Result<(), QuantityError> {
        if key.trim().is_empty() {
            return Err(QuantityError::EmptyKey {
                entry: self.name.clone(),
            });
        }
        self.check_sources(key, sources)?;
        if attrs.has_conflicting_errors() {
            return Err(QuantityError::ConflictingErrors {
                entry: self.name.clone(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Appends `fact` under `key`, or returns the already stored duplicate.
    pub(crate) fn append_fact(&mut self, key: &str, fact: Fact) -> (&Fact, bool) {
        let idx = match self.properties.iter().position(|p| p.key == key) {
            Some(idx) => idx,
            None => {
                self.properties.push(Property {
                    key: key.to_string(),
                    facts: Vec::new(),
                });
                self.properties.len() - 1
            }
        };
        let facts = &mut self.properties[idx].facts;
        if let Some(pos) = facts.iter().position(|f| f.duplicates(&fact)) {
            return (&facts[pos], false);
        }
        facts.push(fact);
        (&facts[facts.len() - 1], true)
    }

    pub(crate) fn append_photometry(&mut self, photometry: Photometry) -> (&Photometry, bool) {
        if let Some(pos) = self.photometry.iter().position(|p| *p == photometry) {
            return (&self.photometry[pos], false);
        }
        self.photometry.push(photometry);
        (&self.photometry[self.photometry.len() - 1], true)
    }

    /// Fold another record of the same object into this one. Its sources are re-registered
    /// here and its facts re-pointed at the resulting references.
    pub fn absorb(&mut self, other: Entry) -> Result<(), CitationError> {
        let mut remap = Vec::with_capacity(other.sources.len());
        for source in other.sources.iter() {
            remap.push((source.alias, self.add_source(source.spec())?));
        }
        let translate = |refs: &SourceRefs| -> SourceRefs {
            refs.iter()
                .filter_map(|r| remap.iter().find(|(old, _)| old == r).map(|(_, new)| *new))
                .collect()
        };

        if other.name != self.name {
            self.add_alias(&other.name);
        }
        for alias in &other.aliases {
            self.add_alias(alias);
        }
        for property in other.properties {
            for mut fact in property.facts {
                fact.source = translate(&fact.source);
                self.append_fact(&property.key, fact);
            }
        }
        for mut phot in other.photometry {
            phot.source = translate(&phot.source);
            self.append_photometry(phot);
        }
        self.tasks.extend(other.tasks);
        Ok(())
    }

    /// (key, ref) pairs for every fact citation that does not resolve in this entry.
    pub fn unresolved_citations(&self) -> Vec<(String, SourceRef)> {
        let mut out = Vec::new();
        for property in &self.properties {
            for fact in &property.facts {
                for r in fact.source.iter() {
                    if !self.sources.contains(*r) {
                        out.push((property.key.clone(), *r));
                    }
                }
            }
        }
        for phot in &self.photometry {
            for r in phot.source.iter() {
                if !self.sources.contains(*r) {
                    out.push(("photometry".to_string(), *r));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_source() -> (Entry, SourceRef) {
        let mut e = Entry::new("NGC3379");
        let r = e.add_source(SourceSpec::bibcode("2002ApJ...574..740T")).unwrap();
        (e, r)
    }

    #[test]
    fn test_append_keeps_earlier_facts() {
        let (mut e, r) = entry_with_source();
        let refs = SourceRefs::single(r);
        e.append_fact("mass", Fact::new("1.0e8", refs.clone(), FactAttrs::new()));
        e.append_fact("mass", Fact::new("1.4e8", refs, FactAttrs::new()));
        let values: Vec<_> = e.facts("mass").iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values, vec!["1.0e8", "1.4e8"]);
    }

    #[test]
    fn test_duplicate_fact_is_not_appended() {
        let (mut e, r) = entry_with_source();
        let attrs = FactAttrs::new().unit(Unit::SolarMass);
        let (_, added) =
            e.append_fact("mass", Fact::new("1e8", SourceRefs::single(r), attrs.clone()));
        assert!(added);
        let (_, added) = e.append_fact("mass", Fact::new("1e8", SourceRefs::single(r), attrs));
        assert!(!added);
        assert_eq!(e.facts("mass").len(), 1);
    }

    #[test]
    fn test_property_order_is_insertion_order() {
        let (mut e, r) = entry_with_source();
        for key in ["redshift", "mass", "distance"] {
            e.append_fact(key, Fact::new("1", SourceRefs::single(r), FactAttrs::new()));
        }
        assert_eq!(e.keys().collect::<Vec<_>>(), vec!["redshift", "mass", "distance"]);
    }

    #[test]
    fn test_validate_rejects_unregistered_refs() {
        let (e, _) = entry_with_source();
        let refs: SourceRefs = "1,2".parse().unwrap();
        assert!(matches!(
            e.validate_fact("mass", &refs, &FactAttrs::new()),
            Err(QuantityError::UnresolvedSource { source_ref, .. }) if source_ref.get() == 2
        ));
        assert!(matches!(
            e.validate_fact("mass", &SourceRefs::new(), &FactAttrs::new()),
            Err(QuantityError::NoSources { .. })
        ));
        let conflicting = FactAttrs::new().error("0.1").bounds("0.1", "0.2");
        assert!(matches!(
            e.validate_fact("mass", &"1".parse().unwrap(), &conflicting),
            Err(QuantityError::ConflictingErrors { .. })
        ));
    }

    #[test]
    fn test_absorb_remaps_sources() {
        let mut a = Entry::new("NGC3379");
        let ra = a.add_source(SourceSpec::url("http://a.example")).unwrap();
        a.append_fact("mass", Fact::new("1e8", SourceRefs::single(ra), FactAttrs::new()));

        let mut b = Entry::new("NGC3379");
        let rb1 = b.add_source(SourceSpec::url("http://b.example")).unwrap();
        let rb2 = b.add_source(SourceSpec::url("http://a.example")).unwrap();
        b.append_fact("mass", Fact::new("2e8", SourceRefs::single(rb1), FactAttrs::new()));
        b.append_fact("mass", Fact::new("1e8", SourceRefs::single(rb2), FactAttrs::new()));
        b.add_task("shen2008");

        a.absorb(b).unwrap();
        assert_eq!(a.sources.len(), 2);
        assert_eq!(a.facts("mass").len(), 2);
        assert_eq!(a.facts("mass")[1].source.to_string(), "2");
        assert!(a.unresolved_citations().is_empty());
        assert!(a.tasks.contains("shen2008"));
    }

    #[test]
    fn test_entry_json_keeps_fact_attributes() {
        let (mut e, r) = entry_with_source();
        e.add_alias("N3379");
        e.append_fact(
            "mass",
            Fact::new(
                "1.8e6",
                SourceRefs::single(r),
                FactAttrs::new()
                    .bounds("1.5e6", "2.2e6")
                    .unit(Unit::SolarMass)
                    .kind("dynamics (stars)")
                    .description("BH Mass"),
            ),
        );
        let json = serde_json::to_string(&e).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
        assert!(json.contains("\"u_value\":\"Msol\""));
        assert!(json.contains("\"source\":\"1\""));
    }
}
