//! Controlled vocabularies: mass-determination methods, galaxy morphology and inner profile.
//!
//! The tables are built once (usually with [`Vocabulary::standard`]) and handed to whoever maps
//! codes. An unknown code is always an error carrying the literal code; nothing falls back to a
//! default category.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("unrecognized {vocabulary} code '{code}'")]
    UnknownCode {
        vocabulary: &'static str,
        code: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassMethod {
    StellarDynamics,
    GasDynamics,
    MaserDynamics,
    ThreeIntegralModels,
    ReverberationMapping,
    VirialHBeta,
    VirialMgII,
    VirialCIV,
    Virial,
}

impl MassMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MassMethod::StellarDynamics => "dynamics (stars)",
            MassMethod::GasDynamics => "dynamics (gas)",
            MassMethod::MaserDynamics => "dynamics (masers)",
            MassMethod::ThreeIntegralModels => "dynamics (three-integral models)",
            MassMethod::ReverberationMapping => "reverberation mapping",
            MassMethod::VirialHBeta => "virial (H-Beta)",
            MassMethod::VirialMgII => "virial (Mg-II)",
            MassMethod::VirialCIV => "virial (C-IV)",
            MassMethod::Virial => "virial",
        }
    }
}

impl fmt::Display for MassMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Morphology {
    Elliptical,
    Lenticular,
    Spiral,
    SpiralBarred,
    Irregular,
}

impl Morphology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Morphology::Elliptical => "elliptical",
            Morphology::Lenticular => "lenticular",
            Morphology::Spiral => "spiral",
            Morphology::SpiralBarred => "spiral, barred",
            Morphology::Irregular => "irregular",
        }
    }
}

impl fmt::Display for Morphology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InnerProfile {
    Core,
    Intermediate,
    PowerLaw,
}

impl InnerProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            InnerProfile::Core => "core",
            InnerProfile::Intermediate => "intermediate",
            InnerProfile::PowerLaw => "power-law",
        }
    }
}

/// Result of mapping a (possibly comma-joined) mass-method code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMapping {
    pub methods: Vec<MassMethod>,
    pub descriptions: Vec<String>,
}

impl MethodMapping {
    /// Canonical forms joined by ", ".
    pub fn canonical(&self) -> String {
        self.methods
            .iter()
            .map(MassMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn description(&self) -> String {
        self.descriptions.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphologyTerm {
    pub code: String,
    pub class: Morphology,
    pub profile: Option<InnerProfile>,
}

/// Result of mapping a (possibly slash-joined) morphology code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphologyMapping {
    pub terms: Vec<MorphologyTerm>,
}

impl MorphologyMapping {
    /// Canonical classes joined by "/", e.g. `elliptical/lenticular`.
    pub fn canonical(&self) -> String {
        self.terms
            .iter()
            .map(|t| t.class.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Canonical classes with the source code (and profile) kept alongside,
    /// e.g. `elliptical (E3, core)`.
    pub fn detailed(&self) -> String {
        self.terms
            .iter()
            .map(|t| match t.profile {
                Some(p) => format!("{} ({}, {})", t.class, t.code, p.as_str()),
                None => format!("{} ({})", t.class, t.code),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn profiles(&self) -> Vec<InnerProfile> {
        self.terms.iter().filter_map(|t| t.profile).collect()
    }
}

/// Immutable lookup tables for every controlled vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    methods: HashMap<String, (MassMethod, String)>,
    /// Whole-code Hubble type patterns; the first match wins.
    morphology: Vec<(Regex, Morphology)>,
    profiles: HashMap<String, InnerProfile>,
}

impl Vocabulary {
    /// Morphology patterns are anchored, so a code must match one of them in full.
    pub fn new(
        methods: Vec<(&str, MassMethod, &str)>,
        morphology: Vec<(&str, Morphology)>,
        profiles: Vec<(&str, InnerProfile)>,
    ) -> Result<Self, regex::Error> {
        let morphology = morphology
            .into_iter()
            .map(|(pattern, m)| Regex::new(&format!("^(?:{})$", pattern)).map(|re| (re, m)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            methods: methods
                .into_iter()
                .map(|(code, m, desc)| (code.to_string(), (m, desc.to_string())))
                .collect(),
            morphology,
            profiles: profiles
                .into_iter()
                .map(|(code, p)| (code.to_string(), p))
                .collect(),
        })
    }

    /// Codes used across the published tables this catalog ingests.
    pub fn standard() -> Self {
        Self::new(
            vec![
                ("s", MassMethod::StellarDynamics, "(s) stellar radial velocities"),
                ("p", MassMethod::StellarDynamics, "(p) stellar proper motions"),
                (
                    "g",
                    MassMethod::GasDynamics,
                    "(g) rotating gas disk from emission-line observations",
                ),
                ("m", MassMethod::MaserDynamics, "(m) maser radial velocities"),
                ("a", MassMethod::MaserDynamics, "(a) maser accelerations"),
                (
                    "3I",
                    MassMethod::ThreeIntegralModels,
                    "(3I) axisymmetric dynamical models, including three integrals of motion",
                ),
                ("RM", MassMethod::ReverberationMapping, "(RM) reverberation mapping"),
                ("Hb", MassMethod::VirialHBeta, "(Hb) single-epoch virial estimate from H-Beta"),
                ("MgII", MassMethod::VirialMgII, "(MgII) single-epoch virial estimate from Mg-II"),
                ("CIV", MassMethod::VirialCIV, "(CIV) single-epoch virial estimate from C-IV"),
                ("vir", MassMethod::Virial, "(vir) single-epoch virial estimate"),
                ("stars", MassMethod::StellarDynamics, "(stars) stellar dynamics"),
                ("gas", MassMethod::GasDynamics, "(gas) gas dynamics"),
                ("masers", MassMethod::MaserDynamics, "(masers) maser dynamics"),
            ],
            vec![
                (r"SA?B?0[-+]?", Morphology::Lenticular),
                (r"SA?B(?:[a-d]{1,2}|m)?", Morphology::SpiralBarred),
                (r"SA?(?:[a-d]{1,2}|m)?", Morphology::Spiral),
                (r"E[0-7]?|cD", Morphology::Elliptical),
                (r"Irr|Im|I", Morphology::Irregular),
            ],
            vec![
                ("c", InnerProfile::Core),
                ("core", InnerProfile::Core),
                ("i", InnerProfile::Intermediate),
                ("intermediate", InnerProfile::Intermediate),
                ("pl", InnerProfile::PowerLaw),
                ("power-law", InnerProfile::PowerLaw),
            ],
        )
        .expect("built-in morphology patterns are valid")
    }

    /// Map `s`, `s,p`, `g, 3I`... Repeated canonical methods collapse to one.
    pub fn map_mass_methods(&self, raw: &str) -> Result<MethodMapping, VocabularyError> {
        let mut mapping = MethodMapping {
            methods: Vec::new(),
            descriptions: Vec::new(),
        };
        for code in raw.split(',').map(str::trim) {
            let (method, desc) = self
                .methods
                .get(code)
                .ok_or_else(|| unknown("mass method", code))?;
            if !mapping.methods.contains(method) {
                mapping.methods.push(*method);
            }
            mapping.descriptions.push(desc.clone());
        }
        Ok(mapping)
    }

    /// Map `E3`, `E/S0`, `SBbc`, `E1 core`...
    pub fn map_morphology(&self, raw: &str) -> Result<MorphologyMapping, VocabularyError> {
        let terms = raw
            .split('/')
            .map(|part| self.map_morphology_term(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MorphologyMapping { terms })
    }

    fn map_morphology_term(&self, raw: &str) -> Result<MorphologyTerm, VocabularyError> {
        let mut tokens = raw.split_whitespace();
        let code = tokens.next().ok_or_else(|| unknown("morphology", raw))?;
        let profile = match tokens.next() {
            Some(p) => Some(self.map_profile(p)?),
            None => None,
        };
        if tokens.next().is_some() {
            return Err(unknown("morphology", raw));
        }

        let class = self
            .morphology
            .iter()
            .find(|(pattern, _)| pattern.is_match(code))
            .map(|(_, class)| *class)
            .ok_or_else(|| unknown("morphology", code))?;

        Ok(MorphologyTerm {
            code: code.to_string(),
            class,
            profile,
        })
    }

    pub fn map_profile(&self, raw: &str) -> Result<InnerProfile, VocabularyError> {
        let code = raw.trim().trim_matches(|c| c == '(' || c == ')');
        self.profiles
            .get(code)
            .copied()
            .ok_or_else(|| unknown("inner profile", raw))
    }
}

fn unknown(vocabulary: &'static str, code: &str) -> VocabularyError {
    VocabularyError::UnknownCode {
        vocabulary,
        code: code.to_string(),
    }
}
