//! Table 1 of Tremaine et al. 2002 (2002ApJ...574..740T), transcribed to space-delimited text.
//!
//! ```text
//! MilkyWay SBbc 17.65 1.8e6(1.5,2.2) s,p 103 0.008 1.0,K 1
//! ```
//!
//! Columns: name[=alias], morphology, M_B, M_BH(low,high) in Msol, mass method(s), sigma
//! (km/s), distance (Mpc), M/L,band, mass reference codes.

use crate::catalog::{CitationError, FactAttrs, Measure, Photometry, SourceSpec};
use crate::constants::{
    DISTANCE, GALAXY_INNER_PROFILE, GALAXY_MASS_TO_LIGHT_RATIO, GALAXY_MORPHOLOGY,
    GALAXY_VEL_DISP, MASS, TREMAINE_2002,
};
use crate::parser::{is_missing, parse_value, Measurement, ParsedValue};
use crate::session::{Cite, RawRecord, RecordDraft, RecordError};
use crate::units::{convert_quantity_to_log, Unit};
use crate::vocab::Vocabulary;

use super::{document_text, IngestTask};

const SOURCE_BIBCODE: &str = "2002ApJ...574..740T";
const SOURCE_NAME: &str = "Tremaine+2002";
const SOURCE_URL: &str = "http://adsabs.harvard.edu/abs/2002ApJ...574..740T";
const NUM_COLUMNS: usize = 9;

/// Distances in the table come from surface-brightness fluctuations.
const TONRY_NAME: &str = "Tonry et al. 2001";
const TONRY_BIBCODE: &str = "2001ApJ...546..681T";
const TONRY_URL: &str = "http://adsabs.harvard.edu/abs/2001ApJ...546..681T";

/// Mass reference codes of the table: (code, name, bibcode).
const REFERENCES: &[(&str, &str, Option<&str>)] = &[
    ("1", "Chakrabarty & Saha 2001", Some("2001AJ....122..232C")),
    ("2", "Verolme et al. 2002", Some("2002MNRAS.335..517V")),
    ("3", "Tremaine 1995", Some("1995AJ....110..628T")),
    ("4", "Kormendy & Bender 1999", Some("1999ApJ...522..772K")),
    ("5", "Bacon et al. 2001", Some("2001A&A...371..409B")),
    ("6", "Gebhardt et al. 2002", Some("2003ApJ...583...92G")),
    ("7", "Pinkney et al. 2003", Some("2003ApJ...596..903P")),
    ("8", "Bower et al. 2001", Some("2001ApJ...550...75B")),
    ("9", "Greenhill & Gwinn 1997", Some("1997Ap&SS.248..261G")),
    ("10", "Sarzi et al. 2001", Some("2001ApJ...550...65S")),
    ("11", "Kormendy et al. 1996a", Some("1996ApJ...459L..57K")),
    ("12", "Barth et al. 2001b", Some("2001ApJ...555..685B")),
    ("13", "Kormendy et al. 1998", Some("1998AJ....115.1823K")),
    ("14", "Gebhardt et al. 2000b", Some("2000AJ....119.1157G")),
    ("15", "Herrnstein et al. 1999", Some("1999Natur.400..539H")),
    ("16", "Ferrarese, Ford, & Jaffe 1996", Some("1996ApJ...470..444F")),
    ("17", "Cretton & van den Bosch 1999", Some("1999ApJ...514..704C")),
    ("18", "Harms et al. 1994", Some("1994ApJ...435L..35H")),
    ("19", "Macchetto et al. 1997", Some("1997ApJ...489..579M")),
    ("20", "M. E. Kaiser et al. 2002, in preparation", None),
    ("21", "Ferrarese & Ford 1999", Some("1999ApJ...515..583F")),
    ("22", "van der Marel & van den Bosch 1998", Some("1998AJ....116.2220V")),
    ("23", "Cappellari et al. 2002", Some("2002ApJ...578..787C")),
];

fn reference(code: &str) -> Result<SourceSpec, CitationError> {
    let (_, name, bibcode) = REFERENCES
        .iter()
        .find(|(c, _, _)| *c == code)
        .ok_or_else(|| CitationError::UnknownReference(code.to_string()))?;
    let spec = SourceSpec::named(*name);
    Ok(match bibcode {
        Some(bib) => spec
            .with_bibcode(*bib)
            .with_url(format!("http://adsabs.harvard.edu/abs/{}", urlencoding::encode(bib))),
        None => spec,
    })
}

pub struct Tremaine2002Task;

impl IngestTask for Tremaine2002Task {
    fn name(&self) -> &'static str {
        TREMAINE_2002
    }

    fn description(&self) -> &'static str {
        "Tremaine et al. 2002, Table 1: dynamical black-hole masses with host properties"
    }

    fn default_file(&self) -> &'static str {
        "tremaine+2002.txt"
    }

    fn expected_total(&self) -> Option<usize> {
        Some(31)
    }

    fn tokenize(&self, document: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
        let text = document_text(document)?;
        Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(i, line)| {
                RawRecord::new(i, line.split_whitespace().map(str::to_string).collect())
            })
            .collect())
    }

    fn draft(
        &self,
        record: &RawRecord,
        vocab: &Vocabulary,
    ) -> Result<Option<RecordDraft>, RecordError> {
        if record.cells.len() != NUM_COLUMNS {
            return Err(RecordError::Skipped(format!(
                "expected {} columns, found {}: '{}'",
                NUM_COLUMNS,
                record.cells.len(),
                record.cells.join(" ")
            )));
        }

        // [0] name, optionally "name=alias"
        let (name, alias) = match record.cell(0).split_once('=') {
            Some((name, alias)) => (name, Some(alias)),
            None => (record.cell(0), None),
        };
        let mut draft = RecordDraft::new(name);
        if let Some(alias) = alias {
            draft.alias(alias);
        }

        let paper = draft.cite(
            SourceSpec::bibcode(SOURCE_BIBCODE)
                .with_url(SOURCE_URL)
                .with_name(SOURCE_NAME)
                .secondary(),
        );

        // Vocabulary and citation failures drop the whole row, so resolve them first.
        let morphology = vocab.map_morphology(record.cell(1))?;
        let methods = vocab.map_mass_methods(record.cell(4))?;
        let mut mass_cites = vec![paper];
        for code in record.cell(8).split(',').map(str::trim).filter(|c| !c.is_empty()) {
            mass_cites.push(draft.cite(reference(code)?));
        }

        // [1] morphology
        draft.fact(
            GALAXY_MORPHOLOGY,
            morphology.canonical(),
            FactAttrs::new().description(format!("Classification: {}", morphology.detailed())),
            &[paper],
        );
        for profile in morphology.profiles() {
            draft.fact(GALAXY_INNER_PROFILE, profile.as_str(), FactAttrs::new(), &[paper]);
        }

        // [2] B-band magnitude of the hot component
        match parse_value(record.cell(2)) {
            ParsedValue::Parsed(m) => draft.photometry(
                Photometry::new(Measure::Magnitude, m.value)
                    .unit(Unit::Magnitude)
                    .band("B")
                    .host(true)
                    .description("B-Band Magnitude (\"Galaxy hot component\")"),
                &[paper],
            ),
            ParsedValue::Missing => {}
            ParsedValue::Malformed(reason) => {
                draft.warn(format!("{}: M_B: {}", name, reason));
            }
        }

        // [3] mass with its one-sigma range, [4] method
        let mass = draft.measurement(
            MASS,
            record.cell(3),
            FactAttrs::new()
                .unit(Unit::SolarMass)
                .kind(methods.canonical())
                .description(format!(
                    "BH Mass with one-sigma errors.  Method(s): '{}'",
                    methods.description()
                )),
            &mass_cites,
        );
        if let Some(mass) = mass {
            add_log_mass(&mut draft, &mass, methods.canonical(), &mass_cites)?;
        }

        // [5] velocity dispersion
        draft.measurement(
            GALAXY_VEL_DISP,
            record.cell(5),
            FactAttrs::new()
                .unit(Unit::KmPerSec)
                .description("RMS dispersion within a slit aperture of length 2 r_e"),
            &[paper],
        );

        // [6] distance
        let tonry = draft.cite(
            SourceSpec::bibcode(TONRY_BIBCODE)
                .with_url(TONRY_URL)
                .with_name(TONRY_NAME),
        );
        draft.measurement(
            DISTANCE,
            record.cell(6),
            FactAttrs::new().unit(Unit::Megaparsec),
            &[tonry],
        );

        // [7] mass-to-light ratio "1.85,I"
        add_mass_to_light(&mut draft, record.cell(7), paper);

        Ok(Some(draft))
    }
}

/// Log-scale counterpart of the linear mass. The one-sigma range converts bound by bound.
fn add_log_mass(
    draft: &mut RecordDraft,
    mass: &Measurement,
    kind: String,
    cites: &[Cite],
) -> Result<(), RecordError> {
    let (log_mass, unit) = convert_quantity_to_log(&mass.value, &[], Unit::SolarMass)?;
    let mut attrs = FactAttrs::new()
        .unit(unit)
        .kind(kind)
        .description("Log BH mass with one-sigma bounds");
    if let (Some(lower), Some(upper)) = (mass.lower_error(), mass.upper_error()) {
        let (lower, _) = convert_quantity_to_log(lower, &[], Unit::SolarMass)?;
        let (upper, _) = convert_quantity_to_log(upper, &[], Unit::SolarMass)?;
        attrs = attrs.bounds(lower.value, upper.value);
    }
    draft.fact(MASS, log_mass.value, attrs, cites);
    Ok(())
}

fn add_mass_to_light(draft: &mut RecordDraft, raw: &str, paper: Cite) {
    if is_missing(raw) {
        return;
    }
    match raw.split_once(',') {
        Some((ratio, band)) => {
            draft.measurement(
                GALAXY_MASS_TO_LIGHT_RATIO,
                ratio,
                FactAttrs::new()
                    .unit(Unit::MassToLight)
                    .description(format!("In band: '{}'", band.trim())),
                &[paper],
            );
        }
        None => {
            let name = draft.name.clone();
            draft.warn(format!("{}: M/L: expected 'ratio,band', got '{}'", name, raw));
        }
    }
}
