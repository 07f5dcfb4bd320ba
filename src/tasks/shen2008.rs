//! Shen et al. 2008 virial masses of SDSS DR5 quasars, from the pipe-delimited VizieR dump of
//! J/ApJ/680/169.
//!
//! The dump has three columns more than the paper's Table 1. Columns used:
//!
//! | col | content |
//! |-----|---------|
//! | 0 | SDSS designation |
//! | 1, 2 | RA, Dec (decimal degrees) |
//! | 3 | redshift |
//! | 5 | i-band absolute magnitude, K-corrected to z=2 |
//! | 6 | log bolometric luminosity |
//! | 9 | MJD of the spectrum |
//! | 14..=22 | FWHM, monochromatic luminosity and virial mass for H-Beta, Mg-II, C-IV |
//! | 23 | adopted virial mass |
//!
//! `9999` marks a quantity that could not be measured from the spectrum.

use crate::catalog::{FactAttrs, Measure, Photometry, SourceSpec};
use crate::constants::{DEC, FWHM_CIV, FWHM_HBETA, FWHM_MGII, MASS, RA, REDSHIFT, SHEN_2008};
use crate::parser::{parse_value, ParsedValue};
use crate::session::{Cite, RawRecord, RecordDraft, RecordError};
use crate::units::Unit;
use crate::vocab::{MassMethod, Vocabulary};

use super::{document_text, IngestTask};

const SOURCE_BIBCODE: &str = "2008ApJ...680..169S";
const SOURCE_NAME: &str = "Shen+2008";
const SOURCE_URL: &str = "http://adsabs.harvard.edu/abs/2008ApJ...680..169S";

const NUM_COLUMNS: usize = 30;
const HEADER_ROWS: usize = 3;
const UNMEASURED: &str = "9999";

const COL_MJD: usize = 9;
const COL_VIRIAL_MASS: usize = 23;

struct EmissionLine {
    name: &'static str,
    wavelength: &'static str,
    fwhm_key: &'static str,
    method: MassMethod,
}

const LINES: [EmissionLine; 3] = [
    EmissionLine {
        name: "H-Beta",
        wavelength: "5100",
        fwhm_key: FWHM_HBETA,
        method: MassMethod::VirialHBeta,
    },
    EmissionLine {
        name: "Mg-II",
        wavelength: "3000",
        fwhm_key: FWHM_MGII,
        method: MassMethod::VirialMgII,
    },
    EmissionLine {
        name: "C-IV",
        wavelength: "1350",
        fwhm_key: FWHM_CIV,
        method: MassMethod::VirialCIV,
    },
];

pub struct Shen2008Task;

impl IngestTask for Shen2008Task {
    fn name(&self) -> &'static str {
        SHEN_2008
    }

    fn description(&self) -> &'static str {
        "Shen et al. 2008: single-epoch virial masses for SDSS DR5 quasars"
    }

    fn default_file(&self) -> &'static str {
        "shen+2008.tsv"
    }

    fn expected_total(&self) -> Option<usize> {
        Some(77429)
    }

    fn tokenize(&self, document: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
        let text = document_text(document)?;
        Ok(text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
            // column names, units and the dashed rule
            .skip(HEADER_ROWS)
            .map(|(i, line)| {
                RawRecord::new(i, line.split('|').map(|c| c.trim().to_string()).collect())
            })
            .collect())
    }

    fn draft(
        &self,
        record: &RawRecord,
        _vocab: &Vocabulary,
    ) -> Result<Option<RecordDraft>, RecordError> {
        if record.cells.len() != NUM_COLUMNS {
            return Err(RecordError::Skipped(format!(
                "expected {} columns, found {}: '{}'",
                NUM_COLUMNS,
                record.cells.len(),
                record.cells.join("|")
            )));
        }

        let mut draft = RecordDraft::new(format!("SDSS{}", record.cell(0)));
        let paper = draft.cite(
            SourceSpec::bibcode(SOURCE_BIBCODE)
                .with_url(SOURCE_URL)
                .with_name(SOURCE_NAME),
        );
        let cites = [paper];

        draft.measurement(RA, record.cell(1), FactAttrs::new().unit(Unit::Degrees), &cites);
        draft.measurement(DEC, record.cell(2), FactAttrs::new().unit(Unit::Degrees), &cites);
        draft.measurement(REDSHIFT, record.cell(3), FactAttrs::new(), &cites);

        let mjd = measured(&mut draft, "mjd", record.cell(COL_MJD));
        let observed = |phot: Photometry| match &mjd {
            Some(t) => phot.time(t.clone(), Unit::Mjd),
            None => phot,
        };

        if let Some(mag) = measured(&mut draft, "i-band magnitude", record.cell(5)) {
            let phot = Photometry::new(Measure::Magnitude, mag)
                .unit(Unit::AbsoluteMagnitude)
                .band("i")
                .includes_host(true)
                .kcorrected(true)
                .description("PSF i-band absolute magnitude, K-corrected to z=2");
            draft.photometry(observed(phot), &cites);
        }

        if let Some(lum) = measured(&mut draft, "bolometric luminosity", record.cell(6)) {
            let phot = Photometry::new(Measure::Luminosity, lum)
                .unit(Unit::LogErgPerSec)
                .band("bolometric")
                .includes_host(true)
                .description("Using bolometric corrections in Richards+2006b");
            draft.photometry(observed(phot), &cites);
        }

        for (ii, line) in LINES.iter().enumerate() {
            let line_name = format!("{} ({} A)", line.name, line.wavelength);
            let col = 14 + 3 * ii;

            if let Some(fwhm) = measured(&mut draft, line.fwhm_key, record.cell(col)) {
                draft.fact(
                    line.fwhm_key,
                    fwhm,
                    FactAttrs::new()
                        .unit(Unit::KmPerSec)
                        .description(format!("Full-width at Half-Maximum of {}", line_name)),
                    &cites,
                );
            }

            let label = format!("L{}", line.wavelength);
            if let Some(lum) = measured(&mut draft, &label, record.cell(col + 1)) {
                let phot = Photometry::new(Measure::Luminosity, lum)
                    .unit(Unit::LogErgPerSec)
                    .wavelength(line.wavelength, Unit::Angstrom)
                    .description(format!(
                        "Monochromatic luminosity for {} (lambda*L_lambda)",
                        line_name
                    ));
                draft.photometry(observed(phot), &cites);
            }

            add_virial_mass(
                &mut draft,
                record.cell(col + 2),
                line.method,
                format!("Virial mass estimated using {}", line_name),
                &cites,
            );
        }

        add_virial_mass(
            &mut draft,
            record.cell(COL_VIRIAL_MASS),
            MassMethod::Virial,
            "Virial BH-Mass Using H-Beta for z < 0.7; Mg-ii for 0.7 < z < 1.9; and C-iv for z > 1.9"
                .to_string(),
            &cites,
        );

        Ok(Some(draft))
    }
}

fn add_virial_mass(
    draft: &mut RecordDraft,
    raw: &str,
    method: MassMethod,
    description: String,
    cites: &[Cite],
) {
    if let Some(mass) = measured(draft, MASS, raw) {
        draft.fact(
            MASS,
            mass,
            FactAttrs::new()
                .unit(Unit::LogSolarMass)
                .kind(method.as_str())
                .description(description),
            cites,
        );
    }
}

/// The value of a numeric cell, or `None` when it is blank, unmeasured or unparseable.
fn measured(draft: &mut RecordDraft, what: &str, raw: &str) -> Option<String> {
    if raw.trim() == UNMEASURED {
        return None;
    }
    match parse_value(raw) {
        ParsedValue::Parsed(m) => Some(m.value),
        ParsedValue::Missing => None,
        ParsedValue::Malformed(reason) => {
            let warning = format!("{}: {}: {}", draft.name, what, reason);
            draft.warn(warning);
            None
        }
    }
}
