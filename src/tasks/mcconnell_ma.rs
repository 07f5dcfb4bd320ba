//! McConnell & Ma 2013 (2013ApJ...764..184M): the Berkeley black-hole compilation, one HTML
//! table row per galaxy.
//!
//! Columns: name (alias), M_BH `3.9 (0.4,0.6) e9`, bulge sigma, log L_V, -, log L_3.6, -,
//! M_bulge, -, r_eff in V, I and 3.6 micron, distance, morphology, method, references.

use scraper::{Html, Selector};

use crate::catalog::{FactAttrs, Measure, Photometry, SourceSpec};
use crate::constants::{
    DISTANCE, GALAXY_INNER_PROFILE, GALAXY_MASS_BULGE, GALAXY_MORPHOLOGY, GALAXY_RAD_EFF_3P6,
    GALAXY_RAD_EFF_I, GALAXY_RAD_EFF_V, GALAXY_VEL_DISP_BULGE, MASS, MCCONNELL_MA,
};
use crate::parser::{cell_text, is_missing, parse_cell, parse_value, ParsedValue};
use crate::session::{Cite, RawRecord, RecordDraft, RecordError};
use crate::units::Unit;
use crate::vocab::Vocabulary;

use super::{document_text, split_name_alias, IngestTask};

const SOURCE_BIBCODE: &str = "2013ApJ...764..184M";
const SOURCE_NAME: &str = "McConnell & Ma 2013";
const SOURCE_URL: &str = "http://adsabs.harvard.edu/abs/2013ApJ...764..184M";
pub const DATA_URL: &str = "http://blackhole.berkeley.edu/";
const NUM_COLUMNS: usize = 16;

/// Host properties that share one shape: (key, column, unit, description).
const HOST_FIELDS: &[(&str, usize, Unit, Option<&str>)] = &[
    (GALAXY_VEL_DISP_BULGE, 2, Unit::KmPerSec, Some("Host, bulge velocity dispersion")),
    (GALAXY_MASS_BULGE, 7, Unit::SolarMass, Some("Mass of the host's bulge")),
    (GALAXY_RAD_EFF_V, 9, Unit::Arcsec, None),
    (GALAXY_RAD_EFF_I, 10, Unit::Arcsec, None),
    (GALAXY_RAD_EFF_3P6, 11, Unit::Arcsec, None),
    (DISTANCE, 12, Unit::Megaparsec, None),
];

pub struct McConnellMaTask;

impl IngestTask for McConnellMaTask {
    fn name(&self) -> &'static str {
        MCCONNELL_MA
    }

    fn description(&self) -> &'static str {
        "McConnell & Ma 2013: dynamical masses with bulge properties"
    }

    fn default_file(&self) -> &'static str {
        "mcconnell_ma2013.html"
    }

    fn expected_total(&self) -> Option<usize> {
        Some(72)
    }

    fn tokenize(&self, document: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
        let html = document_text(document)?;
        let document = Html::parse_document(html);

        let table_sel = Selector::parse("table").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();

        let table = document
            .select(&table_sel)
            .next()
            .ok_or_else(|| RecordError::Structural("no <table> in document".to_string()))?;

        // Header rows hold <th> only
        Ok(table
            .select(&row_sel)
            .enumerate()
            .map(|(i, row)| {
                let cells: Vec<String> = row.select(&cell_sel).map(|td| td.inner_html()).collect();
                RawRecord::new(i, cells)
            })
            .filter(|record| !record.cells.is_empty())
            .collect())
    }

    fn draft(
        &self,
        record: &RawRecord,
        vocab: &Vocabulary,
    ) -> Result<Option<RecordDraft>, RecordError> {
        if record.cells.len() < NUM_COLUMNS {
            return Err(RecordError::Skipped(format!(
                "expected {} cells, found {}",
                NUM_COLUMNS,
                record.cells.len()
            )));
        }

        let (name, alias) = split_name_alias(&cell_text(record.cell(0)));
        if name.is_empty() {
            return Ok(None);
        }

        let mut draft = RecordDraft::new(name.as_str());
        if let Some(alias) = alias {
            draft.alias(alias);
        }
        let paper = draft.cite(
            SourceSpec::bibcode(SOURCE_BIBCODE)
                .with_url(SOURCE_URL)
                .with_name(SOURCE_NAME),
        );

        // Vocabulary failures drop the whole row, so resolve them first.
        let morphology_code = cell_text(record.cell(13));
        let morphology = if is_missing(&morphology_code) {
            None
        } else {
            Some(vocab.map_morphology(&morphology_code)?)
        };
        let method_code = cell_text(record.cell(14));
        let methods = vocab.map_mass_methods(&method_code)?;

        // [15] mass references, linked
        let mut mass_cites = vec![paper];
        for citation in &parse_cell(record.cell(15)).citations {
            mass_cites.push(draft.cite(SourceSpec::from(citation)));
        }

        // [1] mass with its one-sigma range and shared exponent
        draft.measurement(
            MASS,
            &cell_text(record.cell(1)),
            FactAttrs::new()
                .unit(Unit::SolarMass)
                .kind(methods.canonical())
                .description(format!(
                    "BH Mass with one-sigma errors.  Method: '{}'",
                    methods.description()
                )),
            &mass_cites,
        );

        for (key, column, unit, description) in HOST_FIELDS {
            let mut attrs = FactAttrs::new().unit(*unit);
            if let Some(description) = description {
                attrs = attrs.description(*description);
            }
            draft.measurement(key, &cell_text(record.cell(*column)), attrs, &[paper]);
        }

        // [13] morphology, with any inner profile qualifier
        if let Some(morphology) = morphology {
            draft.fact(
                GALAXY_MORPHOLOGY,
                morphology.canonical(),
                FactAttrs::new()
                    .description(format!("Classification: {}", morphology.detailed())),
                &[paper],
            );
            for profile in morphology.profiles() {
                draft.fact(GALAXY_INNER_PROFILE, profile.as_str(), FactAttrs::new(), &[paper]);
            }
        }

        // [3] and [5] bulge luminosities
        add_bulge_luminosity(&mut draft, record.cell(3), paper, |p| {
            p.band("V").description("Bulge V-band luminosity")
        });
        add_bulge_luminosity(&mut draft, record.cell(5), paper, |p| {
            p.wavelength("3.6", Unit::Micron)
                .description("Bulge 3.6 micron luminosity")
        });

        Ok(Some(draft))
    }
}

fn add_bulge_luminosity(
    draft: &mut RecordDraft,
    cell: &str,
    paper: Cite,
    describe: impl FnOnce(Photometry) -> Photometry,
) {
    match parse_value(&cell_text(cell)) {
        ParsedValue::Parsed(m) => {
            let mut phot = Photometry::new(Measure::Luminosity, m.value.as_str())
                .unit(Unit::LogSolarLuminosity)
                .host(true);
            if let Some(err) = m.symmetric_error() {
                phot = phot.error(err);
            }
            draft.photometry(describe(phot), &[paper]);
        }
        ParsedValue::Missing => {}
        ParsedValue::Malformed(reason) => {
            let name = draft.name.clone();
            draft.warn(format!("{}: bulge luminosity: {}", name, reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::vocab::InnerProfile;

    const PAGE: &str = r#"<html><body>
<table>
<tr><th>Galaxy</th><th>M_BH</th><th>sigma</th><th>log L_V</th><th></th><th>log L_3.6</th>
<th></th><th>M_bulge</th><th></th><th>r_V</th><th>r_I</th><th>r_3.6</th><th>D</th>
<th>Type</th><th>Method</th><th>Ref</th></tr>
<tr><td>N4486 (M87)</td><td>6.2 (5.8,6.5) e9</td><td>324 ± 28</td><td>11.16 ± 0.1</td><td></td>
<td>11.56</td><td></td><td>6.0e11</td><td></td><td>81.3</td><td>--</td><td>-</td><td>17.0</td>
<td>E0 core</td><td>stars</td>
<td><a href="http://adsabs.harvard.edu/abs/2011ApJ...729..119G">G11</a></td></tr>
<tr><td>N1332</td><td>1.5 (1.3,1.7) e9</td><td>328 ± 16</td><td>-</td><td></td><td>-</td><td></td>
<td>1.2e11</td><td></td><td>-</td><td>-</td><td>-</td><td>22.3</td><td>E/S0</td><td>stars</td>
<td></td></tr>
<tr><td>N9999</td><td>1.0 (0.9,1.1) e8</td><td>-</td><td>-</td><td></td><td>-</td><td></td>
<td>-</td><td></td><td>-</td><td>-</td><td>-</td><td>-</td><td>Sy2</td><td>stars</td><td></td></tr>
</table>
</body></html>"#;

    fn records() -> Vec<RawRecord> {
        McConnellMaTask.tokenize(PAGE.as_bytes()).unwrap()
    }

    #[test]
    fn test_tokenize_skips_header_row() {
        let records = records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].index, 1);
        assert_eq!(cell_text(records[1].cell(0)), "N1332");
    }

    #[test]
    fn test_draft_bulge_properties() {
        let vocab = Vocabulary::standard();
        let draft = McConnellMaTask.draft(&records()[0], &vocab).unwrap().unwrap();
        assert_eq!(draft.name, "N4486");
        assert_eq!(draft.aliases, vec!["M87"]);
        assert_eq!(draft.citations.len(), 2);

        let mass = draft.facts.iter().find(|f| f.key == MASS).unwrap();
        assert_eq!(mass.value, "6.2e9");
        assert_eq!(mass.attrs.e_lower.as_deref(), Some("5.8e9"));
        assert_eq!(mass.attrs.e_upper.as_deref(), Some("6.5e9"));
        assert_eq!(mass.attrs.kind.as_deref(), Some("dynamics (stars)"));
        assert_eq!(mass.cites.len(), 2);

        let sigma = draft.facts.iter().find(|f| f.key == GALAXY_VEL_DISP_BULGE).unwrap();
        assert_eq!(sigma.value, "324");
        assert_eq!(sigma.attrs.error.as_deref(), Some("28"));
        assert_eq!(sigma.attrs.unit, Some(Unit::KmPerSec));

        let bulge = draft.facts.iter().find(|f| f.key == GALAXY_MASS_BULGE).unwrap();
        assert_eq!(bulge.value, "6.0e11");
        assert!(draft.facts.iter().any(|f| f.key == GALAXY_RAD_EFF_V));
        assert!(!draft.facts.iter().any(|f| f.key == GALAXY_RAD_EFF_I));

        let profile = draft.facts.iter().find(|f| f.key == GALAXY_INNER_PROFILE).unwrap();
        assert_eq!(profile.value, InnerProfile::Core.as_str());

        assert_eq!(draft.photometry.len(), 2);
        let v_band = &draft.photometry[0].photometry;
        assert_eq!(v_band.band.as_deref(), Some("V"));
        assert_eq!(v_band.e_value.as_deref(), Some("0.1"));
        assert_eq!(v_band.u_value, Some(Unit::LogSolarLuminosity));
        assert!(v_band.host);
        let ir = &draft.photometry[1].photometry;
        assert_eq!(ir.wavelength.as_deref(), Some("3.6"));
        assert_eq!(ir.u_wavelength, Some(Unit::Micron));
    }

    #[test]
    fn test_composite_morphology_commits() {
        let vocab = Vocabulary::standard();
        let mut catalog = Catalog::default();
        let mut draft = McConnellMaTask.draft(&records()[1], &vocab).unwrap().unwrap();
        draft.validate(&catalog).unwrap();
        let name = draft.commit(&mut catalog, MCCONNELL_MA).unwrap();
        assert_eq!(name, "NGC1332");

        let entry = catalog.entry(&name).unwrap();
        assert_eq!(entry.facts(GALAXY_MORPHOLOGY)[0].value, "elliptical/lenticular");
        assert!(entry.facts(GALAXY_INNER_PROFILE).is_empty());
        assert_eq!(entry.sources.len(), 1);
        assert!(entry.photometry.is_empty());
    }

    #[test]
    fn test_unknown_morphology_drops_row() {
        let vocab = Vocabulary::standard();
        assert!(matches!(
            McConnellMaTask.draft(&records()[2], &vocab),
            Err(RecordError::Vocabulary(_))
        ));

        let short = RawRecord::new(0, vec!["<b>x</b>".to_string()]);
        assert!(matches!(
            McConnellMaTask.draft(&short, &vocab),
            Err(RecordError::Skipped(_))
        ));
    }
}
