//! The AGN Black Hole Mass Database (Bentz & Katz 2015), scraped from its HTML overview table.
//!
//! Every object row sits in `<table class="hovertable">` and links its detail page through
//! `obj.php?varname=N`; header and spacer rows carry no such link.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::catalog::{FactAttrs, SourceSpec};
use crate::constants::{AGN_BHM_DATABASE, DEC, MASS, RA, REDSHIFT};
use crate::parser::{
    cell_text, is_missing, parse_cell, split_aliases, ParsedValue, ALIAS_DELIMITER,
};
use crate::session::{RawRecord, RecordDraft, RecordError};
use crate::units::Unit;
use crate::vocab::{MassMethod, Vocabulary};

use super::{document_text, split_name_alias, IngestTask};

const SOURCE_BIBCODE: &str = "2015PASP..127...67B";
const SOURCE_URL: &str = "http://adsabs.harvard.edu/abs/2015PASP..127...67B";
const SOURCE_NAME: &str = "Bentz & Katz 2015";
pub const DATA_URL: &str = "http://www.astro.gsu.edu/AGNmass/";

static VARNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"varname=([0-9]*)").unwrap());

pub struct AgnBhmDatabaseTask;

impl IngestTask for AgnBhmDatabaseTask {
    fn name(&self) -> &'static str {
        AGN_BHM_DATABASE
    }

    fn description(&self) -> &'static str {
        "AGN Black Hole Mass Database: reverberation-mapped masses"
    }

    fn default_file(&self) -> &'static str {
        "agn_bhm_database.html"
    }

    fn expected_total(&self) -> Option<usize> {
        None
    }

    fn tokenize(&self, document: &[u8]) -> Result<Vec<RawRecord>, RecordError> {
        let html = document_text(document)?;
        let document = Html::parse_document(html);

        let table_sel = Selector::parse("table.hovertable").unwrap();
        let row_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td").unwrap();

        let table = document.select(&table_sel).next().ok_or_else(|| {
            RecordError::Structural("no <table class=\"hovertable\"> in document".to_string())
        })?;

        let records = table
            .select(&row_sel)
            .enumerate()
            .filter_map(|(i, row)| {
                let cells: Vec<String> = row.select(&cell_sel).map(|td| td.inner_html()).collect();
                let first = cells.first()?;
                VARNAME
                    .is_match(first)
                    .then(|| RawRecord::new(i, cells))
            })
            .collect();
        Ok(records)
    }

    fn draft(
        &self,
        record: &RawRecord,
        _vocab: &Vocabulary,
    ) -> Result<Option<RecordDraft>, RecordError> {
        // [0] name, optionally "name (alias)"
        let (name, alias) = split_name_alias(&cell_text(record.cell(0)));
        // The table ends with an empty row
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

        // [1] log mass with the papers it comes from linked in the cell
        let mass = parse_cell(record.cell(1));
        let mut mass_cites = vec![paper];
        for citation in &mass.citations {
            mass_cites.push(draft.cite(SourceSpec::from(citation)));
        }
        match mass.value {
            ParsedValue::Parsed(m) => draft.fact(
                MASS,
                m.value.clone(),
                FactAttrs::new()
                    .measured(&m)
                    .unit(Unit::LogSolarMass)
                    .kind(MassMethod::ReverberationMapping.as_str())
                    .description("Log BH mass with one-sigma errors"),
                &mass_cites,
            ),
            ParsedValue::Missing => {}
            ParsedValue::Malformed(reason) => {
                draft.warn(format!("{}: {}: {}", name, MASS, reason));
            }
        }

        // [2] RA and [3] Dec are sexagesimal text, kept as printed
        for (key, column) in [(RA, 2), (DEC, 3)] {
            let text = cell_text(record.cell(column));
            if !is_missing(&text) {
                draft.fact(key, text, FactAttrs::new().unit(Unit::Sexagesimal), &[paper]);
            }
        }

        // [4] redshift
        let redshift = cell_text(record.cell(4));
        draft.measurement(REDSHIFT, &redshift, FactAttrs::new(), &[paper]);

        // [5] alternate names
        for alias in split_aliases(&cell_text(record.cell(5)), ALIAS_DELIMITER) {
            draft.alias(alias);
        }

        Ok(Some(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    const PAGE: &str = r#"<html><body>
<table class="hovertable">
<tr><th>Object</th><th>log M</th><th>RA</th><th>Dec</th><th>z</th><th>Alt</th></tr>
<tr>
  <td><a href="obj.php?varname=1">Mrk335</a></td>
  <td>7.230 (+0.042/-0.044) <a href="http://adsabs.harvard.edu/abs/2012ApJ...755...60G" title="Grier et al. 2012">G12</a></td>
  <td>00:06:19.5</td><td>+20:12:10</td><td>0.02579</td>
  <td>PG0003+199&emsp;UGC 00524</td>
</tr>
<tr>
  <td><a href="obj.php?varname=31">NGC 3227 (Mrk 1239)</a></td>
  <td>6.775 (+0.083/-0.111)</td>
  <td>10:23:30.6</td><td>+19:51:54</td><td>0.00386</td><td>--</td>
</tr>
<tr><td><a href="obj.php?varname=">&nbsp;</a></td><td></td><td></td><td></td><td></td><td></td></tr>
</table>
</body></html>"#;

    fn records() -> Vec<RawRecord> {
        AgnBhmDatabaseTask.tokenize(PAGE.as_bytes()).unwrap()
    }

    #[test]
    fn test_tokenize_keeps_object_rows() {
        let records = records();
        assert_eq!(records.len(), 3);
        assert_eq!(cell_text(records[0].cell(0)), "Mrk335");
    }

    #[test]
    fn test_missing_table_is_structural() {
        let err = AgnBhmDatabaseTask
            .tokenize(b"<html><body><table><tr><td>x</td></tr></table></body></html>")
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_draft_row_with_citation_and_aliases() {
        let vocab = Vocabulary::standard();
        let draft = AgnBhmDatabaseTask.draft(&records()[0], &vocab).unwrap().unwrap();
        assert_eq!(draft.name, "Mrk335");
        assert_eq!(draft.aliases, vec!["PG0003+199", "UGC 00524"]);
        assert_eq!(draft.citations.len(), 2);

        let mass = draft.facts.iter().find(|f| f.key == MASS).unwrap();
        assert_eq!(mass.value, "7.230");
        assert_eq!(mass.attrs.e_lower.as_deref(), Some("0.044"));
        assert_eq!(mass.attrs.e_upper.as_deref(), Some("0.042"));
        assert_eq!(mass.attrs.unit, Some(Unit::LogSolarMass));
        assert_eq!(mass.attrs.kind.as_deref(), Some("reverberation mapping"));

        let ra = draft.facts.iter().find(|f| f.key == RA).unwrap();
        assert_eq!(ra.value, "00:06:19.5");
        assert_eq!(ra.attrs.unit, Some(Unit::Sexagesimal));
    }

    #[test]
    fn test_parenthesized_alias_and_blank_row() {
        let vocab = Vocabulary::standard();
        let mut catalog = Catalog::default();

        let mut draft = AgnBhmDatabaseTask.draft(&records()[1], &vocab).unwrap().unwrap();
        assert_eq!(draft.aliases, vec!["Mrk 1239"]);
        draft.validate(&catalog).unwrap();
        let name = draft.commit(&mut catalog, AGN_BHM_DATABASE).unwrap();
        assert_eq!(name, "NGC3227");
        assert_eq!(catalog.entry(&name).unwrap().facts(REDSHIFT)[0].value, "0.00386");

        assert!(AgnBhmDatabaseTask.draft(&records()[2], &vocab).unwrap().is_none());
    }
}
