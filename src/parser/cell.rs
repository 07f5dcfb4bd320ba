use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use super::{parse_value, ParsedValue};

/// Reference extracted from a hyperlink inside a table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub name: Option<String>,
    pub url: Option<String>,
    pub bibcode: Option<String>,
}

impl Citation {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.url.is_none() && self.bibcode.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCell {
    pub value: ParsedValue,
    pub citations: Vec<Citation>,
}

/// Parse an HTML cell fragment: anchors become citations, the remaining text is the value.
pub fn parse_cell(html: &str) -> ParsedCell {
    let fragment = Html::parse_fragment(html);
    let root = fragment.root_element();

    let mut text = String::new();
    collect_value_text(root, &mut text);

    ParsedCell {
        value: parse_value(&text),
        citations: citations_in(root),
    }
}

/// All visible text of a cell fragment, links included, trimmed.
pub fn cell_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

fn collect_value_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => match el.name() {
                // Link text names the reference; superscripts are footnote markers.
                "a" | "sup" => {}
                "br" => out.push(' '),
                _ => {
                    if let Some(child_ref) = ElementRef::wrap(child) {
                        collect_value_text(child_ref, out);
                    }
                }
            },
            _ => {}
        }
    }
}

fn citations_in(root: ElementRef) -> Vec<Citation> {
    let link_sel = Selector::parse("a").unwrap();
    root.select(&link_sel)
        .map(|link| {
            let url = link
                .value()
                .attr("href")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let display = link.text().collect::<String>().trim().to_string();
            let name = link
                .value()
                .attr("title")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| (!display.is_empty()).then_some(display));
            let bibcode = url.as_deref().and_then(bibcode_from_url);
            Citation { name, url, bibcode }
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Bibcode from an ADS abstract link such as `.../abs/2001A%26A...371..409B`.
pub fn bibcode_from_url(url: &str) -> Option<String> {
    let idx = url.find("/abs/")?;
    let tail = &url[idx + "/abs/".len()..];
    let end = tail.find(['/', '?', '#']).unwrap_or(tail.len());
    let raw = tail[..end].trim();
    if raw.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Measurement;

    #[test]
    fn test_cell_with_link_yields_value_and_citation() {
        let cell = parse_cell(
            r#"7.230 (+0.042/-0.044) <a href="http://adsabs.harvard.edu/abs/2012ApJ...755...60G" title="Grier et al. 2012">G12</a>"#,
        );
        let m = cell.value.measurement().unwrap();
        assert_eq!(m.value, "7.230");
        assert_eq!(m.upper_error(), Some("0.042"));
        assert_eq!(cell.citations.len(), 1);
        let c = &cell.citations[0];
        assert_eq!(c.name.as_deref(), Some("Grier et al. 2012"));
        assert_eq!(c.bibcode.as_deref(), Some("2012ApJ...755...60G"));
    }

    #[test]
    fn test_display_text_names_link_without_title() {
        let cell = parse_cell(r#"<a href="https://example.org/paper">Smith 2010</a>"#);
        assert_eq!(cell.value, ParsedValue::Missing);
        assert_eq!(cell.citations[0].name.as_deref(), Some("Smith 2010"));
        assert_eq!(cell.citations[0].bibcode, None);
    }

    #[test]
    fn test_footnote_markers_are_dropped() {
        let cell = parse_cell("16.7<sup>a</sup>");
        assert_eq!(cell.value, ParsedValue::Parsed(Measurement::bare("16.7")));
    }

    #[test]
    fn test_bibcode_is_percent_decoded() {
        assert_eq!(
            bibcode_from_url("http://adsabs.harvard.edu/abs/2001A%26A...371..409B").as_deref(),
            Some("2001A&A...371..409B")
        );
        assert_eq!(bibcode_from_url("http://example.org/"), None);
    }

    #[test]
    fn test_cell_text_includes_link_text() {
        assert_eq!(
            cell_text(r#"<a href="obj.php?varname=12">Mrk335</a>"#),
            "Mrk335"
        );
    }
}
