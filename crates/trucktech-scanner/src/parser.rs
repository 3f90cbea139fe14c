//! Interpreting portal markup.
//!
//! Pure text helpers for fault rows plus the roster layouts the portal has
//! shipped, tried in order until one yields entries.

use crate::error::Result;
use crate::models::{FaultCode, RosterFields, Severity};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use trucktech_browser::{PageDriver, PageElement};
use trucktech_core::SelectorConfig;

/// A way of spotting an SPN/FMI pair in free text.
pub struct CodePattern {
    pub name: &'static str,
    regex: Regex,
}

impl CodePattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("valid regex"),
        }
    }

    /// SPN and FMI from the first match, if both fit in a `u32`.
    pub fn captures(&self, text: &str) -> Option<(u32, u32)> {
        let caps = self.regex.captures(text)?;
        let spn = caps.get(1)?.as_str().parse().ok()?;
        let fmi = caps.get(2)?.as_str().parse().ok()?;
        Some((spn, fmi))
    }
}

/// Patterns in priority order: "SPN 3363 ... FMI 1", then "3363/1".
pub fn code_patterns() -> &'static [CodePattern] {
    static PATTERNS: OnceLock<Vec<CodePattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            CodePattern::new("labelled", r"(?is)SPN[:\s]*(\d+).*?FMI[:\s]*(\d+)"),
            CodePattern::new("compact", r"(\d{3,5})/(\d{1,2})"),
        ]
    })
}

/// Find an SPN/FMI pair in `text`.
pub fn parse_spn_fmi(text: &str) -> Option<(u32, u32)> {
    code_patterns().iter().find_map(|p| p.captures(text))
}

/// Activity and severity read off a row's class and style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMarkers {
    pub is_active: bool,
    pub severity: Severity,
}

/// Scan class/style text for the portal's colour and state markers.
pub fn classify_markers(attributes: &str) -> RowMarkers {
    let attrs = attributes.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| attrs.contains(n));

    let severity = if has(&["critical", "red"]) {
        Severity::Critical
    } else if has(&["warning", "yellow"]) {
        Severity::Major
    } else if has(&["info", "blue"]) {
        Severity::Minor
    } else {
        Severity::Unknown
    };

    RowMarkers {
        is_active: !has(&["inactive", "historical"]),
        severity,
    }
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Build a fault from one row's text and attributes. `None` when the text
/// carries no SPN/FMI pair.
pub fn parse_fault_row(
    vin: &str,
    raw_text: &str,
    attributes: &str,
    description_max_chars: usize,
) -> Option<FaultCode> {
    let (spn, fmi) = parse_spn_fmi(raw_text)?;
    let markers = classify_markers(attributes);

    let mut fault = FaultCode::new(vin, spn, fmi);
    fault.is_active = markers.is_active;
    fault.severity = markers.severity;
    fault.description = truncate_chars(raw_text, description_max_chars);
    fault.raw_text = raw_text.to_string();
    Some(fault)
}

/// One layout of the asset roster.
#[async_trait]
pub trait RosterStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Entries found on `page`; empty when this layout is not in use.
    async fn extract(
        &self,
        page: &dyn PageDriver,
        selectors: &SelectorConfig,
    ) -> Result<Vec<RosterFields>>;
}

/// `<table>` rows of VIN, unit, year/make/model and status cells.
pub struct TableRows;

#[async_trait]
impl RosterStrategy for TableRows {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn extract(
        &self,
        page: &dyn PageDriver,
        selectors: &SelectorConfig,
    ) -> Result<Vec<RosterFields>> {
        let mut entries = Vec::new();
        for row in page.query_all(&selectors.roster_rows).await? {
            let cells = row.query_all(&selectors.roster_cells).await?;
            if cells.len() < 4 {
                continue;
            }
            entries.push(RosterFields {
                vin: trimmed_text(cells[0].as_ref()).await?,
                unit_number: trimmed_text(cells[1].as_ref()).await?,
                year_make_model: trimmed_text(cells[2].as_ref()).await?,
                status: trimmed_text(cells[3].as_ref()).await?,
            });
        }
        Ok(entries)
    }
}

/// Card/list layout with alternate selectors per field.
pub struct Cards;

#[async_trait]
impl RosterStrategy for Cards {
    fn name(&self) -> &'static str {
        "cards"
    }

    async fn extract(
        &self,
        page: &dyn PageDriver,
        selectors: &SelectorConfig,
    ) -> Result<Vec<RosterFields>> {
        let mut entries = Vec::new();
        for card in page.query_all(&selectors.roster_cards).await? {
            let card = card.as_ref();
            entries.push(RosterFields {
                vin: field_text(card, &selectors.card_vin).await?,
                unit_number: field_text(card, &selectors.card_unit_number).await?,
                year_make_model: field_text(card, &selectors.card_year_make_model).await?,
                status: field_text(card, &selectors.card_status).await?,
            });
        }
        Ok(entries)
    }
}

/// Strategies in the order they are tried.
pub fn default_roster_strategies() -> Vec<Box<dyn RosterStrategy>> {
    vec![Box::new(TableRows), Box::new(Cards)]
}

async fn trimmed_text(element: &dyn PageElement) -> Result<String> {
    Ok(element.text().await?.trim().to_string())
}

/// Text of the first descendant matching any alternate, empty when none does.
async fn field_text(card: &dyn PageElement, alternates: &[String]) -> Result<String> {
    if alternates.is_empty() {
        return Ok(String::new());
    }
    match card.query_selector(&alternates.join(", ")).await? {
        Some(element) => trimmed_text(element.as_ref()).await,
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_pattern() {
        assert_eq!(parse_spn_fmi("SPN 3363 FMI 1"), Some((3363, 1)));
        assert_eq!(parse_spn_fmi("spn:520 fmi:31 low voltage"), Some((520, 31)));
        assert_eq!(
            parse_spn_fmi("SPN: 4364\nSCR NOx conversion efficiency\nFMI: 18"),
            Some((4364, 18))
        );
    }

    #[test]
    fn test_compact_pattern() {
        assert_eq!(parse_spn_fmi("Code 1569/31 engine derate"), Some((1569, 31)));
        assert_eq!(parse_spn_fmi("12/3"), None);
    }

    #[test]
    fn test_derate_code_any_spelling() {
        for text in ["SPN 3363 FMI 4", "spn3363 fmi4", "Spn: 3363 - DEF level - Fmi: 4"] {
            let fault = parse_fault_row("VIN", text, "", 500).expect(text);
            assert_eq!((fault.spn, fault.fmi), (3363, 4), "{text}");
            assert_eq!(fault.code_identifier(), "SPN3363-FMI4");
            assert!(fault.is_critical());
        }
        assert_eq!(parse_spn_fmi("Coolant temp 190/14"), Some((190, 14)));
    }

    #[test]
    fn test_labelled_pattern_wins() {
        assert_eq!(parse_spn_fmi("5246/0 SPN 3364 FMI 2"), Some((3364, 2)));
    }

    #[test]
    fn test_no_code() {
        assert_eq!(parse_spn_fmi("Last updated 3 hours ago"), None);
        assert_eq!(parse_spn_fmi(""), None);
        assert_eq!(parse_spn_fmi("SPN 99999999999 FMI 1"), None);
    }

    #[test]
    fn test_classify_markers() {
        let m = classify_markers("fault-row critical");
        assert_eq!(m.severity, Severity::Critical);
        assert!(m.is_active);

        let m = classify_markers("fault-row historical WARNING");
        assert_eq!(m.severity, Severity::Major);
        assert!(!m.is_active);

        assert_eq!(classify_markers("dtc-row badge-blue").severity, Severity::Minor);
        assert_eq!(classify_markers("fault-row").severity, Severity::Unknown);
        assert!(!classify_markers("row inactive").is_active);
        assert_eq!(
            classify_markers("fault-row color: red").severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ÄÖÜäöü", 4), "ÄÖÜä");
        let long = "x".repeat(600);
        assert_eq!(truncate_chars(&long, 500).chars().count(), 500);
    }

    #[test]
    fn test_parse_fault_row() {
        let fault = parse_fault_row(
            "1XKYD49X0LJ123456",
            "SPN 3363 FMI 1 DEF tank level low",
            "fault-row warning",
            500,
        )
        .expect("fault");
        assert_eq!(fault.code_identifier(), "SPN3363-FMI1");
        assert_eq!(fault.severity, Severity::Major);
        assert!(fault.is_critical(), "3363 is a derate SPN");
        assert_eq!(fault.occurrence_count, 1);
        assert_eq!(fault.source_address, 0);
        assert_eq!(fault.raw_text, "SPN 3363 FMI 1 DEF tank level low");
        assert!(fault.first_seen.is_none());

        assert!(parse_fault_row("VIN", "Engine overview", "fault-row", 500).is_none());
    }

    #[test]
    fn test_description_is_truncated() {
        let text = format!("SPN 100 FMI 1 {}", "y".repeat(700));
        let fault = parse_fault_row("VIN", &text, "", 500).expect("fault");
        assert_eq!(fault.description.chars().count(), 500);
        assert_eq!(fault.raw_text, text);
    }

    #[tokio::test]
    async fn test_strategies_ignore_other_layouts() {
        use trucktech_browser::BrowserLauncher;
        use trucktech_testkit::prelude::*;

        let html = "<table><tbody><tr><td>1XKYD49X0LJ123456</td><td>T-104</td>\
                    <td>2020 Kenworth T680</td></tr></tbody></table>";
        let portal = FakePortal::new(BASE_URL).page("/assets", html);
        let page = portal.open_page(None).await.unwrap();
        page.navigate(&portal.url("/assets")).await.unwrap();

        let selectors = SelectorConfig::default();
        let rows = TableRows.extract(page.as_ref(), &selectors).await.unwrap();
        assert!(rows.is_empty(), "three cells is not a roster row");
        let cards = Cards.extract(page.as_ref(), &selectors).await.unwrap();
        assert!(cards.is_empty());
    }

    #[test]
    fn test_strategy_order() {
        let names: Vec<_> = default_roster_strategies().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["table", "cards"]);
    }
}
