//! Turns a rendered flow page into dated records.
//!
//! The flow table is found by its header cells (known fund tickers plus a
//! `Total` column), never by CSS classes or position on the page, since the
//! site restyles independently of its data. Numbers use accounting notation:
//! `(103.6)` is an outflow of 103.6 and `-` marks a fund with no data that
//! day.

use crate::core::{AssetClass, DailyFlowRecord, ParseFailure, RenderedDocument};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Header rows are expected within the first few rows of the table.
pub(crate) const HEADER_SCAN_ROWS: usize = 4;

const PLACEHOLDERS: &[&str] = &["", "-", "–", "—", "N/A", "NA", "n/a"];

/// First-column labels of rows that are not daily figures.
const NON_DATA_LABELS: &[&str] = &[
    "", "total", "average", "maximum", "minimum", "fee", "fees", "seed", "date",
];

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Ticker(String),
    Total,
    Price,
}

/// Records pulled from one page, plus how many dated rows had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<DailyFlowRecord>,
    pub rejected_rows: usize,
}

struct Selectors {
    table: Selector,
    row: Selector,
    any_cell: Selector,
    data_cell: Selector,
}

impl Selectors {
    fn new() -> Option<Self> {
        Some(Self {
            table: Selector::parse("table").ok()?,
            row: Selector::parse("tr").ok()?,
            any_cell: Selector::parse("th, td").ok()?,
            data_cell: Selector::parse("td").ok()?,
        })
    }
}

pub struct TableExtractor {
    asset_class: AssetClass,
}

impl TableExtractor {
    pub fn new(asset_class: AssetClass) -> Self {
        Self { asset_class }
    }

    pub fn extract(&self, document: &RenderedDocument) -> Result<Extraction, ParseFailure> {
        self.extract_html(&document.html)
    }

    pub fn extract_html(&self, html: &str) -> Result<Extraction, ParseFailure> {
        let table_not_found = || ParseFailure::TableNotFound {
            asset_class: self.asset_class.to_string(),
        };
        let selectors = Selectors::new().ok_or_else(table_not_found)?;
        let document = Html::parse_document(html);

        let (table, columns) = document
            .select(&selectors.table)
            .map(|table| (table, self.header_columns(table, &selectors)))
            .filter(|(_, columns)| ticker_count(columns) > 0)
            .max_by_key(|(_, columns)| ticker_count(columns))
            .ok_or_else(table_not_found)?;

        debug!(
            asset_class = %self.asset_class,
            columns = ?columns,
            "Located flow table"
        );

        let mut extraction = Extraction::default();
        for (row_index, row) in table.select(&selectors.row).enumerate() {
            let cells: Vec<ElementRef> = row.select(&selectors.data_cell).collect();
            let Some(first) = cells.first() else {
                continue;
            };

            let label = cell_text(*first);
            if NON_DATA_LABELS.contains(&label.to_lowercase().as_str()) {
                continue;
            }

            match self.parse_row(row_index, &label, &cells, &columns) {
                Ok(Some(record)) => extraction.records.push(record),
                Ok(None) => debug!(row = row_index, date = %label, "Skipping row without data"),
                Err(failure) => {
                    warn!(asset_class = %self.asset_class, "Skipping unparseable row: {failure}");
                    extraction.rejected_rows += 1;
                }
            }
        }

        if extraction.records.is_empty() {
            return Err(ParseFailure::EmptyTable {
                asset_class: self.asset_class.to_string(),
            });
        }

        debug!(
            asset_class = %self.asset_class,
            records = extraction.records.len(),
            rejected = extraction.rejected_rows,
            "Extracted flow records"
        );
        Ok(extraction)
    }

    /// Maps cell positions in the header rows to the columns they carry.
    fn header_columns(&self, table: ElementRef, selectors: &Selectors) -> Vec<(usize, Column)> {
        let mut columns: BTreeMap<usize, Column> = BTreeMap::new();
        for row in table.select(&selectors.row).take(HEADER_SCAN_ROWS) {
            for (index, cell) in row.select(&selectors.any_cell).enumerate() {
                let text = cell_text(cell).to_uppercase();
                if self.asset_class.is_known_ticker(&text) {
                    columns.insert(index, Column::Ticker(text));
                } else if text == "TOTAL" {
                    columns.insert(index, Column::Total);
                } else if text.contains("PRICE") {
                    columns.insert(index, Column::Price);
                }
            }
        }
        columns.into_iter().collect()
    }

    /// `Ok(None)` is a row whose figures are all placeholders, which the site
    /// renders for days not yet reported.
    fn parse_row(
        &self,
        row_index: usize,
        label: &str,
        cells: &[ElementRef],
        columns: &[(usize, Column)],
    ) -> Result<Option<DailyFlowRecord>, ParseFailure> {
        let date = parse_date(label).ok_or_else(|| ParseFailure::RowParseError {
            row: row_index,
            reason: format!("unrecognised date '{label}'"),
        })?;

        let mut ticker_flows = BTreeMap::new();
        let mut total = None;
        let mut price = None;

        for (index, column) in columns {
            let Some(cell) = cells.get(*index) else {
                continue;
            };
            let text = cell_text(*cell);
            let value = parse_flow(&text).map_err(|reason| ParseFailure::RowParseError {
                row: row_index,
                reason: format!("{date}: {reason}"),
            })?;
            let Some(value) = value else {
                continue;
            };
            match column {
                Column::Ticker(ticker) => {
                    ticker_flows.insert(ticker.clone(), value);
                }
                Column::Total => total = Some(value),
                Column::Price => price = Some(value),
            }
        }

        if ticker_flows.is_empty() && total.is_none() {
            return Ok(None);
        }

        let total_flow = total.unwrap_or_else(|| ticker_flows.values().sum());
        Ok(Some(DailyFlowRecord {
            asset_class: self.asset_class,
            date,
            total_flow,
            price,
            ticker_flows,
        }))
    }
}

fn ticker_count(columns: &[(usize, Column)]) -> usize {
    columns
        .iter()
        .filter(|(_, c)| matches!(c, Column::Ticker(_)))
        .count()
}

fn cell_text(cell: ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts `26 Dec 2025` (possibly surrounded by other text) or `2025-12-26`.
fn parse_date(text: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d") {
        return Some(date);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.windows(3).find_map(|window| {
        let day: u32 = window[0].parse().ok()?;
        let month_token = window[1].to_lowercase();
        let month = MONTHS
            .iter()
            .position(|m| month_token.starts_with(m))
            .map(|i| i as u32 + 1)?;
        let year: i32 = window[2]
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Parses an accounting-style figure. Placeholders yield `Ok(None)`.
fn parse_flow(text: &str) -> Result<Option<f64>, String> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && *c != '$' && !c.is_whitespace())
        .collect();

    if PLACEHOLDERS.contains(&cleaned.as_str()) {
        return Ok(None);
    }

    let (negative, digits) = match cleaned
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
    {
        Some(inner) => (true, inner),
        None => (false, cleaned.as_str()),
    };

    let value: f64 = digits
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("invalid figure '{text}'"))?;
    Ok(Some(if negative { -value } else { value }))
}
