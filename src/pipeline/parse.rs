//! Response parsing: recover line-item rows from free-form model output.
//!
//! The model is asked for a pipe table but answers in whatever shape it likes:
//! GFM tables with or without outer pipes, tables preceded by chatter, or a
//! JSON array buried in prose. Parsing is a two-stage affair:
//!
//! 1. A line-oriented state machine that waits for the `---|---` separator
//!    row and then reads every piped line as a row.
//! 2. If that yields nothing, a JSON fallback that decodes the first
//!    bracket-delimited span in the text.
//!
//! The outcome says which stage produced the rows, and separates "the model
//! returned nothing usable" from "the model returned JSON we could not read".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A row exactly as it was read from the model output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedRow {
    pub name: String,
    pub quantity: Option<String>,
    pub unit_price: Option<String>,
    pub total: Option<String>,
}

impl ParsedRow {
    pub fn new(
        name: impl Into<String>,
        quantity: impl Into<String>,
        unit_price: impl Into<String>,
        total: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            quantity: Some(quantity.into()),
            unit_price: Some(unit_price.into()),
            total: Some(total.into()),
        }
    }
}

/// How the parser arrived at its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Rows read from a pipe table.
    Table(Vec<ParsedRow>),
    /// No table rows; rows decoded from embedded JSON.
    Json(Vec<ParsedRow>),
    /// Neither a table nor a JSON candidate was present.
    NoDataFound,
    /// A JSON candidate was present but could not be decoded.
    Malformed { reason: String },
}

/// Serialisable summary of a [`ParseOutcome`], reported alongside records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseStatus {
    Table,
    Json,
    NoDataFound,
    Malformed { reason: String },
}

impl ParseOutcome {
    pub fn status(&self) -> ParseStatus {
        match self {
            ParseOutcome::Table(_) => ParseStatus::Table,
            ParseOutcome::Json(_) => ParseStatus::Json,
            ParseOutcome::NoDataFound => ParseStatus::NoDataFound,
            ParseOutcome::Malformed { reason } => ParseStatus::Malformed {
                reason: reason.clone(),
            },
        }
    }

    pub fn rows(&self) -> &[ParsedRow] {
        match self {
            ParseOutcome::Table(rows) | ParseOutcome::Json(rows) => rows,
            ParseOutcome::NoDataFound | ParseOutcome::Malformed { .. } => &[],
        }
    }

    pub fn into_rows(self) -> Vec<ParsedRow> {
        match self {
            ParseOutcome::Table(rows) | ParseOutcome::Json(rows) => rows,
            ParseOutcome::NoDataFound | ParseOutcome::Malformed { .. } => Vec::new(),
        }
    }
}

/// Header fragments that mark a column-title line before the separator.
const HEADER_TOKENS: &[&str] = &[
    "tên hàng",
    "ten hang",
    "số lượng",
    "so luong",
    "item name",
    "product name",
    "quantity",
    "qty",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    BeforeSeparator,
    AfterSeparator,
}

/// Parse raw model output into rows.
pub fn parse_response(response: &str) -> ParseOutcome {
    let rows = parse_table(response);
    if !rows.is_empty() {
        debug!("Parsed {} rows from table", rows.len());
        return ParseOutcome::Table(rows);
    }
    parse_json_fallback(response)
}

/// Stage 1: the separator-driven table state machine.
pub fn parse_table(response: &str) -> Vec<ParsedRow> {
    let mut state = TableState::BeforeSeparator;
    let mut rows = Vec::new();

    for line in response.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }

        if is_separator_row(line) {
            state = TableState::AfterSeparator;
            continue;
        }

        match state {
            TableState::BeforeSeparator => {
                if is_header_line(line) {
                    debug!("Skipping header line: {}", line);
                }
            }
            TableState::AfterSeparator => {
                if !line.contains('|') {
                    continue;
                }
                let cells = split_cells(line);
                if cells.len() >= 4 {
                    rows.push(ParsedRow::new(cells[0], cells[1], cells[2], cells[3]));
                } else {
                    warn!(
                        "Could not parse line: {} ({} columns, need 4)",
                        line,
                        cells.len()
                    );
                }
            }
        }
    }

    rows
}

/// A separator row holds only pipes, dashes, colons and spaces, with at least one dash.
fn is_separator_row(line: &str) -> bool {
    line.contains('-')
        && line
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c.is_whitespace())
}

fn is_header_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    HEADER_TOKENS.iter().any(|token| lower.contains(token))
}

/// Split on `|`, trim each cell, and drop empty cells at either end only.
fn split_cells(line: &str) -> Vec<&str> {
    let cells: Vec<&str> = line.split('|').map(str::trim).collect();
    let start = cells.iter().position(|c| !c.is_empty()).unwrap_or(cells.len());
    let end = cells
        .iter()
        .rposition(|c| !c.is_empty())
        .map_or(start, |i| i + 1);
    cells[start..end].to_vec()
}

// ── Stage 2: JSON fallback ───────────────────────────────────────────────────

static RE_JSON_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]|\{.*\}").unwrap());

/// Stage 2: decode the first greedy `[...]` or `{...}` span of the text.
pub fn parse_json_fallback(response: &str) -> ParseOutcome {
    let Some(span) = RE_JSON_SPAN.find(response) else {
        return ParseOutcome::NoDataFound;
    };

    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Array(items)) => {
            let rows = items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| match item {
                    Value::Object(map) => Some(row_from_object(map)),
                    other => {
                        warn!("Skipping JSON element {}: not an object ({})", i, other);
                        None
                    }
                })
                .collect::<Vec<_>>();
            debug!("Parsed {} rows from JSON array", rows.len());
            ParseOutcome::Json(rows)
        }
        Ok(Value::Object(map)) => ParseOutcome::Json(vec![row_from_object(&map)]),
        Ok(_) => ParseOutcome::NoDataFound,
        Err(e) => {
            warn!("JSON fallback failed to decode: {}", e);
            ParseOutcome::Malformed {
                reason: e.to_string(),
            }
        }
    }
}

const NAME_KEYS: &[&str] = &["ten_hang", "name"];
const QUANTITY_KEYS: &[&str] = &["so_luong", "quantity", "qty"];
const UNIT_PRICE_KEYS: &[&str] = &["don_gia", "unit_price", "unitPrice"];
const TOTAL_KEYS: &[&str] = &["thanh_tien", "total"];

/// Map a JSON object onto a row, accepting domain or canonical key names.
fn row_from_object(map: &Map<String, Value>) -> ParsedRow {
    ParsedRow {
        name: lookup(map, NAME_KEYS).unwrap_or_default(),
        quantity: lookup(map, QUANTITY_KEYS),
        unit_price: lookup(map, UNIT_PRICE_KEYS),
        total: lookup(map, TOTAL_KEYS),
    }
}

fn lookup(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}
