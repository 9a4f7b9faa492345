//! Field normalisation: parsed rows → canonical line-item records.

use super::parse::ParsedRow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical invoice line item. Every field is a trimmed string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub name: String,
    pub quantity: String,
    pub unit_price: String,
    pub total: String,
}

impl From<NormalizedRecord> for ParsedRow {
    fn from(r: NormalizedRecord) -> Self {
        ParsedRow::new(r.name, r.quantity, r.unit_price, r.total)
    }
}

/// Trim one row; `None` if the name is empty after trimming.
pub fn normalize_row(row: &ParsedRow) -> Option<NormalizedRecord> {
    let name = row.name.trim();
    if name.is_empty() {
        return None;
    }
    Some(NormalizedRecord {
        name: name.to_string(),
        quantity: or_zero(row.quantity.as_deref()),
        unit_price: or_zero(row.unit_price.as_deref()),
        total: or_zero(row.total.as_deref()),
    })
}

/// Normalise rows in order, dropping the ones without a name.
pub fn normalize_rows(rows: &[ParsedRow]) -> Vec<NormalizedRecord> {
    rows.iter().filter_map(normalize_row).collect()
}

fn or_zero(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "0".to_string(),
    }
}

// ── Numeric canonicalisation ─────────────────────────────────────────────────

static RE_CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[đĐ₫VNDvnd,.\s]+").unwrap());
static RE_NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Strip currency markers and grouping separators, keeping digits only.
///
/// `"10.000đ"` → `"10000"`, `"1,234 VND"` → `"1234"`, `""` → `"0"`.
/// Decimal points are treated as grouping separators, so `"1.5"` becomes `"15"`.
pub fn clean_numeric(value: &str) -> String {
    if value.is_empty() {
        return "0".to_string();
    }
    let stripped = RE_CURRENCY.replace_all(value, "");
    let digits = RE_NON_DIGIT.replace_all(&stripped, "");
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits.into_owned()
    }
}

/// Apply [`clean_numeric`] to the three numeric fields of a record.
pub fn canonicalize_numbers(record: NormalizedRecord) -> NormalizedRecord {
    NormalizedRecord {
        quantity: clean_numeric(&record.quantity),
        unit_price: clean_numeric(&record.unit_price),
        total: clean_numeric(&record.total),
        name: record.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, q: Option<&str>, p: Option<&str>, t: Option<&str>) -> ParsedRow {
        ParsedRow {
            name: name.into(),
            quantity: q.map(Into::into),
            unit_price: p.map(Into::into),
            total: t.map(Into::into),
        }
    }

    #[test]
    fn trims_every_field() {
        let out = normalize_rows(&[ParsedRow::new("  Rice ", " 2", "20000 ", " 40000 ")]);
        assert_eq!(
            out,
            vec![NormalizedRecord {
                name: "Rice".into(),
                quantity: "2".into(),
                unit_price: "20000".into(),
                total: "40000".into(),
            }]
        );
    }

    #[test]
    fn missing_or_blank_numbers_default_to_zero() {
        let out = normalize_rows(&[row("Beer", None, Some("  "), Some("45000"))]);
        assert_eq!(out[0].quantity, "0");
        assert_eq!(out[0].unit_price, "0");
        assert_eq!(out[0].total, "45000");
    }

    #[test]
    fn drops_rows_without_name_and_keeps_order() {
        let input = vec![
            ParsedRow::new("A", "1", "1", "1"),
            ParsedRow::new("   ", "9", "9", "9"),
            row("", None, None, None),
            ParsedRow::new("B", "2", "2", "4"),
        ];
        let out = normalize_rows(&input);
        assert!(out.len() <= input.len());
        let names: Vec<&str> = out.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn normalisation_is_idempotent() {
        let first = normalize_rows(&[
            ParsedRow::new(" Tea ", "", " 7 ", "21"),
            row("Milk", None, None, None),
        ]);
        let again: Vec<ParsedRow> = first.iter().cloned().map(ParsedRow::from).collect();
        assert_eq!(normalize_rows(&again), first);
    }

    #[test]
    fn clean_numeric_examples() {
        assert_eq!(clean_numeric("10.000đ"), "10000");
        assert_eq!(clean_numeric(""), "0");
        assert_eq!(clean_numeric("1,234 VND"), "1234");
        assert_eq!(clean_numeric("35.000 ₫"), "35000");
        assert_eq!(clean_numeric("n/a"), "0");
    }

    #[test]
    fn canonicalize_leaves_name_alone() {
        let r = canonicalize_numbers(NormalizedRecord {
            name: "Đường 1kg".into(),
            quantity: "2 gói".into(),
            unit_price: "25.000đ".into(),
            total: "50,000 VND".into(),
        });
        assert_eq!(r.name, "Đường 1kg");
        assert_eq!(r.quantity, "2");
        assert_eq!(r.unit_price, "25000");
        assert_eq!(r.total, "50000");
    }
}
