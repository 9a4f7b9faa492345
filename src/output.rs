//! Result types returned by the extraction API.
//!
//! Field names follow the JSON the invoice service has always returned
//! (`filename`, `raw_text`, `products`, `folder_path`, `summary`,
//! `results`), so existing consumers keep working.

use crate::error::ItemError;
use crate::pipeline::fields::NormalizedRecord;
use crate::pipeline::parse::ParseStatus;
use serde::{Deserialize, Serialize};

/// Result of extracting one invoice image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// File name of the image (no directory).
    pub filename: String,
    /// Unmodified model output.
    pub raw_text: String,
    /// Canonical line items in the order the model listed them.
    #[serde(rename = "products")]
    pub records: Vec<NormalizedRecord>,
    /// Which parser stage produced the records.
    pub parse_status: ParseStatus,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Render the records as a four-column Markdown pipe table.
    pub fn to_markdown_table(&self) -> String {
        let mut out = String::from("| Tên hàng | Số lượng | Đơn giá | Thành tiền |\n");
        out.push_str("|---|---|---|---|\n");
        for r in &self.records {
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                escape_pipe(&r.name),
                escape_pipe(&r.quantity),
                escape_pipe(&r.unit_price),
                escape_pipe(&r.total)
            ));
        }
        out
    }
}

fn escape_pipe(s: &str) -> String {
    s.replace('|', "\\|")
}

/// Timing and sizing for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Decoded image width in pixels.
    pub width: u32,
    /// Decoded image height in pixels.
    pub height: u32,
    /// Chosen grid columns.
    pub cols: u32,
    /// Chosen grid rows.
    pub rows: u32,
    /// Tiles sent to the model, thumbnail included.
    pub tile_count: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Decode + tiling + normalisation.
    pub preprocess_ms: u64,
    /// Model call, including any adapter retries.
    pub inference_ms: u64,
    pub total_ms: u64,
}

/// Outcome of one image inside a folder batch.
///
/// Exactly one of `output` and `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// 0-based position in filename order.
    pub index: usize,
    pub filename: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ExtractionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ItemError>,
}

impl ItemResult {
    pub fn ok(index: usize, output: ExtractionOutput) -> Self {
        Self {
            index,
            filename: output.filename.clone(),
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(index: usize, filename: impl Into<String>, error: ItemError) -> Self {
        Self {
            index,
            filename: filename.into(),
            success: false,
            output: None,
            error: Some(error),
        }
    }
}

/// Per-batch counts. Invariant: `successful + failed == total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[ItemResult]) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        }
    }
}

/// Result of extracting every image in a folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub folder_path: String,
    pub summary: BatchSummary,
    /// One entry per image, in filename order.
    pub results: Vec<ItemResult>,
}

impl BatchOutput {
    pub fn new(folder_path: impl Into<String>, results: Vec<ItemResult>) -> Self {
        Self {
            folder_path: folder_path.into(),
            summary: BatchSummary::from_results(&results),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(name: &str) -> ExtractionOutput {
        ExtractionOutput {
            filename: name.into(),
            raw_text: "raw".into(),
            records: vec![NormalizedRecord {
                name: "Bia | lon".into(),
                quantity: "2".into(),
                unit_price: "15000".into(),
                total: "30000".into(),
            }],
            parse_status: ParseStatus::Table,
            stats: ExtractionStats::default(),
        }
    }

    #[test]
    fn records_serialise_as_products() {
        let json = serde_json::to_value(output("a.jpg")).unwrap();
        assert_eq!(json["products"][0]["name"], "Bia | lon");
        assert_eq!(json["parse_status"]["status"], "table");
        assert!(json.get("records").is_none());
    }

    #[test]
    fn summary_counts_add_up() {
        let results = vec![
            ItemResult::ok(0, output("a.jpg")),
            ItemResult::failed(
                1,
                "b.jpg",
                ItemError::Decode {
                    file: "b.jpg".into(),
                    detail: "eof".into(),
                },
            ),
            ItemResult::ok(2, output("c.jpg")),
        ];
        let batch = BatchOutput::new("/tmp/in", results);
        assert_eq!(
            batch.summary,
            BatchSummary {
                total: 3,
                successful: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn failed_item_omits_output() {
        let item = ItemResult::failed(
            0,
            "x.png",
            ItemError::Other {
                file: "x.png".into(),
                detail: "io".into(),
            },
        );
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("output").is_none());
        assert_eq!(json["error"]["kind"], "other");
    }

    #[test]
    fn markdown_table_escapes_pipes() {
        let table = output("a.jpg").to_markdown_table();
        assert!(table.contains("Bia \\| lon"));
        assert_eq!(table.lines().count(), 3);
    }
}
