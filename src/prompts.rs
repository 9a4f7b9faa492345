//! Instructions sent to the vision model alongside the invoice tiles.
//!
//! The parser in [`crate::pipeline::parse`] expects a four-column pipe table
//! (name, quantity, unit price, total). Prompts here ask for exactly that;
//! callers can override via [`crate::config::ExtractionConfig::instruction`].

/// Marker some local VLM chat templates expand into the image token sequence.
pub const IMAGE_PLACEHOLDER: &str = "<image>";

/// Default instruction: extract the item name, quantity, unit price and line
/// total columns of every product on the invoice (Vietnamese, as the reference
/// model was tuned on Vietnamese invoices).
pub const DEFAULT_INSTRUCTION: &str = "<image>\nTrích xuất giá trị của các cột tên hàng, số lượng, đơn giá, thành tiền của các sản phẩm trong hóa đơn.";

/// System prompt for hosted chat models that need the output shape spelled out.
pub const TABLE_SYSTEM_PROMPT: &str = r#"You read photographs of shop invoices and receipts.
The image is split into tiles in reading order (left to right, top to bottom); the last tile may be a low-resolution overview of the whole page.

Output ONLY a Markdown pipe table with exactly these four columns, in this order:
Tên hàng | Số lượng | Đơn giá | Thành tiền

Rules:
- One row per purchased item, in the order printed on the invoice
- Copy names, quantities and prices exactly as printed; do not compute or convert anything
- Put the separator row `---|---|---|---` directly under the header
- Skip subtotal, tax, discount and grand-total lines
- Do not add commentary before or after the table"#;

/// Strip the image placeholder for providers that attach images out of band.
pub fn strip_image_placeholder(instruction: &str) -> &str {
    instruction
        .strip_prefix(IMAGE_PLACEHOLDER)
        .map(str::trim_start)
        .unwrap_or(instruction)
}
