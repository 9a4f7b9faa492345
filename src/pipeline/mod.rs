//! Pipeline stages for invoice line-item extraction.
//!
//! Each submodule implements exactly one transformation step. Every stage
//! except [`input`] is pure and synchronous; the orchestrator in
//! [`crate::extract`] composes them around the model call.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ grid ──▶ tiles ──▶ tensor ──▶ [model] ──▶ parse ──▶ fields
//! (decode)  (plan)   (crop)    (CHW f32)   (text)     (rows)    (records)
//!                      └──▶ encode (base64 PNG for hosted VLMs)
//! ```
//!
//! 1. [`input`]: resolve a path, URL or folder and decode images to RGB
//! 2. [`grid`]: choose the `cols × rows` grid closest to the aspect ratio
//! 3. [`tiles`]: resize and cut the image into ordered square tiles
//! 4. [`tensor`]: ImageNet-normalise tiles into one `[n, 3, s, s]` batch
//! 5. [`encode`]: PNG + base64 wrap tiles for multimodal chat APIs
//! 6. [`parse`]: recover rows from a pipe table, falling back to JSON
//! 7. [`fields`]: trim, default and filter rows into canonical records

pub mod encode;
pub mod fields;
pub mod grid;
pub mod input;
pub mod parse;
pub mod tensor;
pub mod tiles;
