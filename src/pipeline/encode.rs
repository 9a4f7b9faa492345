//! Tile encoding: `RgbImage` tile → base64 PNG wrapped in `ImageData`.
//!
//! Hosted VLM APIs take images as base64 attachments rather than tensors.
//! PNG keeps tile pixels lossless so small printed digits survive the trip.

use super::tiles::Tile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::io::Cursor;
use tracing::debug;

/// Encode one tile as a base64 PNG attachment.
///
/// `detail: "high"` keeps hosted models from downscaling the tile to a
/// low-resolution overview, which would undo the tiling.
pub fn encode_tile(tile: &Tile) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    tile.image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded tile {} → {} bytes base64", tile.index, b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Encode every tile in order.
pub fn encode_tiles(tiles: &[Tile]) -> Result<Vec<ImageData>, image::ImageError> {
    tiles.iter().map(encode_tile).collect()
}
