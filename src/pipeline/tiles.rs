//! Tiling: cut a resized image into the ordered tiles of a [`TilingPlan`].
//!
//! The model expects tiles in row-major order followed by an optional
//! low-detail thumbnail of the whole page. Positional correspondence matters:
//! the vision encoder learned the layout from that order, so nothing
//! downstream may reorder the output of [`split_into_tiles`].

use super::grid::TilingPlan;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use tracing::debug;

/// Interpolation used for both the grid resize and the thumbnail.
///
/// Catmull-Rom is the bicubic kernel the reference preprocessing uses.
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

/// One square tile with its position in the output order.
#[derive(Debug, Clone)]
pub struct Tile {
    /// 0-based position in the tile sequence.
    pub index: usize,
    /// `tile_size × tile_size` RGB pixels.
    pub image: RgbImage,
    /// `true` for the trailing whole-image thumbnail.
    pub is_thumbnail: bool,
}

/// Resize `image` to the plan's grid and crop it into tiles.
///
/// Tile `k` covers column `k % cols`, row `k / cols`. When the plan asks for
/// a thumbnail and the grid is not a single tile, the original image resized
/// to `tile_size × tile_size` is appended last.
pub fn split_into_tiles(image: &DynamicImage, plan: &TilingPlan) -> Vec<Tile> {
    let s = plan.tile_size;
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, plan.target_width(), plan.target_height(), RESIZE_FILTER);

    let blocks = plan.grid_tiles() as usize;
    let mut tiles = Vec::with_capacity(plan.total_tiles() as usize);

    for k in 0..blocks {
        let col = k as u32 % plan.cols;
        let row = k as u32 / plan.cols;
        let tile = imageops::crop_imm(&resized, col * s, row * s, s, s).to_image();
        tiles.push(Tile {
            index: k,
            image: tile,
            is_thumbnail: false,
        });
    }

    if plan.include_thumbnail && tiles.len() != 1 {
        tiles.push(Tile {
            index: tiles.len(),
            image: imageops::resize(&rgb, s, s, RESIZE_FILTER),
            is_thumbnail: true,
        });
    }

    debug!(
        "Tiled {}x{} image into {} tiles ({}x{} grid, thumbnail={})",
        rgb.width(),
        rgb.height(),
        tiles.len(),
        plan.cols,
        plan.rows,
        plan.include_thumbnail && blocks != 1
    );
    tiles
}
