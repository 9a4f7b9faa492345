//! Tile normalisation: RGB tiles → ImageNet-normalised CHW `f32` tensors.

use super::tiles::Tile;

/// Per-channel ImageNet mean (R, G, B).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel ImageNet standard deviation (R, G, B).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One normalised tile in channel-major layout: `[R0..Rn, G0..Gn, B0..Bn]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileTensor {
    pub index: usize,
    pub size: u32,
    pub data: Vec<f32>,
}

/// The ordered stack of tile tensors handed to the model, shape `[n, 3, s, s]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBatch {
    tile_size: u32,
    tensors: Vec<TileTensor>,
}

impl TileBatch {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// `[batch, channels, height, width]`.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.tile_size as usize;
        [self.tensors.len(), 3, s, s]
    }

    pub fn tensors(&self) -> &[TileTensor] {
        &self.tensors
    }

    /// Contiguous copy of the whole batch in `shape()` order.
    pub fn to_contiguous(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.shape().iter().product());
        for t in &self.tensors {
            out.extend_from_slice(&t.data);
        }
        out
    }
}

/// Normalise a single tile with the fixed ImageNet constants.
pub fn normalize_tile(tile: &Tile) -> TileTensor {
    let (width, height) = tile.image.dimensions();
    let num_pixels = (width * height) as usize;
    let raw = tile.image.as_raw();
    let mut data = vec![0.0f32; num_pixels * 3];

    for i in 0..num_pixels {
        for c in 0..3 {
            let v = raw[3 * i + c] as f32 / 255.0;
            data[c * num_pixels + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    TileTensor {
        index: tile.index,
        size: width,
        data,
    }
}

/// Normalise every tile, preserving order, and stack them into one batch.
pub fn normalize_tiles(tiles: &[Tile], tile_size: u32) -> TileBatch {
    TileBatch {
        tile_size,
        tensors: tiles.iter().map(normalize_tile).collect(),
    }
}
