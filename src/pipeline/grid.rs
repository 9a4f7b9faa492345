//! Grid selection: pick the rows×cols tiling that best fits an image.
//!
//! The vision encoder only accepts square `tile_size × tile_size` inputs, so a
//! photograph is resized to a whole number of tiles in each direction. Among
//! every grid whose tile count lies in `[min_tiles, max_tiles]` we choose the
//! one whose aspect ratio `cols / rows` is closest to the image's `w / h`,
//! which keeps the resize distortion (and thus the glyph deformation the model
//! sees) as small as the tile budget allows.

use crate::error::InvoiceOcrError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A chosen tiling grid for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilingPlan {
    /// Number of tile rows (vertical subdivisions).
    pub rows: u32,
    /// Number of tile columns (horizontal subdivisions).
    pub cols: u32,
    /// Edge length of every square tile in pixels.
    pub tile_size: u32,
    /// Append a whole-image thumbnail tile after the grid tiles.
    pub include_thumbnail: bool,
}

impl TilingPlan {
    /// Number of grid tiles, excluding any thumbnail.
    pub fn grid_tiles(&self) -> u32 {
        self.rows * self.cols
    }

    /// Number of tiles the tiler will emit for this plan.
    pub fn total_tiles(&self) -> u32 {
        let grid = self.grid_tiles();
        if self.include_thumbnail && grid != 1 {
            grid + 1
        } else {
            grid
        }
    }

    /// Width of the resized image the grid is cut from.
    pub fn target_width(&self) -> u32 {
        self.tile_size * self.cols
    }

    /// Height of the resized image the grid is cut from.
    pub fn target_height(&self) -> u32 {
        self.tile_size * self.rows
    }
}

/// Validate tiling inputs before any work is done.
pub fn validate_bounds(
    width: u32,
    height: u32,
    tile_size: u32,
    min_tiles: u32,
    max_tiles: u32,
) -> Result<(), InvoiceOcrError> {
    if width == 0 || height == 0 {
        return Err(InvoiceOcrError::InvalidDimensions(format!(
            "image must be at least 1x1, got {width}x{height}"
        )));
    }
    if tile_size == 0 {
        return Err(InvoiceOcrError::InvalidDimensions(
            "tile size must be > 0".into(),
        ));
    }
    if min_tiles == 0 || min_tiles > max_tiles {
        return Err(InvoiceOcrError::InvalidDimensions(format!(
            "tile bounds must satisfy 1 <= min <= max, got min={min_tiles} max={max_tiles}"
        )));
    }
    Ok(())
}

/// Choose `(cols, rows)` whose ratio is closest to `width / height`.
///
/// Candidates are visited in the order of [`candidate_grids`]. On an exact
/// tie the later candidate wins only when the image area exceeds half the
/// candidate grid's pixel area (`w*h > 0.5 * s² * cols * rows`).
pub fn select_grid(
    width: u32,
    height: u32,
    tile_size: u32,
    min_tiles: u32,
    max_tiles: u32,
) -> Result<(u32, u32), InvoiceOcrError> {
    validate_bounds(width, height, tile_size, min_tiles, max_tiles)?;

    let aspect = width as f64 / height as f64;
    let area = width as f64 * height as f64;
    let tile_area = tile_size as f64 * tile_size as f64;

    let mut best = (1u32, 1u32);
    let mut best_diff = f64::INFINITY;

    for (cols, rows) in candidate_grids(min_tiles, max_tiles) {
        let diff = (aspect - cols as f64 / rows as f64).abs();
        if diff < best_diff {
            best_diff = diff;
            best = (cols, rows);
        } else if diff == best_diff && area > 0.5 * tile_area * (cols * rows) as f64 {
            best = (cols, rows);
        }
    }

    debug!(
        "Grid for {}x{} (tile {}): {}x{} cols×rows",
        width, height, tile_size, best.0, best.1
    );
    Ok(best)
}

/// Build the full plan for an image in one call.
pub fn plan_for(
    width: u32,
    height: u32,
    tile_size: u32,
    min_tiles: u32,
    max_tiles: u32,
    include_thumbnail: bool,
) -> Result<TilingPlan, InvoiceOcrError> {
    let (cols, rows) = select_grid(width, height, tile_size, min_tiles, max_tiles)?;
    Ok(TilingPlan {
        rows,
        cols,
        tile_size,
        include_thumbnail,
    })
}

/// Every `(cols, rows)` with `min <= cols*rows <= max`, in visit order.
///
/// Grids are collected into a [`GridTable`] and then stably sorted by tile
/// count, so grids sharing a tile count keep the table's slot order. Tie
/// outcomes in [`select_grid`] depend on that order.
fn candidate_grids(min_tiles: u32, max_tiles: u32) -> Vec<(u32, u32)> {
    let mut table = GridTable::new();
    for n in min_tiles..=max_tiles {
        for cols in 1..=n {
            for rows in 1..=n {
                if (min_tiles..=max_tiles).contains(&(cols * rows)) {
                    table.insert((cols, rows));
                }
            }
        }
    }
    let mut grids = table.into_grids();
    grids.sort_by_key(|&(c, r)| c * r);
    grids
}

// ── Grid table ───────────────────────────────────────────────────────────────

const PRIME_1: u64 = 11_400_714_785_074_694_791;
const PRIME_2: u64 = 14_029_467_366_897_019_727;
const PRIME_5: u64 = 2_870_177_450_012_600_261;
const LINEAR_PROBES: usize = 9;
const PERTURB_SHIFT: u32 = 5;
const MIN_SLOTS: usize = 8;

/// xxHash-style hash of a `(cols, rows)` pair.
fn grid_hash((cols, rows): (u32, u32)) -> u64 {
    let mut acc = PRIME_5;
    for lane in [cols as u64, rows as u64] {
        acc = acc.wrapping_add(lane.wrapping_mul(PRIME_2));
        acc = acc.rotate_left(31);
        acc = acc.wrapping_mul(PRIME_1);
    }
    acc = acc.wrapping_add(2 ^ (PRIME_5 ^ 3_527_539));
    if acc == u64::MAX {
        1_546_275_796
    } else {
        acc
    }
}

type Slot = Option<(u64, (u32, u32))>;

/// Open-addressing set of grids whose slot order fixes the visit order.
///
/// Probing scans up to [`LINEAR_PROBES`] neighbours, then jumps with a
/// perturbed `5i + 1` step. The table grows 4× once it is 60% full.
struct GridTable {
    slots: Vec<Slot>,
    used: usize,
}

impl GridTable {
    fn new() -> Self {
        Self {
            slots: vec![None; MIN_SLOTS],
            used: 0,
        }
    }

    fn insert(&mut self, grid: (u32, u32)) {
        let hash = grid_hash(grid);
        let (slot, present) = find_slot(&self.slots, hash, grid);
        if present {
            return;
        }
        self.slots[slot] = Some((hash, grid));
        self.used += 1;
        let mask = self.slots.len() - 1;
        if self.used * 5 >= mask * 3 {
            self.grow();
        }
    }

    fn grow(&mut self) {
        let mut size = MIN_SLOTS;
        while size <= self.used * 4 {
            size <<= 1;
        }
        let old = std::mem::replace(&mut self.slots, vec![None; size]);
        for (hash, grid) in old.into_iter().flatten() {
            let (slot, _) = find_slot(&self.slots, hash, grid);
            self.slots[slot] = Some((hash, grid));
        }
    }

    fn into_grids(self) -> Vec<(u32, u32)> {
        self.slots.into_iter().flatten().map(|(_, g)| g).collect()
    }
}

/// Slot holding `grid`, or the first free slot on its probe path.
fn find_slot(slots: &[Slot], hash: u64, grid: (u32, u32)) -> (usize, bool) {
    let mask = slots.len() - 1;
    let mut i = (hash as usize) & mask;
    let mut perturb = hash;
    loop {
        let probes = if i + LINEAR_PROBES <= mask {
            LINEAR_PROBES
        } else {
            0
        };
        for j in i..=i + probes {
            match slots[j] {
                None => return (j, false),
                Some((h, g)) if h == hash && g == grid => return (j, true),
                Some(_) => {}
            }
        }
        perturb >>= PERTURB_SHIFT;
        i = i
            .wrapping_mul(5)
            .wrapping_add(1)
            .wrapping_add(perturb as usize)
            & mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_respect_bounds_and_order() {
        let grids = candidate_grids(2, 4);
        assert!(grids.iter().all(|(c, r)| (2..=4).contains(&(c * r))));
        assert_eq!(grids.first(), Some(&(1, 2)));
        assert!(grids.contains(&(2, 2)));
        assert!(grids.contains(&(4, 1)));
        let products: Vec<u32> = grids.iter().map(|(c, r)| c * r).collect();
        let mut sorted = products.clone();
        sorted.sort_unstable();
        assert_eq!(products, sorted);
    }

    #[test]
    fn candidates_follow_table_order_within_tile_count() {
        assert_eq!(
            candidate_grids(1, 6),
            vec![
                (1, 1),
                (1, 2),
                (2, 1),
                (3, 1),
                (1, 3),
                (4, 1),
                (1, 4),
                (2, 2),
                (1, 5),
                (5, 1),
                (6, 1),
                (2, 3),
                (1, 6),
                (3, 2),
            ]
        );
        // A larger table reorders the four-tile grids.
        let grids = candidate_grids(1, 8);
        assert_eq!(&grids[5..8], &[(2, 2), (4, 1), (1, 4)]);
        assert_eq!(candidate_grids(4, 4), vec![(4, 1), (1, 4), (2, 2)]);
    }

    #[test]
    fn tie_between_equal_tile_counts_uses_table_order() {
        // 4x1 and 2x2 are both 1.5 away from 2.5; 2x2 is visited last.
        assert_eq!(select_grid(2500, 1000, 448, 4, 4).unwrap(), (2, 2));
    }

    #[test]
    fn candidate_table_holds_every_grid_once() {
        for max in 1..=40 {
            let grids = candidate_grids(1, max);
            let expected: usize = (1..=max).map(|c| (max / c) as usize).sum();
            assert_eq!(grids.len(), expected, "max={max}");
            let mut dedup = grids.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), grids.len());
        }
    }

    #[test]
    fn square_image_stays_single_tile() {
        assert_eq!(select_grid(448, 448, 448, 1, 3).unwrap(), (1, 1));
    }

    #[test]
    fn wide_image_prefers_more_columns() {
        assert_eq!(select_grid(1344, 448, 448, 1, 3).unwrap(), (3, 1));
        assert_eq!(select_grid(900, 450, 448, 1, 3).unwrap(), (2, 1));
    }

    #[test]
    fn tall_receipt_prefers_more_rows() {
        assert_eq!(select_grid(400, 1200, 448, 1, 3).unwrap(), (1, 3));
    }

    #[test]
    fn tie_breaks_toward_larger_grid_for_large_images() {
        // 2x2 ties exactly with 1x1 for a square image; a large image area
        // exceeds half of the 2x2 pixel area, so the denser grid wins.
        assert_eq!(select_grid(2000, 2000, 448, 1, 4).unwrap(), (2, 2));
    }

    #[test]
    fn tie_keeps_smaller_grid_for_small_images() {
        assert_eq!(select_grid(300, 300, 448, 1, 4).unwrap(), (1, 1));
    }

    #[test]
    fn min_tiles_excludes_single_tile() {
        // 1x1 is out of bounds; 2x2 is the first exact ratio match.
        assert_eq!(select_grid(448, 448, 448, 2, 6).unwrap(), (2, 2));
    }

    #[test]
    fn selection_is_minimal_and_in_bounds() {
        let cases = [(1000, 700, 448, 1, 6), (333, 999, 224, 2, 9), (50, 7, 16, 1, 12)];
        for (w, h, s, lo, hi) in cases {
            let (c, r) = select_grid(w, h, s, lo, hi).unwrap();
            assert!((lo..=hi).contains(&(c * r)));
            let aspect = w as f64 / h as f64;
            let chosen = (aspect - c as f64 / r as f64).abs();
            for (cc, rr) in candidate_grids(lo, hi) {
                assert!(chosen <= (aspect - cc as f64 / rr as f64).abs());
            }
            assert_eq!(select_grid(w, h, s, lo, hi).unwrap(), (c, r));
        }
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = select_grid(100, 100, 448, 5, 2).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::InvalidDimensions(_)));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(select_grid(0, 10, 448, 1, 3).is_err());
        assert!(select_grid(10, 10, 0, 1, 3).is_err());
        assert!(select_grid(10, 10, 448, 0, 3).is_err());
    }

    #[test]
    fn plan_counts_thumbnail_only_for_multi_tile_grids() {
        let single = plan_for(448, 448, 448, 1, 3, true).unwrap();
        assert_eq!(single.total_tiles(), 1);
        let wide = plan_for(1344, 448, 448, 1, 3, true).unwrap();
        assert_eq!(wide.grid_tiles(), 3);
        assert_eq!(wide.total_tiles(), 4);
        assert_eq!(wide.target_width(), 1344);
        assert_eq!(wide.target_height(), 448);
    }
}
