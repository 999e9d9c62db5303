// Copyright 2026 The rfbcast Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! 8-bit color quantization for viewers that negotiate a reduced depth.
//!
//! When a viewer sets an 8-bits-per-pixel format, every source pixel must be
//! mapped to a single palette index. The palette here is the 256-entry 3-3-2
//! RGB lattice; the mapping from full 24-bit color to an index is a
//! nearest-neighbor assignment precomputed over a 15-bit (5-5-5) quantized
//! key space, so per-pixel lookup during encoding is a single table read.
//!
//! The map is built once at server start, is immutable afterwards, and is
//! shared read-only across all sessions without synchronization.

/// Number of palette entries.
const PALETTE_SIZE: usize = 256;

/// Size of the 5-5-5 quantized key space the lookup table covers.
const KEY_SPACE: usize = 1 << 15;

/// An immutable 256-entry color palette with a precomputed
/// nearest-neighbor lookup table.
pub struct ColorMap {
    /// Palette entries as (red, green, blue) at full 8-bit precision.
    palette: [(u8, u8, u8); PALETTE_SIZE],
    /// Nearest palette index for every 15-bit quantized RGB key.
    table: Box<[u8]>,
}

impl ColorMap {
    /// Builds the palette and its lookup table.
    ///
    /// Palette entry `i` encodes red in bits 7-5, green in bits 4-2 and
    /// blue in bits 1-0, each level scaled to the full 0-255 range. The
    /// table entry for a key is the palette index with the smallest squared
    /// RGB distance to the key's reconstructed color; ties resolve to the
    /// lowest index, which keeps the mapping deterministic.
    #[must_use]
    pub fn new() -> Self {
        let mut palette = [(0u8, 0u8, 0u8); PALETTE_SIZE];
        for (i, entry) in palette.iter_mut().enumerate() {
            let r = (i >> 5) & 0x07;
            let g = (i >> 2) & 0x07;
            let b = i & 0x03;
            *entry = (
                (r * 255 / 7) as u8,
                (g * 255 / 7) as u8,
                (b * 255 / 3) as u8,
            );
        }

        let mut table = vec![0u8; KEY_SPACE].into_boxed_slice();
        for (key, slot) in table.iter_mut().enumerate() {
            // Reconstruct the key's color by replicating the high bits into
            // the low ones, the usual 5-to-8-bit expansion.
            let r5 = (key >> 10) & 0x1F;
            let g5 = (key >> 5) & 0x1F;
            let b5 = key & 0x1F;
            let r = ((r5 << 3) | (r5 >> 2)) as i32;
            let g = ((g5 << 3) | (g5 >> 2)) as i32;
            let b = ((b5 << 3) | (b5 >> 2)) as i32;

            let mut best = 0usize;
            let mut best_dist = i32::MAX;
            for (i, &(pr, pg, pb)) in palette.iter().enumerate() {
                let dr = r - i32::from(pr);
                let dg = g - i32::from(pg);
                let db = b - i32::from(pb);
                let dist = dr * dr + dg * dg + db * db;
                if dist < best_dist {
                    best_dist = dist;
                    best = i;
                }
            }
            *slot = best as u8;
        }

        Self { palette, table }
    }

    /// Maps a 24-bit RGB triple to its palette index.
    ///
    /// Total over the full domain: every triple resolves to exactly one
    /// index, with no fallback error path.
    #[inline]
    #[must_use]
    pub fn index_of(&self, r: u8, g: u8, b: u8) -> u8 {
        let key = (usize::from(r >> 3) << 10) | (usize::from(g >> 3) << 5) | usize::from(b >> 3);
        self.table[key]
    }

    /// Returns the palette color stored at `index`.
    #[must_use]
    pub fn entry(&self, index: u8) -> (u8, u8, u8) {
        self.palette[usize::from(index)]
    }
}

impl Default for ColorMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_map_to_exact_palette_entries() {
        let map = ColorMap::new();
        assert_eq!(map.index_of(0, 0, 0), 0x00);
        assert_eq!(map.index_of(255, 255, 255), 0xFF);
        assert_eq!(map.index_of(255, 0, 0), 0b111_000_00);
        assert_eq!(map.index_of(0, 255, 0), 0b000_111_00);
        assert_eq!(map.index_of(0, 0, 255), 0b000_000_11);
    }

    #[test]
    fn palette_entries_round_trip_to_their_own_index() {
        let map = ColorMap::new();
        for i in 0..=255u8 {
            let (r, g, b) = map.entry(i);
            assert_eq!(map.index_of(r, g, b), i, "entry {i} ({r},{g},{b})");
        }
    }

    #[test]
    fn mapping_is_deterministic_over_a_domain_sweep() {
        let map_a = ColorMap::new();
        let map_b = ColorMap::new();
        // Stride 7 hits every channel residue class without walking all 16M
        // triples.
        for r in (0..=255u16).step_by(7) {
            for g in (0..=255u16).step_by(7) {
                for b in (0..=255u16).step_by(7) {
                    let (r, g, b) = (r as u8, g as u8, b as u8);
                    let idx = map_a.index_of(r, g, b);
                    assert_eq!(idx, map_a.index_of(r, g, b));
                    assert_eq!(idx, map_b.index_of(r, g, b));
                }
            }
        }
    }

    #[test]
    fn nearest_assignment_is_actually_nearest() {
        let map = ColorMap::new();
        for &(r, g, b) in &[(12u8, 200u8, 77u8), (130, 130, 130), (250, 3, 3)] {
            let idx = map.index_of(r, g, b);
            let dist = |i: u8| {
                let (pr, pg, pb) = map.entry(i);
                let dr = i32::from(r) - i32::from(pr);
                let dg = i32::from(g) - i32::from(pg);
                let db = i32::from(b) - i32::from(pb);
                dr * dr + dg * dg + db * db
            };
            let chosen = dist(idx);
            // The precomputed table works on 5-bit-quantized keys, so the
            // chosen entry may be off by the quantization slack, never more.
            let best = (0..=255u8).map(dist).min().unwrap();
            assert!(
                chosen <= best + 3 * 16 * 16,
                "({r},{g},{b}) chose {chosen}, best {best}"
            );
        }
    }
}
