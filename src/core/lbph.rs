//! Local binary pattern histograms (radius 1, 8 neighbours, uniform codes).
//!
//! The face is resized to a square, every interior pixel gets an 8-bit LBP
//! code, codes are binned per grid cell into 59 bins (58 uniform patterns plus
//! one shared bin for the rest) and the concatenated histograms are
//! square-rooted and L2-normalised so that cosine distance behaves like the
//! Hellinger distance between histograms.

use crate::common::config::RecognizerConfig;
use crate::common::{FaceGateError, RecognizerBackend, Result};
use crate::core::recognizer::{Embedder, Embedding};
use image::{imageops::FilterType, DynamicImage};

const BINS: usize = 59;
const NON_UNIFORM_BIN: u8 = 58;

// Clockwise from the top-left neighbour
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, -1), (0, -1), (1, -1), (1, 0),
    (1, 1), (0, 1), (-1, 1), (-1, 0),
];

pub struct LbphEmbedder {
    grid_x: u32,
    grid_y: u32,
    face_size: u32,
    uniform: [u8; 256],
}

impl LbphEmbedder {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            grid_x: config.lbph_grid_x,
            grid_y: config.lbph_grid_y,
            face_size: config.lbph_face_size,
            uniform: uniform_table(),
        }
    }

    pub fn dimension(&self) -> usize {
        (self.grid_x * self.grid_y) as usize * BINS
    }
}

impl Embedder for LbphEmbedder {
    fn backend(&self) -> RecognizerBackend {
        RecognizerBackend::Lbph
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding> {
        if face.width() < 3 || face.height() < 3 {
            return Err(FaceGateError::NoFaceDetected);
        }

        let size = self.face_size;
        let gray = face.resize_exact(size, size, FilterType::Triangle).to_luma8();
        let (grid_x, grid_y) = (self.grid_x, self.grid_y);
        let mut histogram = vec![0f32; self.dimension()];

        for y in 1..size - 1 {
            for x in 1..size - 1 {
                let center = gray.get_pixel(x, y)[0];
                let mut code = 0u8;
                for (bit, (dx, dy)) in NEIGHBORS.iter().enumerate() {
                    let neighbor = gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];
                    if neighbor >= center {
                        code |= 1 << bit;
                    }
                }

                let cell_x = (x * grid_x / size).min(grid_x - 1);
                let cell_y = (y * grid_y / size).min(grid_y - 1);
                let cell = (cell_y * grid_x + cell_x) as usize;
                histogram[cell * BINS + self.uniform[code as usize] as usize] += 1.0;
            }
        }

        for value in histogram.iter_mut() {
            *value = value.sqrt();
        }
        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in histogram.iter_mut() {
                *value /= norm;
            }
        }

        Ok(histogram)
    }
}

/// Maps each 8-bit code to its uniform-pattern bin (at most two 0/1
/// transitions around the circle), everything else to the shared last bin.
fn uniform_table() -> [u8; 256] {
    let mut table = [NON_UNIFORM_BIN; 256];
    let mut next = 0u8;
    for code in 0..256u32 {
        let rotated = ((code >> 1) | ((code & 1) << 7)) & 0xFF;
        if (code ^ rotated).count_ones() <= 2 {
            table[code as usize] = next;
            next += 1;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::cosine_distance;
    use image::{GrayImage, Luma};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn embedder() -> LbphEmbedder {
        LbphEmbedder::new(&RecognizerConfig::default())
    }

    fn pattern(seed: u32) -> DynamicImage {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            Luma([((x * seed + y * (seed + 3)) % 251) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn noise(seed: u64) -> DynamicImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let img = GrayImage::from_fn(64, 64, |_, _| Luma([rng.gen::<u8>()]));
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn uniform_table_has_58_patterns() {
        let table = uniform_table();
        let uniform = table.iter().filter(|&&bin| bin != NON_UNIFORM_BIN).count();
        assert_eq!(uniform, 58);
        assert_eq!(table[0], 0);
        assert_eq!(table[0xFF], 57);
    }

    #[test]
    fn embedding_has_grid_times_bins_entries() {
        let embedder = embedder();
        let embedding = embedder.embed(&pattern(7)).unwrap();
        assert_eq!(embedding.len(), 8 * 8 * BINS);
        let norm = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn same_face_is_closer_than_different_face() {
        let embedder = embedder();
        let a = embedder.embed(&pattern(7)).unwrap();
        let a_again = embedder.embed(&pattern(7)).unwrap();
        let b = embedder.embed(&noise(31)).unwrap();

        assert!(cosine_distance(&a, &a_again) < 1e-5);
        assert!(cosine_distance(&a, &b) > 0.01);
    }

    #[test]
    fn tiny_crops_are_rejected() {
        let embedder = embedder();
        assert!(embedder.embed(&DynamicImage::new_luma8(2, 2)).is_err());
    }
}
