//! CPU-side image plane helpers: tiling, colorization, overlay, resize.
//!
//! Mirrors the usual visualization-grid conventions: tiles are laid out
//! `nrow` per row with constant padding between and around them.

/// A planar (CHW) float image, 1 or 3 channels, values nominally in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarImage {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl PlanarImage {
    /// Allocate a constant-valued image.
    pub fn filled(channels: usize, height: usize, width: usize, value: f32) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![value; channels * height * width],
        }
    }

    /// Wrap an existing CHW buffer.
    pub fn from_data(channels: usize, height: usize, width: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), channels * height * width);
        Self {
            channels,
            height,
            width,
            data,
        }
    }

    pub fn get(&self, c: usize, row: usize, col: usize) -> f32 {
        self.data[(c * self.height + row) * self.width + col]
    }

    pub fn set(&mut self, c: usize, row: usize, col: usize, value: f32) {
        self.data[(c * self.height + row) * self.width + col] = value;
    }

    /// Convert to an 8-bit RGB image, clamping to [0, 1]. Single-channel
    /// images replicate into gray.
    pub fn to_rgb8(&self) -> image::RgbImage {
        let mut out = image::RgbImage::new(self.width as u32, self.height as u32);
        for row in 0..self.height {
            for col in 0..self.width {
                let px = |c: usize| {
                    let v = self.get(c.min(self.channels - 1), row, col);
                    (v.clamp(0.0, 1.0) * 255.0).round() as u8
                };
                out.put_pixel(col as u32, row as u32, image::Rgb([px(0), px(1), px(2)]));
            }
        }
        out
    }
}

/// Tile images into a grid, `nrow` tiles per grid row, `padding` pixels of
/// `pad_value` between and around tiles. All inputs must share shape.
pub fn make_grid(images: &[PlanarImage], nrow: usize, padding: usize, pad_value: f32) -> PlanarImage {
    assert!(!images.is_empty(), "cannot grid zero images");
    let nrow = nrow.max(1);
    let (channels, h, w) = (images[0].channels, images[0].height, images[0].width);
    let cols = nrow.min(images.len());
    let rows = images.len().div_ceil(nrow);

    let grid_h = rows * h + (rows + 1) * padding;
    let grid_w = cols * w + (cols + 1) * padding;
    let mut grid = PlanarImage::filled(channels, grid_h, grid_w, pad_value);

    for (i, img) in images.iter().enumerate() {
        debug_assert_eq!((img.channels, img.height, img.width), (channels, h, w));
        let tile_row = i / nrow;
        let tile_col = i % nrow;
        let top = padding + tile_row * (h + padding);
        let left = padding + tile_col * (w + padding);
        for c in 0..channels {
            for row in 0..h {
                for col in 0..w {
                    grid.set(c, top + row, left + col, img.get(c, row, col));
                }
            }
        }
    }
    grid
}

/// Map a single-channel map to RGB with a blue-to-red ramp: low values cold,
/// high values hot. Input is clamped to [0, 1].
pub fn colorize(map: &PlanarImage) -> PlanarImage {
    debug_assert_eq!(map.channels, 1);
    let mut out = PlanarImage::filled(3, map.height, map.width, 0.0);
    for row in 0..map.height {
        for col in 0..map.width {
            let v = map.get(0, row, col).clamp(0.0, 1.0);
            let (r, g, b) = if v < 0.5 {
                (0.0, 2.0 * v, 1.0 - 2.0 * v)
            } else {
                (2.0 * (v - 0.5), 1.0 - 2.0 * (v - 0.5), 0.0)
            };
            out.set(0, row, col, r);
            out.set(1, row, col, g);
            out.set(2, row, col, b);
        }
    }
    out
}

/// Pixel-wise sum of two same-shape images, clamped to [0, 1]. Single-channel
/// `over` broadcasts across an RGB `base`.
pub fn overlay(base: &PlanarImage, over: &PlanarImage) -> PlanarImage {
    debug_assert_eq!((base.height, base.width), (over.height, over.width));
    let mut out = base.clone();
    for c in 0..base.channels {
        let oc = c.min(over.channels - 1);
        for row in 0..base.height {
            for col in 0..base.width {
                let v = (base.get(c, row, col) + over.get(oc, row, col)).clamp(0.0, 1.0);
                out.set(c, row, col, v);
            }
        }
    }
    out
}

/// Nearest-neighbor resize to (height, width).
pub fn resize_nearest(img: &PlanarImage, height: usize, width: usize) -> PlanarImage {
    let mut out = PlanarImage::filled(img.channels, height, width, 0.0);
    for c in 0..img.channels {
        for row in 0..height {
            let src_row = row * img.height / height.max(1);
            for col in 0..width {
                let src_col = col * img.width / width.max(1);
                out.set(c, row, col, img.get(c, src_row, src_col));
            }
        }
    }
    out
}
