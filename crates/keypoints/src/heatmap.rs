//! Gaussian heatmap rendering and peak decoding.
//!
//! Targets are rendered per keypoint as an unnormalized Gaussian of spread
//! `sigma` (in heatmap pixels) centered at the ground-truth location, peak
//! value 1.0. Decoding takes the arg-max pixel of a channel, which inverts
//! rendering exactly for visible keypoints.

use crate::types::Keypoint;

/// Render one heatmap channel into `out` (row-major, `height * width`).
///
/// Invisible keypoints leave the channel all zero.
pub fn render_channel(kp: &Keypoint, height: usize, width: usize, sigma: f32, out: &mut [f32]) {
    debug_assert_eq!(out.len(), height * width);
    out.fill(0.0);
    if !kp.visible {
        return;
    }

    let cx = kp.x * (width - 1) as f32;
    let cy = kp.y * (height - 1) as f32;
    let denom = 2.0 * sigma * sigma;

    for row in 0..height {
        let dy = row as f32 - cy;
        for col in 0..width {
            let dx = col as f32 - cx;
            out[row * width + col] = (-(dx * dx + dy * dy) / denom).exp();
        }
    }
}

/// Render all keypoint channels for a sample, KHW layout.
pub fn render_heatmaps(keypoints: &[Keypoint], height: usize, width: usize, sigma: f32) -> Vec<f32> {
    let mut out = vec![0.0; keypoints.len() * height * width];
    for (k, kp) in keypoints.iter().enumerate() {
        let channel = &mut out[k * height * width..(k + 1) * height * width];
        render_channel(kp, height, width, sigma, channel);
    }
    out
}

/// Arg-max pixel of a single channel as (row, col).
///
/// Ties resolve to the first maximum in row-major order; an empty channel
/// decodes to (0, 0).
pub fn decode_peak(channel: &[f32], height: usize, width: usize) -> (usize, usize) {
    debug_assert_eq!(channel.len(), height * width);
    let mut best = f32::NEG_INFINITY;
    let mut best_idx = 0;
    for (i, &v) in channel.iter().enumerate() {
        if v > best {
            best = v;
            best_idx = i;
        }
    }
    (best_idx / width.max(1), best_idx % width.max(1))
}
