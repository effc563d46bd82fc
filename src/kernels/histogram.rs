//! Histogram-equalisation tone mapping for previews.
//!
//! Equalisation runs on luminance (the mean of the colour channels) so that hue
//! is preserved: every pixel's channels are scaled by the ratio between its
//! equalised and original luminance. The darkest and brightest `threshold`
//! fractions of pixels are treated as saturated tails and clipped first.

use ndarray::{Array3, Axis};

const BINS: usize = 1024;

/// Tone-maps a `[rows, cols, channels]` image to 8 bits.
pub fn equalise(image: &Array3<f64>, threshold: f64) -> Array3<u8> {
    let (rows, cols, channels) = image.dim();
    if rows == 0 || cols == 0 || channels == 0 {
        return Array3::zeros((rows, cols, channels));
    }

    let luma = image.mean_axis(Axis(2)).unwrap_or_else(|| ndarray::Array2::zeros((rows, cols)));
    let (lo, hi) = tail_limits(luma.iter().copied().collect(), threshold);
    let span = (hi - lo).max(f64::EPSILON);
    let normalise = |x: f64| ((x - lo) / span).clamp(0.0, 1.0);

    let mut histogram = [0usize; BINS];
    for &l in luma.iter() {
        histogram[bin_of(normalise(l))] += 1;
    }
    let total = (rows * cols) as f64;
    let mut cdf = [0f64; BINS];
    let mut running = 0usize;
    for (i, count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running as f64 / total;
    }

    Array3::from_shape_fn((rows, cols, channels), |(r, c, ch)| {
        let l = normalise(luma[[r, c]]);
        let target = cdf[bin_of(l)];
        let gain = if l > 0.0 { target / l } else { 0.0 };
        let value = normalise(image[[r, c, ch]]) * gain;
        (value.clamp(0.0, 1.0) * 255.0).round() as u8
    })
}

/// Values at the `threshold` and `1 - threshold` quantiles.
fn tail_limits(mut values: Vec<f64>, threshold: f64) -> (f64, f64) {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return (0.0, 1.0);
    }
    values.sort_by(f64::total_cmp);
    let last = values.len() - 1;
    let lo_idx = ((last as f64) * threshold).floor() as usize;
    let hi_idx = ((last as f64) * (1.0 - threshold)).ceil() as usize;
    (values[lo_idx.min(last)], values[hi_idx.min(last)])
}

fn bin_of(normalised: f64) -> usize {
    ((normalised * (BINS - 1) as f64).round() as usize).min(BINS - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dark_ramp_is_stretched_to_full_range() {
        // A ramp confined to [0, 0.1] should use the whole 8-bit range after equalising.
        let img = Array3::from_shape_fn((1, 100, 3), |(_, c, _)| c as f64 / 1000.0);
        let out = equalise(&img, 0.0);
        let max = out.iter().copied().max().unwrap();
        assert_eq!(max, 255);
        assert!(out[[0, 10, 0]] < out[[0, 90, 0]]);
    }

    #[test]
    fn test_grey_pixels_stay_grey() {
        let img = Array3::from_shape_fn((4, 4, 3), |(r, c, _)| (r * 4 + c) as f64 / 16.0);
        let out = equalise(&img, 0.01);
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(out[[r, c, 0]], out[[r, c, 1]]);
                assert_eq!(out[[r, c, 1]], out[[r, c, 2]]);
            }
        }
    }

    #[test]
    fn test_empty_and_constant_images_do_not_panic() {
        let empty = Array3::<f64>::zeros((0, 0, 3));
        assert_eq!(equalise(&empty, 0.01).dim(), (0, 0, 3));

        let flat = Array3::from_elem((3, 3, 1), 0.5);
        let out = equalise(&flat, 0.01);
        assert_eq!(out.dim(), (3, 3, 1));
    }
}
