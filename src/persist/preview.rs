//! Reduced-resolution preview of a record: the central angular view, box
//! downscaled, histogram-equalised, saved as an 8-bit RGB PNG.
//!
//! With a font configured, a caption banner naming the record and its completed
//! stages is drawn under the image. Without one the caption is only logged.

use ab_glyph::FontVec;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use ndarray::Array3;
use std::path::Path;

use crate::config::PreviewOptions;
use crate::error::LfBatchError;
use crate::kernels::histogram;
use crate::types::{LightFieldRecord, StageSet};

const BANNER_COLOR: Rgb<u8> = Rgb([24, 24, 24]);
const TEXT_COLOR: Rgb<u8> = Rgb([235, 235, 235]);

pub fn caption(record: &str, completed: StageSet) -> String {
    format!("{} [{}]", record, completed)
}

/// Renders the preview image without touching the filesystem, except to load
/// the caption font.
pub fn render(
    record: &LightFieldRecord,
    caption_text: &str,
    options: &PreviewOptions,
    hist_eq_threshold: f64,
) -> Result<RgbImage, LfBatchError> {
    let view = downscale(&record.central_view(), options.max_dimension.max(1) as usize);
    let toned = histogram::equalise(&view, hist_eq_threshold);
    let (rows, cols, channels) = toned.dim();

    let font = match &options.font_path {
        Some(path) => Some(load_font(path)?),
        None => {
            log::info!("preview: {}", caption_text);
            None
        }
    };
    let banner = match font {
        Some(_) => (options.font_scale * 1.5).ceil().max(1.0) as u32,
        None => 0,
    };

    let (width, height) = (cols as u32, rows as u32);
    let mut canvas = RgbImage::new(width, height + banner);
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if y >= height {
            continue;
        }
        let (r, c) = (y as usize, x as usize);
        *pixel = if channels >= 3 {
            Rgb([toned[[r, c, 0]], toned[[r, c, 1]], toned[[r, c, 2]]])
        } else {
            let g = toned[[r, c, 0]];
            Rgb([g, g, g])
        };
    }

    if let Some(font) = font.filter(|_| width > 0) {
        let rect = Rect::at(0, height as i32).of_size(width, banner);
        draw_filled_rect_mut(&mut canvas, rect, BANNER_COLOR);
        let pad = (banner as f32 - options.font_scale).max(0.0) / 2.0;
        draw_text_mut(
            &mut canvas,
            TEXT_COLOR,
            2,
            height as i32 + pad as i32,
            options.font_scale,
            &font,
            caption_text,
        );
    }

    Ok(canvas)
}

pub fn write(
    path: &Path,
    record: &LightFieldRecord,
    caption_text: &str,
    options: &PreviewOptions,
    hist_eq_threshold: f64,
) -> Result<(), LfBatchError> {
    let image = render(record, caption_text, options, hist_eq_threshold)?;
    image.save_with_format(path, ImageFormat::Png)?;
    log::debug!("preview written to {}", path.display());
    Ok(())
}

fn load_font(path: &Path) -> Result<FontVec, LfBatchError> {
    let data = std::fs::read(path)?;
    FontVec::try_from_vec(data).map_err(|_| {
        LfBatchError::Config(format!("Failed to parse font file: {}", path.display()))
    })
}

/// Averages `factor x factor` blocks so the longest side is at most `max_dim`.
fn downscale(image: &Array3<f64>, max_dim: usize) -> Array3<f64> {
    let (rows, cols, channels) = image.dim();
    let factor = rows.max(cols).div_ceil(max_dim).max(1);
    if factor == 1 {
        return image.clone();
    }
    let (out_rows, out_cols) = (rows.div_ceil(factor), cols.div_ceil(factor));
    Array3::from_shape_fn((out_rows, out_cols, channels), |(r, c, ch)| {
        let (r0, c0) = (r * factor, c * factor);
        let (r1, c1) = ((r0 + factor).min(rows), (c0 + factor).min(cols));
        let mut sum = 0.0;
        for rr in r0..r1 {
            for cc in c0..c1 {
                sum += image[[rr, cc, ch]];
            }
        }
        sum / ((r1 - r0) * (c1 - c0)) as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelLayout, Precision, Stage};
    use ndarray::Array5;

    fn record(v: usize, u: usize, colour: usize) -> LightFieldRecord {
        let samples = Array5::from_shape_fn((3, 3, v, u, colour + 1), |(_, _, vv, uu, _)| {
            (vv + uu) as f64 / (v + u) as f64
        });
        LightFieldRecord::new(samples, ChannelLayout::new(colour, 1), Precision::Double).unwrap()
    }

    #[test]
    fn test_preview_fits_max_dimension() {
        let options = PreviewOptions {
            max_dimension: 10,
            ..Default::default()
        };
        let img = render(&record(40, 25, 3), "x", &options, 0.01).unwrap();
        assert_eq!((img.width(), img.height()), (7, 10));
    }

    #[test]
    fn test_grey_records_preview_as_grey() {
        let img = render(&record(4, 4, 1), "x", &PreviewOptions::default(), 0.0).unwrap();
        let Rgb([r, g, b]) = *img.get_pixel(3, 3);
        assert!(r == g && g == b);
    }

    #[test]
    fn test_caption_banner_is_drawn_below_the_image() {
        let font = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/fonts/DejaVuSansMono-Oblique.ttf");
        let options = PreviewOptions {
            font_path: Some(font),
            font_scale: 12.0,
            ..Default::default()
        };
        let img = render(&record(8, 40, 3), "IMG_3 [Rectify]", &options, 0.0).unwrap();

        // ceil(12 * 1.5) banner rows under the 8 image rows.
        assert_eq!((img.width(), img.height()), (40, 8 + 18));
        let banner_rows = 8..img.height();
        let last = img.height() - 1;
        assert!((0..img.width()).all(|x| *img.get_pixel(x, last) == BANNER_COLOR));
        let lit = banner_rows
            .flat_map(|y| (0..img.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y).0[0] > BANNER_COLOR.0[0])
            .count();
        assert!(lit > 0, "caption text should be drawn on the banner");
    }

    #[test]
    fn test_unreadable_font_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("broken.ttf");
        std::fs::write(&font, b"not a font").unwrap();
        let options = PreviewOptions {
            font_path: Some(font),
            ..Default::default()
        };
        let res = render(&record(4, 4, 3), "x", &options, 0.0);
        assert!(matches!(res, Err(LfBatchError::Config(_))));
    }

    #[test]
    fn test_caption_names_record_and_stages() {
        let text = caption("IMG_3", StageSet::all());
        assert_eq!(text, "IMG_3 [ColourCorrect, Rectify]");
        assert_eq!(caption("IMG_3", StageSet::empty().with(Stage::Rectify)), "IMG_3 [Rectify]");
    }
}
