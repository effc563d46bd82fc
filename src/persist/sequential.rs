//! Sequential-image artifacts: the light field as one expanded-lenslet PNG plus
//! a JSON sidecar carrying the same header the `lfb` container embeds.
//!
//! PNG carries grey or RGB, optionally with alpha, at 8 or 16 bits. The stored
//! layout must therefore have 1 or 3 colour channels and at most one weight
//! channel, which becomes the alpha plane.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use std::path::Path;

use crate::config::{OutputPrecision, PngCompression};
use crate::error::LfBatchError;
use crate::kernels::lenslet::{self, TiledImage};
use crate::kernels::QuantizedSamples;
use crate::persist::format::{ArtifactHeader, Provenance, ProvenanceOnly};
use crate::persist::write_replacing;
use crate::types::ChannelLayout;

/// Checks that `layout` can be expressed as a PNG colour type.
pub fn check_layout(layout: ChannelLayout) -> Result<(), LfBatchError> {
    if !matches!(layout.colour, 1 | 3) || layout.weight > 1 {
        return Err(LfBatchError::UnsupportedLayout(format!(
            "a PNG artifact holds 1 or 3 colour channels and at most one alpha channel, got {} + {}",
            layout.colour, layout.weight
        )));
    }
    Ok(())
}

//==================================================================================
// Writing
//==================================================================================

/// Writes the image, then the sidecar. The sidecar is what makes the artifact
/// visible to the completion tracker, so it goes last.
pub fn write(
    image_path: &Path,
    sidecar_path: &Path,
    header: &ArtifactHeader,
    samples: &QuantizedSamples,
    compression: PngCompression,
) -> Result<(), LfBatchError> {
    check_layout(header.channels)?;
    let image = to_dynamic_image(samples, header.channels)?;

    write_replacing(image_path, |out| {
        let encoder = PngEncoder::new_with_quality(
            out,
            compression_type(compression),
            FilterType::Adaptive,
        );
        image.write_with_encoder(encoder)?;
        Ok(())
    })?;

    let sidecar = serde_json::to_vec_pretty(header)?;
    write_replacing(sidecar_path, |out| {
        std::io::Write::write_all(out, &sidecar).map_err(LfBatchError::from)
    })
}

fn compression_type(compression: PngCompression) -> CompressionType {
    match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    }
}

fn to_dynamic_image(
    samples: &QuantizedSamples,
    layout: ChannelLayout,
) -> Result<DynamicImage, LfBatchError> {
    let channels = layout.total();
    let image = match samples {
        QuantizedSamples::U8(a) => {
            let tiled = lenslet::tile(a.view(), channels)?;
            let (w, h) = (tiled.width, tiled.height);
            match channels {
                1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                2 => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                _ => None,
            }
        }
        QuantizedSamples::U16(a) => {
            let tiled = lenslet::tile(a.view(), channels)?;
            let (w, h) = (tiled.width, tiled.height);
            match channels {
                1 => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                2 => ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                3 => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                4 => ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, tiled.data).map(DynamicImage::from),
                _ => None,
            }
        }
    };
    image.ok_or_else(|| {
        LfBatchError::InternalError(format!(
            "tiled buffer does not match a {}-channel image",
            channels
        ))
    })
}

//==================================================================================
// Reading
//==================================================================================

pub fn read_sidecar(sidecar_path: &Path) -> Result<ArtifactHeader, LfBatchError> {
    let text = std::fs::read_to_string(sidecar_path)?;
    serde_json::from_str(&text)
        .map_err(|e| LfBatchError::ArtifactFormat(format!("unreadable sidecar: {}", e)))
}

pub fn peek_provenance(sidecar_path: &Path) -> Result<Provenance, LfBatchError> {
    let text = std::fs::read_to_string(sidecar_path)?;
    let peek: ProvenanceOnly = serde_json::from_str(&text)
        .map_err(|e| LfBatchError::ArtifactFormat(format!("unreadable provenance: {}", e)))?;
    Ok(peek.provenance)
}

/// Loads the image and its sidecar back into quantised samples.
pub fn read(
    image_path: &Path,
    sidecar_path: &Path,
) -> Result<(ArtifactHeader, QuantizedSamples), LfBatchError> {
    let header = read_sidecar(sidecar_path)?;
    check_layout(header.channels)?;
    let image = image::open(image_path)?;

    let [t_len, s_len, v_len, u_len, c_len] = header.shape;
    let expected_width = u_len.checked_mul(s_len);
    let expected_height = v_len.checked_mul(t_len);
    if c_len != header.channels.total()
        || expected_width != Some(image.width() as usize)
        || expected_height != Some(image.height() as usize)
    {
        return Err(LfBatchError::ArtifactFormat(format!(
            "{}x{} image does not match sidecar shape {:?}",
            image.width(),
            image.height(),
            header.shape
        )));
    }

    let (width, height) = (image.width(), image.height());
    let alpha = header.channels.has_weight();
    let samples = match header.sample_type {
        OutputPrecision::Uint8 => {
            let data = match (header.channels.colour, alpha) {
                (1, false) => image.to_luma8().into_raw(),
                (1, true) => image.to_luma_alpha8().into_raw(),
                (_, false) => image.to_rgb8().into_raw(),
                (_, true) => image.to_rgba8().into_raw(),
            };
            let tiled = TiledImage { width, height, channels: c_len, data };
            QuantizedSamples::U8(lenslet::untile(&tiled, t_len, s_len)?)
        }
        OutputPrecision::Uint16 => {
            let data = match (header.channels.colour, alpha) {
                (1, false) => image.to_luma16().into_raw(),
                (1, true) => image.to_luma_alpha16().into_raw(),
                (_, false) => image.to_rgb16().into_raw(),
                (_, true) => image.to_rgba16().into_raw(),
            };
            let tiled = TiledImage { width, height, channels: c_len, data };
            QuantizedSamples::U16(lenslet::untile(&tiled, t_len, s_len)?)
        }
    };
    Ok((header, samples))
}
