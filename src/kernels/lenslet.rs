//! Expanded-lenslet tiling: flattens a `[t, s, v, u, c]` light field into a 2D
//! image in which every spatial sample `(v, u)` owns a `T x S` block of pixels
//! holding its angular samples.
//!
//! Pixel `(row = v*T + t, col = u*S + s)` holds `LF[t, s, v, u, ..]`.

use ndarray::{Array5, ArrayView5};

use crate::error::LfBatchError;

/// An interleaved, row-major image produced by [`tile`].
#[derive(Debug, Clone, PartialEq)]
pub struct TiledImage<Q> {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub data: Vec<Q>,
}

/// Tiles the first `channels` entries of the channel axis into an image.
pub fn tile<Q: Copy>(
    samples: ArrayView5<'_, Q>,
    channels: usize,
) -> Result<TiledImage<Q>, LfBatchError> {
    let (t_len, s_len, v_len, u_len, c_len) = samples.dim();
    if channels > c_len {
        return Err(LfBatchError::UnsupportedLayout(format!(
            "cannot tile {} channels from a record with {}",
            channels, c_len
        )));
    }
    let width = u_len * s_len;
    let height = v_len * t_len;
    let (width_u32, height_u32) = image_dims(width, height)?;

    let mut data = Vec::with_capacity(width * height * channels);
    for row in 0..height {
        let (v, t) = (row / t_len, row % t_len);
        for col in 0..width {
            let (u, s) = (col / s_len, col % s_len);
            for c in 0..channels {
                data.push(samples[[t, s, v, u, c]]);
            }
        }
    }

    Ok(TiledImage {
        width: width_u32,
        height: height_u32,
        channels,
        data,
    })
}

/// Inverse of [`tile`] for a known angular size `(t_len, s_len)`.
pub fn untile<Q: Copy>(
    image: &TiledImage<Q>,
    t_len: usize,
    s_len: usize,
) -> Result<Array5<Q>, LfBatchError> {
    let (width, height) = (image.width as usize, image.height as usize);
    if t_len == 0 || s_len == 0 || height % t_len != 0 || width % s_len != 0 {
        return Err(LfBatchError::ArtifactFormat(format!(
            "{}x{} image cannot hold {}x{} angular blocks",
            width, height, t_len, s_len
        )));
    }
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(image.channels));
    if expected != Some(image.data.len()) {
        return Err(LfBatchError::ArtifactFormat(format!(
            "image buffer holds {} samples, expected {}x{}x{}",
            image.data.len(),
            width,
            height,
            image.channels
        )));
    }

    let (v_len, u_len) = (height / t_len, width / s_len);
    let channels = image.channels;
    Ok(Array5::from_shape_fn(
        (t_len, s_len, v_len, u_len, channels),
        |(t, s, v, u, c)| {
            let row = v * t_len + t;
            let col = u * s_len + s;
            image.data[(row * width + col) * channels + c]
        },
    ))
}

fn image_dims(width: usize, height: usize) -> Result<(u32, u32), LfBatchError> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(LfBatchError::UnsupportedLayout(format!(
            "tiled image size {}x{} is not representable",
            width, height
        ))),
    }
}
