//! Conversion between the floating in-memory light field and the unsigned
//! integer samples that get persisted.
//!
//! Quantisation rounds to nearest and saturates at the domain bounds, so a
//! round trip recovers every in-range value to within half a quantisation step.

use ndarray::{Array5, ArrayView5, Axis, Slice};
use num_traits::{Bounded, NumCast, ToPrimitive, Unsigned, Zero};

use crate::config::{ClipMode, OutputPrecision};
use crate::error::LfBatchError;
use crate::types::record::AXIS_C;
use crate::types::{LightFieldRecord, Precision};

/// An unsigned integer type samples can be quantised into.
pub trait Quantum: Copy + Bounded + NumCast + ToPrimitive + Unsigned + Zero + bytemuck::Pod {
    fn domain_max() -> f64 {
        Self::max_value().to_f64().unwrap_or(1.0)
    }
}

impl Quantum for u8 {}
impl Quantum for u16 {}

/// Divisor applied before quantisation.
///
/// With clipping disabled the record may exceed 1.0; dividing by its maximum
/// keeps highlights instead of saturating them. The divisor is persisted so a
/// reload can restore the original scale.
pub fn normalisation_divisor(record: &LightFieldRecord, clip_mode: ClipMode) -> f64 {
    match clip_mode {
        ClipMode::None => {
            let max = record.max_sample();
            if max.is_finite() && max > 0.0 {
                max
            } else {
                1.0
            }
        }
        ClipMode::Hard | ClipMode::Soft => 1.0,
    }
}

pub fn quantize<Q: Quantum>(samples: ArrayView5<'_, f64>, divisor: f64) -> Array5<Q> {
    let max = Q::domain_max();
    samples.mapv(|x| {
        let scaled = (x / divisor * max).round().clamp(0.0, max);
        <Q as NumCast>::from(scaled).unwrap_or_else(Q::zero)
    })
}

pub fn dequantize<Q: Quantum>(
    samples: ArrayView5<'_, Q>,
    divisor: f64,
    precision: Precision,
) -> Array5<f64> {
    let max = Q::domain_max();
    samples.mapv(|q| precision.coerce(q.to_f64().unwrap_or(0.0) / max * divisor))
}

/// Quantised samples in one of the supported integer precisions.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedSamples {
    U8(Array5<u8>),
    U16(Array5<u16>),
}

impl QuantizedSamples {
    pub fn from_record(
        record: &LightFieldRecord,
        precision: OutputPrecision,
        divisor: f64,
    ) -> Self {
        match precision {
            OutputPrecision::Uint8 => QuantizedSamples::U8(quantize(record.samples().view(), divisor)),
            OutputPrecision::Uint16 => {
                QuantizedSamples::U16(quantize(record.samples().view(), divisor))
            }
        }
    }

    pub fn precision(&self) -> OutputPrecision {
        match self {
            QuantizedSamples::U8(_) => OutputPrecision::Uint8,
            QuantizedSamples::U16(_) => OutputPrecision::Uint16,
        }
    }

    /// `[t, s, v, u, c]`
    pub fn shape(&self) -> [usize; 5] {
        let d = match self {
            QuantizedSamples::U8(a) => a.dim(),
            QuantizedSamples::U16(a) => a.dim(),
        };
        [d.0, d.1, d.2, d.3, d.4]
    }

    /// Keeps only the first `channels` entries of the channel axis.
    pub fn truncate_channels(self, channels: usize) -> Self {
        let keep = Slice::from(0..channels);
        match self {
            QuantizedSamples::U8(a) => {
                QuantizedSamples::U8(a.slice_axis(Axis(AXIS_C), keep).to_owned())
            }
            QuantizedSamples::U16(a) => {
                QuantizedSamples::U16(a.slice_axis(Axis(AXIS_C), keep).to_owned())
            }
        }
    }

    pub fn dequantize(&self, divisor: f64, precision: Precision) -> Array5<f64> {
        match self {
            QuantizedSamples::U8(a) => dequantize(a.view(), divisor, precision),
            QuantizedSamples::U16(a) => dequantize(a.view(), divisor, precision),
        }
    }

    /// Little-endian sample bytes in `[t, s, v, u, c]` row-major order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            QuantizedSamples::U8(a) => a.iter().copied().collect(),
            QuantizedSamples::U16(a) => {
                let le: Vec<u16> = a.iter().map(|v| v.to_le()).collect();
                bytemuck::cast_slice(&le).to_vec()
            }
        }
    }

    /// Byte size of a sample block of `shape`, rejecting shapes whose size
    /// does not fit in memory arithmetic.
    pub fn block_len(shape: [usize; 5], precision: OutputPrecision) -> Result<usize, LfBatchError> {
        shape
            .iter()
            .try_fold(precision.bytes_per_sample(), |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| {
                LfBatchError::ArtifactFormat(format!(
                    "shape {:?} is too large to describe a sample block",
                    shape
                ))
            })
    }

    pub fn from_le_bytes(
        bytes: &[u8],
        shape: [usize; 5],
        precision: OutputPrecision,
    ) -> Result<Self, LfBatchError> {
        let expected = Self::block_len(shape, precision)?;
        if bytes.len() != expected {
            return Err(LfBatchError::ArtifactFormat(format!(
                "sample block holds {} bytes but shape {:?} needs {}",
                bytes.len(),
                shape,
                expected
            )));
        }
        let dim = (shape[0], shape[1], shape[2], shape[3], shape[4]);
        Ok(match precision {
            OutputPrecision::Uint8 => {
                QuantizedSamples::U8(Array5::from_shape_vec(dim, bytes.to_vec())?)
            }
            OutputPrecision::Uint16 => {
                let values: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                QuantizedSamples::U16(Array5::from_shape_vec(dim, values)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelLayout;

    fn record_from(values: Vec<f64>, precision: Precision) -> LightFieldRecord {
        let n = values.len();
        let samples = Array5::from_shape_vec((1, 1, 1, n, 1), values).unwrap();
        LightFieldRecord::new(samples, ChannelLayout::new(1, 0), precision).unwrap()
    }

    #[test]
    fn test_roundtrip_within_one_step_u16() {
        let values: Vec<f64> = (0..=1000).map(|i| i as f64 / 1000.0).collect();
        let record = record_from(values.clone(), Precision::Double);

        let q = QuantizedSamples::from_record(&record, OutputPrecision::Uint16, 1.0);
        let back = q.dequantize(1.0, Precision::Double);

        for (orig, restored) in values.iter().zip(back.iter()) {
            assert!((orig - restored).abs() <= 1.0 / 65535.0, "{} vs {}", orig, restored);
        }
    }

    #[test]
    fn test_roundtrip_within_one_step_u8() {
        let values: Vec<f64> = (0..=300).map(|i| i as f64 / 300.0).collect();
        let record = record_from(values.clone(), Precision::Double);

        let q = QuantizedSamples::from_record(&record, OutputPrecision::Uint8, 1.0);
        let back = q.dequantize(1.0, Precision::Double);

        for (orig, restored) in values.iter().zip(back.iter()) {
            assert!((orig - restored).abs() <= 1.0 / 255.0);
        }
    }

    #[test]
    fn test_out_of_range_values_saturate() {
        let record = record_from(vec![-0.5, 1.5, f64::NAN], Precision::Double);
        match QuantizedSamples::from_record(&record, OutputPrecision::Uint8, 1.0) {
            QuantizedSamples::U8(a) => {
                assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![0, 255, 0])
            }
            other => panic!("unexpected precision {:?}", other.precision()),
        }
    }

    #[test]
    fn test_clip_none_divisor_is_record_maximum() {
        let record = record_from(vec![0.2, 3.5, 1.0], Precision::Double);
        assert_eq!(normalisation_divisor(&record, ClipMode::None), 3.5);
        assert_eq!(normalisation_divisor(&record, ClipMode::Hard), 1.0);
        assert_eq!(normalisation_divisor(&record, ClipMode::Soft), 1.0);

        let dark = record_from(vec![0.0, 0.0], Precision::Double);
        assert_eq!(normalisation_divisor(&dark, ClipMode::None), 1.0);
    }

    #[test]
    fn test_rescaled_roundtrip_reproduces_highlights() {
        let values = vec![0.0, 0.75, 2.0, 3.5];
        let record = record_from(values.clone(), Precision::Double);
        let divisor = normalisation_divisor(&record, ClipMode::None);

        let q = QuantizedSamples::from_record(&record, OutputPrecision::Uint16, divisor);
        let back = q.dequantize(divisor, Precision::Double);

        for (orig, restored) in values.iter().zip(back.iter()) {
            assert!((orig - restored).abs() <= divisor / 65535.0);
        }
    }

    #[test]
    fn test_le_bytes_roundtrip_and_length_check() {
        let record = record_from(vec![0.0, 0.5, 1.0], Precision::Double);
        let q = QuantizedSamples::from_record(&record, OutputPrecision::Uint16, 1.0);
        let bytes = q.to_le_bytes();
        assert_eq!(bytes.len(), 6);
        assert_eq!(&bytes[4..6], &[0xFF, 0xFF]);

        let back =
            QuantizedSamples::from_le_bytes(&bytes, [1, 1, 1, 3, 1], OutputPrecision::Uint16)
                .unwrap();
        assert_eq!(back, q);

        let short = QuantizedSamples::from_le_bytes(&bytes[..5], [1, 1, 1, 3, 1], OutputPrecision::Uint16);
        assert!(matches!(short, Err(LfBatchError::ArtifactFormat(_))));
    }

    #[test]
    fn test_block_len_rejects_overflowing_shapes() {
        assert_eq!(
            QuantizedSamples::block_len([2, 2, 3, 3, 4], OutputPrecision::Uint16).unwrap(),
            288
        );
        let huge = [usize::MAX, 2, 1, 1, 4];
        assert!(matches!(
            QuantizedSamples::block_len(huge, OutputPrecision::Uint8),
            Err(LfBatchError::ArtifactFormat(_))
        ));
        assert!(QuantizedSamples::from_le_bytes(&[0u8; 8], huge, OutputPrecision::Uint8).is_err());
    }

    #[test]
    fn test_truncate_channels_drops_trailing_weight() {
        let samples = Array5::from_shape_vec((1, 1, 1, 1, 4), vec![0.1, 0.2, 0.3, 1.0]).unwrap();
        let record =
            LightFieldRecord::new(samples, ChannelLayout::new(3, 1), Precision::Double).unwrap();
        let q = QuantizedSamples::from_record(&record, OutputPrecision::Uint8, 1.0)
            .truncate_channels(3);
        assert_eq!(q.shape(), [1, 1, 1, 1, 3]);
    }
}
