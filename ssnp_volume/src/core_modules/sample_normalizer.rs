// THEORY:
// The `SampleNormalizer` rescales one page's raw samples into float32. The rule it
// applies depends only on (bits per sample, sample encoding) and is written down
// as an explicit table (`Conversion::for_format`) rather than discovered at run
// time from the buffer type.
//
//   unsigned 8   -> v / 255        [0, 1]
//   unsigned 16  -> v / 65535      [0, 1]
//   signed 8     -> v / 128        [-1, ~1]
//   signed 16    -> v / 32768      [-1, ~1]
//   float 32     -> v              unchanged, the buffer is moved, not copied
//   float 64     -> v as f32       unchanged within float32 precision
//   anything else -> v as f32      pass-through with a warning
//
// Channel topology is not this module's concern: a page with several samples per
// pixel is rescaled as one interleaved run. Picking a channel happens later, in
// the `VolumeAssembler`.

use crate::core_modules::page::{PageMetadata, RawPageBuffer, RawSamples, SampleEncoding};
use crate::error::Dimensions;
use tracing::warn;

/// The per-element transform selected for a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Divide by a fixed full-scale value.
    Scale(f64),
    /// Keep the floating-point value, narrowing to float32 if needed.
    Float,
    /// Unknown or unhandled combination: keep the value as-is.
    PassThrough,
}

impl Conversion {
    pub fn for_format(encoding: SampleEncoding, bits_per_sample: u16) -> Self {
        match (encoding, bits_per_sample) {
            (SampleEncoding::UnsignedInteger, 8) => Self::Scale(255.0),
            (SampleEncoding::UnsignedInteger, 16) => Self::Scale(65535.0),
            (SampleEncoding::SignedInteger, 8) => Self::Scale(128.0),
            (SampleEncoding::SignedInteger, 16) => Self::Scale(32768.0),
            (SampleEncoding::IeeeFloat, 32 | 64) => Self::Float,
            _ => Self::PassThrough,
        }
    }
}

/// One page rescaled to float32, channels still interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    pub dimensions: Dimensions,
    pub samples_per_pixel: u16,
    pub data: Vec<f32>,
}

/// Rescales `raw` according to the conversion table for `metadata`.
pub fn normalize(raw: RawPageBuffer, metadata: &PageMetadata) -> NormalizedPage {
    let conversion = Conversion::for_format(metadata.sample_encoding, metadata.bits_per_sample);
    let data = match (conversion, raw.samples) {
        (Conversion::Float, RawSamples::F32(values)) => values,
        (Conversion::Scale(full_scale), samples) => samples.map_to_f32(|v| v / full_scale),
        (Conversion::Float, samples) => samples.map_to_f32(|v| v),
        (Conversion::PassThrough, samples) => {
            warn!(
                sample_format = %metadata.sample_encoding,
                bits_per_sample = metadata.bits_per_sample,
                "unknown sample format, raw values will not be normalized"
            );
            samples.map_to_f32(|v| v)
        }
    };

    NormalizedPage {
        dimensions: metadata.dimensions(),
        samples_per_pixel: metadata.samples_per_pixel,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::page::PageTags;
    use proptest::prelude::*;

    fn metadata(width: u32, encoding: u16, bits: u16) -> PageMetadata {
        PageTags {
            width: Some(width),
            height: Some(1),
            bits_per_sample: Some(bits),
            sample_format: Some(encoding),
            ..PageTags::default()
        }
        .resolve()
        .unwrap()
    }

    fn run(samples: RawSamples, encoding: u16, bits: u16) -> Vec<f32> {
        let meta = metadata(samples.len() as u32, encoding, bits);
        normalize(RawPageBuffer::new(samples), &meta).data
    }

    #[test]
    fn unsigned_8_bit_maps_to_unit_interval() {
        let out = run(RawSamples::U8(vec![0, 128, 255, 64]), 1, 8);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.502).abs() < 1e-3);
        assert_eq!(out[2], 1.0);
        assert!((out[3] - 0.251).abs() < 1e-3);
    }

    #[test]
    fn unsigned_16_bit_full_scale_is_one() {
        let out = run(RawSamples::U16(vec![0, 65535, 32768]), 1, 16);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
        assert!((out[2] - 0.500_007_6).abs() < 1e-6);
    }

    #[test]
    fn signed_integers_map_to_symmetric_interval() {
        let out = run(RawSamples::I16(vec![-32768, 32767, 0]), 2, 16);
        assert_eq!(out[0], -1.0);
        assert!((out[1] - 0.99997).abs() < 1e-5);
        assert_eq!(out[2], 0.0);

        let out = run(RawSamples::I8(vec![-128, 127, 64]), 2, 8);
        assert_eq!(out[0], -1.0);
        assert!((out[1] - 0.9921875).abs() < 1e-7);
        assert_eq!(out[2], 0.5);
    }

    #[test]
    fn float_32_is_moved_unchanged() {
        let values = vec![-3.5f32, 0.0, 1e6, f32::MIN_POSITIVE];
        let out = run(RawSamples::F32(values.clone()), 3, 32);
        assert_eq!(out, values);
    }

    #[test]
    fn float_64_is_narrowed() {
        let out = run(RawSamples::F64(vec![1.5, -2.25, 1.0e-3]), 3, 64);
        assert_eq!(out, vec![1.5f32, -2.25, 1.0e-3f64 as f32]);
    }

    #[test]
    fn unhandled_combinations_pass_values_through() {
        assert_eq!(Conversion::for_format(SampleEncoding::UnsignedInteger, 32), Conversion::PassThrough);
        assert_eq!(Conversion::for_format(SampleEncoding::SignedInteger, 64), Conversion::PassThrough);
        assert_eq!(Conversion::for_format(SampleEncoding::Unknown(4), 8), Conversion::PassThrough);

        let out = run(RawSamples::U32(vec![0, 70000, 4_000_000]), 1, 32);
        assert_eq!(out, vec![0.0, 70000.0, 4_000_000.0]);

        let out = run(RawSamples::U8(vec![3, 200]), 4, 8);
        assert_eq!(out, vec![3.0, 200.0]);
    }

    #[test]
    fn interleaved_channels_are_all_rescaled() {
        let meta = PageTags {
            width: Some(2),
            height: Some(1),
            samples_per_pixel: Some(3),
            ..PageTags::default()
        }
        .resolve()
        .unwrap();
        let page = normalize(RawPageBuffer::new(RawSamples::U8(vec![255, 0, 51, 0, 255, 102])), &meta);

        assert_eq!(page.samples_per_pixel, 3);
        assert_eq!(page.data.len(), 6);
        assert_eq!(page.data[4], 1.0);
        assert!((page.data[5] - 0.4).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn unsigned_8_bit_matches_division(raw in any::<u8>()) {
            let out = run(RawSamples::U8(vec![raw]), 1, 8);
            prop_assert!((out[0] - raw as f32 / 255.0).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(&out[0]));
        }

        #[test]
        fn signed_16_bit_stays_in_domain(raw in any::<i16>()) {
            let out = run(RawSamples::I16(vec![raw]), 2, 16);
            prop_assert!(out[0] >= -1.0 && out[0] < 1.0);
        }
    }
}
