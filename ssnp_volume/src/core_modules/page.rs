// THEORY:
// The `page` module holds the "dumb" data containers that flow out of the
// container decoder: the per-page metadata and the raw, still-typed sample buffer.
// Nothing here knows how to decode a container or how to rescale a sample; it only
// knows how to describe one page.
//
// Key architectural principles:
// 1.  **Typed raw samples**: A raw page is a tagged union over the source element
//     type (`RawSamples`), never an untyped byte buffer that has to be reinterpreted
//     later. The decoder picks the variant once; every consumer matches on it.
// 2.  **Legacy tolerance**: Containers written by old tools omit fields. Tag
//     resolution (`PageTags::resolve`) fills in the well-known defaults (8 bits,
//     one sample per pixel, unsigned integer) and only fails when the dimensions
//     themselves cannot be found.
// 3.  **Informational fields stay informational**: the photometric interpretation,
//     compression and planar configuration are carried for the diagnostic summary
//     and never change numeric behavior.

use crate::error::{Dimensions, IngestError};
use std::fmt;

const DEFAULT_BITS_PER_SAMPLE: u16 = 8;
const DEFAULT_SAMPLES_PER_PIXEL: u16 = 1;

/// How a raw element is encoded, as declared by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleEncoding {
    UnsignedInteger,
    SignedInteger,
    IeeeFloat,
    /// Any declared value outside the three known encodings.
    Unknown(u16),
}

impl SampleEncoding {
    /// Maps a TIFF `SampleFormat` value. A missing or zero tag means unsigned integer.
    pub fn from_tag(value: Option<u16>) -> Self {
        match value {
            None | Some(0) | Some(1) => Self::UnsignedInteger,
            Some(2) => Self::SignedInteger,
            Some(3) => Self::IeeeFloat,
            Some(other) => Self::Unknown(other),
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsignedInteger => write!(f, "unsigned integer"),
            Self::SignedInteger => write!(f, "signed integer"),
            Self::IeeeFloat => write!(f, "IEEE float"),
            Self::Unknown(value) => write!(f, "unknown ({value})"),
        }
    }
}

/// Human-readable name for a TIFF `PhotometricInterpretation` value.
pub fn photometric_name(value: Option<u16>) -> String {
    match value {
        Some(0) => "WhiteIsZero".to_string(),
        Some(1) => "BlackIsZero".to_string(),
        Some(2) => "RGB".to_string(),
        Some(3) => "RGB Palette".to_string(),
        Some(4) => "Transparency Mask".to_string(),
        Some(5) => "CMYK".to_string(),
        Some(6) => "YCbCr".to_string(),
        Some(8) => "CIELab".to_string(),
        Some(other) => format!("unknown ({other})"),
        None => "unknown (missing)".to_string(),
    }
}

/// Everything known about one page besides its samples.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageMetadata {
    pub width: u32,
    pub height: u32,
    /// Bit width of one sample (8, 16, 32 or 64 for supported containers).
    pub bits_per_sample: u16,
    /// Number of interleaved channels per pixel; always at least 1.
    pub samples_per_pixel: u16,
    pub sample_encoding: SampleEncoding,
    pub photometric: Option<u16>,
    pub compression: Option<u16>,
    pub planar_configuration: Option<u16>,
}

impl PageMetadata {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Number of samples a fully decoded page of this shape holds.
    pub fn expected_sample_count(&self) -> usize {
        self.dimensions().pixel_count() * self.samples_per_pixel as usize
    }

    pub fn photometric_name(&self) -> String {
        photometric_name(self.photometric)
    }
}

/// Optional tag values as read from one page descriptor, before defaults apply.
///
/// `width`/`height` are the page's own declared values; `width_tag`/`height_tag`
/// are the raw `ImageWidth`/`ImageLength` descriptor entries used as a fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTags {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub width_tag: Option<u32>,
    pub height_tag: Option<u32>,
    pub bits_per_sample: Option<u16>,
    pub samples_per_pixel: Option<u16>,
    pub sample_format: Option<u16>,
    pub photometric: Option<u16>,
    pub compression: Option<u16>,
    pub planar_configuration: Option<u16>,
}

impl PageTags {
    /// Applies the fallback chain and legacy defaults.
    pub fn resolve(&self) -> Result<PageMetadata, IngestError> {
        let width = self
            .width
            .filter(|w| *w > 0)
            .or(self.width_tag.filter(|w| *w > 0));
        let height = self
            .height
            .filter(|h| *h > 0)
            .or(self.height_tag.filter(|h| *h > 0));
        let (Some(width), Some(height)) = (width, height) else {
            return Err(IngestError::MissingDimensions);
        };

        Ok(PageMetadata {
            width,
            height,
            bits_per_sample: self
                .bits_per_sample
                .filter(|b| *b > 0)
                .unwrap_or(DEFAULT_BITS_PER_SAMPLE),
            samples_per_pixel: self
                .samples_per_pixel
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_SAMPLES_PER_PIXEL),
            sample_encoding: SampleEncoding::from_tag(self.sample_format),
            photometric: self.photometric,
            compression: self.compression,
            planar_configuration: self.planar_configuration,
        })
    }
}

/// A page's decoded samples at their native element type.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl RawSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bit width of the element type.
    pub fn bit_width(&self) -> u16 {
        match self {
            Self::U8(_) | Self::I8(_) => 8,
            Self::U16(_) | Self::I16(_) => 16,
            Self::U32(_) | Self::I32(_) | Self::F32(_) => 32,
            Self::U64(_) | Self::I64(_) | Self::F64(_) => 64,
        }
    }

    /// Converts every element through `f64`, applying `op` before narrowing to `f32`.
    pub fn map_to_f32(self, op: impl Fn(f64) -> f64) -> Vec<f32> {
        fn apply<T: Copy>(values: Vec<T>, widen: impl Fn(T) -> f64, op: impl Fn(f64) -> f64) -> Vec<f32> {
            values.into_iter().map(|v| op(widen(v)) as f32).collect()
        }

        match self {
            Self::U8(v) => apply(v, f64::from, op),
            Self::U16(v) => apply(v, f64::from, op),
            Self::U32(v) => apply(v, f64::from, op),
            Self::U64(v) => apply(v, |x| x as f64, op),
            Self::I8(v) => apply(v, f64::from, op),
            Self::I16(v) => apply(v, f64::from, op),
            Self::I32(v) => apply(v, f64::from, op),
            Self::I64(v) => apply(v, |x| x as f64, op),
            Self::F32(v) => apply(v, f64::from, op),
            Self::F64(v) => apply(v, |x| x, op),
        }
    }
}

/// The raw sample payload of one page, exclusively owned until normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPageBuffer {
    pub samples: RawSamples,
}

impl RawPageBuffer {
    pub fn new(samples: RawSamples) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<RawSamples> for RawPageBuffer {
    fn from(samples: RawSamples) -> Self {
        Self::new(samples)
    }
}
