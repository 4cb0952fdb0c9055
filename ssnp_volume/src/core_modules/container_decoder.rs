// THEORY:
// The `ContainerDecoder` is the entry point of the ingestion layer. It turns the
// bytes of a multi-page raster container into an ordered list of typed raw pages
// plus their metadata, and it reports the first page's size as the nominal size of
// the volume that will be assembled from them.
//
// Key architectural principles:
// 1.  **Format detection by content**: The container kind is sniffed from its magic
//     bytes, not from a file name. TIFF (classic and BigTIFF) goes through the
//     `tiff` crate so that every page and every sample encoding is reachable; any
//     other raster format the `image` crate recognizes is read as a one-page
//     container.
// 2.  **Independent pages**: Each page is decoded on its own and a failure names
//     the page that failed. The decoder does NOT compare page sizes; that check
//     belongs to the `VolumeAssembler`, which only needs the per-page metadata
//     exposed here.
// 3.  **Diagnostics, not behavior**: The metadata summary of the first page is
//     logged once per container and has no effect on decoding. This includes the
//     photometric interpretation: the `tiff` crate flips WhiteIsZero grayscale
//     samples, so that flip is undone here and samples reach the normalizer as
//     stored.
// 4.  **Degrade, don't fail**: A page whose sample layout the `tiff` crate refuses
//     (void sample format, 16-bit floats, unusual channel layouts) is read
//     straight from its uncompressed strips as unsigned words of its declared bit
//     width. The normalizer then passes those values through with a warning.

use crate::core_modules::page::{PageMetadata, PageTags, RawPageBuffer, RawSamples};
use crate::error::{Dimensions, IngestError};
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Read, Seek};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::{TiffError, TiffFormatError};
use tracing::{debug, info, warn};

/// One decoded page: its metadata and its raw, typed samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    pub metadata: PageMetadata,
    pub raw: RawPageBuffer,
}

/// The decoder's output: pages in source order plus the nominal volume size.
#[derive(Debug, Clone)]
pub struct DecodedContainer {
    /// The first page's (width, height).
    pub dimensions: Dimensions,
    pub pages: Vec<DecodedPage>,
}

impl DecodedContainer {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Emits the first page's metadata as an informational event.
    pub fn log_summary(&self) {
        let Some(first) = self.pages.first() else {
            return;
        };
        let metadata = &first.metadata;
        info!(
            width = metadata.width,
            height = metadata.height,
            bits_per_sample = metadata.bits_per_sample,
            samples_per_pixel = metadata.samples_per_pixel,
            sample_format = %metadata.sample_encoding,
            photometric = %metadata.photometric_name(),
            compression = ?metadata.compression,
            planar_configuration = ?metadata.planar_configuration,
            pages = self.pages.len(),
            "container metadata"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerFormat {
    Tiff,
    Raster(ImageFormat),
}

/// Decodes raster containers into raw pages.
#[derive(Debug, Clone, Default)]
pub struct ContainerDecoder {
    /// Upper bound on a single page's decoded buffer, in bytes. `None` is unlimited.
    decoding_buffer_limit: Option<usize>,
}

impl ContainerDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_limit(decoding_buffer_limit: Option<usize>) -> Self {
        Self {
            decoding_buffer_limit,
        }
    }

    /// Decodes every page of `bytes`, in source order.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedContainer, IngestError> {
        let pages = match detect_format(bytes)? {
            ContainerFormat::Tiff => self.decode_tiff(bytes)?,
            ContainerFormat::Raster(format) => decode_raster(bytes, format)?,
        };

        let dimensions = pages
            .first()
            .map(|page| page.metadata.dimensions())
            .ok_or(IngestError::NoPagesFound)?;

        let container = DecodedContainer { dimensions, pages };
        container.log_summary();
        Ok(container)
    }

    fn limits(&self) -> Limits {
        match self.decoding_buffer_limit {
            None => Limits::unlimited(),
            Some(limit) => {
                let mut limits = Limits::default();
                limits.decoding_buffer_size = limit;
                limits
            }
        }
    }

    fn decode_tiff(&self, bytes: &[u8]) -> Result<Vec<DecodedPage>, IngestError> {
        if first_ifd_offset(bytes) == Some(0) {
            return Err(IngestError::NoPagesFound);
        }

        let mut decoder = Decoder::new(Cursor::new(bytes))
            .map_err(|err| page_error(0, err))?
            .with_limits(self.limits());

        let mut pages = Vec::new();
        loop {
            let index = pages.len();
            let metadata = read_page_tags(&mut decoder).resolve()?;
            let samples = match decoder.read_image() {
                Ok(result) => restore_white_is_zero(raw_samples(index, result)?, &metadata),
                Err(TiffError::UnsupportedError(reason)) => {
                    warn!(page = index, %reason, "sample layout not decodable, reading raw strips");
                    self.read_raw_strips(&mut decoder, bytes, index, &metadata)?
                }
                Err(err) => return Err(page_error(index, err)),
            };

            debug!(page = index, samples = samples.len(), "decoded page");
            pages.push(DecodedPage {
                metadata,
                raw: RawPageBuffer::new(samples),
            });

            if !decoder.more_images() {
                break;
            }
            decoder
                .next_image()
                .map_err(|err| page_error(index + 1, err))?;
        }

        Ok(pages)
    }

    /// Reads an uncompressed page's strips as unsigned words of its bit width.
    fn read_raw_strips<R: Read + Seek>(
        &self,
        decoder: &mut Decoder<R>,
        bytes: &[u8],
        index: usize,
        metadata: &PageMetadata,
    ) -> Result<RawSamples, IngestError> {
        let fail = |reason: String| IngestError::PageDecodeFailure { index, reason };

        if metadata.compression.is_some_and(|c| c != COMPRESSION_NONE) {
            return Err(fail(format!(
                "compression {:?} is not readable for this sample layout",
                metadata.compression
            )));
        }
        let element_len = match metadata.bits_per_sample {
            8 => 1,
            16 => 2,
            32 => 4,
            64 => 8,
            bits => return Err(fail(format!("{bits} bits per sample is not byte aligned"))),
        };
        let expected = metadata
            .expected_sample_count()
            .checked_mul(element_len)
            .ok_or_else(|| fail("page size overflows".to_string()))?;
        if self.decoding_buffer_limit.is_some_and(|limit| expected > limit) {
            return Err(fail(format!("page needs {expected} bytes, over the decoding limit")));
        }

        let offsets: Vec<u64> = decoder
            .find_tag_unsigned_vec(Tag::StripOffsets)
            .ok()
            .flatten()
            .ok_or_else(|| fail("page has no strip offsets".to_string()))?;
        let counts: Vec<u64> = decoder
            .find_tag_unsigned_vec(Tag::StripByteCounts)
            .ok()
            .flatten()
            .ok_or_else(|| fail("page has no strip byte counts".to_string()))?;
        if offsets.len() != counts.len() {
            return Err(fail("strip offsets and byte counts disagree".to_string()));
        }

        let mut data = Vec::with_capacity(expected);
        for (&offset, &count) in offsets.iter().zip(&counts) {
            let strip = usize::try_from(offset)
                .ok()
                .zip(usize::try_from(count).ok())
                .and_then(|(start, len)| bytes.get(start..start.checked_add(len)?))
                .ok_or_else(|| fail(format!("strip at offset {offset} runs past the end of the container")))?;
            data.extend_from_slice(strip);
        }
        if data.len() < expected {
            return Err(fail(format!("expected {expected} sample bytes, strips hold {}", data.len())));
        }
        data.truncate(expected);

        let channels = metadata.samples_per_pixel as usize;
        if metadata.planar_configuration == Some(PLANAR_SEPARATE) && channels > 1 {
            data = interleave_planes(&data, channels, element_len);
        }

        let little_endian = tiff_byte_order(bytes) != Some(false);
        Ok(words_from_bytes(&data, element_len, little_endian))
    }
}

const COMPRESSION_NONE: u16 = 1;
const PLANAR_SEPARATE: u16 = 2;
const WHITE_IS_ZERO: u16 = 0;

/// Undoes the inversion the `tiff` crate applies to single-channel WhiteIsZero pages.
fn restore_white_is_zero(samples: RawSamples, metadata: &PageMetadata) -> RawSamples {
    if metadata.photometric != Some(WHITE_IS_ZERO) || metadata.samples_per_pixel != 1 {
        return samples;
    }
    match samples {
        RawSamples::U8(v) => RawSamples::U8(v.into_iter().map(|x| u8::MAX - x).collect()),
        RawSamples::U16(v) => RawSamples::U16(v.into_iter().map(|x| u16::MAX - x).collect()),
        RawSamples::U32(v) => RawSamples::U32(v.into_iter().map(|x| u32::MAX - x).collect()),
        RawSamples::U64(v) => RawSamples::U64(v.into_iter().map(|x| u64::MAX - x).collect()),
        RawSamples::F32(v) => RawSamples::F32(v.into_iter().map(|x| 1.0 - x).collect()),
        RawSamples::F64(v) => RawSamples::F64(v.into_iter().map(|x| 1.0 - x).collect()),
        signed => signed,
    }
}

/// Reorders `planes` consecutive sample planes into pixel-interleaved order.
fn interleave_planes(data: &[u8], planes: usize, element_len: usize) -> Vec<u8> {
    let plane_len = data.len() / planes;
    let pixels = plane_len / element_len;
    let mut interleaved = Vec::with_capacity(data.len());
    for pixel in 0..pixels {
        for plane in 0..planes {
            let at = plane * plane_len + pixel * element_len;
            interleaved.extend_from_slice(&data[at..at + element_len]);
        }
    }
    interleaved
}

fn words_from_bytes(data: &[u8], element_len: usize, little_endian: bool) -> RawSamples {
    match element_len {
        1 => RawSamples::U8(data.to_vec()),
        2 => RawSamples::U16(
            data.chunks_exact(2)
                .map(|c| {
                    let raw = [c[0], c[1]];
                    if little_endian { u16::from_le_bytes(raw) } else { u16::from_be_bytes(raw) }
                })
                .collect(),
        ),
        4 => RawSamples::U32(
            data.chunks_exact(4)
                .map(|c| {
                    let raw = [c[0], c[1], c[2], c[3]];
                    if little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) }
                })
                .collect(),
        ),
        _ => RawSamples::U64(
            data.chunks_exact(8)
                .map(|c| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(c);
                    if little_endian { u64::from_le_bytes(raw) } else { u64::from_be_bytes(raw) }
                })
                .collect(),
        ),
    }
}

const TIFF_MAGICS: [&[u8; 4]; 4] = [b"II*\0", b"MM\0*", b"II+\0", b"MM\0+"];

fn detect_format(bytes: &[u8]) -> Result<ContainerFormat, IngestError> {
    // `guess_format` only knows classic TIFF.
    if TIFF_MAGICS.iter().any(|magic| bytes.starts_with(*magic)) {
        return Ok(ContainerFormat::Tiff);
    }
    match image::guess_format(bytes) {
        Ok(ImageFormat::Tiff) => Ok(ContainerFormat::Tiff),
        Ok(format) => Ok(ContainerFormat::Raster(format)),
        Err(_) => Err(IngestError::UnsupportedContainer),
    }
}

/// `Some(true)` for little-endian (`II`) headers, `Some(false)` for big-endian (`MM`).
fn tiff_byte_order(bytes: &[u8]) -> Option<bool> {
    match bytes.get(0..2)? {
        b"II" => Some(true),
        b"MM" => Some(false),
        _ => None,
    }
}

/// Reads the first-IFD offset from a TIFF or BigTIFF header.
fn first_ifd_offset(bytes: &[u8]) -> Option<u64> {
    let little_endian = tiff_byte_order(bytes)?;

    let u16_at = |at: usize| -> Option<u16> {
        let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
        Some(if little_endian { u16::from_le_bytes(raw) } else { u16::from_be_bytes(raw) })
    };
    let u32_at = |at: usize| -> Option<u32> {
        let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
        Some(if little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) })
    };
    let u64_at = |at: usize| -> Option<u64> {
        let raw: [u8; 8] = bytes.get(at..at + 8)?.try_into().ok()?;
        Some(if little_endian { u64::from_le_bytes(raw) } else { u64::from_be_bytes(raw) })
    };

    match u16_at(2)? {
        42 => u32_at(4).map(u64::from),
        43 => u64_at(8),
        _ => None,
    }
}

fn page_error(index: usize, err: TiffError) -> IngestError {
    match err {
        TiffError::FormatError(TiffFormatError::RequiredTagNotFound(
            Tag::ImageWidth | Tag::ImageLength,
        )) => IngestError::MissingDimensions,
        other => IngestError::PageDecodeFailure {
            index,
            reason: other.to_string(),
        },
    }
}

fn read_page_tags<R: Read + Seek>(decoder: &mut Decoder<R>) -> PageTags {
    let declared = decoder.dimensions().ok();
    PageTags {
        width: declared.map(|(width, _)| width),
        height: declared.map(|(_, height)| height),
        width_tag: find_unsigned(decoder, Tag::ImageWidth),
        height_tag: find_unsigned(decoder, Tag::ImageLength),
        bits_per_sample: first_unsigned(decoder, Tag::BitsPerSample),
        samples_per_pixel: find_unsigned(decoder, Tag::SamplesPerPixel),
        sample_format: first_unsigned(decoder, Tag::SampleFormat),
        photometric: find_unsigned(decoder, Tag::PhotometricInterpretation),
        compression: find_unsigned(decoder, Tag::Compression),
        planar_configuration: find_unsigned(decoder, Tag::PlanarConfiguration),
    }
}

// Optional tags that fail to parse are treated as absent.
fn find_unsigned<R: Read + Seek, T: TryFrom<u64>>(decoder: &mut Decoder<R>, tag: Tag) -> Option<T> {
    decoder.find_tag_unsigned::<T>(tag).ok().flatten()
}

fn first_unsigned<R: Read + Seek, T: TryFrom<u64>>(decoder: &mut Decoder<R>, tag: Tag) -> Option<T> {
    decoder
        .find_tag_unsigned_vec::<T>(tag)
        .ok()
        .flatten()
        .and_then(|values| values.into_iter().next())
}

fn raw_samples(index: usize, result: DecodingResult) -> Result<RawSamples, IngestError> {
    #[allow(unreachable_patterns)]
    let samples = match result {
        DecodingResult::U8(v) => RawSamples::U8(v),
        DecodingResult::U16(v) => RawSamples::U16(v),
        DecodingResult::U32(v) => RawSamples::U32(v),
        DecodingResult::U64(v) => RawSamples::U64(v),
        DecodingResult::I8(v) => RawSamples::I8(v),
        DecodingResult::I16(v) => RawSamples::I16(v),
        DecodingResult::I32(v) => RawSamples::I32(v),
        DecodingResult::I64(v) => RawSamples::I64(v),
        DecodingResult::F32(v) => RawSamples::F32(v),
        DecodingResult::F64(v) => RawSamples::F64(v),
        _ => {
            return Err(IngestError::PageDecodeFailure {
                index,
                reason: "unsupported sample type".to_string(),
            });
        }
    };
    Ok(samples)
}

/// Reads a single-page raster through the `image` crate.
fn decode_raster(bytes: &[u8], format: ImageFormat) -> Result<Vec<DecodedPage>, IngestError> {
    const UNSIGNED: u16 = 1;
    const FLOAT: u16 = 3;
    const BLACK_IS_ZERO: u16 = 1;
    const RGB: u16 = 2;

    let image = image::load_from_memory_with_format(bytes, format).map_err(|err| {
        IngestError::PageDecodeFailure {
            index: 0,
            reason: err.to_string(),
        }
    })?;
    let (width, height) = (image.width(), image.height());

    let (bits, channels, sample_format, photometric, samples) = match image {
        DynamicImage::ImageLuma8(buf) => (8, 1, UNSIGNED, BLACK_IS_ZERO, RawSamples::U8(buf.into_raw())),
        DynamicImage::ImageLumaA8(buf) => (8, 2, UNSIGNED, BLACK_IS_ZERO, RawSamples::U8(buf.into_raw())),
        DynamicImage::ImageRgb8(buf) => (8, 3, UNSIGNED, RGB, RawSamples::U8(buf.into_raw())),
        DynamicImage::ImageRgba8(buf) => (8, 4, UNSIGNED, RGB, RawSamples::U8(buf.into_raw())),
        DynamicImage::ImageLuma16(buf) => (16, 1, UNSIGNED, BLACK_IS_ZERO, RawSamples::U16(buf.into_raw())),
        DynamicImage::ImageLumaA16(buf) => (16, 2, UNSIGNED, BLACK_IS_ZERO, RawSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgb16(buf) => (16, 3, UNSIGNED, RGB, RawSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgba16(buf) => (16, 4, UNSIGNED, RGB, RawSamples::U16(buf.into_raw())),
        DynamicImage::ImageRgb32F(buf) => (32, 3, FLOAT, RGB, RawSamples::F32(buf.into_raw())),
        DynamicImage::ImageRgba32F(buf) => (32, 4, FLOAT, RGB, RawSamples::F32(buf.into_raw())),
        other => (32, 4, FLOAT, RGB, RawSamples::F32(other.to_rgba32f().into_raw())),
    };

    let metadata = PageTags {
        width: Some(width),
        height: Some(height),
        bits_per_sample: Some(bits),
        samples_per_pixel: Some(channels),
        sample_format: Some(sample_format),
        photometric: Some(photometric),
        ..PageTags::default()
    }
    .resolve()?;

    Ok(vec![DecodedPage {
        metadata,
        raw: RawPageBuffer::new(samples),
    }])
}
