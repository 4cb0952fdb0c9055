// THEORY:
// The `VolumeAssembler` stacks normalized pages into one contiguous float32
// buffer laid out depth-major: page i occupies depth slice i, and every slice is
// row-major (H rows of W values).
//
// Key architectural principles:
// 1.  **First page defines the shape**: Every page must match the first page's
//     (width, height). A mismatch is fatal to the whole ingestion and there is no
//     recovery path; because the assembler owns the partially built buffer, an
//     error drops it and no partial `Volume` is ever observable.
// 2.  **One value per pixel**: Multi-channel pages are reduced by taking channel 0
//     of each pixel's channel group. This discards chrominance and alpha; it is
//     a selection, not an average.
// 3.  **Strict order**: Pages are pushed in source order and appended in that
//     order. The destination buffer is reserved once up front.

use crate::core_modules::sample_normalizer::NormalizedPage;
use crate::error::{Dimensions, IngestError};

/// Extents of a volume: depth (page count), height and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeExtents {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl VolumeExtents {
    pub fn len(&self) -> usize {
        self.depth * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slice_len(&self) -> usize {
        self.height * self.width
    }
}

/// The assembled D×H×W float32 volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    extents: VolumeExtents,
    data: Vec<f32>,
}

impl Volume {
    pub fn extents(&self) -> VolumeExtents {
        self.extents
    }

    pub fn depth(&self) -> usize {
        self.extents.depth
    }

    pub fn height(&self) -> usize {
        self.extents.height
    }

    pub fn width(&self) -> usize {
        self.extents.width
    }

    /// The whole buffer, depth-major and row-major within each slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Depth slice `index`, if it exists.
    pub fn slice(&self, index: usize) -> Option<&[f32]> {
        let len = self.extents.slice_len();
        self.data.get(index * len..(index + 1) * len)
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// Incrementally builds a `Volume` from pages pushed in source order.
pub struct VolumeAssembler {
    expected: Dimensions,
    depth: usize,
    data: Vec<f32>,
}

impl VolumeAssembler {
    /// Starts a volume whose pages must all be `expected` in size.
    /// `page_hint` is used only to reserve the destination buffer.
    pub fn new(expected: Dimensions, page_hint: usize) -> Self {
        Self {
            expected,
            depth: 0,
            data: Vec::with_capacity(expected.pixel_count() * page_hint),
        }
    }

    /// Rejects `actual` unless it equals the first page's size.
    pub fn check_dimensions(&self, index: usize, actual: Dimensions) -> Result<(), IngestError> {
        if actual != self.expected {
            return Err(IngestError::DimensionMismatch {
                index,
                actual,
                expected: self.expected,
            });
        }
        Ok(())
    }

    /// Appends page `index` as the next depth slice.
    pub fn push(&mut self, index: usize, page: NormalizedPage) -> Result<(), IngestError> {
        self.check_dimensions(index, page.dimensions)?;

        let pixels = self.expected.pixel_count();
        let channels = page.samples_per_pixel.max(1) as usize;
        if page.data.len() != pixels * channels {
            return Err(IngestError::PageDecodeFailure {
                index,
                reason: format!(
                    "expected {} samples, decoded {}",
                    pixels * channels,
                    page.data.len()
                ),
            });
        }

        if channels == 1 {
            self.data.extend_from_slice(&page.data);
        } else {
            self.data
                .extend(page.data.chunks_exact(channels).map(|group| group[0]));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Finishes the volume. Fails if no page was ever pushed.
    pub fn finish(self) -> Result<Volume, IngestError> {
        if self.depth == 0 {
            return Err(IngestError::NoPagesFound);
        }
        Ok(Volume {
            extents: VolumeExtents {
                depth: self.depth,
                height: self.expected.height as usize,
                width: self.expected.width as usize,
            },
            data: self.data,
        })
    }
}

/// Assembles already-normalized pages. The first page defines the expected size.
pub fn assemble(pages: Vec<NormalizedPage>) -> Result<Volume, IngestError> {
    let expected = pages
        .first()
        .map(|page| page.dimensions)
        .ok_or(IngestError::NoPagesFound)?;

    let mut assembler = VolumeAssembler::new(expected, pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        assembler.push(index, page)?;
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: u32, height: u32, channels: u16, data: Vec<f32>) -> NormalizedPage {
        NormalizedPage {
            dimensions: Dimensions::new(width, height),
            samples_per_pixel: channels,
            data,
        }
    }

    #[test]
    fn concatenates_pages_in_given_order() {
        let volume = assemble(vec![
            page(2, 1, 1, vec![3.0, 3.5]),
            page(2, 1, 1, vec![1.0, 1.5]),
            page(2, 1, 1, vec![2.0, 2.5]),
        ])
        .unwrap();

        assert_eq!(
            volume.extents(),
            VolumeExtents {
                depth: 3,
                height: 1,
                width: 2
            }
        );
        assert_eq!(volume.as_slice().len(), 6);
        assert_eq!(volume.slice(0), Some(&[3.0, 3.5][..]));
        assert_eq!(volume.slice(1), Some(&[1.0, 1.5][..]));
        assert_eq!(volume.slice(2), Some(&[2.0, 2.5][..]));
        assert_eq!(volume.slice(3), None);
    }

    #[test]
    fn multi_channel_pages_keep_first_channel() {
        let volume = assemble(vec![page(
            2,
            2,
            3,
            vec![
                0.1, 0.9, 0.9, //
                0.2, 0.9, 0.9, //
                0.3, 0.9, 0.9, //
                0.4, 0.9, 0.9,
            ],
        )])
        .unwrap();
        assert_eq!(volume.as_slice(), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn mismatched_page_names_index_and_sizes() {
        let err = assemble(vec![
            page(2, 2, 1, vec![0.0; 4]),
            page(2, 2, 1, vec![0.0; 4]),
            page(4, 1, 1, vec![0.0; 4]),
        ])
        .unwrap_err();

        match err {
            IngestError::DimensionMismatch {
                index,
                actual,
                expected,
            } => {
                assert_eq!(index, 2);
                assert_eq!(actual, Dimensions::new(4, 1));
                assert_eq!(expected, Dimensions::new(2, 2));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn short_page_is_a_decode_failure() {
        let err = assemble(vec![page(2, 2, 1, vec![0.0; 4]), page(2, 2, 2, vec![0.0; 6])]).unwrap_err();
        assert!(matches!(err, IngestError::PageDecodeFailure { index: 1, .. }));
    }

    #[test]
    fn empty_input_has_no_pages() {
        assert!(matches!(assemble(Vec::new()), Err(IngestError::NoPagesFound)));
        let assembler = VolumeAssembler::new(Dimensions::new(1, 1), 0);
        assert!(matches!(assembler.finish(), Err(IngestError::NoPagesFound)));
    }
}
