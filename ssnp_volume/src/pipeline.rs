// THEORY:
// The `pipeline` module is the top-level ingestion API. It chains the three leaf
// stages into a single call:
//
//   container bytes --ContainerDecoder--> raw pages
//                   --SampleNormalizer--> float32 pages (per page, its own format)
//                   --VolumeAssembler---> one D×H×W Volume
//
// Ingestion is all-or-nothing. The first failing page aborts the whole run and
// whatever was assembled so far is dropped with the assembler.

use crate::core_modules::container_decoder::ContainerDecoder;
use crate::core_modules::sample_normalizer::normalize;
use crate::core_modules::volume_assembler::{Volume, VolumeAssembler};
use crate::error::IngestError;
use std::path::Path;
use tracing::debug;

/// Configuration for ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Upper bound, in bytes, on a single page's decoded buffer.
    /// `None` leaves the decoder unlimited.
    pub decoding_buffer_limit: Option<usize>,
}

/// Decodes, normalizes and assembles `bytes` into a volume.
pub fn ingest(bytes: &[u8], config: &IngestConfig) -> Result<Volume, IngestError> {
    let decoder = ContainerDecoder::with_buffer_limit(config.decoding_buffer_limit);
    let container = decoder.decode(bytes)?;

    let mut assembler = VolumeAssembler::new(container.dimensions, container.page_count());
    for (index, page) in container.pages.into_iter().enumerate() {
        assembler.check_dimensions(index, page.metadata.dimensions())?;
        let normalized = normalize(page.raw, &page.metadata);
        assembler.push(index, normalized)?;
        debug!(index, "page assembled");
    }

    let volume = assembler.finish()?;
    debug!(
        depth = volume.depth(),
        height = volume.height(),
        width = volume.width(),
        "volume ready"
    );
    Ok(volume)
}

/// Reads `path` and ingests its contents.
pub async fn ingest_file(path: impl AsRef<Path>, config: &IngestConfig) -> Result<Volume, IngestError> {
    let bytes = tokio::fs::read(path).await?;
    ingest(&bytes, config)
}
