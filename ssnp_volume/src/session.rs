// THEORY:
// A `Session` is the single owner of the ingested volume and of the last
// simulation result. It replaces ad-hoc global state with explicit ownership:
//
// 1.  **At most one volume**: Ingesting releases the current volume before the
//     new bytes are decoded, so two volumes never coexist. A failed ingestion
//     leaves the session empty rather than restoring the old volume.
// 2.  **Borrowed, never handed over**: `run` lends `&Volume` to the procedure for
//     the duration of the call. Because `run` takes `&mut self`, nothing can
//     release or replace the volume while the procedure is in flight.
// 3.  **Failures keep the volume**: A rejected or failed run leaves the volume
//     loaded and unmodified, and leaves no stale result behind.
// 4.  **Release on drop**: Dropping the session drops the volume.

use crate::core_modules::compute_boundary::{ComputeOutput, ComputeProcedure, SimulationParams};
use crate::core_modules::interchange_writer::{self, Artifact};
use crate::core_modules::volume_assembler::Volume;
use crate::error::{ComputeError, IngestError, SessionError};
use crate::pipeline::{self, IngestConfig};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Owns the current volume and the last compute result.
#[derive(Debug, Default)]
pub struct Session {
    config: IngestConfig,
    volume: Option<Volume>,
    last_output: Option<ComputeOutput>,
}

impl Session {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            volume: None,
            last_output: None,
        }
    }

    /// Replaces the current volume with one decoded from `bytes`.
    pub fn ingest_bytes(&mut self, bytes: &[u8]) -> Result<&Volume, IngestError> {
        self.release();
        let volume = pipeline::ingest(bytes, &self.config)?;
        Ok(self.volume.insert(volume))
    }

    /// Replaces the current volume with the contents of `path`.
    pub async fn ingest_file(&mut self, path: impl AsRef<Path>) -> Result<&Volume, IngestError> {
        self.release();
        let volume = pipeline::ingest_file(path, &self.config).await?;
        Ok(self.volume.insert(volume))
    }

    /// Drops the current volume and result, if any.
    pub fn release(&mut self) {
        if let Some(volume) = self.volume.take() {
            debug!(
                depth = volume.depth(),
                height = volume.height(),
                width = volume.width(),
                "releasing volume"
            );
        }
        self.last_output = None;
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn last_output(&self) -> Option<&ComputeOutput> {
        self.last_output.as_ref()
    }

    /// Runs `procedure` against the loaded volume.
    ///
    /// Fails with `NoVolumeLoaded` or a `ParamError` without calling the
    /// procedure. The previous result is cleared once the call goes ahead.
    pub async fn run<P>(&mut self, procedure: &P, params: &str) -> Result<&ComputeOutput, SessionError>
    where
        P: ComputeProcedure + ?Sized,
    {
        let volume = self.volume.as_ref().ok_or(SessionError::NoVolumeLoaded)?;
        params.parse::<SimulationParams>()?.validate()?;

        self.last_output = None;
        let output = match procedure.run(volume, params).await {
            Ok(output) => output,
            Err(err) => {
                warn!(error = %err, "compute procedure failed, volume kept");
                return Err(err.into());
            }
        };

        let (height, width) = (output.result.height(), output.result.width());
        if (height, width) != (volume.height(), volume.width()) {
            warn!(height, width, "compute result does not match the volume");
            return Err(ComputeError::MalformedResult(format!(
                "result shape ({height}, {width}) does not match volume slice ({}, {})",
                volume.height(),
                volume.width()
            ))
            .into());
        }

        info!(
            min = output.range.min,
            max = output.range.max,
            complex = output.result.is_complex(),
            "compute result ready"
        );
        Ok(self.last_output.insert(output))
    }

    /// Serializes the last result. `None` when there is nothing to export.
    pub fn export(&self) -> io::Result<Option<Artifact>> {
        interchange_writer::export(self.last_output.as_ref().map(|output| &output.result))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}
