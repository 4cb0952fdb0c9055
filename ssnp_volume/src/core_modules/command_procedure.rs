// THEORY:
// `CommandProcedure` plugs an external simulation executable in behind the
// `ComputeProcedure` trait. The executable never sees our memory; everything
// goes through a private scratch directory:
//
// 1.  The borrowed volume is written to `input.bin` as a tensor file.
// 2.  The program runs as `<program> [args..] <input.bin> <output.bin> <params>`
//     and must exit with status 0.
// 3.  `output.bin` is read back. Depth slice 0 is the result; when the params
//     ask for complex output the last axis carries 2·W interleaved floats.
//
// The scratch directory is removed when the call returns, success or not.

use crate::core_modules::compute_boundary::{
    ComputeOutput, ComputeProcedure, OutputType, ResultArray, SimulationParams,
};
use crate::core_modules::tensor_file;
use crate::core_modules::volume_assembler::Volume;
use crate::error::ComputeError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

const INPUT_FILE: &str = "input.bin";
const OUTPUT_FILE: &str = "output.bin";

/// Runs a simulation executable through tensor files.
#[derive(Debug, Clone)]
pub struct CommandProcedure {
    pub program: PathBuf,
    /// Extra leading arguments, placed before the file paths.
    pub args: Vec<String>,
}

impl CommandProcedure {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Turns the first depth slice of an output tensor into a result array.
pub fn result_from_tensor(
    tensor: &tensor_file::Tensor,
    output_type: OutputType,
) -> Result<ResultArray, ComputeError> {
    let slice = tensor.slice(0).ok_or_else(|| {
        ComputeError::MalformedResult("output tensor has no depth slices".to_string())
    })?;

    match output_type {
        OutputType::Complex => {
            if tensor.width % 2 != 0 {
                return Err(ComputeError::MalformedResult(format!(
                    "complex output needs an even last axis, got {}",
                    tensor.width
                )));
            }
            ResultArray::complex(tensor.height, tensor.width / 2, slice.to_vec())
        }
        OutputType::Amplitude | OutputType::Intensity => {
            ResultArray::real(tensor.height, tensor.width, slice.to_vec())
        }
    }
}

#[async_trait]
impl ComputeProcedure for CommandProcedure {
    async fn run(&self, volume: &Volume, params: &str) -> Result<ComputeOutput, ComputeError> {
        let parsed: SimulationParams = params.parse()?;

        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(INPUT_FILE);
        let output = scratch.path().join(OUTPUT_FILE);

        tokio::fs::write(&input, tensor_file::encode_volume(volume)?).await?;

        debug!(
            program = %self.program.display(),
            params,
            depth = volume.depth(),
            height = volume.height(),
            width = volume.width(),
            "launching compute process"
        );
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg(&output)
            .arg(params)
            .kill_on_drop(true)
            .output()
            .await?;

        if !status.status.success() {
            return Err(ComputeError::ProcessFailed {
                status: status.status,
                stderr: String::from_utf8_lossy(&status.stderr).trim().to_string(),
            });
        }

        let bytes = tokio::fs::read(&output).await.map_err(|e| {
            ComputeError::MalformedResult(format!("could not read {OUTPUT_FILE}: {e}"))
        })?;
        let tensor = tensor_file::decode(&bytes)
            .map_err(|e| ComputeError::MalformedResult(e.to_string()))?;

        let result = result_from_tensor(&tensor, parsed.output_type)?;
        Ok(ComputeOutput::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::sample_normalizer::NormalizedPage;
    use crate::core_modules::volume_assembler::assemble;
    use crate::error::Dimensions;

    fn volume() -> Volume {
        assemble(vec![
            NormalizedPage {
                dimensions: Dimensions::new(2, 1),
                samples_per_pixel: 1,
                data: vec![0.25, 0.75],
            },
            NormalizedPage {
                dimensions: Dimensions::new(2, 1),
                samples_per_pixel: 1,
                data: vec![9.0, 9.0],
            },
        ])
        .unwrap()
    }

    #[test]
    fn complex_output_halves_the_last_axis() {
        let tensor = tensor_file::Tensor {
            depth: 1,
            height: 1,
            width: 4,
            data: vec![1.0, 0.0, 0.0, 2.0],
        };
        let result = result_from_tensor(&tensor, OutputType::Complex).unwrap();
        assert!(result.is_complex());
        assert_eq!((result.height(), result.width()), (1, 2));

        let odd = tensor_file::Tensor { width: 3, data: vec![0.0; 3], ..tensor };
        assert!(matches!(
            result_from_tensor(&odd, OutputType::Complex),
            Err(ComputeError::MalformedResult(_))
        ));
    }

    #[test]
    fn empty_output_is_malformed() {
        let tensor = tensor_file::Tensor {
            depth: 0,
            height: 2,
            width: 2,
            data: Vec::new(),
        };
        assert!(result_from_tensor(&tensor, OutputType::Intensity).is_err());
    }

    #[tokio::test]
    async fn bad_params_never_launch_the_program() {
        let procedure = CommandProcedure::new("/nonexistent/engine");
        let err = procedure.run(&volume(), "not|enough").await.unwrap_err();
        assert!(matches!(err, ComputeError::Params(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echo_engine_returns_first_slice() {
        // Copies input to output: slice 0 of the volume comes back unchanged.
        let procedure = CommandProcedure::new("sh").with_args(["-c", "cp \"$1\" \"$2\"", "engine"]);
        let output = procedure
            .run(&volume(), &SimulationParams::default().encode())
            .await
            .unwrap();

        assert_eq!(output.result, ResultArray::real(1, 2, vec![0.25, 0.75]).unwrap());
        assert_eq!(output.range.min, 0.25);
        assert_eq!(output.range.max, 0.75);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let procedure = CommandProcedure::new("sh").with_args(["-c", "echo diverged >&2; exit 3", "engine"]);
        let err = procedure
            .run(&volume(), &SimulationParams::default().encode())
            .await
            .unwrap_err();

        match err {
            ComputeError::ProcessFailed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "diverged");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
