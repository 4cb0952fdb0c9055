// THEORY:
// This file is the entry point for the `ssnp_volume` library crate. It exposes
// two layers:
//
// - `pipeline`: the one-shot path from raw container bytes to a normalized
//   float32 `Volume` (decode, normalize, assemble).
// - `session`: the owned handle a front end holds for its lifetime. It keeps at
//   most one volume, lends it to a `ComputeProcedure`, remembers the last result
//   and exports it as a NumPy array.
//
// The leaf components live in `core_modules` and stay public so that tooling
// (the `volume_tester` binary, tests) can drive them individually.

pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod session;

pub use crate::core_modules::command_procedure::CommandProcedure;
pub use crate::core_modules::compute_boundary::{
    ComputeOutput, ComputeProcedure, OutputType, ResultArray, SimulationParams, ValueRange,
};
pub use crate::core_modules::interchange_writer::Artifact;
pub use crate::core_modules::volume_assembler::{Volume, VolumeExtents};
pub use crate::error::{ComputeError, Dimensions, IngestError, ParamError, SessionError};
pub use crate::pipeline::{IngestConfig, ingest, ingest_file};
pub use crate::session::Session;
