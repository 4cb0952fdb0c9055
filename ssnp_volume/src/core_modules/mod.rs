pub mod command_procedure;
pub mod compute_boundary;
pub mod container_decoder;
pub mod interchange_writer;
pub mod page;
pub mod sample_normalizer;
pub mod tensor_file;
pub mod volume_assembler;
