// THEORY:
// The `InterchangeWriter` serializes numeric arrays into the NumPy `.npy` v1.0
// container so that external numeric tooling can load simulation results (and,
// optionally, the normalized volume itself) without any custom reader.
//
// Byte layout, reproduced exactly:
//
//   0..6    magic            \x93NUMPY
//   6..8    version          1, 0
//   8..10   header length    u16, little-endian
//   10..    header dict      {'descr': '<f4', 'fortran_order': False, 'shape': (H, W,)}
//           padding          ASCII spaces
//           terminator       one '\n'
//           payload          raw little-endian float32 values, row-major
//
// The padding makes the prefix (10 fixed bytes + dict + padding + newline) a
// multiple of 16 bytes. Complex arrays use the `<c8` descriptor and store each
// element as an interleaved (real, imaginary) float32 pair.

use crate::core_modules::compute_boundary::ResultArray;
use crate::core_modules::volume_assembler::Volume;
use std::io::{self, Write};
use std::path::Path;

/// Format identifier at the start of every container.
pub const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// File name used when a result is delivered as a download.
pub const DEFAULT_FILE_NAME: &str = "ssnp_output.npy";

const VERSION: [u8; 2] = [1, 0];
// magic + version + header length
const PREFIX_LEN: usize = 10;
const ALIGNMENT: usize = 16;

/// Element type of the stored array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// `<f4`: one little-endian float32 per element.
    Float32,
    /// `<c8`: an interleaved little-endian float32 (real, imaginary) pair per element.
    Complex64,
}

impl Dtype {
    pub fn descr(&self) -> &'static str {
        match self {
            Self::Float32 => "<f4",
            Self::Complex64 => "<c8",
        }
    }

    /// Number of float32 values per logical element.
    pub fn components(&self) -> usize {
        match self {
            Self::Float32 => 1,
            Self::Complex64 => 2,
        }
    }

    pub fn element_size(&self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }
}

/// The header dictionary literal, without padding or newline.
pub fn header_dict(dtype: Dtype, shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| format!("{d},")).collect();
    format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({})}}",
        dtype.descr(),
        dims.join(" ")
    )
}

/// Number of spaces needed after a dict of `dict_len` bytes.
pub fn padding_len(dict_len: usize) -> usize {
    (ALIGNMENT - ((PREFIX_LEN + dict_len + 1) % ALIGNMENT)) % ALIGNMENT
}

/// Dict + padding + newline: the bytes counted by the header-length field.
pub fn header_block(dtype: Dtype, shape: &[usize]) -> Vec<u8> {
    let dict = header_dict(dtype, shape);
    let padding = padding_len(dict.len());

    let mut block = Vec::with_capacity(dict.len() + padding + 1);
    block.extend_from_slice(dict.as_bytes());
    block.resize(dict.len() + padding, b' ');
    block.push(b'\n');
    block
}

/// Writes a complete container for `values` with the given logical `shape`.
pub fn write_array<W: Write>(writer: &mut W, dtype: Dtype, shape: &[usize], values: &[f32]) -> io::Result<()> {
    let expected = shape.iter().product::<usize>() * dtype.components();
    if values.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Data length mismatch: got {}, expected {} for shape {:?}",
                values.len(),
                expected,
                shape
            ),
        ));
    }

    let block = header_block(dtype, shape);
    let block_len = u16::try_from(block.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("header of {} bytes does not fit a v1.0 container", block.len()),
        )
    })?;

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION)?;
    writer.write_all(&block_len.to_le_bytes())?;
    writer.write_all(&block)?;

    let mut payload = Vec::with_capacity(values.len() * std::mem::size_of::<f32>());
    payload.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    writer.write_all(&payload)?;
    Ok(())
}

/// Encodes `values` into an in-memory container.
pub fn encode(dtype: Dtype, shape: &[usize], values: &[f32]) -> io::Result<Vec<u8>> {
    let payload_len = values.len() * std::mem::size_of::<f32>();
    let mut bytes = Vec::with_capacity(PREFIX_LEN + 128 + payload_len);
    write_array(&mut bytes, dtype, shape, values)?;
    Ok(bytes)
}

/// Encodes a compute result with shape (H, W).
pub fn encode_result(result: &ResultArray) -> io::Result<Vec<u8>> {
    let dtype = if result.is_complex() {
        Dtype::Complex64
    } else {
        Dtype::Float32
    };
    encode(dtype, &[result.height(), result.width()], result.as_slice())
}

/// Encodes a normalized volume with shape (D, H, W).
pub fn encode_volume(volume: &Volume) -> io::Result<Vec<u8>> {
    encode(
        Dtype::Float32,
        &[volume.depth(), volume.height(), volume.width()],
        volume.as_slice(),
    )
}

/// A serialized container ready to be delivered under a file name.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn from_result(result: &ResultArray) -> io::Result<Self> {
        Ok(Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            bytes: encode_result(result)?,
        })
    }

    /// Writes the artifact to `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        tokio::fs::write(path, &self.bytes).await
    }
}

/// Serializes the current result, if there is one. No result means nothing to export.
pub fn export(result: Option<&ResultArray>) -> io::Result<Option<Artifact>> {
    result.map(Artifact::from_result).transpose()
}
