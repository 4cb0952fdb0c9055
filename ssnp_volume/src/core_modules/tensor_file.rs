// THEORY:
// The tensor file is the on-disk hand-off format for an external simulation
// executable. It is deliberately the dumbest possible layout:
//
//   0..12   extents   three little-endian int32: D, H, W
//   12..    payload   D·H·W little-endian float32, depth-major, row-major
//
// The same layout is used in both directions. The last axis of an output file
// may be twice the logical width when the engine returns interleaved complex
// values; interpreting that is the caller's job, not this module's.

use crate::core_modules::volume_assembler::Volume;
use std::io;

const EXTENTS_LEN: usize = 3 * std::mem::size_of::<i32>();

/// A decoded tensor file: extents plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Depth slice `index`, if it exists.
    pub fn slice(&self, index: usize) -> Option<&[f32]> {
        let len = self.height * self.width;
        self.data.get(index * len..(index + 1) * len)
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn element_count(depth: usize, height: usize, width: usize) -> io::Result<usize> {
    depth
        .checked_mul(height)
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| invalid(format!("extents ({depth}, {height}, {width}) overflow")))
}

fn extent(value: usize) -> io::Result<[u8; 4]> {
    i32::try_from(value)
        .map(i32::to_le_bytes)
        .map_err(|_| invalid(format!("extent {value} does not fit an int32")))
}

/// Encodes extents and values. `values` must hold exactly `depth * height * width` floats.
pub fn encode(depth: usize, height: usize, width: usize, values: &[f32]) -> io::Result<Vec<u8>> {
    let expected = element_count(depth, height, width)?;
    if values.len() != expected {
        return Err(invalid(format!(
            "tensor ({depth}, {height}, {width}) needs {expected} values, got {}",
            values.len()
        )));
    }

    let mut bytes = Vec::with_capacity(EXTENTS_LEN + values.len() * std::mem::size_of::<f32>());
    for value in [depth, height, width] {
        bytes.extend_from_slice(&extent(value)?);
    }
    bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
    Ok(bytes)
}

pub fn encode_volume(volume: &Volume) -> io::Result<Vec<u8>> {
    encode(volume.depth(), volume.height(), volume.width(), volume.as_slice())
}

/// Decodes a tensor file, rejecting negative extents and short or long payloads.
pub fn decode(bytes: &[u8]) -> io::Result<Tensor> {
    if bytes.len() < EXTENTS_LEN {
        return Err(invalid(format!("tensor file of {} bytes has no extents", bytes.len())));
    }

    let mut extents = [0usize; 3];
    for (slot, chunk) in extents.iter_mut().zip(bytes[..EXTENTS_LEN].chunks_exact(4)) {
        let raw = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        *slot = usize::try_from(raw).map_err(|_| invalid(format!("negative extent {raw}")))?;
    }
    let [depth, height, width] = extents;

    let payload = &bytes[EXTENTS_LEN..];
    let expected = element_count(depth, height, width)?
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| invalid(format!("extents ({depth}, {height}, {width}) overflow")))?;
    if payload.len() != expected {
        return Err(invalid(format!(
            "tensor ({depth}, {height}, {width}) needs {expected} payload bytes, got {}",
            payload.len()
        )));
    }

    let data = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(Tensor {
        depth,
        height,
        width,
        data,
    })
}
