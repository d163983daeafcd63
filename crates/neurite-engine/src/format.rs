//! On-disk format primitives shared by model and dataset files
//!
//! Every binary file opens with the same 6-byte header: a two-byte magic,
//! a type byte, a version byte and a 16-bit byte-order mark. Multi-byte
//! fields are stored in the writer's native order; the observed byte order
//! of the mark tells the reader whether it must reverse bytes. Model files
//! additionally end with a CRC-32 over every preceding byte.

use std::io::SeekFrom;

use crate::error::{ModelError, Result};
use crate::source::ByteSource;

/// Two-byte magic opening every binary file
pub const MAGIC: [u8; 2] = *b"nb";

/// Byte-order mark as written on the producing host
pub const BOM: u16 = 0xABCD;

/// Size of the common file header in bytes
pub const HEADER_SIZE: u64 = 6;

/// File types distinguished by the header type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Stream dataset file
    Dataset = 1,
    /// Trained model file
    Model = 5,
}

/// Common header of binary files
#[derive(Debug, Clone, Copy)]
pub struct BinHeader {
    /// Magic bytes, "nb"
    pub magic: [u8; 2],
    /// File type byte
    pub file_type: u8,
    /// Format version byte
    pub version: u8,
    /// Byte-order mark, read in host order
    pub bom: u16,
}

impl BinHeader {
    /// Parse the header from its 6-byte on-disk form
    pub fn parse(raw: [u8; HEADER_SIZE as usize]) -> Self {
        Self {
            magic: [raw[0], raw[1]],
            file_type: raw[2],
            version: raw[3],
            bom: u16::from_ne_bytes([raw[4], raw[5]]),
        }
    }
}

/// Packed meta block of a model file
#[derive(Debug, Clone, Copy)]
pub struct MetaInfo {
    /// Option bits (see [`crate::ModelOptions`])
    pub options: u8,
    /// Task kind discriminant
    pub task: u8,
    /// Input dimension, bias slot included
    pub inputs_dim: u16,
    /// Output dimension
    pub outputs_dim: u16,
    /// Quantization bit width
    pub quantization: u8,
    /// Reserved byte
    pub reserved: u8,
    /// Neuron count
    pub neurons_count: u16,
}

impl MetaInfo {
    /// Byte length of the packed on-disk form
    pub const SIZE: usize = 10;

    /// Parse from the packed on-disk form; `reverse` flips multi-byte fields
    pub fn parse(raw: [u8; Self::SIZE], reverse: bool) -> Self {
        let read16 = |a: u8, b: u8| {
            let value = u16::from_ne_bytes([a, b]);
            if reverse {
                value.swap_bytes()
            } else {
                value
            }
        };

        Self {
            options: raw[0],
            task: raw[1],
            inputs_dim: read16(raw[2], raw[3]),
            outputs_dim: read16(raw[4], raw[5]),
            quantization: raw[6],
            reserved: raw[7],
            neurons_count: read16(raw[8], raw[9]),
        }
    }
}

/// CRC-32 over a byte slice (polynomial 0xEDB88320, inverted in and out)
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Reverse the bytes of every 16-bit element in `buf`
pub fn swap2(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(2) {
        chunk.swap(0, 1);
    }
}

/// Reverse the bytes of every 32-bit element in `buf`
pub fn swap4(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(4) {
        chunk.reverse();
    }
}

/// Reverse the bytes of every 64-bit element in `buf`
pub fn swap8(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(8) {
        chunk.reverse();
    }
}

/// In-place byte reversal for a run of `width`-byte elements
pub fn swap_elements(buf: &mut [u8], width: u8) -> Result<()> {
    match width {
        1 => Ok(()),
        2 => {
            swap2(buf);
            Ok(())
        }
        4 => {
            swap4(buf);
            Ok(())
        }
        8 => {
            swap8(buf);
            Ok(())
        }
        _ => Err(ModelError::not_supported(format!(
            "byte swap of {width}-byte elements"
        ))),
    }
}

/// Zero padding needed to align `offset` to an `align`-byte boundary
pub fn align_pad(align: usize, offset: usize) -> usize {
    if offset % align == 0 {
        0
    } else {
        align - offset % align
    }
}

/// Validate the common header and, for model files, the trailing CRC-32.
///
/// Returns whether multi-byte fields must be byte-reversed while reading.
/// On success the source is left positioned immediately after the header.
pub fn check_file_header(source: &mut ByteSource<'_>, expected: FileType) -> Result<bool> {
    source.seek(SeekFrom::Start(0))?;

    let mut raw = [0u8; HEADER_SIZE as usize];
    source.read_exact(&mut raw)?;
    let header = BinHeader::parse(raw);

    if header.magic != MAGIC {
        return Err(ModelError::bad_format(format!(
            "magic {:?} where \"nb\" was expected",
            header.magic
        )));
    }
    if header.file_type != expected as u8 {
        return Err(ModelError::bad_format(format!(
            "type byte {} where {} was expected",
            header.file_type, expected as u8
        )));
    }

    let reverse = if header.bom == BOM {
        false
    } else if header.bom.swap_bytes() == BOM {
        true
    } else {
        return Err(ModelError::bad_format(format!(
            "unrecognized byte-order mark {:#06x}",
            header.bom
        )));
    };

    if expected == FileType::Model {
        verify_model_crc(source, reverse)?;
        source.seek(SeekFrom::Start(HEADER_SIZE))?;
    }

    Ok(reverse)
}

/// Walk the whole file and compare the running CRC-32 against the trailer
fn verify_model_crc(source: &mut ByteSource<'_>, reverse: bool) -> Result<()> {
    source.seek(SeekFrom::Start(0))?;

    let covered = source.size().saturating_sub(4);
    let mut hasher = crc32fast::Hasher::new();
    let mut chunk = [0u8; 256];
    let mut remaining = covered;
    while remaining > 0 {
        let want = remaining.min(chunk.len() as u64) as usize;
        source.read_exact(&mut chunk[..want])?;
        hasher.update(&chunk[..want]);
        remaining -= want as u64;
    }
    let computed = hasher.finalize();

    let mut trailer = [0u8; 4];
    source.read_exact(&mut trailer)?;
    let mut stored = u32::from_ne_bytes(trailer);
    if reverse {
        stored = stored.swap_bytes();
    }

    if computed != stored {
        return Err(ModelError::inconsistent(format!(
            "checksum mismatch: stored {stored:08x}, computed {computed:08x}"
        )));
    }

    Ok(())
}
