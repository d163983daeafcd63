//! Stream dataset reader
//!
//! Reads training-compatible sample vectors out of the binary dataset
//! format (header type byte 1) for harness and verification use. A dataset
//! file carries the common binary header, eight metadata bytes of which
//! the leading four give the end-of-data position, raw f32 sample vectors
//! up to that position, and a trailing u32 sample dimension stored at the
//! end-of-data position. Byte-swapped files are honored through the same
//! byte-order mark used by model files. Not required for inference.

#![deny(missing_docs)]
#![warn(clippy::all)]

use std::io::SeekFrom;

use neurite_engine::format::{self, FileType};
use neurite_engine::{ByteSource, ModelError, Result};

/// Metadata bytes between the common header and the first sample
const METADATA_SIZE: u64 = 8;

/// Line-by-line reader over a binary dataset file
#[derive(Debug)]
pub struct Dataset<'a> {
    source: ByteSource<'a>,
    end_data_pos: u32,
    sample_dim: u32,
    reverse_byte_order: bool,
}

impl<'a> Dataset<'a> {
    /// Open a dataset from a byte source, validating its header and
    /// reading the sample geometry. The cursor is left on the first sample.
    pub fn open(mut source: ByteSource<'a>) -> Result<Self> {
        let reverse_byte_order = format::check_file_header(&mut source, FileType::Dataset)?;

        source
            .seek(SeekFrom::Start(format::HEADER_SIZE))
            .map_err(|_| ModelError::bad_format("dataset metadata is unreachable"))?;

        let mut raw = [0u8; 4];
        source.read_exact(&mut raw)?;
        let mut end_data_pos = u32::from_ne_bytes(raw);
        if reverse_byte_order {
            end_data_pos = end_data_pos.swap_bytes();
        }

        source
            .seek(SeekFrom::Start(u64::from(end_data_pos)))
            .map_err(|_| ModelError::bad_format("sample dimension trailer is unreachable"))?;

        source.read_exact(&mut raw)?;
        let mut sample_dim = u32::from_ne_bytes(raw);
        if reverse_byte_order {
            sample_dim = sample_dim.swap_bytes();
        }

        source
            .seek(SeekFrom::Start(format::HEADER_SIZE + METADATA_SIZE))
            .map_err(|_| ModelError::bad_format("sample data is unreachable"))?;

        log::debug!(
            "opened dataset: {sample_dim} floats per sample, data ends at {end_data_pos}"
        );

        Ok(Self {
            source,
            end_data_pos,
            sample_dim,
            reverse_byte_order,
        })
    }

    /// Open a dataset file by path
    #[cfg(feature = "std")]
    pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<Dataset<'static>> {
        Dataset::open(ByteSource::open_path(path)?)
    }

    /// Number of floats in one stored sample, the bias slot not included
    pub fn sample_dim(&self) -> u32 {
        self.sample_dim
    }

    /// Read the next sample into `buf`, appending the 1.0 bias slot.
    ///
    /// `buf` must hold at least `sample_dim + 1` floats. Returns `false`
    /// once the end of the data region has been reached.
    pub fn read_sample(&mut self, buf: &mut [f32]) -> Result<bool> {
        let dim = self.sample_dim as usize;
        if buf.len() < dim + 1 {
            return Err(ModelError::bad_argument(format!(
                "sample buffer holds {} floats, {} are needed",
                buf.len(),
                dim + 1
            )));
        }

        if self.source.pos()? >= u64::from(self.end_data_pos) {
            return Ok(false);
        }

        let mut raw = [0u8; 4];
        for slot in &mut buf[..dim] {
            self.source.read_exact(&mut raw)?;
            let mut bits = u32::from_ne_bytes(raw);
            if self.reverse_byte_order {
                bits = bits.swap_bytes();
            }
            *slot = f32::from_bits(bits);
        }

        buf[dim] = 1.0;
        Ok(true)
    }
}
