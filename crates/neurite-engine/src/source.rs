//! Byte sources backing model and dataset files
//!
//! A uniform reader over either an open file or a caller-owned contiguous
//! buffer. Buffer-backed sources track their cursor explicitly, refuse
//! out-of-range seeks and expose their raw bytes so the codec can alias
//! immutable payload sections instead of copying them. Without the `std`
//! feature the abstraction reduces to the buffer variant.

use std::io::SeekFrom;

use crate::error::{ModelError, Result};

#[cfg(feature = "std")]
use std::io::{Read, Seek};

/// Uniform reader over a file handle or an in-memory buffer
#[derive(Debug)]
pub enum ByteSource<'a> {
    /// Caller-owned contiguous buffer with an explicit cursor
    Buffer {
        /// File bytes
        data: &'a [u8],
        /// Current cursor position
        pos: usize,
    },

    /// Open file handle
    #[cfg(feature = "std")]
    File {
        /// Underlying handle
        file: std::fs::File,
        /// Total size, captured at open time
        size: u64,
    },
}

impl<'a> ByteSource<'a> {
    /// Open a file-backed source by path
    #[cfg(feature = "std")]
    pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<ByteSource<'static>> {
        let mut file =
            std::fs::File::open(path).map_err(|source| ModelError::OpenFile { source })?;

        let size = file
            .seek(SeekFrom::End(0))
            .map_err(|source| ModelError::OpenFile { source })?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| ModelError::OpenFile { source })?;

        Ok(ByteSource::File { file, size })
    }

    /// Wrap a caller-owned buffer
    pub fn from_buffer(data: &'a [u8]) -> Self {
        ByteSource::Buffer { data, pos: 0 }
    }

    /// Reposition the cursor, returning the new position.
    ///
    /// Buffer-backed sources refuse seeks outside `0..=size`.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        match self {
            ByteSource::Buffer { data, pos } => {
                let target = match from {
                    SeekFrom::Start(offset) => offset as i64,
                    SeekFrom::Current(offset) => *pos as i64 + offset,
                    SeekFrom::End(offset) => data.len() as i64 + offset,
                };
                Self::buffer_seek(data, pos, target)
            }
            #[cfg(feature = "std")]
            ByteSource::File { file, .. } => file.seek(from).map_err(|_| ModelError::ReadFile {
                offset: match from {
                    SeekFrom::Start(offset) => offset,
                    _ => 0,
                },
            }),
        }
    }

    fn buffer_seek(data: &[u8], pos: &mut usize, target: i64) -> Result<u64> {
        if target < 0 || target > data.len() as i64 {
            return Err(ModelError::ReadFile {
                offset: target.max(0) as u64,
            });
        }
        *pos = target as usize;
        Ok(*pos as u64)
    }

    /// Current cursor position from the start of the source
    pub fn pos(&mut self) -> Result<u64> {
        match self {
            ByteSource::Buffer { pos, .. } => Ok(*pos as u64),
            #[cfg(feature = "std")]
            ByteSource::File { file, .. } => file
                .stream_position()
                .map_err(|_| ModelError::ReadFile { offset: 0 }),
        }
    }

    /// Read up to `buf.len()` bytes, returning the short count at EOF
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            ByteSource::Buffer { data, pos } => {
                let available = data.len() - *pos;
                let count = buf.len().min(available);
                buf[..count].copy_from_slice(&data[*pos..*pos + count]);
                *pos += count;
                Ok(count)
            }
            #[cfg(feature = "std")]
            ByteSource::File { file, .. } => {
                let mut total = 0;
                while total < buf.len() {
                    match file.read(&mut buf[total..]) {
                        Ok(0) => break,
                        Ok(n) => total += n,
                        Err(_) => return Err(ModelError::ReadFile { offset: total as u64 }),
                    }
                }
                Ok(total)
            }
        }
    }

    /// Read exactly `buf.len()` bytes or fail with a read error
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let offset = self.pos()?;
        if self.read(buf)? != buf.len() {
            return Err(ModelError::ReadFile { offset });
        }
        Ok(())
    }

    /// Raw backing bytes; available for buffer-backed sources only
    pub fn raw_data(&self) -> Option<&'a [u8]> {
        match self {
            ByteSource::Buffer { data, .. } => Some(data),
            #[cfg(feature = "std")]
            ByteSource::File { .. } => None,
        }
    }

    /// Total size of the source in bytes
    pub fn size(&self) -> u64 {
        match self {
            ByteSource::Buffer { data, .. } => data.len() as u64,
            #[cfg(feature = "std")]
            ByteSource::File { size, .. } => *size,
        }
    }
}
