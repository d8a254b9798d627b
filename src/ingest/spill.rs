//! Disk spill-over for larger-than-memory sources
//!
//! A source larger than the in-memory threshold is written to a temporary
//! file so downstream consumers can take multiple sequential passes without
//! re-fetching from the original transport. The temp file lives exactly as
//! long as the buffer value and is removed on drop, on every exit path.

use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

enum Backing {
    Memory(Vec<u8>),
    Disk(NamedTempFile),
}

pub struct SpillBuffer {
    backing: Backing,
    len: u64,
}

impl SpillBuffer {
    /// Drain `reader` completely, keeping up to `threshold` bytes in memory
    /// before spilling everything to a temp file.
    pub fn from_reader(mut reader: impl Read, threshold: usize) -> Result<Self> {
        let mut memory: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 64 * 1024];

        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                let len = memory.len() as u64;
                return Ok(Self {
                    backing: Backing::Memory(memory),
                    len,
                });
            }
            memory.extend_from_slice(&chunk[..read]);
            if memory.len() > threshold {
                return Self::spill(memory, reader);
            }
        }
    }

    fn spill(buffered: Vec<u8>, mut reader: impl Read) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&buffered)?;
        let copied = std::io::copy(&mut reader, file.as_file_mut())?;
        let len = buffered.len() as u64 + copied;
        tracing::debug!(bytes = len, path = %file.path().display(), "source spilled to disk");
        file.as_file_mut().flush()?;
        Ok(Self {
            backing: Backing::Disk(file),
            len,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    /// Open a fresh reader over the full contents. May be called repeatedly;
    /// each reader starts from the beginning.
    pub fn reader(&self) -> Result<Box<dyn Read + Send>> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Backing::Disk(file) => {
                let mut handle: File = file.as_file().try_clone()?;
                handle.seek(SeekFrom::Start(0))?;
                Ok(Box::new(BufReader::new(handle)))
            }
        }
    }
}
