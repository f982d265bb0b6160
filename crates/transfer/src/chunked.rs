use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Splits a file into sequentially numbered chunks.
///
/// The final chunk is flagged `is_last`. An empty file yields exactly one
/// empty chunk so the receiver still learns where the transfer ends.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    next_number: u64,
    offset: u64,
    file_size: u64,
    finished: bool,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (1 MiB) is used.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            next_number: 0,
            offset: 0,
            file_size,
            finished: false,
        })
    }

    /// Reads the next chunk. Returns `None` once the last chunk was returned.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.finished {
            return Ok(None);
        }

        let remaining = self.remaining();
        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        self.offset += read_size as u64;
        let is_last = self.remaining() == 0;
        self.finished = is_last;

        let chunk = Chunk::new(self.next_number, buf, is_last);
        self.next_number += 1;
        Ok(Some(chunk))
    }

    /// Total number of chunks this file splits into.
    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64).max(1)
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}

// ---------------------------------------------------------------------------
// ChunkWriter
// ---------------------------------------------------------------------------

/// Reassembles a file from chunks delivered in sequence order.
pub struct ChunkWriter {
    path: PathBuf,
    out: BufWriter<File>,
    next_number: u64,
    written: u64,
}

impl ChunkWriter {
    /// Creates (or truncates) the output file at `path`.
    ///
    /// Intermediate directories are created as needed.
    pub fn create(path: &Path) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            next_number: 0,
            written: 0,
        })
    }

    /// Appends `chunk`, which must be the next one in sequence.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<(), TransferError> {
        if chunk.number != self.next_number {
            return Err(TransferError::OutOfOrderChunk {
                expected: self.next_number,
                got: chunk.number,
            });
        }

        self.out.write_all(&chunk.data)?;
        self.written += chunk.size() as u64;
        self.next_number += 1;
        Ok(())
    }

    /// Flushes buffered data and syncs the file to disk.
    ///
    /// Returns the total number of bytes written.
    pub fn finish(mut self) -> Result<u64, TransferError> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(self.written)
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the output path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
