//! Random-access reader over the archive file.
//!
//! `ByteSource` is the sole reader during an extraction: [`crate::extractor::extract`]
//! drives it from offset 0 through the header, then through a sequence of
//! extents until EOF. It exposes a monotonic, forward-only cursor; nothing
//! in the extraction path needs to rewind it.
//!
//! Not thread-safe — callers must not share a `ByteSource` across threads.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{VmaError, VmaResult};

pub struct ByteSource {
    file: File,
    path: PathBuf,
    cursor: u64,
    bytes_read: Arc<AtomicU64>,
}

impl ByteSource {
    /// Opens `path` for reading. Fails with [`VmaError::Io`] if the file
    /// cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> VmaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| VmaError::io(path.clone(), None, e))?;
        Ok(ByteSource {
            file,
            path,
            cursor: 0,
            bytes_read: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Shared counter of bytes read so far, polled by [`crate::progress::ProgressReporter`].
    pub fn bytes_read_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }

    /// Current stream position.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Reads exactly `len` bytes starting at the current cursor and advances
    /// it by `len`. Fails with `UnexpectedEof` if the file ends first.
    pub fn read_exact(&mut self, len: usize) -> VmaResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| VmaError::io(self.path.clone(), Some(self.cursor), e))?;
        self.cursor += len as u64;
        self.bytes_read.fetch_add(len as u64, Ordering::Relaxed);
        Ok(buf)
    }

    /// Reads up to `len` bytes; returns fewer than `len` only at true EOF
    /// (unlike [`Self::read_exact`], this does not treat a short read as an
    /// error). Used by the extent loop to detect end-of-stream between
    /// extents.
    pub fn read_some(&mut self, len: usize) -> VmaResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut total = 0usize;
        loop {
            let n = self
                .file
                .read(&mut buf[total..])
                .map_err(|e| VmaError::io(self.path.clone(), Some(self.cursor), e))?;
            if n == 0 {
                break;
            }
            total += n;
            if total == len {
                break;
            }
        }
        buf.truncate(total);
        self.cursor += total as u64;
        self.bytes_read.fetch_add(total as u64, Ordering::Relaxed);
        Ok(buf)
    }
}
