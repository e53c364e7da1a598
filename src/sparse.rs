//! Per-device sparse output writer.
//!
//! Each `place()` call already has the whole cluster buffer in hand, so it
//! scans once for contiguous non-zero runs (word-at-a-time) and issues one
//! `seek` + `write_all` per run, leaving zero runs untouched so the file's
//! sparse hole (created by `File::set_len` at construction) stands. Conflict
//! detection reads the cluster's current on-disk bytes back rather than
//! keeping per-cluster state, so a writer's memory footprint stays flat no
//! matter how many clusters the device has.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CLUSTER;
use crate::error::{VmaError, VmaResult};
use crate::extent::ClusterData;

struct Inner {
    file: File,
}

pub struct SparseWriter {
    inner: Mutex<Inner>,
    path: PathBuf,
    device_id: u8,
    size: u64,
    bytes_written: Arc<AtomicU64>,
}

impl SparseWriter {
    /// Opens `path` for writing and pre-sizes it to `size` bytes. On
    /// filesystems with sparse-file support this allocates no physical
    /// blocks; elsewhere the file is simply zero-filled by the OS.
    pub fn create(path: impl Into<PathBuf>, device_id: u8, size: u64) -> VmaResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| VmaError::Resource {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        file.set_len(size).map_err(|e| VmaError::Resource {
            path: path.clone(),
            detail: format!("set_len({size}) failed: {e}"),
        })?;

        Ok(SparseWriter {
            inner: Mutex::new(Inner { file }),
            path,
            device_id,
            size,
            bytes_written: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn bytes_written_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_written)
    }

    /// Places one logical cluster. `cluster_index` must already be known to
    /// be within the device's cluster count (checked by the caller, which
    /// has the device table). The final cluster of a device whose size is
    /// not a multiple of `CLUSTER` is clamped to the remaining tail length.
    ///
    /// Conflict detection reads back the bytes currently on disk at this
    /// cluster's offset rather than keeping a per-cluster digest cache, so
    /// memory stays bounded by `CLUSTER` regardless of how many distinct
    /// clusters the device has. A region that reads back as all zero is
    /// treated as not-yet-written, since that's indistinguishable from an
    /// untouched hole on a pre-sized sparse file: placing a second, different
    /// value over a cluster that was itself placed as all zero is the one
    /// conflict shape this can't catch.
    pub fn place(&self, cluster_index: u32, data: &ClusterData) -> VmaResult<()> {
        let offset = cluster_index as u64 * CLUSTER as u64;
        let len = (self.size.saturating_sub(offset)).min(CLUSTER as u64) as usize;
        if len == 0 {
            return Ok(());
        }

        let mut inner = self.inner.lock().unwrap();

        let mut existing = vec![0u8; len];
        inner
            .file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| VmaError::io(self.path.clone(), Some(offset), e))?;
        inner
            .file
            .read_exact(&mut existing)
            .map_err(|e| VmaError::io(self.path.clone(), Some(offset), e))?;
        let existing_is_zero = existing.iter().all(|&b| b == 0);

        let matches_existing = match data {
            ClusterData::AllZero => existing_is_zero,
            ClusterData::Present(buf) => existing == buf[..len],
        };
        if matches_existing {
            return Ok(());
        }
        if !existing_is_zero {
            return Err(VmaError::Conflict {
                device_id: self.device_id,
                cluster_index,
            });
        }

        if let ClusterData::Present(buf) = data {
            write_sparse_at(&mut inner.file, &self.path, offset, &buf[..len])?;
        }

        self.bytes_written.fetch_add(len as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Flushes the file and confirms its final length matches the declared
    /// device size.
    pub fn finalize(&self) -> VmaResult<()> {
        let inner = self.inner.lock().unwrap();
        inner.file.sync_all().map_err(|e| VmaError::io(self.path.clone(), None, e))?;
        let actual = inner
            .file
            .metadata()
            .map_err(|e| VmaError::io(self.path.clone(), None, e))?
            .len();
        if actual != self.size {
            return Err(VmaError::Resource {
                path: self.path.clone(),
                detail: format!("final length {actual} does not match declared size {}", self.size),
            });
        }
        Ok(())
    }
}

fn write_sparse_at(file: &mut File, path: &Path, base_offset: u64, buf: &[u8]) -> VmaResult<()> {
    const WORD: usize = mem::size_of::<usize>();
    let aligned_len = buf.len() - buf.len() % WORD;
    let mut run_start: Option<usize> = None;

    let mut flush = |file: &mut File, start: usize, end: usize| -> VmaResult<()> {
        file.seek(SeekFrom::Start(base_offset + start as u64))
            .map_err(|e| VmaError::io(path.to_path_buf(), Some(base_offset + start as u64), e))?;
        file.write_all(&buf[start..end])
            .map_err(|e| VmaError::io(path.to_path_buf(), Some(base_offset + start as u64), e))?;
        Ok(())
    };

    let mut pos = 0usize;
    while pos < aligned_len {
        let word = usize::from_ne_bytes(buf[pos..pos + WORD].try_into().unwrap());
        if word == 0 {
            if let Some(start) = run_start.take() {
                flush(file, start, pos)?;
            }
        } else if run_start.is_none() {
            run_start = Some(pos);
        }
        pos += WORD;
    }
    for i in aligned_len..buf.len() {
        if buf[i] == 0 {
            if let Some(start) = run_start.take() {
                flush(file, start, i)?;
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    if let Some(start) = run_start.take() {
        flush(file, start, buf.len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_file(path: &Path) -> Vec<u8> {
        let mut f = File::open(path).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn creates_presized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let writer = SparseWriter::create(&path, 1, 131072).unwrap();
        writer.finalize().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 131072);
    }

    #[test]
    fn writes_present_cluster_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let writer = SparseWriter::create(&path, 1, 131072).unwrap();
        let buf = vec![0xAAu8; CLUSTER];
        writer.place(0, &ClusterData::Present(buf.clone())).unwrap();
        writer.place(1, &ClusterData::AllZero).unwrap();
        writer.finalize().unwrap();

        let out = read_file(&path);
        assert_eq!(&out[..CLUSTER], &buf[..]);
        assert!(out[CLUSTER..].iter().all(|&b| b == 0));
    }

    #[test]
    fn idempotent_rewrite_with_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let writer = SparseWriter::create(&path, 1, CLUSTER as u64).unwrap();
        let buf = vec![0x11u8; CLUSTER];
        writer.place(0, &ClusterData::Present(buf.clone())).unwrap();
        writer.place(0, &ClusterData::Present(buf)).unwrap();
    }

    #[test]
    fn conflicting_rewrite_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let writer = SparseWriter::create(&path, 3, CLUSTER as u64).unwrap();
        writer
            .place(0, &ClusterData::Present(vec![0x11u8; CLUSTER]))
            .unwrap();
        let err = writer
            .place(0, &ClusterData::Present(vec![0x22u8; CLUSTER]))
            .unwrap_err();
        match err {
            VmaError::Conflict { device_id, cluster_index } => {
                assert_eq!(device_id, 3);
                assert_eq!(cluster_index, 0);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn partial_final_cluster_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let size = CLUSTER as u64 + 100;
        let writer = SparseWriter::create(&path, 1, size).unwrap();
        writer
            .place(1, &ClusterData::Present(vec![0x33u8; CLUSTER]))
            .unwrap();
        writer.finalize().unwrap();

        let out = read_file(&path);
        assert_eq!(out.len(), size as usize);
        assert!(out[CLUSTER..].iter().all(|&b| b == 0x33));
    }

    #[test]
    fn finalize_fails_if_truncated_externally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scsi0.raw");
        let writer = SparseWriter::create(&path, 1, CLUSTER as u64).unwrap();
        std::fs::File::create(&path).unwrap().set_len(10).unwrap();
        let err = writer.finalize().unwrap_err();
        assert!(matches!(err, VmaError::Resource { .. }));
    }
}
