//! Top-level orchestrator.
//!
//! [`extract`] is the library's single public entry point, mirroring a
//! `extract(source_path, output_dir, options)` contract: open the archive,
//! parse and verify the header, write config blobs, then stream extents
//! through a bounded write pool until the source is exhausted, finalizing
//! every device image before returning. The output directory is assumed to
//! already exist and be writable — creation and overwrite policy live in
//! the CLI layer, not here.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{VmaError, VmaResult};
use crate::extent::{self, ClusterPlacement};
use crate::header::{self, ArchiveDescriptor};
use crate::md5::IntegrityChecker;
use crate::pool::{Job, WritePool};
use crate::progress::{Progress, ProgressReporter};
use crate::source::ByteSource;
use crate::sparse::SparseWriter;

/// Tuning and behavior knobs for one extraction run.
pub struct Options {
    /// Disable MD5 verification. Digest bytes are still consumed from the
    /// stream so position bookkeeping is unaffected.
    pub skip_hash: bool,
    /// Worker thread count; `None` defaults to available parallelism.
    pub worker_count: Option<usize>,
    /// Called at most once per wall-clock second with an aggregate
    /// progress snapshot, plus once more at the very end.
    pub progress_sink: Option<Box<dyn FnMut(&Progress) + Send>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            skip_hash: false,
            worker_count: None,
            progress_sink: None,
        }
    }
}

/// What was produced by a successful extraction.
#[derive(Debug, Clone)]
pub struct Summary {
    pub uuid: [u8; 16],
    pub ctime: u64,
    pub devices: Vec<(String, u64)>,
    pub configs: Vec<String>,
}

/// Extracts the archive at `source_path` into `output_dir`.
pub fn extract(source_path: impl AsRef<Path>, output_dir: impl AsRef<Path>, options: Options) -> VmaResult<Summary> {
    let mut options = options;
    let output_dir = output_dir.as_ref();
    let checker = IntegrityChecker::new(options.skip_hash);

    let mut source = ByteSource::open(source_path)?;
    let descriptor = header::decode(&mut source, &checker)?;

    write_configs(&descriptor, output_dir)?;
    let writers = create_writers(&descriptor, output_dir)?;

    let pool = WritePool::new(options.worker_count)?;
    let mut reporter = ProgressReporter::new(source.bytes_read_counter());
    for writer in writers.values() {
        reporter.track_writer(writer.bytes_written_counter());
    }

    let result = stream_extents(&mut source, &checker, &descriptor, &writers, &pool, &mut reporter, &mut options);

    if let Err(e) = result {
        let _ = pool.join();
        return Err(e);
    }

    pool.join()?;
    for writer in writers.values() {
        writer.finalize()?;
    }

    emit(&mut reporter, &mut options);

    Ok(Summary {
        uuid: descriptor.uuid,
        ctime: descriptor.ctime,
        devices: descriptor.devices.iter().map(|d| (d.name.clone(), d.size)).collect(),
        configs: descriptor.configs.iter().map(|c| c.name.clone()).collect(),
    })
}

fn write_configs(descriptor: &ArchiveDescriptor, output_dir: &Path) -> VmaResult<()> {
    for config in &descriptor.configs {
        let path = output_dir.join(&config.name);
        fs::write(&path, &config.data).map_err(|e| VmaError::Resource {
            path,
            detail: e.to_string(),
        })?;
    }
    Ok(())
}

fn create_writers(descriptor: &ArchiveDescriptor, output_dir: &Path) -> VmaResult<HashMap<u8, Arc<SparseWriter>>> {
    let mut writers = HashMap::new();
    for device in &descriptor.devices {
        let path = output_dir.join(format!("{}.raw", device.name));
        let writer = SparseWriter::create(path, device.id, device.size)?;
        writers.insert(device.id, Arc::new(writer));
    }
    Ok(writers)
}

fn stream_extents(
    source: &mut ByteSource,
    checker: &IntegrityChecker,
    descriptor: &ArchiveDescriptor,
    writers: &HashMap<u8, Arc<SparseWriter>>,
    pool: &WritePool,
    reporter: &mut ProgressReporter,
    options: &mut Options,
) -> VmaResult<()> {
    while let Some(placements) = extent::decode_next(source, checker)? {
        for placement in placements {
            dispatch(placement, descriptor, writers, pool, source.position())?;
        }
        emit_if_due(reporter, options);
    }
    Ok(())
}

fn dispatch(
    placement: ClusterPlacement,
    descriptor: &ArchiveDescriptor,
    writers: &HashMap<u8, Arc<SparseWriter>>,
    pool: &WritePool,
    offset: u64,
) -> VmaResult<()> {
    let device = descriptor.device(placement.device_id).ok_or_else(|| {
        VmaError::format(offset, format!("extent references unknown device id {}", placement.device_id))
    })?;
    if placement.cluster_index >= device.cluster_count {
        return Err(VmaError::format(
            offset,
            format!(
                "cluster index {} out of range for device {} (cluster count {})",
                placement.cluster_index, device.name, device.cluster_count
            ),
        ));
    }
    let writer = writers
        .get(&placement.device_id)
        .expect("writer created for every device in the descriptor");
    pool.submit(Job {
        writer: Arc::clone(writer),
        placement,
    });
    Ok(())
}

fn emit_if_due(reporter: &mut ProgressReporter, options: &mut Options) {
    if let Some(progress) = reporter.poll() {
        if let Some(sink) = options.progress_sink.as_mut() {
            sink(&progress);
        }
    }
}

fn emit(reporter: &mut ProgressReporter, options: &mut Options) {
    let progress = reporter.snapshot();
    if let Some(sink) = options.progress_sink.as_mut() {
        sink(&progress);
    }
}
