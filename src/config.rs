//! Compile-time configuration constants for the archive container format and
//! the write pool.

/// Logical cluster size: every device image is written in units of this size.
pub const CLUSTER: usize = 65536;

/// Sub-cluster granularity covered by one bit of an extent's block bitmap.
/// Sixteen blocks make up one cluster (`CLUSTER / BLOCK == 16`).
pub const BLOCK: usize = 4096;

/// Number of blocks per cluster.
pub const BLOCKS_PER_CLUSTER: usize = CLUSTER / BLOCK;

/// Size in bytes of the fixed archive header region (offset 0).
pub const HEADER_SIZE: usize = 12288;

/// Size in bytes of one extent header.
pub const EXTENT_HEADER_SIZE: usize = 512;

/// Maximum number of clusters a single extent header can describe.
pub const EXTENT_MAX_CLUSTERS: usize = 59;

/// Number of device slots in the archive header's device table. Slot 0 is
/// reserved; device ids range from 1 to 255.
pub const DEVICE_SLOTS: usize = 256;

/// Minimum number of write-pool worker threads, regardless of the host's
/// reported parallelism.
pub const WORKER_COUNT_MIN: usize = 2;

/// The write pool's bounded job queue holds `QUEUE_MULTIPLIER * worker_count`
/// jobs before `submit` blocks the producer.
pub const QUEUE_MULTIPLIER: usize = 4;
