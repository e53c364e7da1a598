//! Extent stream decoding.
//!
//! One extent is a 512-byte fixed header (magic, block bitmap, stored MD5,
//! padding), a 59-entry cluster descriptor table, and a payload whose size is
//! derived from the bitmap's popcount. Both fixed-size tables are declared as
//! `binrw` structs, the same way `header.rs` declares the archive header,
//! rather than hand-sliced.
//!
//! The 472-byte descriptor table does not fit alongside the bitmap and MD5
//! inside the declared 512-byte `EXTENT_HEADER_SIZE` region (140 bytes of
//! fixed fields leave only 372 bytes of padding for a table that needs 472).
//! This decoder treats `EXTENT_HEADER_SIZE` as covering only the fixed
//! prefix (magic, reserved, bitmap, md5sum, pad) and reads the descriptor
//! table as a second, always-472-byte region immediately following it,
//! before the payload. See DESIGN.md for the full resolution.

use std::io::Cursor;

use binrw::BinRead;

use crate::config::{BLOCK, EXTENT_HEADER_SIZE, EXTENT_MAX_CLUSTERS};
use crate::error::{ChecksumRegion, VmaError, VmaResult};
use crate::md5::IntegrityChecker;
use crate::source::ByteSource;

pub const MAGIC: [u8; 4] = *b"VMAE";

const FIXED_PREFIX_LEN: usize = 4 + 2 + EXTENT_MAX_CLUSTERS * 2 + 16; // 140
const PAD_LEN: usize = EXTENT_HEADER_SIZE - FIXED_PREFIX_LEN; // 372
const DESCRIPTOR_TABLE_LEN: usize = EXTENT_MAX_CLUSTERS * 8; // 472
const MD5_FIELD_OFFSET: usize = 4 + 2 + EXTENT_MAX_CLUSTERS * 2; // 124

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct ExtentFixed {
    magic: [u8; 4],
    #[br(pad_before = 0)]
    _reserved1: u16,
    #[br(count = EXTENT_MAX_CLUSTERS)]
    block_masks: Vec<u16>,
    md5sum: [u8; 16],
    #[br(count = PAD_LEN)]
    _pad: Vec<u8>,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
struct ClusterDescriptorRaw {
    device_tag: u32,
    cluster_index: u32,
}

/// A single decoded placement: either skip the write entirely (the
/// pre-sized sparse file is already zero there) or write a full
/// `CLUSTER`-sized buffer.
#[derive(Debug, Clone)]
pub enum ClusterData {
    AllZero,
    Present(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ClusterPlacement {
    pub device_id: u8,
    pub cluster_index: u32,
    pub data: ClusterData,
}

/// Reads the next extent from `source`. Returns `Ok(None)` at a clean EOF
/// between extents (the normal end of the stream). Device-id and
/// cluster-index bounds are not validated here since this decoder has no
/// access to the device table; [`crate::extractor`] validates placements
/// against the parsed [`crate::header::ArchiveDescriptor`].
pub fn decode_next(
    source: &mut ByteSource,
    checker: &IntegrityChecker,
) -> VmaResult<Option<Vec<ClusterPlacement>>> {
    let header_offset = source.position();
    let raw_header = source.read_some(EXTENT_HEADER_SIZE)?;
    if raw_header.is_empty() {
        return Ok(None);
    }
    if raw_header.len() != EXTENT_HEADER_SIZE {
        return Err(VmaError::format(header_offset, "truncated extent header"));
    }

    let mut cursor = Cursor::new(&raw_header[..]);
    let fixed = ExtentFixed::read(&mut cursor)
        .map_err(|e| VmaError::format(header_offset, format!("malformed extent header: {e}")))?;

    if fixed.magic != MAGIC {
        return Err(VmaError::format(header_offset, "extent magic mismatch"));
    }

    let descriptor_offset = source.position();
    let raw_descriptors = source.read_exact(DESCRIPTOR_TABLE_LEN)?;
    let mut descriptors = Vec::with_capacity(EXTENT_MAX_CLUSTERS);
    {
        let mut cursor = Cursor::new(&raw_descriptors[..]);
        for i in 0..EXTENT_MAX_CLUSTERS {
            let d = ClusterDescriptorRaw::read(&mut cursor).map_err(|e| {
                VmaError::format(
                    descriptor_offset + (i * 8) as u64,
                    format!("malformed cluster descriptor: {e}"),
                )
            })?;
            let device_id = (d.device_tag & 0xFF) as u8;
            if device_id == 0 {
                break;
            }
            descriptors.push((device_id, d.cluster_index));
        }
    }

    let active_count = descriptors.len();
    let payload_blocks: u32 = fixed.block_masks[..active_count]
        .iter()
        .map(|m| m.count_ones())
        .sum();
    let payload_size = payload_blocks as usize * BLOCK;

    let payload_offset = source.position();
    let payload = source.read_exact(payload_size)?;

    let computed = {
        use md5::{Digest, Md5};
        let mut hasher = Md5::new();
        hasher.update(&raw_header[..MD5_FIELD_OFFSET]);
        hasher.update([0u8; 16]);
        hasher.update(&raw_header[MD5_FIELD_OFFSET + 16..]);
        hasher.update(&raw_descriptors);
        hasher.update(&payload);
        let out: [u8; 16] = hasher.finalize().into();
        out
    };
    if !checker.verify(&fixed.md5sum, &computed) {
        return Err(VmaError::Checksum {
            region: ChecksumRegion::Extent,
            offset: header_offset + MD5_FIELD_OFFSET as u64,
            expected: fixed.md5sum,
            computed,
        });
    }

    let mut placements = Vec::with_capacity(active_count);
    let mut payload_cursor = 0usize;
    for (i, (device_id, cluster_index)) in descriptors.into_iter().enumerate() {
        let mask = fixed.block_masks[i];
        if mask == 0 {
            placements.push(ClusterPlacement {
                device_id,
                cluster_index,
                data: ClusterData::AllZero,
            });
            continue;
        }
        let mut buf = vec![0u8; crate::config::CLUSTER];
        for block_idx in 0..crate::config::BLOCKS_PER_CLUSTER {
            if mask & (1u16 << block_idx) != 0 {
                let src = payload
                    .get(payload_cursor..payload_cursor + BLOCK)
                    .ok_or_else(|| {
                        VmaError::format(payload_offset, "extent payload shorter than its own bitmap declares")
                    })?;
                buf[block_idx * BLOCK..(block_idx + 1) * BLOCK].copy_from_slice(src);
                payload_cursor += BLOCK;
            }
        }
        placements.push(ClusterPlacement {
            device_id,
            cluster_index,
            data: ClusterData::Present(buf),
        });
    }

    Ok(Some(placements))
}
