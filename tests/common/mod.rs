//! Shared synthetic-archive builder for integration tests.
//!
//! Builds a minimal but wire-valid VMA archive byte buffer: one fixed header
//! (device table + optional config blobs) followed by zero or more extents,
//! each with correctly computed MD5 digests, so tests can exercise
//! [`vma_extract::extract`] end-to-end without a real Proxmox encoder.

use vma_extract::config::{BLOCK, CLUSTER, EXTENT_HEADER_SIZE, EXTENT_MAX_CLUSTERS, HEADER_SIZE};
use vma_extract::{extent, header};

const MD5_FIELD_OFFSET: usize = 0x20;
const DEVICE_TABLE_OFFSET: usize = 0x38;
const DEVICE_SLOT_SIZE: usize = 12;
const EXTENT_MD5_FIELD_OFFSET: usize = 4 + 2 + EXTENT_MAX_CLUSTERS * 2;
const DESCRIPTOR_TABLE_LEN: usize = EXTENT_MAX_CLUSTERS * 8;

/// One placement in a synthetic extent: `None` payload means "mark absent".
pub type PlacementSpec = (u8, u32, Option<Vec<u8>>);

pub fn build_archive(
    devices: &[(&str, u64)],
    configs: &[(&str, &[u8])],
    extents: &[Vec<PlacementSpec>],
) -> Vec<u8> {
    let mut blob_buffer = Vec::new();
    blob_buffer.extend_from_slice(&0u16.to_be_bytes());
    let push_blob = |buf: &mut Vec<u8>, data: &[u8]| -> u32 {
        let off = buf.len() as u32;
        buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
        buf.extend_from_slice(data);
        off
    };

    let mut header_bytes = vec![0u8; HEADER_SIZE];
    header_bytes[0..4].copy_from_slice(&header::MAGIC);
    header_bytes[4..8].copy_from_slice(&header::SUPPORTED_VERSION.to_be_bytes());

    for (i, (name, size)) in devices.iter().enumerate() {
        let slot = DEVICE_TABLE_OFFSET + (i + 1) * DEVICE_SLOT_SIZE;
        let name_off = push_blob(&mut blob_buffer, name.as_bytes());
        header_bytes[slot..slot + 8].copy_from_slice(&size.to_be_bytes());
        header_bytes[slot + 8..slot + 12].copy_from_slice(&name_off.to_be_bytes());
    }

    let device_table_end = DEVICE_TABLE_OFFSET + 256 * DEVICE_SLOT_SIZE;
    let mut pos = device_table_end;
    for (name, data) in configs {
        let name_off = push_blob(&mut blob_buffer, name.as_bytes());
        let data_off = push_blob(&mut blob_buffer, data);
        header_bytes[pos..pos + 4].copy_from_slice(&name_off.to_be_bytes());
        header_bytes[pos + 4..pos + 8].copy_from_slice(&data_off.to_be_bytes());
        pos += 8;
    }

    let blob_buffer_offset = (HEADER_SIZE - blob_buffer.len()) as u32;
    header_bytes[0x30..0x34].copy_from_slice(&blob_buffer_offset.to_be_bytes());
    header_bytes[0x34..0x38].copy_from_slice(&(blob_buffer.len() as u32).to_be_bytes());
    header_bytes[blob_buffer_offset as usize..].copy_from_slice(&blob_buffer);

    let md5 = vma_extract::md5::digest_with_zeroed_range(&header_bytes, MD5_FIELD_OFFSET..MD5_FIELD_OFFSET + 16);
    header_bytes[MD5_FIELD_OFFSET..MD5_FIELD_OFFSET + 16].copy_from_slice(&md5);

    let mut archive = header_bytes;
    for ext in extents {
        archive.extend_from_slice(&build_extent(ext));
    }
    archive
}

pub fn build_extent(clusters: &[PlacementSpec]) -> Vec<u8> {
    let mut masks = vec![0u16; EXTENT_MAX_CLUSTERS];
    let mut descriptors = vec![0u8; DESCRIPTOR_TABLE_LEN];
    let mut payload = Vec::new();

    for (i, (device_id, cluster_index, data)) in clusters.iter().enumerate() {
        let mask = match data {
            None => 0u16,
            Some(buf) => {
                let mut m = 0u16;
                for (b, chunk) in buf.chunks(BLOCK).enumerate() {
                    if chunk.iter().any(|&x| x != 0) {
                        m |= 1 << b;
                    }
                }
                m
            }
        };
        masks[i] = mask;
        descriptors[i * 8..i * 8 + 4].copy_from_slice(&(*device_id as u32).to_be_bytes());
        descriptors[i * 8 + 4..i * 8 + 8].copy_from_slice(&cluster_index.to_be_bytes());
        if let Some(buf) = data {
            for (b, chunk) in buf.chunks(BLOCK).enumerate() {
                if mask & (1 << b) != 0 {
                    payload.extend_from_slice(chunk);
                }
            }
        }
    }

    let mut header_bytes = vec![0u8; EXTENT_HEADER_SIZE];
    header_bytes[0..4].copy_from_slice(&extent::MAGIC);
    let mut off = 6;
    for m in &masks {
        header_bytes[off..off + 2].copy_from_slice(&m.to_be_bytes());
        off += 2;
    }

    let mut hashed_header = header_bytes.clone();
    hashed_header[EXTENT_MD5_FIELD_OFFSET..EXTENT_MD5_FIELD_OFFSET + 16].fill(0);

    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(&hashed_header);
    hasher.update(&descriptors);
    hasher.update(&payload);
    let digest: [u8; 16] = hasher.finalize().into();
    header_bytes[EXTENT_MD5_FIELD_OFFSET..EXTENT_MD5_FIELD_OFFSET + 16].copy_from_slice(&digest);

    let mut out = header_bytes;
    out.extend_from_slice(&descriptors);
    out.extend_from_slice(&payload);
    out
}

pub fn cluster_of(byte: u8) -> Vec<u8> {
    vec![byte; CLUSTER]
}
