//! Archive header parsing.
//!
//! Mirrors the fixed 12288-byte header layout bit-for-bit: the wire-format
//! structs are declared with `binrw` (`#[brw(big)]`) rather than hand-rolled
//! byte slicing. The config-name table and blob buffer are variable-length,
//! so those two pieces are walked by hand after the fixed and array-shaped
//! parts have been read.

use std::io::Cursor;

use binrw::BinRead;

use crate::config::{DEVICE_SLOTS, HEADER_SIZE};
use crate::error::{ChecksumRegion, VmaError, VmaResult};
use crate::md5::{digest_with_zeroed_range, IntegrityChecker};
use crate::source::ByteSource;

/// Archive container magic, at offset 0.
pub const MAGIC: [u8; 4] = *b"VMA\0";

/// The only archive format version this extractor understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// Byte offset of the `md5sum` field within the header region.
const MD5_FIELD_OFFSET: usize = 0x20;

/// Byte offset where the device table begins.
const DEVICE_TABLE_OFFSET: usize = 0x38;

/// Size in bytes of one device table slot (8-byte size + 4-byte name offset).
const DEVICE_SLOT_SIZE: usize = 12;

#[derive(BinRead, Debug, Clone)]
#[br(big)]
struct HeaderFixed {
    magic: [u8; 4],
    version: u32,
    uuid: [u8; 16],
    ctime: u64,
    md5sum: [u8; 16],
    blob_buffer_offset: u32,
    blob_buffer_size: u32,
}

#[derive(BinRead, Debug, Clone, Copy)]
#[br(big)]
struct DeviceSlot {
    size: u64,
    name_offset: u32,
}

/// One populated device table entry, materialized as a `<name>.raw` output
/// file by a [`crate::sparse::SparseWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: u8,
    pub name: String,
    pub size: u64,
    pub cluster_count: u32,
}

/// A configuration blob extracted verbatim to `<name>` in the output
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlob {
    pub name: String,
    pub data: Vec<u8>,
}

/// Everything parsed out of the archive header, immutable once built.
#[derive(Debug, Clone)]
pub struct ArchiveDescriptor {
    pub uuid: [u8; 16],
    pub ctime: u64,
    pub devices: Vec<DeviceEntry>,
    pub configs: Vec<ConfigBlob>,
}

impl ArchiveDescriptor {
    /// Looks up a device entry by id, if any device slot is populated with it.
    pub fn device(&self, id: u8) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Reads a length-prefixed blob out of the blob buffer at byte offset
/// `offset`. Offsets in the header index directly into this buffer's bytes,
/// not into a sequential entry count, so random access is just "read a
/// 2-byte big-endian length at `offset`, then that many bytes after it".
fn read_blob(buf: &[u8], offset: u32, header_offset_base: u64) -> VmaResult<Vec<u8>> {
    let offset = offset as usize;
    let len_bytes = buf.get(offset..offset + 2).ok_or_else(|| {
        VmaError::format(
            header_offset_base + offset as u64,
            "blob offset out of range of blob buffer",
        )
    })?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let data = buf
        .get(offset + 2..offset + 2 + len)
        .ok_or_else(|| {
            VmaError::format(
                header_offset_base + offset as u64,
                "blob entry length extends past the blob buffer",
            )
        })?
        .to_vec();
    Ok(data)
}

fn blob_as_name(buf: &[u8], offset: u32, header_offset_base: u64) -> VmaResult<String> {
    let bytes = read_blob(buf, offset, header_offset_base)?;
    String::from_utf8(bytes)
        .map_err(|_| VmaError::format(header_offset_base + offset as u64, "blob name is not valid UTF-8"))
}

/// Parses and verifies the archive header, consuming exactly `HEADER_SIZE`
/// bytes from `source`'s current position (which must be 0).
pub fn decode(source: &mut ByteSource, checker: &IntegrityChecker) -> VmaResult<ArchiveDescriptor> {
    let raw = source.read_exact(HEADER_SIZE)?;

    let mut cursor = Cursor::new(&raw[..56]);
    let fixed = HeaderFixed::read(&mut cursor)
        .map_err(|e| VmaError::format(0, format!("malformed header: {e}")))?;

    if fixed.magic != MAGIC {
        return Err(VmaError::format(0, "archive magic does not match the VMA container magic"));
    }
    if fixed.version != SUPPORTED_VERSION {
        return Err(VmaError::format(
            4,
            format!("unrecognized archive version {}", fixed.version),
        ));
    }

    let computed = digest_with_zeroed_range(&raw, MD5_FIELD_OFFSET..MD5_FIELD_OFFSET + 16);
    if !checker.verify(&fixed.md5sum, &computed) {
        return Err(VmaError::Checksum {
            region: ChecksumRegion::Header,
            offset: MD5_FIELD_OFFSET as u64,
            expected: fixed.md5sum,
            computed,
        });
    }

    let blob_start = fixed.blob_buffer_offset as usize;
    let blob_end = blob_start + fixed.blob_buffer_size as usize;
    let blob_buffer = raw.get(blob_start..blob_end).ok_or_else(|| {
        VmaError::format(
            fixed.blob_buffer_offset as u64,
            "blob buffer offset/size falls outside the header region",
        )
    })?;

    // Device table: DEVICE_SLOTS fixed-size slots starting at DEVICE_TABLE_OFFSET.
    let device_table_end = DEVICE_TABLE_OFFSET + DEVICE_SLOTS * DEVICE_SLOT_SIZE;
    let mut devices = Vec::new();
    {
        let mut cursor = Cursor::new(&raw[DEVICE_TABLE_OFFSET..device_table_end]);
        for slot_idx in 0..DEVICE_SLOTS {
            let slot = DeviceSlot::read(&mut cursor).map_err(|e| {
                VmaError::format(
                    (DEVICE_TABLE_OFFSET + slot_idx * DEVICE_SLOT_SIZE) as u64,
                    format!("malformed device table slot: {e}"),
                )
            })?;
            if slot.size == 0 || slot_idx == 0 {
                continue; // slot 0 reserved; size 0 means unused
            }
            let name = blob_as_name(blob_buffer, slot.name_offset, fixed.blob_buffer_offset as u64)?;
            let cluster_count = slot.size.div_ceil(crate::config::CLUSTER as u64) as u32;
            devices.push(DeviceEntry {
                id: slot_idx as u8,
                name,
                size: slot.size,
                cluster_count,
            });
        }
    }

    // Config-name table: variable-length pairs of (name_offset, data_offset),
    // terminated by a zero name_offset, bounded above by blob_buffer_offset.
    let mut configs = Vec::new();
    {
        let mut pos = device_table_end;
        while pos + 8 <= blob_start {
            let name_offset = u32::from_be_bytes(raw[pos..pos + 4].try_into().unwrap());
            if name_offset == 0 {
                break;
            }
            let data_offset = u32::from_be_bytes(raw[pos + 4..pos + 8].try_into().unwrap());
            let name = blob_as_name(blob_buffer, name_offset, fixed.blob_buffer_offset as u64)?;
            let data = read_blob(blob_buffer, data_offset, fixed.blob_buffer_offset as u64)?;
            configs.push(ConfigBlob { name, data });
            pos += 8;
        }
    }

    Ok(ArchiveDescriptor {
        uuid: fixed.uuid,
        ctime: fixed.ctime,
        devices,
        configs,
    })
}
