//! Error taxonomy for archive extraction.
//!
//! Hand-rolled enum with manual `Display` / `std::error::Error` impls,
//! following the style of the block/frame error types this crate's CLI
//! layer was forked from (`Lz4Error`, `DecompressError`, `Lz4FError`):
//! plain data-carrying variants, no `thiserror` derive. Every I/O failure
//! is wrapped at its call site with the context that matters for
//! diagnosing it (path, offset, device id, cluster index) rather than a
//! blanket `From<std::io::Error>` that would discard that context.

use std::fmt;
use std::path::PathBuf;

/// Which checksummed region a [`VmaError::Checksum`] failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumRegion {
    Header,
    Extent,
}

impl fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumRegion::Header => write!(f, "header"),
            ChecksumRegion::Extent => write!(f, "extent"),
        }
    }
}

/// All errors that can terminate an extraction.
///
/// Corresponds to the taxonomy in the archive-extraction specification:
/// `IoError`, `FormatError`, `ChecksumError`, `ConflictError`, `ResourceError`.
#[derive(Debug)]
pub enum VmaError {
    /// Underlying read/write failure, with the byte offset it occurred at
    /// when known (`None` for errors not tied to a single position, such as
    /// opening the file).
    Io {
        path: PathBuf,
        offset: Option<u64>,
        source: std::io::Error,
    },
    /// A structural invariant was violated: bad magic, unknown version,
    /// inconsistent sizes, or truncation.
    Format { detail: String, offset: u64 },
    /// An MD5 digest did not match the value stored in the archive.
    Checksum {
        region: ChecksumRegion,
        offset: u64,
        expected: [u8; 16],
        computed: [u8; 16],
    },
    /// The same logical cluster was written twice with differing bytes.
    Conflict {
        device_id: u8,
        cluster_index: u32,
    },
    /// An output file could not be created or sized.
    Resource { path: PathBuf, detail: String },
}

impl VmaError {
    pub fn io(path: impl Into<PathBuf>, offset: impl Into<Option<u64>>, source: std::io::Error) -> Self {
        VmaError::Io {
            path: path.into(),
            offset: offset.into(),
            source,
        }
    }

    pub fn format(offset: u64, detail: impl Into<String>) -> Self {
        VmaError::Format {
            detail: detail.into(),
            offset,
        }
    }

    /// The process exit code this error maps to, per the CLI exit-code
    /// contract (0 success, 1 usage, 2 checksum, 3 format, 4 I/O).
    pub fn exit_code(&self) -> i32 {
        match self {
            VmaError::Io { .. } => 4,
            VmaError::Format { .. } => 3,
            VmaError::Checksum { .. } => 2,
            VmaError::Conflict { .. } => 3,
            VmaError::Resource { .. } => 4,
        }
    }
}

impl fmt::Display for VmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmaError::Io { path, offset, source } => match offset {
                Some(off) => write!(
                    f,
                    "I/O error on {} at offset {}: {}",
                    path.display(),
                    off,
                    source
                ),
                None => write!(f, "I/O error on {}: {}", path.display(), source),
            },
            VmaError::Format { detail, offset } => {
                write!(f, "format error at offset {}: {}", offset, detail)
            }
            VmaError::Checksum {
                region,
                offset,
                expected,
                computed,
            } => write!(
                f,
                "{} checksum mismatch at offset {}: expected {}, computed {}",
                region,
                offset,
                hex16(expected),
                hex16(computed)
            ),
            VmaError::Conflict {
                device_id,
                cluster_index,
            } => write!(
                f,
                "conflicting write to device {} cluster {}: differing bytes for the same logical cluster",
                device_id, cluster_index
            ),
            VmaError::Resource { path, detail } => {
                write!(f, "could not prepare output file {}: {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for VmaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmaError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn hex16(bytes: &[u8; 16]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub type VmaResult<T> = Result<T, VmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(
            VmaError::io(
                "x",
                None,
                std::io::Error::new(std::io::ErrorKind::Other, "e")
            )
            .exit_code(),
            4
        );
        assert_eq!(VmaError::format(0, "bad magic").exit_code(), 3);
        assert_eq!(
            VmaError::Checksum {
                region: ChecksumRegion::Header,
                offset: 0,
                expected: [0; 16],
                computed: [1; 16],
            }
            .exit_code(),
            2
        );
        assert_eq!(
            VmaError::Conflict {
                device_id: 1,
                cluster_index: 0
            }
            .exit_code(),
            3
        );
        assert_eq!(
            VmaError::Resource {
                path: "x".into(),
                detail: "d".into()
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn checksum_display_includes_hex_digests() {
        let e = VmaError::Checksum {
            region: ChecksumRegion::Extent,
            offset: 12288,
            expected: [0xAB; 16],
            computed: [0; 16],
        };
        let s = e.to_string();
        assert!(s.contains("extent"));
        assert!(s.contains("12288"));
        assert!(s.contains(&"ab".repeat(16)));
    }
}
