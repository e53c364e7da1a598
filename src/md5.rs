//! Thin wrapper around the RustCrypto `md-5` crate providing the MD5 API
//! this crate needs for header and extent integrity checks.

use md5::{Digest, Md5};

/// One-shot MD5 digest of a single buffer.
#[inline]
pub fn digest(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

/// Computes the MD5 digest of `data` as if the 16 bytes at
/// `data[zero_range]` were all zero, without allocating a modified copy.
///
/// Both the archive header and each extent header store their own digest
/// inline, computed with that field treated as zero. Feeding the hasher
/// three slices (`before`, a synthesized sixteen zero bytes, `after`)
/// reproduces that digest without ever allocating a second copy of `data`.
pub fn digest_with_zeroed_range(data: &[u8], zero_range: std::ops::Range<usize>) -> [u8; 16] {
    debug_assert_eq!(zero_range.end - zero_range.start, 16);
    let mut hasher = Md5::new();
    hasher.update(&data[..zero_range.start]);
    hasher.update([0u8; 16]);
    hasher.update(&data[zero_range.end..]);
    hasher.finalize().into()
}

/// Facade used by [`crate::header`] and [`crate::extent`] to verify
/// embedded digests. When `skip` is set, [`IntegrityChecker::verify`]
/// always succeeds — the caller is still responsible for consuming the
/// digest bytes from the stream so that position bookkeeping stays correct.
pub struct IntegrityChecker {
    skip: bool,
}

impl IntegrityChecker {
    pub fn new(skip: bool) -> Self {
        IntegrityChecker { skip }
    }

    /// Verifies that `computed` equals `expected` unless checks are
    /// disabled. Never retries; the caller treats a mismatch as fatal.
    pub fn verify(&self, expected: &[u8; 16], computed: &[u8; 16]) -> bool {
        self.skip || expected == computed
    }
}
