//! Content fingerprints.
//!
//! A fingerprint is the first [`FINGERPRINT_LEN`] hex characters of the SHA256 digest of a
//! version's content. It is shown to users and used to spot corrupted payloads, but it is far
//! too short to identify content on its own: versions are identified by their number.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Number of hex characters kept from the digest
pub const FINGERPRINT_LEN: usize = 16;

/// Default read size used when streaming content through the digest
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Streams `reader` through SHA256 in chunks of `chunk_size` bytes and returns the truncated
/// hex digest.
///
/// Only one chunk is held in memory at a time, so this is safe to call on arbitrarily large
/// files.
pub fn fingerprint<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let digest = hex::encode(hasher.finalize());
    tracing::trace!(bytes = total, digest = %digest, "Hashed content stream");
    Ok(truncate(&digest))
}

/// Fingerprint of the file at `path`
pub fn fingerprint_file(path: &Path, chunk_size: usize) -> io::Result<String> {
    let file = File::open(path)?;
    fingerprint(file, chunk_size)
}

pub fn fingerprint_bytes(data: &[u8]) -> String {
    truncate(&hex::encode(Sha256::digest(data)))
}

fn truncate(digest: &str) -> String {
    digest[..FINGERPRINT_LEN].to_owned()
}

/// Whether `s` has the shape of a fingerprint (fixed length, lowercase hex)
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_LEN
        && s.chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
