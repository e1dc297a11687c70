//! Change-detection primitives: whole-second mtimes and content hashes
//!
//! The cache first compares modification times at whole-second resolution
//! and only hashes a file when the timestamp moved. Edits that land within
//! the same second as the stored timestamp are therefore invisible until the
//! timestamp changes again.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Modification time of a file, rounded to the nearest whole second
pub fn modified_secs(path: &Path) -> io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(round_to_secs(modified))
}

/// Seconds since the Unix epoch, rounded half away from zero
pub fn round_to_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64().round() as i64,
        Err(e) => -(e.duration().as_secs_f64().round() as i64),
    }
}

/// Compute the blake3 hash of a file's content, hex-encoded
///
/// The file is streamed and closed before returning.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
