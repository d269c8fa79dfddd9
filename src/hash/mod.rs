// Content identity hashing using BLAKE3

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use crate::constants::{HASH_ALGORITHM, HASH_CHUNK_SIZE, HASH_FAST_SCHEME};
use crate::error::{BrollError, Result};

/// Compute the content hash used as a video's identity:
/// first 1MB + last 1MB + file size.
/// Format: "blake3:first_last_size_v1:<hash>"
///
/// The path never enters the hash, so a moved or renamed file keeps its identity.
pub fn compute_content_hash(path: &Path) -> Result<String> {
    let display = path.display().to_string();
    let mut file = File::open(path)
        .map_err(|e| BrollError::scan(&display, format!("Failed to open file: {}", e)))?;

    let file_size = file.metadata()
        .map_err(|e| BrollError::scan(&display, format!("Failed to get metadata: {}", e)))?
        .len();

    let mut hasher = blake3::Hasher::new();

    // Hash first chunk
    let mut first_chunk = vec![0u8; HASH_CHUNK_SIZE.min(file_size as usize)];
    file.read_exact(&mut first_chunk)
        .map_err(|e| BrollError::scan(&display, format!("Failed to read first chunk: {}", e)))?;
    hasher.update(&first_chunk);

    // Hash last chunk if file is larger than one chunk
    if file_size > HASH_CHUNK_SIZE as u64 {
        let last_offset = file_size.saturating_sub(HASH_CHUNK_SIZE as u64);
        file.seek(SeekFrom::Start(last_offset))
            .map_err(|e| BrollError::scan(&display, format!("Failed to seek: {}", e)))?;

        let mut last_chunk = vec![0u8; HASH_CHUNK_SIZE];
        file.read_exact(&mut last_chunk)
            .map_err(|e| BrollError::scan(&display, format!("Failed to read last chunk: {}", e)))?;
        hasher.update(&last_chunk);
    }

    // Include file size in hash
    hasher.update(&file_size.to_le_bytes());

    let hash = hasher.finalize();
    Ok(format!("{}:{}:{}", HASH_ALGORITHM, HASH_FAST_SCHEME, hash.to_hex()))
}

/// Trailing 12 hex characters of a content hash, for display.
pub fn short_hash(hash: &str) -> &str {
    let digest = hash.rsplit(':').next().unwrap_or(hash);
    &digest[..digest.len().min(12)]
}
