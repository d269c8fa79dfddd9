// sqlite-vec registration and embedding blob encoding

use std::sync::Once;
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use crate::error::{BrollError, Result};

static REGISTER: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards in this process.
pub fn register_extension() {
    REGISTER.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Confirm the vector functions are loaded on this connection.
pub fn ensure_available(conn: &Connection) -> Result<String> {
    conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        .map_err(|e| {
            BrollError::VectorIndexUnavailable(format!(
                "sqlite-vec is not loaded ({}); semantic search cannot run",
                e
            ))
        })
}

/// Little-endian f32 blob, the layout vec_distance_cosine reads
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(BrollError::Store(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_layout() {
        let blob = encode_embedding(&[1.0, -0.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&blob).unwrap(), vec![1.0, -0.5]);
        assert!(decode_embedding(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_extension_loads_and_ranks() {
        register_extension();
        let conn = Connection::open_in_memory().unwrap();
        assert!(ensure_available(&conn).is_ok());

        let a = encode_embedding(&[1.0, 0.0]);
        let b = encode_embedding(&[0.0, 1.0]);
        let same: f64 = conn
            .query_row("SELECT vec_distance_cosine(?1, ?2)", rusqlite::params![a, a], |r| r.get(0))
            .unwrap();
        let orthogonal: f64 = conn
            .query_row("SELECT vec_distance_cosine(?1, ?2)", rusqlite::params![a, b], |r| r.get(0))
            .unwrap();
        assert!(same.abs() < 1e-6);
        assert!((orthogonal - 1.0).abs() < 1e-6);
    }
}
