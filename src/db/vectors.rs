//! Section and query vectors stored as little-endian `f32` blobs.

use super::Db;
use crate::error::{BenchError, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// Create the vector tables if missing
pub fn ensure_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS section_vectors (
                section_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS query_vectors (
                question_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL
            );",
        )?;
        Ok(())
    })
}

/// Insert or replace section vectors. Returns rows written.
pub fn store_section_vectors(db: &Db, vectors: &[(String, Vec<f32>)]) -> Result<usize> {
    store(db, "section_vectors", "section_id", vectors)
}

pub fn load_section_vectors(db: &Db) -> Result<HashMap<String, Vec<f32>>> {
    load(db, "section_vectors", "section_id")
}

/// Insert or replace precomputed query vectors, keyed by question id.
pub fn store_query_vectors(db: &Db, vectors: &[(String, Vec<f32>)]) -> Result<usize> {
    store(db, "query_vectors", "question_id", vectors)
}

pub fn load_query_vectors(db: &Db) -> Result<HashMap<String, Vec<f32>>> {
    load(db, "query_vectors", "question_id")
}

fn store(db: &Db, table: &str, key: &str, vectors: &[(String, Vec<f32>)]) -> Result<usize> {
    if vectors.is_empty() {
        return Ok(0);
    }
    let sql = format!("INSERT OR REPLACE INTO {} ({}, embedding) VALUES (?1, ?2)", table, key);

    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (id, vector) in vectors {
                stmt.execute(params![id, encode_vector(vector)])?;
            }
        }
        tx.commit()?;
        log::debug!("Stored {} rows in {}", vectors.len(), table);
        Ok(vectors.len())
    })
}

fn load(db: &Db, table: &str, key: &str) -> Result<HashMap<String, Vec<f32>>> {
    db.with_connection(|conn| load_with(conn, table, key))
}

fn load_with(conn: &Connection, table: &str, key: &str) -> Result<HashMap<String, Vec<f32>>> {
    let mut stmt = conn.prepare(&format!("SELECT {}, embedding FROM {}", key, table))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    let mut vectors = HashMap::with_capacity(rows.len());
    for (id, blob) in rows {
        let vector = decode_vector(&blob).ok_or_else(|| {
            BenchError::InvalidInput(format!(
                "{}: blob for {} has {} bytes, not a multiple of 4",
                table,
                id,
                blob.len()
            ))
        })?;
        vectors.insert(id, vector);
    }
    log::info!("Loaded {} vectors from {}", vectors.len(), table);
    Ok(vectors)
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// `None` when the blob length is not a multiple of 4
pub fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
