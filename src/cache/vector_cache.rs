//! Versioned on-disk cache for embedding matrices.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic      "RBVC"
//! version    u32
//! kind       u8          0 = sections, 1 = chunks
//! model      u32 len + UTF-8 bytes
//! chunk_size u32         0 for section caches
//! dimension  u32
//! count      u64
//! entries    count × (section id)                                  sections
//!            count × (text, section_id, i64 start, u8 is_title)    chunks
//! vectors    count × dimension × f32
//! ```
//!
//! Strings are a u32 byte length followed by UTF-8 bytes. A file that does
//! not parse is a `CacheFormat` error; a file that parses but describes a
//! different model, kind or corpus is a `CacheMismatch`.

use crate::error::{BenchError, Result};
use crate::search::sentence::Chunk;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const CACHE_MAGIC: &[u8; 4] = b"RBVC";
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Sections,
    Chunks,
}

impl CacheKind {
    fn tag(self) -> u8 {
        match self {
            CacheKind::Sections => 0,
            CacheKind::Chunks => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(CacheKind::Sections),
            1 => Ok(CacheKind::Chunks),
            other => Err(BenchError::CacheFormat(format!("unknown cache kind {}", other))),
        }
    }
}

/// Row identities of a cached matrix
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntries {
    Sections(Vec<String>),
    Chunks(Vec<Chunk>),
}

impl CacheEntries {
    pub fn len(&self) -> usize {
        match self {
            CacheEntries::Sections(ids) => ids.len(),
            CacheEntries::Chunks(chunks) => chunks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> CacheKind {
        match self {
            CacheEntries::Sections(_) => CacheKind::Sections,
            CacheEntries::Chunks(_) => CacheKind::Chunks,
        }
    }

    /// Section ids the cached rows belong to
    pub fn covered_section_ids(&self) -> HashSet<&str> {
        match self {
            CacheEntries::Sections(ids) => ids.iter().map(String::as_str).collect(),
            CacheEntries::Chunks(chunks) => chunks.iter().map(|c| c.section_id.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorCache {
    pub model_name: String,
    pub chunk_size: usize,
    pub dimension: usize,
    pub entries: CacheEntries,
    pub embeddings: Vec<Vec<f32>>,
}

impl VectorCache {
    /// Cache file for a retriever configuration: `<dir>/<prefix>_<model>_d<dim>[_cs<N>].bin`
    pub fn path_for(
        dir: &Path,
        prefix: &str,
        model_name: &str,
        dimension: usize,
        chunk_size: Option<usize>,
    ) -> PathBuf {
        let model: String = model_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        let file = match chunk_size {
            Some(size) => format!("{}_{}_d{}_cs{}.bin", prefix, model, dimension, size),
            None => format!("{}_{}_d{}.bin", prefix, model, dimension),
        };
        dir.join(file)
    }

    /// Check header fields and the covered id set against what the caller is about to build.
    pub fn validate(
        &self,
        kind: CacheKind,
        model_name: &str,
        chunk_size: usize,
        dimension: usize,
        expected_ids: &HashSet<&str>,
    ) -> Result<()> {
        if self.entries.kind() != kind {
            return Err(BenchError::CacheMismatch(format!(
                "cache holds {:?}, expected {:?}",
                self.entries.kind(),
                kind
            )));
        }
        if self.model_name != model_name {
            return Err(BenchError::CacheMismatch(format!(
                "cache built with model '{}', current model is '{}'",
                self.model_name, model_name
            )));
        }
        if self.chunk_size != chunk_size {
            return Err(BenchError::CacheMismatch(format!(
                "cache chunk size {} != {}",
                self.chunk_size, chunk_size
            )));
        }
        if self.dimension != dimension {
            return Err(BenchError::CacheMismatch(format!(
                "cache dimension {} != {}",
                self.dimension, dimension
            )));
        }
        if let CacheEntries::Sections(ids) = &self.entries {
            let unique: HashSet<&str> = ids.iter().map(String::as_str).collect();
            if unique.len() != ids.len() {
                return Err(BenchError::CacheMismatch("cache holds duplicate section ids".to_string()));
            }
        }
        let covered = self.entries.covered_section_ids();
        if &covered != expected_ids {
            return Err(BenchError::CacheMismatch(format!(
                "cache covers {} sections, corpus has {}",
                covered.len(),
                expected_ids.len()
            )));
        }
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if self.embeddings.len() != self.entries.len() {
            return Err(BenchError::InvalidInput(format!(
                "{} embeddings for {} cache entries",
                self.embeddings.len(),
                self.entries.len()
            )));
        }
        if let Some(bad) = self.embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(BenchError::InvalidInput(format!(
                "embedding of length {} in cache of dimension {}",
                bad.len(),
                self.dimension
            )));
        }

        let mut buf = Vec::with_capacity(64 + self.embeddings.len() * self.dimension * 4);
        buf.extend_from_slice(CACHE_MAGIC);
        buf.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        buf.push(self.entries.kind().tag());
        put_str(&mut buf, &self.model_name)?;
        put_u32(&mut buf, self.chunk_size)?;
        put_u32(&mut buf, self.dimension)?;
        buf.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());

        match &self.entries {
            CacheEntries::Sections(ids) => {
                for id in ids {
                    put_str(&mut buf, id)?;
                }
            }
            CacheEntries::Chunks(chunks) => {
                for chunk in chunks {
                    put_str(&mut buf, &chunk.text)?;
                    put_str(&mut buf, &chunk.section_id)?;
                    let start = chunk.start_index.map(|i| i as i64).unwrap_or(-1);
                    buf.extend_from_slice(&start.to_le_bytes());
                    buf.push(u8::from(chunk.is_title));
                }
            }
        }

        for vector in &self.embeddings {
            for value in vector {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, buf)?;
        log::debug!("Wrote vector cache {} ({} rows)", path.display(), self.entries.len());
        Ok(())
    }

    /// Read a cache file. `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&bytes)
            .map(Some)
            .map_err(|e| match e {
                BenchError::CacheFormat(msg) => {
                    BenchError::CacheFormat(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(4)? != CACHE_MAGIC {
            return Err(BenchError::CacheFormat("not a vector cache file (bad magic)".to_string()));
        }
        let version = reader.u32()?;
        if version != CACHE_VERSION {
            return Err(BenchError::CacheFormat(format!(
                "unsupported cache version {} (expected {})",
                version, CACHE_VERSION
            )));
        }
        let kind = CacheKind::from_tag(reader.u8()?)?;
        let model_name = reader.string()?;
        let chunk_size = reader.u32()? as usize;
        let dimension = reader.u32()? as usize;
        let count = usize::try_from(reader.u64()?)
            .map_err(|_| BenchError::CacheFormat("entry count overflows usize".to_string()))?;

        let entries = match kind {
            CacheKind::Sections => {
                let mut ids = Vec::new();
                for _ in 0..count {
                    ids.push(reader.string()?);
                }
                CacheEntries::Sections(ids)
            }
            CacheKind::Chunks => {
                let mut chunks = Vec::new();
                for _ in 0..count {
                    let text = reader.string()?;
                    let section_id = reader.string()?;
                    let start = reader.i64()?;
                    let is_title = reader.u8()? != 0;
                    chunks.push(Chunk {
                        text,
                        section_id,
                        start_index: usize::try_from(start).ok(),
                        is_title,
                    });
                }
                CacheEntries::Chunks(chunks)
            }
        };

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| BenchError::CacheFormat("matrix size overflows".to_string()))?;
        if reader.remaining() != expected {
            return Err(BenchError::CacheFormat(format!(
                "matrix section is {} bytes, expected {}",
                reader.remaining(),
                expected
            )));
        }

        let mut embeddings = Vec::with_capacity(count);
        for _ in 0..count {
            let mut row = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                row.push(reader.f32()?);
            }
            embeddings.push(row);
        }

        Ok(Self {
            model_name,
            chunk_size,
            dimension,
            entries,
            embeddings,
        })
    }
}

fn put_u32(buf: &mut Vec<u8>, value: usize) -> Result<()> {
    let value = u32::try_from(value)
        .map_err(|_| BenchError::InvalidInput(format!("{} does not fit the cache header", value)))?;
    buf.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    put_u32(buf, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Bounds-checked little-endian reader; running off the end is a format error.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(BenchError::CacheFormat(format!(
                "truncated at byte {} (wanted {} more)",
                self.pos, n
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| BenchError::CacheFormat("invalid UTF-8 in string".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn section_cache() -> VectorCache {
        VectorCache {
            model_name: "hashing-2".to_string(),
            chunk_size: 0,
            dimension: 2,
            entries: CacheEntries::Sections(vec!["a".to_string(), "b".to_string()]),
            embeddings: vec![vec![0.6, 0.8], vec![1.0, 0.0]],
        }
    }

    #[test]
    fn test_section_cache_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("section.bin");
        let cache = section_cache();
        cache.write(&path).unwrap();
        let loaded = VectorCache::read(&path).unwrap().unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn test_chunk_cache_keeps_title_marker() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chunks.bin");
        let cache = VectorCache {
            model_name: "m".to_string(),
            chunk_size: 2,
            dimension: 1,
            entries: CacheEntries::Chunks(vec![
                Chunk {
                    text: "Fireball".to_string(),
                    section_id: "a".to_string(),
                    start_index: None,
                    is_title: true,
                },
                Chunk {
                    text: "It burns. Everything nearby.".to_string(),
                    section_id: "a".to_string(),
                    start_index: Some(0),
                    is_title: false,
                },
            ]),
            embeddings: vec![vec![1.0], vec![-1.0]],
        };
        cache.write(&path).unwrap();
        let loaded = VectorCache::read(&path).unwrap().unwrap();
        assert_eq!(loaded, cache);
        let expected: HashSet<&str> = ["a"].into_iter().collect();
        assert_eq!(loaded.entries.covered_section_ids(), expected);
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(VectorCache::read(&temp_dir.path().join("absent.bin")).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_and_version_fail_loudly() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("junk.bin");
        std::fs::write(&path, b"PKL\x00garbage").unwrap();
        assert!(matches!(VectorCache::read(&path), Err(BenchError::CacheFormat(_))));

        let mut bytes = CACHE_MAGIC.to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        let err = VectorCache::read(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported cache version 99"));
    }

    #[test]
    fn test_truncated_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cut.bin");
        section_cache().write(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(VectorCache::read(&path), Err(BenchError::CacheFormat(_))));
    }

    #[test]
    fn test_validate_detects_mismatches() {
        let cache = section_cache();
        let ids: HashSet<&str> = ["b", "a"].into_iter().collect();
        assert!(cache.validate(CacheKind::Sections, "hashing-2", 0, 2, &ids).is_ok());

        let fewer: HashSet<&str> = ["a"].into_iter().collect();
        assert!(matches!(
            cache.validate(CacheKind::Sections, "hashing-2", 0, 2, &fewer),
            Err(BenchError::CacheMismatch(_))
        ));
        assert!(matches!(
            cache.validate(CacheKind::Sections, "other-model", 0, 2, &ids),
            Err(BenchError::CacheMismatch(_))
        ));
        assert!(matches!(
            cache.validate(CacheKind::Chunks, "hashing-2", 0, 2, &ids),
            Err(BenchError::CacheMismatch(_))
        ));
        assert!(matches!(
            cache.validate(CacheKind::Sections, "hashing-2", 0, 3, &ids),
            Err(BenchError::CacheMismatch(_))
        ));
    }

    #[test]
    fn test_write_rejects_ragged_matrix() {
        let temp_dir = TempDir::new().unwrap();
        let mut cache = section_cache();
        cache.embeddings[1] = vec![1.0];
        assert!(cache.write(&temp_dir.path().join("x.bin")).is_err());
    }

    #[test]
    fn test_path_for_sanitizes_model() {
        let dir = Path::new("/tmp/cache");
        assert_eq!(
            VectorCache::path_for(dir, "section", "BAAI/bge-small-en", 384, None),
            dir.join("section_BAAI_bge-small-en_d384.bin")
        );
        assert_eq!(
            VectorCache::path_for(dir, "sentence", "m", 8, Some(3)),
            dir.join("sentence_m_d8_cs3.bin")
        );
    }
}
