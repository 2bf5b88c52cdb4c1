pub mod embedding_cache;
pub mod vector_cache;

pub use embedding_cache::EmbeddingCache;
pub use vector_cache::{CacheEntries, CacheKind, VectorCache};
