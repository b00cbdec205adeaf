pub mod embeddings;
pub mod ingest;
pub mod retrying;
pub mod splitter;
pub mod store;

pub use embeddings::{cosine_similarity, HttpEmbeddingProvider};
pub use ingest::{IngestCheckpoint, IngestReport, Ingestor, Page};
pub use retrying::RetryingStore;
pub use splitter::TextSplitter;
pub use store::SqliteVectorStore;
