use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use ragloop_core::config::IngestConfig;
use ragloop_core::error::{RagError, Result};
use ragloop_core::traits::VectorStore;
use ragloop_core::types::{Metadata, NewDocument};

use crate::splitter::TextSplitter;

/// One page of a source document. Numbering starts at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: usize,
    pub text: String,
    pub source: String,
}

/// Read a UTF-8 text file and split it into pages on form feeds.
pub fn load_pages(path: &Path) -> Result<Vec<Page>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RagError::Ingest(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(split_pages(&text, &path.display().to_string()))
}

pub fn split_pages(text: &str, source: &str) -> Vec<Page> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| Page {
            number: i + 1,
            text: page.to_string(),
            source: source.to_string(),
        })
        .collect()
}

/// Hex sha256 over every page's text, so an edited source with the same
/// page count is not mistaken for the one a checkpoint describes.
pub fn content_digest(pages: &[Page]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.text.as_bytes());
        hasher.update(b"\x0c");
    }
    format!("{:x}", hasher.finalize())
}

/// Progress marker written after every completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestCheckpoint {
    pub source: String,
    #[serde(default)]
    pub content_digest: String,
    pub processed_pages: usize,
    pub total_pages: usize,
    pub processed_chunks: usize,
}

impl IngestCheckpoint {
    fn fresh(source: &str, digest: &str, total_pages: usize) -> Self {
        Self {
            source: source.to_string(),
            content_digest: digest.to_string(),
            processed_pages: 0,
            total_pages,
            processed_chunks: 0,
        }
    }

    fn describes(&self, source: &str, digest: &str, total_pages: usize) -> bool {
        self.source == source && self.content_digest == digest && self.total_pages == total_pages
    }

    /// Returns `None` when no checkpoint exists. A corrupt file is treated
    /// the same way so ingestion restarts from the beginning.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        match serde_json::from_str(&raw) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable checkpoint");
                Ok(None)
            }
        }
    }

    /// Write via a temp file and rename so a crash never leaves half a checkpoint.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.processed_pages >= self.total_pages
    }
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub source: String,
    pub total_pages: usize,
    /// Pages already done before this run started.
    pub resumed_from: usize,
    pub pages_processed: usize,
    pub chunks_added: usize,
    pub chunks_skipped: usize,
    /// The checkpoint showed this source as fully ingested.
    pub already_complete: bool,
}

/// Batched, resumable loader that feeds chunks into a vector store.
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    batch_size: usize,
    checkpoint_path: PathBuf,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        config: &IngestConfig,
        checkpoint_path: PathBuf,
    ) -> Self {
        Self {
            store,
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            batch_size: config.batch_size.max(1),
            checkpoint_path,
        }
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let pages = load_pages(path)?;
        self.ingest_pages(&path.display().to_string(), pages).await
    }

    pub async fn ingest_pages(&self, source: &str, pages: Vec<Page>) -> Result<IngestReport> {
        let total_pages = pages.len();
        let digest = content_digest(&pages);
        let mut checkpoint = match IngestCheckpoint::load(&self.checkpoint_path)? {
            Some(cp) if cp.describes(source, &digest, total_pages) => cp,
            Some(cp) => {
                info!(
                    previous = %cp.source,
                    source,
                    "Checkpoint belongs to another source or older content, starting over"
                );
                IngestCheckpoint::fresh(source, &digest, total_pages)
            }
            None => IngestCheckpoint::fresh(source, &digest, total_pages),
        };

        let resumed_from = checkpoint.processed_pages.min(total_pages);
        let mut report = IngestReport {
            source: source.to_string(),
            total_pages,
            resumed_from,
            pages_processed: 0,
            chunks_added: 0,
            chunks_skipped: 0,
            already_complete: false,
        };

        if total_pages > 0 && checkpoint.is_complete() {
            info!(source, total_pages, "Source already ingested, skipping");
            report.already_complete = true;
            return Ok(report);
        }
        if resumed_from > 0 {
            info!(source, resumed_from, total_pages, "Resuming ingestion");
        }

        for batch in pages[resumed_from..].chunks(self.batch_size) {
            let docs = self.chunk_batch(batch);
            let chunk_count = docs.len();
            let added = self.store.add_documents(docs).await?;

            checkpoint.processed_pages += batch.len();
            checkpoint.processed_chunks += chunk_count;
            checkpoint.save(&self.checkpoint_path)?;

            report.pages_processed += batch.len();
            report.chunks_added += added;
            report.chunks_skipped += chunk_count - added.min(chunk_count);

            info!(
                source,
                processed_pages = checkpoint.processed_pages,
                total_pages,
                chunks = chunk_count,
                added,
                "Batch ingested"
            );
        }

        self.store.persist().await?;
        Ok(report)
    }

    fn chunk_batch(&self, batch: &[Page]) -> Vec<NewDocument> {
        let mut docs = Vec::new();
        for page in batch {
            let chunks = self.splitter.split(&page.text);
            debug!(page = page.number, chunks = chunks.len(), "Split page");
            for chunk in chunks {
                let mut metadata = Metadata::new();
                metadata.insert("source".into(), page.source.clone());
                metadata.insert("page".into(), page.number.to_string());
                metadata.insert("start_index".into(), chunk.start_index.to_string());
                docs.push(NewDocument::new(chunk.text, metadata));
            }
        }
        docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteVectorStore;
    use ragloop_test_utils::HashEmbedder;

    fn config() -> IngestConfig {
        IngestConfig {
            batch_size: 2,
            chunk_size: 40,
            chunk_overlap: 10,
            checkpoint_path: None,
        }
    }

    fn pages(n: usize) -> Vec<Page> {
        (1..=n)
            .map(|i| Page {
                number: i,
                text: format!("page {} tells of the journey west, chapter {}", i, i),
                source: "journey.txt".into(),
            })
            .collect()
    }

    fn setup() -> (tempfile::TempDir, Arc<SqliteVectorStore>, Ingestor) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteVectorStore::in_memory("test", Arc::new(HashEmbedder::new(32))).unwrap(),
        );
        let ingestor = Ingestor::new(store.clone(), &config(), dir.path().join("progress.json"));
        (dir, store, ingestor)
    }

    #[test]
    fn test_split_pages_on_form_feed() {
        let pages = split_pages("one\x0ctwo\x0cthree", "book.txt");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].text, "two");
        assert_eq!(split_pages("no breaks", "x").len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_writes_checkpoint_and_skips_on_rerun() {
        let (dir, store, ingestor) = setup();
        let report = ingestor.ingest_pages("journey.txt", pages(5)).await.unwrap();
        assert_eq!(report.pages_processed, 5);
        assert!(report.chunks_added > 0);

        let cp = IngestCheckpoint::load(&dir.path().join("progress.json"))
            .unwrap()
            .unwrap();
        assert_eq!(cp.processed_pages, 5);
        assert!(cp.is_complete());

        let count = store.count().await.unwrap();
        let again = ingestor.ingest_pages("journey.txt", pages(5)).await.unwrap();
        assert!(again.already_complete);
        assert_eq!(again.pages_processed, 0);
        assert_eq!(store.count().await.unwrap(), count);
    }

    #[tokio::test]
    async fn test_resumes_from_checkpoint() {
        let (dir, store, ingestor) = setup();
        IngestCheckpoint {
            source: "journey.txt".into(),
            content_digest: content_digest(&pages(5)),
            processed_pages: 4,
            total_pages: 5,
            processed_chunks: 8,
        }
        .save(&dir.path().join("progress.json"))
        .unwrap();

        let report = ingestor.ingest_pages("journey.txt", pages(5)).await.unwrap();
        assert_eq!(report.resumed_from, 4);
        assert_eq!(report.pages_processed, 1);

        let hits = store.similarity_search("page 5", 50).await.unwrap();
        assert!(hits
            .iter()
            .all(|d| d.metadata.get("page").map(String::as_str) == Some("5")));
    }

    #[tokio::test]
    async fn test_other_source_restarts_and_dedupes() {
        let (dir, store, ingestor) = setup();
        IngestCheckpoint {
            source: "other.txt".into(),
            content_digest: content_digest(&pages(3)),
            processed_pages: 3,
            total_pages: 3,
            processed_chunks: 3,
        }
        .save(&dir.path().join("progress.json"))
        .unwrap();

        let first = ingestor.ingest_pages("journey.txt", pages(3)).await.unwrap();
        assert_eq!(first.resumed_from, 0);
        assert_eq!(first.pages_processed, 3);
        let count = store.count().await.unwrap();

        // A wiped checkpoint re-reads everything but adds nothing new.
        std::fs::remove_file(dir.path().join("progress.json")).unwrap();
        let second = ingestor.ingest_pages("journey.txt", pages(3)).await.unwrap();
        assert_eq!(second.chunks_added, 0);
        assert_eq!(second.chunks_skipped, first.chunks_added);
        assert_eq!(store.count().await.unwrap(), count);
    }

    #[tokio::test]
    async fn test_edited_source_with_same_page_count_restarts() {
        let (dir, _store, ingestor) = setup();
        let path = dir.path().join("progress.json");
        ingestor.ingest_pages("journey.txt", pages(3)).await.unwrap();

        let mut edited = pages(3);
        edited[0].text = "page 1 was rewritten after the first run".into();
        let report = ingestor.ingest_pages("journey.txt", edited.clone()).await.unwrap();
        assert!(!report.already_complete);
        assert_eq!(report.resumed_from, 0);
        assert_eq!(report.pages_processed, 3);

        let cp = IngestCheckpoint::load(&path).unwrap().unwrap();
        assert_eq!(cp.content_digest, content_digest(&edited));
        assert!(cp.is_complete());
    }

    #[test]
    fn test_checkpoint_without_digest_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(
            &path,
            r#"{"source":"a.txt","processed_pages":1,"total_pages":2,"processed_chunks":4}"#,
        )
        .unwrap();
        let cp = IngestCheckpoint::load(&path).unwrap().unwrap();
        assert!(cp.content_digest.is_empty());
        assert!(!cp.describes("a.txt", &content_digest(&[]), 2));
    }

    #[tokio::test]
    async fn test_chunks_carry_page_metadata() {
        let (_dir, store, ingestor) = setup();
        ingestor.ingest_pages("journey.txt", pages(1)).await.unwrap();
        let hits = store.similarity_search("journey", 10).await.unwrap();
        assert!(!hits.is_empty());
        for hit in hits {
            assert_eq!(hit.metadata.get("source").map(String::as_str), Some("journey.txt"));
            assert_eq!(hit.metadata.get("page").map(String::as_str), Some("1"));
            assert!(hit.metadata.contains_key("start_index"));
        }
    }

    #[test]
    fn test_corrupt_checkpoint_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(IngestCheckpoint::load(&path).unwrap().is_none());
    }
}
