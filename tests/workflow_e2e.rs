use std::sync::Arc;

use ragloop_agent::{AnswerStatus, RagWorkflow};
use ragloop_core::config::{AppConfig, IngestConfig};
use ragloop_core::traits::VectorStore;
use ragloop_store::{Ingestor, SqliteVectorStore};
use ragloop_test_utils::{FnLlm, HashEmbedder};

const BOOK: &str = "Sun Wukong was born from a stone on Flower Fruit Mountain.\n\
\x0cSun Wukong learned the seventy-two transformations from Patriarch Subhuti.\n\
\x0cZhu Bajie was once the Marshal of the Heavenly Canopy.\n";

fn grading_llm() -> FnLlm {
    FnLlm::new(|prompt| {
        if prompt.contains("retrieve or respond_directly") {
            Ok("retrieve".into())
        } else if prompt.contains("grading whether") {
            let relevant = prompt.contains("Subhuti");
            Ok(format!("{{\"relevant\": {}}}", relevant))
        } else if prompt.contains("Rewrite the query") {
            Ok("Who taught Sun Wukong the seventy-two transformations?".into())
        } else {
            Ok("Patriarch Subhuti taught him [1].".into())
        }
    })
}

#[tokio::test]
async fn test_ingest_then_answer_from_index() {
    let dir = tempfile::tempdir().unwrap();
    let book = dir.path().join("journey.txt");
    std::fs::write(&book, BOOK).unwrap();

    let store = Arc::new(
        SqliteVectorStore::open(
            &dir.path().join("index.db"),
            "journey",
            Arc::new(HashEmbedder::new(128)),
        )
        .unwrap(),
    );

    let ingest = IngestConfig {
        batch_size: 2,
        chunk_size: 200,
        chunk_overlap: 20,
        checkpoint_path: None,
    };
    let ingestor = Ingestor::new(store.clone(), &ingest, dir.path().join("progress.json"));
    let report = ingestor.ingest_file(&book).await.unwrap();
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.chunks_added, 3);
    assert_eq!(store.count().await.unwrap(), 3);

    let workflow = RagWorkflow::new(Arc::new(grading_llm()), store, &AppConfig::default());
    let answer = workflow
        .ask("Who taught Sun Wukong the seventy-two transformations?")
        .await
        .unwrap();

    assert_eq!(answer.status, AnswerStatus::Grounded);
    assert_eq!(
        answer.trace_names(),
        vec!["query_analyzer", "retriever", "grader", "generator"]
    );
    assert_eq!(answer.sources.len(), 1);
    assert!(answer.sources[0].ends_with("p.2"));
}

#[tokio::test]
async fn test_empty_index_ends_in_low_confidence() {
    let store: Arc<dyn VectorStore> = Arc::new(
        SqliteVectorStore::in_memory("empty", Arc::new(HashEmbedder::new(32))).unwrap(),
    );
    let workflow = RagWorkflow::new(Arc::new(grading_llm()), store, &AppConfig::default());

    let answer = workflow.ask("Where was Sun Wukong born?").await.unwrap();
    assert!(answer.low_confidence);
    assert_eq!(answer.status, AnswerStatus::LowConfidence);
    assert_eq!(answer.rewrite_count, 2);
    let retrievals = answer
        .trace_names()
        .iter()
        .filter(|n| **n == "retriever")
        .count();
    assert_eq!(retrievals, 3);
    assert!(!answer.trace_names().contains(&"grader"));
}

#[tokio::test]
async fn test_reasoning_agent_answers_from_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteVectorStore::in_memory("journey", Arc::new(HashEmbedder::new(128))).unwrap(),
    );
    let ingestor = Ingestor::new(
        store.clone(),
        &IngestConfig::default(),
        dir.path().join("progress.json"),
    );
    ingestor
        .ingest_pages("journey.txt", ragloop_store::ingest::split_pages(BOOK, "journey.txt"))
        .await
        .unwrap();

    let llm = FnLlm::new(|prompt| {
        if prompt.contains("Observation:") && prompt.contains("Subhuti") {
            Ok("Thought: The second passage answers it.\nAnswer: Patriarch Subhuti.".into())
        } else {
            Ok("Thought: Search the book.\n\
                Action: retrieve\n\
                Action Input: Sun Wukong seventy-two transformations teacher"
                .into())
        }
    });
    let workflow = RagWorkflow::react(Arc::new(llm), store, &AppConfig::default());
    let answer = workflow
        .ask("Who taught Sun Wukong the seventy-two transformations?")
        .await
        .unwrap();

    assert_eq!(answer.status, AnswerStatus::Grounded);
    assert_eq!(answer.answer, "Patriarch Subhuti.");
    assert_eq!(
        answer.trace_names(),
        vec!["react_reasoner", "react_retriever", "react_reasoner"]
    );
    assert!(answer.sources.iter().any(|s| s.ends_with("p.2")));
}
