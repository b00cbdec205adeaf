use std::sync::Arc;

use ragloop_core::config::AppConfig;
use ragloop_core::traits::VectorStore;
use ragloop_store::{HttpEmbeddingProvider, IngestCheckpoint, SqliteVectorStore};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn ok(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(label: &str, detail: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

pub async fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. Chat model and credentials
    checks.push(check_model(config));

    // 2. Decision model override
    checks.push(check_decision_model(config));

    // 3. Embedding endpoint
    checks.push(check_embedding(config));

    // 4. Workflow settings
    checks.push(check_workflow(config));

    // 5. Index reachable and populated
    checks.push(check_index(config).await);

    // 6. Ingestion progress
    checks.push(check_checkpoint(config));

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn has_key(key: &Option<String>) -> bool {
    key.as_ref()
        .is_some_and(|k| !k.is_empty() && !k.starts_with("${"))
}

fn check_model(config: &AppConfig) -> CheckResult {
    let model = &config.model;
    let needs_key = model.provider != "ollama";
    if needs_key && !has_key(&model.api_key) {
        return CheckResult::fail(
            "Model",
            format!("No API key set for provider '{}'", model.provider),
        );
    }
    CheckResult::ok(
        "Model",
        format!(
            "{} via {} (temperature {})",
            model.model_id,
            model.endpoint(),
            model.temperature
        ),
    )
}

fn check_decision_model(config: &AppConfig) -> CheckResult {
    let decision = config.decision_model();
    match &config.grader_model {
        Some(m) if m.provider != "ollama" && !has_key(&m.api_key) => CheckResult::fail(
            "Decision model",
            format!("No API key set for provider '{}'", m.provider),
        ),
        Some(_) => CheckResult::ok(
            "Decision model",
            format!("{} (override, temperature 0)", decision.model_id),
        ),
        None => CheckResult::ok(
            "Decision model",
            format!("{} (same as chat model, temperature 0)", decision.model_id),
        ),
    }
}

fn check_embedding(config: &AppConfig) -> CheckResult {
    let emb = &config.embedding;
    let local = emb.base_url.contains("localhost") || emb.base_url.contains("127.0.0.1");
    if !emb.base_url.starts_with("http") {
        return CheckResult::fail("Embeddings", format!("Invalid base URL '{}'", emb.base_url));
    }
    if !local && !has_key(&emb.api_key) {
        return CheckResult::fail(
            "Embeddings",
            format!("Remote endpoint {} without an API key", emb.base_url),
        );
    }
    CheckResult::ok(
        "Embeddings",
        format!("{} at {} ({} dims)", emb.model, emb.base_url, emb.dimensions),
    )
}

fn check_workflow(config: &AppConfig) -> CheckResult {
    match config.validate() {
        Ok(()) => {
            let wf = &config.workflow;
            CheckResult::ok(
                "Workflow",
                format!(
                    "top_k {}, max_rewrites {}, grader_concurrency {}, timeout {}s, policy {:?}, \
                     agent steps {}",
                    wf.top_k,
                    wf.max_rewrites,
                    wf.grader_concurrency,
                    wf.call_timeout_secs,
                    wf.relevance_policy,
                    wf.react_max_steps
                ),
            )
        }
        Err(e) => CheckResult::fail("Workflow", e.to_string()),
    }
}

async fn check_index(config: &AppConfig) -> CheckResult {
    let db_path = config.db_path();
    let embedder = Arc::new(HttpEmbeddingProvider::from_config(&config.embedding));
    let store = match SqliteVectorStore::open(&db_path, &config.store.collection, embedder) {
        Ok(store) => store,
        Err(e) => return CheckResult::fail("Index", format!("{}: {}", db_path.display(), e)),
    };
    match store.count().await {
        Ok(0) => CheckResult::fail(
            "Index",
            format!("{} is empty; run `ragloop ingest <file>`", db_path.display()),
        ),
        Ok(n) => CheckResult::ok(
            "Index",
            format!(
                "{} chunks in collection '{}' ({})",
                n,
                config.store.collection,
                db_path.display()
            ),
        ),
        Err(e) => CheckResult::fail("Index", format!("{}: {}", db_path.display(), e)),
    }
}

fn check_checkpoint(config: &AppConfig) -> CheckResult {
    let path = config.checkpoint_path();
    match IngestCheckpoint::load(&path) {
        Ok(None) => CheckResult::ok("Ingestion", "No ingestion in progress"),
        Ok(Some(cp)) if cp.is_complete() => CheckResult::ok(
            "Ingestion",
            format!("{} complete ({} pages)", cp.source, cp.total_pages),
        ),
        Ok(Some(cp)) => CheckResult::fail(
            "Ingestion",
            format!(
                "{} stopped at page {}/{}; rerun ingest to resume",
                cp.source, cp.processed_pages, cp.total_pages
            ),
        ),
        Err(e) => CheckResult::fail("Ingestion", format!("{}: {}", path.display(), e)),
    }
}
