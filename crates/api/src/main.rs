mod config;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use extract::{LanguageModel, OllamaClient, RetryPolicy};
use index::{Embedder, EmbeddingClient, EmbeddingConfig, GraphStats, GraphStore, Neo4jStore, Statement};
use ingest::Document;
use pipeline::{GraphBuilder, GraphBuilderConfig, StageCounts};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::ServerConfig;

struct AppState {
    llm: Arc<dyn LanguageModel>,
    embedder: Arc<dyn Embedder>,
    graph: Arc<dyn GraphStore>,
    builder_config: GraphBuilderConfig,
    ollama_url: String,
}

#[derive(Serialize)]
struct HealthResponse {
    neo4j: String,
    ollama: String,
}

#[derive(Deserialize)]
struct BuildRequest {
    path: String,
    /// Overrides the server's graph builder config for this request.
    config: Option<Value>,
}

#[derive(Serialize)]
struct DocumentSummary {
    doc_id: String,
    source: String,
    chunks: usize,
    batches: usize,
    entities: usize,
    triplets: usize,
    counts: StageCounts,
}

#[derive(Serialize)]
struct BuildResponse {
    documents: Vec<DocumentSummary>,
    exported_triplets: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let server = ServerConfig::from_env();

    let builder_config = match &server.graph_config {
        Some(path) => GraphBuilderConfig::load(path).await?,
        None => GraphBuilderConfig::default(),
    };

    let graph = Neo4jStore::connect(&server.neo4j_uri, &server.neo4j_user, &server.neo4j_password).await?;

    let llm = OllamaClient::new(server.ollama_url.clone(), server.llm_model.clone());
    let embedder = EmbeddingClient::new(
        EmbeddingConfig {
            base_url: server.ollama_url.clone(),
            model: server.embedding_model.clone(),
            ..EmbeddingConfig::default()
        },
        RetryPolicy::from(&builder_config.pipeline.retry),
    );
    check_embedding_dimension(&embedder, builder_config.pipeline.neo4j_matcher.embedding_dimension).await;

    let state = Arc::new(AppState {
        llm: Arc::new(llm),
        embedder: Arc::new(embedder),
        graph: Arc::new(graph),
        builder_config,
        ollama_url: server.ollama_url.clone(),
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server.bind_addr))?;

    info!(addr = %server.bind_addr, "Server listening");

    axum::serve(listener, app).await.context("Server stopped")?;
    Ok(())
}

/// Warn when the embedding model disagrees with the configured vector index dimension.
async fn check_embedding_dimension(embedder: &dyn Embedder, expected: usize) -> bool {
    match embedder.get_dimension().await {
        Ok(actual) if actual == expected => {
            info!(dimension = actual, "Embedding dimension matches vector index");
            true
        }
        Ok(actual) => {
            warn!(actual, expected, "Embedding dimension differs from vector index; matching will find nothing");
            false
        }
        Err(e) => {
            warn!(error = %e, "Could not probe embedding dimension");
            false
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/build", post(build_graph))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let neo4j = match state.graph.run_read(&Statement::new("RETURN 1 AS ok")).await {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {:#}", e),
    };

    let ollama = match reqwest::get(format!("{}/api/tags", state.ollama_url)).await {
        Ok(resp) if resp.status().is_success() => "ok".to_string(),
        Ok(resp) => format!("error: status {}", resp.status()),
        Err(e) => format!("error: {}", e),
    };

    Json(HealthResponse { neo4j, ollama })
}

async fn load_documents(path: &Path) -> Result<Vec<Document>, StatusCode> {
    if !path.exists() {
        return Err(StatusCode::NOT_FOUND);
    }

    let result = if path.is_file() {
        ingest::ingest_file(path).await.map(|doc| vec![doc])
    } else if path.is_dir() {
        ingest::ingest_directory(path).await
    } else {
        return Err(StatusCode::BAD_REQUEST);
    };

    result.map_err(|e| {
        error!(path = ?path, error = %e, "Ingestion failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn build_graph(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BuildRequest>,
) -> Result<Json<BuildResponse>, StatusCode> {
    let builder_config = match req.config {
        Some(overrides) => GraphBuilderConfig::from_json_str(&overrides.to_string()).map_err(|e| {
            error!(error = %e, "Rejected graph builder config");
            StatusCode::BAD_REQUEST
        })?,
        None => state.builder_config.clone(),
    };

    let documents = load_documents(Path::new(&req.path)).await?;

    let builder = GraphBuilder::new(
        state.llm.clone(),
        state.embedder.clone(),
        state.graph.clone(),
        builder_config,
    );

    let mut summaries = Vec::with_capacity(documents.len());
    for document in &documents {
        let report = builder.build(document).await.map_err(|e| {
            error!(doc_id = %document.doc_id, error = %e, "Graph build failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

        summaries.push(DocumentSummary {
            doc_id: report.doc_id,
            source: document.source.clone(),
            chunks: document.len(),
            batches: report.batches,
            entities: report.entities.len(),
            triplets: report.triplets.len(),
            counts: report.counts,
        });
    }

    let exported_triplets = summaries.iter().map(|s| s.counts.exported_triplets).sum();
    Ok(Json(BuildResponse {
        documents: summaries,
        exported_triplets,
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<GraphStats>, StatusCode> {
    let stats = index::graph_stats(
        state.graph.as_ref(),
        &state.builder_config.pipeline.neo4j_exporter.node_label(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to read graph stats");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(stats))
}
