use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Connection settings for the server, read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub ollama_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    /// Optional JSON file with the default graph builder config.
    pub graph_config: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: "password".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            llm_model: "llama3.1".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            graph_config: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            neo4j_uri: lookup("NEO4J_URI").unwrap_or(defaults.neo4j_uri),
            neo4j_user: lookup("NEO4J_USER").unwrap_or(defaults.neo4j_user),
            neo4j_password: lookup("NEO4J_PASSWORD").unwrap_or(defaults.neo4j_password),
            ollama_url: lookup("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            llm_model: lookup("LLM_MODEL").unwrap_or(defaults.llm_model),
            embedding_model: lookup("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            graph_config: lookup("GRAPH_CONFIG").map(PathBuf::from),
        }
    }
}
