use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph,
    Query,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::identifier::to_node_label;

pub type Params = serde_json::Map<String, Value>;
pub type Record = serde_json::Map<String, Value>;

/// A Cypher statement with JSON parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Params,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}

/// Property graph access used by matching and export.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run_read(&self, statement: &Statement) -> Result<Vec<Record>>;

    /// Runs inside a single write transaction.
    async fn run_write(&self, statement: &Statement) -> Result<()>;

    /// Create a cosine vector index over `(:label).embedding` if it does not exist.
    async fn ensure_vector_index(&self, name: &str, label: &str, dimension: usize) -> Result<()> {
        let statement = Statement::new(format!(
            "CREATE VECTOR INDEX `{}` IF NOT EXISTS FOR (n:`{}`) ON (n.embedding) \
             OPTIONS {{indexConfig: {{`vector.dimensions`: {}, `vector.similarity_function`: 'cosine'}}}}",
            name.replace('`', ""),
            to_node_label(label),
            dimension
        ));
        self.run_write(&statement)
            .await
            .with_context(|| format!("Failed to create vector index {}", name))?;
        info!(index = name, label, dimension, "Vector index ready");
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
}

/// Counts of exported nodes and the relationships between them.
pub async fn graph_stats(store: &dyn GraphStore, embedded_label: &str) -> Result<GraphStats> {
    let label = to_node_label(embedded_label);

    let nodes = store
        .run_read(&Statement::new(format!("MATCH (e:`{}`) RETURN count(e) AS count", label)))
        .await?;
    let relations = store
        .run_read(&Statement::new(format!(
            "MATCH (:`{0}`)-[r]->(:`{0}`) RETURN count(r) AS count",
            label
        )))
        .await?;

    Ok(GraphStats {
        entity_count: first_count(&nodes),
        relation_count: first_count(&relations),
    })
}

fn first_count(records: &[Record]) -> usize {
    records
        .first()
        .and_then(|r| r.get("count"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

/// Neo4j over Bolt.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        Ok(Self::new(graph))
    }

    fn query(statement: &Statement) -> Query {
        statement
            .params
            .iter()
            .fold(neo4rs::query(&statement.text), |q, (key, value)| {
                q.param(key, to_bolt(value))
            })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run_read(&self, statement: &Statement) -> Result<Vec<Record>> {
        let mut stream = self
            .graph
            .execute(Self::query(statement))
            .await
            .context("Failed to run Neo4j read query")?;

        let mut records = Vec::new();
        while let Some(row) = stream.next().await.context("Failed to read Neo4j row")? {
            let record: Record = row.to().context("Failed to decode Neo4j row")?;
            records.push(record);
        }
        Ok(records)
    }

    async fn run_write(&self, statement: &Statement) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .context("Failed to open Neo4j transaction")?;
        txn.run(Self::query(statement))
            .await
            .context("Failed to run Neo4j write query")?;
        txn.commit().await.context("Failed to commit Neo4j transaction")?;
        Ok(())
    }
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::new(key), to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records statements and replays queued read results.
    #[derive(Default)]
    pub struct FakeGraphStore {
        pub reads: Mutex<Vec<Statement>>,
        pub writes: Mutex<Vec<Statement>>,
        pub read_results: Mutex<VecDeque<Result<Vec<Record>>>>,
        /// Writes whose index is listed here fail.
        pub failing_writes: Vec<usize>,
    }

    impl FakeGraphStore {
        pub fn with_reads(results: Vec<Result<Vec<Record>>>) -> Self {
            Self {
                read_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl GraphStore for FakeGraphStore {
        async fn run_read(&self, statement: &Statement) -> Result<Vec<Record>> {
            self.reads.lock().unwrap().push(statement.clone());
            self.read_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn run_write(&self, statement: &Statement) -> Result<()> {
            let mut writes = self.writes.lock().unwrap();
            let idx = writes.len();
            writes.push(statement.clone());
            if self.failing_writes.contains(&idx) {
                anyhow::bail!("Neo.ClientError.Procedure.ProcedureCallFailed");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeGraphStore;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_statement_params() {
        let statement = Statement::new("RETURN $x").param("x", 3).param("name", "acme");
        assert_eq!(statement.params["x"], json!(3));
        assert_eq!(statement.params["name"], json!("acme"));
    }

    #[test]
    fn test_to_bolt_nested() {
        let bolt = to_bolt(&json!({"labels": ["Company", "Embedded"], "score": 0.5, "n": 2, "x": null}));
        assert!(matches!(bolt, BoltType::Map(_)));
    }

    #[tokio::test]
    async fn test_ensure_vector_index_statement() {
        let store = FakeGraphStore::default();
        store.ensure_vector_index("embedded_entities_index", "Embedded", 1536).await.unwrap();

        let writes = store.writes.lock().unwrap();
        assert!(writes[0].text.contains("CREATE VECTOR INDEX `embedded_entities_index` IF NOT EXISTS"));
        assert!(writes[0].text.contains("(n:`Embedded`)"));
        assert!(writes[0].text.contains("`vector.dimensions`: 1536"));
    }

    #[tokio::test]
    async fn test_graph_stats() {
        let mut nodes = Record::new();
        nodes.insert("count".to_string(), json!(12));
        let mut rels = Record::new();
        rels.insert("count".to_string(), json!(7));
        let store = FakeGraphStore::with_reads(vec![Ok(vec![nodes]), Ok(vec![rels])]);

        let stats = graph_stats(&store, "Embedded").await.unwrap();
        assert_eq!(stats, GraphStats { entity_count: 12, relation_count: 7 });
    }
}
