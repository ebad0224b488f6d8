//! pgvector-backed chunk table: schema setup, batched inserts, nearest-neighbor lookups.

use std::fmt::Write as _;

use async_trait::async_trait;
use pgvector::Vector;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error, info};

use crate::embeddings::{ChunkRecord, StoredChunk};
use crate::error::RetrievalError;

/// Embedding width of the chunk table.
pub const EMBEDDING_DIMENSIONS: usize = 384;
/// HNSW graph degree (`m`).
pub const HNSW_M: u32 = 16;
/// HNSW construction search breadth (`ef_construction`).
pub const HNSW_EF_CONSTRUCTION: u32 = 64;

const INSERT_COLUMNS: usize = 5;
// Keeps each statement well under the 65535 bind-parameter ceiling.
const ROWS_PER_STATEMENT: usize = 1000;

/// Errors raised while preparing or writing the chunk table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Postgres rejected a statement or the connection failed.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// Record embedding width differs from the table's vector width.
    #[error("embedding has {actual} dimensions, table expects {expected}")]
    DimensionMismatch {
        /// Declared table width.
        expected: usize,
        /// Width of the offending vector.
        actual: usize,
    },
    /// Schema or table name is blank.
    #[error("{0} name is required")]
    InvalidName(&'static str),
    /// Numeric field does not fit its column.
    #[error("{field} value {value} exceeds column range")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: usize,
    },
}

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self, StoreError>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() {
            return Err(StoreError::InvalidName("schema"));
        }
        if table.trim().is_empty() {
            return Err(StoreError::InvalidName("table"));
        }
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Returns the raw schema string.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the raw table string.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Index name used for the HNSW embedding index.
    pub fn embedding_index_name(&self) -> String {
        format!("{}_embedding_idx", sanitize_ident(&self.table))
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "embeddings".to_string(),
        }
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Destination for embedded chunks during ingestion.
///
/// Writes accumulate in an open unit of work until [`ChunkSink::commit`].
#[async_trait]
pub trait ChunkSink: Send {
    /// Inserts a batch of records, returning the number of rows written.
    async fn write_batch(&mut self, records: &[ChunkRecord]) -> Result<u64, StoreError>;

    /// Makes every write since the previous commit durable.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

/// Nearest-neighbor lookup over stored chunk embeddings.
#[async_trait]
pub trait ChunkRetriever: Send + Sync {
    /// Returns up to `limit` chunks ordered by ascending cosine distance to `query`.
    async fn nearest(&self, query: &[f32], limit: usize)
        -> Result<Vec<StoredChunk>, RetrievalError>;
}

/// Chunk table living in a pgvector-enabled Postgres database.
///
/// Owns the client for the lifetime of the process; dropping the store drops
/// the client, which ends the connection task.
pub struct PgVectorStore {
    client: Client,
    connection: JoinHandle<()>,
    table: TableName,
    dimensions: usize,
    nearest_sql: String,
    in_transaction: bool,
}

impl PgVectorStore {
    /// Connects to Postgres and spawns the connection driver.
    pub async fn connect(
        config: &Config,
        table: TableName,
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let (client, connection) = config.connect(NoTls).await?;
        let connection = tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        info!(table = %table.qualified(), "connected to postgres");
        let nearest_sql = nearest_sql(&table);
        Ok(Self {
            client,
            connection,
            table,
            dimensions,
            nearest_sql,
            in_transaction: false,
        })
    }

    /// Target table.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Declared embedding width.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Creates the extension, table and HNSW index when missing.
    pub async fn prepare(&self) -> Result<(), StoreError> {
        self.client
            .batch_execute("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;
        self.client
            .batch_execute(&create_table_sql(&self.table, self.dimensions))
            .await?;
        self.client
            .batch_execute(&create_index_sql(&self.table))
            .await?;
        debug!(table = %self.table.qualified(), "chunk table ready");
        Ok(())
    }

    /// Removes every stored chunk.
    pub async fn truncate(&self) -> Result<(), StoreError> {
        let sql = format!("TRUNCATE {}", self.table.qualified());
        self.client.batch_execute(&sql).await?;
        info!(table = %self.table.qualified(), "truncated chunk table");
        Ok(())
    }

    /// Number of stored chunk rows.
    pub async fn count(&self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table.qualified());
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.try_get(0)?)
    }

    /// Rolls back any open write, drops the client and waits for the connection task.
    pub async fn close(mut self) {
        if self.in_transaction {
            if let Err(err) = self.client.batch_execute("ROLLBACK").await {
                error!(error = %err, "failed to roll back open transaction");
            }
            self.in_transaction = false;
        }
        let Self {
            client, connection, ..
        } = self;
        drop(client);
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection task failed");
        }
    }

    async fn insert_rows(&self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
        let tokens = records
            .iter()
            .map(|record| as_i32(record.token_count, "tokens"))
            .collect::<Result<Vec<_>, _>>()?;
        let vectors: Vec<Vector> = records
            .iter()
            .map(|record| Vector::from(record.embedding.clone()))
            .collect();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(records.len() * INSERT_COLUMNS);
        for ((record, tokens), vector) in records.iter().zip(&tokens).zip(&vectors) {
            params.push(&record.title);
            params.push(&record.url);
            params.push(&record.content);
            params.push(tokens);
            params.push(vector);
        }
        let sql = insert_sql(&self.table, records.len());
        Ok(self.client.execute(&sql, &params).await?)
    }
}

#[async_trait]
impl ChunkSink for PgVectorStore {
    async fn write_batch(&mut self, records: &[ChunkRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        for record in records {
            check_dimensions(self.dimensions, record.embedding.len())?;
        }
        if !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        let mut inserted = 0u64;
        for batch in records.chunks(ROWS_PER_STATEMENT) {
            inserted += self.insert_rows(batch).await?;
        }
        Ok(inserted)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkRetriever for PgVectorStore {
    async fn nearest(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<StoredChunk>, RetrievalError> {
        if let Err(StoreError::DimensionMismatch { expected, actual }) =
            check_dimensions(self.dimensions, query.len())
        {
            return Err(RetrievalError::DimensionMismatch { expected, actual });
        }
        let vector = Vector::from(query.to_vec());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(&self.nearest_sql, &[&vector, &limit])
            .await
            .map_err(RetrievalError::from_postgres)?;
        rows.iter()
            .map(stored_chunk)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RetrievalError::from_postgres)
    }
}

/// Rejects vectors whose width differs from the table's declared width.
pub fn check_dimensions(expected: usize, actual: usize) -> Result<(), StoreError> {
    if actual != expected {
        return Err(StoreError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

fn stored_chunk(row: &Row) -> Result<StoredChunk, tokio_postgres::Error> {
    let tokens: Option<i32> = row.try_get("tokens")?;
    Ok(StoredChunk {
        id: row.try_get("id")?,
        title: row.try_get::<_, Option<String>>("title")?.unwrap_or_default(),
        url: row.try_get::<_, Option<String>>("url")?.unwrap_or_default(),
        content: row
            .try_get::<_, Option<String>>("content")?
            .unwrap_or_default(),
        token_count: tokens.and_then(|t| usize::try_from(t).ok()).unwrap_or(0),
        distance: row.try_get("distance")?,
    })
}

fn create_table_sql(table: &TableName, dims: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            title TEXT,
            url TEXT,
            content TEXT,
            tokens INTEGER,
            embedding VECTOR({dims})
        )",
        table.qualified()
    )
}

fn create_index_sql(table: &TableName) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} \
            USING hnsw (embedding vector_cosine_ops) \
            WITH (m = {HNSW_M}, ef_construction = {HNSW_EF_CONSTRUCTION})",
        quote_ident(&table.embedding_index_name()),
        table.qualified()
    )
}

fn insert_sql(table: &TableName, rows: usize) -> String {
    let mut sql = format!(
        "INSERT INTO {} (title, url, content, tokens, embedding) VALUES ",
        table.qualified()
    );
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        let base = row * INSERT_COLUMNS;
        let _ = write!(
            sql,
            "(${}, ${}, ${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5
        );
    }
    sql
}

fn nearest_sql(table: &TableName) -> String {
    format!(
        "SELECT id, title, url, content, tokens, embedding <=> $1 AS distance \
            FROM {} ORDER BY embedding <=> $1 LIMIT $2",
        table.qualified()
    )
}

fn as_i32(value: usize, field: &'static str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange { field, value })
}
