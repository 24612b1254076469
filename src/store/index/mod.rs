
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::document::{Document, DocumentKind, Metadata, generate_id};
use crate::{RagError, Result};

const TABLE_NAME: &str = "documents";
const VECTOR_COLUMN: &str = "vector";

/// One stored row: a document payload next to its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub id: String,
    pub vector: Vec<f32>,
    pub doc_id: Option<String>,
    pub kind: String,
    pub content: String,
    /// JSON rendering of the document metadata
    pub metadata: String,
}

impl IndexRow {
    #[inline]
    pub fn from_document(document: &Document, vector: Vec<f32>) -> Result<Self> {
        let metadata = serde_json::to_string(&document.metadata)
            .map_err(|e| RagError::Validation(format!("Failed to encode metadata: {}", e)))?;
        Ok(Self {
            id: generate_id(),
            vector,
            doc_id: document.doc_id().map(str::to_string),
            kind: document.kind()?.as_str().to_string(),
            content: document.content.clone(),
            metadata,
        })
    }

    #[inline]
    pub fn decode(&self) -> Result<Document> {
        let metadata: Metadata = serde_json::from_str(&self.metadata).map_err(|e| {
            RagError::StorageIo(format!("Row {} has unreadable metadata: {}", self.id, e))
        })?;
        Ok(Document::new(self.content.clone(), metadata))
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.kind == DocumentKind::Init.as_str()
    }

    /// Key the row is tracked under: its `doc_id`, else its row id
    #[inline]
    pub fn key(&self) -> &str {
        self.doc_id.as_deref().unwrap_or(&self.id)
    }
}

/// A search hit; smaller distance is closer
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub row: IndexRow,
    pub distance: f32,
}

/// Append-only vector index stored as a single LanceDB table
///
/// Rows are never deleted or rewritten in place. Anything other than an
/// append is expressed by building a new index in a fresh directory.
pub struct VectorIndex {
    table: Table,
    dimension: usize,
}

impl VectorIndex {
    /// Create an index in `dir` holding exactly `rows`
    ///
    /// An index cannot be empty, and every row must share one dimension.
    #[inline]
    pub async fn build(dir: &Path, rows: &[IndexRow]) -> Result<Self> {
        let dimension = rows
            .first()
            .map(|row| row.vector.len())
            .ok_or_else(|| RagError::Validation("An index needs at least one row".to_string()))?;
        if dimension == 0 {
            return Err(RagError::Validation(
                "Embeddings must not be empty".to_string(),
            ));
        }
        check_dimension(rows, dimension)?;

        std::fs::create_dir_all(dir).map_err(|e| {
            RagError::StorageIo(format!(
                "Failed to create index directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let connection = lancedb::connect(&dir.to_string_lossy())
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to open LanceDB: {}", e)))?;

        let schema = schema(dimension);
        let batch = record_batch(&schema, rows, dimension)?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), Arc::clone(&schema));
        let table = connection
            .create_table(TABLE_NAME, reader)
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to create table: {}", e)))?;

        debug!(
            "Built index at {} with {} rows of dimension {}",
            dir.display(),
            rows.len(),
            dimension
        );
        Ok(Self { table, dimension })
    }

    #[inline]
    pub async fn open(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            return Err(RagError::StorageIo(format!(
                "Index directory {} is missing",
                dir.display()
            )));
        }

        let connection = lancedb::connect(&dir.to_string_lossy())
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to open LanceDB: {}", e)))?;

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to open table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to get table schema: {}", e)))?;

        let dimension = schema
            .fields()
            .iter()
            .find(|field| field.name() == VECTOR_COLUMN)
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::StorageIo("Could not determine vector dimension".to_string())
            })?;

        Ok(Self { table, dimension })
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Append rows in a single commit
    #[inline]
    pub async fn append(&self, rows: &[IndexRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        check_dimension(rows, self.dimension)?;

        let schema = schema(self.dimension);
        let batch = record_batch(&schema, rows, self.dimension)?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to append rows: {}", e)))?;

        debug!("Appended {} rows", rows.len());
        Ok(())
    }

    /// Up to `limit` rows nearest to `vector`, closest first
    #[inline]
    pub async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredRow>> {
        if vector.len() != self.dimension {
            return Err(RagError::Validation(format!(
                "Query vector has dimension {}, index expects {}",
                vector.len(),
                self.dimension
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .table
            .vector_search(vector)
            .map_err(|e| RagError::StorageIo(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to read result stream: {}", e)))?
        {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>());
            for (position, row) in parse_batch(&batch)?.into_iter().enumerate() {
                let distance = distances.map_or(0.0, |d| {
                    if d.is_null(position) {
                        0.0
                    } else {
                        d.value(position)
                    }
                });
                hits.push(ScoredRow { row, distance });
            }
        }

        Ok(hits)
    }

    /// Every row in the index, in storage order
    #[inline]
    pub async fn scan(&self) -> Result<Vec<IndexRow>> {
        let count = self
            .table
            .count_rows(None)
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to count rows: {}", e)))?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .table
            .query()
            .limit(count)
            .execute()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to scan table: {}", e)))?;

        let mut rows = Vec::with_capacity(count);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::StorageIo(format!("Failed to read scan stream: {}", e)))?
        {
            rows.extend(parse_batch(&batch)?);
        }

        Ok(rows)
    }
}

fn check_dimension(rows: &[IndexRow], dimension: usize) -> Result<()> {
    match rows.iter().find(|row| row.vector.len() != dimension) {
        Some(row) => Err(RagError::Validation(format!(
            "Embedding for {} has dimension {}, index expects {}",
            row.key(),
            row.vector.len(),
            dimension
        ))),
        None => Ok(()),
    }
}

fn schema(dimension: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("doc_id", DataType::Utf8, true),
        Field::new("kind", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

fn record_batch(schema: &Arc<Schema>, rows: &[IndexRow], dimension: usize) -> Result<RecordBatch> {
    let flat_values: Vec<f32> = rows
        .iter()
        .flat_map(|row| row.vector.iter().copied())
        .collect();
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vectors = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RagError::StorageIo(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.id.as_str()))),
        Arc::new(vectors),
        Arc::new(StringArray::from(
            rows.iter().map(|r| r.doc_id.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.kind.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.content.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.metadata.as_str()))),
    ];

    RecordBatch::try_new(Arc::clone(schema), arrays)
        .map_err(|e| RagError::StorageIo(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::StorageIo(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::StorageIo(format!("Invalid {} column type", name)))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<IndexRow>> {
    let ids = string_column(batch, "id")?;
    let doc_ids = string_column(batch, "doc_id")?;
    let kinds = string_column(batch, "kind")?;
    let contents = string_column(batch, "content")?;
    let metadata = string_column(batch, "metadata")?;
    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .ok_or_else(|| RagError::StorageIo("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| RagError::StorageIo("Invalid vector column type".to_string()))?;

    (0..batch.num_rows())
        .map(|row| {
            let values = vectors.value(row);
            let vector = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::StorageIo("Invalid vector item type".to_string()))?
                .values()
                .to_vec();

            Ok(IndexRow {
                id: ids.value(row).to_string(),
                vector,
                doc_id: if doc_ids.is_null(row) {
                    None
                } else {
                    Some(doc_ids.value(row).to_string())
                },
                kind: kinds.value(row).to_string(),
                content: contents.value(row).to_string(),
                metadata: metadata.value(row).to_string(),
            })
        })
        .collect()
}
