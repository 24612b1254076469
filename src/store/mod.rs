// Document store module
// Mutable document collections over an append-only vector index

pub mod document;
mod index;
mod layout;


pub use document::{
    CollectionDocument, DescriptionDocument, Document, DocumentKind, Metadata, MetadataValue,
    ProductDocument, ProductRecord,
};

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::embeddings::Embedder;
use crate::{RagError, Result};
use document::{DOC_ID_KEY, NAME_KEY, PRODUCT_ID_KEY, TYPE_KEY, UPDATED_AT_KEY, timestamp};
use index::{IndexRow, VectorIndex};
use layout::{CollectionLayout, CollectionLock};

/// Default number of rows `list_all` returns
pub const DEFAULT_LIST_CAP: usize = 100;

/// Where a store lives and what it accepts
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub name: String,
    /// Directory holding the generation pointer and generation directories
    pub root: PathBuf,
    /// The only document kind this collection stores
    pub accepts: DocumentKind,
    /// Generic query used to approximate enumeration in `list_all`
    pub probe: String,
    pub list_cap: usize,
}

/// Which documents `remove` deletes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveSelector {
    /// Exact `doc_id` match
    ById(String),
    /// Metadata `name` match; falls back to the `name` inside serialized
    /// product content only when no metadata matches
    ByName(String),
}

/// Partial update applied by `update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    /// Replacement content; `None` keeps the stored text
    pub content: Option<String>,
    /// Fields merged over the stored metadata
    pub metadata: Metadata,
}

/// An entry returned by listing
#[derive(Debug, Clone, PartialEq)]
pub enum ListedDocument {
    Document(Document),
    /// A row whose metadata could not be decoded
    Raw {
        id: String,
        content: String,
        metadata: String,
    },
}

impl ListedDocument {
    #[inline]
    pub fn document(&self) -> Option<&Document> {
        match self {
            Self::Document(document) => Some(document),
            Self::Raw { .. } => None,
        }
    }

    #[inline]
    pub fn content(&self) -> &str {
        match self {
            Self::Document(document) => &document.content,
            Self::Raw { content, .. } => content,
        }
    }

    fn from_row(row: &IndexRow) -> Self {
        match row.decode() {
            Ok(document) => Self::Document(document),
            Err(e) => {
                warn!("Listing row {} as raw: {}", row.id, e);
                Self::Raw {
                    id: row.id.clone(),
                    content: row.content.clone(),
                    metadata: row.metadata.clone(),
                }
            }
        }
    }
}

/// The live generation as read from disk
struct Snapshot {
    generation: String,
    index: VectorIndex,
    entries: BTreeMap<String, IndexRow>,
    sentinel: Option<IndexRow>,
}

impl Snapshot {
    async fn read(name: &str, layout: &CollectionLayout) -> Result<Self> {
        let generation = layout
            .read_current()?
            .ok_or_else(|| not_initialized(name, layout))?;

        let index = VectorIndex::open(&layout.generation_dir(&generation)).await?;
        let rows = index.scan().await?;

        let mut entries = BTreeMap::new();
        let mut sentinel = None;
        for row in rows {
            if row.is_sentinel() {
                sentinel = Some(row);
                continue;
            }
            if let Some(previous) = entries.insert(row.key().to_string(), row) {
                warn!(
                    "Collection {} holds more than one row for {}",
                    name,
                    previous.key()
                );
            }
        }

        Ok(Self {
            generation,
            index,
            entries,
            sentinel,
        })
    }
}

fn not_initialized(name: &str, layout: &CollectionLayout) -> RagError {
    RagError::StorageIo(format!(
        "Collection {} is not initialized at {}",
        name,
        layout.root().display()
    ))
}

/// A named, persisted document collection
///
/// The live index always holds exactly the rows in `entries`, plus the
/// sentinel row when the collection was created or emptied. Adds append to
/// the live generation; updates and removals build a new generation and
/// swap the pointer, so the persisted collection is always either the state
/// before a mutation or the state after it.
///
/// Every mutation holds the collection's `LOCK` file and first re-reads the
/// live generation, so handles in other processes never overwrite each
/// other's writes.
pub struct DocumentStore {
    options: StoreOptions,
    layout: CollectionLayout,
    generation: String,
    index: VectorIndex,
    entries: BTreeMap<String, IndexRow>,
    /// Last known sentinel row, kept so an emptied store can reuse its vector
    sentinel: Option<IndexRow>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for DocumentStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("name", &self.options.name)
            .field("generation", &self.generation)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl DocumentStore {
    /// Whether a persisted copy exists at `root`
    #[inline]
    pub fn exists(root: impl Into<PathBuf>) -> Result<bool> {
        Ok(CollectionLayout::new(root).read_current()?.is_some())
    }

    /// Create the collection with only the sentinel row if nothing is
    /// persisted yet
    ///
    /// Returns `true` when a new collection was written.
    #[inline]
    pub async fn initialize(options: &StoreOptions, embedder: &dyn Embedder) -> Result<bool> {
        let layout = CollectionLayout::new(&options.root);
        if layout.read_current()?.is_some() {
            debug!("Collection {} already initialized", options.name);
            return Ok(false);
        }

        let sentinel = Document::sentinel();
        let vector = embedder
            .embed(&sentinel.content)
            .map_err(|e| RagError::dependency(&e))?;
        let row = IndexRow::from_document(&sentinel, vector)?;

        let _held = layout.lock().await?;
        if layout.read_current()?.is_some() {
            debug!("Collection {} was initialized by another handle", options.name);
            return Ok(false);
        }

        let generation = CollectionLayout::new_generation();
        let dir = layout.generation_dir(&generation);
        if let Err(e) = VectorIndex::build(&dir, std::slice::from_ref(&row)).await {
            layout.discard(&generation);
            return Err(e);
        }
        if let Err(e) = layout.commit(&generation) {
            layout.discard(&generation);
            return Err(e);
        }

        info!(
            "Initialized collection {} at {}",
            options.name,
            options.root.display()
        );
        Ok(true)
    }

    /// Read the persisted collection
    ///
    /// Fails with `StorageIo` when it is missing or unreadable; a missing
    /// collection needs `initialize` first. Stale generations are deleted
    /// only when no other handle holds the collection lock.
    #[inline]
    pub async fn load(options: StoreOptions, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let layout = CollectionLayout::new(&options.root);
        if layout.read_current()?.is_none() {
            return Err(not_initialized(&options.name, &layout));
        }

        let held = layout.try_lock()?;
        let snapshot = Snapshot::read(&options.name, &layout).await?;
        match &held {
            Some(held) => {
                let removed = layout.collect_garbage(held, &snapshot.generation);
                if removed > 0 {
                    debug!("Removed {} stale generations of {}", removed, options.name);
                }
            }
            None => debug!(
                "Collection {} is locked by a writer, skipping garbage collection",
                options.name
            ),
        }
        drop(held);

        info!(
            "Loaded collection {} ({} documents, generation {})",
            options.name,
            snapshot.entries.len(),
            snapshot.generation
        );

        Ok(Self {
            options,
            layout,
            generation: snapshot.generation,
            index: snapshot.index,
            entries: snapshot.entries,
            sentinel: snapshot.sentinel,
            embedder,
        })
    }

    /// Initialize if needed, then load
    #[inline]
    pub async fn open(options: StoreOptions, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::initialize(&options, embedder.as_ref()).await?;
        Self::load(options, embedder).await
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.options.name
    }

    #[inline]
    pub const fn accepts(&self) -> DocumentKind {
        self.options.accepts
    }

    #[inline]
    pub fn generation(&self) -> &str {
        &self.generation
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, doc_id: &str) -> bool {
        self.entries.contains_key(doc_id)
    }

    #[inline]
    pub fn get(&self, doc_id: &str) -> Option<Document> {
        self.entries.get(doc_id).and_then(|row| row.decode().ok())
    }

    /// Exact enumeration of every stored document, ordered by `doc_id`
    #[inline]
    pub fn documents(&self) -> Vec<ListedDocument> {
        self.entries.values().map(ListedDocument::from_row).collect()
    }

    /// Add one document; returns its `doc_id`
    #[inline]
    pub async fn add(&mut self, document: Document) -> Result<String> {
        let mut ids = self.add_batch(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| RagError::StorageIo("Add produced no document".to_string()))
    }

    /// Add documents in one append commit
    ///
    /// Every document is validated and embedded before the index is touched.
    /// A `doc_id` already stored, or repeated within the batch, is rejected.
    #[inline]
    pub async fn add_batch(&mut self, documents: Vec<Document>) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        for document in &documents {
            self.check_acceptable(document)?;
        }
        self.check_unique(&documents)?;

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embed_all(&texts)?;

        let _held = self.lock_latest().await?;
        self.check_unique(&documents)?;

        let rows = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexRow::from_document(&document, vector))
            .collect::<Result<Vec<_>>>()?;

        self.index.append(&rows).await?;

        let ids: Vec<String> = rows.iter().map(|row| row.key().to_string()).collect();
        for row in rows {
            self.entries.insert(row.key().to_string(), row);
        }

        info!("Added {} documents to {}", ids.len(), self.options.name);
        Ok(ids)
    }

    /// Merge `patch` into the document stored under `doc_id` and rebuild
    ///
    /// Only the updated document is re-embedded; every other row keeps its
    /// stored vector.
    #[inline]
    pub async fn update(&mut self, doc_id: &str, patch: DocumentPatch) -> Result<Document> {
        let held = self.lock_latest().await?;
        let existing = self.entries.get(doc_id).ok_or_else(|| {
            RagError::NotFound(format!("Document {} not found in {}", doc_id, self.options.name))
        })?;
        let current = existing.decode()?;

        let mut metadata = current.metadata.clone();
        for (key, value) in patch.metadata {
            let locked = [TYPE_KEY, DOC_ID_KEY, PRODUCT_ID_KEY].contains(&key.as_str());
            if locked && current.metadata.get(&key).is_some_and(|old| old != &value) {
                return Err(RagError::Validation(format!(
                    "Field {} cannot be changed by an update",
                    key
                )));
            }
            metadata.insert(key, value);
        }
        metadata.insert(UPDATED_AT_KEY.to_string(), timestamp().into());

        let updated = Document::new(patch.content.unwrap_or(current.content), metadata);
        self.check_acceptable(&updated)?;

        let mut vectors = self.embed_all(std::slice::from_ref(&updated.content))?;
        let vector = vectors
            .pop()
            .ok_or_else(|| RagError::Dependency("Embedder returned no vector".to_string()))?;
        let updated_row = IndexRow::from_document(&updated, vector)?;

        let rows: Vec<IndexRow> = self
            .entries
            .iter()
            .filter(|(key, _)| key.as_str() != doc_id)
            .map(|(_, row)| row.clone())
            .chain(std::iter::once(updated_row))
            .collect();

        self.rebuild(rows, &held).await?;

        info!("Updated document {} in {}", doc_id, self.options.name);
        Ok(updated)
    }

    /// Delete every document matching `selector`; returns the removed ids
    #[inline]
    pub async fn remove(&mut self, selector: &RemoveSelector) -> Result<Vec<String>> {
        let held = self.lock_latest().await?;
        let matches = self.resolve(selector);
        if matches.is_empty() {
            return Err(RagError::NotFound(format!(
                "No document in {} matches {:?}",
                self.options.name, selector
            )));
        }

        let mut rows: Vec<IndexRow> = self
            .entries
            .iter()
            .filter(|(key, _)| !matches.contains(key))
            .map(|(_, row)| row.clone())
            .collect();

        if rows.is_empty() {
            rows.push(self.sentinel_row()?);
        }

        self.rebuild(rows, &held).await?;

        info!(
            "Removed {} documents from {}",
            matches.len(),
            self.options.name
        );
        Ok(matches)
    }

    /// Approximate enumeration: a similarity query for the collection's
    /// probe text, capped at `list_cap` rows
    ///
    /// Documents far from the probe may be missing once the collection
    /// outgrows the cap. `documents` gives the exact set.
    #[inline]
    pub async fn list_all(&self) -> Result<Vec<ListedDocument>> {
        let probe = self
            .embedder
            .embed(&self.options.probe)
            .map_err(|e| RagError::dependency(&e))?;

        let hits = self
            .index
            .search(&probe, self.options.list_cap.saturating_add(1))
            .await?;

        let listed: Vec<ListedDocument> = hits
            .iter()
            .filter(|hit| !hit.row.is_sentinel())
            .take(self.options.list_cap)
            .map(|hit| ListedDocument::from_row(&hit.row))
            .collect();

        debug!("Listed {} documents from {}", listed.len(), self.options.name);
        Ok(listed)
    }

    /// Up to `k` documents closest to `query`
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::dependency(&e))?;
        self.search_by_vector(&vector, k).await
    }

    /// Up to `k` documents closest to an already embedded query
    #[inline]
    pub async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<Document>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let hits = self.index.search(vector, k.saturating_add(1)).await?;
        let documents = hits
            .into_iter()
            .filter(|hit| !hit.row.is_sentinel())
            .filter_map(|hit| match hit.row.decode() {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!("Skipping unreadable row in {}: {}", self.options.name, e);
                    None
                }
            })
            .take(k)
            .collect();

        Ok(documents)
    }

    /// Ids selected for removal; empty when nothing matches
    fn resolve(&self, selector: &RemoveSelector) -> Vec<String> {
        match selector {
            RemoveSelector::ById(doc_id) => {
                if self.entries.contains_key(doc_id) {
                    vec![doc_id.clone()]
                } else {
                    Vec::new()
                }
            }
            RemoveSelector::ByName(name) => {
                let by_metadata: Vec<String> = self
                    .entries
                    .iter()
                    .filter(|(_, row)| {
                        row.decode()
                            .is_ok_and(|document| document.text(NAME_KEY) == Some(name.as_str()))
                    })
                    .map(|(key, _)| key.clone())
                    .collect();
                if !by_metadata.is_empty() {
                    return by_metadata;
                }

                self.entries
                    .iter()
                    .filter(|(_, row)| {
                        ProductRecord::from_content(&row.content)
                            .is_ok_and(|record| record.name == *name)
                    })
                    .map(|(key, _)| key.clone())
                    .collect()
            }
        }
    }

    /// Take the collection lock and pick up writes made through other handles
    async fn lock_latest(&mut self) -> Result<CollectionLock> {
        let held = self.layout.lock().await?;
        let snapshot = Snapshot::read(&self.options.name, &self.layout).await?;
        if snapshot.generation != self.generation {
            debug!(
                "Collection {} moved from generation {} to {}",
                self.options.name, self.generation, snapshot.generation
            );
        }

        self.generation = snapshot.generation;
        self.index = snapshot.index;
        self.entries = snapshot.entries;
        if snapshot.sentinel.is_some() {
            self.sentinel = snapshot.sentinel;
        }
        Ok(held)
    }

    /// Reject ids already stored or repeated within `documents`
    fn check_unique(&self, documents: &[Document]) -> Result<()> {
        let mut seen = HashSet::new();
        for document in documents {
            let doc_id = document.doc_id().unwrap_or_default();
            if self.entries.contains_key(doc_id) || !seen.insert(doc_id) {
                return Err(RagError::Validation(format!(
                    "Document {} already exists in {}",
                    doc_id, self.options.name
                )));
            }
        }
        Ok(())
    }

    /// Build a new generation from `rows` and make it live
    ///
    /// On failure the half-written generation is discarded and the store
    /// keeps serving the previous one.
    async fn rebuild(&mut self, rows: Vec<IndexRow>, held: &CollectionLock) -> Result<()> {
        let generation = CollectionLayout::new_generation();
        let dir = self.layout.generation_dir(&generation);
        debug!(
            "Rebuilding {} into generation {} with {} rows",
            self.options.name,
            generation,
            rows.len()
        );

        let index = match VectorIndex::build(&dir, &rows).await {
            Ok(index) => index,
            Err(e) => {
                self.layout.discard(&generation);
                return Err(e);
            }
        };
        if let Err(e) = self.layout.commit(&generation) {
            self.layout.discard(&generation);
            return Err(e);
        }

        let mut entries = BTreeMap::new();
        for row in rows {
            if row.is_sentinel() {
                self.sentinel = Some(row);
            } else {
                entries.insert(row.key().to_string(), row);
            }
        }

        self.index = index;
        self.entries = entries;
        self.generation = generation;
        self.layout.collect_garbage(held, &self.generation);
        Ok(())
    }

    fn sentinel_row(&self) -> Result<IndexRow> {
        if let Some(row) = &self.sentinel {
            if row.vector.len() == self.index.dimension() {
                return Ok(row.clone());
            }
        }

        let sentinel = Document::sentinel();
        let vector = self
            .embedder
            .embed(&sentinel.content)
            .map_err(|e| RagError::dependency(&e))?;
        IndexRow::from_document(&sentinel, vector)
    }

    fn check_acceptable(&self, document: &Document) -> Result<()> {
        document.validate()?;
        let kind = document.kind()?;
        if kind != self.options.accepts {
            return Err(RagError::Validation(format!(
                "Collection {} stores {} documents, got {}",
                self.options.name, self.options.accepts, kind
            )));
        }
        Ok(())
    }

    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .embedder
            .embed_batch(texts)
            .map_err(|e| RagError::dependency(&e))?;
        if vectors.len() != texts.len() {
            return Err(RagError::Dependency(format!(
                "Embedder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}
