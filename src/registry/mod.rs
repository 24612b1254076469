// Collection registry module
// Owns the description and product stores and opens them on first use

mod catalog;

#[cfg(test)]
mod tests;

pub use catalog::{CollectionStatus, ProductPatch};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::store::{DocumentKind, DocumentStore, StoreOptions};
use crate::{RagError, Result};

/// A store behind a single-writer lock
pub type SharedStore = Arc<RwLock<DocumentStore>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Description,
    Product,
}

impl CollectionName {
    pub const ALL: [Self; 2] = [Self::Description, Self::Product];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Product => "product",
        }
    }

    #[inline]
    pub const fn kind(self) -> DocumentKind {
        match self {
            Self::Description => DocumentKind::Description,
            Self::Product => DocumentKind::Product,
        }
    }
}

impl fmt::Display for CollectionName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "description" | "descriptions" => Ok(Self::Description),
            "product" | "products" => Ok(Self::Product),
            other => Err(RagError::Validation(format!(
                "Unknown collection: {} (expected description or product)",
                other
            ))),
        }
    }
}

/// The two collections of a deployment
///
/// Stores are opened lazily. Concurrent first calls for the same name wait
/// on one initialization instead of racing to create the collection.
pub struct CollectionRegistry {
    vectors_dir: PathBuf,
    list_cap: usize,
    /// Shortest description text accepted by manual add and update
    min_text_length: usize,
    description_probe: String,
    product_probe: String,
    embedder: Arc<dyn Embedder>,
    description: OnceCell<SharedStore>,
    product: OnceCell<SharedStore>,
}

impl fmt::Debug for CollectionRegistry {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRegistry")
            .field("vectors_dir", &self.vectors_dir)
            .field("description_loaded", &self.description.initialized())
            .field("product_loaded", &self.product.initialized())
            .finish_non_exhaustive()
    }
}

impl CollectionRegistry {
    #[inline]
    pub fn new(config: &Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vectors_dir: config.vector_database_path(),
            list_cap: config.collections.list_cap,
            min_text_length: config.ingestion.min_text_length,
            description_probe: config.collections.description_probe.clone(),
            product_probe: config.collections.product_probe.clone(),
            embedder,
            description: OnceCell::new(),
            product: OnceCell::new(),
        }
    }

    #[inline]
    pub fn vectors_dir(&self) -> &Path {
        &self.vectors_dir
    }

    /// Deterministic directory of a collection
    #[inline]
    pub fn collection_path(&self, name: CollectionName) -> PathBuf {
        self.vectors_dir.join(name.as_str())
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// The store for `name`, initializing and loading it on first access
    #[inline]
    pub async fn get(&self, name: CollectionName) -> Result<SharedStore> {
        let cell = match name {
            CollectionName::Description => &self.description,
            CollectionName::Product => &self.product,
        };

        let store = cell
            .get_or_try_init(|| async {
                debug!("Opening collection {}", name);
                let store = DocumentStore::open(self.options(name), Arc::clone(&self.embedder))
                    .await?;
                Ok::<_, RagError>(Arc::new(RwLock::new(store)))
            })
            .await?;

        Ok(Arc::clone(store))
    }

    #[inline]
    pub async fn description(&self) -> Result<SharedStore> {
        self.get(CollectionName::Description).await
    }

    #[inline]
    pub async fn product(&self) -> Result<SharedStore> {
        self.get(CollectionName::Product).await
    }

    fn options(&self, name: CollectionName) -> StoreOptions {
        let probe = match name {
            CollectionName::Description => &self.description_probe,
            CollectionName::Product => &self.product_probe,
        };
        StoreOptions {
            name: name.as_str().to_string(),
            root: self.collection_path(name),
            accepts: name.kind(),
            probe: probe.clone(),
            list_cap: self.list_cap,
        }
    }
}
