use std::path::PathBuf;
use tracing::info;

use super::{CollectionName, CollectionRegistry};
use crate::store::document::{NAME_KEY, PRICE_KEY, SOURCE_KEY, TITLE_KEY};
use crate::store::{
    CollectionDocument, DescriptionDocument, Document, DocumentPatch, ListedDocument, Metadata,
    ProductDocument, RemoveSelector,
};
use crate::{RagError, Result};

/// Fields of a product to overwrite; `None` keeps the stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub specifications: Option<String>,
    pub features: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub name: CollectionName,
    pub documents: usize,
    pub generation: String,
    pub path: PathBuf,
}

impl CollectionRegistry {
    #[inline]
    pub async fn add_descriptions(&self, documents: Vec<DescriptionDocument>) -> Result<Vec<String>> {
        let documents = documents
            .into_iter()
            .map(|doc| CollectionDocument::Description(doc).into_document())
            .collect::<Result<Vec<_>>>()?;

        let store = self.description().await?;
        let mut store = store.write().await;
        store.add_batch(documents).await
    }

    /// Add one manually written description
    ///
    /// Unlike ingested chunks, the text must reach the configured minimum
    /// length.
    #[inline]
    pub async fn add_description(&self, document: DescriptionDocument) -> Result<String> {
        self.check_length(&document.content)?;
        let mut ids = self.add_descriptions(vec![document]).await?;
        ids.pop()
            .ok_or_else(|| RagError::StorageIo("Add produced no document".to_string()))
    }

    #[inline]
    pub async fn update_description(
        &self,
        doc_id: &str,
        content: Option<String>,
        title: Option<String>,
    ) -> Result<DescriptionDocument> {
        if let Some(content) = &content {
            self.check_length(content)?;
        }
        let mut patch = DocumentPatch {
            content,
            metadata: Metadata::new(),
        };
        if let Some(title) = title {
            patch.metadata.insert(TITLE_KEY.to_string(), title.into());
        }

        let store = self.description().await?;
        let mut store = store.write().await;
        let updated = store.update(doc_id, patch).await?;
        match CollectionDocument::from_document(&updated)? {
            CollectionDocument::Description(description) => Ok(description),
            other => Err(RagError::Validation(format!(
                "Expected a description, found {}",
                other.kind()
            ))),
        }
    }

    #[inline]
    pub async fn remove_description(&self, doc_id: &str) -> Result<Vec<String>> {
        let store = self.description().await?;
        let mut store = store.write().await;
        store
            .remove(&RemoveSelector::ById(doc_id.to_string()))
            .await
    }

    #[inline]
    pub async fn add_products(&self, products: Vec<ProductDocument>) -> Result<Vec<String>> {
        let documents = products
            .into_iter()
            .map(|product| CollectionDocument::Product(product).into_document())
            .collect::<Result<Vec<_>>>()?;

        let store = self.product().await?;
        let mut store = store.write().await;
        let ids = store.add_batch(documents).await?;
        info!("Stored {} products", ids.len());
        Ok(ids)
    }

    #[inline]
    pub async fn add_product(&self, product: ProductDocument) -> Result<String> {
        let mut ids = self.add_products(vec![product]).await?;
        ids.pop()
            .ok_or_else(|| RagError::StorageIo("Add produced no document".to_string()))
    }

    /// Apply `patch` to the product stored under `product_id`
    ///
    /// The serialized record and the mirrored metadata fields change together.
    #[inline]
    pub async fn update_product(
        &self,
        product_id: &str,
        patch: ProductPatch,
    ) -> Result<ProductDocument> {
        let store = self.product().await?;
        let mut store = store.write().await;

        let stored = store.get(product_id).ok_or_else(|| {
            RagError::NotFound(format!("Product {} not found", product_id))
        })?;
        let CollectionDocument::Product(mut product) = CollectionDocument::from_document(&stored)?
        else {
            return Err(RagError::Validation(format!(
                "Document {} is not a product",
                product_id
            )));
        };

        let record = &mut product.record;
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if patch.price.is_some() {
            record.price = patch.price;
        }
        if patch.specifications.is_some() {
            record.specifications = patch.specifications;
        }
        if patch.features.is_some() {
            record.features = patch.features;
        }
        record.validate()?;

        let mut metadata = Metadata::new();
        metadata.insert(NAME_KEY.to_string(), record.name.clone().into());
        if let Some(price) = record.price {
            metadata.insert(PRICE_KEY.to_string(), price.into());
        }
        if let Some(source) = patch.source {
            metadata.insert(SOURCE_KEY.to_string(), source.into());
        }

        let updated = store
            .update(
                product_id,
                DocumentPatch {
                    content: Some(record.to_content()?),
                    metadata,
                },
            )
            .await?;

        match CollectionDocument::from_document(&updated)? {
            CollectionDocument::Product(product) => Ok(product),
            other => Err(RagError::Validation(format!(
                "Expected a product, found {}",
                other.kind()
            ))),
        }
    }

    #[inline]
    pub async fn remove_products(&self, selector: &RemoveSelector) -> Result<Vec<String>> {
        let store = self.product().await?;
        let mut store = store.write().await;
        store.remove(selector).await
    }

    /// Probe-based listing of a collection
    #[inline]
    pub async fn list(&self, name: CollectionName) -> Result<Vec<ListedDocument>> {
        let store = self.get(name).await?;
        let store = store.read().await;
        store.list_all().await
    }

    /// Every document of a collection, read from the in-memory entry map
    #[inline]
    pub async fn documents(&self, name: CollectionName) -> Result<Vec<ListedDocument>> {
        let store = self.get(name).await?;
        let store = store.read().await;
        Ok(store.documents())
    }

    #[inline]
    pub async fn get_document(&self, name: CollectionName, doc_id: &str) -> Result<Document> {
        let store = self.get(name).await?;
        let store = store.read().await;
        store
            .get(doc_id)
            .ok_or_else(|| RagError::NotFound(format!("Document {} not found in {}", doc_id, name)))
    }

    #[inline]
    pub async fn status(&self) -> Result<Vec<CollectionStatus>> {
        let mut statuses = Vec::with_capacity(CollectionName::ALL.len());
        for name in CollectionName::ALL {
            let store = self.get(name).await?;
            let store = store.read().await;
            statuses.push(CollectionStatus {
                name,
                documents: store.len(),
                generation: store.generation().to_string(),
                path: self.collection_path(name),
            });
        }
        Ok(statuses)
    }

    fn check_length(&self, text: &str) -> Result<()> {
        let length = text.trim().chars().count();
        if length < self.min_text_length {
            return Err(RagError::Validation(format!(
                "Description must be at least {} characters long, got {}",
                self.min_text_length, length
            )));
        }
        Ok(())
    }
}
