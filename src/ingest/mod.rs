// Ingestion module
// Turns submitted text and fetched pages into stored documents


use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::IngestionConfig;
use crate::crawler::{PageFetcher, fetch_page};
use crate::embeddings::chunking::{ChunkingConfig, chunk_text};
use crate::llm::ProductExtractor;
use crate::registry::CollectionRegistry;
use crate::store::document::DEFAULT_SOURCE;
use crate::store::{DescriptionDocument, ProductDocument};
use crate::{RagError, Result};

/// What an ingestion call stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub doc_ids: Vec<String>,
    /// Pages that could not be fetched; their content was skipped
    pub failed_urls: Vec<Url>,
}

impl IngestReport {
    #[inline]
    pub fn stored(&self) -> usize {
        self.doc_ids.len()
    }
}

/// Chunks of one page, tagged with where they came from
#[derive(Debug, Clone)]
struct SourcedChunk {
    content: String,
    source: String,
    title: Option<String>,
}

pub struct Ingestor {
    registry: Arc<CollectionRegistry>,
    extractor: Arc<dyn ProductExtractor>,
    fetcher: Arc<dyn PageFetcher>,
    config: IngestionConfig,
}

impl Ingestor {
    #[inline]
    pub fn new(
        registry: Arc<CollectionRegistry>,
        extractor: Arc<dyn ProductExtractor>,
        fetcher: Arc<dyn PageFetcher>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            registry,
            extractor,
            fetcher,
            config,
        }
    }

    /// Split free text into description documents and store them
    #[inline]
    pub async fn ingest_description_text(&self, text: &str) -> Result<IngestReport> {
        self.check_length(text)?;

        let chunks: Vec<SourcedChunk> = chunk_text(text, &self.config.description_chunking)
            .into_iter()
            .map(|chunk| SourcedChunk {
                content: chunk.content,
                source: DEFAULT_SOURCE.to_string(),
                title: None,
            })
            .collect();

        let doc_ids = self.store_descriptions(chunks).await?;
        Ok(IngestReport {
            doc_ids,
            failed_urls: Vec::new(),
        })
    }

    /// Fetch pages and store their text as description documents
    #[inline]
    pub async fn ingest_description_urls(&self, urls: &[Url]) -> Result<IngestReport> {
        let (chunks, failed_urls) = self.fetch_chunks(urls, &self.config.description_chunking)?;
        if chunks.is_empty() {
            return Err(RagError::Validation(
                "No readable text found at the given URLs".to_string(),
            ));
        }

        let doc_ids = self.store_descriptions(chunks).await?;
        Ok(IngestReport {
            doc_ids,
            failed_urls,
        })
    }

    /// Extract products from free text and store them
    #[inline]
    pub async fn ingest_product_text(&self, text: &str) -> Result<IngestReport> {
        self.check_length(text)?;

        let chunks: Vec<String> = chunk_text(text, &self.config.product_chunking)
            .into_iter()
            .take(self.config.max_product_chunks_text)
            .map(|chunk| chunk.content)
            .collect();

        let products = self.extract(&chunks, DEFAULT_SOURCE)?;
        if products.is_empty() {
            return Err(RagError::Validation(
                "No products could be extracted from the text".to_string(),
            ));
        }

        let doc_ids = self.registry.add_products(products).await?;
        Ok(IngestReport {
            doc_ids,
            failed_urls: Vec::new(),
        })
    }

    /// Fetch pages, extract products from them and store the products
    #[inline]
    pub async fn ingest_product_urls(&self, urls: &[Url]) -> Result<IngestReport> {
        let (chunks, failed_urls) = self.fetch_chunks(urls, &self.config.product_chunking)?;

        let mut products = Vec::new();
        for chunk in chunks.iter().take(self.config.max_product_chunks_urls) {
            products.extend(self.extract(std::slice::from_ref(&chunk.content), &chunk.source)?);
        }
        if products.is_empty() {
            return Err(RagError::Validation(
                "No products could be extracted from the given URLs".to_string(),
            ));
        }

        let doc_ids = self.registry.add_products(products).await?;
        Ok(IngestReport {
            doc_ids,
            failed_urls,
        })
    }

    fn check_length(&self, text: &str) -> Result<()> {
        let length = text.trim().chars().count();
        if length < self.config.min_text_length {
            return Err(RagError::Validation(format!(
                "Text must be at least {} characters long, got {}",
                self.config.min_text_length, length
            )));
        }
        Ok(())
    }

    /// Run extraction over `chunks`, validating every record
    fn extract(&self, chunks: &[String], source: &str) -> Result<Vec<ProductDocument>> {
        let mut products = Vec::new();
        for chunk in chunks {
            let records = self
                .extractor
                .extract_products(chunk)
                .map_err(|e| RagError::dependency(&e))?;
            debug!("Chunk yielded {} products", records.len());
            products.extend(records.into_iter().map(|record| {
                let mut product = ProductDocument::new(record);
                product.source = Some(source.to_string());
                product
            }));
        }

        for product in &products {
            product.record.validate()?;
        }
        Ok(products)
    }

    fn fetch_chunks(
        &self,
        urls: &[Url],
        chunking: &ChunkingConfig,
    ) -> Result<(Vec<SourcedChunk>, Vec<Url>)> {
        if urls.is_empty() {
            return Err(RagError::Validation("At least one URL is required".to_string()));
        }

        let mut chunks = Vec::new();
        let mut failed = Vec::new();
        for url in urls {
            match fetch_page(self.fetcher.as_ref(), url) {
                Ok(page) => {
                    let before = chunks.len();
                    chunks.extend(chunk_text(&page.text, chunking).into_iter().map(|chunk| {
                        SourcedChunk {
                            content: chunk.content,
                            source: url.to_string(),
                            title: page.title.clone(),
                        }
                    }));
                    debug!("{} produced {} chunks", url, chunks.len() - before);
                }
                Err(e) => {
                    warn!("Skipping {}: {:#}", url, e);
                    failed.push(url.clone());
                }
            }
        }

        if failed.len() == urls.len() {
            return Err(RagError::Dependency(format!(
                "None of the {} URLs could be fetched",
                urls.len()
            )));
        }
        Ok((chunks, failed))
    }

    async fn store_descriptions(&self, chunks: Vec<SourcedChunk>) -> Result<Vec<String>> {
        let documents: Vec<DescriptionDocument> = chunks
            .into_iter()
            .map(|chunk| {
                let mut document = DescriptionDocument::new(chunk.content);
                document.source = chunk.source;
                if let Some(title) = chunk.title {
                    document.title = title;
                }
                document
            })
            .collect();

        let doc_ids = self.registry.add_descriptions(documents).await?;
        info!("Stored {} description chunks", doc_ids.len());
        Ok(doc_ids)
    }
}
