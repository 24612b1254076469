// Hybrid retrieval module
// Blends results from the description and product collections


use std::sync::Arc;
use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::llm::{AnswerGenerator, RatioSelector};
use crate::registry::CollectionRegistry;
use crate::store::Document;
use crate::{RagError, Result};

/// Ratio used when the selector returns something meaningless
pub const NEUTRAL_RATIO: f64 = 0.5;

/// Tolerance for ratios like 0.3 that are not exact in binary
const RATIO_EPSILON: f64 = 1e-9;

/// How many documents each collection contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalBudget {
    pub description: usize,
    pub product: usize,
}

impl RetrievalBudget {
    #[inline]
    pub const fn total(&self) -> usize {
        self.description + self.product
    }
}

/// Force a ratio into `[0, 1]`; NaN becomes the neutral blend
#[inline]
pub fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        NEUTRAL_RATIO
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

/// Split `total_k` between the collections
///
/// The description side gets `floor((1 - ratio) * total_k)`; the product
/// side gets the rest, so the parts always sum to `total_k`.
#[inline]
pub fn split_budget(ratio: f64, total_k: usize) -> RetrievalBudget {
    let ratio = clamp_ratio(ratio);
    let description = ((1.0 - ratio) * total_k as f64 + RATIO_EPSILON).floor() as usize;
    let description = description.min(total_k);
    RetrievalBudget {
        description,
        product: total_k - description,
    }
}

/// Documents retrieved for one query, description results first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedContext {
    pub ratio: f64,
    pub budget: RetrievalBudget,
    pub description: Vec<Document>,
    pub product: Vec<Document>,
}

impl RetrievedContext {
    #[inline]
    pub fn documents(&self) -> Vec<Document> {
        self.description
            .iter()
            .chain(&self.product)
            .cloned()
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.description.len() + self.product.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct HybridRetriever {
    registry: Arc<CollectionRegistry>,
    embedder: Arc<dyn Embedder>,
}

impl HybridRetriever {
    #[inline]
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        let embedder = Arc::clone(registry.embedder());
        Self { registry, embedder }
    }

    /// Pull up to `total_k` documents, split between the collections by
    /// `ratio`
    ///
    /// Each collection is searched for `total_k` candidates and cut to its
    /// share. A collection with fewer documents than its share contributes
    /// what it has.
    #[inline]
    pub async fn retrieve(&self, query: &str, ratio: f64, total_k: usize) -> Result<RetrievedContext> {
        let ratio = clamp_ratio(ratio);
        let budget = split_budget(ratio, total_k);
        debug!(
            "Retrieving {} description and {} product documents",
            budget.description, budget.product
        );

        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| RagError::dependency(&e))?;

        let mut description = {
            let store = self.registry.description().await?;
            let store = store.read().await;
            store.search_by_vector(&vector, total_k).await?
        };
        description.truncate(budget.description);

        let mut product = {
            let store = self.registry.product().await?;
            let store = store.read().await;
            store.search_by_vector(&vector, total_k).await?
        };
        product.truncate(budget.product);

        Ok(RetrievedContext {
            ratio,
            budget,
            description,
            product,
        })
    }
}

/// Reply to a customer query together with what it was based on
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub context: RetrievedContext,
}

/// Query path: choose a ratio, retrieve, generate
pub struct Assistant {
    retriever: HybridRetriever,
    selector: Arc<dyn RatioSelector>,
    generator: Arc<dyn AnswerGenerator>,
    total_k: usize,
}

impl Assistant {
    #[inline]
    pub fn new(
        retriever: HybridRetriever,
        selector: Arc<dyn RatioSelector>,
        generator: Arc<dyn AnswerGenerator>,
        total_k: usize,
    ) -> Self {
        Self {
            retriever,
            selector,
            generator,
            total_k,
        }
    }

    #[inline]
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::Validation("Query is required".to_string()));
        }

        let raw_ratio = self
            .selector
            .select_ratio(query)
            .map_err(|e| RagError::dependency(&e))?;
        let context = self
            .retriever
            .retrieve(query, raw_ratio, self.total_k)
            .await?;

        let text = self
            .generator
            .generate(query, &context.documents())
            .map_err(|e| RagError::dependency(&e))?;

        info!(
            "Answered query with ratio {:.2} from {} documents",
            context.ratio,
            context.len()
        );
        Ok(Answer { text, context })
    }
}
