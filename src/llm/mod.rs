// LLM collaborators
// Typed black boxes for ratio selection, extraction, classification and answers

pub mod ollama;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::store::{Document, ProductRecord};

/// Decides how much of the retrieval budget goes to products
pub trait RatioSelector: Send + Sync {
    /// Share of the budget for the product collection
    ///
    /// Callers clamp the value; implementations need not.
    fn select_ratio(&self, query: &str) -> anyhow::Result<f64>;
}

/// Pulls structured product records out of free text
pub trait ProductExtractor: Send + Sync {
    fn extract_products(&self, text: &str) -> anyhow::Result<Vec<ProductRecord>>;
}

/// URLs split by the kind of content they lead to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlClassification {
    pub desc_urls: Vec<Url>,
    pub product_service_urls: Vec<Url>,
}

pub trait UrlClassifier: Send + Sync {
    fn classify_urls(&self, urls: &[Url]) -> anyhow::Result<UrlClassification>;
}

/// Writes the final reply from the query and retrieved context
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, query: &str, context: &[Document]) -> anyhow::Result<String>;
}
