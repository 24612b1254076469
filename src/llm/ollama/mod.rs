
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::{AnswerGenerator, ProductExtractor, RatioSelector, UrlClassification, UrlClassifier};
use crate::embeddings::{ChatMessage, OllamaClient};
use crate::store::{Document, ProductRecord};

const SUPPORT_PERSONA: &str = "Act as Customer Support Manager";

#[derive(Debug, Deserialize)]
struct RatioReply {
    ratio: f64,
}

#[derive(Debug, Deserialize)]
struct ProductsReply {
    products: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    #[serde(default)]
    desc_urls: Vec<String>,
    #[serde(default)]
    product_service_urls: Vec<String>,
}

fn ratio_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { "ratio": { "type": "number" } },
        "required": ["ratio"]
    })
}

fn products_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "products": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "price": { "type": ["number", "null"] },
                        "specifications": { "type": ["string", "null"] },
                        "features": { "type": ["string", "null"] }
                    },
                    "required": ["name", "description"]
                }
            }
        },
        "required": ["products"]
    })
}

fn classification_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "desc_urls": { "type": "array", "items": { "type": "string" } },
            "product_service_urls": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["desc_urls", "product_service_urls"]
    })
}

impl OllamaClient {
    fn structured<T: serde::de::DeserializeOwned>(
        &self,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
    ) -> Result<T> {
        let reply = self.chat(messages, Some(schema))?;
        serde_json::from_str(&reply)
            .with_context(|| format!("Model reply did not match the schema: {}", reply))
    }
}

impl RatioSelector for OllamaClient {
    #[inline]
    fn select_ratio(&self, query: &str) -> Result<f64> {
        let messages = [
            ChatMessage::system(
                "Decide how a customer query should be answered. Reply with `ratio`: \
                 0 when only general company information is needed, 1 when only \
                 product or service details are needed, or a value in between.",
            ),
            ChatMessage::user(query),
        ];
        let reply: RatioReply = self
            .structured(&messages, &ratio_schema())
            .context("Failed to select retrieval ratio")?;
        debug!("Model chose ratio {} for query", reply.ratio);
        Ok(reply.ratio)
    }
}

impl ProductExtractor for OllamaClient {
    #[inline]
    fn extract_products(&self, text: &str) -> Result<Vec<ProductRecord>> {
        let messages = [
            ChatMessage::system(
                "Extract every product or service described in the text. For each give \
                 name, description, price as a number when stated, specifications and \
                 features.",
            ),
            ChatMessage::user(text),
        ];
        let reply: ProductsReply = self
            .structured(&messages, &products_schema())
            .context("Failed to extract products")?;

        let products: Vec<ProductRecord> = reply
            .products
            .iter()
            .filter_map(|value| match ProductRecord::from_json(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Discarding extracted product: {}", e);
                    None
                }
            })
            .collect();

        debug!("Extracted {} products", products.len());
        Ok(products)
    }
}

impl UrlClassifier for OllamaClient {
    #[inline]
    fn classify_urls(&self, urls: &[Url]) -> Result<UrlClassification> {
        let listing = urls
            .iter()
            .map(Url::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [
            ChatMessage::system(
                "Classify the website URLs. Put pages about the company (about, contact, \
                 policies, team) in `desc_urls` and pages listing products or services in \
                 `product_service_urls`.",
            ),
            ChatMessage::user(listing),
        ];
        let reply: ClassificationReply = self
            .structured(&messages, &classification_schema())
            .context("Failed to classify URLs")?;

        Ok(UrlClassification {
            desc_urls: parse_urls(&reply.desc_urls),
            product_service_urls: parse_urls(&reply.product_service_urls),
        })
    }
}

impl AnswerGenerator for OllamaClient {
    #[inline]
    fn generate(&self, query: &str, context: &[Document]) -> Result<String> {
        let documents = context
            .iter()
            .map(|document| document.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let messages = [
            ChatMessage::system(SUPPORT_PERSONA),
            ChatMessage::user(format!(
                "Your task is to respond to the following customer query: {}\n\
                 Provide the most relevant information based on the query and keep the \
                 message on point.\n\
                 You have access to the following documents:\n{}",
                query, documents
            )),
        ];
        self.chat(&messages, None)
            .context("Failed to generate answer")
    }
}

fn parse_urls(raw: &[String]) -> Vec<Url> {
    raw.iter()
        .filter_map(|url| match Url::parse(url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring malformed URL {:?} from model: {}", url, e);
                None
            }
        })
        .collect()
}
