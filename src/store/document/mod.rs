
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{RagError, Result};

/// Content of the placeholder row that keeps a fresh index non-empty
pub const SENTINEL_CONTENT: &str = "Initialization document";

pub const TYPE_KEY: &str = "type";
pub const DOC_ID_KEY: &str = "doc_id";
pub const PRODUCT_ID_KEY: &str = "product_id";
pub const NAME_KEY: &str = "name";
pub const PRICE_KEY: &str = "price";
pub const TITLE_KEY: &str = "title";
pub const SOURCE_KEY: &str = "source";
pub const CREATED_AT_KEY: &str = "created_at";
pub const UPDATED_AT_KEY: &str = "updated_at";

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_SOURCE: &str = "direct_input";

/// A scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl MetadataValue {
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetadataValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for MetadataValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Description,
    Product,
    Init,
}

impl DocumentKind {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Product => "product",
            Self::Init => "init",
        }
    }
}

impl fmt::Display for DocumentKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = RagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "description" => Ok(Self::Description),
            "product" => Ok(Self::Product),
            "init" => Ok(Self::Init),
            other => Err(RagError::Validation(format!(
                "Unknown document type: {}",
                other
            ))),
        }
    }
}

/// Generic storage form of a document: text plus scalar metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    #[inline]
    pub fn sentinel() -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(TYPE_KEY.to_string(), DocumentKind::Init.as_str().into());
        Self::new(SENTINEL_CONTENT, metadata)
    }

    #[inline]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_text)
    }

    #[inline]
    pub fn kind(&self) -> Result<DocumentKind> {
        self.text(TYPE_KEY)
            .ok_or_else(|| RagError::Validation("Document has no type".to_string()))?
            .parse()
    }

    #[inline]
    pub fn doc_id(&self) -> Option<&str> {
        self.text(DOC_ID_KEY)
    }

    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.text(TYPE_KEY) == Some(DocumentKind::Init.as_str())
    }

    /// Check the fields every stored document needs before it touches an index
    #[inline]
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind()?;
        if kind == DocumentKind::Init {
            return Ok(());
        }
        if self.content.trim().is_empty() {
            return Err(RagError::Validation(
                "Document content cannot be empty".to_string(),
            ));
        }
        match self.doc_id() {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(RagError::Validation(format!(
                "{} document is missing a doc_id",
                kind
            ))),
        }
    }
}

/// Current time in the format stored in `created_at`/`updated_at`
#[inline]
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

#[inline]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// A structured product or service offered by the business
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub specifications: Option<String>,
    #[serde(default)]
    pub features: Option<String>,
}

impl ProductRecord {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RagError::Validation(
                "Missing required field: name".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(RagError::Validation(
                "Missing required field: description".to_string(),
            ));
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(RagError::Validation(format!(
                    "Price must be a non-negative number, got {}",
                    price
                )));
            }
        }
        Ok(())
    }

    /// Build a record from loosely typed JSON, as produced by an LLM or an
    /// older serialization
    ///
    /// Missing optional fields become `None`. A price may be a number, null,
    /// or a string such as `"$1,299.00"`; anything else is rejected.
    #[inline]
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RagError::Validation("Product must be a JSON object".to_string()))?;

        let text = |key: &str| -> Option<String> {
            object
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let price = match object.get(PRICE_KEY) {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(number)) => number.as_f64(),
            Some(serde_json::Value::String(raw)) => Some(parse_price(raw)?),
            Some(other) => {
                return Err(RagError::Validation(format!(
                    "Price must be numeric, got {}",
                    other
                )));
            }
        };

        let record = Self {
            name: text(NAME_KEY).unwrap_or_default(),
            description: text("description").unwrap_or_default(),
            price,
            specifications: text("specifications"),
            features: text("features"),
        };
        record.validate()?;
        Ok(record)
    }

    /// Parse a record back out of serialized document content
    #[inline]
    pub fn from_content(content: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| {
            RagError::Validation(format!("Content is not a serialized product: {}", e))
        })?;
        Self::from_json(&value)
    }

    #[inline]
    pub fn to_content(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RagError::Validation(format!("Failed to serialize product: {}", e)))
    }
}

fn parse_price(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse::<f64>()
        .map_err(|_| RagError::Validation(format!("Price must be numeric, got {:?}", raw)))
}

/// Free-form text about the business
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptionDocument {
    pub doc_id: String,
    pub content: String,
    pub title: String,
    pub source: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Metadata fields without a dedicated slot
    pub extra: Metadata,
}

impl DescriptionDocument {
    /// A new description with a generated id and the current timestamp
    #[inline]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            doc_id: generate_id(),
            content: content.into(),
            title: DEFAULT_TITLE.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            created_at: Some(timestamp()),
            updated_at: None,
            extra: Metadata::new(),
        }
    }
}

/// A product record plus its identity
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDocument {
    pub product_id: String,
    pub record: ProductRecord,
    pub source: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub extra: Metadata,
}

impl ProductDocument {
    #[inline]
    pub fn new(record: ProductRecord) -> Self {
        Self {
            product_id: generate_id(),
            record,
            source: None,
            created_at: Some(timestamp()),
            updated_at: None,
            extra: Metadata::new(),
        }
    }
}

/// Typed view of a stored document
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionDocument {
    Description(DescriptionDocument),
    Product(ProductDocument),
    Init,
}

const DESCRIPTION_KEYS: [&str; 6] = [
    TYPE_KEY,
    DOC_ID_KEY,
    TITLE_KEY,
    SOURCE_KEY,
    CREATED_AT_KEY,
    UPDATED_AT_KEY,
];

const PRODUCT_KEYS: [&str; 8] = [
    TYPE_KEY,
    DOC_ID_KEY,
    PRODUCT_ID_KEY,
    NAME_KEY,
    PRICE_KEY,
    SOURCE_KEY,
    CREATED_AT_KEY,
    UPDATED_AT_KEY,
];

impl CollectionDocument {
    #[inline]
    pub const fn kind(&self) -> DocumentKind {
        match self {
            Self::Description(_) => DocumentKind::Description,
            Self::Product(_) => DocumentKind::Product,
            Self::Init => DocumentKind::Init,
        }
    }

    /// Convert to the generic storage form
    #[inline]
    pub fn into_document(self) -> Result<Document> {
        match self {
            Self::Init => Ok(Document::sentinel()),
            Self::Description(doc) => {
                let mut metadata = doc.extra;
                metadata.insert(TYPE_KEY.to_string(), DocumentKind::Description.as_str().into());
                metadata.insert(DOC_ID_KEY.to_string(), doc.doc_id.into());
                metadata.insert(TITLE_KEY.to_string(), doc.title.into());
                metadata.insert(SOURCE_KEY.to_string(), doc.source.into());
                insert_optional(&mut metadata, CREATED_AT_KEY, doc.created_at);
                insert_optional(&mut metadata, UPDATED_AT_KEY, doc.updated_at);
                Ok(Document::new(doc.content, metadata))
            }
            Self::Product(doc) => {
                doc.record.validate()?;
                let content = doc.record.to_content()?;
                let mut metadata = doc.extra;
                metadata.insert(TYPE_KEY.to_string(), DocumentKind::Product.as_str().into());
                metadata.insert(DOC_ID_KEY.to_string(), doc.product_id.clone().into());
                metadata.insert(PRODUCT_ID_KEY.to_string(), doc.product_id.into());
                metadata.insert(NAME_KEY.to_string(), doc.record.name.into());
                if let Some(price) = doc.record.price {
                    metadata.insert(PRICE_KEY.to_string(), price.into());
                }
                insert_optional(&mut metadata, SOURCE_KEY, doc.source);
                insert_optional(&mut metadata, CREATED_AT_KEY, doc.created_at);
                insert_optional(&mut metadata, UPDATED_AT_KEY, doc.updated_at);
                Ok(Document::new(content, metadata))
            }
        }
    }

    /// Interpret a stored document
    ///
    /// Products are read from their serialized content; identity falls back
    /// from `product_id` to `doc_id`.
    #[inline]
    pub fn from_document(document: &Document) -> Result<Self> {
        match document.kind()? {
            DocumentKind::Init => Ok(Self::Init),
            DocumentKind::Description => {
                let doc_id = document.doc_id().ok_or_else(|| {
                    RagError::Validation("Description document is missing a doc_id".to_string())
                })?;
                Ok(Self::Description(DescriptionDocument {
                    doc_id: doc_id.to_string(),
                    content: document.content.clone(),
                    title: document
                        .text(TITLE_KEY)
                        .unwrap_or(DEFAULT_TITLE)
                        .to_string(),
                    source: document
                        .text(SOURCE_KEY)
                        .unwrap_or(DEFAULT_SOURCE)
                        .to_string(),
                    created_at: timestamp_field(document, CREATED_AT_KEY),
                    updated_at: timestamp_field(document, UPDATED_AT_KEY),
                    extra: extra_fields(&document.metadata, &DESCRIPTION_KEYS),
                }))
            }
            DocumentKind::Product => {
                let product_id = document
                    .text(PRODUCT_ID_KEY)
                    .or_else(|| document.doc_id())
                    .ok_or_else(|| {
                        RagError::Validation("Product document has no identity".to_string())
                    })?;
                Ok(Self::Product(ProductDocument {
                    product_id: product_id.to_string(),
                    record: ProductRecord::from_content(&document.content)?,
                    source: document.text(SOURCE_KEY).map(str::to_string),
                    created_at: timestamp_field(document, CREATED_AT_KEY),
                    updated_at: timestamp_field(document, UPDATED_AT_KEY),
                    extra: extra_fields(&document.metadata, &PRODUCT_KEYS),
                }))
            }
        }
    }
}

fn insert_optional(metadata: &mut Metadata, key: &str, value: Option<String>) {
    if let Some(value) = value {
        metadata.insert(key.to_string(), value.into());
    }
}

/// Timestamps may be stored as text or as epoch seconds
fn timestamp_field(document: &Document, key: &str) -> Option<String> {
    document.metadata.get(key).map(ToString::to_string)
}

fn extra_fields(metadata: &Metadata, known: &[&str]) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| !known.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
