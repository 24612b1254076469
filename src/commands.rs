use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::crawler::{HttpFetcher, discover, validate_url};
use crate::embeddings::{Embedder, OllamaClient};
use crate::ingest::{IngestReport, Ingestor};
use crate::llm::{AnswerGenerator, ProductExtractor, RatioSelector, UrlClassifier};
use crate::registry::{CollectionName, CollectionRegistry, ProductPatch};
use crate::retrieval::{Assistant, HybridRetriever};
use crate::store::document::{NAME_KEY, TITLE_KEY};
use crate::store::{
    DescriptionDocument, ListedDocument, ProductDocument, ProductRecord, RemoveSelector,
};

/// Longest content preview printed by `list`
const PREVIEW_CHARS: usize = 80;

/// What an ingestion command reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    Text(String),
    Urls(Vec<String>),
}

/// Fields for a manually added product
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProduct {
    pub product_id: Option<String>,
    pub name: String,
    pub description: String,
    pub price: Option<f64>,
    pub specifications: Option<String>,
    pub features: Option<String>,
}

/// Everything a command needs, built from the configuration on disk
struct Services {
    config: Config,
    client: Arc<OllamaClient>,
    registry: Arc<CollectionRegistry>,
}

impl Services {
    fn load(base_dir: &Path) -> Result<Self> {
        let config = Config::load(base_dir)?;
        let client = Arc::new(
            OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?,
        );
        let registry = Arc::new(CollectionRegistry::new(
            &config,
            Arc::clone(&client) as Arc<dyn Embedder>,
        ));
        Ok(Self {
            config,
            client,
            registry,
        })
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.client) as Arc<dyn ProductExtractor>,
            Arc::new(HttpFetcher::default()),
            self.config.ingestion.clone(),
        )
    }
}

fn spinner(message: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }
    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn parse_urls(urls: &[String]) -> Result<Vec<Url>> {
    urls.iter().map(|url| validate_url(url)).collect()
}

fn print_report(report: &IngestReport, collection: CollectionName) {
    println!(
        "{} Stored {} {} documents",
        style("✓").green(),
        report.stored(),
        collection
    );
    for url in &report.failed_urls {
        println!("  {} Could not fetch {}", style("⚠").yellow(), url);
    }
}

fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || content.lines().nth(1).is_some() {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

/// Create both collections if they do not exist yet
#[inline]
pub async fn init(base_dir: &Path) -> Result<()> {
    let services = Services::load(base_dir)?;
    services
        .client
        .health_check()
        .context("Ollama is required to embed the initialization documents")?;

    for status in services.registry.status().await? {
        println!(
            "{} {} collection ready at {}",
            style("✓").green(),
            status.name,
            status.path.display()
        );
    }
    Ok(())
}

/// Print document counts and live generations
#[inline]
pub async fn show_status(base_dir: &Path) -> Result<()> {
    let services = Services::load(base_dir)?;

    println!("{}", style("Collections").bold());
    for status in services.registry.status().await? {
        println!("  {} ({})", style(status.name).cyan(), status.path.display());
        println!("     Documents: {}", status.documents);
        println!("     Generation: {}", status.generation);
    }
    println!();
    println!("Ollama: {}", services.config.ollama_url()?);
    println!("Chat model: {}", services.config.ollama.chat_model);
    println!("Embedding model: {}", services.config.ollama.model);
    Ok(())
}

/// Collect navigation links from a homepage and classify them
#[inline]
pub fn discover_site(base_dir: &Path, url: &str) -> Result<()> {
    let homepage = validate_url(url)?;
    let config = Config::load(base_dir)?;
    let client = OllamaClient::new(&config.ollama)?;

    let urls = discover(&HttpFetcher::default(), &homepage)?;
    println!("Found {} navigation URLs", urls.len());

    let classification = client
        .classify_urls(&urls)
        .context("Failed to classify URLs")?;

    println!("{}", style("Description pages:").bold());
    for url in &classification.desc_urls {
        println!("  {}", url);
    }
    println!("{}", style("Product and service pages:").bold());
    for url in &classification.product_service_urls {
        println!("  {}", url);
    }
    Ok(())
}

#[inline]
pub async fn ingest_descriptions(base_dir: &Path, source: IngestSource) -> Result<()> {
    let services = Services::load(base_dir)?;
    let ingestor = services.ingestor();

    let bar = spinner("Ingesting descriptions");
    let report = match source {
        IngestSource::Text(text) => ingestor.ingest_description_text(&text).await,
        IngestSource::Urls(urls) => ingestor.ingest_description_urls(&parse_urls(&urls)?).await,
    };
    bar.finish_and_clear();

    print_report(&report?, CollectionName::Description);
    Ok(())
}

#[inline]
pub async fn ingest_products(base_dir: &Path, source: IngestSource) -> Result<()> {
    let services = Services::load(base_dir)?;
    let ingestor = services.ingestor();

    let bar = spinner("Extracting products");
    let report = match source {
        IngestSource::Text(text) => ingestor.ingest_product_text(&text).await,
        IngestSource::Urls(urls) => ingestor.ingest_product_urls(&parse_urls(&urls)?).await,
    };
    bar.finish_and_clear();

    print_report(&report?, CollectionName::Product);
    Ok(())
}

#[inline]
pub async fn add_description(
    base_dir: &Path,
    text: String,
    title: Option<String>,
    source: Option<String>,
    doc_id: Option<String>,
) -> Result<()> {
    let services = Services::load(base_dir)?;

    let mut document = DescriptionDocument::new(text);
    if let Some(title) = title {
        document.title = title;
    }
    if let Some(source) = source {
        document.source = source;
    }
    if let Some(doc_id) = doc_id {
        document.doc_id = doc_id;
    }

    let doc_id = services.registry.add_description(document).await?;
    println!("{} Added description {}", style("✓").green(), doc_id);
    Ok(())
}

#[inline]
pub async fn update_description(
    base_dir: &Path,
    doc_id: &str,
    text: Option<String>,
    title: Option<String>,
) -> Result<()> {
    let services = Services::load(base_dir)?;
    let updated = services
        .registry
        .update_description(doc_id, text, title)
        .await?;
    println!(
        "{} Updated description {} ({})",
        style("✓").green(),
        updated.doc_id,
        updated.title
    );
    Ok(())
}

#[inline]
pub async fn remove_description(base_dir: &Path, doc_id: &str) -> Result<()> {
    let services = Services::load(base_dir)?;
    let removed = services.registry.remove_description(doc_id).await?;
    println!(
        "{} Removed {} description document(s)",
        style("✓").green(),
        removed.len()
    );
    Ok(())
}

#[inline]
pub async fn add_product(base_dir: &Path, product: NewProduct) -> Result<()> {
    let services = Services::load(base_dir)?;

    let mut document = ProductDocument::new(ProductRecord {
        name: product.name,
        description: product.description,
        price: product.price,
        specifications: product.specifications,
        features: product.features,
    });
    if let Some(product_id) = product.product_id {
        document.product_id = product_id;
    }

    let product_id = services.registry.add_product(document).await?;
    println!("{} Added product {}", style("✓").green(), product_id);
    Ok(())
}

#[inline]
pub async fn update_product(base_dir: &Path, product_id: &str, patch: ProductPatch) -> Result<()> {
    let services = Services::load(base_dir)?;
    let updated = services.registry.update_product(product_id, patch).await?;
    println!(
        "{} Updated product {} ({})",
        style("✓").green(),
        updated.product_id,
        updated.record.name
    );
    Ok(())
}

#[inline]
pub async fn remove_product(base_dir: &Path, selector: RemoveSelector) -> Result<()> {
    let services = Services::load(base_dir)?;
    let removed = services.registry.remove_products(&selector).await?;
    println!(
        "{} Removed {} product(s): {}",
        style("✓").green(),
        removed.len(),
        removed.join(", ")
    );
    Ok(())
}

#[inline]
pub async fn list_collection(base_dir: &Path, name: CollectionName) -> Result<()> {
    let services = Services::load(base_dir)?;
    let listed = services.registry.list(name).await?;

    if listed.is_empty() {
        println!("The {} collection is empty.", name);
        return Ok(());
    }

    println!("{} documents ({} listed):", style(name).bold(), listed.len());
    for entry in &listed {
        match entry {
            ListedDocument::Document(document) => {
                let label = document
                    .text(NAME_KEY)
                    .or_else(|| document.text(TITLE_KEY))
                    .unwrap_or_default();
                println!(
                    "  {} {}",
                    style(document.doc_id().unwrap_or("?")).cyan(),
                    label
                );
                println!("     {}", preview(&document.content));
            }
            ListedDocument::Raw { id, content, .. } => {
                warn!("Row {} has unreadable metadata", id);
                println!("  {} (unreadable metadata)", style(id).red());
                println!("     {}", preview(content));
            }
        }
    }
    Ok(())
}

/// Answer a customer query from both collections
#[inline]
pub async fn ask(base_dir: &Path, query: &str) -> Result<()> {
    let services = Services::load(base_dir)?;
    let assistant = Assistant::new(
        HybridRetriever::new(Arc::clone(&services.registry)),
        Arc::clone(&services.client) as Arc<dyn RatioSelector>,
        Arc::clone(&services.client) as Arc<dyn AnswerGenerator>,
        services.config.retrieval.total_k,
    );

    let bar = spinner("Thinking");
    let answer = assistant.ask(query).await;
    bar.finish_and_clear();
    let answer = answer?;

    info!(
        "Used {} description and {} product documents",
        answer.context.description.len(),
        answer.context.product.len()
    );
    println!("{}", answer.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_content() {
        let long = "x".repeat(200);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }

    #[test]
    fn preview_marks_multiline_content() {
        assert_eq!(preview("first\nsecond"), "first…");
        assert_eq!(preview("single"), "single");
    }

    #[test]
    fn parse_urls_rejects_bad_input() {
        let urls = vec!["https://shop.example".to_string(), "nope".to_string()];
        assert!(parse_urls(&urls).is_err());
        let urls = vec!["https://shop.example/about".to_string()];
        assert_eq!(
            parse_urls(&urls).expect("urls should parse")[0].path(),
            "/about"
        );
    }
}
