// Crawler module
// Page fetching, navigation discovery and readable-text extraction

pub mod extractor;

#[cfg(test)]
mod tests;

pub use extractor::{ExtractedPage, extract_text};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use ureq::Agent;
use url::Url;

/// Containers whose links count as site navigation
const NAV_CONTAINERS: &str =
    r#"nav, header, [class*="nav"], [class*="menu"], [id*="nav"], [id*="menu"]"#;

/// Configuration for page fetching
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// User agent string to use for requests
    pub user_agent: String,
    /// Timeout for HTTP requests in seconds
    pub timeout_seconds: u64,
}

impl Default for FetcherConfig {
    #[inline]
    fn default() -> Self {
        Self {
            user_agent: "storefront-rag/0.1.0 (Site Indexer)".to_string(),
            timeout_seconds: 20,
        }
    }
}

/// Retrieves the HTML of a page
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// Blocking HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    #[inline]
    pub fn new(config: &FetcherConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Self { agent }
    }
}

impl Default for HttpFetcher {
    #[inline]
    fn default() -> Self {
        Self::new(&FetcherConfig::default())
    }
}

impl PageFetcher for HttpFetcher {
    #[inline]
    fn fetch(&self, url: &Url) -> Result<String> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url.as_str()).call() {
            Ok(mut response) => {
                let text = response
                    .body_mut()
                    .read_to_string()
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                debug!("Read {} bytes from {}", text.len(), url);
                Ok(text)
            }
            Err(ureq::Error::StatusCode(status)) => {
                Err(anyhow!("HTTP error {} fetching {}", status, url))
            }
            Err(e) => Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to make HTTP request to {}", url)),
        }
    }
}

/// Validate and normalize a URL
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str.trim())
        .with_context(|| format!("Invalid URL format: {}", url_str))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("URL must use HTTP or HTTPS scheme: {}", url_str));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host: {}", url_str));
    }

    Ok(url)
}

/// Links found in the navigation areas of a page, plus the page itself
///
/// Only absolute http(s) targets without a fragment are kept. The result is
/// sorted and free of duplicates.
#[inline]
pub fn extract_nav_urls(html: &str, homepage: &Url) -> Result<Vec<Url>> {
    let document = Html::parse_document(html);
    let container_selector = Selector::parse(NAV_CONTAINERS)
        .map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;
    let link_selector =
        Selector::parse("a[href]").map_err(|e| anyhow!("Failed to create CSS selector: {:?}", e))?;

    let mut links = vec![homepage.clone()];
    for container in document.select(&container_selector) {
        for link in container.select(&link_selector) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if href.contains('#') {
                continue;
            }

            match homepage.join(href.trim()) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => links.push(url),
                Ok(url) => debug!("Skipping non-web link {}", url),
                Err(e) => debug!("Failed to resolve '{}' against {}: {}", href, homepage, e),
            }
        }
    }

    let links: Vec<Url> = links.into_iter().sorted().dedup().collect();
    info!("Found {} navigation URLs on {}", links.len(), homepage);
    Ok(links)
}

/// Fetch `homepage` and collect its navigation URLs
#[inline]
pub fn discover(fetcher: &dyn PageFetcher, homepage: &Url) -> Result<Vec<Url>> {
    let html = fetcher
        .fetch(homepage)
        .with_context(|| format!("Error extracting navigation URLs from {}", homepage))?;
    extract_nav_urls(&html, homepage)
}

/// Fetch a page and reduce it to readable text
#[inline]
pub fn fetch_page(fetcher: &dyn PageFetcher, url: &Url) -> Result<ExtractedPage> {
    let html = fetcher.fetch(url)?;
    Ok(extract_text(&html))
}
