use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use storefront_rag::commands::{
    IngestSource, NewProduct, add_description, add_product, ask, discover_site,
    ingest_descriptions, ingest_products, init, list_collection, remove_description,
    remove_product, show_status, update_description, update_product,
};
use storefront_rag::config::{resolve_base_dir, run_interactive_config, show_config};
use storefront_rag::registry::{CollectionName, ProductPatch};
use storefront_rag::store::RemoveSelector;

#[derive(Parser)]
#[command(name = "storefront-rag")]
#[command(about = "Customer support answers from company and product collections")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the vector collections
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Free text or a list of pages
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Text to ingest
    #[arg(long)]
    text: Option<String>,
    /// Page to fetch; repeat for several pages
    #[arg(long = "url")]
    urls: Vec<String>,
}

impl From<SourceArgs> for IngestSource {
    fn from(args: SourceArgs) -> Self {
        match args.text {
            Some(text) => Self::Text(text),
            None => Self::Urls(args.urls),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Create the description and product collections
    Init,
    /// Show document counts for both collections
    Status,
    /// List navigation links of a site and classify them
    Discover {
        /// Homepage of the site
        url: String,
    },
    /// Chunk text or pages into the description collection
    IngestDescriptions(SourceArgs),
    /// Extract products from text or pages into the product collection
    IngestProducts(SourceArgs),
    /// Add a single description document
    AddDescription {
        #[arg(long)]
        text: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// Use this id instead of a generated one
        #[arg(long)]
        doc_id: Option<String>,
    },
    /// Change the content or title of a description document
    UpdateDescription {
        doc_id: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        title: Option<String>,
    },
    /// Delete a description document
    RemoveDescription { doc_id: String },
    /// Add a single product
    AddProduct {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        specifications: Option<String>,
        #[arg(long)]
        features: Option<String>,
        /// Use this id instead of a generated one
        #[arg(long)]
        product_id: Option<String>,
    },
    /// Change fields of a stored product
    UpdateProduct {
        product_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        specifications: Option<String>,
        #[arg(long)]
        features: Option<String>,
    },
    /// Delete products by id or by name
    #[command(group(clap::ArgGroup::new("selector").required(true).args(["product_id", "name"])))]
    RemoveProduct {
        #[arg(long)]
        product_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// List documents of a collection
    List {
        /// `description` or `product`
        collection: CollectionName,
    },
    /// Answer a customer question
    Ask { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = resolve_base_dir(cli.base_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Init => init(&base_dir).await?,
        Commands::Status => show_status(&base_dir).await?,
        Commands::Discover { url } => discover_site(&base_dir, &url)?,
        Commands::IngestDescriptions(source) => {
            ingest_descriptions(&base_dir, source.into()).await?;
        }
        Commands::IngestProducts(source) => ingest_products(&base_dir, source.into()).await?,
        Commands::AddDescription {
            text,
            title,
            source,
            doc_id,
        } => add_description(&base_dir, text, title, source, doc_id).await?,
        Commands::UpdateDescription {
            doc_id,
            text,
            title,
        } => update_description(&base_dir, &doc_id, text, title).await?,
        Commands::RemoveDescription { doc_id } => remove_description(&base_dir, &doc_id).await?,
        Commands::AddProduct {
            name,
            description,
            price,
            specifications,
            features,
            product_id,
        } => {
            let product = NewProduct {
                product_id,
                name,
                description,
                price,
                specifications,
                features,
            };
            add_product(&base_dir, product).await?;
        }
        Commands::UpdateProduct {
            product_id,
            name,
            description,
            price,
            specifications,
            features,
        } => {
            let patch = ProductPatch {
                name,
                description,
                price,
                specifications,
                features,
                source: None,
            };
            update_product(&base_dir, &product_id, patch).await?;
        }
        Commands::RemoveProduct { product_id, name } => {
            let selector = match (product_id, name) {
                (Some(product_id), _) => RemoveSelector::ById(product_id),
                (None, Some(name)) => RemoveSelector::ByName(name),
                (None, None) => anyhow::bail!("Either --product-id or --name is required"),
            };
            remove_product(&base_dir, selector).await?;
        }
        Commands::List { collection } => list_collection(&base_dir, collection).await?,
        Commands::Ask { query } => ask(&base_dir, &query).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["storefront-rag", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.base_dir, None);
        }
    }

    #[test]
    fn base_dir_is_global() {
        let cli = Cli::try_parse_from(["storefront-rag", "init", "--base-dir", "/tmp/shop"])
            .expect("should parse");
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/shop")));
    }

    #[test]
    fn ingest_descriptions_with_urls() {
        let cli = Cli::try_parse_from([
            "storefront-rag",
            "ingest-descriptions",
            "--url",
            "https://shop.example/about",
            "--url",
            "https://shop.example/team",
        ])
        .expect("should parse");

        let Commands::IngestDescriptions(source) = cli.command else {
            panic!("should be ingest-descriptions");
        };
        assert_eq!(
            IngestSource::from(source),
            IngestSource::Urls(vec![
                "https://shop.example/about".to_string(),
                "https://shop.example/team".to_string(),
            ])
        );
    }

    #[test]
    fn ingest_requires_exactly_one_source() {
        let missing = Cli::try_parse_from(["storefront-rag", "ingest-products"]);
        assert!(missing.is_err());

        let both = Cli::try_parse_from([
            "storefront-rag",
            "ingest-products",
            "--text",
            "A teapot",
            "--url",
            "https://shop.example",
        ]);
        if let Err(err) = both {
            assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        } else {
            panic!("both sources should conflict");
        }
    }

    #[test]
    fn remove_product_by_name() {
        let cli = Cli::try_parse_from(["storefront-rag", "remove-product", "--name", "Teapot"])
            .expect("should parse");

        if let Commands::RemoveProduct { product_id, name } = cli.command {
            assert_eq!(product_id, None);
            assert_eq!(name, Some("Teapot".to_string()));
        } else {
            panic!("should be remove-product");
        }
    }

    #[test]
    fn remove_product_requires_selector() {
        let cli = Cli::try_parse_from(["storefront-rag", "remove-product"]);
        assert!(cli.is_err());
    }

    #[test]
    fn list_accepts_collection_names() {
        let cli = Cli::try_parse_from(["storefront-rag", "list", "products"]).expect("should parse");
        if let Commands::List { collection } = cli.command {
            assert_eq!(collection, CollectionName::Product);
        } else {
            panic!("should be list");
        }

        assert!(Cli::try_parse_from(["storefront-rag", "list", "orders"]).is_err());
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["storefront-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["storefront-rag", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["storefront-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
