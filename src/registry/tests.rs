use super::*;
use crate::embeddings::HashingEmbedder;
use crate::store::{ProductDocument, ProductRecord, RemoveSelector};
use tempfile::TempDir;

fn registry(temp: &TempDir) -> CollectionRegistry {
    let config = Config {
        base_dir: temp.path().to_path_buf(),
        ..Config::default()
    };
    CollectionRegistry::new(&config, Arc::new(HashingEmbedder::default()))
}

fn lamp() -> ProductDocument {
    let mut product = ProductDocument::new(ProductRecord {
        name: "Lamp".to_string(),
        description: "Brass desk lamp".to_string(),
        price: Some(45.0),
        specifications: None,
        features: None,
    });
    product.product_id = "lamp-1".to_string();
    product
}

#[test]
fn collection_names_parse() {
    assert_eq!(
        "description".parse::<CollectionName>().expect("should parse"),
        CollectionName::Description
    );
    assert_eq!(
        "Products".parse::<CollectionName>().expect("should parse"),
        CollectionName::Product
    );
    assert!("orders".parse::<CollectionName>().is_err());
    assert_eq!(CollectionName::Product.kind(), DocumentKind::Product);
}

#[tokio::test]
async fn collections_live_under_vectors_dir() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = registry(&temp);

    registry.description().await.expect("description should open");

    assert_eq!(
        registry.collection_path(CollectionName::Description),
        temp.path().join("vectors").join("description")
    );
    assert!(temp.path().join("vectors/description/CURRENT").exists());
    assert!(!temp.path().join("vectors/product").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_access_initializes_once() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = Arc::new(registry(&temp));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.product().await })
        })
        .collect();

    let mut stores = Vec::new();
    for handle in handles {
        stores.push(
            handle
                .await
                .expect("task should join")
                .expect("product should open"),
        );
    }

    assert!(stores.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    let generations = std::fs::read_dir(temp.path().join("vectors/product"))
        .expect("collection dir should exist")
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("gen-"))
        .count();
    assert_eq!(generations, 1);
}

#[tokio::test]
async fn product_lifecycle() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = registry(&temp);

    let id = registry.add_product(lamp()).await.expect("add should succeed");
    assert_eq!(id, "lamp-1");

    let updated = registry
        .update_product(
            "lamp-1",
            ProductPatch {
                price: Some(39.0),
                features: Some("dimmable".to_string()),
                ..ProductPatch::default()
            },
        )
        .await
        .expect("update should succeed");
    assert_eq!(updated.record.price, Some(39.0));
    assert_eq!(updated.record.name, "Lamp");
    assert_eq!(updated.record.features.as_deref(), Some("dimmable"));
    assert!(updated.updated_at.is_some());

    let stored = registry
        .get_document(CollectionName::Product, "lamp-1")
        .await
        .expect("product should exist");
    assert_eq!(
        stored.metadata.get(crate::store::document::PRICE_KEY),
        Some(&crate::store::MetadataValue::Number(39.0))
    );

    let removed = registry
        .remove_products(&RemoveSelector::ByName("Lamp".to_string()))
        .await
        .expect("remove should succeed");
    assert_eq!(removed, vec!["lamp-1".to_string()]);
    assert!(
        registry
            .list(CollectionName::Product)
            .await
            .expect("list should succeed")
            .is_empty()
    );
}

#[tokio::test]
async fn update_product_validates_before_writing() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = registry(&temp);
    registry.add_product(lamp()).await.expect("add should succeed");

    let err = registry
        .update_product(
            "lamp-1",
            ProductPatch {
                price: Some(-5.0),
                ..ProductPatch::default()
            },
        )
        .await
        .expect_err("negative price should fail");
    assert_eq!(err.kind(), "validation");

    let err = registry
        .update_product("missing", ProductPatch::default())
        .await
        .expect_err("missing product should fail");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn description_lifecycle_and_status() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = registry(&temp);

    let mut about = crate::store::DescriptionDocument::new("We roast our coffee every morning in the back of the shop.");
    about.doc_id = "about".to_string();
    registry
        .add_description(about)
        .await
        .expect("add should succeed");

    let updated = registry
        .update_description("about", None, Some("About us".to_string()))
        .await
        .expect("update should succeed");
    assert_eq!(updated.title, "About us");
    assert_eq!(updated.content, "We roast our coffee every morning in the back of the shop.");

    let status = registry.status().await.expect("status should succeed");
    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, CollectionName::Description);
    assert_eq!(status[0].documents, 1);
    assert_eq!(status[1].documents, 0);

    registry
        .remove_description("about")
        .await
        .expect("remove should succeed");
    let err = registry
        .remove_description("about")
        .await
        .expect_err("second remove should fail");
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn short_description_text_is_rejected() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = registry(&temp);

    let mut hours = crate::store::DescriptionDocument::new(
        "Open Monday to Saturday from nine in the morning until six.",
    );
    hours.doc_id = "hours".to_string();
    registry
        .add_description(hours)
        .await
        .expect("add should succeed");
    let before = registry
        .documents(CollectionName::Description)
        .await
        .expect("documents should succeed");

    let mut short = crate::store::DescriptionDocument::new("   Closed on Sundays.   ");
    short.doc_id = "sundays".to_string();
    let err = registry
        .add_description(short)
        .await
        .expect_err("short text should be rejected");
    assert_eq!(err.kind(), "validation");

    let err = registry
        .update_description("hours", Some("Open daily.".to_string()), None)
        .await
        .expect_err("short replacement should be rejected");
    assert_eq!(err.kind(), "validation");

    let after = registry
        .documents(CollectionName::Description)
        .await
        .expect("documents should succeed");
    assert_eq!(before, after);

    registry
        .update_description("hours", None, Some("Hours".to_string()))
        .await
        .expect("title-only update should skip the length check");
}
