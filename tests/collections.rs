#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for the collection registry over on-disk stores

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use storefront_rag::config::Config;
use storefront_rag::embeddings::{Embedder, HashingEmbedder};
use storefront_rag::registry::{CollectionName, CollectionRegistry, ProductPatch};
use storefront_rag::store::{
    DescriptionDocument, ListedDocument, ProductDocument, ProductRecord, RemoveSelector,
};
use tempfile::TempDir;

/// Embedder that can be made to fail between calls
#[derive(Default)]
struct SwitchableEmbedder {
    inner: HashingEmbedder,
    down: AtomicBool,
}

impl Embedder for SwitchableEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.inner.embed(text)
    }
}

fn config(temp: &TempDir) -> Config {
    Config {
        base_dir: temp.path().to_path_buf(),
        ..Config::default()
    }
}

fn open_registry(temp: &TempDir, embedder: Arc<dyn Embedder>) -> CollectionRegistry {
    CollectionRegistry::new(&config(temp), embedder)
}

fn description(doc_id: &str, content: &str) -> DescriptionDocument {
    let mut document = DescriptionDocument::new(content);
    document.doc_id = doc_id.to_string();
    document
}

fn product(product_id: &str, name: &str, price: f64) -> ProductDocument {
    let mut document = ProductDocument::new(ProductRecord {
        name: name.to_string(),
        description: format!("{} made in our workshop", name),
        price: Some(price),
        specifications: None,
        features: None,
    });
    document.product_id = product_id.to_string();
    document
}

fn ids(listed: &[ListedDocument]) -> Vec<String> {
    let mut ids: Vec<String> = listed
        .iter()
        .filter_map(ListedDocument::document)
        .filter_map(|document| document.doc_id().map(str::to_string))
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn added_descriptions_are_all_listed() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));

    registry
        .add_descriptions(vec![
            description("d1", "We opened our first bakery in 1998."),
            description("d2", "Our flour comes from local mills."),
            description("d3", "Orders ship within two days."),
        ])
        .await
        .expect("batch add should succeed");
    registry
        .add_description(description("d4", "Returns are accepted for 30 days with the original receipt."))
        .await
        .expect("add should succeed");

    let listed = registry
        .list(CollectionName::Description)
        .await
        .expect("list should succeed");
    assert_eq!(ids(&listed), vec!["d1", "d2", "d3", "d4"]);
    assert!(listed.iter().all(|entry| !entry.content().contains("Initialization")));
}

#[tokio::test]
async fn new_collections_list_as_empty() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));

    for name in CollectionName::ALL {
        let listed = registry.list(name).await.expect("list should succeed");
        assert!(listed.is_empty(), "{} should list nothing", name);
    }
    let status = registry.status().await.expect("status should succeed");
    assert!(status.iter().all(|collection| collection.documents == 0));
}

#[tokio::test]
async fn removing_unknown_id_changes_nothing() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    registry
        .add_products(vec![
            product("p1", "Sourdough loaf", 6.5),
            product("p2", "Rye loaf", 5.0),
        ])
        .await
        .expect("add should succeed");
    let before = registry.status().await.expect("status should succeed");

    let err = registry
        .remove_products(&RemoveSelector::ById("p9".to_string()))
        .await
        .expect_err("unknown id should fail");

    assert_eq!(err.kind(), "not_found");
    let after = registry.status().await.expect("status should succeed");
    assert_eq!(before, after);
}

#[tokio::test]
async fn products_survive_reopen() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    {
        let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));
        registry
            .add_product(product("p1", "Croissant", 2.5))
            .await
            .expect("add should succeed");
        registry
            .update_product(
                "p1",
                ProductPatch {
                    price: Some(3.0),
                    ..ProductPatch::default()
                },
            )
            .await
            .expect("update should succeed");
    }

    let reopened = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    let document = reopened
        .get_document(CollectionName::Product, "p1")
        .await
        .expect("product should survive reopen");
    let record = ProductRecord::from_content(&document.content).expect("content should parse");
    assert_eq!(record.name, "Croissant");
    assert_eq!(record.price, Some(3.0));
}

#[tokio::test]
async fn leftovers_of_interrupted_rebuild_are_ignored() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    {
        let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));
        registry
            .add_descriptions(vec![description("d1", "Open Monday to Saturday.")])
            .await
            .expect("add should succeed");
    }

    let root = config(&temp).base_dir.join("vectors").join("description");
    let orphan = root.join("gen-interrupted");
    fs::create_dir_all(orphan.join("documents.lance")).expect("should create orphan");
    fs::write(orphan.join("documents.lance").join("partial"), b"half written")
        .expect("should write orphan file");
    fs::write(root.join(".tmpAbC123"), b"gen-never-committed").expect("should write stray temp");

    let reopened = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    let listed = reopened
        .list(CollectionName::Description)
        .await
        .expect("list should succeed");

    assert_eq!(ids(&listed), vec!["d1"]);
    assert!(!orphan.exists(), "uncommitted generation should be collected");
}

#[tokio::test]
async fn failed_mutations_leave_previous_state() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let embedder = Arc::new(SwitchableEmbedder::default());
    let registry = open_registry(&temp, Arc::clone(&embedder) as Arc<dyn Embedder>);
    registry
        .add_descriptions(vec![
            description("d1", "Free delivery over 50 euros."),
            description("d2", "Gift wrapping is available."),
        ])
        .await
        .expect("add should succeed");

    embedder.down.store(true, Ordering::SeqCst);
    let err = registry
        .update_description("d1", Some("Delivery costs 5 euros for every order under fifty euros.".to_string()), None)
        .await
        .expect_err("update should fail while embedding is down");
    assert_eq!(err.kind(), "dependency");
    let err = registry
        .add_description(description("d3", "A new store is opening soon in the old market square."))
        .await
        .expect_err("add should fail while embedding is down");
    assert_eq!(err.kind(), "dependency");
    embedder.down.store(false, Ordering::SeqCst);

    let reopened = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    let document = reopened
        .get_document(CollectionName::Description, "d1")
        .await
        .expect("d1 should still exist");
    assert_eq!(document.content, "Free delivery over 50 euros.");
    let listed = reopened
        .list(CollectionName::Description)
        .await
        .expect("list should succeed");
    assert_eq!(ids(&listed), vec!["d1", "d2"]);

    let generations = fs::read_dir(reopened.collection_path(CollectionName::Description))
        .expect("collection dir should exist")
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("gen-"))
        .count();
    assert_eq!(generations, 1);
}

#[tokio::test]
async fn remove_by_name_matches_every_product_with_that_name() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    registry
        .add_products(vec![
            product("p1", "Baguette", 1.2),
            product("p2", "Baguette", 1.4),
            product("p3", "Brioche", 3.0),
        ])
        .await
        .expect("add should succeed");

    let mut removed = registry
        .remove_products(&RemoveSelector::ByName("Baguette".to_string()))
        .await
        .expect("remove should succeed");
    removed.sort();

    assert_eq!(removed, vec!["p1", "p2"]);
    let listed = registry
        .list(CollectionName::Product)
        .await
        .expect("list should succeed");
    assert_eq!(ids(&listed), vec!["p3"]);
}

#[tokio::test]
async fn emptied_collection_accepts_new_documents() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let registry = open_registry(&temp, Arc::new(HashingEmbedder::default()));
    registry
        .add_description(description("d1", "Temporary notice: the shop is closed for renovation this week."))
        .await
        .expect("add should succeed");
    registry
        .remove_description("d1")
        .await
        .expect("remove should succeed");

    assert!(
        registry
            .list(CollectionName::Description)
            .await
            .expect("list should succeed")
            .is_empty()
    );

    registry
        .add_description(description("d2", "Permanent notice: the shop now opens at eight every morning."))
        .await
        .expect("add after emptying should succeed");
    let listed = registry
        .list(CollectionName::Description)
        .await
        .expect("list should succeed");
    assert_eq!(ids(&listed), vec!["d2"]);
}
