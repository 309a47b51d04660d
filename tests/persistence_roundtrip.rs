use std::path::PathBuf;

use vinted_harvest::persistence::{read_csv, ProductStore};
use vinted_harvest::types::{Product, UNKNOWN};

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("vinted-harvest-it-{}", uuid::Uuid::new_v4()))
}

fn products() -> Vec<Product> {
    vec![
        Product {
            title: "Vestido \"midi\", estampado".to_string(),
            price: "19,99 €".to_string(),
            brand: "Zara".to_string(),
            size: "M / 38".to_string(),
            condition: "Muy bueno".to_string(),
            product_url: "https://www.vinted.es/items/1-vestido".to_string(),
            image_url: "https://images1.vinted.net/1.jpg".to_string(),
            location: "Madrid, España".to_string(),
            scraped_at: "2026-10-16T09:00:00+00:00".to_string(),
        },
        Product {
            title: "Camiseta".to_string(),
            price: UNKNOWN.to_string(),
            brand: UNKNOWN.to_string(),
            size: UNKNOWN.to_string(),
            condition: UNKNOWN.to_string(),
            product_url: String::new(),
            image_url: UNKNOWN.to_string(),
            location: UNKNOWN.to_string(),
            scraped_at: "2026-10-16T09:00:01+00:00".to_string(),
        },
    ]
}

#[tokio::test]
async fn json_and_csv_read_back_identically() {
    let dir = scratch_dir();
    let store = ProductStore::new(&dir);
    let written = store.write(&products(), "vinted.es").await.unwrap();

    let catalog = store.load().await;
    assert_eq!(catalog.products, products());
    assert_eq!(catalog.metadata.total_products, 2);
    assert_eq!(catalog.metadata.source.as_deref(), Some("vinted.es"));
    assert!(catalog.metadata.scraped_at.is_some());

    let csv_path = written.csv_path.expect("csv written");
    let bytes = tokio::fs::read(&csv_path).await.unwrap();
    let header = String::from_utf8_lossy(&bytes).lines().next().unwrap_or_default().to_string();
    assert_eq!(header, Product::FIELD_NAMES.join(","));
    assert_eq!(read_csv(&bytes).unwrap(), products());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn rewrite_replaces_previous_catalog() {
    let dir = scratch_dir();
    let store = ProductStore::new(&dir);
    store.write(&products(), "vinted.es").await.unwrap();
    store.write(&products()[..1], "vinted.es").await.unwrap();

    let catalog = store.load().await;
    assert_eq!(catalog.products.len(), 1);
    assert_eq!(catalog.metadata.total_products, 1);

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
