//! Persistence Sink: JSON catalog + CSV export, and the loader the
//! dashboard reads from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::types::{CatalogMetadata, Product, ProductCatalog};

pub const JSON_FILE: &str = "productos.json";
pub const CSV_FILE: &str = "productos.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub json_path: PathBuf,
    /// `None` when there was nothing to tabulate.
    pub csv_path: Option<PathBuf>,
}

/// Owns the output directory of a harvest.
#[derive(Debug, Clone)]
pub struct ProductStore {
    dir: PathBuf,
}

impl ProductStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json_path(&self) -> PathBuf {
        self.dir.join(JSON_FILE)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(CSV_FILE)
    }

    /// Overwrite both output files with `products`.
    pub async fn write(&self, products: &[Product], source: &str) -> Result<WrittenFiles> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let json_path = self.write_json(products, source).await?;
        let csv_path = self.write_csv(products).await?;
        Ok(WrittenFiles {
            json_path,
            csv_path,
        })
    }

    async fn write_json(&self, products: &[Product], source: &str) -> Result<PathBuf> {
        let catalog = ProductCatalog {
            metadata: CatalogMetadata {
                total_products: products.len(),
                scraped_at: Some(Utc::now().to_rfc3339()),
                source: Some(source.to_string()),
            },
            products: products.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&catalog)?;
        let path = self.json_path();
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Data saved to {}", path.display());
        Ok(path)
    }

    async fn write_csv(&self, products: &[Product]) -> Result<Option<PathBuf>> {
        if products.is_empty() {
            warn!("No products to save, skipping CSV export");
            return Ok(None);
        }

        let mut writer = csv::Writer::from_writer(Vec::new());
        for product in products {
            writer.serialize(product)?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flushing CSV buffer: {}", e))?;

        let path = self.csv_path();
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Data saved to {}", path.display());
        Ok(Some(path))
    }

    /// Read the JSON catalog back. A missing or unreadable file yields an
    /// empty catalog.
    pub async fn load(&self) -> ProductCatalog {
        let path = self.json_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ProductCatalog::empty(),
            Err(e) => {
                error!("Error loading products from {}: {}", path.display(), e);
                return ProductCatalog::empty();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            error!("Error parsing products from {}: {}", path.display(), e);
            ProductCatalog::empty()
        })
    }
}

/// Parse a CSV export back into products (header row required).
pub fn read_csv(bytes: &[u8]) -> Result<Vec<Product>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<Product>, _>>()
        .context("parsing CSV export")
}
