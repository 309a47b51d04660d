use serde::{Deserialize, Serialize};

/// Placeholder for any text field the extractor could not read.
pub const UNKNOWN: &str = "unknown";

/// One harvested listing.
///
/// Field order is the column order of the CSV export and the key order of the
/// JSON export. Every field is always populated (real value or sentinel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    pub price: String,
    pub brand: String,
    pub size: String,
    pub condition: String,
    /// Absolute URL, or empty when the listing link was not found.
    pub product_url: String,
    pub image_url: String,
    pub location: String,
    pub scraped_at: String,
}

impl Product {
    pub const FIELD_NAMES: [&'static str; 9] = [
        "title",
        "price",
        "brand",
        "size",
        "condition",
        "product_url",
        "image_url",
        "location",
        "scraped_at",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub total_products: usize,
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// On-disk shape of `productos.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub metadata: CatalogMetadata,
    #[serde(default)]
    pub products: Vec<Product>,
}

impl ProductCatalog {
    pub fn empty() -> Self {
        Self {
            metadata: CatalogMetadata {
                total_products: 0,
                scraped_at: None,
                source: None,
            },
            products: Vec::new(),
        }
    }
}

// ── Dashboard API ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
    pub metadata: CatalogMetadata,
    pub total: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_products: usize,
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
    pub conditions: Vec<String>,
    pub price_range: PriceRange,
    #[serde(default)]
    pub last_update: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StartHarvestRequest {
    #[serde(default)]
    pub max_products: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartHarvestResponse {
    pub success: bool,
    pub message: String,
}
