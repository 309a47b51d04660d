//! Dashboard queries over an already-loaded product list.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::types::{PriceRange, Product, ProductQuery, UNKNOWN};

/// Filter values meaning "no filter".
const ALL: &[&str] = &["all", "todas", "todos"];

/// `"15,50 €"` → `15.5`. Strips the currency symbol, turns the decimal comma
/// into a point and reads the first whitespace-delimited token.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned = raw.replace('€', "").replace(',', ".");
    cleaned.split_whitespace().next()?.parse::<f64>().ok()
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Lowercased filter value, or `None` when empty / "all".
fn active_filter(value: Option<&str>) -> Option<String> {
    let v = value?.trim().to_lowercase();
    (!v.is_empty() && !ALL.contains(&v.as_str())).then_some(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Price,
    Brand,
    Date,
}

/// Apply search, attribute filters, price range and sort, in that order.
pub fn apply_query(mut products: Vec<Product>, query: &ProductQuery) -> Vec<Product> {
    if let Some(search) = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
    {
        products.retain(|p| contains_ci(&p.title, &search) || contains_ci(&p.brand, &search));
    }

    if let Some(brand) = active_filter(query.brand.as_deref()) {
        products.retain(|p| contains_ci(&p.brand, &brand));
    }
    if let Some(size) = active_filter(query.size.as_deref()) {
        products.retain(|p| contains_ci(&p.size, &size));
    }
    if let Some(condition) = active_filter(query.condition.as_deref()) {
        products.retain(|p| contains_ci(&p.condition, &condition));
    }

    filter_price(&mut products, query.min_price, query.max_price);
    sort_products(&mut products, query.sort_by.as_deref(), query.sort_order.as_deref());
    products
}

/// Keep products inside `[min, max]`. Unparsable prices are kept.
pub fn filter_price(products: &mut Vec<Product>, min: Option<f64>, max: Option<f64>) {
    let min = min.unwrap_or(0.0);
    let max = max.unwrap_or(f64::INFINITY);
    products.retain(|p| match parse_price(&p.price) {
        Some(price) => min <= price && price <= max,
        None => true,
    });
}

/// Sort by `price`, `brand` or `date` (default), `asc` or `desc` (default).
/// Unknown keys leave the order untouched; unparsable prices sort as 0.
pub fn sort_products(products: &mut [Product], sort_by: Option<&str>, sort_order: Option<&str>) {
    let key = match sort_by.unwrap_or("date") {
        "price" => SortKey::Price,
        "brand" => SortKey::Brand,
        "date" => SortKey::Date,
        _ => return,
    };
    let descending = sort_order.unwrap_or("desc") == "desc";

    products.sort_by(|a, b| {
        let ord = match key {
            SortKey::Price => {
                let pa = parse_price(&a.price).unwrap_or(0.0);
                let pb = parse_price(&b.price).unwrap_or(0.0);
                pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
            }
            SortKey::Brand => a.brand.cmp(&b.brand),
            SortKey::Date => a.scraped_at.cmp(&b.scraped_at),
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

/// Sorted distinct values of one field, sentinels excluded.
fn distinct(products: &[Product], field: impl Fn(&Product) -> &str) -> Vec<String> {
    products
        .iter()
        .map(field)
        .filter(|v| !v.is_empty() && *v != UNKNOWN && *v != "N/A")
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStats {
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
    pub conditions: Vec<String>,
    pub price_range: PriceRange,
}

pub fn stats(products: &[Product]) -> CatalogStats {
    let prices: Vec<f64> = products.iter().filter_map(|p| parse_price(&p.price)).collect();
    let price_range = if prices.is_empty() {
        PriceRange::default()
    } else {
        PriceRange {
            min: prices.iter().copied().fold(f64::INFINITY, f64::min),
            max: prices.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    };

    CatalogStats {
        brands: distinct(products, |p| p.brand.as_str()),
        sizes: distinct(products, |p| p.size.as_str()),
        conditions: distinct(products, |p| p.condition.as_str()),
        price_range,
    }
}
