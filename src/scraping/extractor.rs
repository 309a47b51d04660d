//! Field extraction from one rendered product card.
//!
//! Every field is described by an ordered list of [`Lookup`] strategies. The
//! first strategy that yields a non-empty value wins; when all of them miss
//! the field falls back to [`UNKNOWN`]. Only a failure of the query layer
//! itself (bad selector, broken node) discards the whole record.

use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, MatchKind};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::types::{Product, UNKNOWN};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("node query failed: {0}")]
    Query(String),
}

/// Query capability over a single product node.
pub trait ProductNode {
    /// Whitespace-normalized inner text of the first descendant matching `selector`.
    fn text(&self, selector: &str) -> Result<Option<String>, ExtractError>;

    /// Attribute `name` of the first descendant matching `selector`.
    fn attr(&self, selector: &str, name: &str) -> Result<Option<String>, ExtractError>;
}

/// A single lookup strategy, scoped to the product node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Text(String),
    Attr(String, String),
}

impl Lookup {
    /// `"css"` → inner text, `"css@attr"` → attribute.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some((css, attr)) = raw.rsplit_once('@') {
            let attr = attr.trim();
            let is_ident = !attr.is_empty()
                && attr
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if is_ident && !css.trim().is_empty() {
                return Some(Self::Attr(css.trim().to_string(), attr.to_string()));
            }
        }
        Some(Self::Text(raw.to_string()))
    }

    fn resolve<N: ProductNode + ?Sized>(&self, node: &N) -> Result<Option<String>, ExtractError> {
        match self {
            Self::Text(css) => node.text(css),
            Self::Attr(css, name) => node.attr(css, name),
        }
    }
}

fn text(css: &str) -> Lookup {
    Lookup::Text(css.to_string())
}

fn attr(css: &str, name: &str) -> Lookup {
    Lookup::Attr(css.to_string(), name.to_string())
}

/// Strategy lists for every field plus the candidate-node selector.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSet {
    pub candidates: String,
    pub title: Vec<Lookup>,
    pub price: Vec<Lookup>,
    pub condition: Vec<Lookup>,
    pub product_url: Vec<Lookup>,
    pub image_url: Vec<Lookup>,
    pub image_alt: Vec<Lookup>,
    pub location: Vec<Lookup>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        const IMG: &str = r#"img[data-testid*="image--img"]"#;
        Self {
            candidates: r#".feed-grid__item, [data-testid="item-box"]"#.to_string(),
            title: vec![text(r#"p[data-testid*="description-title"]"#)],
            price: vec![text(r#"p[data-testid*="price-text"]"#)],
            condition: vec![text(r#"p[data-testid*="description-subtitle"]"#)],
            product_url: vec![
                attr(r#"a[data-testid*="overlay-link"]"#, "href"),
                attr(r#"a[href*="/items/"]"#, "href"),
            ],
            image_url: vec![attr(IMG, "src"), attr(IMG, "data-src")],
            image_alt: vec![attr(IMG, "alt")],
            location: vec![text(r#"[class*="location"], [class*="user-location"]"#)],
        }
    }
}

/// Result of scanning one page snapshot.
#[derive(Debug, Default)]
pub struct PageScan {
    /// Candidate nodes currently rendered, including already-scanned ones.
    pub candidates: usize,
    /// One entry per node after the skip cursor; `None` for discarded nodes.
    pub extracted: Vec<Option<Product>>,
}

#[derive(Debug, Clone)]
pub struct FieldExtractor {
    selectors: SelectorSet,
    origin: String,
}

impl FieldExtractor {
    pub fn new(selectors: SelectorSet, origin: impl Into<String>) -> Self {
        Self {
            selectors,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    /// Extract one record. Never returns a partially-populated product:
    /// either every field is set (value or sentinel) or the node is discarded.
    pub fn extract<N: ProductNode + ?Sized>(&self, node: &N, scraped_at: &str) -> Option<Product> {
        match self.try_extract(node, scraped_at) {
            Ok(product) => Some(product),
            Err(e) => {
                error!("Discarding product node: {}", e);
                None
            }
        }
    }

    fn try_extract<N: ProductNode + ?Sized>(
        &self,
        node: &N,
        scraped_at: &str,
    ) -> Result<Product, ExtractError> {
        let s = &self.selectors;
        let title = first_match(node, &s.title, "title")?;
        let price = first_match(node, &s.price, "price")?;
        let condition = first_match(node, &s.condition, "condition")?;
        let href = first_match(node, &s.product_url, "product_url")?;
        let image = first_match(node, &s.image_url, "image_url")?;
        let alt = first_match(node, &s.image_alt, "image_alt")?;
        let location = first_match(node, &s.location, "location")?;

        let (brand, size) = alt.as_deref().map(parse_alt_text).unwrap_or_default();

        Ok(Product {
            title: or_unknown(title),
            price: or_unknown(price),
            brand: or_unknown(brand),
            size: or_unknown(size),
            condition: or_unknown(condition),
            product_url: href
                .map(|h| absolutize(&h, &self.origin))
                .unwrap_or_default(),
            image_url: image
                .map(|h| absolutize(&h, &self.origin))
                .unwrap_or_else(|| UNKNOWN.to_string()),
            location: or_unknown(location),
            scraped_at: scraped_at.to_string(),
        })
    }

    /// Parse a page snapshot and extract every candidate node after `skip`.
    ///
    /// Only an invalid candidate selector fails the scan; per-node failures
    /// become `None` entries.
    pub fn scan(&self, html: &str, skip: usize, scraped_at: &str) -> Result<PageScan, ExtractError> {
        let selector = parse_selector(&self.selectors.candidates)?;
        let document = Html::parse_document(html);
        let nodes: Vec<ElementRef<'_>> = document.select(&selector).collect();

        let extracted = nodes
            .iter()
            .skip(skip)
            .map(|el| self.extract(&HtmlNode::new(*el), scraped_at))
            .collect();

        Ok(PageScan {
            candidates: nodes.len(),
            extracted,
        })
    }
}

fn first_match<N: ProductNode + ?Sized>(
    node: &N,
    lookups: &[Lookup],
    field: &str,
) -> Result<Option<String>, ExtractError> {
    for lookup in lookups {
        if let Some(value) = lookup.resolve(node)? {
            let value = value.trim();
            if !value.is_empty() {
                return Ok(Some(value.to_string()));
            }
        }
    }
    debug!(field, "no lookup strategy matched");
    Ok(None)
}

fn or_unknown(v: Option<String>) -> String {
    v.unwrap_or_else(|| UNKNOWN.to_string())
}

/// Join relative (scheme-less) hrefs onto `origin`.
pub fn absolutize(href: &str, origin: &str) -> String {
    let href = href.trim();
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    Url::parse(origin)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", origin.trim_end_matches('/'), href))
}

// ── Alt-text attributes ──────────────────────────────────────────────────────

const SIZE_LABEL: usize = 0;
const BRAND_LABEL: usize = 1;

static LABEL_MATCHER: OnceLock<Option<AhoCorasick>> = OnceLock::new();
static SIZE_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

/// Label id per pattern: 0 = size, 1 = brand.
const LABELS: &[(&str, usize)] = &[
    ("talla", SIZE_LABEL),
    ("size", SIZE_LABEL),
    ("taille", SIZE_LABEL),
    ("marca", BRAND_LABEL),
    ("brand", BRAND_LABEL),
    ("marque", BRAND_LABEL),
];

fn label_matcher() -> Option<&'static AhoCorasick> {
    LABEL_MATCHER
        .get_or_init(|| {
            AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .match_kind(MatchKind::LeftmostFirst)
                .build(LABELS.iter().map(|(p, _)| *p))
                .ok()
        })
        .as_ref()
}

fn size_marker() -> Option<&'static Regex> {
    SIZE_MARKER
        .get_or_init(|| {
            Regex::new(r"(?i)^(?:XXXS|XXS|XS|S|M|L|XL|XXL|XXXL|[2-6]XL)(?:\s*/\s*\d{1,2})*$").ok()
        })
        .as_ref()
}

/// Best-effort `(brand, size)` from an image alt text such as
/// `"Vestido midi, marca: Zara, talla: M, estado: Nuevo, 10,00 €"`.
///
/// Only alt texts with more than two comma-separated parts are considered.
pub fn parse_alt_text(alt: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = alt.split(',').map(str::trim).collect();
    if parts.len() <= 2 {
        return (None, None);
    }

    let mut brand = None;
    let mut size = None;
    for part in &parts {
        if let Some((label, value)) = labelled(part) {
            let slot = match label {
                SIZE_LABEL => &mut size,
                _ => &mut brand,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.to_string());
            }
        } else if size.is_none() && size_marker().is_some_and(|re| re.is_match(part)) {
            size = Some(part.to_string());
        }
    }
    (brand, size)
}

/// `"talla: M"` / `"Marca Zara"` → `(label, value)`. The label must open the
/// part and be followed by `:` or whitespace, so `"Brandy Melville"` or
/// `"Sudadera oversize"` are not labelled.
fn labelled(part: &str) -> Option<(usize, &str)> {
    let m = label_matcher()?.find(part)?;
    if m.start() != 0 {
        return None;
    }
    let rest = &part[m.end()..];
    if !rest.starts_with(|c: char| c == ':' || c.is_whitespace()) {
        return None;
    }
    let value = rest.trim_start().trim_start_matches(':').trim();
    Some((LABELS[m.pattern().as_usize()].1, value))
}

// ── scraper-backed node ──────────────────────────────────────────────────────

/// [`ProductNode`] over a parsed `scraper` element.
pub struct HtmlNode<'a> {
    element: ElementRef<'a>,
}

impl<'a> HtmlNode<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }

    fn first(&self, selector: &str) -> Result<Option<ElementRef<'a>>, ExtractError> {
        let sel = parse_selector(selector)?;
        Ok(self.element.select(&sel).next())
    }
}

impl ProductNode for HtmlNode<'_> {
    fn text(&self, selector: &str) -> Result<Option<String>, ExtractError> {
        Ok(self.first(selector)?.map(|el| {
            el.text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        }))
    }

    fn attr(&self, selector: &str, name: &str) -> Result<Option<String>, ExtractError> {
        Ok(self
            .first(selector)?
            .and_then(|el| el.value().attr(name).map(str::to_string)))
    }
}

fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}
