mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{card, extractor, feed, FailingSink, FakeSurface, RecordingSink, ORIGIN};
use vinted_harvest::progress::NoProgress;
use vinted_harvest::scraping::extractor::{FieldExtractor, Lookup, SelectorSet};
use vinted_harvest::scraping::scroll::{ScrollDriver, WaitRange};
use vinted_harvest::scraping::{DedupPolicy, HarvestState, Harvester};

fn driver() -> ScrollDriver {
    ScrollDriver::new(WaitRange::zero())
}

#[tokio::test]
async fn converges_on_first_scroll_when_target_is_visible() {
    let ex = extractor();
    let driver = driver();
    let mut page = FakeSurface::new(vec![(1000, feed(0)), (2000, feed(3))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .harvest(&mut page, 3, 50)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert_eq!(outcome.scrolls, 1);
    assert_eq!(outcome.products.len(), 3);
    let titles: Vec<_> = outcome.products.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, ["Prenda 1", "Prenda 2", "Prenda 3"]);
    assert_eq!(outcome.products[0].brand, "Zara");
    assert_eq!(outcome.products[0].size, "M");
    assert_eq!(
        outcome.products[0].product_url,
        "https://www.vinted.es/items/1-listing"
    );
}

#[tokio::test]
async fn stalls_out_after_budget_of_flat_scrolls() {
    let ex = extractor();
    let driver = driver();
    let mut page = FakeSurface::new(vec![(1000, feed(0)), (2000, feed(6)), (3000, feed(12))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .harvest(&mut page, 100, 3)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::StalledOut);
    assert_eq!(outcome.products.len(), 12);
    // two growing scrolls, then three flat ones
    assert_eq!(outcome.scrolls, 5);
}

#[tokio::test]
async fn never_returns_more_than_target() {
    let ex = extractor();
    let driver = driver();
    let mut page = FakeSurface::new(vec![(1000, feed(0)), (2000, feed(20))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .harvest(&mut page, 7, 50)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert_eq!(outcome.products.len(), 7);
}

#[tokio::test]
async fn zero_target_converges_without_scrolling() {
    let ex = extractor();
    let driver = driver();
    let mut page = FakeSurface::new(vec![(1000, feed(5))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .harvest(&mut page, 0, 50)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert!(outcome.products.is_empty());
    assert_eq!(page.scrolls, 0);
}

#[tokio::test]
async fn rescanning_a_static_page_adds_nothing() {
    let ex = extractor();
    let driver = driver();
    // Height never changes: every scroll is a stall, the same cards keep showing.
    let mut page = FakeSurface::new(vec![(1000, feed(4))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .with_policy(DedupPolicy::ProductUrl)
        .harvest(&mut page, 50, 4)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::StalledOut);
    assert_eq!(outcome.products.len(), 4);
    assert_eq!(outcome.scrolls, 4);
}

#[tokio::test]
async fn progress_counts_are_monotonic() {
    let ex = extractor();
    let driver = driver();
    let sink = RecordingSink::default();
    let mut page = FakeSurface::new(vec![(1000, feed(0)), (2000, feed(3)), (3000, feed(8))]);

    let outcome = Harvester::new(&ex, &driver, &sink)
        .harvest(&mut page, 6, 10)
        .await
        .unwrap();
    assert_eq!(outcome.products.len(), 6);

    let updates = sink.updates();
    assert_eq!(updates.len(), 6);
    assert!(updates.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(updates.iter().all(|(_, total, _)| *total == 6));
    assert_eq!(updates[0].2, "Extracted: Prenda 1");
    assert_eq!(updates.last().map(|u| u.0), Some(6));
}

#[tokio::test]
async fn cancelled_run_keeps_what_it_has() {
    let ex = extractor();
    let driver = driver();
    let cancel = AtomicBool::new(true);
    let mut page = FakeSurface::new(vec![(1000, feed(3))]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .with_cancel(&cancel)
        .harvest(&mut page, 10, 5)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Cancelled);
    assert!(outcome.products.is_empty());
    assert_eq!(outcome.scrolls, 0);
}

#[tokio::test]
async fn rejected_progress_updates_do_not_stop_the_run() {
    let ex = extractor();
    let driver = driver();
    let sink = FailingSink::default();
    let mut page = FakeSurface::new(vec![(1000, feed(0)), (2000, feed(4))]);

    let outcome = Harvester::new(&ex, &driver, &sink)
        .harvest(&mut page, 4, 5)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert_eq!(outcome.products.len(), 4);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
}

/// Card without a title: with the fallback below it reaches a selector that
/// cannot be parsed, so only this node fails.
fn untitled_card() -> String {
    r#"<div class="feed-grid__item">
  <p data-testid="product-item-id-99--price-text">3,00 €</p>
</div>"#
        .to_string()
}

fn page(cards: &[String]) -> String {
    format!(
        r#"<html><body><div class="feed-grid">{}</div></body></html>"#,
        cards.concat()
    )
}

#[tokio::test]
async fn failing_node_is_skipped_and_cursor_moves_past_it() {
    let mut selectors = SelectorSet::default();
    selectors.title.push(Lookup::Text("p[[broken".to_string()));
    let ex = FieldExtractor::new(selectors, ORIGIN);
    let driver = driver();

    let first = vec![
        card(1, "Prenda 1", "1,00 €"),
        untitled_card(),
        card(3, "Prenda 3", "3,00 €"),
    ];
    let mut second = first.clone();
    second.push(card(4, "Prenda 4", "4,00 €"));
    let mut surface = FakeSurface::new(vec![
        (1000, page(&[])),
        (2000, page(&first)),
        (3000, page(&second)),
    ]);

    let outcome = Harvester::new(&ex, &driver, &NoProgress)
        .harvest(&mut surface, 3, 5)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert_eq!(outcome.scrolls, 2);
    let titles: Vec<_> = outcome.products.iter().map(|p| p.title.as_str()).collect();
    // no card is read twice: the second pass starts after the failed node
    assert_eq!(titles, ["Prenda 1", "Prenda 3", "Prenda 4"]);
}
