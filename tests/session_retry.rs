mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{extractor, feed, Consent, FakeLauncher, RecordingSink};
use vinted_harvest::progress::NoProgress;
use vinted_harvest::scraping::scroll::{ScrollDriver, WaitRange};
use vinted_harvest::scraping::surface::SurfaceError;
use vinted_harvest::scraping::{HarvestState, SessionManager};

fn manager(launcher: Arc<FakeLauncher>) -> SessionManager {
    SessionManager::new(launcher, extractor(), ScrollDriver::new(WaitRange::zero()))
        .with_retries(3)
        .with_stall_budget(2)
}

#[tokio::test]
async fn third_attempt_succeeds_after_two_navigation_failures() {
    let launcher = Arc::new(FakeLauncher::new(vec![(1000, feed(0)), (2000, feed(4))], 2));

    let outcome = manager(Arc::clone(&launcher))
        .run("https://www.vinted.es/catalog", 4, &NoProgress)
        .await
        .unwrap();

    assert_eq!(outcome.state, HarvestState::Converged);
    assert_eq!(outcome.products.len(), 4);

    let log = &launcher.log;
    assert_eq!(log.opens.load(Ordering::SeqCst), 3);
    assert_eq!(log.closes.load(Ordering::SeqCst), 3);
    // each failed session was closed before the next one was opened
    assert_eq!(*log.closes_seen_at_open.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn exhausted_retries_report_last_error() {
    let launcher = Arc::new(FakeLauncher::new(vec![(1000, feed(4))], 10));

    let failure = manager(Arc::clone(&launcher))
        .run("https://www.vinted.es/catalog", 4, &NoProgress)
        .await
        .unwrap_err();

    assert_eq!(failure.attempts, 3);
    assert!(matches!(failure.last_error, SurfaceError::Navigation { .. }));
    assert_eq!(launcher.log.opens.load(Ordering::SeqCst), 3);
    assert_eq!(launcher.log.closes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn lifecycle_messages_precede_extraction() {
    let launcher = Arc::new(FakeLauncher::new(vec![(1000, feed(0)), (2000, feed(2))], 0));
    let sink = RecordingSink::default();

    manager(launcher)
        .run("https://www.vinted.es/catalog", 2, &sink)
        .await
        .unwrap();

    let messages: Vec<String> = sink.updates().into_iter().map(|u| u.2).collect();
    assert_eq!(
        messages,
        [
            "Launching browser...",
            "Loading page...",
            "Extracting products...",
            "Extracted: Prenda 1",
            "Extracted: Prenda 2",
        ]
    );
}

#[tokio::test]
async fn consent_dialog_never_fails_the_run() {
    for consent in [Consent::Absent, Consent::Clicked, Consent::ClickFails] {
        let launcher = Arc::new(
            FakeLauncher::new(vec![(1000, feed(0)), (2000, feed(2))], 0).with_consent(consent),
        );

        let outcome = manager(Arc::clone(&launcher))
            .with_consent_selector(r#"[data-testid="cookie-accept"]"#)
            .run("https://www.vinted.es/catalog", 2, &NoProgress)
            .await;
        let outcome = tokio_test::assert_ok!(outcome, "consent {:?}", consent);

        assert_eq!(outcome.state, HarvestState::Converged, "consent {:?}", consent);
        assert_eq!(outcome.products.len(), 2);
        assert_eq!(launcher.log.opens.load(Ordering::SeqCst), 1, "no retry for {:?}", consent);
        let clicks = launcher.log.consent_clicks.load(Ordering::SeqCst);
        assert_eq!(clicks, usize::from(consent == Consent::Clicked));
    }
}
