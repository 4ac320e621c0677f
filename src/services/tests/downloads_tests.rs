use std::time::Duration;

use super::*;

#[test]
fn retry_delay_doubles_from_the_base() {
    assert_eq!(retry_delay(0), Duration::from_millis(350));
    assert_eq!(retry_delay(1), Duration::from_millis(700));
    assert_eq!(retry_delay(2), Duration::from_millis(1400));
    assert_eq!(retry_delay(3), Duration::from_millis(2800));
}

#[test]
fn canonical_url_strips_fragments() {
    assert_eq!(
        canonical_url("https://example.com/page#section-3"),
        "https://example.com/page"
    );
}

#[test]
fn canonical_url_strips_tracking_params() {
    assert_eq!(
        canonical_url("https://example.com/p?utm_source=feed&id=5&utm_medium=x"),
        "https://example.com/p?id=5"
    );
    assert_eq!(
        canonical_url("https://example.com/p?fbclid=abc123"),
        "https://example.com/p"
    );
}

#[test]
fn canonical_url_keeps_meaningful_queries() {
    assert_eq!(
        canonical_url("https://example.com/gallery?page=2&sort=new"),
        "https://example.com/gallery?page=2&sort=new"
    );
    assert_eq!(
        canonical_url("https://example.com/plain"),
        "https://example.com/plain"
    );
}

#[test]
fn canonical_url_is_idempotent() {
    let once = canonical_url("https://example.com/p?utm_source=a&id=1#frag");
    let twice = canonical_url(&once);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn fetch_against_unroutable_host_wants_a_retry() {
    let settings = crate::services::config::Settings::default();
    let downloader = Downloader::new(&settings);

    // The .invalid TLD is guaranteed to fail resolution, so this errors
    // quickly without touching the real network.
    let outcome = downloader
        .fetch_once("http://host.invalid/file.jpg", "", 0)
        .await;
    match outcome {
        DownloadOutcome::Retry { after } => {
            assert_eq!(after, retry_delay(0));
        }
        other => panic!("expected retry, got {other:?}"),
    }
}
