use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::Duration,
};

use f4m::{progress::DownloadEvent, BootstrapInfo, FragmentId, HdsDownloader, HdsError};

use crate::{fetcher::TestFetcher, fixture, AssertWrapper};

const BASE_URL: &str = "http://example.com/hds/stream_500";

fn fragment_url(fragment: u32) -> String {
    FragmentId::new(1, fragment).url(BASE_URL)
}

fn recorder() -> (
    Arc<Mutex<Vec<DownloadEvent>>>,
    impl Fn(DownloadEvent) + Send + Sync + 'static,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (events, move |event: DownloadEvent| {
        sink.lock().unwrap().push(event)
    })
}

fn completed_fragments(events: &[DownloadEvent]) -> Vec<FragmentId> {
    events
        .iter()
        .filter_map(|event| match event {
            DownloadEvent::FragmentCompleted { fragment, .. } => Some(*fragment),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_download() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(1, 3))?;
    let fetcher = TestFetcher::new()
        .with(fragment_url(1), fixture::fragment(b"A"))
        .with(fragment_url(2), fixture::fragment(b"B"))
        .with(fragment_url(3), fixture::fragment(b"C"));

    let summary = HdsDownloader::builder(fetcher)
        .build()
        .download(BASE_URL, &info, b"M", &output)
        .await?;

    let expected = fixture::flv(b"M", &[b"ABC"]);
    assert_eq!(std::fs::read(&output)?, expected);
    assert_eq!(summary.fragments, 3);
    assert_eq!(summary.output_bytes, expected.len() as u64);
    assert_eq!(summary.output, output);

    // only the output file is left
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_download_in_fragment_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("nested").join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(10, 3))?;
    // fragments finish in reverse order
    let fetcher = Arc::new(
        TestFetcher::new()
            .with_delay(
                fragment_url(10),
                fixture::fragment(b"first "),
                Duration::from_millis(200),
            )
            .with_delay(
                fragment_url(11),
                fixture::fragment(b"second "),
                Duration::from_millis(100),
            )
            .with_delay(
                fragment_url(12),
                fixture::fragment(b"third"),
                Duration::from_millis(50),
            ),
    );
    let (events, observer) = recorder();

    let summary = HdsDownloader::builder(fetcher.clone())
        .observer(observer)
        .concurrency(NonZeroU32::new(3).unwrap())
        .build()
        .download(BASE_URL, &info, b"meta", &output)
        .await?;

    assert_eq!(
        std::fs::read(&output)?,
        fixture::flv(b"meta", &[b"first ", b"second ", b"third"])
    );
    assert_eq!(fetcher.max_in_flight(), 3);

    let events = events.lock().unwrap();
    assert_eq!(events.first(), Some(&DownloadEvent::Started { fragments: 3 }));
    assert!(matches!(
        events.last(),
        Some(DownloadEvent::Completed { total_bytes, .. }) if *total_bytes == summary.downloaded_bytes
    ));
    assert_eq!(
        completed_fragments(&events),
        vec![
            FragmentId::new(1, 10),
            FragmentId::new(1, 11),
            FragmentId::new(1, 12)
        ]
    );

    let progress = events
        .iter()
        .filter_map(|event| match event {
            DownloadEvent::FragmentCompleted { progress, .. } => Some(progress),
            _ => None,
        })
        .last()
        .assert_success();
    assert_eq!(progress.completed_fragments, 3);
    assert_eq!(progress.total_fragments, 3);
    assert_eq!(progress.percentage(), 100.);

    Ok(())
}

#[tokio::test]
async fn test_download_concurrency_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(1, 6))?;
    let fetcher = (1..=6).fold(TestFetcher::new(), |fetcher, i| {
        fetcher.with_delay(
            fragment_url(i),
            fixture::fragment(&[i as u8]),
            Duration::from_millis(20),
        )
    });
    let fetcher = Arc::new(fetcher);

    HdsDownloader::builder(fetcher.clone())
        .concurrency(NonZeroU32::new(2).unwrap())
        .build()
        .download(BASE_URL, &info, b"", &output)
        .await?;

    assert!(fetcher.max_in_flight() <= 2);
    assert_eq!(
        std::fs::read(&output)?,
        fixture::flv(b"", &[&[1], &[2], &[3], &[4], &[5], &[6]])
    );

    Ok(())
}

#[tokio::test]
async fn test_abort_on_fetch_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(1, 3))?;
    // the second fragment is missing
    let fetcher = Arc::new(
        TestFetcher::new()
            .with(fragment_url(1), fixture::fragment(b"one"))
            .with(fragment_url(3), fixture::fragment(b"three")),
    );
    let (events, observer) = recorder();

    let result = HdsDownloader::builder(fetcher.clone())
        .observer(observer)
        .build()
        .download(BASE_URL, &info, b"M", &output)
        .await;

    match result {
        Err(HdsError::FetchFailure { fragment, url, .. }) => {
            assert_eq!(fragment, FragmentId::new(1, 2));
            assert_eq!(url, fragment_url(2));
        }
        r => panic!("unexpected result: {r:?}"),
    }

    // no partial output and no temporary files
    assert!(!output.exists());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    assert_eq!(fetcher.requests(), vec![fragment_url(1), fragment_url(2)]);
    let events = events.lock().unwrap();
    assert_eq!(completed_fragments(&events), vec![FragmentId::new(1, 1)]);
    assert!(!events
        .iter()
        .any(|event| matches!(event, DownloadEvent::Completed { .. })));

    Ok(())
}

#[tokio::test]
async fn test_abort_on_missing_media_box() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache_dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(1, 2))?;
    let fetcher = TestFetcher::new()
        .with(fragment_url(1), fixture::fragment(b"one"))
        .with(fragment_url(2), fixture::fragment_without_media());

    let error = HdsDownloader::builder(fetcher)
        .cache_dir(cache_dir.path())
        .build()
        .download(BASE_URL, &info, b"M", &output)
        .await
        .unwrap_err();

    assert!(matches!(error.kind(), HdsError::MissingMediaBox { .. }));
    match &error {
        HdsError::Fragment { fragment, source } => {
            assert_eq!(*fragment, FragmentId::new(1, 2));
            assert!(matches!(**source, HdsError::MissingMediaBox { scanned: 1 }));
        }
        e => panic!("unexpected error: {e}"),
    }

    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    assert_eq!(std::fs::read_dir(cache_dir.path())?.count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_fetch_timeout() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let info = BootstrapInfo::parse(&fixture::bootstrap(1, 1))?;
    let fetcher = TestFetcher::new().with_delay(
        fragment_url(1),
        fixture::fragment(b"slow"),
        Duration::from_secs(10),
    );

    let result = HdsDownloader::builder(fetcher)
        .fetch_timeout(Duration::from_millis(50))
        .build()
        .download(BASE_URL, &info, b"M", &output)
        .await;

    assert!(matches!(
        result,
        Err(HdsError::FetchFailure { fragment, .. }) if fragment == FragmentId::new(1, 1)
    ));
    assert!(!output.exists());

    Ok(())
}

#[tokio::test]
async fn test_unsupported_bootstrap() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.flv");

    let mut info = BootstrapInfo::parse(&fixture::bootstrap(1, 1))?;
    info.fragment_runs.clear();

    let fetcher = Arc::new(TestFetcher::new());
    let result = HdsDownloader::builder(fetcher.clone())
        .build()
        .download(BASE_URL, &info, b"M", &output)
        .await;

    assert!(matches!(result, Err(HdsError::UnsupportedStream(_))));
    assert!(fetcher.requests().is_empty());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    Ok(())
}
