use std::{
    io::BufWriter,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use futures::StreamExt;
use tempfile::NamedTempFile;

use crate::{
    bootstrap::BootstrapInfo,
    cache::FragmentCache,
    error::{HdsError, HdsResult},
    extract::extract_media_payload,
    fetch::{FetchProgress, FragmentFetcher},
    flv::FlvMuxer,
    fragment::{build_fragment_sequence, FragmentId},
    progress::{DownloadEvent, DownloadObserver, DownloadSession, LogObserver},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub output: PathBuf,
    pub fragments: usize,
    /// Bytes fetched over the network.
    pub downloaded_bytes: u64,
    /// Size of the written FLV file.
    pub output_bytes: u64,
    pub elapsed: Duration,
}

/// Downloads every fragment of a stream and muxes them into one FLV file.
///
/// Fragments are appended in fragment order even when several are fetched at
/// once. Any failure aborts the whole download: nothing is written to the
/// destination and all temporary files are removed.
pub struct HdsDownloader<F> {
    fetcher: F,
    observer: Arc<dyn DownloadObserver>,
    concurrency: NonZeroU32,
    fetch_timeout: Option<Duration>,
    cache_dir: Option<PathBuf>,
}

impl<F> HdsDownloader<F>
where
    F: FragmentFetcher,
{
    pub fn builder(fetcher: F) -> HdsDownloaderBuilder<F> {
        HdsDownloaderBuilder::new(fetcher)
    }

    pub async fn download(
        &self,
        base_url: &str,
        info: &BootstrapInfo,
        metadata: &[u8],
        output: impl AsRef<Path>,
    ) -> HdsResult<DownloadSummary> {
        let output = output.as_ref();
        let fragments = build_fragment_sequence(info)?;

        tracing::info!(
            "Start downloading {} fragment(s) with {} thread(s).",
            fragments.len(),
            self.concurrency.get()
        );
        self.observer.on_event(DownloadEvent::Started {
            fragments: fragments.len(),
        });

        let output_dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !output_dir.exists() {
            tokio::fs::create_dir_all(output_dir).await?;
        }
        let prefix = match output.file_name() {
            Some(name) => format!(".{}.", name.to_string_lossy()),
            None => ".f4m.".to_string(),
        };

        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(output_dir)?;
        let cache =
            FragmentCache::new_in(self.cache_dir.as_deref().unwrap_or(output_dir), &prefix)
                .await?;
        tracing::debug!("Fragments are cached at {}", cache.location_hint());

        let result = self
            .download_fragments(base_url, &fragments, metadata, temp, &cache)
            .await;

        let location = cache.location_hint();
        if let Err(e) = cache.clear() {
            tracing::warn!("Failed to remove fragment cache at {location}: {e}");
        }

        let (temp, session, output_bytes) = match result {
            Ok(result) => result,
            Err(e) => {
                // dropping the temporary output removes it
                tracing::error!("Download aborted: {e}");
                return Err(e);
            }
        };

        temp.persist(output)?;

        let elapsed = session.elapsed();
        let downloaded_bytes = session.downloaded_bytes();
        self.observer.on_event(DownloadEvent::Completed {
            total_bytes: downloaded_bytes,
            elapsed,
        });
        tracing::info!(
            "All finished. Please checkout your file at {}",
            output.display()
        );

        Ok(DownloadSummary {
            output: output.to_path_buf(),
            fragments: fragments.len(),
            downloaded_bytes,
            output_bytes,
            elapsed,
        })
    }

    async fn download_fragments(
        &self,
        base_url: &str,
        fragments: &[FragmentId],
        metadata: &[u8],
        temp: NamedTempFile,
        cache: &FragmentCache,
    ) -> HdsResult<(NamedTempFile, DownloadSession, u64)> {
        let mut session = DownloadSession::new(fragments.len());
        let mut muxer = FlvMuxer::new(BufWriter::new(temp), metadata)?;

        // `buffered` yields results in input order whatever order the fetches complete in
        let mut fetched = futures::stream::iter(fragments.iter().copied())
            .map(|fragment| self.fetch_fragment(base_url, fragment, cache))
            .buffered(self.concurrency.get() as usize);

        while let Some(result) = fetched.next().await {
            let (fragment, size) = result?;

            let data = cache.read(fragment).await?;
            let payload = extract_media_payload(&data).map_err(|e| e.in_fragment(fragment))?;
            muxer.append(payload)?;
            cache.invalidate(fragment).await?;

            session.record_fragment(size);
            self.observer.on_event(DownloadEvent::FragmentCompleted {
                fragment,
                progress: session.progress(),
            });
        }

        let output_bytes = muxer.bytes_written();
        let temp = muxer.finish()?.into_inner().map_err(|e| e.into_error())?;
        temp.as_file().sync_all()?;

        Ok((temp, session, output_bytes))
    }

    /// Fetches one fragment into the cache and returns its size.
    async fn fetch_fragment(
        &self,
        base_url: &str,
        fragment: FragmentId,
        cache: &FragmentCache,
    ) -> HdsResult<(FragmentId, u64)> {
        let url = fragment.url(base_url);
        tracing::debug!("Fetching {fragment} from {url}");

        let progress = FetchProgress::new(fragment, self.observer.as_ref());
        let fetch = self.fetcher.fetch(&url, &progress);
        let result = match self.fetch_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(elapsed) => {
                    return Err(HdsError::FetchFailure {
                        fragment,
                        url: url.clone(),
                        source: Box::new(elapsed),
                    })
                }
            },
            None => fetch.await,
        };
        let data = result.map_err(|e| HdsError::FetchFailure {
            fragment,
            url: url.clone(),
            source: Box::new(e),
        })?;

        cache
            .write(fragment, &data)
            .await
            .map_err(|e| e.in_fragment(fragment))?;
        Ok((fragment, data.len() as u64))
    }
}

pub struct HdsDownloaderBuilder<F> {
    fetcher: F,
    observer: Option<Arc<dyn DownloadObserver>>,
    concurrency: NonZeroU32,
    fetch_timeout: Option<Duration>,
    cache_dir: Option<PathBuf>,
}

impl<F> HdsDownloaderBuilder<F>
where
    F: FragmentFetcher,
{
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            observer: None,
            concurrency: NonZeroU32::MIN,
            fetch_timeout: None,
            cache_dir: None,
        }
    }

    /// Receiver of progress events. Defaults to [LogObserver].
    pub fn observer(mut self, observer: impl DownloadObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Number of fragments fetched at the same time. Defaults to 1.
    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Time limit of a single fragment fetch, retries of the fetcher included.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Directory to create the fragment cache in. Defaults to the directory of the output file.
    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    pub fn build(self) -> HdsDownloader<F> {
        HdsDownloader {
            fetcher: self.fetcher,
            observer: self.observer.unwrap_or_else(|| Arc::new(LogObserver)),
            concurrency: self.concurrency,
            fetch_timeout: self.fetch_timeout,
            cache_dir: self.cache_dir,
        }
    }
}
