use std::{future::Future, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::{
    error::{HdsError, HdsResult},
    fragment::FragmentId,
    progress::{DownloadEvent, DownloadObserver, FetchStatus},
    util::http::HttpClient,
};

/// Maximum buffer preallocated from a `Content-Length` header.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Handle given to a fetcher to report byte progress of the fragment being fetched.
pub struct FetchProgress<'a> {
    fragment: FragmentId,
    observer: &'a dyn DownloadObserver,
}

impl<'a> FetchProgress<'a> {
    pub fn new(fragment: FragmentId, observer: &'a dyn DownloadObserver) -> Self {
        Self { fragment, observer }
    }

    pub fn fragment(&self) -> FragmentId {
        self.fragment
    }

    pub fn report(&self, downloaded_bytes: u64, total_bytes: Option<u64>, status: FetchStatus) {
        self.observer.on_event(DownloadEvent::Fetching {
            fragment: self.fragment,
            downloaded_bytes,
            total_bytes,
            status,
        });
    }
}

/// Retrieves the bytes of a fragment.
///
/// Retry policy belongs to the implementation, the downloader never retries a fragment.
pub trait FragmentFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        progress: &FetchProgress<'_>,
    ) -> impl Future<Output = HdsResult<Bytes>> + Send;
}

impl<F> FragmentFetcher for Arc<F>
where
    F: FragmentFetcher,
{
    fn fetch(
        &self,
        url: &str,
        progress: &FetchProgress<'_>,
    ) -> impl Future<Output = HdsResult<Bytes>> + Send {
        self.as_ref().fetch(url, progress)
    }
}

pub struct HttpFetcher {
    client: HttpClient,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client, retries: 3 }
    }

    /// Number of extra attempts after a failed request.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    async fn fetch_once(&self, url: &str, progress: &FetchProgress<'_>) -> HdsResult<Bytes> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::debug!("Error body: {body}");
            }
            return Err(HdsError::HttpError(status));
        }

        let total = response.content_length();
        let mut data = BytesMut::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
        progress.report(0, total, FetchStatus::Downloading);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
            progress.report(data.len() as u64, total, FetchStatus::Downloading);
        }
        progress.report(data.len() as u64, total, FetchStatus::Finished);

        Ok(data.freeze())
    }
}

impl FragmentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, progress: &FetchProgress<'_>) -> HdsResult<Bytes> {
        let fragment = progress.fragment();
        let mut retries = self.retries;
        loop {
            match self.fetch_once(url, progress).await {
                Ok(data) => return Ok(data),
                Err(e) if retries == 0 => {
                    tracing::error!("Fetching {fragment} failed, max retries exceed. {e}");
                    return Err(e);
                }
                Err(e) => {
                    retries -= 1;
                    tracing::warn!("Fetching {fragment} failed, retry later. {e}");
                }
            }
        }
    }
}
