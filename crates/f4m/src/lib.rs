pub mod bootstrap;
pub mod boxes;
pub mod cache;
pub mod download;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod flv;
pub mod fragment;
pub mod manifest;
pub mod progress;
pub mod util;

pub use bootstrap::BootstrapInfo;
pub use download::{DownloadSummary, HdsDownloader};
pub use error::{HdsError, HdsResult};
pub use fetch::{FragmentFetcher, HttpFetcher};
pub use fragment::FragmentId;
pub use manifest::{load_manifest, F4mManifest};
pub use progress::{DownloadEvent, DownloadObserver};
pub use util::http::HttpClient;

/// ┌──────────────┐  abst   ┌──────────────┐  Seg1-Frag{F..F+N-1}  ┌──────────────┐
/// │              ├─────────►              ├───────────────────────►              ├───┐
/// │     F4M      │         │   Fragment   │                       │  Downloader  │   │ fetch
/// │   Manifest   │         │   Sequence   │                       │  [buffered]  ◄───┘
/// │              │         │              │                       │              │
/// └──────┬───────┘         └──────────────┘                       └──────┬───────┘
///        │ metadata                                                      │ mdat payload
///        │                 ┌──────────────┐                              │ (in order)
///        └─────────────────►  FLV Muxer   ◄──────────────────────────────┘
///                          └──────┬───────┘
///                                 │ atomic rename
///                                 ▼
///                             output.flv
pub struct HdsStream {
    pub manifest: F4mManifest,
    pub bootstrap: BootstrapInfo,
}

impl HdsStream {
    /// Loads the manifest at `url` and parses its bootstrap info.
    pub async fn load(client: &HttpClient, url: reqwest::Url) -> HdsResult<Self> {
        let manifest = load_manifest(client, url).await?;
        let bootstrap = BootstrapInfo::parse(&manifest.bootstrap)?;
        Ok(Self {
            manifest,
            bootstrap,
        })
    }

    pub async fn download<F>(
        &self,
        downloader: &HdsDownloader<F>,
        output: impl AsRef<std::path::Path>,
    ) -> HdsResult<DownloadSummary>
    where
        F: FragmentFetcher,
    {
        downloader
            .download(
                &self.manifest.base_url,
                &self.bootstrap,
                &self.manifest.metadata,
                output,
            )
            .await
    }
}
