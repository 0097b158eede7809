use std::{num::NonZeroU32, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args, Parser};
use f4m::{HdsDownloader, HdsStream, HttpClient, HttpFetcher};
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder, Url,
};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
struct F4mdlArgs {
    #[clap(flatten)]
    http: HttpOptions,

    #[clap(flatten)]
    download: DownloadOptions,

    /// Output file path
    #[clap(short, long, default_value = "./output.flv")]
    output: PathBuf,

    /// Directory to keep fragments in while downloading
    #[clap(long, env = "TEMP")]
    cache_dir: Option<PathBuf>,

    /// Debug output
    #[clap(short, long, alias = "debug")]
    verbose: bool,

    /// f4m manifest url
    url: String,
}

#[derive(Args, Debug, Clone)]
struct HttpOptions {
    /// Additional HTTP headers
    ///
    /// Custom header. eg. "Referer: https://example.com/".
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Cookies used to download, in "name=value; name2=value2" form
    #[clap(long)]
    cookies: Option<String>,

    /// HTTP timeout, in seconds
    #[clap(short, long, default_value = "10")]
    timeout: u64,
}

impl HttpOptions {
    fn into_client(self, url: &Url) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let client = HttpClient::new(
            ClientBuilder::new()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .timeout(Duration::from_secs(self.timeout)),
        )?;
        if let Some(cookies) = &self.cookies {
            client.add_cookies(cookies.split(';').map(str::trim), url);
        }

        Ok(client)
    }
}

#[derive(Args, Debug, Clone)]
struct DownloadOptions {
    /// Threads limit
    #[clap(long, alias = "threads", default_value = "1")]
    concurrency: NonZeroU32,

    /// Fragment retry limit
    #[clap(long, default_value = "3")]
    retries: u32,

    /// Time limit of a single fragment, in seconds. Retries included.
    #[clap(long)]
    fragment_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = F4mdlArgs::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let url = Url::parse(&args.url)?;
    let client = args.http.into_client(&url)?;

    let stream = HdsStream::load(&client, url).await?;
    tracing::debug!(
        "Movie: {:?}; Live: {}; Base url: {}",
        stream.bootstrap.movie_identifier,
        stream.bootstrap.live,
        stream.manifest.base_url
    );

    let fetcher = HttpFetcher::new(client).with_retries(args.download.retries);
    let mut builder =
        HdsDownloader::builder(Arc::new(fetcher)).concurrency(args.download.concurrency);
    if let Some(timeout) = args.download.fragment_timeout {
        builder = builder.fetch_timeout(Duration::from_secs(timeout));
    }
    if let Some(cache_dir) = args.cache_dir {
        builder = builder.cache_dir(cache_dir);
    }

    stream.download(&builder.build(), &args.output).await?;

    Ok(())
}
