//! F4M manifest parsing. Only the pieces needed to download the lowest bitrate
//! rendition are kept.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use reqwest::Url;

use crate::{
    error::{HdsError, HdsResult},
    util::http::HttpClient,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F4mMedia {
    /// `-1` when the manifest does not declare one.
    pub bitrate: i64,
    pub url: String,
    pub bootstrap_info_id: Option<String>,
    /// Base64 encoded `onMetaData` script data.
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F4mBootstrapInfo {
    pub id: Option<String>,
    /// Base64 encoded `abst` box.
    pub data: String,
}

/// A rendition resolved from a manifest, ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct F4mManifest {
    /// Fragment names are appended to this URL as is.
    pub base_url: String,
    pub bitrate: i64,
    pub bootstrap: Bytes,
    pub metadata: Bytes,
}

impl F4mManifest {
    /// Parses a manifest and selects its lowest bitrate rendition.
    pub fn parse(manifest_url: &Url, xml: &str) -> HdsResult<Self> {
        let (medias, bootstraps) = parse_elements(xml)?;

        let Some(media) = medias.iter().min_by_key(|m| m.bitrate) else {
            return Err(HdsError::ManifestError("no media found".to_string()));
        };
        tracing::info!(
            "Selected rendition {}; Bitrate: {}",
            media.url,
            media.bitrate
        );

        let bootstrap = media
            .bootstrap_info_id
            .as_ref()
            .and_then(|id| bootstraps.iter().find(|b| b.id.as_ref() == Some(id)))
            .or_else(|| bootstraps.first())
            .ok_or_else(|| HdsError::ManifestError("no inline bootstrapInfo found".to_string()))?;

        let metadata = match &media.metadata {
            Some(metadata) => decode_base64(metadata)?,
            None => {
                tracing::warn!("Media {} has no metadata, writing an empty one.", media.url);
                Bytes::new()
            }
        };

        Ok(Self {
            base_url: manifest_url.join(&media.url)?.to_string(),
            bitrate: media.bitrate,
            bootstrap: decode_base64(&bootstrap.data)?,
            metadata,
        })
    }
}

/// Fetches and parses the manifest at `url`.
pub async fn load_manifest(client: &HttpClient, url: Url) -> HdsResult<F4mManifest> {
    tracing::info!("Start fetching f4m manifest.");

    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(HdsError::HttpError(response.status()));
    }
    // redirects change the base of relative media urls
    let url = response.url().clone();
    let xml = response.text().await?;
    tracing::info!("f4m manifest fetched.");

    F4mManifest::parse(&url, &xml)
}

enum TextTarget {
    Metadata,
    Bootstrap,
}

fn parse_elements(xml: &str) -> HdsResult<(Vec<F4mMedia>, Vec<F4mBootstrapInfo>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut medias = Vec::new();
    let mut bootstraps = Vec::new();

    let mut media: Option<F4mMedia> = None;
    let mut bootstrap: Option<F4mBootstrapInfo> = None;
    let mut target = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"media" => media = Some(read_media(&e)?),
                b"metadata" if media.is_some() => target = Some(TextTarget::Metadata),
                b"bootstrapInfo" => {
                    bootstrap = Some(read_bootstrap(&e)?);
                    target = Some(TextTarget::Bootstrap);
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"media" => medias.push(read_media(&e)?),
                b"bootstrapInfo" => {
                    tracing::warn!("External bootstrapInfo is not supported, ignored.");
                }
                _ => {}
            },
            Event::Text(text) => {
                let text = text.unescape()?;
                match target {
                    Some(TextTarget::Metadata) => {
                        if let Some(media) = &mut media {
                            media.metadata.get_or_insert_with(String::new).push_str(&text);
                        }
                    }
                    Some(TextTarget::Bootstrap) => {
                        if let Some(bootstrap) = &mut bootstrap {
                            bootstrap.data.push_str(&text);
                        }
                    }
                    None => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"media" => medias.extend(media.take()),
                b"metadata" => target = None,
                b"bootstrapInfo" => {
                    target = None;
                    bootstraps.extend(bootstrap.take());
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((medias, bootstraps))
}

fn attribute(element: &BytesStart<'_>, name: &str) -> HdsResult<Option<String>> {
    let attribute = element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?;
    match attribute {
        Some(attribute) => Ok(Some(attribute.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn read_media(element: &BytesStart<'_>) -> HdsResult<F4mMedia> {
    let bitrate = match attribute(element, "bitrate")? {
        Some(bitrate) => bitrate
            .trim()
            .parse()
            .map_err(|_| HdsError::ManifestError(format!("invalid bitrate {bitrate:?}")))?,
        None => -1,
    };
    let url = attribute(element, "url")?
        .ok_or_else(|| HdsError::ManifestError("media without url".to_string()))?;

    Ok(F4mMedia {
        bitrate,
        url,
        bootstrap_info_id: attribute(element, "bootstrapInfoId")?,
        metadata: None,
    })
}

fn read_bootstrap(element: &BytesStart<'_>) -> HdsResult<F4mBootstrapInfo> {
    Ok(F4mBootstrapInfo {
        id: attribute(element, "id")?,
        data: String::new(),
    })
}

fn decode_base64(data: &str) -> HdsResult<Bytes> {
    let data: String = data.split_whitespace().collect();
    Ok(Bytes::from(STANDARD.decode(data)?))
}
