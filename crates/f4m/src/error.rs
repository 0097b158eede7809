use thiserror::Error;

use crate::{boxes::BoxType, fragment::FragmentId};

#[derive(Error, Debug)]
pub enum HdsError {
    #[error("Truncated input at offset {offset}: {needed} byte(s) needed, {remaining} remaining")]
    TruncatedInput {
        offset: usize,
        needed: u64,
        remaining: usize,
    },

    #[error("Malformed box `{box_type}` at offset {offset}: {reason}")]
    MalformedBox {
        offset: usize,
        box_type: BoxType,
        reason: String,
    },

    #[error("Unsupported stream: {0}")]
    UnsupportedStream(String),

    #[error("No mdat box found after scanning {scanned} box(es)")]
    MissingMediaBox { scanned: usize },

    #[error("Failed to fetch {fragment} from {url}: {source}")]
    FetchFailure {
        fragment: FragmentId,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Failed to process {fragment}: {source}")]
    Fragment {
        fragment: FragmentId,
        #[source]
        source: Box<HdsError>,
    },

    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Invalid f4m manifest: {0}")]
    ManifestError(String),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    Base64Error(#[from] base64::DecodeError),

    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),

    #[error(transparent)]
    PersistError(#[from] tempfile::PersistError),
}

impl HdsError {
    /// Returns the innermost error, skipping fragment context wrappers.
    pub fn kind(&self) -> &HdsError {
        match self {
            Self::Fragment { source, .. } => source.kind(),
            _ => self,
        }
    }

    pub(crate) fn in_fragment(self, fragment: FragmentId) -> Self {
        match self {
            // already carries its fragment
            Self::FetchFailure { .. } | Self::Fragment { .. } => self,
            _ => Self::Fragment {
                fragment,
                source: Box::new(self),
            },
        }
    }
}

pub type HdsResult<T> = Result<T, HdsError>;
