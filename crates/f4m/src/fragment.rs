use std::fmt;

use crate::{
    bootstrap::BootstrapInfo,
    error::{HdsError, HdsResult},
};

/// Address of a single fragment, formatted as `Seg{segment}-Frag{fragment}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentId {
    pub segment: u32,
    pub fragment: u32,
}

impl FragmentId {
    pub fn new(segment: u32, fragment: u32) -> Self {
        Self { segment, fragment }
    }

    /// Appends the fragment name to `base_url`. No separator is inserted.
    pub fn url(&self, base_url: &str) -> String {
        format!("{base_url}{self}")
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seg{}-Frag{}", self.segment, self.fragment)
    }
}

/// Lists the fragments of a single-segment stream in download order.
pub fn build_fragment_sequence(info: &BootstrapInfo) -> HdsResult<Vec<FragmentId>> {
    let segment = match info.segments.as_slice() {
        [segment] => segment,
        [] => return Err(unsupported("bootstrap has no segment run table")),
        tables => {
            return Err(unsupported(format!(
                "{} segment run tables found, only one is supported",
                tables.len()
            )))
        }
    };
    let fragment_run = match info.fragment_runs.as_slice() {
        [run] => run,
        [] => return Err(unsupported("bootstrap has no fragment run table")),
        tables => {
            return Err(unsupported(format!(
                "{} fragment run tables found, only one is supported",
                tables.len()
            )))
        }
    };

    let Some(run) = segment.segment_run.first() else {
        return Err(unsupported("segment run table is empty"));
    };
    let Some(first) = fragment_run.fragments.first() else {
        return Err(unsupported("fragment run table is empty"));
    };

    let count = run.fragments_per_segment;
    let first = first.first_fragment;
    if count > 0 && first.checked_add(count - 1).is_none() {
        return Err(unsupported(format!(
            "{count} fragments starting at {first} overflow the fragment number"
        )));
    }

    Ok((0..count).map(|i| FragmentId::new(1, first + i)).collect())
}

fn unsupported(reason: impl Into<String>) -> HdsError {
    HdsError::UnsupportedStream(reason.into())
}
