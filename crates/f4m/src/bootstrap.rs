//! Bootstrap info (`abst`) and its segment/fragment run tables.

use bytes::Bytes;

use crate::{
    boxes::{BoxReader, BoxType, RawBox},
    error::{HdsError, HdsResult},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapInfo {
    pub version: u8,
    pub bootstrap_version: u32,
    pub profile: u8,
    pub live: bool,
    pub update: bool,
    pub time_scale: u32,
    pub current_media_time: u64,
    pub smpte_offset: u64,

    pub movie_identifier: String,
    pub servers: Vec<String>,
    pub qualities: Vec<String>,
    pub drm_data: Bytes,
    /// Metadata carried by the box itself. The muxer uses the manifest metadata instead.
    pub metadata: Bytes,

    pub segments: Vec<SegmentRunTable>,
    pub fragment_runs: Vec<FragmentRunTable>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRunTable {
    pub quality_modifiers: Vec<String>,
    pub segment_run: Vec<SegmentRunEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRunEntry {
    pub first_segment: u32,
    pub fragments_per_segment: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRunTable {
    pub time_scale: u32,
    pub quality_modifiers: Vec<String>,
    pub fragments: Vec<FragmentRunEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRunEntry {
    pub first_fragment: u32,
    pub first_timestamp: u64,
    pub duration: u32,
    /// Only present when `duration` is zero.
    pub discontinuity_indicator: Option<u8>,
}

/// Parses a complete `abst` box, header included.
pub fn parse_bootstrap(data: &[u8]) -> HdsResult<BootstrapInfo> {
    let raw = BoxReader::new(data).read_box()?;
    expect_box_type(&raw, BoxType::ABST)?;
    parse_root(raw.reader())
}

impl BootstrapInfo {
    pub fn parse(data: &[u8]) -> HdsResult<Self> {
        parse_bootstrap(data)
    }
}

/// Parses the payload of an `abst` box.
pub fn parse_root(mut reader: BoxReader<'_>) -> HdsResult<BootstrapInfo> {
    let version = reader.read_u8()?;
    reader.skip(3)?; // flags
    let bootstrap_version = reader.read_u32()?;
    // profile (2 bits), live (1), update (1), reserved (4)
    let bits = reader.read_u8()?;
    let time_scale = reader.read_u32()?;
    let current_media_time = reader.read_u64()?;
    let smpte_offset = reader.read_u64()?;
    let movie_identifier = reader.read_string()?;
    let servers = reader.read_string_list()?;
    let qualities = reader.read_string_list()?;
    let drm_data = Bytes::copy_from_slice(reader.read_cstring()?);
    let metadata = Bytes::copy_from_slice(reader.read_cstring()?);

    let segment_count = reader.read_u8()?;
    let mut segments = Vec::with_capacity(segment_count as usize);
    for _ in 0..segment_count {
        segments.push(read_child(&mut reader, BoxType::ASRT, parse_segment_run)?);
    }

    let fragment_run_count = reader.read_u8()?;
    let mut fragment_runs = Vec::with_capacity(fragment_run_count as usize);
    for _ in 0..fragment_run_count {
        fragment_runs.push(read_child(&mut reader, BoxType::AFRT, parse_fragment_run)?);
    }

    tracing::debug!(
        "Parsed bootstrap of {movie_identifier:?}: {} segment table(s), {} fragment table(s)",
        segments.len(),
        fragment_runs.len()
    );

    Ok(BootstrapInfo {
        version,
        bootstrap_version,
        profile: bits >> 6,
        live: bits & 0x20 != 0,
        update: bits & 0x10 != 0,
        time_scale,
        current_media_time,
        smpte_offset,
        movie_identifier,
        servers,
        qualities,
        drm_data,
        metadata,
        segments,
        fragment_runs,
    })
}

/// Reads one child box and decodes it with the handler registered for `expected`.
fn read_child<T>(
    reader: &mut BoxReader<'_>,
    expected: BoxType,
    decode: fn(BoxReader<'_>) -> HdsResult<T>,
) -> HdsResult<T> {
    let raw = reader.read_box()?;
    expect_box_type(&raw, expected)?;
    decode(raw.reader())
}

fn expect_box_type(raw: &RawBox<'_>, expected: BoxType) -> HdsResult<()> {
    if raw.box_type != expected {
        return Err(HdsError::MalformedBox {
            offset: raw.offset,
            box_type: raw.box_type,
            reason: format!("expected `{expected}`"),
        });
    }
    Ok(())
}

/// Parses the payload of an `asrt` box.
pub fn parse_segment_run(mut reader: BoxReader<'_>) -> HdsResult<SegmentRunTable> {
    reader.skip(4)?; // version + flags
    let quality_modifiers = reader.read_string_list()?;

    let count = reader.read_u32()?;
    let mut segment_run = Vec::new();
    for _ in 0..count {
        segment_run.push(SegmentRunEntry {
            first_segment: reader.read_u32()?,
            fragments_per_segment: reader.read_u32()?,
        });
    }

    Ok(SegmentRunTable {
        quality_modifiers,
        segment_run,
    })
}

/// Parses the payload of an `afrt` box.
pub fn parse_fragment_run(mut reader: BoxReader<'_>) -> HdsResult<FragmentRunTable> {
    reader.skip(4)?; // version + flags
    let time_scale = reader.read_u32()?;
    let quality_modifiers = reader.read_string_list()?;

    let count = reader.read_u32()?;
    let mut fragments = Vec::new();
    for _ in 0..count {
        let first_fragment = reader.read_u32()?;
        let first_timestamp = reader.read_u64()?;
        let duration = reader.read_u32()?;
        let discontinuity_indicator = if duration == 0 {
            Some(reader.read_u8()?)
        } else {
            None
        };
        fragments.push(FragmentRunEntry {
            first_fragment,
            first_timestamp,
            duration,
            discontinuity_indicator,
        });
    }

    Ok(FragmentRunTable {
        time_scale,
        quality_modifiers,
        fragments,
    })
}
