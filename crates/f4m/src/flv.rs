//! FLV output: a fixed file header and an `onMetaData` script tag, followed by
//! the raw tags extracted from each fragment.

use std::io::{self, Write};

/// `FLV` signature and version 1.
const SIGNATURE: &[u8; 4] = b"FLV\x01";
/// Audio and video tags present.
const FLAGS: u8 = 0x05;
const HEADER_SIZE: u32 = 9;
const SCRIPT_DATA_TAG: u8 = 0x12;
/// Written after the metadata tag in place of its real previous-tag-size.
/// Players expect this exact value.
const METADATA_TRAILER: [u8; 4] = [0x00, 0x00, 0x01, 0x73];

const MAX_TAG_SIZE: usize = 0xFF_FFFF;

/// Writes the FLV header and one script data tag holding `metadata`.
pub fn write_header<W: Write>(writer: &mut W, metadata: &[u8]) -> io::Result<()> {
    if metadata.len() > MAX_TAG_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("metadata of {} bytes does not fit in a tag", metadata.len()),
        ));
    }

    writer.write_all(SIGNATURE)?;
    writer.write_all(&[FLAGS])?;
    writer.write_all(&HEADER_SIZE.to_be_bytes())?;
    // previous tag size
    writer.write_all(&0u32.to_be_bytes())?;

    writer.write_all(&[SCRIPT_DATA_TAG])?;
    writer.write_all(&(metadata.len() as u32).to_be_bytes()[1..])?;
    // timestamp (3), timestamp extended (1), stream id (3)
    writer.write_all(&[0; 7])?;
    writer.write_all(metadata)?;
    writer.write_all(&METADATA_TRAILER)?;

    Ok(())
}

/// Appends already framed FLV tags.
pub fn append_payload<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload)
}

pub struct FlvMuxer<W: Write> {
    writer: W,
    bytes_written: u64,
}

impl<W: Write> FlvMuxer<W> {
    /// Wraps `writer` and writes the header immediately.
    pub fn new(mut writer: W, metadata: &[u8]) -> io::Result<Self> {
        write_header(&mut writer, metadata)?;
        Ok(Self {
            writer,
            bytes_written: header_len(metadata),
        })
    }

    pub fn append(&mut self, payload: &[u8]) -> io::Result<()> {
        append_payload(&mut self.writer, payload)?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Length of the header written by [write_header].
pub fn header_len(metadata: &[u8]) -> u64 {
    24 + metadata.len() as u64 + METADATA_TRAILER.len() as u64
}
