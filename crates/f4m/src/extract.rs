use crate::{
    boxes::{BoxReader, BoxType},
    error::{HdsError, HdsResult},
};

/// Maximum number of boxes read from a fragment while looking for `mdat`.
pub const MAX_SCANNED_BOXES: usize = 32;

/// Returns the payload of the first `mdat` box of a downloaded fragment.
///
/// The payload is a sequence of complete FLV tags and is appended to the output as is.
pub fn extract_media_payload(fragment: &[u8]) -> HdsResult<&[u8]> {
    let mut reader = BoxReader::new(fragment);

    let mut scanned = 0;
    while scanned < MAX_SCANNED_BOXES && !reader.is_empty() {
        let raw = reader.read_box()?;
        scanned += 1;

        if raw.box_type == BoxType::MDAT {
            return Ok(raw.payload);
        }
        tracing::trace!("Skipping `{}` box at offset {}", raw.box_type, raw.offset);
    }

    Err(HdsError::MissingMediaBox { scanned })
}
