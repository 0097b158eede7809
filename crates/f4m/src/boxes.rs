//! Reader for the size-prefixed box format used by HDS bootstraps and fragments.
//!
//! Every box starts with a 32-bit big-endian size and a 4-byte type tag. A size
//! of `1` means the real size follows as a 64-bit integer.

use std::{fmt, io::Write};

use crate::error::{HdsError, HdsResult};

/// Length of a box header with a 32-bit size.
pub const HEADER_LEN: u64 = 8;
/// Length of a box header with the 64-bit extended size.
pub const EXTENDED_HEADER_LEN: u64 = 16;

const EXTENDED_SIZE_SENTINEL: u32 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    /// Bootstrap info
    pub const ABST: Self = Self(*b"abst");
    /// Segment run table
    pub const ASRT: Self = Self(*b"asrt");
    /// Fragment run table
    pub const AFRT: Self = Self(*b"afrt");
    /// Media data
    pub const MDAT: Self = Self(*b"mdat");
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxType({self})")
    }
}

/// A box borrowed from the buffer it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBox<'a> {
    /// Offset of the box header, relative to the outermost buffer.
    pub offset: usize,
    /// Resolved size of the whole box, header included.
    pub size: u64,
    pub box_type: BoxType,
    /// 8, or 16 when the extended size was used.
    pub header_len: u64,
    pub payload: &'a [u8],
}

impl<'a> RawBox<'a> {
    /// A reader over the payload, keeping absolute offsets for error reports.
    pub fn reader(&self) -> BoxReader<'a> {
        BoxReader::with_base(self.payload, self.offset + self.header_len as usize)
    }
}

/// Stateless big-endian cursor over a byte slice.
pub struct BoxReader<'a> {
    data: &'a [u8],
    position: usize,
    base: usize,
}

impl<'a> BoxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Creates a reader whose reported offsets start at `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            position: 0,
            base,
        }
    }

    /// Absolute offset of the next byte to be read.
    pub fn offset(&self) -> usize {
        self.base + self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: u64) -> HdsResult<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining as u64 {
            return Err(HdsError::TruncatedInput {
                offset: self.offset(),
                needed: len,
                remaining,
            });
        }

        let start = self.position;
        self.position += len as usize;
        Ok(&self.data[start..self.position])
    }

    pub fn skip(&mut self, len: u64) -> HdsResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_array<const N: usize>(&mut self) -> HdsResult<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_bytes(N as u64)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> HdsResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u32(&mut self) -> HdsResult<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> HdsResult<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Reads a NUL-terminated string. The terminator is consumed but not returned.
    pub fn read_cstring(&mut self) -> HdsResult<&'a [u8]> {
        let rest = &self.data[self.position..];
        let Some(len) = rest.iter().position(|&b| b == 0) else {
            return Err(HdsError::TruncatedInput {
                offset: self.offset(),
                needed: rest.len() as u64 + 1,
                remaining: rest.len(),
            });
        };

        let string = self.read_bytes(len as u64)?;
        self.position += 1;
        Ok(string)
    }

    /// Reads a NUL-terminated string, replacing invalid UTF-8.
    pub fn read_string(&mut self) -> HdsResult<String> {
        Ok(String::from_utf8_lossy(self.read_cstring()?).into_owned())
    }

    /// Reads a `u8` count followed by that many strings.
    pub fn read_string_list(&mut self) -> HdsResult<Vec<String>> {
        let count = self.read_u8()?;
        (0..count).map(|_| self.read_string()).collect()
    }

    pub fn read_box(&mut self) -> HdsResult<RawBox<'a>> {
        let offset = self.offset();
        let size = self.read_u32()?;
        let box_type = BoxType(self.read_array()?);

        let (size, header_len) = match size {
            0 => {
                return Err(HdsError::MalformedBox {
                    offset,
                    box_type,
                    reason: "boxes extending to the end of input are not supported".to_string(),
                })
            }
            EXTENDED_SIZE_SENTINEL => (self.read_u64()?, EXTENDED_HEADER_LEN),
            size => (size as u64, HEADER_LEN),
        };
        if size < header_len {
            return Err(HdsError::MalformedBox {
                offset,
                box_type,
                reason: format!("declared size {size} is smaller than its {header_len}-byte header"),
            });
        }

        let payload = self.read_bytes(size - header_len)?;
        Ok(RawBox {
            offset,
            size,
            box_type,
            header_len,
            payload,
        })
    }
}

/// Writes a box header for a payload of `payload_len` bytes, using the extended
/// form only when the size does not fit in 32 bits. Returns the header length.
pub fn write_box_header<W: Write>(
    writer: &mut W,
    box_type: BoxType,
    payload_len: u64,
) -> std::io::Result<u64> {
    let size = payload_len + HEADER_LEN;
    if size > u32::MAX as u64 {
        writer.write_all(&EXTENDED_SIZE_SENTINEL.to_be_bytes())?;
        writer.write_all(&box_type.0)?;
        writer.write_all(&(payload_len + EXTENDED_HEADER_LEN).to_be_bytes())?;
        Ok(EXTENDED_HEADER_LEN)
    } else {
        writer.write_all(&(size as u32).to_be_bytes())?;
        writer.write_all(&box_type.0)?;
        Ok(HEADER_LEN)
    }
}

pub fn write_box<W: Write>(writer: &mut W, box_type: BoxType, payload: &[u8]) -> std::io::Result<()> {
    write_box_header(writer, box_type, payload.len() as u64)?;
    writer.write_all(payload)
}

/// Writes a box that always uses the 64-bit extended size.
pub fn write_extended_box<W: Write>(
    writer: &mut W,
    box_type: BoxType,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&EXTENDED_SIZE_SENTINEL.to_be_bytes())?;
    writer.write_all(&box_type.0)?;
    writer.write_all(&(payload.len() as u64 + EXTENDED_HEADER_LEN).to_be_bytes())?;
    writer.write_all(payload)
}
