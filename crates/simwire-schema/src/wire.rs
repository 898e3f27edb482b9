//! Low-level Protobuf wire-format reader.
//!
//! A cursor over a byte slice with primitive readers for the four wire types.
//! Bounds are checked on every read; the reader never panics on malformed
//! input.

use crate::error::DecodeError;

/// Wire type carried in the low three bits of a field tag.
pub const WIRE_VARINT: u8 = 0;
/// 64-bit fixed-width value.
pub const WIRE_FIXED64: u8 = 1;
/// Length-delimited value (strings, bytes, messages, packed scalars).
pub const WIRE_LEN: u8 = 2;
/// 32-bit fixed-width value.
pub const WIRE_FIXED32: u8 = 5;

/// Cursor over an encoded message body.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader over the full slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Whether any bytes remain.
    pub fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    /// Read a base-128 varint, up to 10 bytes.
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(DecodeError::Truncated { context: "varint" })?;
            self.pos += 1;
            if shift >= 64 {
                return Err(DecodeError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a little-endian fixed 32-bit value.
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4, "fixed32")?;
        // take() guarantees the length.
        let arr: [u8; 4] = bytes.try_into().map_err(|_| DecodeError::Truncated {
            context: "fixed32",
        })?;
        Ok(u32::from_le_bytes(arr))
    }

    /// Read a little-endian fixed 64-bit value.
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8, "fixed64")?;
        let arr: [u8; 8] = bytes.try_into().map_err(|_| DecodeError::Truncated {
            context: "fixed64",
        })?;
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a length-delimited byte range.
    pub fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::Truncated {
            context: "length prefix",
        })?;
        self.take(len, "length-delimited value")
    }

    /// Skip one value of the given wire type.
    pub fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => {
                let _ = self.read_varint()?;
            }
            WIRE_FIXED64 => {
                let _ = self.take(8, "skipped fixed64")?;
            }
            WIRE_LEN => {
                let _ = self.read_len_delimited()?;
            }
            WIRE_FIXED32 => {
                let _ = self.take(4, "skipped fixed32")?;
            }
            other => return Err(DecodeError::UnsupportedGroup { wire_type: other }),
        }
        Ok(())
    }

    fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated { context })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Zigzag-decode a signed value (sint32/sint64 encoding).
pub fn zigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn varint_single_byte() {
        let mut r = WireReader::new(&[0x08]);
        assert_eq!(r.read_varint().unwrap(), 8);
        assert!(!r.has_remaining());
    }

    #[test]
    fn varint_multi_byte() {
        // 300 = 0b1_0010_1100 -> [0xAC, 0x02]
        let mut r = WireReader::new(&[0xac, 0x02]);
        assert_eq!(r.read_varint().unwrap(), 300);
    }

    #[test]
    fn varint_max_u64() {
        let mut r = WireReader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);
        assert_eq!(r.read_varint().unwrap(), u64::MAX);
    }

    #[test]
    fn varint_truncated() {
        let mut r = WireReader::new(&[0x80]);
        assert_matches!(r.read_varint(), Err(DecodeError::Truncated { .. }));
    }

    #[test]
    fn varint_overflow() {
        let bytes = [0x80u8; 11];
        let mut r = WireReader::new(&bytes);
        assert_matches!(r.read_varint(), Err(DecodeError::VarintOverflow));
    }

    #[test]
    fn fixed32_le() {
        let bytes = 1u32.to_le_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_fixed32().unwrap(), 1);
    }

    #[test]
    fn fixed64_le() {
        let bytes = 0xdead_beefu64.to_le_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_fixed64().unwrap(), 0xdead_beef);
    }

    #[test]
    fn len_delimited() {
        let mut r = WireReader::new(&[0x03, b'a', b'b', b'c', 0xff]);
        assert_eq!(r.read_len_delimited().unwrap(), b"abc");
        assert!(r.has_remaining());
    }

    #[test]
    fn len_delimited_overruns() {
        let mut r = WireReader::new(&[0x05, b'a']);
        assert_matches!(r.read_len_delimited(), Err(DecodeError::Truncated { .. }));
    }

    #[test]
    fn skip_each_wire_type() {
        let mut r = WireReader::new(&[0x08]);
        r.skip(WIRE_VARINT).unwrap();
        let mut r = WireReader::new(&[0u8; 8]);
        r.skip(WIRE_FIXED64).unwrap();
        let mut r = WireReader::new(&[0x01, 0xaa]);
        r.skip(WIRE_LEN).unwrap();
        let mut r = WireReader::new(&[0u8; 4]);
        r.skip(WIRE_FIXED32).unwrap();
    }

    #[test]
    fn skip_group_is_unsupported() {
        let mut r = WireReader::new(&[]);
        assert_matches!(r.skip(3), Err(DecodeError::UnsupportedGroup { wire_type: 3 }));
    }

    #[test]
    fn zigzag_decode() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(1), -1);
        assert_eq!(zigzag(2), 1);
        assert_eq!(zigzag(3), -2);
        assert_eq!(zigzag(4294967294), 2147483647);
        assert_eq!(zigzag(4294967295), -2147483648);
    }
}
