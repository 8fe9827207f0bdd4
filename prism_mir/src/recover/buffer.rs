//! Compact byte buffers: LEB128-style unsigned varints, zigzag signed
//! varints and raw bytes.

use super::RecoverError;

/// Most bytes a `u64` varint can take.
const MAX_VARINT_BYTES: usize = 10;

// =============================================================================
// Writer
// =============================================================================

/// Append-only encoder.
#[derive(Debug, Default, Clone)]
pub struct CompactBufferWriter {
    bytes: Vec<u8>,
}

impl CompactBufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        self.bytes.push(b);
    }

    /// Seven bits per byte, low group first; the high bit marks a
    /// continuation.
    pub fn write_unsigned(&mut self, mut v: u64) {
        loop {
            let low = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.bytes.push(low);
                return;
            }
            self.bytes.push(low | 0x80);
        }
    }

    /// Zigzag maps small magnitudes of either sign to small codes.
    pub fn write_signed(&mut self, v: i64) {
        self.write_unsigned(((v << 1) ^ (v >> 63)) as u64);
    }

    pub fn write_bool(&mut self, b: bool) {
        self.write_byte(b as u8);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct CompactBufferReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> CompactBufferReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn more(&self) -> bool {
        self.pos < self.bytes.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8, RecoverError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(RecoverError::UnexpectedEnd { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_unsigned(&mut self) -> Result<u64, RecoverError> {
        let start = self.pos;
        let mut result = 0u64;
        for i in 0..MAX_VARINT_BYTES {
            let b = self.read_byte()?;
            let group = (b & 0x7f) as u64;
            // The tenth byte may only carry the top bit of a u64.
            if i == MAX_VARINT_BYTES - 1 && group > 1 {
                return Err(RecoverError::VarintOverflow { offset: start });
            }
            result |= group << (7 * i);
            if b & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(RecoverError::VarintOverflow { offset: start })
    }

    pub fn read_signed(&mut self) -> Result<i64, RecoverError> {
        let u = self.read_unsigned()?;
        Ok(((u >> 1) as i64) ^ -((u & 1) as i64))
    }

    pub fn read_bool(&mut self) -> Result<bool, RecoverError> {
        let offset = self.pos;
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(RecoverError::BadTag {
                what: "bool",
                value: value as u64,
                offset,
            }),
        }
    }

    /// Read an unsigned varint that must fit in `u32`.
    pub fn read_u32(&mut self) -> Result<u32, RecoverError> {
        let offset = self.pos;
        let v = self.read_unsigned()?;
        u32::try_from(v).map_err(|_| RecoverError::BadTag {
            what: "u32",
            value: v,
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_sizes() {
        let mut w = CompactBufferWriter::new();
        w.write_unsigned(0);
        w.write_unsigned(127);
        assert_eq!(w.len(), 2);
        w.write_unsigned(128);
        assert_eq!(w.len(), 4);
        w.write_unsigned(u64::MAX);
        assert_eq!(w.len(), 14);

        let bytes = w.into_bytes();
        let mut r = CompactBufferReader::new(&bytes);
        assert_eq!(r.read_unsigned().unwrap(), 0);
        assert_eq!(r.read_unsigned().unwrap(), 127);
        assert_eq!(r.read_unsigned().unwrap(), 128);
        assert_eq!(r.read_unsigned().unwrap(), u64::MAX);
        assert!(!r.more());
    }

    #[test]
    fn test_zigzag_small_magnitudes() {
        let mut w = CompactBufferWriter::new();
        w.write_signed(-1);
        w.write_signed(1);
        w.write_signed(i64::MIN);
        assert_eq!(&w.clone().into_bytes()[..2], &[1, 2]);

        let bytes = w.into_bytes();
        let mut r = CompactBufferReader::new(&bytes);
        assert_eq!(r.read_signed().unwrap(), -1);
        assert_eq!(r.read_signed().unwrap(), 1);
        assert_eq!(r.read_signed().unwrap(), i64::MIN);
    }

    #[test]
    fn test_truncated_and_overlong_input() {
        let mut r = CompactBufferReader::new(&[0x80]);
        assert_eq!(
            r.read_unsigned(),
            Err(RecoverError::UnexpectedEnd { offset: 1 })
        );

        let overlong = [0xff; 11];
        let mut r = CompactBufferReader::new(&overlong);
        assert_eq!(
            r.read_unsigned(),
            Err(RecoverError::VarintOverflow { offset: 0 })
        );

        let mut r = CompactBufferReader::new(&[2]);
        assert!(matches!(r.read_bool(), Err(RecoverError::BadTag { what: "bool", .. })));
    }
}
