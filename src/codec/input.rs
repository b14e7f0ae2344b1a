use byteorder::{ByteOrder, LittleEndian};

use crate::errors::{MirageError, Result};

/// Origin for [`BinaryInputStream::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    /// Absolute position from the start of the buffer.
    FromBeginning,
    /// Signed offset from the current cursor position.
    Relative,
}

/// Seekable little-endian cursor over a borrowed byte buffer.
///
/// All reads bounds-check and fail with
/// [`MirageError::TruncatedInput`] instead of panicking; a failed read
/// leaves the cursor untouched.
#[derive(Debug, Clone)]
pub struct BinaryInputStream<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! read_scalar {
    ($name:ident, $ty:ty, $read:ident, $size:expr) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let bytes = self.take($size)?;
            Ok(LittleEndian::$read(bytes))
        }
    };
}

impl<'a> BinaryInputStream<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.data.len() - self.pos;
        if len > available {
            return Err(MirageError::TruncatedInput {
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    read_scalar!(read_u16, u16, read_u16, 2);
    read_scalar!(read_u32, u32, read_u32, 4);
    read_scalar!(read_u64, u64, read_u64, 8);
    read_scalar!(read_i16, i16, read_i16, 2);
    read_scalar!(read_i32, i32, read_i32, 4);
    read_scalar!(read_i64, i64, read_i64, 8);
    read_scalar!(read_f32, f32, read_f32, 4);
    read_scalar!(read_f64, f64, read_f64, 8);

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MirageError::InvalidEncoding(format!(
                "bool byte must be 0 or 1, got {other}"
            ))),
        }
    }

    /// Copies `dest.len()` bytes out of the stream.
    pub fn read_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        let src = self.take(dest.len())?;
        dest.copy_from_slice(src);
        Ok(())
    }

    /// Returns a slice into the underlying storage without copying. The
    /// slice borrows from the buffer the cursor was created over.
    pub fn read_without_copy(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Long-form string: `u32` byte length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| MirageError::InvalidEncoding(format!("string is not UTF-8: {e}")))
    }

    /// Short-form string: `u8` byte length prefix.
    pub fn read_short_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| MirageError::InvalidEncoding(format!("string is not UTF-8: {e}")))
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Moves the cursor. Negative offsets are legal for
    /// [`SeekOrigin::Relative`]; seeking outside the buffer fails.
    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<()> {
        let base = match origin {
            SeekOrigin::FromBeginning => 0_i64,
            SeekOrigin::Relative => self.pos as i64,
        };
        let target = base + offset;
        if target < 0 || target > self.data.len() as i64 {
            return Err(MirageError::InvalidEncoding(format!(
                "seek to {target} outside buffer of {} bytes",
                self.data.len()
            )));
        }
        self.pos = target as usize;
        Ok(())
    }

    /// Total bytes consumed so far, inclusive of `skip` and `seek`.
    #[must_use]
    pub fn current_read_bytes(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn is_fully_read(&self) -> bool {
        self.pos == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_is_truncated_input() {
        let mut input = BinaryInputStream::new(&[1, 2]);
        assert!(matches!(
            input.read_u32(),
            Err(MirageError::TruncatedInput {
                needed: 4,
                available: 2
            })
        ));
        // cursor untouched by the failed read
        assert_eq!(input.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn seek_from_beginning_is_absolute() {
        let data = [10_u8, 11, 12, 13];
        let mut input = BinaryInputStream::new(&data);
        input.read_u16().unwrap();
        input.seek(SeekOrigin::FromBeginning, 1).unwrap();
        assert_eq!(input.read_u8().unwrap(), 11);
    }

    #[test]
    fn relative_seek_takes_negative_offsets() {
        let data = [10_u8, 11, 12, 13];
        let mut input = BinaryInputStream::new(&data);
        input.skip(3).unwrap();
        input.seek(SeekOrigin::Relative, -2).unwrap();
        assert_eq!(input.read_u8().unwrap(), 11);
        assert_eq!(input.current_read_bytes(), 2);
    }

    #[test]
    fn bad_bool_byte_is_invalid_encoding() {
        let mut input = BinaryInputStream::new(&[7]);
        assert!(matches!(
            input.read_bool(),
            Err(MirageError::InvalidEncoding(_))
        ));
    }
}
