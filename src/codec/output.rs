use byteorder::{LittleEndian, WriteBytesExt};

use super::MAX_STRING_LENGTH;

/// Growable little-endian output sink.
///
/// Writes never fail; the sink is an in-memory buffer handed to the
/// transport or the resource file writer once complete.
#[derive(Debug, Default, Clone)]
pub struct BinaryOutputStream {
    data: Vec<u8>,
}

macro_rules! write_scalar {
    ($name:ident, $ty:ty, $write:ident) => {
        pub fn $name(&mut self, value: $ty) {
            // Vec<u8> writes are infallible
            self.data.$write::<LittleEndian>(value).unwrap();
        }
    };
}

impl BinaryOutputStream {
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    write_scalar!(write_u16, u16, write_u16);
    write_scalar!(write_u32, u32, write_u32);
    write_scalar!(write_u64, u64, write_u64);
    write_scalar!(write_i16, i16, write_i16);
    write_scalar!(write_i32, i32, write_i32);
    write_scalar!(write_i64, i64, write_i64);
    write_scalar!(write_f32, f32, write_f32);
    write_scalar!(write_f64, f64, write_f64);

    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Long-form string: `u32` byte length followed by the UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Short-form string: `u8` byte length followed by the UTF-8 bytes.
    ///
    /// Strings longer than [`MAX_STRING_LENGTH`] bytes are truncated at the
    /// nearest character boundary below the cap, matching the legacy wire
    /// behavior of the action log.
    pub fn write_short_string(&mut self, value: &str) {
        let bytes = if value.len() > MAX_STRING_LENGTH {
            log::warn!(
                "string of {} bytes truncated to {} on action stream",
                value.len(),
                MAX_STRING_LENGTH
            );
            let mut cut = MAX_STRING_LENGTH;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            &value.as_bytes()[..cut]
        } else {
            value.as_bytes()
        };
        self.data.push(bytes.len() as u8);
        self.data.extend_from_slice(bytes);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the stream and returns the written bytes.
    #[must_use]
    pub fn release(self) -> Vec<u8> {
        self.data
    }
}

impl From<BinaryOutputStream> for Vec<u8> {
    fn from(stream: BinaryOutputStream) -> Self {
        stream.data
    }
}
