//! Minimal protobuf wire-format reader for collection config blobs.
//!
//! Newer collections store note-type, template and deck settings as
//! serialized protobuf messages. Only a handful of top-level scalar and
//! string fields are needed, so this walks the wire format directly
//! instead of carrying generated message types.

/// One decoded field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

/// Iterator over the top-level `(field number, value)` pairs of a message.
///
/// Stops at the first malformed or unsupported (group) field.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_varint(&mut self) -> Option<u64> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }
}

impl<'a> Iterator for WireReader<'a> {
    type Item = (u32, WireValue<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let key = self.read_varint()?;
        let field = u32::try_from(key >> 3).ok()?;
        let value = match key & 0x7 {
            0 => WireValue::Varint(self.read_varint()?),
            1 => {
                let bytes = self.read_slice(8)?;
                WireValue::Fixed64(u64::from_le_bytes(bytes.try_into().ok()?))
            }
            2 => {
                let len = usize::try_from(self.read_varint()?).ok()?;
                WireValue::Bytes(self.read_slice(len)?)
            }
            5 => {
                let bytes = self.read_slice(4)?;
                WireValue::Fixed32(u32::from_le_bytes(bytes.try_into().ok()?))
            }
            _ => {
                self.pos = self.buf.len();
                return None;
            }
        };
        Some((field, value))
    }
}

/// First varint stored under `field`
pub fn varint_field(buf: &[u8], field: u32) -> Option<u64> {
    WireReader::new(buf).find_map(|(number, value)| match value {
        WireValue::Varint(v) if number == field => Some(v),
        _ => None,
    })
}

/// First length-delimited value stored under `field`
pub fn bytes_field(buf: &[u8], field: u32) -> Option<&[u8]> {
    WireReader::new(buf).find_map(|(number, value)| match value {
        WireValue::Bytes(bytes) if number == field => Some(bytes),
        _ => None,
    })
}

/// First string stored under `field`, lossily decoded
pub fn string_field(buf: &[u8], field: u32) -> Option<String> {
    bytes_field(buf, field).map(|bytes| String::from_utf8_lossy(bytes).into_owned())
}
