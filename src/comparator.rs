use std::{cmp::Ordering, fmt};

use crate::{error::Result, Error};

/// Number of bytes used for the length prefix of a [`Field::String`].
pub const STRING_PREFIX_SIZE: usize = 2;

/// A single fixed-width field of a composite key and the ordering used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Signed 8 bit integer.
    I8,
    /// Signed 16 bit integer, little endian.
    I16,
    /// Signed 32 bit integer, little endian.
    I32,
    /// Signed 64 bit integer, little endian.
    I64,
    /// Raw bytes of the given width compared with `memcmp`.
    Bytes(usize),
    /// A string with a 2 byte little endian length prefix, padded to the given width.
    String(usize),
}

impl Field {
    pub fn width(&self) -> usize {
        match self {
            Field::I8 => 1,
            Field::I16 => 2,
            Field::I32 => 4,
            Field::I64 => 8,
            Field::Bytes(width) | Field::String(width) => *width,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Field::Bytes(0) => Err(Error::InvalidField(
                "byte fields need a width of at least 1".to_string(),
            )),
            Field::String(width) if *width <= STRING_PREFIX_SIZE => Err(Error::InvalidField(
                format!("string fields need more than {STRING_PREFIX_SIZE} bytes, got {width}"),
            )),
            Field::String(width) if *width - STRING_PREFIX_SIZE > u16::MAX as usize => {
                Err(Error::InvalidField(format!(
                    "string field of width {width} can not be addressed by its length prefix"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Compare two encoded values of this field. Both slices must have the field width.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            Field::I8 => read_int::<1>(a).cmp(&read_int::<1>(b)),
            Field::I16 => read_int::<2>(a).cmp(&read_int::<2>(b)),
            Field::I32 => read_int::<4>(a).cmp(&read_int::<4>(b)),
            Field::I64 => read_int::<8>(a).cmp(&read_int::<8>(b)),
            Field::Bytes(_) => a.cmp(b),
            // Slice ordering compares the content first and the length second
            Field::String(_) => string_content(a).cmp(string_content(b)),
        }
    }

    fn decode(&self, data: &[u8]) -> FieldValue {
        match self {
            Field::I8 => FieldValue::Int(read_int::<1>(data)),
            Field::I16 => FieldValue::Int(read_int::<2>(data)),
            Field::I32 => FieldValue::Int(read_int::<4>(data)),
            Field::I64 => FieldValue::Int(read_int::<8>(data)),
            Field::Bytes(_) => FieldValue::Bytes(data.to_vec()),
            Field::String(_) => {
                FieldValue::String(String::from_utf8_lossy(string_content(data)).into_owned())
            }
        }
    }
}

/// Sign-extend a little endian integer of `N` bytes.
fn read_int<const N: usize>(data: &[u8]) -> i64 {
    let mut buffer = [0u8; 8];
    let n = N.min(data.len());
    buffer[..n].copy_from_slice(&data[..n]);
    let shift = 64 - 8 * N as u32;
    (i64::from_le_bytes(buffer) << shift) >> shift
}

fn string_content(data: &[u8]) -> &[u8] {
    if data.len() < STRING_PREFIX_SIZE {
        return &[];
    }
    let len = u16::from_le_bytes([data[0], data[1]]) as usize;
    let payload = &data[STRING_PREFIX_SIZE..];
    &payload[..len.min(payload.len())]
}

/// Decoded value of a single key field, used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Bytes(Vec<u8>),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::String(v) => write!(f, "{v:?}"),
            FieldValue::Bytes(v) => {
                write!(f, "0x")?;
                for b in v {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A probe into the tree: a full or partial key and optionally the value for duplicate trees.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Probe<'a> {
    pub key: &'a [u8],
    pub value: Option<&'a [u8]>,
    fields: usize,
}

/// The composite key ordering of a tree.
///
/// Keys are the concatenation of the fixed width encoding of each field.
/// Comparison goes field by field and stops at the first difference.
/// When duplicate keys are allowed, the value is the final tie-break so that all entries
/// of the tree stay totally ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    fields: Vec<Field>,
    /// End offset of each field in an encoded key
    ends: Vec<usize>,
    allow_duplicates: bool,
}

impl KeyLayout {
    pub fn new(fields: Vec<Field>, allow_duplicates: bool) -> Result<KeyLayout> {
        if fields.is_empty() {
            return Err(Error::NoFields);
        }
        let mut ends = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for f in &fields {
            f.validate()?;
            offset += f.width();
            ends.push(offset);
        }
        Ok(KeyLayout {
            fields,
            ends,
            allow_duplicates,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn allow_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    /// Size of a key that contains all fields.
    pub fn key_size(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Number of fields covered by a key of the given length, if the length ends on a field boundary.
    pub fn fields_in(&self, key_len: usize) -> Option<usize> {
        self.ends.iter().position(|end| *end == key_len).map(|i| i + 1)
    }

    /// Check that `key` contains exactly all configured fields.
    pub fn validate_full_key(&self, key: &[u8]) -> Result<()> {
        if key.len() == self.key_size() {
            Ok(())
        } else {
            Err(Error::InvalidKeyLength {
                actual: key.len(),
                expected: format!("exactly {} bytes", self.key_size()),
            })
        }
    }

    pub(crate) fn probe<'a>(&self, key: &'a [u8], value: Option<&'a [u8]>) -> Result<Probe<'a>> {
        let fields = self
            .fields_in(key.len())
            .ok_or_else(|| Error::InvalidKeyLength {
                actual: key.len(),
                expected: format!("one of the field boundaries {:?}", self.ends),
            })?;
        Ok(Probe { key, value, fields })
    }

    /// A complete probe identifies at most one entry of the tree.
    pub(crate) fn is_complete(&self, probe: &Probe) -> bool {
        probe.fields == self.fields.len() && (!self.allow_duplicates || probe.value.is_some())
    }

    /// Compare a probe with a stored entry.
    ///
    /// Only the fields present in the probe are compared, so a partial probe is equal to
    /// every entry that starts with the same fields.
    pub(crate) fn compare_probe(&self, probe: &Probe, key: &[u8], value: &[u8]) -> Ordering {
        let mut start = 0;
        for (field, end) in self.fields.iter().zip(&self.ends).take(probe.fields) {
            let a = &probe.key[start..*end];
            let b = key.get(start..*end).unwrap_or(&[]);
            let ord = field.compare(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
            start = *end;
        }
        match probe.value {
            Some(probe_value) if self.allow_duplicates && probe.fields == self.fields.len() => {
                probe_value.cmp(value)
            }
            _ => Ordering::Equal,
        }
    }

    /// Compare two stored entries.
    pub fn compare(&self, a_key: &[u8], a_value: &[u8], b_key: &[u8], b_value: &[u8]) -> Ordering {
        let mut start = 0;
        for (field, end) in self.fields.iter().zip(&self.ends) {
            let a = a_key.get(start..*end).unwrap_or(&[]);
            let b = b_key.get(start..*end).unwrap_or(&[]);
            let ord = field.compare(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
            start = *end;
        }
        if self.allow_duplicates {
            a_value.cmp(b_value)
        } else {
            Ordering::Equal
        }
    }

    /// Decode the field with the given index, if the key is long enough to contain it.
    pub fn decode_field(&self, key: &[u8], idx: usize) -> Option<FieldValue> {
        let end = *self.ends.get(idx)?;
        let start = end - self.fields[idx].width();
        key.get(start..end).map(|data| self.fields[idx].decode(data))
    }

    /// Human readable representation of a (possibly partial) key.
    pub fn describe(&self, key: &[u8]) -> String {
        let values: Vec<String> = (0..self.fields.len())
            .filter_map(|i| self.decode_field(key, i))
            .map(|v| v.to_string())
            .collect();
        format!("({})", values.join(", "))
    }
}

/// Helper to encode composite keys field by field.
///
/// ```rust
/// use kv_btree_index::{Field, KeyBuilder, KeyLayout};
///
/// let layout = KeyLayout::new(vec![Field::I32, Field::String(10)], false).unwrap();
/// let key = KeyBuilder::new().i32(42).string(10, "abc").build();
/// assert_eq!(layout.key_size(), key.len());
/// assert_eq!("(42, \"abc\")", layout.describe(&key));
/// ```
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder {
    buffer: Vec<u8>,
}

impl KeyBuilder {
    pub fn new() -> KeyBuilder {
        KeyBuilder::default()
    }

    pub fn i8(mut self, v: i8) -> KeyBuilder {
        self.buffer.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(mut self, v: i16) -> KeyBuilder {
        self.buffer.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(mut self, v: i32) -> KeyBuilder {
        self.buffer.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(mut self, v: i64) -> KeyBuilder {
        self.buffer.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Append raw bytes, truncated or zero padded to `width`.
    pub fn bytes(mut self, width: usize, v: &[u8]) -> KeyBuilder {
        let n = v.len().min(width);
        self.buffer.extend_from_slice(&v[..n]);
        self.buffer.resize(self.buffer.len() + (width - n), 0);
        self
    }

    /// Append a length prefixed string, truncated to fit into `width` bytes.
    pub fn string(mut self, width: usize, v: &str) -> KeyBuilder {
        let capacity = width.saturating_sub(STRING_PREFIX_SIZE).min(u16::MAX as usize);
        let content = &v.as_bytes()[..v.len().min(capacity)];
        self.buffer
            .extend_from_slice(&(content.len() as u16).to_le_bytes()[..STRING_PREFIX_SIZE.min(width)]);
        self.buffer.extend_from_slice(content);
        let padding = width.saturating_sub(STRING_PREFIX_SIZE + content.len());
        self.buffer.resize(self.buffer.len() + padding, 0);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests;
