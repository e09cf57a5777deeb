//! Auxiliary-tag store.
//!
//! Tags live in the record's raw `tag_data` buffer as a packed
//! concatenation of entries: two ASCII tag bytes, one type-code byte,
//! then the value. Walking is done with a bounds-checked slice cursor;
//! no raw pointer ever crosses the module boundary, and every value is
//! returned by copy — tag mutation may reallocate the buffer at any
//! time.
//!
//! Type codes: `A` char, `c`/`C` i8/u8, `s`/`S` i16/u16, `i`/`I`
//! i32/u32, `f` IEEE-754 float, `Z` NUL-terminated string, `H`
//! NUL-terminated hex string, `B` array (subtype byte, LE32 count,
//! packed elements).

use crate::bytes;
use crate::error::{BamError, BamFormatErrorKind, Result};
use crate::record::alignment::BamAlignment;

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Char(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    String(String),
    Hex(String),
    ArrayInt8(Vec<i8>),
    ArrayUInt8(Vec<u8>),
    ArrayInt16(Vec<i16>),
    ArrayUInt16(Vec<u16>),
    ArrayInt32(Vec<i32>),
    ArrayUInt32(Vec<u32>),
    ArrayFloat(Vec<f32>),
}

impl TagValue {
    /// The on-disk type code for this value.
    pub fn type_code(&self) -> char {
        match self {
            TagValue::Char(_) => 'A',
            TagValue::Int8(_) => 'c',
            TagValue::UInt8(_) => 'C',
            TagValue::Int16(_) => 's',
            TagValue::UInt16(_) => 'S',
            TagValue::Int32(_) => 'i',
            TagValue::UInt32(_) => 'I',
            TagValue::Float(_) => 'f',
            TagValue::String(_) => 'Z',
            TagValue::Hex(_) => 'H',
            TagValue::ArrayInt8(_)
            | TagValue::ArrayUInt8(_)
            | TagValue::ArrayInt16(_)
            | TagValue::ArrayUInt16(_)
            | TagValue::ArrayInt32(_)
            | TagValue::ArrayUInt32(_)
            | TagValue::ArrayFloat(_) => 'B',
        }
    }
}

/// Fixed byte width of a numeric type code; None for Z/H/B/unknown.
fn fixed_width(code: u8) -> Option<usize> {
    match code {
        b'A' | b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

/// Span of one tag entry within the buffer.
struct TagSpan {
    /// Offset of the two tag-name bytes.
    start: usize,
    /// Offset of the type-code byte.
    type_at: usize,
    /// Offset of the value bytes.
    value_at: usize,
    /// One past the entry's last byte.
    end: usize,
}

/// Walks `data` and returns the span of `tag`, or None when absent.
/// Malformed entries surface format errors.
fn find_tag(data: &[u8], tag: [u8; 2]) -> Result<Option<TagSpan>> {
    let mut pos = 0;
    while pos + 3 <= data.len() {
        let start = pos;
        let name = [data[pos], data[pos + 1]];
        let code = data[pos + 2];
        let value_at = pos + 3;

        let end = match fixed_width(code) {
            Some(w) => {
                if value_at + w > data.len() {
                    return Err(BamError::format(BamFormatErrorKind::BadTagSize));
                }
                value_at + w
            }
            None => match code {
                b'Z' | b'H' => {
                    let nul = data[value_at..]
                        .iter()
                        .position(|&b| b == 0)
                        .ok_or_else(|| BamError::format(BamFormatErrorKind::BadTagSize))?;
                    value_at + nul + 1
                }
                b'B' => {
                    if value_at + 5 > data.len() {
                        return Err(BamError::format(BamFormatErrorKind::BadTagSize));
                    }
                    let sub = data[value_at];
                    let width = fixed_width(sub)
                        .filter(|_| sub != b'A')
                        .ok_or_else(|| BamError::format(BamFormatErrorKind::BadTagType))?;
                    let count = bytes::unpack_u32(&data[value_at + 1..]) as usize;
                    let end = value_at + 5 + count
                        .checked_mul(width)
                        .ok_or_else(|| BamError::format(BamFormatErrorKind::BadTagSize))?;
                    if end > data.len() {
                        return Err(BamError::format(BamFormatErrorKind::BadTagSize));
                    }
                    end
                }
                _ => return Err(BamError::format(BamFormatErrorKind::BadTagType)),
            },
        };

        if name == tag {
            return Ok(Some(TagSpan {
                start,
                type_at: start + 2,
                value_at,
                end,
            }));
        }
        pos = end;
    }
    if pos != data.len() {
        // Trailing fragment too short to be an entry.
        return Err(BamError::format(BamFormatErrorKind::BadTagSize));
    }
    Ok(None)
}

fn tag_bytes(tag: &str) -> Result<[u8; 2]> {
    let b = tag.as_bytes();
    if b.len() != 2 {
        return Err(BamError::format(BamFormatErrorKind::BadTagSize));
    }
    Ok([b[0], b[1]])
}

fn decode_value(data: &[u8], span: &TagSpan) -> Result<TagValue> {
    let v = &data[span.value_at..span.end];
    Ok(match data[span.type_at] {
        b'A' => TagValue::Char(v[0]),
        b'c' => TagValue::Int8(v[0] as i8),
        b'C' => TagValue::UInt8(v[0]),
        b's' => TagValue::Int16(bytes::unpack_i16(v)),
        b'S' => TagValue::UInt16(bytes::unpack_u16(v)),
        b'i' => TagValue::Int32(bytes::unpack_i32(v)),
        b'I' => TagValue::UInt32(bytes::unpack_u32(v)),
        b'f' => TagValue::Float(bytes::unpack_f32(v)),
        b'Z' => TagValue::String(String::from_utf8_lossy(&v[..v.len() - 1]).into_owned()),
        b'H' => TagValue::Hex(String::from_utf8_lossy(&v[..v.len() - 1]).into_owned()),
        b'B' => {
            let sub = v[0];
            let count = bytes::unpack_u32(&v[1..]) as usize;
            let elems = &v[5..];
            match sub {
                b'c' => TagValue::ArrayInt8(elems.iter().take(count).map(|&b| b as i8).collect()),
                b'C' => TagValue::ArrayUInt8(elems[..count].to_vec()),
                b's' => TagValue::ArrayInt16(
                    (0..count).map(|i| bytes::unpack_i16(&elems[i * 2..])).collect(),
                ),
                b'S' => TagValue::ArrayUInt16(
                    (0..count).map(|i| bytes::unpack_u16(&elems[i * 2..])).collect(),
                ),
                b'i' => TagValue::ArrayInt32(
                    (0..count).map(|i| bytes::unpack_i32(&elems[i * 4..])).collect(),
                ),
                b'I' => TagValue::ArrayUInt32(
                    (0..count).map(|i| bytes::unpack_u32(&elems[i * 4..])).collect(),
                ),
                b'f' => TagValue::ArrayFloat(
                    (0..count).map(|i| bytes::unpack_f32(&elems[i * 4..])).collect(),
                ),
                _ => return Err(BamError::format(BamFormatErrorKind::BadTagType)),
            }
        }
        _ => return Err(BamError::format(BamFormatErrorKind::BadTagType)),
    })
}

fn encode_value(out: &mut Vec<u8>, value: &TagValue) {
    let mut word = [0u8; 4];
    match value {
        TagValue::Char(c) => out.push(*c),
        TagValue::Int8(v) => out.push(*v as u8),
        TagValue::UInt8(v) => out.push(*v),
        TagValue::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
        TagValue::Float(v) => {
            bytes::pack_f32(&mut word, *v);
            out.extend_from_slice(&word);
        }
        TagValue::String(s) | TagValue::Hex(s) => {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        TagValue::ArrayInt8(a) => {
            array_head(out, b'c', a.len());
            out.extend(a.iter().map(|&v| v as u8));
        }
        TagValue::ArrayUInt8(a) => {
            array_head(out, b'C', a.len());
            out.extend_from_slice(a);
        }
        TagValue::ArrayInt16(a) => {
            array_head(out, b's', a.len());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        TagValue::ArrayUInt16(a) => {
            array_head(out, b'S', a.len());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        TagValue::ArrayInt32(a) => {
            array_head(out, b'i', a.len());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        TagValue::ArrayUInt32(a) => {
            array_head(out, b'I', a.len());
            for v in a {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        TagValue::ArrayFloat(a) => {
            array_head(out, b'f', a.len());
            for v in a {
                out.extend_from_slice(&v.to_bits().to_le_bytes());
            }
        }
    }
}

fn array_head(out: &mut Vec<u8>, sub: u8, count: usize) {
    out.push(sub);
    out.extend_from_slice(&(count as u32).to_le_bytes());
}

impl BamAlignment {
    /// True when the record carries an entry for `tag`. A malformed tag
    /// area reads as "absent".
    pub fn has_tag(&self, tag: &str) -> bool {
        match tag_bytes(tag) {
            Ok(t) => matches!(find_tag(&self.tag_data, t), Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// The raw type code stored for `tag`, when present.
    pub fn tag_type(&self, tag: &str) -> Result<Option<char>> {
        let t = tag_bytes(tag)?;
        Ok(find_tag(&self.tag_data, t)?.map(|s| self.tag_data[s.type_at] as char))
    }

    /// The decoded value of `tag`: `None` when absent.
    pub fn tag_value(&self, tag: &str) -> Result<Option<TagValue>> {
        let t = tag_bytes(tag)?;
        match find_tag(&self.tag_data, t)? {
            Some(span) => Ok(Some(decode_value(&self.tag_data, &span)?)),
            None => Ok(None),
        }
    }

    /// Integer view of `tag`, widening (with sign extension) from any
    /// integer or char storage type. `None` when absent or when the
    /// stored type is not integer-compatible.
    pub fn int_tag(&self, tag: &str) -> Result<Option<i64>> {
        Ok(match self.tag_value(tag)? {
            Some(TagValue::Char(v)) => Some(v as i64),
            Some(TagValue::Int8(v)) => Some(v as i64),
            Some(TagValue::UInt8(v)) => Some(v as i64),
            Some(TagValue::Int16(v)) => Some(v as i64),
            Some(TagValue::UInt16(v)) => Some(v as i64),
            Some(TagValue::Int32(v)) => Some(v as i64),
            Some(TagValue::UInt32(v)) => Some(v as i64),
            _ => None,
        })
    }

    /// Float view of `tag`; only `f`-typed storage converts.
    pub fn float_tag(&self, tag: &str) -> Result<Option<f32>> {
        Ok(match self.tag_value(tag)? {
            Some(TagValue::Float(v)) => Some(v),
            _ => None,
        })
    }

    /// String view of `tag`; `Z` and `H` storage only.
    pub fn string_tag(&self, tag: &str) -> Result<Option<String>> {
        Ok(match self.tag_value(tag)? {
            Some(TagValue::String(s)) | Some(TagValue::Hex(s)) => Some(s),
            _ => None,
        })
    }

    /// Integer-array view of a `B` tag with an integer subtype.
    pub fn int_array_tag(&self, tag: &str) -> Result<Option<Vec<i64>>> {
        Ok(match self.tag_value(tag)? {
            Some(TagValue::ArrayInt8(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            Some(TagValue::ArrayUInt8(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            Some(TagValue::ArrayInt16(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            Some(TagValue::ArrayUInt16(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            Some(TagValue::ArrayInt32(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            Some(TagValue::ArrayUInt32(a)) => Some(a.iter().map(|&v| v as i64).collect()),
            _ => None,
        })
    }

    /// Float-array view of a `B` tag with subtype `f`.
    pub fn float_array_tag(&self, tag: &str) -> Result<Option<Vec<f32>>> {
        Ok(match self.tag_value(tag)? {
            Some(TagValue::ArrayFloat(a)) => Some(a),
            _ => None,
        })
    }

    /// Appends a new tag. Returns `Ok(false)` when the tag already
    /// exists (use [`edit_tag`](Self::edit_tag) to replace). Materializes
    /// char data first when needed.
    pub fn add_tag(&mut self, tag: &str, value: &TagValue) -> Result<bool> {
        self.build_char_data()?;
        let t = tag_bytes(tag)?;
        if find_tag(&self.tag_data, t)?.is_some() {
            return Ok(false);
        }
        self.tag_data.push(t[0]);
        self.tag_data.push(t[1]);
        self.tag_data.push(value.type_code() as u8);
        let mut body = Vec::new();
        encode_value(&mut body, value);
        self.tag_data.extend_from_slice(&body);
        Ok(true)
    }

    /// Replaces `tag` with `value`, adding it when absent.
    pub fn edit_tag(&mut self, tag: &str, value: &TagValue) -> Result<()> {
        self.build_char_data()?;
        self.remove_tag(tag)?;
        self.add_tag(tag, value)?;
        Ok(())
    }

    /// Splices out `tag`. Returns `Ok(false)` when it was absent.
    pub fn remove_tag(&mut self, tag: &str) -> Result<bool> {
        self.build_char_data()?;
        let t = tag_bytes(tag)?;
        match find_tag(&self.tag_data, t)? {
            Some(span) => {
                self.tag_data.drain(span.start..span.end);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materialized() -> BamAlignment {
        // A fresh record is already in materialized (non-core) form.
        BamAlignment::new()
    }

    #[test]
    fn add_has_get_remove_every_type() {
        let values = [
            TagValue::Char(b'x'),
            TagValue::Int8(-5),
            TagValue::UInt8(200),
            TagValue::Int16(-1234),
            TagValue::UInt16(65000),
            TagValue::Int32(-100_000),
            TagValue::UInt32(3_000_000_000),
            TagValue::Float(1.5),
            TagValue::String("sample1".to_string()),
            TagValue::Hex("1AFF".to_string()),
            TagValue::ArrayInt8(vec![-1, 2, -3]),
            TagValue::ArrayUInt8(vec![9, 8]),
            TagValue::ArrayInt16(vec![-300, 300]),
            TagValue::ArrayUInt16(vec![40_000]),
            TagValue::ArrayInt32(vec![10, 20, 30]),
            TagValue::ArrayUInt32(vec![4_000_000_000]),
            TagValue::ArrayFloat(vec![0.25, -0.5]),
        ];

        for (i, value) in values.iter().enumerate() {
            let mut al = materialized();
            let tag = format!("X{}", (b'A' + i as u8) as char);
            assert!(al.add_tag(&tag, value).unwrap());
            assert!(al.has_tag(&tag));
            assert_eq!(al.tag_value(&tag).unwrap().as_ref(), Some(value));
            assert_eq!(
                al.tag_type(&tag).unwrap(),
                Some(value.type_code()),
                "type code for {tag}"
            );
            assert!(al.remove_tag(&tag).unwrap());
            assert!(!al.has_tag(&tag));
        }
    }

    #[test]
    fn add_refuses_duplicates_edit_replaces() {
        let mut al = materialized();
        assert!(al.add_tag("NM", &TagValue::Int32(3)).unwrap());
        assert!(!al.add_tag("NM", &TagValue::Int32(9)).unwrap());
        assert_eq!(al.int_tag("NM").unwrap(), Some(3));

        al.edit_tag("NM", &TagValue::Int32(9)).unwrap();
        assert_eq!(al.int_tag("NM").unwrap(), Some(9));

        // Edit of an absent tag is an add.
        al.edit_tag("XY", &TagValue::UInt8(7)).unwrap();
        assert_eq!(al.int_tag("XY").unwrap(), Some(7));
    }

    #[test]
    fn widening_matrix() {
        let mut al = materialized();
        al.add_tag("XA", &TagValue::Int8(-2)).unwrap();
        al.add_tag("XB", &TagValue::UInt16(40_000)).unwrap();
        al.add_tag("XC", &TagValue::Float(2.5)).unwrap();
        al.add_tag("XD", &TagValue::String("abc".into())).unwrap();

        // Integers widen with sign extension; floats and strings do not.
        assert_eq!(al.int_tag("XA").unwrap(), Some(-2));
        assert_eq!(al.int_tag("XB").unwrap(), Some(40_000));
        assert_eq!(al.int_tag("XC").unwrap(), None);
        assert_eq!(al.int_tag("XD").unwrap(), None);

        assert_eq!(al.float_tag("XC").unwrap(), Some(2.5));
        assert_eq!(al.float_tag("XA").unwrap(), None);

        assert_eq!(al.string_tag("XD").unwrap(), Some("abc".to_string()));
        assert_eq!(al.string_tag("XA").unwrap(), None);

        // Absent tag is None everywhere, not an error.
        assert_eq!(al.int_tag("ZZ").unwrap(), None);
        assert!(!al.has_tag("ZZ"));
    }

    #[test]
    fn array_access_requires_array_destination() {
        let mut al = materialized();
        al.add_tag("XF", &TagValue::ArrayInt32(vec![10, 20, 30]))
            .unwrap();
        assert_eq!(al.int_array_tag("XF").unwrap(), Some(vec![10, 20, 30]));
        assert_eq!(al.int_tag("XF").unwrap(), None);
        assert_eq!(al.float_array_tag("XF").unwrap(), None);
    }

    #[test]
    fn malformed_tag_area_is_an_error() {
        let mut al = materialized();
        al.tag_data = vec![b'N', b'M', b'q', 0]; // unknown type code
        assert!(al.tag_value("NM").is_err());
        assert!(!al.has_tag("NM"));

        al.tag_data = vec![b'N', b'M', b'i', 1, 2]; // truncated i32
        assert!(al.tag_value("NM").is_err());
    }

    #[test]
    fn bad_tag_name_length() {
        let mut al = materialized();
        assert!(al.add_tag("TOOLONG", &TagValue::Int32(1)).is_err());
        assert!(al.tag_value("X").is_err());
    }
}
