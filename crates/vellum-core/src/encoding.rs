//! Order-preserving binary codec.
//!
//! Values encode to byte strings whose `memcmp` order matches
//! [`Value::compare`] for values of the same type. A one-byte type tag
//! leads every encoding so heterogeneous keys segregate by type, with
//! null sorting smallest.
//!
//! Layout per type:
//! - integers and timestamps: sign-flipped big-endian
//! - doubles: sign bit flipped when positive, all bits flipped when
//!   negative
//! - text and blobs: zero-escaped (`0x00` becomes `0x00 0xFF`) and
//!   zero-terminated, so they are self-delimiting
//! - arrays and objects: recursively encoded elements followed by a
//!   terminator byte
//!
//! The same codec doubles as the row payload format through
//! [`encode_document`] and [`decode_document`].

use vellum_common::{Error, Result};

use crate::document::Document;
use crate::value::{Value, ValueType};

/// Terminator byte for self-delimiting encodings.
const TERMINATOR: u8 = 0x00;
/// Escape continuation for a literal zero byte.
const ESCAPE: u8 = 0xFF;

/// Encodes a value into a fresh buffer.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    encode_value_into(&mut buf, value);
    buf
}

/// Appends the encoding of `value` to `buf`.
pub fn encode_value_into(buf: &mut Vec<u8>, value: &Value) {
    buf.push(value.value_type().tag());
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Integer(i) => buf.extend_from_slice(&encode_i64(*i)),
        Value::Double(d) => buf.extend_from_slice(&encode_f64(*d)),
        Value::Timestamp(t) => buf.extend_from_slice(&encode_i64(*t)),
        Value::Text(s) => encode_bytes_into(buf, s.as_bytes()),
        Value::Blob(b) => encode_bytes_into(buf, b),
        Value::Array(items) => {
            for item in items {
                encode_value_into(buf, item);
            }
            buf.push(TERMINATOR);
        }
        Value::Object(doc) => {
            for (name, item) in doc.iter() {
                buf.push(ValueType::Text.tag());
                encode_bytes_into(buf, name.as_bytes());
                encode_value_into(buf, item);
            }
            buf.push(TERMINATOR);
        }
    }
}

/// Decodes a single value, requiring the whole input to be consumed.
pub fn decode_value(buf: &[u8]) -> Result<Value> {
    let (value, n) = decode_value_from(buf)?;
    if n != buf.len() {
        return Err(Error::Corruption(format!(
            "trailing bytes after value: {} of {}",
            n,
            buf.len()
        )));
    }
    Ok(value)
}

/// Decodes the value at the start of `buf`, returning it together with
/// the number of bytes consumed.
pub fn decode_value_from(buf: &[u8]) -> Result<(Value, usize)> {
    let (&tag, rest) = buf
        .split_first()
        .ok_or_else(|| Error::Corruption("empty encoded value".into()))?;
    let ty = ValueType::from_tag(tag)
        .ok_or_else(|| Error::Corruption(format!("unknown type tag {:#04x}", tag)))?;

    match ty {
        ValueType::Null => Ok((Value::Null, 1)),
        ValueType::Boolean => {
            let &b = rest
                .first()
                .ok_or_else(|| Error::Corruption("truncated boolean".into()))?;
            Ok((Value::Bool(b != 0), 2))
        }
        ValueType::Integer => {
            let i = decode_i64(rest)?;
            Ok((Value::Integer(i), 9))
        }
        ValueType::Double => {
            let d = decode_f64(rest)?;
            Ok((Value::Double(d), 9))
        }
        ValueType::Timestamp => {
            let t = decode_i64(rest)?;
            Ok((Value::Timestamp(t), 9))
        }
        ValueType::Text => {
            let (bytes, n) = decode_bytes_from(rest)?;
            let s = String::from_utf8(bytes)
                .map_err(|_| Error::Corruption("encoded text is not valid utf-8".into()))?;
            Ok((Value::Text(s), 1 + n))
        }
        ValueType::Blob => {
            let (bytes, n) = decode_bytes_from(rest)?;
            Ok((Value::Blob(bytes), 1 + n))
        }
        ValueType::Array => {
            let mut items = Vec::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    Some(&TERMINATOR) => return Ok((Value::Array(items), 1 + pos + 1)),
                    Some(_) => {
                        let (item, n) = decode_value_from(&rest[pos..])?;
                        items.push(item);
                        pos += n;
                    }
                    None => return Err(Error::Corruption("unterminated array".into())),
                }
            }
        }
        ValueType::Object => {
            let mut doc = Document::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    Some(&TERMINATOR) => return Ok((Value::Object(doc), 1 + pos + 1)),
                    Some(_) => {
                        let (name, n) = decode_value_from(&rest[pos..])?;
                        pos += n;
                        let Value::Text(name) = name else {
                            return Err(Error::Corruption("object field name is not text".into()));
                        };
                        let (item, n) = decode_value_from(&rest[pos..])?;
                        pos += n;
                        doc.set(name, item);
                    }
                    None => return Err(Error::Corruption("unterminated object".into())),
                }
            }
        }
    }
}

/// Encodes a document as a row payload.
pub fn encode_document(doc: &Document) -> Vec<u8> {
    encode_value(&Value::Object(doc.clone()))
}

/// Decodes a row payload back into a document.
pub fn decode_document(buf: &[u8]) -> Result<Document> {
    match decode_value(buf)? {
        Value::Object(doc) => Ok(doc),
        v => Err(Error::Corruption(format!(
            "row payload is {}, expected object",
            v.value_type()
        ))),
    }
}

fn encode_i64(i: i64) -> [u8; 8] {
    ((i as u64) ^ (1 << 63)).to_be_bytes()
}

fn decode_i64(buf: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = buf
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Corruption("truncated integer".into()))?;
    Ok((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
}

fn encode_f64(d: f64) -> [u8; 8] {
    let bits = d.to_bits();
    let flipped = if bits & (1 << 63) == 0 {
        bits ^ (1 << 63)
    } else {
        !bits
    };
    flipped.to_be_bytes()
}

fn decode_f64(buf: &[u8]) -> Result<f64> {
    let bytes: [u8; 8] = buf
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Corruption("truncated double".into()))?;
    let flipped = u64::from_be_bytes(bytes);
    let bits = if flipped & (1 << 63) != 0 {
        flipped ^ (1 << 63)
    } else {
        !flipped
    };
    Ok(f64::from_bits(bits))
}

fn encode_bytes_into(buf: &mut Vec<u8>, bytes: &[u8]) {
    for &b in bytes {
        buf.push(b);
        if b == TERMINATOR {
            buf.push(ESCAPE);
        }
    }
    buf.push(TERMINATOR);
}

fn decode_bytes_from(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        match buf.get(pos) {
            Some(&TERMINATOR) => {
                if buf.get(pos + 1) == Some(&ESCAPE) {
                    out.push(TERMINATOR);
                    pos += 2;
                } else {
                    return Ok((out, pos + 1));
                }
            }
            Some(&b) => {
                out.push(b);
                pos += 1;
            }
            None => return Err(Error::Corruption("unterminated byte string".into())),
        }
    }
}
