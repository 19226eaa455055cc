//! Wire codec (§4.1): decodes self-describing typed atoms from a
//! big-endian byte stream produced by the relay server.

mod cursor;
mod hdata;

pub use cursor::WireCursor;
pub use hdata::{HData, HDataRow};

use std::collections::HashMap;

use crate::error::WireError;

/// A server-minted opaque identifier. Zero is the null pointer (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(pub u64);

impl Pointer {
    /// The null pointer.
    pub const NULL: Pointer = Pointer(0);

    /// Whether this is the null pointer.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A fully decoded typed value, tagged by which wire atom produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `chr`
    Char(u8),
    /// `int`
    Int(i32),
    /// `lon`
    Long(i64),
    /// `str` — `None` distinguishes the wire null string from an empty one.
    Str(Option<String>),
    /// `buf` — opaque bytes, never escape-decoded.
    Buf(Option<Vec<u8>>),
    /// `ptr`
    Pointer(Pointer),
    /// `tim` — milliseconds since the Unix epoch.
    Time(i64),
    /// `htb` — only `str`/`str` tables are supported (§4.1).
    HashTable(Vec<(String, String)>),
    /// `arr` — homogeneous array of any atom type.
    Array(Vec<Value>),
    /// `hda`
    HData(HData),
}

impl Value {
    /// View this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// View this value as an integer, if it is one.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// View this value as a pointer, if it is one.
    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// View this value as a time, if it is one.
    pub fn as_time(&self) -> Option<i64> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }
}

/// Keys whose string payload the codec eagerly runs through the attribute
/// decoder (§4.1's stated optimization). This is a policy hint only; the
/// Sync Engine may re-decode any string regardless of this set.
pub const ESCAPE_BEARING_KEYS: &[&str] = &["message", "title", "prefix"];

fn decode_char(c: &mut WireCursor) -> Result<u8, WireError> {
    c.u8()
}

fn decode_int(c: &mut WireCursor) -> Result<i32, WireError> {
    c.i32_be()
}

fn decode_long(c: &mut WireCursor) -> Result<i64, WireError> {
    let len = c.u8()? as usize;
    let bytes = c.take(len)?;
    let text = std::str::from_utf8(bytes).map_err(|_| WireError::Malformed {
        kind: "lon",
        text: String::from_utf8_lossy(bytes).into_owned(),
    })?;
    text.parse::<i64>().map_err(|_| WireError::Malformed {
        kind: "lon",
        text: text.to_owned(),
    })
}

/// Decode a `str` atom. Does not run the attribute decoder; callers that
/// know the field may carry escapes invoke that separately (§4.1, §4.2).
pub(crate) fn decode_string(c: &mut WireCursor) -> Result<Option<String>, WireError> {
    let len = c.u32_be()?;
    match len {
        0xFFFF_FFFF => Ok(None),
        0 => Ok(Some(String::new())),
        _ => {
            let bytes = c.take(len as usize)?;
            std::str::from_utf8(bytes)
                .map(|s| Some(s.to_owned()))
                .map_err(|_| WireError::InvalidUtf8)
        }
    }
}

fn decode_buffer(c: &mut WireCursor) -> Result<Option<Vec<u8>>, WireError> {
    let len = c.u32_be()?;
    if len == 0 {
        Ok(Some(Vec::new()))
    } else {
        Ok(Some(c.take(len as usize)?.to_vec()))
    }
}

pub(crate) fn decode_pointer(c: &mut WireCursor) -> Result<Pointer, WireError> {
    let len = c.u8()? as usize;
    let bytes = c.take(len)?;
    let text = std::str::from_utf8(bytes).map_err(|_| WireError::Malformed {
        kind: "ptr",
        text: String::from_utf8_lossy(bytes).into_owned(),
    })?;
    let value = u64::from_str_radix(text, 16).map_err(|_| WireError::Malformed {
        kind: "ptr",
        text: text.to_owned(),
    })?;
    Ok(Pointer(value))
}

fn decode_time(c: &mut WireCursor) -> Result<i64, WireError> {
    let len = c.u8()? as usize;
    let bytes = c.take(len)?;
    let text = std::str::from_utf8(bytes).map_err(|_| WireError::Malformed {
        kind: "tim",
        text: String::from_utf8_lossy(bytes).into_owned(),
    })?;
    let secs: i64 = text.parse().map_err(|_| WireError::Malformed {
        kind: "tim",
        text: text.to_owned(),
    })?;
    Ok(secs * 1000)
}

fn decode_hashtable(c: &mut WireCursor) -> Result<Vec<(String, String)>, WireError> {
    let key_tag = c.take_tag()?;
    let value_tag = c.take_tag()?;
    if &key_tag != b"str" || &value_tag != b"str" {
        return Err(WireError::UnsupportedHashTable {
            key: key_tag,
            value: value_tag,
        });
    }
    let count = c.u32_be()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = decode_string(c)?.unwrap_or_default();
        let value = decode_string(c)?.unwrap_or_default();
        out.push((key, value));
    }
    Ok(out)
}

fn decode_array(c: &mut WireCursor) -> Result<Vec<Value>, WireError> {
    let item_tag = c.take_tag()?;
    let count = c.u32_be()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(decode_value_for_tag(&item_tag, c)?);
    }
    Ok(out)
}

/// Decode one value given its 3-byte type tag, per the table in §4.1.
pub fn decode_value_for_tag(tag: &[u8; 3], c: &mut WireCursor) -> Result<Value, WireError> {
    match tag {
        b"chr" => Ok(Value::Char(decode_char(c)?)),
        b"int" => Ok(Value::Int(decode_int(c)?)),
        b"lon" => Ok(Value::Long(decode_long(c)?)),
        b"str" => Ok(Value::Str(decode_string(c)?)),
        b"buf" => Ok(Value::Buf(decode_buffer(c)?)),
        b"ptr" => Ok(Value::Pointer(decode_pointer(c)?)),
        b"tim" => Ok(Value::Time(decode_time(c)?)),
        b"htb" => Ok(Value::HashTable(decode_hashtable(c)?)),
        b"arr" => Ok(Value::Array(decode_array(c)?)),
        b"hda" => Ok(Value::HData(hdata::decode_hdata(c)?)),
        other => Err(WireError::UnknownTag(*other)),
    }
}

/// Key-spec pair parsed out of an HData `keys` string component, e.g.
/// `"number:int"` becomes `("number", "int")`.
pub(crate) fn split_key_spec(spec: &str) -> (String, String) {
    match spec.split_once(':') {
        Some((name, ty)) => (name.to_owned(), ty.to_owned()),
        None => (spec.to_owned(), String::new()),
    }
}

/// Helper used by the Sync Engine: decode a single field value out of a
/// HData row's object map by name, returning `None` if absent.
pub fn field<'a>(fields: &'a HashMap<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name)
}
