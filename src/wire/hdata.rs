//! HData decoding (§4.1): a tabular typed object keyed by a path of
//! identity pointers plus a row of named, typed fields.

use std::collections::HashMap;

use super::{Pointer, Value, WireCursor, decode_value_for_tag, split_key_spec};
use crate::error::WireError;

/// One decoded HData row: the identity tuple plus its named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct HDataRow {
    /// One pointer per `hpath` component, in path order.
    pub pointers: Vec<Pointer>,
    /// Field values keyed by name, per the `keys` spec.
    pub fields: HashMap<String, Value>,
}

impl HDataRow {
    /// The last pointer in the identity tuple — conventionally the row's
    /// own identity (a line id, a buffer id, a hotlist item id, ...).
    pub fn id(&self) -> Option<Pointer> {
        self.pointers.last().copied()
    }

    /// The first pointer in the identity tuple — conventionally the
    /// owning object (e.g. the buffer a line belongs to).
    pub fn owner(&self) -> Option<Pointer> {
        self.pointers.first().copied()
    }
}

/// A decoded `hda` atom: path components, key specs, and rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HData {
    /// Slash-separated path components, e.g. `["buffer", "lines", "last_line", "data"]`.
    pub hpath: Vec<String>,
    /// `(name, type)` pairs parsed out of the comma-separated `keys` string.
    pub keys: Vec<(String, String)>,
    /// Decoded rows, in server arrival order.
    pub rows: Vec<HDataRow>,
}

fn split_path(hpath: &str) -> Vec<String> {
    hpath.split('/').map(str::to_owned).collect()
}

fn split_keys(keys: &str) -> Vec<(String, String)> {
    if keys.is_empty() {
        return Vec::new();
    }
    keys.split(',').map(split_key_spec).collect()
}

pub(crate) fn decode_hdata(c: &mut WireCursor) -> Result<HData, WireError> {
    let hpath_raw = super::decode_string(c)?.unwrap_or_default();
    let keys_raw = super::decode_string(c)?.unwrap_or_default();
    let count = c.u32_be()?;

    let hpath = split_path(&hpath_raw);
    let keys = split_keys(&keys_raw);

    let mut rows = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut pointers = Vec::with_capacity(hpath.len());
        for _ in 0..hpath.len() {
            pointers.push(super::decode_pointer(c)?);
        }

        let mut fields = HashMap::with_capacity(keys.len());
        for (name, ty) in &keys {
            let value = decode_field(ty, name, c)?;
            fields.insert(name.clone(), value);
        }

        rows.push(HDataRow { pointers, fields });
    }

    Ok(HData { hpath, keys, rows })
}

/// Decode one HData field value given its declared type spec. `arr` fields
/// inside HData only support `int`/`str` items (§4.1); any other array item
/// type is a protocol error, matching the original decoder.
fn decode_field(ty: &str, _name: &str, c: &mut WireCursor) -> Result<Value, WireError> {
    match ty {
        "arr" => {
            let item_tag = c.take_tag()?;
            if &item_tag != b"int" && &item_tag != b"str" {
                return Err(WireError::UnsupportedHDataArray(item_tag));
            }
            let count = c.u32_be()?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_value_for_tag(&item_tag, c)?);
            }
            Ok(Value::Array(items))
        }
        other => {
            let tag = type_tag(other)?;
            decode_value_for_tag(&tag, c)
        }
    }
}

fn type_tag(ty: &str) -> Result<[u8; 3], WireError> {
    let bytes = ty.as_bytes();
    if bytes.len() != 3 {
        return Err(WireError::UnknownTag([0, 0, 0]));
    }
    Ok([bytes[0], bytes[1], bytes[2]])
}
