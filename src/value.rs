//! The in-memory typed value tree PackStream encodes and decodes.
//!
//! A [`Value`] is a tagged union over the primitive PackStream families plus
//! the two container shapes ([`Value::List`], [`Value::Dictionary`]) and the
//! tagged [`Value::Structure`] used for session messages and graph-specific
//! types alike. Values own their children outright (`Clone` is a deep copy);
//! the only mutation primitive is "format as T", which replaces a value's
//! content in place, dropping whatever it owned before.

use smallvec::SmallVec;

/// Payloads of 16 bytes or fewer are kept inline instead of heap-allocating,
/// matching seabolt's small-string/small-bytes optimization.
pub type SmallBytes = SmallVec<[u8; 16]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(SmallBytes),
    Bytes(SmallBytes),
    List(Vec<Value>),
    /// Ordered `(key, value)` pairs. Not required to have unique keys by the
    /// codec, but callers are expected to keep keys unique by contract;
    /// rendering and iteration preserve insertion order.
    Dictionary(Vec<(String, Value)>),
    Structure { tag: i8, fields: Vec<Value> },
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn null() -> Self {
        Value::Null
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(SmallBytes::from_slice(s.as_ref().as_bytes()))
    }

    pub fn bytes(b: impl AsRef<[u8]>) -> Self {
        Value::Bytes(SmallBytes::from_slice(b.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(items)
    }

    pub fn dict(pairs: Vec<(String, Value)>) -> Self {
        Value::Dictionary(pairs)
    }

    pub fn structure(tag: i8, fields: Vec<Value>) -> Self {
        Value::Structure { tag, fields }
    }

    // -- format-as-T: replace content in place, releasing prior children --

    pub fn format_as_null(&mut self) {
        *self = Value::Null;
    }

    pub fn format_as_boolean(&mut self, v: bool) {
        *self = Value::Boolean(v);
    }

    pub fn format_as_integer(&mut self, v: i64) {
        *self = Value::Integer(v);
    }

    pub fn format_as_float(&mut self, v: f64) {
        *self = Value::Float(v);
    }

    pub fn format_as_string(&mut self, s: impl AsRef<str>) {
        *self = Value::string(s);
    }

    pub fn format_as_bytes(&mut self, b: impl AsRef<[u8]>) {
        *self = Value::bytes(b);
    }

    pub fn format_as_list(&mut self, n: usize) {
        *self = Value::List(vec![Value::Null; n]);
    }

    pub fn format_as_dictionary(&mut self, n: usize) {
        *self = Value::Dictionary(
            std::iter::repeat_with(|| (String::new(), Value::Null))
                .take(n)
                .collect(),
        );
    }

    pub fn format_as_structure(&mut self, tag: i8, n: usize) {
        *self = Value::Structure {
            tag,
            fields: vec![Value::Null; n],
        };
    }

    // -- scalar reads --

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Dictionary(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<(i8, &[Value])> {
        match self {
            Value::Structure { tag, fields } => Some((*tag, fields)),
            _ => None,
        }
    }

    // -- list ops --

    /// Resizes a list, releasing any truncated tail in order (drop order for
    /// `Vec<Value>` is already front-to-back, so `Vec::truncate` alone
    /// satisfies the invariant).
    pub fn list_resize(&mut self, n: usize) -> crate::Result<()> {
        let items = self
            .as_list_mut()
            .ok_or_else(|| err_protocol!("list_resize called on a non-list value"))?;
        if n < items.len() {
            items.truncate(n);
        } else {
            items.resize(n, Value::Null);
        }
        Ok(())
    }

    // -- dictionary ops --

    /// Sets the key at index `i` without resizing the map.
    pub fn dictionary_set_key(&mut self, i: usize, key: impl Into<String>) -> crate::Result<()> {
        match self {
            Value::Dictionary(pairs) => {
                let slot = pairs
                    .get_mut(i)
                    .ok_or_else(|| err_protocol!("dictionary index {} out of range", i))?;
                slot.0 = key.into();
                Ok(())
            }
            _ => Err(err_protocol!(
                "dictionary_set_key called on a non-dictionary value"
            )),
        }
    }

    pub fn dictionary_value(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Dictionary(pairs) => pairs.get(i).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn dictionary_value_mut(&mut self, i: usize) -> Option<&mut Value> {
        match self {
            Value::Dictionary(pairs) => pairs.get_mut(i).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn dictionary_lookup(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dictionary(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    // -- structure ops --

    pub fn structure_field(&self, i: usize) -> Option<&Value> {
        match self {
            Value::Structure { fields, .. } => fields.get(i),
            _ => None,
        }
    }

    pub fn structure_field_mut(&mut self, i: usize) -> Option<&mut Value> {
        match self {
            Value::Structure { fields, .. } => fields.get_mut(i),
            _ => None,
        }
    }

    pub fn structure_tag(&self) -> Option<i8> {
        match self {
            Value::Structure { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Logical size: element/field count, or key count for a dictionary.
    /// Distinct from any physical storage size PackStream chooses for the
    /// encoded length header.
    pub fn logical_size(&self) -> usize {
        match self {
            Value::Null | Value::Boolean(_) | Value::Integer(_) | Value::Float(_) => 0,
            Value::String(b) | Value::Bytes(b) => b.len(),
            Value::List(items) => items.len(),
            Value::Dictionary(pairs) => pairs.len(),
            Value::Structure { fields, .. } => fields.len(),
        }
    }

    /// Renders a value for logs. Not meant to round-trip; strings are
    /// quoted, bytes are hex-dumped, and containers use Rust literal syntax.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(b) => format!("{:?}", String::from_utf8_lossy(b)),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                format!("#{hex}")
            }
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Dictionary(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.render()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Value::Structure { tag, fields } => {
                let rendered: Vec<String> = fields.iter().map(Value::render).collect();
                format!("#{:02X}({})", tag, rendered.join(", "))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::string(v)
    }
}
