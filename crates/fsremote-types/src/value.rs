//! Native values that travel through descriptors.
//!
//! [`Value`] is the closed set of runtime shapes a filesystem call can take
//! as an argument or produce as a result. Descriptors decide which of them a
//! given position accepts; the value model itself has no schema.

use indexmap::IndexMap;
use std::fmt;
use strum::{Display, EnumIter, EnumString};
use url::Url;

/// Field map of an object value. Insertion order is kept for printing;
/// equality ignores order.
pub type Fields = IndexMap<String, Value>;

static UNDEFINED: Value = Value::Undefined;

/// A native value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Buffer(Vec<u8>),
    TypedArray(TypedArray),
    Url(Url),
    Array(Vec<Value>),
    Object(Fields),
}

impl Value {
    /// Build an object value from `(key, value)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build an array value.
    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::Array(items.into_iter().collect())
    }

    /// Build a buffer value.
    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Buffer(bytes.into())
    }

    /// Field lookup. Absent fields and non-objects read as `Undefined`.
    pub fn field(&self, key: &str) -> &Value {
        match self {
            Value::Object(fields) => fields.get(key).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    /// Positional lookup. Out-of-range positions and non-arrays read as `Undefined`.
    pub fn at(&self, index: usize) -> &Value {
        match self {
            Value::Array(items) => items.get(index).unwrap_or(&UNDEFINED),
            _ => &UNDEFINED,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// `true` for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value as `i64` when it is an exact integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if is_integer(*n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Raw bytes of a buffer or typed array.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Buffer(bytes) => Some(bytes.clone()),
            Value::TypedArray(array) => Some(array.to_bytes()),
            _ => None,
        }
    }

    /// Convert to loose JSON for printing. Not a wire format.
    fn to_printable_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(ms) => Json::from(*ms),
            Value::Buffer(bytes) => serde_json::json!({
                "type": "Buffer",
                "data": bytes,
            }),
            Value::TypedArray(array) => Json::Array(
                array.elements.iter().map(|n| number_to_json(*n)).collect(),
            ),
            Value::Url(url) => Json::String(url.as_str().to_string()),
            Value::Array(items) => {
                Json::Array(items.iter().map(Value::to_printable_json).collect())
            }
            Value::Object(fields) => Json::Object(
                fields
                    .iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .map(|(k, v)| (k.clone(), v.to_printable_json()))
                    .collect(),
            ),
        }
    }
}

/// Printable form used in type-mismatch messages: scalars print bare,
/// structured values print as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Url(url) => f.write_str(url.as_str()),
            other => write!(f, "{}", other.to_printable_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<Url> for Value {
    fn from(url: Url) -> Self {
        Value::Url(url)
    }
}

impl From<TypedArray> for Value {
    fn from(array: TypedArray) -> Self {
        Value::TypedArray(array)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Undefined, Into::into)
    }
}

/// Integer test matching the host: finite, unchanged by truncation, and
/// small enough that its decimal form has no exponent.
pub fn is_integer(n: f64) -> bool {
    n.is_finite() && n.trunc() == n && n.abs() < 1e21
}

/// Format a number the way the host prints it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if is_integer(n) && n.abs() < 9_007_199_254_740_992.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// JSON number for a finite f64, preferring the integer form.
pub(crate) fn number_to_json(n: f64) -> serde_json::Value {
    if is_integer(n) && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

// ============================================================================
// Typed arrays
// ============================================================================

/// Element kind of a fixed-width numeric array. The display name is the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum TypedArrayKind {
    Int8Array,
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
}

impl TypedArrayKind {
    /// Bytes per element.
    pub fn width(self) -> usize {
        match self {
            Self::Int8Array | Self::Uint8Array | Self::Uint8ClampedArray => 1,
            Self::Int16Array | Self::Uint16Array => 2,
            Self::Int32Array | Self::Uint32Array | Self::Float32Array => 4,
            Self::Float64Array => 8,
        }
    }

    /// Narrow an arbitrary number to what an element of this kind can hold.
    pub fn coerce(self, n: f64) -> f64 {
        match self {
            Self::Int8Array => wrap_int(n, 8, true),
            Self::Uint8Array => wrap_int(n, 8, false),
            Self::Uint8ClampedArray => {
                if n.is_nan() {
                    0.0
                } else {
                    n.clamp(0.0, 255.0).round_ties_even()
                }
            }
            Self::Int16Array => wrap_int(n, 16, true),
            Self::Uint16Array => wrap_int(n, 16, false),
            Self::Int32Array => wrap_int(n, 32, true),
            Self::Uint32Array => wrap_int(n, 32, false),
            Self::Float32Array => n as f32 as f64,
            Self::Float64Array => n,
        }
    }

    fn encode(self, n: f64, out: &mut Vec<u8>) {
        match self {
            Self::Int8Array => out.extend_from_slice(&(n as i8).to_le_bytes()),
            Self::Uint8Array | Self::Uint8ClampedArray => out.push(n as u8),
            Self::Int16Array => out.extend_from_slice(&(n as i16).to_le_bytes()),
            Self::Uint16Array => out.extend_from_slice(&(n as u16).to_le_bytes()),
            Self::Int32Array => out.extend_from_slice(&(n as i32).to_le_bytes()),
            Self::Uint32Array => out.extend_from_slice(&(n as u32).to_le_bytes()),
            Self::Float32Array => out.extend_from_slice(&(n as f32).to_le_bytes()),
            Self::Float64Array => out.extend_from_slice(&n.to_le_bytes()),
        }
    }

    fn decode(self, chunk: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        match self {
            Self::Int8Array => chunk[0] as i8 as f64,
            Self::Uint8Array | Self::Uint8ClampedArray => chunk[0] as f64,
            Self::Int16Array => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            Self::Uint16Array => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            Self::Int32Array => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::Uint32Array => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::Float32Array => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            Self::Float64Array => f64::from_le_bytes(buf),
        }
    }
}

fn wrap_int(n: f64, bits: i32, signed: bool) -> f64 {
    if !n.is_finite() {
        return 0.0;
    }
    let modulus = 2f64.powi(bits);
    let mut r = n.trunc().rem_euclid(modulus);
    if signed && r >= modulus / 2.0 {
        r -= modulus;
    }
    r
}

/// A fixed-width numeric array. Elements are stored already narrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    pub kind: TypedArrayKind,
    pub elements: Vec<f64>,
}

impl TypedArray {
    pub fn new(kind: TypedArrayKind, elements: impl IntoIterator<Item = f64>) -> Self {
        Self {
            kind,
            elements: elements.into_iter().map(|n| kind.coerce(n)).collect(),
        }
    }

    /// Reinterpret little-endian bytes as elements. Trailing bytes that do
    /// not fill an element are dropped.
    pub fn from_bytes(kind: TypedArrayKind, bytes: &[u8]) -> Self {
        Self {
            kind,
            elements: bytes
                .chunks_exact(kind.width())
                .map(|chunk| kind.decode(chunk))
                .collect(),
        }
    }

    /// The backing bytes, little-endian.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.elements.len() * self.kind.width());
        for n in &self.elements {
            self.kind.encode(*n, &mut out);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
