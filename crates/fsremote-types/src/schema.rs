//! Type descriptors and their combinators.
//!
//! A [`TypeDef`] is a named, immutable node in a schema tree. Its name is the
//! wire tag: primitives use their own names, composites derive theirs from
//! their members.
//!
//! | Constructor | Name |
//! |-------------|------|
//! | [`TypeDef::union`] | `A \| B` |
//! | [`TypeDef::maybe`] | `A \| undefined` |
//! | [`TypeDef::tuple`] | `[A, B]` |
//! | [`TypeDef::array`] | `Array<A>` |
//! | [`TypeDef::object`] | `Object { a: A, b: B }` |
//! | [`TypeDef::shape`] | `Object { a: A \| undefined }` |
//! | [`TypeDef::map_of`] | `Object { [K]: V }` |
//!
//! ## Unions
//!
//! A union has no envelope of its own; serializing through it yields the
//! chosen member's envelope. When several members accept a value the last
//! one in declaration order is used. Deserialization dispatches on the tag
//! through a table flattened across nested unions, so every tag reachable
//! from a union must be distinct. That is asserted when the union is built.

use crate::envelope::Envelope;
use crate::error::{MarshalError, MarshalResult, SchemaError};
use crate::value::{Fields, TypedArray, TypedArrayKind, Value, is_integer, number_to_json};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Leaf descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    Undefined,
    Date,
    Buffer,
    TypedArray(TypedArrayKind),
    Url,
    Infinity,
}

impl Primitive {
    /// Wire tag of this primitive.
    pub fn name(self) -> String {
        match self {
            Self::String => "string".into(),
            Self::Integer => "integer".into(),
            Self::Number => "number".into(),
            Self::Boolean => "boolean".into(),
            Self::Null => "null".into(),
            Self::Undefined => "undefined".into(),
            Self::Date => "Date".into(),
            Self::Buffer => "Buffer".into(),
            Self::TypedArray(kind) => kind.to_string(),
            Self::Url => "URL".into(),
            Self::Infinity => "Infinity".into(),
        }
    }

    fn check(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => is_integer(*n),
            (Self::Number, Value::Number(n)) => !n.is_nan(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Null, Value::Null) => true,
            (Self::Undefined, Value::Undefined) => true,
            (Self::Date, Value::Date(_)) => true,
            (Self::Buffer, Value::Buffer(_)) => true,
            (Self::TypedArray(kind), Value::TypedArray(array)) => array.kind == kind,
            // A Buffer is a Uint8Array on the host.
            (Self::TypedArray(TypedArrayKind::Uint8Array), Value::Buffer(_)) => true,
            (Self::Url, Value::Url(_)) => true,
            (Self::Infinity, Value::Number(n)) => *n == f64::INFINITY,
            _ => false,
        }
    }

    fn encode(self, value: &Value) -> Option<Json> {
        Some(match (self, value) {
            (Self::String, Value::String(s)) => Json::String(s.clone()),
            (Self::Integer | Self::Number, Value::Number(n)) => encode_number(*n),
            (Self::Boolean, Value::Bool(b)) => Json::Bool(*b),
            (Self::Null | Self::Undefined | Self::Infinity, _) => Json::Null,
            (Self::Date, Value::Date(ms)) => Json::from(*ms),
            (Self::Buffer | Self::TypedArray(_), Value::Buffer(bytes)) => {
                Json::Array(bytes.iter().map(|b| Json::from(*b)).collect())
            }
            (Self::TypedArray(_), Value::TypedArray(array)) => {
                Json::Array(array.elements.iter().map(|n| number_to_json(*n)).collect())
            }
            (Self::Url, Value::Url(url)) => Json::String(url.as_str().to_string()),
            _ => return None,
        })
    }

    fn decode(self, name: &str, payload: &Json) -> MarshalResult<Value> {
        let malformed = |reason: &str| MarshalError::malformed(name, reason);
        match self {
            Self::String => payload
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| malformed("expected a string")),
            Self::Integer => match decode_number(payload) {
                Some(n) if is_integer(n) => Ok(Value::Number(n)),
                _ => Err(malformed("expected an integer")),
            },
            Self::Number => decode_number(payload)
                .map(Value::Number)
                .ok_or_else(|| malformed("expected a number")),
            Self::Boolean => payload
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| malformed("expected a boolean")),
            Self::Null => Ok(Value::Null),
            Self::Undefined => Ok(Value::Undefined),
            Self::Infinity => Ok(Value::Number(f64::INFINITY)),
            Self::Date => payload
                .as_i64()
                .or_else(|| payload.as_f64().map(|ms| ms.trunc() as i64))
                .map(Value::Date)
                .ok_or_else(|| malformed("expected epoch milliseconds")),
            Self::Buffer => decode_bytes(payload)
                .map(Value::Buffer)
                .ok_or_else(|| malformed("expected an array of bytes")),
            Self::TypedArray(kind) => {
                let items = payload.as_array().ok_or_else(|| malformed("expected an array"))?;
                let elements = items
                    .iter()
                    .map(decode_number)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| malformed("expected numeric elements"))?;
                Ok(Value::TypedArray(TypedArray::new(kind, elements)))
            }
            Self::Url => {
                let href = payload.as_str().ok_or_else(|| malformed("expected an href"))?;
                Url::parse(href)
                    .map(Value::Url)
                    .map_err(|e| malformed(&format!("invalid URL {href:?}: {e}")))
            }
        }
    }
}

fn encode_number(n: f64) -> Json {
    if n == f64::INFINITY {
        Json::String("Infinity".into())
    } else if n == f64::NEG_INFINITY {
        Json::String("-Infinity".into())
    } else {
        number_to_json(n)
    }
}

fn decode_number(payload: &Json) -> Option<f64> {
    match payload {
        Json::Number(n) => n.as_f64(),
        Json::String(s) if s == "Infinity" => Some(f64::INFINITY),
        Json::String(s) if s == "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn decode_bytes(payload: &Json) -> Option<Vec<u8>> {
    payload
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

enum Kind {
    Primitive(Primitive),
    Union {
        members: Vec<TypeDef>,
        dispatch: HashMap<String, usize>,
    },
    Tuple(Vec<TypeDef>),
    Array(TypeDef),
    Object(Vec<(String, TypeDef)>),
    MapOf {
        key: TypeDef,
        value: TypeDef,
    },
}

struct Node {
    name: String,
    kind: Kind,
}

/// A type descriptor. Cheap to clone; members are shared.
#[derive(Clone)]
pub struct TypeDef(Arc<Node>);

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDef").field(&self.name()).finish()
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TypeDef {
    fn new(name: String, kind: Kind) -> Self {
        Self(Arc::new(Node { name, kind }))
    }

    // ===== Primitives =====

    pub fn primitive(p: Primitive) -> Self {
        Self::new(p.name(), Kind::Primitive(p))
    }

    pub fn string() -> Self {
        Self::primitive(Primitive::String)
    }

    pub fn integer() -> Self {
        Self::primitive(Primitive::Integer)
    }

    pub fn number() -> Self {
        Self::primitive(Primitive::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(Primitive::Boolean)
    }

    pub fn null() -> Self {
        Self::primitive(Primitive::Null)
    }

    pub fn undefined() -> Self {
        Self::primitive(Primitive::Undefined)
    }

    pub fn date() -> Self {
        Self::primitive(Primitive::Date)
    }

    pub fn buffer() -> Self {
        Self::primitive(Primitive::Buffer)
    }

    pub fn typed_array(kind: TypedArrayKind) -> Self {
        Self::primitive(Primitive::TypedArray(kind))
    }

    pub fn url() -> Self {
        Self::primitive(Primitive::Url)
    }

    pub fn infinity() -> Self {
        Self::primitive(Primitive::Infinity)
    }

    // ===== Combinators =====

    /// Union of `members`.
    ///
    /// # Panics
    ///
    /// Panics when two members expose the same wire tag. Schemas are static
    /// definitions, so this fires at startup; use [`TypeDef::try_union`] to
    /// handle it instead.
    pub fn union(members: impl IntoIterator<Item = TypeDef>) -> Self {
        match Self::try_union(members) {
            Ok(def) => def,
            Err(e) => panic!("invalid union schema: {e}"),
        }
    }

    /// Union of `members`, rejecting duplicate wire tags.
    pub fn try_union(members: impl IntoIterator<Item = TypeDef>) -> Result<Self, SchemaError> {
        let members: Vec<TypeDef> = members.into_iter().collect();
        if members.is_empty() {
            return Err(SchemaError::EmptyUnion);
        }
        let name = members
            .iter()
            .map(TypeDef::name)
            .collect::<Vec<_>>()
            .join(" | ");

        let mut dispatch = HashMap::new();
        for (index, member) in members.iter().enumerate() {
            for tag in member.wire_tags() {
                if dispatch.insert(tag.to_string(), index).is_some() {
                    return Err(SchemaError::DuplicateTag {
                        union: name,
                        tag: tag.to_string(),
                    });
                }
            }
        }
        Ok(Self::new(name, Kind::Union { members, dispatch }))
    }

    /// `union(inner, undefined)`.
    pub fn maybe(inner: TypeDef) -> Self {
        Self::union([inner, Self::undefined()])
    }

    pub fn tuple(members: impl IntoIterator<Item = TypeDef>) -> Self {
        let members: Vec<TypeDef> = members.into_iter().collect();
        let name = format!(
            "[{}]",
            members.iter().map(TypeDef::name).collect::<Vec<_>>().join(", ")
        );
        Self::new(name, Kind::Tuple(members))
    }

    pub fn array(element: TypeDef) -> Self {
        Self::new(format!("Array<{}>", element.name()), Kind::Array(element))
    }

    /// Object whose declared fields are all required.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeDef)>) -> Self {
        let fields: Vec<(String, TypeDef)> =
            fields.into_iter().map(|(k, d)| (k.into(), d)).collect();
        let body = fields
            .iter()
            .map(|(k, d)| format!("{k}: {}", d.name()))
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(format!("Object {{ {body} }}"), Kind::Object(fields))
    }

    /// Object whose declared fields are all optional.
    pub fn shape<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeDef)>) -> Self {
        Self::object(fields.into_iter().map(|(k, d)| (k, Self::maybe(d))))
    }

    /// Dictionary with arbitrary string keys.
    pub fn map_of(key: TypeDef, value: TypeDef) -> Self {
        let name = format!("Object {{ [{}]: {} }}", key.name(), value.name());
        Self::new(name, Kind::MapOf { key, value })
    }

    // ===== Operations =====

    /// Wire tag.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Tags an envelope produced through this descriptor may carry.
    pub fn wire_tags(&self) -> Vec<&str> {
        match &self.0.kind {
            Kind::Union { dispatch, .. } => dispatch.keys().map(String::as_str).collect(),
            _ => vec![self.name()],
        }
    }

    /// Members of a union, in declaration order.
    pub fn union_members(&self) -> Option<&[TypeDef]> {
        match &self.0.kind {
            Kind::Union { members, .. } => Some(members),
            _ => None,
        }
    }

    pub fn check(&self, value: &Value) -> bool {
        match &self.0.kind {
            Kind::Primitive(p) => p.check(value),
            Kind::Union { members, .. } => members.iter().any(|m| m.check(value)),
            Kind::Tuple(members) => {
                matches!(value, Value::Array(_))
                    && members
                        .iter()
                        .enumerate()
                        .all(|(i, m)| m.check(value.at(i)))
            }
            Kind::Array(element) => match value {
                Value::Array(items) => items.iter().all(|item| element.check(item)),
                _ => false,
            },
            Kind::Object(fields) => {
                matches!(value, Value::Object(_))
                    && fields.iter().all(|(k, d)| d.check(value.field(k)))
            }
            Kind::MapOf { key, value: v } => match value {
                Value::Object(entries) => entries
                    .iter()
                    .all(|(k, item)| key.check(&Value::String(k.clone())) && v.check(item)),
                _ => false,
            },
        }
    }

    pub fn serialize(&self, value: &Value) -> MarshalResult<Envelope> {
        let mismatch = || MarshalError::mismatch(self.name(), value);
        match &self.0.kind {
            Kind::Primitive(p) => {
                if !p.check(value) {
                    return Err(mismatch());
                }
                let payload = p.encode(value).ok_or_else(mismatch)?;
                Ok(Envelope::new(self.name(), payload))
            }
            Kind::Union { members, .. } => {
                // Last accepting member wins.
                let chosen = members.iter().rev().find(|m| m.check(value));
                chosen.ok_or_else(mismatch)?.serialize(value)
            }
            Kind::Tuple(members) => {
                let Value::Array(items) = value else {
                    return Err(mismatch());
                };
                if !self.check(value) {
                    return Err(mismatch());
                }
                let payload = items
                    .iter()
                    .zip(members)
                    .map(|(item, m)| m.serialize(item).map(Envelope::into_json))
                    .collect::<MarshalResult<Vec<_>>>()?;
                Ok(Envelope::new(self.name(), Json::Array(payload)))
            }
            Kind::Array(element) => {
                let Value::Array(items) = value else {
                    return Err(mismatch());
                };
                let payload = items
                    .iter()
                    .map(|item| element.serialize(item).map(Envelope::into_json))
                    .collect::<MarshalResult<Vec<_>>>()?;
                Ok(Envelope::new(self.name(), Json::Array(payload)))
            }
            Kind::Object(fields) => {
                if !matches!(value, Value::Object(_)) {
                    return Err(mismatch());
                }
                let mut payload = Map::with_capacity(fields.len());
                for (k, d) in fields {
                    payload.insert(k.clone(), d.serialize(value.field(k))?.into_json());
                }
                Ok(Envelope::new(self.name(), Json::Object(payload)))
            }
            Kind::MapOf { key, value: v } => {
                let Value::Object(entries) = value else {
                    return Err(mismatch());
                };
                let payload = entries
                    .iter()
                    .map(|(k, item)| {
                        let mut record = Map::with_capacity(2);
                        record.insert(
                            "key".to_string(),
                            key.serialize(&Value::String(k.clone()))?.into_json(),
                        );
                        record.insert("value".to_string(), v.serialize(item)?.into_json());
                        Ok(Json::Object(record))
                    })
                    .collect::<MarshalResult<Vec<_>>>()?;
                Ok(Envelope::new(self.name(), Json::Array(payload)))
            }
        }
    }

    pub fn deserialize(&self, envelope: &Envelope) -> MarshalResult<Value> {
        if let Kind::Union { members, dispatch } = &self.0.kind {
            let index = dispatch.get(&envelope.tag).ok_or_else(|| MarshalError::UnknownTag {
                expected: self.name().to_string(),
                tag: envelope.tag.clone(),
            })?;
            return members[*index].deserialize(envelope);
        }

        if envelope.tag != self.name() {
            return Err(MarshalError::UnknownTag {
                expected: self.name().to_string(),
                tag: envelope.tag.clone(),
            });
        }

        let payload = &envelope.value;
        match &self.0.kind {
            Kind::Primitive(p) => p.decode(self.name(), payload),
            Kind::Union { .. } => unreachable!("unions dispatch above"),
            Kind::Tuple(members) => {
                let items = self.payload_array(payload)?;
                if items.len() > members.len() {
                    return Err(MarshalError::malformed(
                        self.name(),
                        format!("{} elements for arity {}", items.len(), members.len()),
                    ));
                }
                let values = items
                    .iter()
                    .zip(members)
                    .map(|(item, m)| m.deserialize(&Envelope::from_json(item)?))
                    .collect::<MarshalResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Kind::Array(element) => {
                let values = self
                    .payload_array(payload)?
                    .iter()
                    .map(|item| element.deserialize(&Envelope::from_json(item)?))
                    .collect::<MarshalResult<Vec<_>>>()?;
                Ok(Value::Array(values))
            }
            Kind::Object(fields) => {
                let Json::Object(map) = payload else {
                    return Err(MarshalError::malformed(self.name(), "expected a field map"));
                };
                let mut out = Fields::with_capacity(fields.len());
                for (k, d) in fields {
                    let field = map.get(k).ok_or_else(|| {
                        MarshalError::malformed(self.name(), format!("missing field {k:?}"))
                    })?;
                    let value = d.deserialize(&Envelope::from_json(field)?)?;
                    if !value.is_undefined() {
                        out.insert(k.clone(), value);
                    }
                }
                Ok(Value::Object(out))
            }
            Kind::MapOf { key, value: v } => {
                let mut out = Fields::new();
                for record in self.payload_array(payload)? {
                    let (Some(k), Some(item)) = (record.get("key"), record.get("value")) else {
                        return Err(MarshalError::malformed(
                            self.name(),
                            format!("expected a {{key, value}} record, got {record}"),
                        ));
                    };
                    let Value::String(k) = key.deserialize(&Envelope::from_json(k)?)? else {
                        return Err(MarshalError::malformed(self.name(), "map keys must be strings"));
                    };
                    out.insert(k, v.deserialize(&Envelope::from_json(item)?)?);
                }
                Ok(Value::Object(out))
            }
        }
    }

    fn payload_array<'a>(&self, payload: &'a Json) -> MarshalResult<&'a Vec<Json>> {
        payload
            .as_array()
            .ok_or_else(|| MarshalError::malformed(self.name(), "expected an array"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(def: &TypeDef, value: Value) {
        assert!(def.check(&value), "{def} should accept {value}");
        let envelope = def.serialize(&value).unwrap();
        // Through text too, the way it crosses the channel.
        let text = serde_json::to_string(&envelope.clone().into_json()).unwrap();
        let reparsed = Envelope::from_json(&serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(reparsed, envelope);
        assert_eq!(def.deserialize(&envelope).unwrap(), value, "round trip through {def}");
    }

    #[test]
    fn test_primitive_names() {
        assert_eq!(TypeDef::string().name(), "string");
        assert_eq!(TypeDef::date().name(), "Date");
        assert_eq!(TypeDef::url().name(), "URL");
        assert_eq!(TypeDef::buffer().name(), "Buffer");
        assert_eq!(
            TypeDef::typed_array(TypedArrayKind::Float32Array).name(),
            "Float32Array"
        );
    }

    #[test]
    fn test_primitive_round_trips() {
        round_trip(&TypeDef::string(), Value::from("héllo"));
        round_trip(&TypeDef::integer(), Value::from(-42));
        round_trip(&TypeDef::number(), Value::Number(1.25));
        round_trip(&TypeDef::number(), Value::Number(f64::INFINITY));
        round_trip(&TypeDef::number(), Value::Number(f64::NEG_INFINITY));
        round_trip(&TypeDef::boolean(), Value::Bool(true));
        round_trip(&TypeDef::null(), Value::Null);
        round_trip(&TypeDef::undefined(), Value::Undefined);
        round_trip(&TypeDef::date(), Value::Date(1_700_000_000_123));
        round_trip(&TypeDef::buffer(), Value::buffer(vec![0u8, 127, 255]));
        round_trip(
            &TypeDef::typed_array(TypedArrayKind::Int32Array),
            Value::from(TypedArray::new(TypedArrayKind::Int32Array, [-1.0, 7.0])),
        );
        round_trip(
            &TypeDef::url(),
            Value::Url(Url::parse("file:///tmp/a%20b").unwrap()),
        );
        round_trip(&TypeDef::infinity(), Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_primitive_checks() {
        assert!(TypeDef::integer().check(&Value::from(3)));
        assert!(!TypeDef::integer().check(&Value::Number(3.5)));
        assert!(!TypeDef::number().check(&Value::Number(f64::NAN)));
        assert!(TypeDef::number().check(&Value::from(3)));
        assert!(!TypeDef::string().check(&Value::Undefined));
        assert!(!TypeDef::buffer().check(&Value::from(TypedArray::new(
            TypedArrayKind::Uint8Array,
            [1.0]
        ))));
        assert!(TypeDef::typed_array(TypedArrayKind::Uint8Array).check(&Value::buffer(vec![1u8])));
        assert!(!TypeDef::typed_array(TypedArrayKind::Int8Array).check(&Value::buffer(vec![1u8])));
    }

    #[test]
    fn test_wire_encodings() {
        let env = TypeDef::buffer().serialize(&Value::buffer(vec![1u8, 2])).unwrap();
        assert_eq!(env.into_json(), json!({"type": "Buffer", "value": [1, 2]}));

        let env = TypeDef::date().serialize(&Value::Date(86_400_000)).unwrap();
        assert_eq!(env.value, json!(86_400_000));

        let url = Url::parse("https://example.com/x").unwrap();
        let env = TypeDef::url().serialize(&Value::Url(url)).unwrap();
        assert_eq!(env.value, json!("https://example.com/x"));
    }

    #[test]
    fn test_serialize_rejects_wrong_type() {
        let err = TypeDef::integer().serialize(&Value::from("x")).unwrap_err();
        assert_eq!(err.to_string(), "Expected integer, but received: x");
    }

    #[test]
    fn test_union_last_match_wins() {
        let a = TypeDef::number();
        let b = TypeDef::integer();
        let value = Value::from(3);
        assert!(a.check(&value) && b.check(&value));

        let union = TypeDef::union([a.clone(), b.clone()]);
        assert_eq!(union.serialize(&value).unwrap(), b.serialize(&value).unwrap());

        let reversed = TypeDef::union([b, a.clone()]);
        assert_eq!(reversed.serialize(&value).unwrap(), a.serialize(&value).unwrap());
    }

    #[test]
    fn test_buffer_serializes_as_later_uint8array() {
        let def = TypeDef::union([
            TypeDef::buffer(),
            TypeDef::typed_array(TypedArrayKind::Uint8Array),
            TypeDef::string(),
        ]);
        let env = def.serialize(&Value::buffer(vec![9u8])).unwrap();
        assert_eq!(env.tag, "Uint8Array");
        assert_eq!(
            def.deserialize(&env).unwrap(),
            Value::from(TypedArray::new(TypedArrayKind::Uint8Array, [9.0]))
        );
    }

    #[test]
    fn test_union_name_and_unknown_tag() {
        let def = TypeDef::union([TypeDef::string(), TypeDef::integer()]);
        assert_eq!(def.name(), "string | integer");
        let err = def.deserialize(&Envelope::new("boolean", json!(true))).unwrap_err();
        assert!(matches!(err, MarshalError::UnknownTag { .. }));
    }

    #[test]
    fn test_duplicate_tags_rejected() {
        let err = TypeDef::try_union([TypeDef::string(), TypeDef::string()]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTag { .. }));

        let nested = TypeDef::union([TypeDef::string(), TypeDef::integer()]);
        assert!(TypeDef::try_union([nested, TypeDef::integer()]).is_err());
        assert_eq!(
            TypeDef::try_union(Vec::new()).unwrap_err(),
            SchemaError::EmptyUnion
        );
    }

    #[test]
    #[should_panic(expected = "duplicate tag")]
    fn test_union_panics_on_duplicates() {
        TypeDef::union([TypeDef::boolean(), TypeDef::boolean()]);
    }

    #[test]
    fn test_nested_union_dispatch() {
        let options = TypeDef::maybe(TypeDef::union([
            TypeDef::integer(),
            TypeDef::shape([("recursive", TypeDef::boolean())]),
        ]));
        round_trip(&options, Value::from(0o755));
        round_trip(&options, Value::object([("recursive", Value::Bool(true))]));
        round_trip(&options, Value::Undefined);
    }

    #[test]
    fn test_maybe() {
        for def in [TypeDef::string(), TypeDef::date(), TypeDef::object([("a", TypeDef::null())])] {
            let maybe = TypeDef::maybe(def);
            assert!(maybe.check(&Value::Undefined));
            assert_eq!(maybe.serialize(&Value::Undefined).unwrap().tag, "undefined");
        }
    }

    #[test]
    fn test_tuple_ignores_trailing_elements() {
        let def = TypeDef::tuple([TypeDef::string(), TypeDef::integer()]);
        assert_eq!(def.name(), "[string, integer]");
        assert!(def.check(&Value::array([Value::from("a"), Value::from(1), Value::from("extra")])));
        assert!(!def.check(&Value::array([Value::from("a")])));
        assert!(!def.check(&Value::from("a")));
        round_trip(&def, Value::array([Value::from("a"), Value::from(1)]));
    }

    #[test]
    fn test_tuple_rejects_long_payload() {
        let def = TypeDef::tuple([TypeDef::string()]);
        let inner = TypeDef::string().serialize(&Value::from("a")).unwrap().into_json();
        let env = Envelope::new(def.name(), json!([inner.clone(), inner]));
        assert!(matches!(
            def.deserialize(&env),
            Err(MarshalError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_shape_and_object() {
        let shape = TypeDef::shape([("a", TypeDef::integer())]);
        let object = TypeDef::object([("a", TypeDef::integer())]);
        let empty = Value::object(Vec::<(String, Value)>::new());
        assert!(shape.check(&empty));
        assert!(!object.check(&empty));
        assert!(!shape.check(&Value::Null));
        assert_eq!(object.name(), "Object { a: integer }");
        assert_eq!(shape.name(), "Object { a: integer | undefined }");
        round_trip(&shape, empty);
        round_trip(&object, Value::object([("a", Value::from(1))]));
    }

    #[test]
    fn test_object_drops_undeclared_fields() {
        let def = TypeDef::object([("a", TypeDef::integer())]);
        let value = Value::object([("a", Value::from(1)), ("b", Value::from("x"))]);
        let env = def.serialize(&value).unwrap();
        assert_eq!(
            def.deserialize(&env).unwrap(),
            Value::object([("a", Value::from(1))])
        );
    }

    #[test]
    fn test_array() {
        let def = TypeDef::array(TypeDef::string());
        assert_eq!(def.name(), "Array<string>");
        round_trip(&def, Value::array([Value::from("a"), Value::from("b")]));
        round_trip(&def, Value::array([]));
        assert!(!def.check(&Value::array([Value::from(1)])));
    }

    #[test]
    fn test_map_of_records() {
        let def = TypeDef::map_of(TypeDef::string(), TypeDef::integer());
        assert_eq!(def.name(), "Object { [string]: integer }");
        let value = Value::object([("x", Value::from(1)), ("y", Value::from(2))]);
        let env = def.serialize(&value).unwrap();
        assert_eq!(
            env.value[0],
            json!({
                "key": {"type": "string", "value": "x"},
                "value": {"type": "integer", "value": 1},
            })
        );
        assert_eq!(def.deserialize(&env).unwrap(), value);
    }

    #[test]
    fn test_map_of_rejects_positional_records() {
        let def = TypeDef::map_of(TypeDef::string(), TypeDef::integer());
        let env = Envelope::new(
            def.name(),
            json!([[{"type": "string", "value": "x"}, {"type": "integer", "value": 1}]]),
        );
        assert!(matches!(
            def.deserialize(&env),
            Err(MarshalError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_primitive_tag_mismatch_is_desync() {
        let env = Envelope::new("string", json!(1));
        assert!(matches!(
            TypeDef::integer().deserialize(&env),
            Err(MarshalError::UnknownTag { .. })
        ));
        let env = Envelope::new("integer", json!(1.5));
        assert!(matches!(
            TypeDef::integer().deserialize(&env),
            Err(MarshalError::MalformedPayload { .. })
        ));
    }
}
