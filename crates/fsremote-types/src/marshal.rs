//! Schema-driven marshaling at the call boundary.
//!
//! Both ends run the same four functions against the same [`MethodSpec`]:
//! the caller validates then serializes arguments, the executor deserializes
//! then re-validates them, and the result takes the mirror path back.

use crate::envelope::Envelope;
use crate::error::{MarshalError, MarshalResult};
use crate::registry::MethodSpec;
use crate::schema::TypeDef;
use crate::value::Value;

/// Fail with a type mismatch unless `def` accepts `value`.
pub fn validate(value: &Value, def: &TypeDef) -> MarshalResult<()> {
    if def.check(value) {
        Ok(())
    } else {
        Err(MarshalError::mismatch(def.name(), value))
    }
}

/// Validate and serialize a positional argument list.
pub fn serialize_args(spec: &MethodSpec, args: &[Value]) -> MarshalResult<Envelope> {
    let args = Value::Array(args.to_vec());
    validate(&args, &spec.args)?;
    spec.args.serialize(&args)
}

/// Deserialize and re-validate a positional argument list.
pub fn deserialize_args(spec: &MethodSpec, envelope: &Envelope) -> MarshalResult<Vec<Value>> {
    let args = spec.args.deserialize(envelope)?;
    validate(&args, &spec.args)?;
    match args {
        Value::Array(items) => Ok(items),
        other => Err(MarshalError::mismatch(spec.args.name(), &other)),
    }
}

/// Validate and serialize a result value.
pub fn serialize_result(spec: &MethodSpec, value: &Value) -> MarshalResult<Envelope> {
    let def = result_schema(spec)?;
    validate(value, def)?;
    def.serialize(value)
}

/// Deserialize and re-validate a result value.
pub fn deserialize_result(spec: &MethodSpec, envelope: &Envelope) -> MarshalResult<Value> {
    let def = result_schema(spec)?;
    let value = def.deserialize(envelope)?;
    validate(&value, def)?;
    Ok(value)
}

fn result_schema(spec: &MethodSpec) -> MarshalResult<&TypeDef> {
    spec.result
        .as_ref()
        .ok_or_else(|| MarshalError::NoResultSchema(spec.name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn test_validate_message() {
        let err = validate(&Value::from("x"), &TypeDef::boolean()).unwrap_err();
        assert_eq!(err.to_string(), "Expected boolean, but received: x");

        let err = validate(
            &Value::object([("a", Value::from(1))]),
            &TypeDef::string(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), r#"Expected string, but received: {"a":1}"#);
    }

    #[test]
    fn test_mkdir_recursive_round_trip() {
        let registry = Registry::standard();
        let spec = registry.get("mkdir").unwrap();
        let args = vec![
            Value::from("/tmp/x"),
            Value::object([("recursive", Value::Bool(true))]),
        ];

        let envelope = serialize_args(spec, &args).unwrap();
        let items = envelope.value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["type"], "string");
        assert_eq!(
            items[1]["type"],
            "Object { recursive: boolean | undefined, mode: integer | undefined }"
        );

        // Crosses the channel as text.
        let text = serde_json::to_string(&envelope).unwrap();
        let received: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(deserialize_args(spec, &received).unwrap(), args);
    }

    #[test]
    fn test_mkdir_without_options_keeps_one_position() {
        let registry = Registry::standard();
        let spec = registry.get("mkdirSync").unwrap();
        let envelope = serialize_args(spec, &[Value::from("/tmp/y")]).unwrap();
        assert_eq!(envelope.value.as_array().map(Vec::len), Some(1));
        assert_eq!(
            deserialize_args(spec, &envelope).unwrap(),
            vec![Value::from("/tmp/y")]
        );
    }

    #[test]
    fn test_invalid_args_rejected_before_serializing() {
        let registry = Registry::standard();
        let spec = registry.get("chmod").unwrap();
        let err = serialize_args(spec, &[Value::from("/a"), Value::Bool(true)]).unwrap_err();
        assert!(err.is_type_mismatch());
        assert!(err.to_string().starts_with("Expected [string | Buffer | URL, string | integer]"));
    }

    #[test]
    fn test_result_round_trip() {
        let registry = Registry::standard();
        let spec = registry.get("readdir").unwrap();
        let listing = Value::array([Value::from("a"), Value::from("b")]);
        let envelope = serialize_result(spec, &listing).unwrap();
        assert_eq!(envelope.tag, "Array<string>");
        assert_eq!(deserialize_result(spec, &envelope).unwrap(), listing);
    }

    #[test]
    fn test_missing_result_schema() {
        let registry = Registry::standard();
        let spec = registry.get("createReadStream").unwrap();
        assert!(matches!(
            serialize_result(spec, &Value::from("127.0.0.1:1")),
            Err(MarshalError::NoResultSchema(_))
        ));
    }
}
