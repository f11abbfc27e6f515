//! Values carried by flex fields and by dynamic dispatch.
//!
//! Field values are plain JSON values. Stored data normally holds strings or
//! nulls, but anything an out-of-band writer put into the column is carried
//! through unchanged.

use super::error::{FlexError, Result};

pub use serde_json::Value;

/// Checks the argument count of a dynamically dispatched call.
pub fn expect_arity(method: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(FlexError::ArgumentCount {
            method: method.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Takes the only argument of a setter-style call.
pub fn single_arg(method: &str, mut args: Vec<Value>) -> Result<Value> {
    expect_arity(method, &args, 1)?;
    Ok(args.pop().unwrap_or(Value::Null))
}

/// Converts a dispatched value into a raw string attribute.
pub fn value_to_raw(method: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        other => Err(FlexError::InvalidArgument {
            method: method.to_string(),
            reason: format!("expected a string or null, got {}", type_label(&other)),
        }),
    }
}

pub fn raw_to_value(raw: Option<&str>) -> Value {
    raw.map(|text| Value::String(text.to_string()))
        .unwrap_or(Value::Null)
}

pub fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_arg_rejects_wrong_arity() {
        let err = single_arg("set_foo", vec![]).unwrap_err();
        assert_eq!(
            err,
            FlexError::ArgumentCount {
                method: "set_foo".to_string(),
                expected: 1,
                actual: 0,
            }
        );
        assert_eq!(single_arg("set_foo", vec![json!("x")]).unwrap(), json!("x"));
    }

    #[test]
    fn raw_conversion_accepts_only_strings_and_null() {
        assert_eq!(value_to_raw("set_name", json!("a")).unwrap(), Some("a".to_string()));
        assert_eq!(value_to_raw("set_name", Value::Null).unwrap(), None);
        assert!(matches!(
            value_to_raw("set_name", json!(12)),
            Err(FlexError::InvalidArgument { .. })
        ));
        assert_eq!(raw_to_value(Some("a")), json!("a"));
        assert_eq!(raw_to_value(None), Value::Null);
    }
}
