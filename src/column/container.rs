use crate::column::definition::{FlexColumnDefinition, UnknownFieldPolicy};
use crate::core::naming::SETTER_PREFIX;
use crate::core::value::{expect_arity, single_arg, type_label};
use crate::core::{FlexError, Result, Value};
use serde_json::Map;
use std::sync::Arc;
use tracing::{Level, event};

/// Deserialized contents of one flex column on one record.
///
/// Values are keyed by storage key in stored order. Keys that are not
/// declared fields are carried along so nothing written by another schema
/// is lost, but they are not readable through this API.
#[derive(Debug, Clone)]
pub struct FieldContainer {
    definition: Arc<FlexColumnDefinition>,
    values: Map<String, Value>,
    dirty: bool,
}

impl FieldContainer {
    /// An empty container, as loaded from a null column.
    pub fn new(definition: Arc<FlexColumnDefinition>) -> Self {
        Self {
            definition,
            values: Map::new(),
            dirty: false,
        }
    }

    /// Parses the stored representation of the column.
    ///
    /// `None`, empty and whitespace-only input load as an empty container.
    /// Anything else must be a JSON object.
    pub fn load(definition: Arc<FlexColumnDefinition>, raw: Option<&str>) -> Result<Self> {
        let column = definition.column_name().to_string();
        let text = raw.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Ok(Self::new(definition));
        }

        let parsed: Value = serde_json::from_str(text)
            .map_err(|err| FlexError::malformed(&column, err.to_string()))?;
        let values = match parsed {
            Value::Object(values) => values,
            other => {
                return Err(FlexError::malformed(
                    &column,
                    format!("expected a JSON object, found {}", type_label(&other)),
                ));
            }
        };

        let mut container = Self {
            definition,
            values,
            dirty: false,
        };
        if container.definition.unknown_field_policy() == UnknownFieldPolicy::Delete
            && container.unknown_key_count() > 0
        {
            container.dirty = true;
        }

        event!(
            Level::DEBUG,
            column = %column,
            keys = container.values.len(),
            "flex column loaded"
        );
        Ok(container)
    }

    pub fn definition(&self) -> &FlexColumnDefinition {
        &self.definition
    }

    pub fn column_name(&self) -> &str {
        self.definition.column_name()
    }

    /// Current value of a declared field; `None` when unset or null.
    pub fn get(&self, field: &str) -> Result<Option<&Value>> {
        let key = self.storage_key(field)?;
        Ok(self.values.get(key).filter(|value| !value.is_null()))
    }

    /// Writes a declared field and returns the written value.
    ///
    /// Writing null removes the key from storage. The container becomes dirty
    /// only when the stored value actually changes.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        let key = self.storage_key(field)?.to_string();

        let changed = if value.is_null() {
            self.values.shift_remove(&key).is_some()
        } else if self.values.get(&key) == Some(&value) {
            false
        } else {
            self.values.insert(key, value.clone());
            true
        };

        if changed {
            self.dirty = true;
        }
        Ok(value)
    }

    /// True when the declared field holds a non-null value.
    pub fn contains(&self, field: &str) -> bool {
        matches!(self.get(field), Ok(Some(_)))
    }

    /// Set declared fields, in declaration order.
    pub fn declared_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.definition.field_definitions().iter().filter_map(|field| {
            self.values
                .get(field.storage_key())
                .filter(|value| !value.is_null())
                .map(|value| (field.name(), value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.declared_values().next().is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Declared fields as a JSON object keyed by field name.
    pub fn to_json(&self) -> Value {
        let object = self
            .declared_values()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<Map<String, Value>>();
        Value::Object(object)
    }

    /// Produces the stored representation of the column.
    pub fn serialize(&self) -> Result<String> {
        let text = match self.definition.unknown_field_policy() {
            UnknownFieldPolicy::Preserve => serde_json::to_string(&self.values)?,
            UnknownFieldPolicy::Delete => {
                let declared = self
                    .values
                    .iter()
                    .filter(|(key, _)| self.definition.find_by_storage_key(key).is_some())
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect::<Map<String, Value>>();
                serde_json::to_string(&declared)?
            }
        };

        if let Some(limit) = self.definition.max_length() {
            if text.len() > limit {
                return Err(FlexError::ColumnTooLong {
                    column: self.column_name().to_string(),
                    length: text.len(),
                    limit,
                });
            }
        }
        Ok(text)
    }

    /// Read-only dispatch on the container: field getters and derived methods.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        if self.definition.is_declared(method) {
            expect_arity(method, &args, 0)?;
            return Ok(self.get(method)?.cloned().unwrap_or(Value::Null));
        }

        if let Some(derived) = self.definition.derived_method(method) {
            expect_arity(method, &args, 0)?;
            return derived.call(self);
        }

        Err(FlexError::method_not_found(self.column_name(), method))
    }

    /// Full dispatch: everything [`call`](Self::call) answers plus `set_field`.
    pub fn call_mut(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        if !self.definition.is_declared(method) {
            if let Some(field) = method.strip_prefix(SETTER_PREFIX) {
                if self.definition.is_declared(field) {
                    let value = single_arg(method, args)?;
                    return self.set(field, value);
                }
            }
        }
        self.call(method, args)
    }

    pub fn responds_to(&self, method: &str) -> bool {
        if self.definition.is_declared(method) || self.definition.derived_method(method).is_some() {
            return true;
        }
        method
            .strip_prefix(SETTER_PREFIX)
            .is_some_and(|field| self.definition.is_declared(field))
    }

    fn storage_key(&self, field: &str) -> Result<&str> {
        self.definition
            .find_field(field)
            .map(|definition| definition.storage_key())
            .ok_or_else(|| FlexError::UndeclaredField {
                column: self.column_name().to_string(),
                field: field.to_string(),
            })
    }

    fn unknown_key_count(&self) -> usize {
        self.values
            .keys()
            .filter(|key| self.definition.find_by_storage_key(key).is_none())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::definition::FieldDefinition;
    use serde_json::json;

    fn definition() -> Arc<FlexColumnDefinition> {
        Arc::new(FlexColumnDefinition::new("user_attributes").fields(["foo", "bar"]))
    }

    #[test]
    fn empty_input_loads_empty_container() {
        for raw in [None, Some(""), Some("   ")] {
            let container = FieldContainer::load(definition(), raw).unwrap();
            assert!(container.is_empty());
            assert!(!container.is_dirty());
            assert_eq!(container.get("foo").unwrap(), None);
        }
    }

    #[test]
    fn malformed_input_is_reported() {
        let err = FieldContainer::load(definition(), Some("{not json")).unwrap_err();
        assert!(matches!(err, FlexError::MalformedColumnData { ref column, .. } if column == "user_attributes"));

        let err = FieldContainer::load(definition(), Some("[1, 2]")).unwrap_err();
        assert_eq!(
            err,
            FlexError::MalformedColumnData {
                column: "user_attributes".to_string(),
                reason: "expected a JSON object, found array".to_string(),
            }
        );
    }

    #[test]
    fn set_returns_written_value_and_marks_dirty() {
        let mut container = FieldContainer::new(definition());
        assert_eq!(container.set("foo", "x").unwrap(), json!("x"));
        assert!(container.is_dirty());
        assert_eq!(container.get("foo").unwrap(), Some(&json!("x")));

        container.mark_clean();
        container.set("foo", "x").unwrap();
        assert!(!container.is_dirty());
    }

    #[test]
    fn undeclared_fields_are_refused() {
        let mut container = FieldContainer::new(definition());
        assert_eq!(
            container.set("baz", "x"),
            Err(FlexError::UndeclaredField {
                column: "user_attributes".to_string(),
                field: "baz".to_string(),
            })
        );
        assert!(container.get("baz").is_err());
    }

    #[test]
    fn unknown_keys_survive_and_keep_their_order() {
        let raw = r#"{"legacy":1,"foo":"a","other":{"deep":true}}"#;
        let mut container = FieldContainer::load(definition(), Some(raw)).unwrap();

        container.set("foo", "b").unwrap();
        container.set("bar", "c").unwrap();

        assert_eq!(
            container.serialize().unwrap(),
            r#"{"legacy":1,"foo":"b","other":{"deep":true},"bar":"c"}"#
        );
        assert!(container.get("legacy").is_err());
        assert_eq!(container.to_json(), json!({"foo": "b", "bar": "c"}));
    }

    #[test]
    fn unknown_keys_can_be_dropped() {
        let definition = Arc::new(
            FlexColumnDefinition::new("user_attributes")
                .field("foo")
                .unknown_fields(UnknownFieldPolicy::Delete),
        );
        let container =
            FieldContainer::load(definition, Some(r#"{"legacy":1,"foo":"a"}"#)).unwrap();
        assert!(container.is_dirty());
        assert_eq!(container.serialize().unwrap(), r#"{"foo":"a"}"#);
    }

    #[test]
    fn null_removes_the_key() {
        let mut container =
            FieldContainer::load(definition(), Some(r#"{"foo":"a","bar":"b"}"#)).unwrap();
        assert_eq!(container.set("foo", Value::Null).unwrap(), Value::Null);
        assert_eq!(container.serialize().unwrap(), r#"{"bar":"b"}"#);
        assert!(!container.contains("foo"));
    }

    #[test]
    fn storage_keys_map_to_field_names() {
        let definition = Arc::new(
            FlexColumnDefinition::new("prefs")
                .field_definition(FieldDefinition::new("wants_email").stored_as("we")),
        );
        let mut container = FieldContainer::load(definition, Some(r#"{"we":"yes"}"#)).unwrap();
        assert_eq!(container.get("wants_email").unwrap(), Some(&json!("yes")));
        container.set("wants_email", "no").unwrap();
        assert_eq!(container.serialize().unwrap(), r#"{"we":"no"}"#);
    }

    #[test]
    fn length_limit_is_enforced_on_serialize() {
        let definition = Arc::new(
            FlexColumnDefinition::new("attrs")
                .field("foo")
                .length_limit(16),
        );
        let mut container = FieldContainer::new(definition);
        container.set("foo", "short").unwrap();
        assert_eq!(container.serialize().unwrap().len(), 15);

        container.set("foo", "short1").unwrap();
        assert_eq!(container.serialize().unwrap(), r#"{"foo":"short1"}"#);

        container.set("foo", "short12").unwrap();
        assert_eq!(
            container.serialize(),
            Err(FlexError::ColumnTooLong {
                column: "attrs".to_string(),
                length: 17,
                limit: 16,
            })
        );
    }

    #[test]
    fn call_dispatches_fields_and_derived_methods() {
        let definition = Arc::new(
            FlexColumnDefinition::new("user_attributes")
                .fields(["foo", "bar"])
                .derived("baz", |container| {
                    let foo = container
                        .get("foo")?
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    Ok(Value::String(format!("{}!!", foo)))
                }),
        );
        let mut container = FieldContainer::new(definition);

        assert_eq!(container.call("foo", vec![]).unwrap(), Value::Null);
        assert!(container.call("set_foo", vec![json!("inner")]).unwrap_err().is_no_method());
        assert_eq!(container.call_mut("set_foo", vec![json!("inner")]).unwrap(), json!("inner"));
        assert_eq!(container.call("baz", vec![]).unwrap(), json!("inner!!"));

        container.set("foo", "changed").unwrap();
        assert_eq!(container.call("baz", vec![]).unwrap(), json!("changed!!"));

        assert!(container.responds_to("set_bar"));
        assert!(!container.responds_to("qux"));
        assert!(container.call("qux", vec![]).unwrap_err().is_no_method());
        assert!(container.call_mut("set_qux", vec![json!(1)]).unwrap_err().is_no_method());
        assert!(matches!(
            container.call("foo", vec![json!(1)]),
            Err(FlexError::ArgumentCount { .. })
        ));
    }
}
