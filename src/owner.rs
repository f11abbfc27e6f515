use crate::column::{FieldContainer, FlexColumn};
use crate::core::value::{expect_arity, single_arg, value_to_raw};
use crate::core::{FlexError, Result, Value};
use crate::delegation::{AccessorKind, Visibility};
use crate::schema::{Binding, FlexSchema, Target};
use std::sync::Arc;
use tracing::{Level, event};

/// How a dynamically dispatched call reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPath {
    /// Ordinary external call; private accessors are refused.
    Public,
    /// Call from inside the owning type; private accessors are allowed.
    Internal,
}

/// A record that owns one or more flex columns.
///
/// Implemented by [`FlexRecord`](crate::FlexRecord) and by structs deriving
/// `FlexColumns`. Implementors expose their schema and column slots; every
/// other method is provided.
pub trait FlexOwner {
    fn flex_schema(&self) -> &FlexSchema;

    fn flex_slot(&self, column: &str) -> Result<&FlexColumn>;

    fn flex_slot_mut(&mut self, column: &str) -> Result<&mut FlexColumn>;

    /// Serves owner-level attributes and methods found by dispatch.
    fn dispatch_owner(&mut self, method: &str, _binding: Binding, _args: Vec<Value>) -> Result<Value> {
        Err(FlexError::method_not_found(self.flex_schema().type_name(), method))
    }

    /// Contents of a flex column, loaded on first access.
    fn flex(&self, column: &str) -> Result<&FieldContainer> {
        let definition = self.flex_schema().require_column(column)?;
        self.flex_slot(column)?.contents(definition)
    }

    fn flex_mut(&mut self, column: &str) -> Result<&mut FieldContainer> {
        let definition = Arc::clone(self.flex_schema().require_column(column)?);
        self.flex_slot_mut(column)?.contents_mut(&definition)
    }

    fn read_field(&self, column: &str, field: &str) -> Result<Option<Value>> {
        Ok(self.flex(column)?.get(field)?.cloned())
    }

    fn write_field(&mut self, column: &str, field: &str, value: Value) -> Result<Value> {
        self.flex_mut(column)?.set(field, value)
    }

    fn respond_to(&self, method: &str) -> bool {
        self.flex_schema().responds_to(method)
    }

    /// Internal dispatch: reaches private accessors too.
    fn send(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.dispatch(method, args, CallPath::Internal)
    }

    /// Ordinary external call by name.
    fn public_send(&mut self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.dispatch(method, args, CallPath::Public)
    }

    fn dispatch(&mut self, method: &str, args: Vec<Value>, path: CallPath) -> Result<Value> {
        let schema = self.flex_schema();
        let Some(binding) = schema.lookup(method) else {
            return Err(FlexError::method_not_found(schema.type_name(), method));
        };

        if path == CallPath::Public && binding.visibility() == Visibility::Private {
            event!(
                Level::DEBUG,
                owner = %schema.type_name(),
                method = %method,
                "private accessor refused on public call path"
            );
            return Err(FlexError::MethodNotAccessible {
                owner: schema.type_name().to_string(),
                method: method.to_string(),
            });
        }

        match binding.target() {
            Target::Accessor(index) => {
                let accessor = &schema.accessors()[index];
                let (column, field) = (accessor.column().to_string(), accessor.field().to_string());
                match binding.kind() {
                    AccessorKind::Getter => {
                        expect_arity(method, &args, 0)?;
                        Ok(self.read_field(&column, &field)?.unwrap_or(Value::Null))
                    }
                    AccessorKind::Setter => {
                        let value = single_arg(method, args)?;
                        self.write_field(&column, &field, value)
                    }
                }
            }
            Target::Column(index) => {
                let column = schema.columns()[index].column_name().to_string();
                match binding.kind() {
                    AccessorKind::Getter => {
                        expect_arity(method, &args, 0)?;
                        Ok(self.flex(&column)?.to_json())
                    }
                    AccessorKind::Setter => {
                        let value = single_arg(method, args)?;
                        let raw = value_to_raw(method, value.clone())?;
                        self.flex_slot_mut(&column)?.replace_raw(raw);
                        Ok(value)
                    }
                }
            }
            Target::Attribute(_) | Target::Method(_) => self.dispatch_owner(method, binding, args),
        }
    }

    /// Writes every dirty column back into its stored value.
    fn sync_flex_columns(&mut self) -> Result<()> {
        let columns = self
            .flex_schema()
            .columns()
            .iter()
            .map(|definition| definition.column_name().to_string())
            .collect::<Vec<_>>();
        for column in columns {
            self.flex_slot_mut(&column)?.sync()?;
        }
        Ok(())
    }
}
