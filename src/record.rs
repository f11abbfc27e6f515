use crate::column::FlexColumn;
use crate::core::value::{expect_arity, raw_to_value, single_arg, value_to_raw};
use crate::core::{FlexError, Result, Value};
use crate::delegation::AccessorKind;
use crate::owner::FlexOwner;
use crate::schema::{Binding, FlexSchema, Target};
use crate::store::{RecordStore, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, event};

/// An owning record whose stored attributes are all strings.
///
/// Plain attributes are read and written as-is. Flex columns keep their raw
/// JSON until first accessed and are serialized back before each save.
///
/// ```
/// use std::sync::Arc;
/// use flexcols::{FlexColumnDefinition, FlexOwner, FlexRecord, FlexSchema};
/// use serde_json::json;
///
/// let schema = FlexSchema::builder("User")
///     .attribute("name")
///     .flex_column(FlexColumnDefinition::new("user_attributes").field("wants_email"))
///     .build()?;
/// let mut user = FlexRecord::new(Arc::new(schema));
///
/// user.public_send("set_wants_email", vec![json!("yes")])?;
/// assert_eq!(user.flex("user_attributes")?.get("wants_email")?, Some(&json!("yes")));
/// # Ok::<(), flexcols::FlexError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlexRecord {
    schema: Arc<FlexSchema>,
    id: Option<u64>,
    attributes: BTreeMap<String, Option<String>>,
    columns: BTreeMap<String, FlexColumn>,
}

impl FlexRecord {
    pub fn new(schema: Arc<FlexSchema>) -> Self {
        let attributes = schema
            .attributes()
            .iter()
            .map(|name| (name.clone(), None))
            .collect();
        let columns = schema
            .columns()
            .iter()
            .map(|definition| (definition.column_name().to_string(), FlexColumn::default()))
            .collect();
        Self {
            schema,
            id: None,
            attributes,
            columns,
        }
    }

    /// Builds a record from a stored row. Columns the schema does not know
    /// are ignored; missing ones load as null.
    pub fn from_row(schema: Arc<FlexSchema>, id: Option<u64>, mut row: Row) -> Self {
        let mut record = Self::new(schema);
        record.id = id;
        for (name, value) in record.attributes.iter_mut() {
            *value = row.remove(name).flatten();
        }
        for (name, slot) in record.columns.iter_mut() {
            *slot = FlexColumn::new(row.remove(name).flatten());
        }
        record
    }

    pub fn find(schema: Arc<FlexSchema>, store: &dyn RecordStore, id: u64) -> Result<Self> {
        let row = store.fetch(id)?;
        Ok(Self::from_row(schema, Some(id), row))
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn schema(&self) -> &Arc<FlexSchema> {
        &self.schema
    }

    /// Raw value of a plain attribute or a flex column's stored JSON.
    ///
    /// For a flex column this is the value as of the last load or sync.
    pub fn attribute(&self, name: &str) -> Result<Option<&str>> {
        if let Some(value) = self.attributes.get(name) {
            return Ok(value.as_deref());
        }
        if let Some(slot) = self.columns.get(name) {
            return Ok(slot.raw());
        }
        Err(self.unknown_attribute(name))
    }

    /// Writes a raw attribute. Writing a flex column's raw value discards its
    /// loaded contents.
    pub fn set_attribute(&mut self, name: &str, value: Option<String>) -> Result<()> {
        if let Some(current) = self.attributes.get_mut(name) {
            *current = value;
            return Ok(());
        }
        if let Some(slot) = self.columns.get_mut(name) {
            slot.replace_raw(value);
            return Ok(());
        }
        Err(self.unknown_attribute(name))
    }

    /// Syncs flex columns and returns the full row to persist.
    pub fn to_row(&mut self) -> Result<Row> {
        self.sync_flex_columns()?;
        let mut row = self.attributes.clone();
        for (name, slot) in &self.columns {
            row.insert(name.clone(), slot.raw().map(str::to_string));
        }
        Ok(row)
    }

    pub fn save(&mut self, store: &dyn RecordStore) -> Result<u64> {
        let row = self.to_row()?;
        let id = match self.id {
            Some(id) => {
                store.update(id, row)?;
                id
            }
            None => {
                let id = store.insert(row)?;
                self.id = Some(id);
                id
            }
        };
        event!(
            Level::DEBUG,
            owner = %self.schema.type_name(),
            table = %store.table_name(),
            id,
            "record saved"
        );
        Ok(id)
    }

    fn unknown_attribute(&self, name: &str) -> FlexError {
        FlexError::UnknownAttribute {
            owner: self.schema.type_name().to_string(),
            attribute: name.to_string(),
        }
    }
}

impl FlexOwner for FlexRecord {
    fn flex_schema(&self) -> &FlexSchema {
        &self.schema
    }

    fn flex_slot(&self, column: &str) -> Result<&FlexColumn> {
        self.columns.get(column).ok_or_else(|| FlexError::UnknownColumn {
            owner: self.schema.type_name().to_string(),
            column: column.to_string(),
        })
    }

    fn flex_slot_mut(&mut self, column: &str) -> Result<&mut FlexColumn> {
        self.columns.get_mut(column).ok_or_else(|| FlexError::UnknownColumn {
            owner: self.schema.type_name().to_string(),
            column: column.to_string(),
        })
    }

    fn dispatch_owner(&mut self, method: &str, binding: Binding, args: Vec<Value>) -> Result<Value> {
        match binding.target() {
            Target::Attribute(index) => {
                let name = self.schema.attributes()[index].clone();
                match binding.kind() {
                    AccessorKind::Getter => {
                        expect_arity(method, &args, 0)?;
                        Ok(raw_to_value(self.attribute(&name)?))
                    }
                    AccessorKind::Setter => {
                        let value = single_arg(method, args)?;
                        self.set_attribute(&name, value_to_raw(method, value.clone())?)?;
                        Ok(value)
                    }
                }
            }
            Target::Method(index) => {
                let handler = self.schema.owner_methods()[index].handler();
                handler(self as &mut dyn FlexOwner, args)
            }
            Target::Column(_) | Target::Accessor(_) => Err(FlexError::method_not_found(
                self.schema.type_name(),
                method,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::FlexColumnDefinition;
    use crate::store::MemoryTable;
    use serde_json::json;

    fn schema() -> Arc<FlexSchema> {
        Arc::new(
            FlexSchema::builder("User")
                .attributes(["name", "foo"])
                .method("shout", |owner, _args| {
                    let name = owner.send("name", vec![])?;
                    Ok(json!(format!("{}!", name.as_str().unwrap_or_default())))
                })
                .flex_column(FlexColumnDefinition::new("user_attributes").fields(["foo", "bar"]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn new_record_has_null_attributes_and_unloaded_columns() {
        let record = FlexRecord::new(schema());
        assert_eq!(record.attribute("name").unwrap(), None);
        assert_eq!(record.attribute("user_attributes").unwrap(), None);
        assert!(!record.flex_slot("user_attributes").unwrap().is_loaded());
        assert!(matches!(
            record.attribute("nope"),
            Err(FlexError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn attributes_dispatch_as_strings() {
        let mut record = FlexRecord::new(schema());
        assert_eq!(record.public_send("set_name", vec![json!("Ann")]).unwrap(), json!("Ann"));
        assert_eq!(record.public_send("name", vec![]).unwrap(), json!("Ann"));
        assert_eq!(record.attribute("name").unwrap(), Some("Ann"));
        assert!(matches!(
            record.public_send("set_name", vec![json!(5)]),
            Err(FlexError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn owner_methods_see_the_record() {
        let mut record = FlexRecord::new(schema());
        record.set_attribute("name", Some("Ann".to_string())).unwrap();
        assert_eq!(record.public_send("shout", vec![]).unwrap(), json!("Ann!"));
    }

    #[test]
    fn column_accessor_returns_declared_fields() {
        let mut record = FlexRecord::new(schema());
        record.public_send("set_bar", vec![json!("b")]).unwrap();
        assert_eq!(
            record.public_send("user_attributes", vec![]).unwrap(),
            json!({"bar": "b"})
        );

        record
            .public_send("set_user_attributes", vec![json!(r#"{"bar":"raw"}"#)])
            .unwrap();
        assert_eq!(record.public_send("bar", vec![]).unwrap(), json!("raw"));
    }

    #[test]
    fn save_syncs_columns_and_reload_reads_them() {
        let table = MemoryTable::new("users");
        let mut record = FlexRecord::new(schema());
        record.flex_mut("user_attributes").unwrap().set("foo", "inner").unwrap();

        let id = record.save(&table).unwrap();
        assert_eq!(record.id(), Some(id));
        assert_eq!(record.attribute("user_attributes").unwrap(), Some(r#"{"foo":"inner"}"#));

        let mut loaded = FlexRecord::find(schema(), &table, id).unwrap();
        assert_eq!(
            loaded.read_field("user_attributes", "foo").unwrap(),
            Some(json!("inner"))
        );

        loaded.write_field("user_attributes", "bar", json!("b")).unwrap();
        loaded.save(&table).unwrap();
        assert_eq!(
            table.fetch(id).unwrap().get("user_attributes").cloned().flatten(),
            Some(r#"{"foo":"inner","bar":"b"}"#.to_string())
        );
    }

    #[test]
    fn malformed_column_surfaces_on_first_access() {
        let mut row = Row::new();
        row.insert("user_attributes".to_string(), Some("not json".to_string()));
        let mut record = FlexRecord::from_row(schema(), Some(1), row);

        assert!(matches!(
            record.public_send("bar", vec![]),
            Err(FlexError::MalformedColumnData { .. })
        ));
        assert!(record.to_row().is_ok());
    }
}
