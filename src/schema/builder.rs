use super::{Binding, FlexSchema, OwnerMethod, Target};
use crate::column::definition::FlexColumnDefinition;
use crate::core::naming::{setter_name, validate_identifier};
use crate::core::{FlexError, Result, Value};
use crate::delegation::{AccessorKind, DelegationResolver, GeneratedAccessor, Visibility};
use crate::owner::FlexOwner;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{Level, event};

/// Collects the owner's members and flex columns; [`build`](Self::build)
/// performs every declaration-time check.
pub struct FlexSchemaBuilder {
    type_name: String,
    attributes: Vec<String>,
    methods: Vec<OwnerMethod>,
    reserved: Vec<String>,
    columns: Vec<FlexColumnDefinition>,
}

impl FlexSchemaBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
            methods: Vec::new(),
            reserved: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// A plain string-typed stored attribute (`name` / `set_name`).
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn attributes<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |builder, name| builder.attribute(name))
    }

    /// A method of the owner itself, callable through dispatch.
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut dyn FlexOwner, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.push(OwnerMethod {
            name: name.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// A name the owner uses outside of dispatch; accessors never take it.
    pub fn reserve(mut self, name: impl Into<String>) -> Self {
        self.reserved.push(name.into());
        self
    }

    pub fn flex_column(mut self, definition: FlexColumnDefinition) -> Self {
        self.columns.push(definition);
        self
    }

    pub fn build(self) -> Result<FlexSchema> {
        let type_name = self.type_name;

        let mut column_names = BTreeSet::new();
        for definition in &self.columns {
            definition.validate()?;
            if !column_names.insert(definition.column_name().to_string()) {
                return Err(FlexError::DuplicateColumn {
                    owner: type_name.clone(),
                    column: definition.column_name().to_string(),
                });
            }
        }

        let mut attributes = Vec::new();
        for attribute in self.attributes {
            validate_identifier("attribute", &attribute)?;
            if !column_names.contains(&attribute) && !attributes.contains(&attribute) {
                attributes.push(attribute);
            }
        }
        let mut members = BTreeSet::new();
        for name in attributes.iter().chain(column_names.iter()) {
            members.insert(name.clone());
            members.insert(setter_name(name));
        }
        for method in &self.methods {
            validate_identifier("method", method.name())?;
            if !members.insert(method.name().to_string()) {
                return Err(FlexError::DuplicateMember {
                    owner: type_name.clone(),
                    name: method.name().to_string(),
                });
            }
        }

        let mut reserved = members;
        reserved.extend(self.reserved);

        let mut accessors = Vec::<GeneratedAccessor>::new();
        let mut claimed = HashMap::<String, usize>::new();
        let resolver = DelegationResolver::new(&type_name, &reserved);
        for definition in &self.columns {
            for accessor in resolver.resolve(definition)? {
                for name in [accessor.name(), accessor.setter_name()] {
                    if let Some(&index) = claimed.get(name) {
                        let other = &accessors[index];
                        return Err(FlexError::AccessorNameCollision {
                            owner: type_name.clone(),
                            name: name.to_string(),
                            conflict: format!(
                                "the accessor for field '{}' of flex column '{}'",
                                other.field(),
                                other.column()
                            ),
                        });
                    }
                }
                claimed.insert(accessor.name().to_string(), accessors.len());
                claimed.insert(accessor.setter_name().to_string(), accessors.len());
                accessors.push(accessor);
            }
        }

        let mut dispatch = HashMap::new();
        let mut bind = |name: String, target: Target, kind: AccessorKind, visibility: Visibility| {
            dispatch.entry(name).or_insert(Binding {
                target,
                kind,
                visibility,
            });
        };
        for (index, name) in attributes.iter().enumerate() {
            bind(name.clone(), Target::Attribute(index), AccessorKind::Getter, Visibility::Public);
            bind(setter_name(name), Target::Attribute(index), AccessorKind::Setter, Visibility::Public);
        }
        for (index, name) in column_names_in_order(&self.columns).enumerate() {
            bind(name.to_string(), Target::Column(index), AccessorKind::Getter, Visibility::Public);
            bind(setter_name(name), Target::Column(index), AccessorKind::Setter, Visibility::Public);
        }
        for (index, method) in self.methods.iter().enumerate() {
            bind(method.name().to_string(), Target::Method(index), AccessorKind::Getter, Visibility::Public);
        }
        for (index, accessor) in accessors.iter().enumerate() {
            let visibility = accessor.visibility();
            bind(accessor.name().to_string(), Target::Accessor(index), AccessorKind::Getter, visibility);
            bind(accessor.setter_name().to_string(), Target::Accessor(index), AccessorKind::Setter, visibility);
        }

        event!(
            Level::DEBUG,
            owner = %type_name,
            columns = self.columns.len(),
            accessors = accessors.len(),
            "flex schema built"
        );

        Ok(FlexSchema {
            type_name,
            attributes,
            methods: self.methods,
            reserved,
            columns: self.columns.into_iter().map(Arc::new).collect(),
            accessors,
            dispatch,
        })
    }
}

fn column_names_in_order(columns: &[FlexColumnDefinition]) -> impl Iterator<Item = &str> {
    columns.iter().map(FlexColumnDefinition::column_name)
}
