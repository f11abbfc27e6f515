//! Type-level metadata of an owning record: its stored attributes, its own
//! methods, its flex columns and the resolved dispatch table.

mod builder;

pub use builder::FlexSchemaBuilder;

use crate::column::definition::FlexColumnDefinition;
use crate::core::{FlexError, Result, Value};
use crate::delegation::{AccessorKind, GeneratedAccessor, Visibility};
use crate::owner::FlexOwner;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub type OwnerMethodFn =
    Arc<dyn Fn(&mut dyn FlexOwner, Vec<Value>) -> Result<Value> + Send + Sync>;

/// A method defined by the owning type itself.
#[derive(Clone)]
pub struct OwnerMethod {
    name: String,
    handler: OwnerMethodFn,
}

impl OwnerMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> OwnerMethodFn {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for OwnerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerMethod")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What a dispatched method name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Index into [`FlexSchema::attributes`].
    Attribute(usize),
    /// Index into [`FlexSchema::columns`].
    Column(usize),
    /// Index into [`FlexSchema::owner_methods`].
    Method(usize),
    /// Index into [`FlexSchema::accessors`].
    Accessor(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    target: Target,
    kind: AccessorKind,
    visibility: Visibility,
}

impl Binding {
    pub fn target(&self) -> Target {
        self.target
    }

    pub fn kind(&self) -> AccessorKind {
        self.kind
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }
}

/// Resolved schema of one owning-record type.
///
/// Read-only once built; share it between records with `Arc` or a static.
#[derive(Debug)]
pub struct FlexSchema {
    type_name: String,
    attributes: Vec<String>,
    methods: Vec<OwnerMethod>,
    reserved: BTreeSet<String>,
    columns: Vec<Arc<FlexColumnDefinition>>,
    accessors: Vec<GeneratedAccessor>,
    dispatch: HashMap<String, Binding>,
}

impl FlexSchema {
    pub fn builder(type_name: impl Into<String>) -> FlexSchemaBuilder {
        FlexSchemaBuilder::new(type_name)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Plain stored attributes, excluding flex columns.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn is_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|attribute| attribute == name)
    }

    pub fn owner_methods(&self) -> &[OwnerMethod] {
        &self.methods
    }

    /// Every name the owner claims for itself.
    pub fn reserved_names(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    pub fn columns(&self) -> &[Arc<FlexColumnDefinition>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Arc<FlexColumnDefinition>> {
        self.columns
            .iter()
            .find(|definition| definition.column_name() == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Arc<FlexColumnDefinition>> {
        self.column(name).ok_or_else(|| FlexError::UnknownColumn {
            owner: self.type_name.clone(),
            column: name.to_string(),
        })
    }

    pub fn accessors(&self) -> &[GeneratedAccessor] {
        &self.accessors
    }

    /// Accessors generated for one column.
    pub fn accessors_for<'a>(
        &'a self,
        column: &'a str,
    ) -> impl Iterator<Item = &'a GeneratedAccessor> + 'a {
        self.accessors
            .iter()
            .filter(move |accessor| accessor.column() == column)
    }

    pub fn lookup(&self, method: &str) -> Option<Binding> {
        self.dispatch.get(method).copied()
    }

    /// True when `method` can be called on the ordinary (public) path.
    pub fn responds_to(&self, method: &str) -> bool {
        self.lookup(method)
            .is_some_and(|binding| binding.visibility == Visibility::Public)
    }

    /// Publicly callable method names, sorted.
    pub fn public_methods(&self) -> Vec<&str> {
        let mut names = self
            .dispatch
            .iter()
            .filter(|(_, binding)| binding.visibility == Visibility::Public)
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::definition::{CollisionPolicy, DelegateMode};

    fn user_schema(definition: FlexColumnDefinition) -> Result<FlexSchema> {
        FlexSchema::builder("User")
            .attributes(["name", "foo", "baz"])
            .flex_column(definition)
            .build()
    }

    #[test]
    fn builds_dispatch_for_attributes_columns_and_accessors() {
        let schema = user_schema(
            FlexColumnDefinition::new("user_attributes").fields(["wants_email", "something"]),
        )
        .unwrap();

        assert_eq!(schema.attributes(), ["name", "foo", "baz"]);
        assert_eq!(
            schema.lookup("name").map(|binding| binding.target()),
            Some(Target::Attribute(0))
        );
        assert_eq!(
            schema.lookup("set_user_attributes").map(|binding| binding.kind()),
            Some(AccessorKind::Setter)
        );
        assert_eq!(
            schema.lookup("user_attributes").map(|binding| binding.target()),
            Some(Target::Column(0))
        );
        assert_eq!(
            schema.lookup("set_something").map(|binding| binding.target()),
            Some(Target::Accessor(1))
        );
        assert!(schema.responds_to("wants_email"));
        assert!(!schema.responds_to("nope"));
        assert!(schema.public_methods().contains(&"set_wants_email"));
    }

    #[test]
    fn private_accessors_are_bound_but_not_public() {
        let schema = user_schema(
            FlexColumnDefinition::new("user_attributes")
                .field("wants_email")
                .delegate(DelegateMode::Private),
        )
        .unwrap();

        let binding = schema.lookup("wants_email").unwrap();
        assert_eq!(binding.visibility(), Visibility::Private);
        assert!(!schema.responds_to("wants_email"));
        assert!(!schema.public_methods().contains(&"wants_email"));
    }

    #[test]
    fn owner_attributes_keep_their_names() {
        let schema = user_schema(
            FlexColumnDefinition::new("user_attributes").fields(["foo", "bar"]),
        )
        .unwrap();

        assert_eq!(
            schema.lookup("foo").map(|binding| binding.target()),
            Some(Target::Attribute(1))
        );
        assert_eq!(
            schema
                .accessors_for("user_attributes")
                .map(GeneratedAccessor::name)
                .collect::<Vec<_>>(),
            vec!["bar"]
        );
    }

    #[test]
    fn rejecting_collisions_fails_the_declaration() {
        let err = user_schema(
            FlexColumnDefinition::new("user_attributes")
                .fields(["foo", "bar"])
                .collisions(CollisionPolicy::Reject),
        )
        .unwrap_err();
        assert!(matches!(err, FlexError::AccessorNameCollision { ref name, .. } if name == "foo"));
    }

    #[test]
    fn two_columns_cannot_delegate_the_same_name() {
        let err = FlexSchema::builder("User")
            .flex_column(FlexColumnDefinition::new("prefs").field("color"))
            .flex_column(FlexColumnDefinition::new("settings").field("color"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            FlexError::AccessorNameCollision {
                owner: "User".to_string(),
                name: "color".to_string(),
                conflict: "the accessor for field 'color' of flex column 'prefs'".to_string(),
            }
        );
    }

    #[test]
    fn prefixes_separate_columns_with_the_same_fields() {
        let schema = FlexSchema::builder("User")
            .flex_column(FlexColumnDefinition::new("prefs").field("color").prefix("prefs"))
            .flex_column(FlexColumnDefinition::new("settings").field("color"))
            .build()
            .unwrap();
        assert!(schema.responds_to("prefs_color"));
        assert!(schema.responds_to("color"));
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let err = FlexSchema::builder("User")
            .flex_column(FlexColumnDefinition::new("prefs"))
            .flex_column(FlexColumnDefinition::new("prefs"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            FlexError::DuplicateColumn {
                owner: "User".to_string(),
                column: "prefs".to_string(),
            }
        );
    }

    #[test]
    fn owner_methods_cannot_reuse_member_names() {
        let clash_with_attribute = FlexSchema::builder("User")
            .attribute("name")
            .method("name", |_owner, _args| Ok(Value::Null))
            .build()
            .unwrap_err();
        assert_eq!(
            clash_with_attribute,
            FlexError::DuplicateMember {
                owner: "User".to_string(),
                name: "name".to_string(),
            }
        );

        let clash_with_setter = FlexSchema::builder("User")
            .flex_column(FlexColumnDefinition::new("prefs").field("color"))
            .method("set_prefs", |_owner, _args| Ok(Value::Null))
            .build();
        assert!(matches!(
            clash_with_setter,
            Err(FlexError::DuplicateMember { ref name, .. }) if name == "set_prefs"
        ));

        let twice = FlexSchema::builder("User")
            .method("shout", |_owner, _args| Ok(Value::Null))
            .method("shout", |_owner, _args| Ok(Value::Null))
            .build();
        assert!(matches!(twice, Err(FlexError::DuplicateMember { .. })));
    }

    #[test]
    fn column_declared_as_attribute_is_not_duplicated() {
        let schema = FlexSchema::builder("User")
            .attribute("user_attributes")
            .flex_column(FlexColumnDefinition::new("user_attributes").field("a"))
            .build()
            .unwrap();
        assert!(schema.attributes().is_empty());
        assert!(schema.column("user_attributes").is_some());
        assert!(schema.require_column("other").is_err());
    }
}
