use crate::column::container::FieldContainer;
use crate::column::options::FlexColumnOptions;
use crate::core::naming::validate_identifier;
use crate::core::{FlexError, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Whether, and how, declared fields are exposed as accessors on the owning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "DelegateRepr")]
pub enum DelegateMode {
    #[default]
    Public,
    Private,
    Off,
}

/// Configuration accepts `true`/`false` as well as the mode names.
#[derive(Deserialize)]
#[serde(untagged)]
enum DelegateRepr {
    Flag(bool),
    Named(String),
}

impl TryFrom<DelegateRepr> for DelegateMode {
    type Error = String;

    fn try_from(repr: DelegateRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            DelegateRepr::Flag(true) => Ok(Self::Public),
            DelegateRepr::Flag(false) => Ok(Self::Off),
            DelegateRepr::Named(name) => match name.as_str() {
                "public" => Ok(Self::Public),
                "private" => Ok(Self::Private),
                "off" => Ok(Self::Off),
                other => Err(format!(
                    "unknown delegate mode '{}', expected public, private, off, true or false",
                    other
                )),
            },
        }
    }
}

/// What happens to stored keys that are not declared as fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    #[default]
    Preserve,
    Delete,
}

/// What happens when a delegated accessor name is already an owner member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// The owner keeps the name and the accessor is not generated.
    ///
    /// Getter and setter are skipped together: an owner `baz` also
    /// suppresses `set_baz`, and an owner `set_baz` suppresses `baz`.
    #[default]
    Shadow,
    Reject,
}

/// One declared field of a flex column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    name: String,
    storage_key: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_key: None,
        }
    }

    /// Stores the field under a different JSON key.
    pub fn stored_as(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_key(&self) -> &str {
        self.storage_key.as_deref().unwrap_or(&self.name)
    }
}

pub type DerivedFn = Arc<dyn Fn(&FieldContainer) -> Result<Value> + Send + Sync>;

/// A method computed from a container's current values on every call.
#[derive(Clone)]
pub struct DerivedMethod {
    name: String,
    handler: DerivedFn,
}

impl DerivedMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, container: &FieldContainer) -> Result<Value> {
        (self.handler)(container)
    }
}

impl fmt::Debug for DerivedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedMethod")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Declaration of one flex column: the stored attribute, its fields and
/// the delegation policy for their accessors.
///
/// Built once per owning type and read-only afterwards.
///
/// ```
/// use flexcols::{DelegateMode, FlexColumnDefinition};
///
/// let definition = FlexColumnDefinition::new("user_attributes")
///     .field("wants_email")
///     .field("something")
///     .delegate(DelegateMode::Private)
///     .prefix("bar");
/// assert!(definition.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FlexColumnDefinition {
    column_name: String,
    fields: Vec<FieldDefinition>,
    delegate: DelegateMode,
    prefix: Option<String>,
    unknown_fields: UnknownFieldPolicy,
    collisions: CollisionPolicy,
    length_limit: Option<usize>,
    derived: Vec<DerivedMethod>,
}

impl FlexColumnDefinition {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            fields: Vec::new(),
            delegate: DelegateMode::default(),
            prefix: None,
            unknown_fields: UnknownFieldPolicy::default(),
            collisions: CollisionPolicy::default(),
            length_limit: None,
            derived: Vec::new(),
        }
    }

    /// Builds a definition from deserialized configuration.
    ///
    /// Every `stored_as` entry must name a field listed in `fields`.
    pub fn from_options(
        column_name: impl Into<String>,
        mut options: FlexColumnOptions,
    ) -> Result<Self> {
        let mut definition = Self::new(column_name)
            .delegate(options.delegate)
            .unknown_fields(options.unknown_fields)
            .collisions(options.collisions);
        definition.prefix = options.prefix;
        definition.length_limit = options.length_limit;
        for name in options.fields {
            let field = match options.stored_as.remove(&name) {
                Some(key) => FieldDefinition::new(name).stored_as(key),
                None => FieldDefinition::new(name),
            };
            definition = definition.field_definition(field);
        }

        if let Some(orphan) = options.stored_as.into_keys().next() {
            return Err(FlexError::UndeclaredField {
                column: definition.column_name,
                field: orphan,
            });
        }
        Ok(definition)
    }

    pub fn field(self, name: impl Into<String>) -> Self {
        self.field_definition(FieldDefinition::new(name))
    }

    pub fn field_definition(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |definition, name| definition.field(name))
    }

    pub fn delegate(mut self, mode: DelegateMode) -> Self {
        self.delegate = mode;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn collisions(mut self, policy: CollisionPolicy) -> Self {
        self.collisions = policy;
        self
    }

    pub fn length_limit(mut self, limit: usize) -> Self {
        self.length_limit = Some(limit);
        self
    }

    /// Adds a method computed from the container, e.g. a formatted view of a field.
    pub fn derived<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&FieldContainer) -> Result<Value> + Send + Sync + 'static,
    {
        self.derived.push(DerivedMethod {
            name: name.into(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn field_definitions(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(FieldDefinition::name)
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name() == name)
    }

    pub fn find_by_storage_key(&self, key: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.storage_key() == key)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.find_field(name).is_some()
    }

    pub fn delegate_mode(&self) -> DelegateMode {
        self.delegate
    }

    pub fn accessor_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn unknown_field_policy(&self) -> UnknownFieldPolicy {
        self.unknown_fields
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collisions
    }

    pub fn max_length(&self) -> Option<usize> {
        self.length_limit
    }

    pub fn derived_method(&self, name: &str) -> Option<&DerivedMethod> {
        self.derived.iter().find(|method| method.name() == name)
    }

    pub fn derived_methods(&self) -> &[DerivedMethod] {
        &self.derived
    }

    /// Declaration-time checks: identifiers, duplicate fields and keys,
    /// derived methods shadowing fields.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("column", &self.column_name)?;
        if let Some(prefix) = &self.prefix {
            validate_identifier("prefix", prefix)?;
        }

        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        for field in &self.fields {
            validate_identifier("field", field.name())?;
            if !names.insert(field.name()) {
                return Err(self.duplicate(field.name()));
            }
            if field.storage_key().is_empty() {
                return Err(FlexError::InvalidIdentifier {
                    kind: "storage key",
                    name: String::new(),
                });
            }
            if !keys.insert(field.storage_key()) {
                return Err(self.duplicate(field.storage_key()));
            }
        }

        for method in &self.derived {
            validate_identifier("derived method", method.name())?;
            if !names.insert(method.name()) {
                return Err(self.duplicate(method.name()));
            }
        }

        Ok(())
    }

    fn duplicate(&self, field: &str) -> FlexError {
        FlexError::DuplicateField {
            column: self.column_name.clone(),
            field: field.to_string(),
        }
    }
}
