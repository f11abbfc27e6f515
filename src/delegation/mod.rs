//! Naming and visibility of the accessors a flex column delegates to its
//! owning record.
//!
//! | delegate | prefix | accessors                         |
//! |----------|--------|-----------------------------------|
//! | off      | any    | none                              |
//! | public   | none   | `field` / `set_field`, public     |
//! | public   | `bar`  | `bar_field` / `set_bar_field`     |
//! | private  | none   | `field` / `set_field`, private    |

use crate::column::definition::{CollisionPolicy, DelegateMode, FlexColumnDefinition};
use crate::core::naming::{accessor_name, setter_name};
use crate::core::{FlexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    Getter,
    Setter,
}

/// A getter/setter pair bound to one field of one flex column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAccessor {
    column: String,
    field: String,
    name: String,
    setter: String,
    visibility: Visibility,
}

impl GeneratedAccessor {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Getter name; also the resolved accessor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setter_name(&self) -> &str {
        &self.setter
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn method_name(&self, kind: AccessorKind) -> &str {
        match kind {
            AccessorKind::Getter => &self.name,
            AccessorKind::Setter => &self.setter,
        }
    }
}

/// Resolves a column's accessors against the members its owner already has.
pub struct DelegationResolver<'a> {
    owner: &'a str,
    reserved: &'a BTreeSet<String>,
}

impl<'a> DelegationResolver<'a> {
    pub fn new(owner: &'a str, reserved: &'a BTreeSet<String>) -> Self {
        Self { owner, reserved }
    }

    /// Accessors for `definition`, in field declaration order.
    ///
    /// The result depends only on the definition and the reserved names, so
    /// resolving an unchanged definition twice yields the same accessors.
    pub fn resolve(&self, definition: &FlexColumnDefinition) -> Result<Vec<GeneratedAccessor>> {
        definition.validate()?;

        let visibility = match definition.delegate_mode() {
            DelegateMode::Off => return Ok(Vec::new()),
            DelegateMode::Public => Visibility::Public,
            DelegateMode::Private => Visibility::Private,
        };

        let mut accessors = Vec::new();
        let mut taken = BTreeMap::<String, String>::new();
        for field in definition.field_names() {
            let name = accessor_name(definition.accessor_prefix(), field);
            let setter = setter_name(&name);

            if let Some(member) = [&name, &setter]
                .into_iter()
                .find(|candidate| self.reserved.contains(*candidate))
            {
                match definition.collision_policy() {
                    CollisionPolicy::Shadow => {
                        event!(
                            Level::DEBUG,
                            owner = %self.owner,
                            column = %definition.column_name(),
                            field = %field,
                            member = %member,
                            "delegated accessor shadowed by owner member"
                        );
                        continue;
                    }
                    CollisionPolicy::Reject => {
                        return Err(FlexError::AccessorNameCollision {
                            owner: self.owner.to_string(),
                            name: member.clone(),
                            conflict: format!("owner member '{}'", member),
                        });
                    }
                }
            }

            for candidate in [&name, &setter] {
                if let Some(other) = taken.get(candidate) {
                    return Err(FlexError::AccessorNameCollision {
                        owner: self.owner.to_string(),
                        name: candidate.clone(),
                        conflict: format!(
                            "the accessor for field '{}' of flex column '{}'",
                            other,
                            definition.column_name()
                        ),
                    });
                }
            }
            taken.insert(name.clone(), field.to_string());
            taken.insert(setter.clone(), field.to_string());

            accessors.push(GeneratedAccessor {
                column: definition.column_name().to_string(),
                field: field.to_string(),
                name,
                setter,
                visibility,
            });
        }

        Ok(accessors)
    }
}
