use crate::column::definition::{CollisionPolicy, DelegateMode, UnknownFieldPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializable configuration for one flex column.
///
/// Every knob is optional; missing keys fall back to the defaults of
/// [`FlexColumnDefinition`](crate::FlexColumnDefinition).
///
/// ```
/// use flexcols::{DelegateMode, FlexColumnDefinition, FlexColumnOptions};
///
/// let options: FlexColumnOptions = serde_json::from_str(
///     r#"{ "delegate": false, "fields": ["wants_email", "something"] }"#,
/// )?;
/// let definition = FlexColumnDefinition::from_options("user_attributes", options)?;
/// assert_eq!(definition.delegate_mode(), DelegateMode::Off);
/// # Ok::<(), flexcols::FlexError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlexColumnOptions {
    pub delegate: DelegateMode,
    pub prefix: Option<String>,
    pub unknown_fields: UnknownFieldPolicy,
    pub collisions: CollisionPolicy,
    pub length_limit: Option<usize>,
    pub fields: Vec<String>,
    /// Field name to JSON storage key, for fields stored under another key.
    pub stored_as: BTreeMap<String, String>,
}
