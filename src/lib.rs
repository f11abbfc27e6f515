// ============================================================================
// flexcols Library
// ============================================================================
//
// Several named fields stored in one JSON text column, each exposed on the
// owning record as if it were an attribute of its own.

extern crate self as flexcols;

pub mod column;
pub mod core;
pub mod delegation;
pub mod owner;
pub mod record;
pub mod schema;
pub mod store;

pub use column::{
    CollisionPolicy, DelegateMode, FieldContainer, FieldDefinition, FlexColumn,
    FlexColumnDefinition, FlexColumnOptions, UnknownFieldPolicy,
};
pub use crate::core::{FlexError, Result, Value};
pub use delegation::{AccessorKind, DelegationResolver, GeneratedAccessor, Visibility};
pub use owner::{CallPath, FlexOwner};
pub use record::FlexRecord;
pub use schema::{Binding, FlexSchema, FlexSchemaBuilder, Target};
pub use store::{MemoryTable, RecordStore, Row};

pub use flexcols_derive::FlexColumns;
