//! Flex column declarations and their per-record contents.

pub mod container;
pub mod definition;
pub mod options;
pub mod slot;

pub use container::FieldContainer;
pub use definition::{
    CollisionPolicy, DelegateMode, DerivedFn, DerivedMethod, FieldDefinition,
    FlexColumnDefinition, UnknownFieldPolicy,
};
pub use options::FlexColumnOptions;
pub use slot::FlexColumn;
