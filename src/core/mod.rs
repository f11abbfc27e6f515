pub mod error;
pub mod naming;
pub mod value;

pub use error::{FlexError, Result};
pub use value::Value;
