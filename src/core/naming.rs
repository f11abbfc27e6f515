use super::error::{FlexError, Result};
use regex::Regex;

lazy_static::lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .expect("identifier pattern is valid");
}

pub const SETTER_PREFIX: &str = "set_";

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

pub fn validate_identifier(kind: &'static str, name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(FlexError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        })
    }
}

pub fn setter_name(name: &str) -> String {
    format!("{}{}", SETTER_PREFIX, name)
}

/// `prefix_field`, or the bare field name without a prefix.
pub fn accessor_name(prefix: Option<&str>, field: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}_{}", prefix, field),
        None => field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("wants_email"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("foo="));
    }

    #[test]
    fn accessor_names() {
        assert_eq!(accessor_name(Some("bar"), "something"), "bar_something");
        assert_eq!(accessor_name(None, "something"), "something");
        assert_eq!(setter_name("bar_something"), "set_bar_something");
    }
}
