//! Identifier rules for databases, collections, items and document fields.

use crate::error::AppError;
use regex::Regex;
use std::sync::OnceLock;

fn database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,62}$").expect("valid regex"))
}

fn collection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,62}$").expect("valid regex"))
}

fn item_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:~-]{1,256}$").expect("valid regex"))
}

fn field_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_$-]+(\.[A-Za-z0-9_$-]+)*$").expect("valid regex"))
}

fn sql_identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"))
}

pub fn check_database(name: &str) -> Result<(), AppError> {
    if database_re().is_match(name) {
        Ok(())
    } else {
        Err(AppError::BadIdentifier(format!("invalid database name '{}'", name)))
    }
}

pub fn check_collection(name: &str) -> Result<(), AppError> {
    if collection_re().is_match(name) {
        Ok(())
    } else {
        Err(AppError::BadIdentifier(format!("invalid collection name '{}'", name)))
    }
}

pub fn check_item_id(id: &str) -> Result<(), AppError> {
    if item_id_re().is_match(id) {
        Ok(())
    } else {
        Err(AppError::BadIdentifier(format!("invalid item id '{}'", id)))
    }
}

/// Dotted field path, e.g. `address.city`.
pub fn is_field_path(field: &str) -> bool {
    field_path_re().is_match(field)
}

/// Plain unquoted SQL identifier (used for config-provided schema names).
pub fn is_sql_identifier(name: &str) -> bool {
    sql_identifier_re().is_match(name)
}

/// Split a dotted field path into its segments.
pub fn field_segments(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names() {
        assert!(check_database("mongodb_rest_test1").is_ok());
        assert!(check_database("_health").is_err());
        assert!(check_database("a b").is_err());
        assert!(check_database(&"x".repeat(64)).is_err());
    }

    #[test]
    fn collection_and_item_ids() {
        assert!(check_collection("mongodb_test_collection1").is_ok());
        assert!(check_collection("logs.2024").is_ok());
        assert!(check_collection("").is_err());
        assert!(check_item_id("5f1d7c1e-0d52-4cb4-9a4a-0d3e0a8e2f11").is_ok());
        assert!(matches!(check_item_id("bad id"), Err(AppError::BadIdentifier(_))));
    }

    #[test]
    fn field_paths() {
        assert!(is_field_path("a"));
        assert!(is_field_path("address.city"));
        assert!(!is_field_path("a..b"));
        assert!(!is_field_path(""));
        assert_eq!(field_segments("a.b"), vec!["a".to_string(), "b".to_string()]);
    }
}
