use std::collections::HashSet;

use crate::catalog::TableRef;

const INFORMATION_SCHEMA_PREFIX: &str = "INFORMATION_SCHEMA";

// H2 information-schema views and driver-internal tables.
const SYSTEM_TABLES: &[&str] = &[
    "INFORMATION_SCHEMA_CATALOG_NAME",
    "CONSTANTS",
    "ENUM_VALUES",
    "INDEXES",
    "INDEX_COLUMNS",
    "IN_DOUBT",
    "LOCKS",
    "QUERY_STATISTICS",
    "RIGHTS",
    "ROLES",
    "SESSIONS",
    "SESSION_STATE",
    "SETTINGS",
    "SYNONYMS",
    "CHECK_CONSTRAINTS",
    "COLLATIONS",
    "COLUMNS",
    "COLUMN_PRIVILEGES",
    "CONSTRAINT_COLUMN_USAGE",
    "DOMAINS",
    "DOMAIN_CONSTRAINTS",
    "ELEMENT_TYPES",
    "FIELDS",
    "KEY_COLUMN_USAGE",
    "PARAMETERS",
    "REFERENTIAL_CONSTRAINTS",
    "ROUTINES",
    "SCHEMATA",
    "SEQUENCES",
    "TABLES",
    "TABLE_CONSTRAINTS",
    "TABLE_PRIVILEGES",
    "TRIGGERS",
    "VIEWS",
];

#[must_use]
pub fn is_system_table(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.starts_with(INFORMATION_SCHEMA_PREFIX) || SYSTEM_TABLES.contains(&upper.as_str())
}

/// Deduplicates `raw_names` case-insensitively (first spelling wins) and drops
/// catalog tables, keeping the backend's ordering.
#[must_use]
pub fn filter_user_tables(database: &str, raw_names: &[String]) -> Vec<TableRef> {
    let mut seen = HashSet::with_capacity(raw_names.len());
    raw_names
        .iter()
        .filter(|name| seen.insert(name.to_uppercase()))
        .filter(|name| !is_system_table(name))
        .map(|name| TableRef::new(database, name.as_str()))
        .collect()
}
