use crate::catalog::ColumnMetadata;

const COLUMN_INDENT: &str = "    ";
const DISCLAIMER: &str = "-- NOTE: simplified statement reconstructed from column metadata.\n\
     -- The actual table definition may carry more constraints, indexes and \
     engine-specific options.";

fn quote_sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_variable_length_character(data_type: &str) -> bool {
    let upper = data_type.to_ascii_uppercase();
    upper.contains("VARCHAR") || upper.contains("CHARACTER VARYING")
}

fn column_definition(column: &ColumnMetadata) -> String {
    let mut definition = format!("{COLUMN_INDENT}{} {}", column.name, column.data_type);

    if let Some(size) = column.size {
        if is_variable_length_character(&column.data_type) {
            definition.push_str(&format!("({size})"));
        }
    }
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if column.auto_increment {
        definition.push_str(" AUTO_INCREMENT");
    }
    if let Some(default_value) = column.default_value.as_deref() {
        definition.push_str(" DEFAULT ");
        definition.push_str(&quote_sql_string(default_value));
    }
    if let Some(comment) = column.comment.as_deref() {
        definition.push_str(" COMMENT ");
        definition.push_str(&quote_sql_string(comment));
    }

    definition
}

/// Best-effort `CREATE TABLE` for backends without a create-statement
/// endpoint. Returns a comment only when there is nothing to reconstruct.
#[must_use]
pub fn synthesize_create_table(table_name: &str, columns: &[ColumnMetadata]) -> String {
    if columns.is_empty() {
        return format!("-- No column metadata available for table {table_name}");
    }

    let mut definitions = columns.iter().map(column_definition).collect::<Vec<_>>();

    let primary_keys = columns
        .iter()
        .filter(|column| column.primary_key)
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    if !primary_keys.is_empty() {
        definitions.push(format!(
            "{COLUMN_INDENT}PRIMARY KEY ({})",
            primary_keys.join(", ")
        ));
    }

    format!(
        "CREATE TABLE {table_name} (\n{}\n);\n\n{DISCLAIMER}",
        definitions.join(",\n")
    )
}
