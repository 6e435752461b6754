use serde_json::Value;
use tracing::warn;

use crate::catalog::SampleDataset;

pub const NULL_PLACEHOLDER: &str = "NULL";
pub const RENDER_ERROR_PLACEHOLDER: &str = "[rendering error]";
pub const MAX_CELL_CHARS: usize = 50;
pub const MAX_DISPLAY_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellDisplay {
    Null,
    Text { display: String, full: String },
    RenderError,
}

impl CellDisplay {
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Null => NULL_PLACEHOLDER,
            Self::Text { display, .. } => display,
            Self::RenderError => RENDER_ERROR_PLACEHOLDER,
        }
    }

    fn from_text(full: String) -> Self {
        let display = if full.chars().count() > MAX_CELL_CHARS {
            let mut truncated = full.chars().take(MAX_CELL_CHARS).collect::<String>();
            truncated.push_str("...");
            truncated
        } else {
            full.clone()
        };
        Self::Text { display, full }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellDisplay>>,
    pub total_rows: usize,
    pub count: u64,
    pub execution_time_ms: Option<u64>,
}

impl SamplePage {
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.rows.len() < self.total_rows
    }
}

#[must_use]
pub fn render_cell(row: &Value, column: &str) -> CellDisplay {
    let Value::Object(fields) = row else {
        return CellDisplay::RenderError;
    };

    match fields.get(column) {
        None | Some(Value::Null) => CellDisplay::Null,
        Some(Value::String(text)) => CellDisplay::from_text(text.clone()),
        Some(Value::Bool(flag)) => CellDisplay::from_text(flag.to_string()),
        Some(Value::Number(number)) => CellDisplay::from_text(number.to_string()),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => match serde_json::to_string(nested) {
            Ok(json) => CellDisplay::from_text(json),
            Err(error) => {
                warn!(column, %error, "failed to render nested sample cell");
                CellDisplay::RenderError
            }
        },
    }
}

/// Renders at most `max_rows` rows; rows that are not objects become a line
/// of error placeholders instead of aborting the page.
#[must_use]
pub fn render_sample(dataset: &SampleDataset, max_rows: usize) -> SamplePage {
    let rows = dataset
        .rows
        .iter()
        .take(max_rows)
        .enumerate()
        .map(|(index, row)| {
            if !row.is_object() {
                warn!(row = index, "sample row is not an object");
            }
            dataset
                .columns
                .iter()
                .map(|column| render_cell(row, column))
                .collect()
        })
        .collect();

    SamplePage {
        columns: dataset.columns.clone(),
        rows,
        total_rows: dataset.rows.len(),
        count: dataset.count,
        execution_time_ms: dataset.execution_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{render_cell, render_sample, CellDisplay, MAX_CELL_CHARS};
    use crate::catalog::SampleDataset;

    #[test]
    fn null_and_missing_cells_render_as_null() {
        let row = json!({ "id": 1, "email": null });
        assert_eq!(render_cell(&row, "email"), CellDisplay::Null);
        assert_eq!(render_cell(&row, "missing"), CellDisplay::Null);
        assert_eq!(render_cell(&row, "id").text(), "1");
    }

    #[test]
    fn nested_values_render_as_compact_json() {
        let row = json!({ "tags": ["a", "b"], "meta": { "k": true } });
        assert_eq!(render_cell(&row, "tags").text(), r#"["a","b"]"#);
        assert_eq!(render_cell(&row, "meta").text(), r#"{"k":true}"#);
    }

    #[test]
    fn long_values_are_truncated_but_keep_full_text() {
        let long = "x".repeat(MAX_CELL_CHARS + 10);
        let row = json!({ "body": long.clone() });

        let CellDisplay::Text { display, full } = render_cell(&row, "body") else {
            panic!("expected text cell");
        };
        assert_eq!(display.chars().count(), MAX_CELL_CHARS + 3);
        assert!(display.ends_with("..."));
        assert_eq!(full, long);
    }

    #[test]
    fn malformed_rows_render_placeholders_without_dropping_others() {
        let dataset = SampleDataset {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                json!({ "id": 1, "name": "ada" }),
                json!("not-a-row"),
                json!({ "id": 3 }),
            ],
            count: 3,
            execution_time_ms: Some(4),
        };

        let page = render_sample(&dataset, 100);
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[0][1].text(), "ada");
        assert_eq!(page.rows[1][0].text(), "[rendering error]");
        assert_eq!(page.rows[1][1].text(), "[rendering error]");
        assert_eq!(page.rows[2][1].text(), "NULL");
        assert!(!page.is_truncated());
    }

    #[test]
    fn page_is_capped_at_max_rows() {
        let dataset = SampleDataset {
            columns: vec!["n".to_string()],
            rows: (0..150).map(|n| json!({ "n": n })).collect(),
            count: 150,
            execution_time_ms: None,
        };

        let page = render_sample(&dataset, 100);
        assert_eq!(page.rows.len(), 100);
        assert_eq!(page.total_rows, 150);
        assert!(page.is_truncated());
    }
}
