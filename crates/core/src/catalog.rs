use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSourceContext {
    pub datasource_id: u64,
    pub datasource_name: String,
}

impl DataSourceContext {
    #[must_use]
    pub fn new(datasource_id: u64, datasource_name: impl Into<String>) -> Self {
        Self {
            datasource_id,
            datasource_name: datasource_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub database: String,
    pub name: String,
}

impl TableRef {
    #[must_use]
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMetadata {
    pub name: String,
    pub data_type: String,
    pub size: Option<u64>,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

impl ColumnMetadata {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            ..Self::default()
        }
    }
}

/// Rows are kept as raw JSON so that a single malformed row or cell can be
/// rendered as a placeholder instead of failing the whole dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleDataset {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub count: u64,
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("no data source selected")]
    MissingContext,
    #[error("request failed: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error("{0}")]
    Application(String),
}

#[async_trait]
pub trait SchemaCatalogClient: Send + Sync {
    async fn list_databases(
        &self,
        context: &DataSourceContext,
        search: &str,
    ) -> Result<Vec<String>, CatalogError>;

    async fn list_tables(
        &self,
        context: &DataSourceContext,
        database: &str,
        search: &str,
    ) -> Result<Vec<String>, CatalogError>;

    async fn table_structure(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
    ) -> Result<Vec<ColumnMetadata>, CatalogError>;

    async fn sample_data(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
        limit: usize,
    ) -> Result<SampleDataset, CatalogError>;

    async fn create_statement(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
    ) -> Result<String, CatalogError>;
}
