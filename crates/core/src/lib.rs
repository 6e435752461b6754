pub mod catalog;
pub mod ddl;
pub mod debouncer;
pub mod detail_panel;
pub mod expansion;
pub mod explorer;
pub mod sample_view;
pub mod settings;
pub mod system_filter;

pub use catalog::{
    CatalogError, ColumnMetadata, DataSourceContext, SampleDataset, SchemaCatalogClient, TableRef,
};
pub use explorer::{Explorer, ExplorerConfig, FetchOutcome, FetchRequest};
