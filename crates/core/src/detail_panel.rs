use tracing::debug;

use crate::catalog::{
    CatalogError, ColumnMetadata, DataSourceContext, SampleDataset, SchemaCatalogClient, TableRef,
};
use crate::ddl::synthesize_create_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailKind {
    Structure,
    SampleData,
    CreateStatement,
}

impl DetailKind {
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Structure => "Structure",
            Self::SampleData => "Sample data",
            Self::CreateStatement => "Create statement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState<T> {
    pub loading: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> PanelState<T> {
    fn loading() -> Self {
        Self {
            loading: true,
            data: None,
            error: None,
        }
    }

    fn resolve(&mut self, outcome: Result<T, CatalogError>) {
        self.loading = false;
        match outcome {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
            }
            Err(error) => {
                self.data = None;
                self.error = Some(error.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementSource {
    Backend,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStatementView {
    pub sql: String,
    pub source: StatementSource,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ActiveDetailView {
    #[default]
    Closed,
    Structure {
        table: TableRef,
        state: PanelState<Vec<ColumnMetadata>>,
    },
    SampleData {
        table: TableRef,
        state: PanelState<SampleDataset>,
    },
    CreateStatement {
        table: TableRef,
        state: PanelState<CreateStatementView>,
    },
}

impl ActiveDetailView {
    fn opened(kind: DetailKind, table: TableRef) -> Self {
        match kind {
            DetailKind::Structure => Self::Structure {
                table,
                state: PanelState::loading(),
            },
            DetailKind::SampleData => Self::SampleData {
                table,
                state: PanelState::loading(),
            },
            DetailKind::CreateStatement => Self::CreateStatement {
                table,
                state: PanelState::loading(),
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<DetailKind> {
        match self {
            Self::Closed => None,
            Self::Structure { .. } => Some(DetailKind::Structure),
            Self::SampleData { .. } => Some(DetailKind::SampleData),
            Self::CreateStatement { .. } => Some(DetailKind::CreateStatement),
        }
    }

    #[must_use]
    pub fn table(&self) -> Option<&TableRef> {
        match self {
            Self::Closed => None,
            Self::Structure { table, .. }
            | Self::SampleData { table, .. }
            | Self::CreateStatement { table, .. } => Some(table),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        match self {
            Self::Closed => false,
            Self::Structure { state, .. } => state.loading,
            Self::SampleData { state, .. } => state.loading,
            Self::CreateStatement { state, .. } => state.loading,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Closed => None,
            Self::Structure { state, .. } => state.error.as_deref(),
            Self::SampleData { state, .. } => state.error.as_deref(),
            Self::CreateStatement { state, .. } => state.error.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelTicket {
    pub kind: DetailKind,
    pub table: TableRef,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelPayload {
    Structure(Vec<ColumnMetadata>),
    SampleData(SampleDataset),
    CreateStatement(CreateStatementView),
}

impl PanelPayload {
    #[must_use]
    pub fn kind(&self) -> DetailKind {
        match self {
            Self::Structure(_) => DetailKind::Structure,
            Self::SampleData(_) => DetailKind::SampleData,
            Self::CreateStatement(_) => DetailKind::CreateStatement,
        }
    }
}

#[derive(Debug, Default)]
pub struct DetailPanelController {
    view: ActiveDetailView,
    generation: u64,
}

impl DetailPanelController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn view(&self) -> &ActiveDetailView {
        &self.view
    }

    // Earlier requests keep running but their results no longer match.
    pub fn open(&mut self, kind: DetailKind, table: TableRef) -> PanelTicket {
        self.generation += 1;
        debug!(
            panel = kind.title(),
            database = table.database.as_str(),
            table = table.name.as_str(),
            "opening detail panel"
        );
        self.view = ActiveDetailView::opened(kind, table.clone());
        PanelTicket {
            kind,
            table,
            generation: self.generation,
        }
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.view = ActiveDetailView::Closed;
    }

    #[must_use]
    pub fn is_current(&self, ticket: &PanelTicket) -> bool {
        ticket.generation == self.generation
            && self.view.kind() == Some(ticket.kind)
            && self.view.table() == Some(&ticket.table)
    }

    pub fn apply(
        &mut self,
        ticket: &PanelTicket,
        outcome: Result<PanelPayload, CatalogError>,
    ) -> bool {
        if !self.is_current(ticket) {
            debug!(
                panel = ticket.kind.title(),
                table = ticket.table.name.as_str(),
                "discarding stale panel response"
            );
            return false;
        }

        match (&mut self.view, outcome) {
            (ActiveDetailView::Structure { state, .. }, Ok(PanelPayload::Structure(columns))) => {
                state.resolve(Ok(columns));
            }
            (ActiveDetailView::SampleData { state, .. }, Ok(PanelPayload::SampleData(dataset))) => {
                state.resolve(Ok(dataset));
            }
            (
                ActiveDetailView::CreateStatement { state, .. },
                Ok(PanelPayload::CreateStatement(statement)),
            ) => state.resolve(Ok(statement)),
            (ActiveDetailView::Structure { state, .. }, Err(error)) => state.resolve(Err(error)),
            (ActiveDetailView::SampleData { state, .. }, Err(error)) => state.resolve(Err(error)),
            (ActiveDetailView::CreateStatement { state, .. }, Err(error)) => {
                state.resolve(Err(error));
            }
            (_, Ok(payload)) => {
                debug!(
                    expected = ticket.kind.title(),
                    received = payload.kind().title(),
                    "panel payload does not match its ticket"
                );
                return false;
            }
            (ActiveDetailView::Closed, Err(_)) => return false,
        }
        true
    }
}

/// Runs the fetch a ticket asks for. Create statements fall back to
/// synthesizing from the column structure when the backend has none.
pub async fn fetch_panel<C>(
    client: &C,
    context: &DataSourceContext,
    ticket: &PanelTicket,
    sample_limit: usize,
) -> Result<PanelPayload, CatalogError>
where
    C: SchemaCatalogClient + ?Sized,
{
    let table = &ticket.table;
    match ticket.kind {
        DetailKind::Structure => client
            .table_structure(context, table)
            .await
            .map(PanelPayload::Structure),
        DetailKind::SampleData => client
            .sample_data(context, table, sample_limit)
            .await
            .map(PanelPayload::SampleData),
        DetailKind::CreateStatement => fetch_create_statement(client, context, table)
            .await
            .map(PanelPayload::CreateStatement),
    }
}

async fn fetch_create_statement<C>(
    client: &C,
    context: &DataSourceContext,
    table: &TableRef,
) -> Result<CreateStatementView, CatalogError>
where
    C: SchemaCatalogClient + ?Sized,
{
    match client.create_statement(context, table).await {
        Ok(sql) if !sql.trim().is_empty() => {
            return Ok(CreateStatementView {
                sql,
                source: StatementSource::Backend,
            });
        }
        Ok(_) => debug!(table = table.name.as_str(), "backend returned an empty create statement"),
        Err(error) => debug!(
            table = table.name.as_str(),
            %error,
            "create-statement endpoint unavailable, synthesizing from structure"
        ),
    }

    let columns = client.table_structure(context, table).await?;
    Ok(CreateStatementView {
        sql: synthesize_create_table(&table.name, &columns),
        source: StatementSource::Synthesized,
    })
}
