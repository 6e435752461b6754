use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::catalog::{CatalogError, DataSourceContext, SchemaCatalogClient, TableRef};
use crate::debouncer::{SearchDebouncer, SearchScope, DEFAULT_DEBOUNCE};
use crate::detail_panel::{
    fetch_panel, ActiveDetailView, DetailKind, DetailPanelController, PanelPayload, PanelTicket,
};
use crate::expansion::{ExpansionStateStore, Listing, TableLoadTicket};
use crate::system_filter::filter_user_tables;

pub const DEFAULT_SAMPLE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub sample_limit: usize,
    pub debounce: Duration,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplorerCommand {
    ReloadDatabases { search: String },
    ReloadTables { database: String, search: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseListTicket {
    pub search: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseList {
    pub search: String,
    pub names: Listing<Vec<String>>,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    Databases(DatabaseListTicket),
    Tables(TableLoadTicket),
    Panel(PanelTicket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub context: DataSourceContext,
    pub target: FetchTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    Databases(Result<Vec<String>, CatalogError>),
    Tables(Result<Vec<TableRef>, CatalogError>),
    Panel(Result<PanelPayload, CatalogError>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub request: FetchRequest,
    pub result: FetchResult,
}

pub async fn execute<C>(client: &C, request: FetchRequest, sample_limit: usize) -> FetchOutcome
where
    C: SchemaCatalogClient + ?Sized,
{
    let context = &request.context;
    let result = match &request.target {
        FetchTarget::Databases(ticket) => {
            FetchResult::Databases(client.list_databases(context, &ticket.search).await)
        }
        FetchTarget::Tables(ticket) => FetchResult::Tables(
            client
                .list_tables(context, &ticket.database, &ticket.search_term)
                .await
                .map(|raw| filter_user_tables(&ticket.database, &raw)),
        ),
        FetchTarget::Panel(ticket) => {
            FetchResult::Panel(fetch_panel(client, context, ticket, sample_limit).await)
        }
    };
    FetchOutcome { request, result }
}

// Every mutation is synchronous. Fetches go out as `FetchRequest`s and come
// back through `apply`.
#[derive(Debug)]
pub struct Explorer {
    config: ExplorerConfig,
    context: Option<DataSourceContext>,
    databases: DatabaseList,
    database_generation: u64,
    expansion: ExpansionStateStore,
    panel: DetailPanelController,
    debouncer: SearchDebouncer<SearchScope, ExplorerCommand>,
    notice: Option<String>,
}

impl Explorer {
    #[must_use]
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            config,
            context: None,
            databases: DatabaseList::default(),
            database_generation: 0,
            expansion: ExpansionStateStore::new(),
            panel: DetailPanelController::new(),
            debouncer: SearchDebouncer::new(config.debounce),
            notice: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> ExplorerConfig {
        self.config
    }

    pub fn context(&self) -> Result<&DataSourceContext, CatalogError> {
        self.context.as_ref().ok_or(CatalogError::MissingContext)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    #[must_use]
    pub fn databases(&self) -> &DatabaseList {
        &self.databases
    }

    #[must_use]
    pub fn expansion(&self) -> &ExpansionStateStore {
        &self.expansion
    }

    #[must_use]
    pub fn panel(&self) -> &ActiveDetailView {
        self.panel.view()
    }

    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    // Switching data sources drops every cache from the previous one.
    pub fn open(&mut self, context: DataSourceContext) -> FetchRequest {
        if self.context.as_ref() != Some(&context) {
            self.reset();
            info!(
                datasource_id = context.datasource_id,
                datasource = context.datasource_name.as_str(),
                "opening schema explorer"
            );
            self.context = Some(context.clone());
        }
        self.begin_database_load(context)
    }

    pub fn close(&mut self) {
        if let Some(context) = &self.context {
            info!(
                datasource_id = context.datasource_id,
                "closing schema explorer"
            );
        }
        self.reset();
    }

    pub fn refresh(&mut self) -> Result<Vec<FetchRequest>, CatalogError> {
        let context = self.context()?.clone();
        let mut requests = vec![self.begin_database_load(context.clone())];
        requests.extend(
            self.expansion
                .invalidate_all()
                .into_iter()
                .map(|ticket| FetchRequest {
                    context: context.clone(),
                    target: FetchTarget::Tables(ticket),
                }),
        );
        Ok(requests)
    }

    pub fn toggle_database(
        &mut self,
        database: &str,
    ) -> Result<Option<FetchRequest>, CatalogError> {
        let context = self.context()?.clone();
        Ok(self
            .expansion
            .toggle(database)
            .map(|ticket| FetchRequest {
                context,
                target: FetchTarget::Tables(ticket),
            }))
    }

    pub fn search_databases(&mut self, term: &str, now: Instant) -> Result<(), CatalogError> {
        self.context()?;
        self.debouncer.schedule_at(
            SearchScope::Databases,
            ExplorerCommand::ReloadDatabases {
                search: term.to_string(),
            },
            now,
        );
        Ok(())
    }

    pub fn search_tables(
        &mut self,
        database: &str,
        term: &str,
        now: Instant,
    ) -> Result<(), CatalogError> {
        self.context()?;
        self.debouncer.schedule_at(
            SearchScope::Tables(database.to_string()),
            ExplorerCommand::ReloadTables {
                database: database.to_string(),
                search: term.to_string(),
            },
            now,
        );
        Ok(())
    }

    pub fn poll_debounced(&mut self, now: Instant) -> Vec<FetchRequest> {
        let Some(context) = self.context.clone() else {
            self.debouncer.clear();
            return Vec::new();
        };

        let mut requests = Vec::new();
        for (_, command) in self.debouncer.take_due_at(now) {
            match command {
                ExplorerCommand::ReloadDatabases { search } => {
                    self.databases.search = search;
                    requests.push(self.begin_database_load(context.clone()));
                }
                ExplorerCommand::ReloadTables { database, search } => {
                    self.expansion.set_search(&database, &search);
                    if let Some(ticket) = self.expansion.request_load(&database) {
                        requests.push(FetchRequest {
                            context: context.clone(),
                            target: FetchTarget::Tables(ticket),
                        });
                    }
                }
            }
        }
        requests
    }

    pub fn open_panel(
        &mut self,
        kind: DetailKind,
        table: TableRef,
    ) -> Result<FetchRequest, CatalogError> {
        let context = self.context()?.clone();
        let ticket = self.panel.open(kind, table);
        Ok(FetchRequest {
            context,
            target: FetchTarget::Panel(ticket),
        })
    }

    pub fn refresh_sample_data(&mut self) -> Result<Option<FetchRequest>, CatalogError> {
        let ActiveDetailView::SampleData { table, .. } = self.panel.view() else {
            return Ok(None);
        };
        let table = table.clone();
        self.open_panel(DetailKind::SampleData, table).map(Some)
    }

    pub fn close_panel(&mut self) {
        self.panel.close();
    }

    // Returns `false` when the outcome was stale and dropped.
    pub fn apply(&mut self, outcome: FetchOutcome) -> bool {
        let FetchOutcome { request, result } = outcome;
        if self.context.as_ref() != Some(&request.context) {
            debug!(
                datasource_id = request.context.datasource_id,
                "discarding response for a previous data source"
            );
            return false;
        }

        match (request.target, result) {
            (FetchTarget::Databases(ticket), FetchResult::Databases(result)) => {
                self.apply_databases(&ticket, result)
            }
            (FetchTarget::Tables(ticket), FetchResult::Tables(Ok(tables))) => {
                self.expansion.set_tables(&ticket, tables)
            }
            (FetchTarget::Tables(ticket), FetchResult::Tables(Err(error))) => {
                let applied = self.expansion.set_load_error(&ticket, error.to_string());
                if applied {
                    self.report(format!(
                        "Failed to load tables of `{}`: {error}",
                        ticket.database
                    ));
                }
                applied
            }
            (FetchTarget::Panel(ticket), FetchResult::Panel(result)) => {
                let failure = result.as_ref().err().map(ToString::to_string);
                let applied = self.panel.apply(&ticket, result);
                if let (true, Some(error)) = (applied, failure) {
                    self.report(format!(
                        "Failed to load {} of `{}`: {error}",
                        ticket.kind.title().to_lowercase(),
                        ticket.table.name
                    ));
                }
                applied
            }
            (target, _) => {
                warn!(?target, "fetch result does not match its request");
                false
            }
        }
    }

    fn apply_databases(
        &mut self,
        ticket: &DatabaseListTicket,
        result: Result<Vec<String>, CatalogError>,
    ) -> bool {
        if ticket.generation != self.databases.generation {
            debug!(
                search = ticket.search.as_str(),
                "discarding stale database listing"
            );
            return false;
        }

        match result {
            Ok(names) => self.databases.names = Listing::Loaded(names),
            Err(error) => {
                self.databases.names = Listing::Failed(error.to_string());
                self.report(format!("Failed to load databases: {error}"));
            }
        }
        true
    }

    fn begin_database_load(&mut self, context: DataSourceContext) -> FetchRequest {
        self.database_generation += 1;
        self.databases.generation = self.database_generation;
        self.databases.names = Listing::Loading;
        FetchRequest {
            context,
            target: FetchTarget::Databases(DatabaseListTicket {
                search: self.databases.search.clone(),
                generation: self.database_generation,
            }),
        }
    }

    fn report(&mut self, message: String) {
        warn!("{message}");
        self.notice = Some(message);
    }

    fn reset(&mut self) {
        self.context = None;
        self.databases = DatabaseList::default();
        self.expansion.clear();
        self.panel.close();
        self.debouncer.clear();
        self.notice = None;
    }
}
