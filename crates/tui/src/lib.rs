use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::clipboard::CopyToClipboard;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use dbscope_core::catalog::{CatalogError, ColumnMetadata, SchemaCatalogClient, TableRef};
use dbscope_core::detail_panel::{
    ActiveDetailView, CreateStatementView, DetailKind, PanelState, StatementSource,
};
use dbscope_core::expansion::Listing;
use dbscope_core::explorer::{execute, Explorer, FetchOutcome, FetchRequest};
use dbscope_core::sample_view::{render_sample, MAX_DISPLAY_ROWS};
use dbscope_core::settings::{DataSourceEntry, Settings};
use dbscope_core::SampleDataset;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(120);
const PANEL_SCROLL_STEP: u16 = 5;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    DataSourcePicker,
    Explorer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    Normal,
    DatabaseSearch,
    TableSearch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchField {
    Databases,
    Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    Navigate(DirectionKey),
    Scroll(DirectionKey),
    Activate,
    Toggle,
    OpenPanel(DetailKind),
    StartSearch(SearchField),
    Input(char),
    Backspace,
    EndInput,
    Refresh,
    RefreshSample,
    CopyStatement,
    Back,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TreeRow {
    Database { name: String, expanded: bool },
    Table(TableRef),
    Placeholder { nested: bool, text: String },
}

impl TreeRow {
    fn database(&self) -> Option<&str> {
        match self {
            Self::Database { name, .. } => Some(name),
            Self::Table(table) => Some(&table.database),
            Self::Placeholder { .. } => None,
        }
    }
}

fn tree_rows(explorer: &Explorer) -> Vec<TreeRow> {
    let names = match &explorer.databases().names {
        Listing::NotLoaded => return Vec::new(),
        Listing::Loading => {
            return vec![TreeRow::Placeholder {
                nested: false,
                text: "Loading databases...".to_string(),
            }]
        }
        Listing::Failed(error) => {
            return vec![TreeRow::Placeholder {
                nested: false,
                text: format!("Error: {error}"),
            }]
        }
        Listing::Loaded(names) => names,
    };
    if names.is_empty() {
        return vec![TreeRow::Placeholder {
            nested: false,
            text: "No databases".to_string(),
        }];
    }

    let expansion = explorer.expansion();
    let mut rows = Vec::new();
    for name in names {
        let expanded = expansion.is_expanded(name);
        rows.push(TreeRow::Database {
            name: name.clone(),
            expanded,
        });
        if !expanded {
            continue;
        }

        let Some(entry) = expansion.entry(name) else {
            continue;
        };
        let placeholder = |text: String| TreeRow::Placeholder { nested: true, text };
        match &entry.tables {
            Listing::NotLoaded | Listing::Loading => {
                rows.push(placeholder("Loading tables...".to_string()));
            }
            Listing::Failed(error) => rows.push(placeholder(format!("Error: {error}"))),
            Listing::Loaded(tables) if tables.is_empty() => {
                rows.push(placeholder("No tables".to_string()));
            }
            Listing::Loaded(tables) => rows.extend(tables.iter().cloned().map(TreeRow::Table)),
        }
    }
    rows
}

#[derive(Debug)]
struct TuiApp {
    screen: Screen,
    datasources: Vec<DataSourceEntry>,
    picker_index: usize,
    explorer: Explorer,
    selected_row: usize,
    input_mode: InputMode,
    input: String,
    panel_scroll: u16,
    show_help: bool,
    should_quit: bool,
    status_line: String,
    outbox: Vec<FetchRequest>,
    clipboard: Option<String>,
}

impl TuiApp {
    fn new(settings: &Settings) -> Self {
        let status_line = if settings.datasources.is_empty() {
            "No data sources configured; add [[datasources]] to settings.toml".to_string()
        } else {
            "Select a data source and press Enter".to_string()
        };
        Self {
            screen: Screen::DataSourcePicker,
            datasources: settings.datasources.clone(),
            picker_index: 0,
            explorer: Explorer::new(settings.explorer_config()),
            selected_row: 0,
            input_mode: InputMode::Normal,
            input: String::new(),
            panel_scroll: 0,
            show_help: false,
            should_quit: false,
            status_line,
            outbox: Vec::new(),
            clipboard: None,
        }
    }

    fn is_typing(&self) -> bool {
        self.input_mode != InputMode::Normal
    }

    fn take_outbox(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.outbox)
    }

    fn take_clipboard(&mut self) -> Option<String> {
        self.clipboard.take()
    }

    fn handle(&mut self, msg: Msg) {
        self.handle_at(msg, Instant::now());
    }

    fn handle_at(&mut self, msg: Msg, now: Instant) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::Tick => self.on_tick(now),
            _ if self.screen == Screen::DataSourcePicker => self.handle_picker(msg),
            _ => self.handle_explorer(msg, now),
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.screen == Screen::Explorer {
            let requests = self.explorer.poll_debounced(now);
            self.outbox.extend(requests);
        }
        self.pick_up_notice();
    }

    fn apply(&mut self, outcome: FetchOutcome) {
        if !self.explorer.apply(outcome) {
            return;
        }
        self.clamp_selection();
        self.pick_up_notice();
    }

    fn pick_up_notice(&mut self) {
        if let Some(notice) = self.explorer.take_notice() {
            self.status_line = notice;
        }
    }

    fn handle_picker(&mut self, msg: Msg) {
        match msg {
            Msg::Navigate(DirectionKey::Up) => {
                self.picker_index = self.picker_index.saturating_sub(1);
            }
            Msg::Navigate(DirectionKey::Down) => {
                let max_index = self.datasources.len().saturating_sub(1);
                self.picker_index = (self.picker_index + 1).min(max_index);
            }
            Msg::Activate | Msg::Toggle => self.open_selected_datasource(),
            Msg::Back => self.status_line = "Press q to quit".to_string(),
            _ => {}
        }
    }

    fn open_selected_datasource(&mut self) {
        let Some(entry) = self.datasources.get(self.picker_index) else {
            self.status_line = "No data source selected".to_string();
            return;
        };

        let context = entry.context();
        self.status_line = format!("Browsing `{}`", context.datasource_name);
        let request = self.explorer.open(context);
        self.outbox.push(request);
        self.screen = Screen::Explorer;
        self.selected_row = 0;
        self.panel_scroll = 0;
    }

    fn handle_explorer(&mut self, msg: Msg, now: Instant) {
        match msg {
            Msg::Navigate(direction) => self.navigate_tree(direction),
            Msg::Scroll(DirectionKey::Up) => {
                self.panel_scroll = self.panel_scroll.saturating_sub(PANEL_SCROLL_STEP);
            }
            Msg::Scroll(DirectionKey::Down) => {
                self.panel_scroll = self.panel_scroll.saturating_add(PANEL_SCROLL_STEP);
            }
            Msg::Activate => match self.selected() {
                Some(TreeRow::Table(table)) => self.open_panel(DetailKind::Structure, table),
                Some(TreeRow::Database { name, .. }) => self.toggle_database(&name),
                _ => {}
            },
            Msg::Toggle => {
                if let Some(database) = self.selected().as_ref().and_then(TreeRow::database) {
                    let database = database.to_string();
                    self.toggle_database(&database);
                }
            }
            Msg::OpenPanel(kind) => match self.selected() {
                Some(TreeRow::Table(table)) => self.open_panel(kind, table),
                _ => self.status_line = "Select a table first".to_string(),
            },
            Msg::StartSearch(field) => self.start_search(field),
            Msg::Input(ch) => {
                self.input.push(ch);
                self.schedule_search(now);
            }
            Msg::Backspace => {
                self.input.pop();
                self.schedule_search(now);
            }
            Msg::EndInput => {
                self.input_mode = InputMode::Normal;
                self.input.clear();
            }
            Msg::Refresh => match self.explorer.refresh() {
                Ok(requests) => {
                    self.outbox.extend(requests);
                    self.status_line = "Refreshing...".to_string();
                }
                Err(error) => self.status_line = error.to_string(),
            },
            Msg::RefreshSample => match self.explorer.refresh_sample_data() {
                Ok(Some(request)) => {
                    self.outbox.push(request);
                    self.panel_scroll = 0;
                }
                Ok(None) => self.status_line = "Open sample data first".to_string(),
                Err(error) => self.status_line = error.to_string(),
            },
            Msg::CopyStatement => self.copy_statement(),
            Msg::Back => self.back(),
            Msg::Quit | Msg::ToggleHelp | Msg::Tick => {}
        }
    }

    fn copy_statement(&mut self) {
        match self.explorer.panel() {
            ActiveDetailView::CreateStatement {
                state:
                    PanelState {
                        data: Some(statement),
                        ..
                    },
                ..
            } if !statement.sql.trim().is_empty() => {
                self.clipboard = Some(statement.sql.clone());
            }
            _ => self.status_line = "No create statement loaded".to_string(),
        }
    }

    fn back(&mut self) {
        if self.explorer.panel().is_open() {
            self.explorer.close_panel();
            self.panel_scroll = 0;
            return;
        }

        self.explorer.close();
        self.screen = Screen::DataSourcePicker;
        self.selected_row = 0;
        self.status_line = "Explorer closed".to_string();
    }

    fn selected(&self) -> Option<TreeRow> {
        tree_rows(&self.explorer).into_iter().nth(self.selected_row)
    }

    fn navigate_tree(&mut self, direction: DirectionKey) {
        let row_count = tree_rows(&self.explorer).len();
        match direction {
            DirectionKey::Up => self.selected_row = self.selected_row.saturating_sub(1),
            DirectionKey::Down => {
                self.selected_row = (self.selected_row + 1).min(row_count.saturating_sub(1));
            }
        }
    }

    fn clamp_selection(&mut self) {
        let row_count = tree_rows(&self.explorer).len();
        self.selected_row = self.selected_row.min(row_count.saturating_sub(1));
    }

    fn toggle_database(&mut self, database: &str) {
        let result = self.explorer.toggle_database(database);
        self.track(result.map(|request| request.into_iter().collect()));
        if !self.explorer.expansion().is_expanded(database) {
            if let Some(index) = tree_rows(&self.explorer)
                .iter()
                .position(|row| matches!(row, TreeRow::Database { name, .. } if name == database))
            {
                self.selected_row = index;
            }
        }
        self.clamp_selection();
    }

    fn open_panel(&mut self, kind: DetailKind, table: TableRef) {
        self.panel_scroll = 0;
        let result = self.explorer.open_panel(kind, table);
        self.track(result.map(|request| vec![request]));
    }

    fn start_search(&mut self, field: SearchField) {
        match field {
            SearchField::Databases => {
                self.input = self.explorer.databases().search.clone();
                self.input_mode = InputMode::DatabaseSearch;
            }
            SearchField::Tables => {
                let Some(database) = self
                    .selected()
                    .as_ref()
                    .and_then(TreeRow::database)
                    .map(str::to_string)
                else {
                    self.status_line = "Select a database to search its tables".to_string();
                    return;
                };
                self.input = self.explorer.expansion().search_term(&database).to_string();
                self.input_mode = InputMode::TableSearch(database);
            }
        }
    }

    fn schedule_search(&mut self, now: Instant) {
        let result = match &self.input_mode {
            InputMode::Normal => return,
            InputMode::DatabaseSearch => self.explorer.search_databases(&self.input, now),
            InputMode::TableSearch(database) => {
                self.explorer.search_tables(database, &self.input, now)
            }
        };
        if let Err(error) = result {
            self.status_line = error.to_string();
        }
    }

    fn track(&mut self, result: Result<Vec<FetchRequest>, CatalogError>) {
        match result {
            Ok(requests) => self.outbox.extend(requests),
            Err(error) => self.status_line = error.to_string(),
        }
    }
}

pub fn run<C>(client: Arc<C>, settings: &Settings) -> Result<(), TuiError>
where
    C: SchemaCatalogClient + 'static,
{
    let runtime = Runtime::new()?;
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &runtime, client, settings);
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop<C>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    runtime: &Runtime,
    client: Arc<C>,
    settings: &Settings,
) -> Result<(), TuiError>
where
    C: SchemaCatalogClient + 'static,
{
    let mut app = TuiApp::new(settings);
    let sample_limit = app.explorer.config().sample_limit;
    let (sender, mut receiver) = mpsc::unbounded_channel::<FetchOutcome>();
    let mut last_tick = Instant::now();
    info!("explorer ui started");

    loop {
        for request in app.take_outbox() {
            let client = Arc::clone(&client);
            let sender = sender.clone();
            runtime.spawn(async move {
                let outcome = execute(client.as_ref(), request, sample_limit).await;
                if sender.send(outcome).is_err() {
                    debug!("ui loop gone, dropping fetch outcome");
                }
            });
        }

        while let Ok(outcome) = receiver.try_recv() {
            app.apply(outcome);
        }

        terminal.draw(|frame| render(frame, &app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key, app.is_typing()) {
                        app.handle(message);
                    }
                }
            }
        }

        if let Some(sql) = app.take_clipboard() {
            app.status_line = match execute!(
                terminal.backend_mut(),
                CopyToClipboard::to_clipboard_from(sql)
            ) {
                Ok(()) => "Create statement copied to clipboard".to_string(),
                Err(error) => {
                    warn!(error = %error, "clipboard copy failed");
                    format!("Copy failed: {error}")
                }
            };
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    info!("explorer ui stopped");
    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let datasource = app
        .explorer
        .context()
        .map_or("none", |context| context.datasource_name.as_str());
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" Data source: {datasource} "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!(
            "Database filter: {}",
            display_term(&app.explorer.databases().search)
        )),
        Span::raw(" | "),
        Span::raw(format!(
            "Panel: {}",
            app.explorer
                .panel()
                .kind()
                .map_or("closed", DetailKind::title)
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).title("dbscope"));
    frame.render_widget(header, chunks[0]);

    match app.screen {
        Screen::DataSourcePicker => render_picker(frame, app, chunks[1]),
        Screen::Explorer => {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
                .split(chunks[1]);
            render_tree(frame, app, columns[0]);
            render_panel(frame, app, columns[1]);
        }
    }

    let prompt = match &app.input_mode {
        InputMode::Normal => key_hints(app.screen).to_string(),
        InputMode::DatabaseSearch => format!("Search databases: {}_", app.input),
        InputMode::TableSearch(database) => {
            format!("Search tables in `{database}`: {}_", app.input)
        }
    };
    let footer = Paragraph::new(vec![
        Line::from(prompt),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, chunks[2]);

    if app.show_help {
        render_help_popup(frame);
    }
}

fn display_term(term: &str) -> &str {
    if term.is_empty() {
        "-"
    } else {
        term
    }
}

fn key_hints(screen: Screen) -> &'static str {
    match screen {
        Screen::DataSourcePicker => "j/k: select | Enter: open | ?: help | q: quit",
        Screen::Explorer => {
            "Enter/Space: expand | s/d/c: structure/data/DDL | y: copy DDL | /: databases | f: tables | r: refresh | Esc: back"
        }
    }
}

fn render_picker(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let mut lines = vec![Line::from("Configured data sources"), Line::from("")];
    for (index, entry) in app.datasources.iter().enumerate() {
        let marker = if index == app.picker_index { ">" } else { " " };
        lines.push(Line::from(format!("{marker} {} (#{})", entry.name, entry.id)));
    }
    if app.datasources.is_empty() {
        lines.push(Line::from("No data sources configured"));
    }

    let picker = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Data sources"))
        .alignment(Alignment::Left);
    frame.render_widget(picker, area);
}

fn render_tree(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let rows = tree_rows(&app.explorer);
    let visible = usize::from(area.height.saturating_sub(2)).max(1);
    let window_start = app.selected_row.saturating_sub(visible.saturating_sub(1));

    let lines = rows
        .iter()
        .enumerate()
        .skip(window_start)
        .take(visible)
        .map(|(index, row)| {
            let marker = if index == app.selected_row { ">" } else { " " };
            let text = match row {
                TreeRow::Database { name, expanded } => {
                    let arrow = if *expanded { "v" } else { "+" };
                    let search = app.explorer.expansion().search_term(name);
                    if search.is_empty() {
                        format!("{marker} {arrow} {name}")
                    } else {
                        format!("{marker} {arrow} {name} [{search}]")
                    }
                }
                TreeRow::Table(table) => format!("{marker}     {}", table.name),
                TreeRow::Placeholder { nested, text } => {
                    let indent = if *nested { "    " } else { "" };
                    format!("{marker} {indent}{text}")
                }
            };
            let line = Line::from(text);
            if index == app.selected_row {
                line.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                line
            }
        })
        .collect::<Vec<_>>();

    let tree = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Schema"));
    frame.render_widget(tree, area);
}

fn render_panel(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let view = app.explorer.panel();
    let title = match (view.kind(), view.table()) {
        (Some(kind), Some(table)) => format!("{} - {}.{}", kind.title(), table.database, table.name),
        _ => "Details".to_string(),
    };
    let lines = panel_lines(view)
        .into_iter()
        .map(Line::from)
        .collect::<Vec<_>>();

    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((app.panel_scroll, 0));
    frame.render_widget(panel, area);
}

fn panel_lines(view: &ActiveDetailView) -> Vec<String> {
    match view {
        ActiveDetailView::Closed => vec![
            "Select a table and press s, d or c.".to_string(),
            "Esc closes the panel, a second Esc leaves the explorer.".to_string(),
        ],
        ActiveDetailView::Structure { state, .. } => {
            state_lines(state, |columns| structure_lines(columns))
        }
        ActiveDetailView::SampleData { state, .. } => state_lines(state, sample_lines),
        ActiveDetailView::CreateStatement { state, .. } => state_lines(state, statement_lines),
    }
}

fn state_lines<T>(state: &PanelState<T>, render: impl Fn(&T) -> Vec<String>) -> Vec<String> {
    if state.loading {
        return vec!["Loading...".to_string()];
    }
    if let Some(error) = &state.error {
        return vec![format!("Error: {error}")];
    }
    state.data.as_ref().map(render).unwrap_or_default()
}

fn structure_lines(columns: &[ColumnMetadata]) -> Vec<String> {
    if columns.is_empty() {
        return vec!["No columns".to_string()];
    }

    let name_width = columns
        .iter()
        .map(|column| column.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Column".len());
    let mut lines = vec![format!(
        "{:name_width$}  {:<18} {:<8} {:<3} {:<3} {:<12} Comment",
        "Column", "Type", "Null", "PK", "AI", "Default"
    )];
    for column in columns {
        let data_type = match column.size {
            Some(size) => format!("{}({size})", column.data_type),
            None => column.data_type.clone(),
        };
        lines.push(format!(
            "{:name_width$}  {:<18} {:<8} {:<3} {:<3} {:<12} {}",
            column.name,
            data_type,
            if column.nullable { "NULL" } else { "NOT NULL" },
            if column.primary_key { "yes" } else { "" },
            if column.auto_increment { "yes" } else { "" },
            column.default_value.as_deref().unwrap_or(""),
            column.comment.as_deref().unwrap_or(""),
        ));
    }
    lines
}

fn sample_lines(dataset: &SampleDataset) -> Vec<String> {
    let page = render_sample(dataset, MAX_DISPLAY_ROWS);
    let mut summary = format!("{} rows", page.count);
    if let Some(elapsed) = page.execution_time_ms {
        summary.push_str(&format!(" in {elapsed} ms"));
    }
    let mut lines = vec![summary];
    if page.columns.is_empty() {
        lines.push("No columns".to_string());
        return lines;
    }

    lines.push(page.columns.join(" | "));
    lines.extend(page.rows.iter().map(|row| {
        row.iter()
            .map(|cell| cell.text().to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }));
    if page.is_truncated() {
        lines.push(format!(
            "Showing first {} of {} rows",
            page.rows.len(),
            page.total_rows
        ));
    }
    lines
}

fn statement_lines(statement: &CreateStatementView) -> Vec<String> {
    let mut lines = Vec::new();
    if statement.source == StatementSource::Synthesized {
        lines.push("(reconstructed from column metadata)".to_string());
        lines.push(String::new());
    }
    lines.extend(statement.sql.lines().map(str::to_string));
    lines
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keymap"),
        Line::from("q / Ctrl+C: quit"),
        Line::from("?: toggle help"),
        Line::from("j/k or arrows: move selection"),
        Line::from("Enter: expand database or show table structure"),
        Line::from("Space: expand or collapse database"),
        Line::from("s / d / c: structure, sample data, create statement"),
        Line::from("y: copy the loaded create statement"),
        Line::from("/: search databases, f: search tables of selected database"),
        Line::from("r: refresh lists, R: reload sample data"),
        Line::from("PgUp/PgDn: scroll details"),
        Line::from("Esc: close details, then leave the explorer"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent, typing: bool) -> Option<Msg> {
    if typing {
        return match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(Msg::Quit),
            (_, KeyCode::Enter | KeyCode::Esc) => Some(Msg::EndInput),
            (_, KeyCode::Backspace) => Some(Msg::Backspace),
            (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(ch)) => Some(Msg::Input(ch)),
            _ => None,
        };
    }

    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => Some(Msg::Quit),
        (_, KeyCode::Char('?')) => Some(Msg::ToggleHelp),
        (_, KeyCode::Esc) => Some(Msg::Back),
        (_, KeyCode::Enter) => Some(Msg::Activate),
        (_, KeyCode::Char(' ')) => Some(Msg::Toggle),
        (_, KeyCode::Char('s')) => Some(Msg::OpenPanel(DetailKind::Structure)),
        (_, KeyCode::Char('d')) => Some(Msg::OpenPanel(DetailKind::SampleData)),
        (_, KeyCode::Char('c')) => Some(Msg::OpenPanel(DetailKind::CreateStatement)),
        (_, KeyCode::Char('/')) => Some(Msg::StartSearch(SearchField::Databases)),
        (_, KeyCode::Char('f')) => Some(Msg::StartSearch(SearchField::Tables)),
        (_, KeyCode::Char('r')) => Some(Msg::Refresh),
        (_, KeyCode::Char('R')) => Some(Msg::RefreshSample),
        (_, KeyCode::Char('y')) => Some(Msg::CopyStatement),
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::PageUp) => Some(Msg::Scroll(DirectionKey::Up)),
        (_, KeyCode::PageDown) => Some(Msg::Scroll(DirectionKey::Down)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use dbscope_core::catalog::{ColumnMetadata, SampleDataset, TableRef};
    use dbscope_core::detail_panel::{
        ActiveDetailView, CreateStatementView, DetailKind, PanelPayload, StatementSource,
    };
    use dbscope_core::explorer::{FetchOutcome, FetchResult, FetchTarget};
    use dbscope_core::settings::{DataSourceEntry, Settings};
    use serde_json::json;

    use super::{
        map_key_event, panel_lines, sample_lines, structure_lines, tree_rows, DirectionKey,
        InputMode, Msg, Screen, SearchField, TreeRow, TuiApp,
    };

    fn settings() -> Settings {
        Settings {
            datasources: vec![
                DataSourceEntry {
                    id: 1,
                    name: "warehouse".to_string(),
                },
                DataSourceEntry {
                    id: 2,
                    name: "billing".to_string(),
                },
            ],
            ..Settings::default()
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn open_app() -> TuiApp {
        let mut app = TuiApp::new(&settings());
        app.handle(Msg::Activate);
        let request = app.take_outbox().pop().expect("database load request");
        app.apply(FetchOutcome {
            request,
            result: FetchResult::Databases(Ok(vec!["autoapi".to_string(), "crm".to_string()])),
        });
        app
    }

    fn complete_tables(app: &mut TuiApp, tables: &[&str]) {
        let request = app.take_outbox().pop().expect("table load request");
        let FetchTarget::Tables(ticket) = &request.target else {
            panic!("expected table request");
        };
        let tables = tables
            .iter()
            .map(|name| TableRef::new(ticket.database.clone(), *name))
            .collect();
        app.apply(FetchOutcome {
            request,
            result: FetchResult::Tables(Ok(tables)),
        });
    }

    #[test]
    fn keymap_supports_explorer_keys() {
        assert_eq!(map_key_event(key(KeyCode::Char('q')), false), Some(Msg::Quit));
        assert_eq!(map_key_event(key(KeyCode::Esc), false), Some(Msg::Back));
        assert_eq!(
            map_key_event(key(KeyCode::Char('d')), false),
            Some(Msg::OpenPanel(DetailKind::SampleData))
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('/')), false),
            Some(Msg::StartSearch(SearchField::Databases))
        );
        assert_eq!(
            map_key_event(
                KeyEvent::new(KeyCode::Char('R'), KeyModifiers::SHIFT),
                false
            ),
            Some(Msg::RefreshSample)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('y')), false),
            Some(Msg::CopyStatement)
        );
        assert_eq!(map_key_event(key(KeyCode::Char('y')), true), Some(Msg::Input('y')));
        assert_eq!(
            map_key_event(
                KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
                false
            ),
            Some(Msg::Quit)
        );
    }

    #[test]
    fn keymap_types_text_while_searching() {
        assert_eq!(map_key_event(key(KeyCode::Char('q')), true), Some(Msg::Input('q')));
        assert_eq!(map_key_event(key(KeyCode::Char('s')), true), Some(Msg::Input('s')));
        assert_eq!(map_key_event(key(KeyCode::Backspace), true), Some(Msg::Backspace));
        assert_eq!(map_key_event(key(KeyCode::Esc), true), Some(Msg::EndInput));
    }

    #[test]
    fn picking_a_data_source_opens_the_explorer() {
        let mut app = TuiApp::new(&settings());
        assert_eq!(app.screen, Screen::DataSourcePicker);

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Activate);

        assert_eq!(app.screen, Screen::Explorer);
        let requests = app.take_outbox();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].context.datasource_name, "billing");
        assert!(matches!(requests[0].target, FetchTarget::Databases(_)));
    }

    #[test]
    fn expanding_database_lists_tables_once() {
        let mut app = open_app();
        app.handle(Msg::Activate);
        complete_tables(&mut app, &["orders", "users"]);

        let rows = tree_rows(&app.explorer);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], TreeRow::Table(TableRef::new("autoapi", "orders")));

        app.handle(Msg::Toggle);
        app.handle(Msg::Toggle);
        assert!(app.take_outbox().is_empty());
        assert_eq!(tree_rows(&app.explorer).len(), 4);
    }

    #[test]
    fn table_actions_open_panels_and_escape_steps_back() {
        let mut app = open_app();
        app.handle(Msg::Activate);
        complete_tables(&mut app, &["orders"]);

        app.handle(Msg::OpenPanel(DetailKind::Structure));
        assert_eq!(app.status_line, "Select a table first");

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::OpenPanel(DetailKind::CreateStatement));
        assert_eq!(app.take_outbox().len(), 1);
        assert!(app.explorer.panel().is_loading());

        app.handle(Msg::Back);
        assert_eq!(app.explorer.panel(), &ActiveDetailView::Closed);
        assert_eq!(app.screen, Screen::Explorer);

        app.handle(Msg::Back);
        assert_eq!(app.screen, Screen::DataSourcePicker);
        assert!(!app.explorer.is_open());
    }

    #[test]
    fn copy_needs_a_loaded_create_statement() {
        let mut app = open_app();
        app.handle(Msg::Activate);
        complete_tables(&mut app, &["orders"]);

        app.handle(Msg::CopyStatement);
        assert_eq!(app.status_line, "No create statement loaded");
        assert_eq!(app.take_clipboard(), None);

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::OpenPanel(DetailKind::CreateStatement));
        let request = app.take_outbox().pop().expect("create statement request");

        app.handle(Msg::CopyStatement);
        assert_eq!(app.take_clipboard(), None);

        let sql = "CREATE TABLE `orders` (\n  `id` INT NOT NULL\n);";
        app.apply(FetchOutcome {
            request,
            result: FetchResult::Panel(Ok(PanelPayload::CreateStatement(CreateStatementView {
                sql: sql.to_string(),
                source: StatementSource::Backend,
            }))),
        });
        app.handle(Msg::CopyStatement);
        assert_eq!(app.take_clipboard().as_deref(), Some(sql));
        assert_eq!(app.take_clipboard(), None);
    }

    #[test]
    fn typing_a_table_search_reloads_after_quiet_period() {
        let mut app = open_app();
        app.handle(Msg::Activate);
        complete_tables(&mut app, &["orders", "users"]);

        let start = Instant::now();
        app.handle_at(Msg::StartSearch(SearchField::Tables), start);
        assert_eq!(app.input_mode, InputMode::TableSearch("autoapi".to_string()));
        app.handle_at(Msg::Input('u'), start);
        app.handle_at(Msg::Input('s'), start + Duration::from_millis(100));

        app.handle_at(Msg::Tick, start + Duration::from_millis(300));
        assert!(app.take_outbox().is_empty());

        app.handle_at(Msg::Tick, start + Duration::from_millis(700));
        let requests = app.take_outbox();
        assert_eq!(requests.len(), 1);
        let FetchTarget::Tables(ticket) = &requests[0].target else {
            panic!("expected table request");
        };
        assert_eq!(ticket.search_term, "us");

        app.handle(Msg::EndInput);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn failed_listing_shows_error_row_and_status() {
        let mut app = TuiApp::new(&settings());
        app.handle(Msg::Activate);
        let request = app.take_outbox().pop().expect("request");
        app.apply(FetchOutcome {
            request,
            result: FetchResult::Databases(Err(dbscope_core::CatalogError::Network(
                "HTTP 503 Service Unavailable".to_string(),
            ))),
        });

        assert_eq!(
            tree_rows(&app.explorer),
            vec![TreeRow::Placeholder {
                nested: false,
                text: "Error: request failed: HTTP 503 Service Unavailable".to_string(),
            }]
        );
        assert!(app.status_line.starts_with("Failed to load databases"));
    }

    #[test]
    fn structure_lines_show_nullability_and_keys() {
        let id = ColumnMetadata {
            nullable: false,
            primary_key: true,
            ..ColumnMetadata::new("id", "INT")
        };
        let lines = structure_lines(&[id, ColumnMetadata::new("email", "VARCHAR")]);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("NOT NULL"));
        assert!(lines[1].contains("yes"));
        assert!(lines[2].contains("NULL"));
    }

    #[test]
    fn sample_lines_render_placeholders_and_truncation_notice() {
        let dataset = SampleDataset {
            columns: vec!["id".to_string(), "note".to_string()],
            rows: (0..120).map(|n| json!({ "id": n, "note": null })).collect(),
            count: 120,
            execution_time_ms: Some(9),
        };
        let lines = sample_lines(&dataset);

        assert_eq!(lines[0], "120 rows in 9 ms");
        assert_eq!(lines[1], "id | note");
        assert_eq!(lines[2], "0 | NULL");
        assert_eq!(
            lines.last().map(String::as_str),
            Some("Showing first 100 of 120 rows")
        );
    }

    #[test]
    fn closed_panel_shows_hint() {
        let lines = panel_lines(&ActiveDetailView::Closed);
        assert!(lines[0].contains("press s, d or c"));
    }
}
