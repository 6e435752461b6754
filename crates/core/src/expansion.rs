use std::collections::HashMap;

use tracing::{debug, trace};

use crate::catalog::TableRef;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Listing<T> {
    #[default]
    NotLoaded,
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> Listing<T> {
    #[must_use]
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    fn needs_fetch(&self) -> bool {
        matches!(self, Self::NotLoaded | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoadTicket {
    pub database: String,
    pub search_term: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpansionEntry {
    pub expanded: bool,
    pub search_term: String,
    pub tables: Listing<Vec<TableRef>>,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ExpansionStateStore {
    entries: HashMap<String, ExpansionEntry>,
    // Never reset, so tickets issued before `clear` can not match new entries.
    next_generation: u64,
}

impl ExpansionStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry(&self, database: &str) -> Option<&ExpansionEntry> {
        self.entries.get(database)
    }

    #[must_use]
    pub fn is_expanded(&self, database: &str) -> bool {
        self.entries
            .get(database)
            .is_some_and(|entry| entry.expanded)
    }

    #[must_use]
    pub fn tables(&self, database: &str) -> Option<&[TableRef]> {
        self.entries
            .get(database)
            .and_then(|entry| entry.tables.loaded())
            .map(Vec::as_slice)
    }

    #[must_use]
    pub fn search_term(&self, database: &str) -> &str {
        self.entries
            .get(database)
            .map_or("", |entry| entry.search_term.as_str())
    }

    #[must_use]
    pub fn expanded_databases(&self) -> Vec<&str> {
        let mut expanded = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expanded)
            .map(|(database, _)| database.as_str())
            .collect::<Vec<_>>();
        expanded.sort_unstable();
        expanded
    }

    pub fn toggle(&mut self, database: &str) -> Option<TableLoadTicket> {
        let entry = self.entries.entry(database.to_string()).or_default();
        entry.expanded = !entry.expanded;
        debug!(database, expanded = entry.expanded, "toggled database");
        if !entry.expanded {
            return None;
        }
        self.request_load(database)
    }

    // Loaded and in-flight listings are left alone.
    pub fn request_load(&mut self, database: &str) -> Option<TableLoadTicket> {
        let generation = self.next_generation + 1;
        let entry = self.entries.get_mut(database)?;
        if !entry.expanded || !entry.tables.needs_fetch() {
            trace!(database, "table listing already cached or in flight");
            return None;
        }

        self.next_generation = generation;
        entry.generation = generation;
        entry.tables = Listing::Loading;
        Some(TableLoadTicket {
            database: database.to_string(),
            search_term: entry.search_term.clone(),
            generation,
        })
    }

    pub fn set_search(&mut self, database: &str, term: &str) -> bool {
        let entry = self.entries.entry(database.to_string()).or_default();
        if entry.search_term == term {
            return false;
        }
        entry.search_term = term.to_string();
        entry.tables = Listing::NotLoaded;
        self.next_generation += 1;
        entry.generation = self.next_generation;
        true
    }

    pub fn invalidate_all(&mut self) -> Vec<TableLoadTicket> {
        self.next_generation += 1;
        let generation = self.next_generation;
        for entry in self.entries.values_mut() {
            entry.tables = Listing::NotLoaded;
            entry.generation = generation;
        }

        let expanded = self
            .expanded_databases()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        expanded
            .iter()
            .filter_map(|database| self.request_load(database))
            .collect()
    }

    #[must_use]
    pub fn is_current(&self, ticket: &TableLoadTicket) -> bool {
        self.entries.get(&ticket.database).is_some_and(|entry| {
            entry.generation == ticket.generation && entry.search_term == ticket.search_term
        })
    }

    // Collapsed entries still accept the listing but stay collapsed.
    pub fn set_tables(&mut self, ticket: &TableLoadTicket, tables: Vec<TableRef>) -> bool {
        self.resolve(ticket, Listing::Loaded(tables))
    }

    pub fn set_load_error(&mut self, ticket: &TableLoadTicket, message: impl Into<String>) -> bool {
        self.resolve(ticket, Listing::Failed(message.into()))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn resolve(&mut self, ticket: &TableLoadTicket, listing: Listing<Vec<TableRef>>) -> bool {
        if !self.is_current(ticket) {
            debug!(
                database = ticket.database.as_str(),
                search = ticket.search_term.as_str(),
                "discarding stale table listing"
            );
            return false;
        }
        if let Some(entry) = self.entries.get_mut(&ticket.database) {
            entry.tables = listing;
        }
        true
    }
}
