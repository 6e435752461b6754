use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchScope {
    Databases,
    Tables(String),
}

#[derive(Debug)]
struct PendingAction<A> {
    due_at: Instant,
    action: A,
}

#[derive(Debug)]
pub struct SearchDebouncer<K, A> {
    delay: Duration,
    pending: HashMap<K, PendingAction<A>>,
}

impl<K: Eq + Hash, A> SearchDebouncer<K, A> {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    // Replaces whatever was pending under `key`.
    pub fn schedule_at(&mut self, key: K, action: A, now: Instant) {
        self.pending.insert(
            key,
            PendingAction {
                due_at: now + self.delay,
                action,
            },
        );
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    // Earliest deadline first.
    pub fn take_due_at(&mut self, now: Instant) -> Vec<(K, A)> {
        if !self.pending.values().any(|pending| pending.due_at <= now) {
            return Vec::new();
        }

        let mut due = Vec::new();
        for (key, pending) in std::mem::take(&mut self.pending) {
            if pending.due_at <= now {
                due.push((pending.due_at, key, pending.action));
            } else {
                self.pending.insert(key, pending);
            }
        }

        due.sort_by_key(|(due_at, _, _)| *due_at);
        due.into_iter()
            .map(|(_, key, action)| (key, action))
            .collect()
    }
}
