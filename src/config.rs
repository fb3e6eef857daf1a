use crate::{
    fetcher::DEFAULT_CONCURRENCY,
    search::{DEFAULT_RECENT_LIMIT, DEFAULT_SEARCH_LIMIT},
};

/// Tunables for a [`Deck`](crate::Deck).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckConfig {
    /// Maximum number of content fetches in flight.
    pub concurrency: usize,
    /// Result count for `search` when the caller gives none.
    pub search_limit: usize,
    /// Result count for `recent` when the caller gives none.
    pub recent_limit: usize,
    /// Events buffered per subscriber before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            search_limit: DEFAULT_SEARCH_LIMIT,
            recent_limit: DEFAULT_RECENT_LIMIT,
            event_capacity: 64,
        }
    }
}

impl DeckConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}
