//! The async engine: fetches card content through a [`ThrottledFetcher`],
//! writes it to the [`CardStore`], and tells subscribers what changed.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    card::{Card, CardContent, CardMeta},
    config::DeckConfig,
    error::Result,
    fetcher::ThrottledFetcher,
    search::SearchResults,
    source::ContentSource,
    store::CardStore,
};

/// A change to the stored deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeckEvent {
    CardLoaded { path: String },
    CardRemoved { path: String },
    CardsPruned { paths: Vec<String> },
}

/// What a [`Deck::sync`] did.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    /// Cards fetched and written.
    pub loaded: Vec<String>,
    /// Cards whose stored hash already matched.
    pub unchanged: usize,
    /// Cards fetched but rejected because a newer write won.
    pub stale: Vec<String>,
    /// Cards whose content could not be retrieved, with the reason.
    pub failed: Vec<(String, String)>,
    pub pruned: Vec<String>,
}

enum LoadOutcome {
    Loaded(String),
    Stale(String),
    Failed(String, String),
}

pub struct Deck<S> {
    store: Arc<CardStore>,
    source: Arc<S>,
    fetcher: ThrottledFetcher,
    events: broadcast::Sender<DeckEvent>,
    config: DeckConfig,
}

impl<S: ContentSource> Deck<S> {
    pub fn new(store: CardStore, source: S, config: DeckConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store: Arc::new(store),
            source: Arc::new(source),
            fetcher: ThrottledFetcher::new(config.concurrency),
            events,
            config,
        }
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    pub fn config(&self) -> &DeckConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeckEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DeckEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run a store operation off the async runtime.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&CardStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store)).await?
    }

    /// Fetch the card at `meta.path` and store it.
    ///
    /// The fetch time is taken before the fetch starts, so a slower load of
    /// the same path started earlier can never overwrite this one. Returns
    /// `None` when a newer write had already landed.
    pub async fn load_card(&self, meta: &CardMeta) -> Result<Option<Card>> {
        let fetch_time = self.store.now_ms();

        let source = Arc::clone(&self.source);
        let path = meta.path.clone();
        let raw = self
            .fetcher
            .fetch(async move { source.fetch(&path).await })
            .await?;

        let mut content = CardContent::from_document(&meta.path, &raw);
        content.hash = meta.hash.clone();

        let stored = self
            .blocking(move |store| store.upsert_card(content, fetch_time))
            .await?;

        if let Some(card) = &stored {
            self.emit(DeckEvent::CardLoaded {
                path: card.path.clone(),
            });
        }
        Ok(stored)
    }

    pub async fn remove_card(&self, path: &str) -> Result<bool> {
        let owned = path.to_string();
        let removed = self
            .blocking(move |store| store.remove_card(&owned))
            .await?;
        if removed {
            self.emit(DeckEvent::CardRemoved {
                path: path.to_string(),
            });
        }
        Ok(removed)
    }

    /// Remove every card whose path is not in `live`.
    pub async fn prune_cards(&self, live: Vec<String>) -> Result<Vec<String>> {
        let pruned = self
            .blocking(move |store| store.prune_cards(&live))
            .await?;
        if !pruned.is_empty() {
            self.emit(DeckEvent::CardsPruned {
                paths: pruned.clone(),
            });
        }
        Ok(pruned)
    }

    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Card>> {
        Ok(self.search_hits(query, limit).await?.into_cards())
    }

    pub async fn search_hits(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResults> {
        let limit = limit.unwrap_or(self.config.search_limit);
        let query = query.to_string();
        self.blocking(move |store| store.search_hits(&query, limit))
            .await
    }

    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<Card>> {
        let limit = limit.unwrap_or(self.config.recent_limit);
        self.blocking(move |store| store.recent(limit)).await
    }

    pub async fn get(&self, path: &str) -> Result<Option<Card>> {
        let path = path.to_string();
        self.blocking(move |store| store.get(&path)).await
    }

    /// Whether the stored card at `meta.path` is missing or has another hash.
    pub async fn needs_reload(&self, meta: &CardMeta) -> Result<bool> {
        Ok(self
            .get(&meta.path)
            .await?
            .is_none_or(|card| card.hash != meta.hash))
    }

    /// Bring the deck in line with `metas`: load every card that changed,
    /// then prune cards that are no longer listed.
    ///
    /// Retrieval failures are collected in the report and do not stop other
    /// loads. A storage failure aborts the sync.
    pub async fn sync(&self, metas: &[CardMeta]) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut changed = Vec::new();
        for meta in metas {
            if self.needs_reload(meta).await? {
                changed.push(meta);
            } else {
                report.unchanged += 1;
            }
        }
        debug!(
            changed = changed.len(),
            unchanged = report.unchanged,
            "planned sync"
        );

        let loads = changed.into_iter().map(|meta| async move {
            match self.load_card(meta).await {
                Ok(Some(card)) => Ok(LoadOutcome::Loaded(card.path)),
                Ok(None) => Ok(LoadOutcome::Stale(meta.path.clone())),
                Err(e) if e.is_fetch() => {
                    warn!(path = %meta.path, error = %e, "failed to load card");
                    Ok(LoadOutcome::Failed(meta.path.clone(), e.to_string()))
                }
                Err(e) => Err(e),
            }
        });

        for outcome in join_all(loads).await {
            match outcome? {
                LoadOutcome::Loaded(path) => report.loaded.push(path),
                LoadOutcome::Stale(path) => report.stale.push(path),
                LoadOutcome::Failed(path, reason) => {
                    report.failed.push((path, reason))
                }
            }
        }

        let live = metas.iter().map(|meta| meta.path.clone()).collect();
        report.pruned = self.prune_cards(live).await?;

        info!(
            loaded = report.loaded.len(),
            unchanged = report.unchanged,
            stale = report.stale.len(),
            failed = report.failed.len(),
            pruned = report.pruned.len(),
            "sync complete"
        );
        Ok(report)
    }
}

impl<S> std::fmt::Debug for Deck<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("store", &self.store)
            .field("concurrency", &self.fetcher.concurrency())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
