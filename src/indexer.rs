//! Keeps cards and their index entries consistent across upsert, remove and
//! prune.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::{
    card::{Card, CardContent},
    error::Result,
    store::{CardStore, IndexEntry},
    tokenizer::score_card,
};

impl CardStore {
    /// Store `card` and replace its index entries, as one transaction.
    ///
    /// Returns `None` without touching anything when the stored card is at
    /// least as new as `fetch_time` (a stale write). Otherwise the stored card
    /// gets `updated_at = max(now, fetch_time)`.
    pub fn upsert_card(
        &self,
        card: CardContent,
        fetch_time: u64,
    ) -> Result<Option<Card>> {
        // Scoring happens before the write transaction opens.
        let scores = score_card(&card);

        let mut writer = self.write()?;
        if let Some(existing) = writer.get(&card.path)? {
            if existing.updated_at >= fetch_time {
                debug!(
                    path = %card.path,
                    stored = existing.updated_at,
                    fetch_time,
                    "rejecting stale write"
                );
                writer.abort()?;
                return Ok(None);
            }
            writer.delete_index_entries_by_path(&card.path)?;
        }

        let stored = card.into_card(self.now_ms().max(fetch_time));
        let entry_count = scores.len();
        writer.put_index_entries(scores.into_iter().map(|(word, score)| {
            IndexEntry {
                word,
                path: stored.path.clone(),
                score,
            }
        }))?;
        writer.put(&stored)?;
        writer.commit()?;

        debug!(path = %stored.path, entries = entry_count, "card stored");
        Ok(Some(stored))
    }

    /// Delete a card and all of its index entries, as one transaction.
    ///
    /// Returns whether a card was stored at `path`.
    pub fn remove_card(&self, path: &str) -> Result<bool> {
        let mut writer = self.write()?;
        let entries = writer.delete_index_entries_by_path(path)?;
        let removed = writer.delete(path)?.is_some();
        writer.commit()?;

        debug!(path, entries, removed, "card removed");
        Ok(removed)
    }

    /// Remove every stored card whose path is not in `live`.
    ///
    /// Each card is removed in its own transaction. Returns the pruned paths.
    pub fn prune_cards<S: AsRef<str>>(&self, live: &[S]) -> Result<Vec<String>> {
        let live: HashSet<&str> = live.iter().map(AsRef::as_ref).collect();
        let doomed: Vec<String> = self
            .read()?
            .paths()?
            .into_iter()
            .filter(|path| !live.contains(path.as_str()))
            .collect();

        let mut pruned = Vec::with_capacity(doomed.len());
        for path in doomed {
            if self.remove_card(&path)? {
                pruned.push(path);
            }
        }

        if !pruned.is_empty() {
            info!(count = pruned.len(), "pruned cards missing from source");
        }
        Ok(pruned)
    }
}
