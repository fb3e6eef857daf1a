use std::{path::Path, sync::Arc};

use redb::{
    Database,
    ReadTransaction,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    WriteTransaction,
};

use crate::{
    card::Card,
    clock::{Clock, SystemClock},
    error::{Error, Result},
};

/// `path -> Card` (JSON).
const CARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("cards");
/// `(updated_at, path)`: the by-updatedAt ordering of cards.
const CARDS_BY_UPDATED_AT: TableDefinition<(u64, &str), ()> =
    TableDefinition::new("cards_by_updated_at");
/// `(word, path) -> score`. Ordered by word, so it is also the by-word index.
const SEARCH_INDEX: TableDefinition<(&str, &str), u32> =
    TableDefinition::new("search_index");
/// `(path, word)`: the by-path index over `SEARCH_INDEX`.
const SEARCH_INDEX_BY_PATH: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("search_index_by_path");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

pub const SCHEMA_VERSION: u64 = 2;
const SCHEMA_VERSION_KEY: &str = "schema_version";

/// One `(word, path, score)` row of the inverted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub word: String,
    pub path: String,
    pub score: u32,
}

/// Durable card storage with an inverted search index.
///
/// Every mutation goes through a [`CardWriter`], which wraps a single redb
/// write transaction: either all of its changes commit or none do. Reads go
/// through a [`CardReader`] snapshot and never see a half-applied write.
pub struct CardStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl CardStore {
    /// Open or create a card database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use deckdb::CardStore;
    ///
    /// let store = CardStore::open(&tmp.path().join("cards.redb")).unwrap();
    /// assert!(store.get("/missing.md").unwrap().is_none());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CARDS)?;
        txn.open_table(CARDS_BY_UPDATED_AT)?;
        txn.open_table(SEARCH_INDEX)?;
        txn.open_table(SEARCH_INDEX_BY_PATH)?;
        {
            let mut meta = txn.open_table(META)?;
            let found = meta.get(SCHEMA_VERSION_KEY)?.map(|v| v.value());
            if let Some(version) = found
                && version > SCHEMA_VERSION
            {
                return Err(Error::Config(format!(
                    "card database schema version {version} is newer than supported version {SCHEMA_VERSION}"
                )));
            }
            meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)?;
        }
        txn.commit()?;

        Ok(Self { db, clock })
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Take a consistent read snapshot.
    pub fn read(&self) -> Result<CardReader> {
        Ok(CardReader {
            txn: self.db.begin_read()?,
        })
    }

    /// Start a write transaction. Dropping the writer without
    /// [`CardWriter::commit`] discards every change made through it.
    pub(crate) fn write(&self) -> Result<CardWriter> {
        Ok(CardWriter {
            txn: self.db.begin_write()?,
        })
    }
}

impl std::fmt::Debug for CardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStore").finish_non_exhaustive()
    }
}

fn decode_card(bytes: &[u8]) -> Result<Card> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Card and index mutations inside one write transaction.
pub(crate) struct CardWriter {
    txn: WriteTransaction,
}

impl CardWriter {
    pub fn get(&self, path: &str) -> Result<Option<Card>> {
        let cards = self.txn.open_table(CARDS)?;
        cards.get(path)?.map(|v| decode_card(v.value())).transpose()
    }

    /// Insert or replace a card, keeping the by-updatedAt index in step.
    pub fn put(&mut self, card: &Card) -> Result<()> {
        let bytes = serde_json::to_vec(card)?;
        let previous = self.get(&card.path)?;

        let mut by_updated = self.txn.open_table(CARDS_BY_UPDATED_AT)?;
        if let Some(previous) = previous {
            by_updated.remove((previous.updated_at, previous.path.as_str()))?;
        }
        by_updated.insert((card.updated_at, card.path.as_str()), ())?;

        let mut cards = self.txn.open_table(CARDS)?;
        cards.insert(card.path.as_str(), bytes.as_slice())?;
        Ok(())
    }

    /// Delete a card row. Its index entries are left alone.
    pub fn delete(&mut self, path: &str) -> Result<Option<Card>> {
        let removed = {
            let mut cards = self.txn.open_table(CARDS)?;
            cards
                .remove(path)?
                .map(|v| decode_card(v.value()))
                .transpose()?
        };
        if let Some(card) = &removed {
            let mut by_updated = self.txn.open_table(CARDS_BY_UPDATED_AT)?;
            by_updated.remove((card.updated_at, path))?;
        }
        Ok(removed)
    }

    pub fn put_index_entries(
        &mut self,
        entries: impl IntoIterator<Item = IndexEntry>,
    ) -> Result<()> {
        let mut index = self.txn.open_table(SEARCH_INDEX)?;
        let mut by_path = self.txn.open_table(SEARCH_INDEX_BY_PATH)?;
        for entry in entries {
            index.insert((entry.word.as_str(), entry.path.as_str()), entry.score)?;
            by_path.insert((entry.path.as_str(), entry.word.as_str()), ())?;
        }
        Ok(())
    }

    /// Remove every index entry belonging to `path`; returns how many.
    pub fn delete_index_entries_by_path(&mut self, path: &str) -> Result<usize> {
        let mut by_path = self.txn.open_table(SEARCH_INDEX_BY_PATH)?;
        let mut words = Vec::new();
        for entry in by_path.range((path, "")..)? {
            let (key, _) = entry?;
            let (owner, word) = key.value();
            if owner != path {
                break;
            }
            words.push(word.to_string());
        }

        let mut index = self.txn.open_table(SEARCH_INDEX)?;
        for word in &words {
            index.remove((word.as_str(), path))?;
            by_path.remove((path, word.as_str()))?;
        }
        Ok(words.len())
    }

    pub fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn abort(self) -> Result<()> {
        self.txn.abort()?;
        Ok(())
    }
}

/// A read-only snapshot of cards and index entries.
pub struct CardReader {
    txn: ReadTransaction,
}

impl CardReader {
    pub fn get(&self, path: &str) -> Result<Option<Card>> {
        let cards = self.txn.open_table(CARDS)?;
        cards.get(path)?.map(|v| decode_card(v.value())).transpose()
    }

    /// All index entries for `word`, in path order.
    pub fn index_entries_by_word(&self, word: &str) -> Result<Vec<IndexEntry>> {
        let index = self.txn.open_table(SEARCH_INDEX)?;
        let mut entries = Vec::new();
        for entry in index.range((word, "")..)? {
            let (key, score) = entry?;
            let (found, path) = key.value();
            if found != word {
                break;
            }
            entries.push(IndexEntry {
                word: word.to_string(),
                path: path.to_string(),
                score: score.value(),
            });
        }
        Ok(entries)
    }

    /// All index entries owned by `path`, in word order.
    pub fn index_entries_by_path(&self, path: &str) -> Result<Vec<IndexEntry>> {
        let by_path = self.txn.open_table(SEARCH_INDEX_BY_PATH)?;
        let index = self.txn.open_table(SEARCH_INDEX)?;
        let mut entries = Vec::new();
        for entry in by_path.range((path, "")..)? {
            let (key, _) = entry?;
            let (owner, word) = key.value();
            if owner != path {
                break;
            }
            if let Some(score) = index.get((word, path))? {
                entries.push(IndexEntry {
                    word: word.to_string(),
                    path: path.to_string(),
                    score: score.value(),
                });
            }
        }
        Ok(entries)
    }

    /// Every stored card, in path order.
    pub fn cards(&self) -> Result<Vec<Card>> {
        let cards = self.txn.open_table(CARDS)?;
        let mut result = Vec::new();
        for entry in cards.iter()? {
            let (_, v) = entry?;
            result.push(decode_card(v.value())?);
        }
        Ok(result)
    }

    pub fn paths(&self) -> Result<Vec<String>> {
        let cards = self.txn.open_table(CARDS)?;
        let mut result = Vec::new();
        for entry in cards.iter()? {
            let (k, _) = entry?;
            result.push(k.value().to_string());
        }
        Ok(result)
    }

    /// Up to `limit` cards, most recently updated first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Card>> {
        let by_updated = self.txn.open_table(CARDS_BY_UPDATED_AT)?;
        let cards = self.txn.open_table(CARDS)?;
        let mut result = Vec::new();
        for entry in by_updated.iter()?.rev() {
            if result.len() >= limit {
                break;
            }
            let (key, _) = entry?;
            let (_, path) = key.value();
            if let Some(v) = cards.get(path)? {
                result.push(decode_card(v.value())?);
            }
        }
        Ok(result)
    }

    pub fn card_count(&self) -> Result<u64> {
        Ok(self.txn.open_table(CARDS)?.len()?)
    }

    pub fn index_entry_count(&self) -> Result<u64> {
        Ok(self.txn.open_table(SEARCH_INDEX)?.len()?)
    }

    pub fn schema_version(&self) -> Result<Option<u64>> {
        let meta = self.txn.open_table(META)?;
        Ok(meta.get(SCHEMA_VERSION_KEY)?.map(|v| v.value()))
    }
}

impl std::fmt::Debug for CardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardReader").finish_non_exhaustive()
    }
}
