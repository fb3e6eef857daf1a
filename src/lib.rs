//! deckdb - a durable card store with a keyword search index.
//!
//! Documents (markdown or HTML) are loaded as *cards*: a title, a summary and
//! a body, keyed by path. Each card's body is tokenized into an inverted index
//! stored next to it in [redb](https://github.com/cberner/redb), so search is a
//! handful of range scans. When no query word is in the index, titles and
//! summaries are matched fuzzily instead.
//!
//! Writes carry the time their content was fetched. A write whose content is
//! older than what is already stored is dropped, so concurrent loads of the
//! same card always converge on the newest content.
//!
//! # Quick start
//!
//! ```no_run
//! use deckdb::{CardMeta, CardStore, DataDir, Deck, DeckConfig, DirectorySource};
//!
//! # async fn run() -> deckdb::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let store = CardStore::open(&data_dir.cards_db())?;
//! let deck = Deck::new(store, DirectorySource::new("docs"), DeckConfig::default());
//!
//! deck.load_card(&CardMeta::new("/intro.md", "v1")).await?;
//! for card in deck.search("getting started", None).await? {
//!     println!("{}: {}", card.path, card.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod card;
pub mod clock;
pub mod config;
pub mod data_dir;
pub mod deck;
pub mod error;
pub mod fetcher;
pub mod indexer;
pub mod markup;
pub mod search;
pub mod source;
pub mod store;
pub mod tokenizer;
pub mod walker;

pub use card::{Card, CardContent, CardMeta};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DeckConfig;
pub use data_dir::DataDir;
pub use deck::{Deck, DeckEvent, SyncReport};
pub use error::{Error, Result};
pub use fetcher::ThrottledFetcher;
pub use search::{MatchKind, SearchHit, SearchResults};
pub use source::{ContentSource, DirectorySource, HttpSource};
pub use store::CardStore;
