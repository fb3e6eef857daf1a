use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use deckdb::{
    CardMeta,
    CardStore,
    ContentSource,
    Deck,
    DeckConfig,
    DeckEvent,
    DirectorySource,
    Error,
    ManualClock,
    MatchKind,
    walker,
};
use tokio::sync::Notify;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn open_store(
    dir: &tempfile::TempDir,
    clock: &Arc<ManualClock>,
) -> Result<CardStore, Box<dyn std::error::Error>> {
    Ok(CardStore::open_with_clock(
        &dir.path().join("cards.redb"),
        clock.clone(),
    )?)
}

/// Serves the first fetch only after `release` is notified; every later
/// fetch answers at once with newer content.
#[derive(Clone, Default)]
struct GatedSource {
    calls: Arc<AtomicUsize>,
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl ContentSource for GatedSource {
    async fn fetch(&self, _path: &str) -> deckdb::Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.release.notified().await;
            Ok("# Notes\n\nold revision\n".to_string())
        } else {
            Ok("# Notes\n\nnew revision\n".to_string())
        }
    }
}

#[tokio::test]
async fn slow_older_fetch_does_not_overwrite_newer_write() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(1_000));
    let source = GatedSource::default();
    let deck = Arc::new(Deck::new(
        open_store(&tmp, &clock)?,
        source.clone(),
        DeckConfig::default(),
    ));
    let meta = CardMeta::new("/notes.md", "h");

    let slow = {
        let deck = Arc::clone(&deck);
        let meta = meta.clone();
        tokio::spawn(async move { deck.load_card(&meta).await })
    };
    source.started.notified().await;

    clock.set(2_000);
    let fast = deck.load_card(&meta).await?.ok_or("fast load was rejected")?;
    assert_eq!(fast.updated_at, 2_000);

    source.release.notify_one();
    assert!(slow.await??.is_none());

    let stored = deck.get("/notes.md").await?.ok_or("card missing")?;
    assert!(stored.body.contains("new revision"));
    assert_eq!(deck.search("revision", None).await?.len(), 1);
    assert!(deck.search("old", None).await?.is_empty());
    Ok(())
}

/// Counts how many fetches run at once.
#[derive(Clone, Default)]
struct CountingSource {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ContentSource for CountingSource {
    async fn fetch(&self, path: &str) -> deckdb::Result<String> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("# {path}\n\ncommon body\n"))
    }
}

#[tokio::test]
async fn sync_respects_fetch_concurrency() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(1_000));
    let source = CountingSource::default();
    let deck = Deck::new(
        open_store(&tmp, &clock)?,
        source.clone(),
        DeckConfig::default().with_concurrency(3),
    );

    let metas: Vec<CardMeta> = (0..10)
        .map(|i| CardMeta::new(format!("/card{i}.md"), "1"))
        .collect();
    let report = deck.sync(&metas).await?;

    assert_eq!(report.loaded.len(), 10);
    assert!(source.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(deck.search("common", None).await?.len(), 10);
    Ok(())
}

#[tokio::test]
async fn directory_sync_round_trip() -> TestResult {
    let docs = tempfile::tempdir()?;
    std::fs::create_dir(docs.path().join("guide"))?;
    std::fs::write(
        docs.path().join("guide/widgets.md"),
        "# Widgets\n\nEverything about widgets.\n\nWidgets are small parts.\n",
    )?;
    std::fs::write(
        docs.path().join("gadgets.html"),
        "<html><body><h1>Gadgets</h1><p>Gadget catalogue.</p>\
         <script>var widgets = 1;</script></body></html>",
    )?;

    let db = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(1_000));
    let deck = Deck::new(
        open_store(&db, &clock)?,
        DirectorySource::new(docs.path()),
        DeckConfig::default(),
    );
    let mut events = deck.subscribe();

    let metas: Vec<CardMeta> = walker::discover_cards(docs.path(), &[])?
        .iter()
        .map(|file| file.meta())
        .collect();
    let report = deck.sync(&metas).await?;
    assert_eq!(report.loaded.len(), 2);
    assert!(report.failed.is_empty());

    // Script text never reaches the index.
    let widgets = deck.search("widgets", None).await?;
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].path, "/guide/widgets.md");

    let gadget = deck.get("/gadgets.html").await?.ok_or("gadgets missing")?;
    assert_eq!(gadget.title, "Gadgets");
    assert_eq!(gadget.summary, "Gadget catalogue.");

    // A typo falls back to fuzzy matching on titles.
    let fuzzy = deck.search_hits("gadgest", None).await?;
    assert_eq!(fuzzy.kind, MatchKind::Fuzzy);
    assert_eq!(fuzzy.hits[0].card.path, "/gadgets.html");

    // Delete one file and sync again.
    clock.advance(100);
    std::fs::remove_file(docs.path().join("gadgets.html"))?;
    let metas: Vec<CardMeta> = walker::discover_cards(docs.path(), &[])?
        .iter()
        .map(|file| file.meta())
        .collect();
    let report = deck.sync(&metas).await?;
    assert!(report.loaded.is_empty());
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.pruned, ["/gadgets.html"]);
    assert!(deck.search("gadget", None).await?.is_empty());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.last(),
        Some(&DeckEvent::CardsPruned {
            paths: vec!["/gadgets.html".to_string()]
        })
    );
    assert_eq!(seen.len(), 3);
    Ok(())
}

/// Fails every path in `broken`, serves the rest from memory.
struct FlakySource {
    docs: Mutex<HashMap<String, String>>,
    broken: Vec<String>,
}

impl ContentSource for FlakySource {
    async fn fetch(&self, path: &str) -> deckdb::Result<String> {
        if self.broken.iter().any(|b| b == path) {
            return Err(Error::Fetch {
                path: path.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        self.docs
            .lock()
            .map_err(|_| Error::FetchTask("poisoned".into()))?
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                path: path.to_string(),
                reason: "not found".to_string(),
            })
    }
}

#[tokio::test]
async fn fetch_failure_keeps_previous_card() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(1_000));
    let store = open_store(&tmp, &clock)?;

    let first = Deck::new(
        store,
        FlakySource {
            docs: Mutex::new(HashMap::from([(
                "/a.md".to_string(),
                "stable content".to_string(),
            )])),
            broken: Vec::new(),
        },
        DeckConfig::default(),
    );
    first.sync(&[CardMeta::new("/a.md", "1")]).await?;
    drop(first);

    clock.advance(10);
    let second = Deck::new(
        open_store(&tmp, &clock)?,
        FlakySource {
            docs: Mutex::new(HashMap::new()),
            broken: vec!["/a.md".to_string()],
        },
        DeckConfig::default(),
    );
    let report = second.sync(&[CardMeta::new("/a.md", "2")]).await?;
    assert_eq!(report.failed.len(), 1);
    assert!(report.pruned.is_empty());

    let card = second.get("/a.md").await?.ok_or("card lost")?;
    assert_eq!(card.hash, "1");
    assert_eq!(second.search("stable", None).await?.len(), 1);
    Ok(())
}
