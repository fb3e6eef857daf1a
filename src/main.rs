use clap::Parser;
use deckdb::{
    Card,
    CardMeta,
    CardStore,
    DataDir,
    Deck,
    DeckConfig,
    DirectorySource,
    HttpSource,
    SyncReport,
    error::{self, Error},
    search::SearchResults,
    source::ContentSource,
    walker,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DECKDB_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = CardStore::open(&data_dir.cards_db())?;
    let mut config = DeckConfig::default();
    if let Some(concurrency) = cli.concurrency {
        config = config.with_concurrency(concurrency);
    }

    match cli.command {
        Command::Sync(args) => {
            let root = args.dir.canonicalize().map_err(|e| {
                Error::Config(format!(
                    "cannot resolve directory {}: {e}",
                    args.dir.display()
                ))
            })?;
            let excludes = args.exclude;
            let scan_root = root.clone();
            let metas: Vec<CardMeta> = tokio::task::spawn_blocking(move || {
                walker::discover_cards(&scan_root, &excludes)
            })
            .await??
            .iter()
            .map(|file| file.meta())
            .collect();

            let deck = Deck::new(store, DirectorySource::new(root), config);
            let report = deck.sync(&metas).await?;
            print_report(&report, args.json)?;
        }
        Command::SyncRemote(args) => {
            let metas = read_manifest(&args.manifest)?;
            let source = HttpSource::new(&args.base_url)?;
            let deck = Deck::new(store, source, config);
            let report = deck.sync(&metas).await?;
            print_report(&report, args.json)?;
        }
        Command::Search(args) => {
            let deck = offline_deck(store, config);
            let results = deck.search_hits(&args.query, args.count).await?;
            print_search(&args.query, &results, args.json)?;
        }
        Command::Recent(args) => {
            let deck = offline_deck(store, config);
            let cards = deck.recent(args.count).await?;
            if args.json {
                let items: Vec<_> = cards.iter().map(card_summary).collect();
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if cards.is_empty() {
                println!("No cards stored.");
            } else {
                for card in &cards {
                    println!("{}\t{}", card.path, card.title);
                }
            }
        }
        Command::Get(args) => {
            let deck = offline_deck(store, config);
            let card =
                deck.get(&args.path).await?.ok_or_else(|| Error::NotFound {
                    kind: "card",
                    name: args.path.clone(),
                })?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&card)?);
            } else {
                print_card(&card);
            }
        }
        Command::Remove(args) => {
            let deck = offline_deck(store, config);
            if !deck.remove_card(&args.path).await? {
                return Err(Error::NotFound {
                    kind: "card",
                    name: args.path,
                });
            }
            println!("Removed card '{}'", args.path);
        }
        Command::Status(args) => {
            cmd_status(&store, &data_dir, args.json)?;
        }
        Command::Completions(_) => unreachable!("handled before opening the store"),
    }

    Ok(())
}

/// Source for commands that only read or delete, and never fetch.
struct NoSource;

impl ContentSource for NoSource {
    async fn fetch(&self, path: &str) -> error::Result<String> {
        Err(Error::Fetch {
            path: path.to_string(),
            reason: "this command does not fetch content".to_string(),
        })
    }
}

fn offline_deck(store: CardStore, config: DeckConfig) -> Deck<NoSource> {
    Deck::new(store, NoSource, config)
}

fn read_manifest(path: &std::path::Path) -> error::Result<Vec<CardMeta>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read manifest {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        Error::Config(format!("invalid manifest {}: {e}", path.display()))
    })
}

fn card_summary(card: &Card) -> serde_json::Value {
    json!({
        "path": card.path,
        "title": card.title,
        "summary": card.summary,
        "updatedAt": card.updated_at,
    })
}

fn print_card(card: &Card) {
    println!("{}", card.title);
    println!("path: {}", card.path);
    println!("hash: {}", card.hash);
    println!("updated: {}", card.updated_at);
    if !card.summary.is_empty() {
        println!();
        println!("{}", card.summary);
    }
}

fn print_search(
    query: &str,
    results: &SearchResults,
    json: bool,
) -> error::Result<()> {
    if json {
        let hits: Vec<_> = results
            .hits
            .iter()
            .map(|hit| {
                let mut item = card_summary(&hit.card);
                item["score"] = json!(hit.score);
                item
            })
            .collect();
        let out = json!({
            "query": query,
            "match": results.kind.as_str(),
            "results": hits,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if results.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in results.hits.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}  {}",
            rank + 1,
            hit.score,
            hit.card.path,
            hit.card.title
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> error::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Loaded {}, unchanged {}, stale {}, failed {}, pruned {}",
        report.loaded.len(),
        report.unchanged,
        report.stale.len(),
        report.failed.len(),
        report.pruned.len()
    );
    for (path, reason) in &report.failed {
        eprintln!("  failed {path}: {reason}");
    }
    Ok(())
}

fn cmd_status(
    store: &CardStore,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let reader = store.read()?;
    let cards = reader.card_count()?;
    let entries = reader.index_entry_count()?;
    let schema = reader.schema_version()?.unwrap_or_default();

    if json {
        let out = json!({
            "dataDir": data_dir.root().display().to_string(),
            "schemaVersion": schema,
            "cards": cards,
            "indexEntries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Schema version: {schema}");
        println!("Cards: {cards}");
        println!("Index entries: {entries}");
    }
    Ok(())
}
