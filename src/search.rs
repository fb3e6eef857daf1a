use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{
    card::Card,
    error::Result,
    store::{CardReader, CardStore},
    tokenizer::tokenize,
};

pub const DEFAULT_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Fuzzy fallback results are capped here regardless of the search limit.
pub const FUZZY_RESULT_LIMIT: usize = 20;

/// Largest edit distance that still counts as a fuzzy match.
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Words longer than this are skipped when the other word is less than half
/// their length.
const SKEW_CHECK_MIN_LEN: usize = 7;

const PREFIX_MATCH_BONUS: f64 = 10.0;

/// How a result set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Exact hits in the inverted index.
    Exact,
    /// Prefix / edit-distance matches on titles and summaries.
    Fuzzy,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Fuzzy => "fuzzy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub card: Card,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub kind: MatchKind,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    fn empty() -> Self {
        Self {
            kind: MatchKind::Exact,
            hits: Vec::new(),
        }
    }

    pub fn into_cards(self) -> Vec<Card> {
        self.hits.into_iter().map(|hit| hit.card).collect()
    }
}

impl CardStore {
    /// Ranked cards for `query`. See [`CardStore::search_hits`].
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Card>> {
        Ok(self.search_hits(query, limit)?.into_cards())
    }

    /// Search the index for `query`.
    ///
    /// Scores of every query token are summed per card and the best `limit`
    /// cards are returned. When no token hits the index at all, titles and
    /// summaries are matched fuzzily instead and at most
    /// [`FUZZY_RESULT_LIMIT`] cards come back.
    pub fn search_hits(&self, query: &str, limit: usize) -> Result<SearchResults> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(SearchResults::empty());
        }

        let reader = self.read()?;
        if let Some(hits) = exact_matches(&reader, &tokens, limit)? {
            return Ok(SearchResults {
                kind: MatchKind::Exact,
                hits,
            });
        }

        debug!(query, "no index match, falling back to fuzzy search");
        Ok(SearchResults {
            kind: MatchKind::Fuzzy,
            hits: fuzzy_matches(&reader, &tokens)?,
        })
    }

    /// Up to `limit` cards, most recently updated first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Card>> {
        self.read()?.recent(limit)
    }

    pub fn get(&self, path: &str) -> Result<Option<Card>> {
        self.read()?.get(path)
    }
}

/// `None` when no token hit the index.
fn exact_matches(
    reader: &CardReader,
    tokens: &[String],
    limit: usize,
) -> Result<Option<Vec<SearchHit>>> {
    // First-seen order, so equal scores rank deterministically.
    let mut totals: Vec<(String, u64)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for token in tokens {
        for entry in reader.index_entries_by_word(token)? {
            let score = u64::from(entry.score);
            match positions.get(&entry.path) {
                Some(&i) => totals[i].1 += score,
                None => {
                    positions.insert(entry.path.clone(), totals.len());
                    totals.push((entry.path, score));
                }
            }
        }
    }

    if !totals.iter().any(|(_, score)| *score > 0) {
        return Ok(None);
    }

    totals.sort_by(|a, b| b.1.cmp(&a.1));

    let mut hits = Vec::with_capacity(totals.len().min(limit));
    for (path, score) in totals.into_iter().take(limit) {
        // A card deleted since its entries were read simply drops out.
        if let Some(card) = reader.get(&path)? {
            hits.push(SearchHit {
                card,
                score: score as f64,
            });
        }
    }
    Ok(Some(hits))
}

fn fuzzy_matches(reader: &CardReader, tokens: &[String]) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::new();
    for card in reader.cards()? {
        let candidates: BTreeSet<String> = tokenize(&card.title)
            .into_iter()
            .chain(tokenize(&card.summary))
            .collect();

        let score: f64 = tokens
            .iter()
            .map(|query| {
                candidates
                    .iter()
                    .map(|candidate| word_similarity(query, candidate))
                    .fold(0.0, f64::max)
            })
            .sum();

        if score > 0.0 {
            hits.push(SearchHit { card, score });
        }
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(FUZZY_RESULT_LIMIT);
    Ok(hits)
}

/// How well `candidate` matches the query word `query`.
///
/// A prefix match scores `10 + len(query)`, above any edit-distance match.
/// Otherwise words within [`MAX_EDIT_DISTANCE`] edits score
/// `1 / (distance + 1)`, and everything else scores zero.
///
/// # Examples
///
/// ```
/// use deckdb::search::word_similarity;
///
/// assert_eq!(word_similarity("wid", "widgets"), 13.0);
/// assert_eq!(word_similarity("wigdets", "widgets"), 1.0 / 3.0);
/// assert_eq!(word_similarity("cat", "widgets"), 0.0);
/// ```
pub fn word_similarity(query: &str, candidate: &str) -> f64 {
    let query_len = query.chars().count();
    if candidate.starts_with(query) {
        return PREFIX_MATCH_BONUS + query_len as f64;
    }

    let candidate_len = candidate.chars().count();
    let longer = query_len.max(candidate_len);
    let shorter = query_len.min(candidate_len);
    if longer > SKEW_CHECK_MIN_LEN && shorter * 2 < longer {
        return 0.0;
    }

    let distance = levenshtein(query, candidate);
    if distance <= MAX_EDIT_DISTANCE {
        1.0 / (distance as f64 + 1.0)
    } else {
        0.0
    }
}

/// Edit distance with unit cost insertions, deletions and substitutions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j]
            } else {
                1 + previous[j].min(previous[j + 1]).min(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
