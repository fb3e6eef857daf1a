use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    card::CardContent,
    markup::{looks_like_html, markdown_visible_text, visible_text},
};

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9a-z_]+").expect("word pattern is valid"));

/// Lowercase `text` and split it into maximal runs of ASCII letters, digits
/// and underscores. Duplicates are kept.
///
/// # Examples
///
/// ```
/// use deckdb::tokenizer::tokenize;
///
/// assert_eq!(tokenize("Hello, hello_world 42!"), ["hello", "hello_world", "42"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Relevance of each distinct body token: its frequency in the body, plus one
/// if it appears in the title and one if it appears in the summary.
///
/// Words that never occur in the body get no score.
pub fn score_terms(title: &str, summary: &str, body: &str) -> BTreeMap<String, u32> {
    let title_words: HashSet<String> = tokenize(title).into_iter().collect();
    let summary_words: HashSet<String> = tokenize(summary).into_iter().collect();

    let mut frequency: HashMap<String, u32> = HashMap::new();
    for word in tokenize(body) {
        *frequency.entry(word).or_default() += 1;
    }

    frequency
        .into_iter()
        .map(|(word, tf)| {
            let score = tf
                + u32::from(title_words.contains(&word))
                + u32::from(summary_words.contains(&word));
            (word, score)
        })
        .collect()
}

/// Index entries for a card: the visible text of its body scored against
/// its title and summary.
pub fn score_card(card: &CardContent) -> BTreeMap<String, u32> {
    let text = if looks_like_html(&card.path, &card.body) {
        visible_text(&card.body)
    } else {
        markdown_visible_text(&card.body)
    };
    score_terms(&card.title, &card.summary, &text)
}
