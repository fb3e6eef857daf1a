//! Markup handling: reduce HTML (or markdown with inline HTML) to the text a
//! reader would see, and pull titles and summaries out of documents.

use std::{path::Path, sync::LazyLock};

use regex::Regex;

/// Elements whose content is never visible.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "template", "title"];

/// Elements that start a new line of text when rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table",
    "td", "th", "tr", "ul",
];

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("link pattern is valid")
});

struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
    /// Bytes consumed after the opening `<`, including the final `>`.
    len: usize,
}

/// Parse a tag starting right after a `<`. Returns `None` when the `<` is
/// plain text (`a < b`) or the tag never closes.
fn parse_tag(s: &str) -> Option<Tag> {
    let (closing, body) = match s.strip_prefix('/') {
        Some(body) => (true, body),
        None => (false, s),
    };
    let first = body.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '!' || first == '?') {
        return None;
    }
    let name = body
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();

    let mut quote = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => {
                return Some(Tag {
                    name,
                    closing,
                    self_closing: s[..i].ends_with('/'),
                    len: i + 1,
                });
            }
            _ => {}
        }
    }
    None
}

fn decode_entity(s: &str) -> Option<(char, usize)> {
    let (end, _) = s.char_indices().take(12).find(|&(_, c)| c == ';')?;
    let ch = match &s[1..end] {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        name => {
            let code = match name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => name.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, end + 1))
}

fn push_decoded(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_entity(tail) {
            Some((ch, len)) => {
                out.push(ch);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

/// Human-visible text of a document.
///
/// Tags and comments are dropped, the content of `<script>`, `<style>` and
/// `<head>` is skipped, entities are decoded, and block elements are
/// separated by a space so adjacent paragraphs do not run together.
///
/// # Examples
///
/// ```
/// use deckdb::markup::visible_text;
///
/// let text = visible_text("<p>fish &amp; chips</p><script>x()</script><p>peas</p>");
/// assert_eq!(text.split_whitespace().collect::<Vec<_>>(), ["fish", "&", "chips", "peas"]);
/// ```
pub fn visible_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    let mut hidden: Option<String> = None;

    while let Some(lt) = rest.find('<') {
        if hidden.is_none() {
            push_decoded(&mut out, &rest[..lt]);
        }
        let after = &rest[lt + 1..];

        if let Some(comment) = after.strip_prefix("!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        let Some(tag) = parse_tag(after) else {
            if hidden.is_none() {
                out.push('<');
            }
            rest = after;
            continue;
        };
        rest = &after[tag.len..];

        if hidden.is_some() {
            let closes = hidden
                .as_deref()
                .is_some_and(|name| tag.closing && tag.name == name);
            if closes {
                hidden = None;
            }
        } else if !tag.closing
            && !tag.self_closing
            && HIDDEN_ELEMENTS.contains(&tag.name.as_str())
        {
            hidden = Some(tag.name);
        } else if BLOCK_ELEMENTS.contains(&tag.name.as_str()) {
            out.push(' ');
        }
    }

    if hidden.is_none() {
        push_decoded(&mut out, rest);
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Whether a document should be treated as HTML rather than markdown.
pub fn looks_like_html(path: &str, raw: &str) -> bool {
    let by_extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
        });
    by_extension || raw.trim_start().starts_with('<')
}

/// Visible text of the first `element` in an HTML document.
///
/// An unclosed element ends at the next opening of the same element or at
/// the end of the document.
pub fn first_element_text(html: &str, element: &str) -> Option<String> {
    let extract = |inner: &str| non_empty(collapse_whitespace(&visible_text(inner)));

    let mut offset = 0;
    let mut start = None;
    while let Some(lt) = html[offset..].find('<') {
        let at = offset + lt + 1;
        let Some(tag) = parse_tag(&html[at..]) else {
            offset = at;
            continue;
        };
        offset = at + tag.len;
        if tag.name != element {
            continue;
        }
        match (tag.closing, start) {
            (false, None) => start = Some(offset),
            (_, Some(begin)) => return extract(&html[begin..at - 1]),
            (true, None) => {}
        }
    }
    start.and_then(|begin| extract(&html[begin..]))
}

/// Plain text of a markdown inline fragment: HTML and entities resolved,
/// links reduced to their label, emphasis markers dropped.
fn inline_text(fragment: &str) -> String {
    let text = visible_text(fragment);
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    collapse_whitespace(&text.replace(['*', '`'], ""))
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Lines of a markdown document after its front matter, each paired with
/// whether it sits inside a fenced code block. Fence lines themselves are
/// reported as fenced.
fn markdown_lines(raw: &str) -> impl Iterator<Item = (&str, bool)> {
    let mut lines = raw.lines().peekable();
    if lines.peek().is_some_and(|first| first.trim() == "---") {
        lines.next();
        for line in lines.by_ref() {
            if line.trim() == "---" {
                break;
            }
        }
    }

    let mut in_fence = false;
    lines.map(move |line| {
        if is_fence(line.trim()) {
            in_fence = !in_fence;
            return (line, true);
        }
        (line, in_fence)
    })
}

/// The first `# ` heading of a markdown document, outside front matter and
/// fenced code.
pub fn markdown_title(raw: &str) -> Option<String> {
    markdown_lines(raw)
        .filter(|&(_, fenced)| !fenced)
        .filter_map(|(line, _)| line.trim().strip_prefix("# "))
        .map(inline_text)
        .find(|title| !title.is_empty())
}

/// Human-visible text of a markdown document.
///
/// Links and images contribute only their label, autolinks and inline HTML
/// tags are dropped, and front matter is skipped. Fenced code is kept as
/// written.
///
/// # Examples
///
/// ```
/// use deckdb::markup::markdown_visible_text;
///
/// let text = markdown_visible_text("Read [the intro](https://example.com/a.html).");
/// assert_eq!(text.trim(), "Read the intro.");
/// ```
pub fn markdown_visible_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (line, fenced) in markdown_lines(raw) {
        if fenced {
            if !is_fence(line.trim()) {
                out.push_str(line);
            }
        } else {
            out.push_str(&visible_text(&MARKDOWN_LINK.replace_all(line, "$1")));
        }
        out.push('\n');
    }
    out
}

fn starts_paragraph(line: &str) -> bool {
    let ordered_item = line
        .split_once(". ")
        .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
    !(ordered_item
        || line.starts_with('#')
        || line.starts_with('>')
        || line.starts_with('|')
        || line.starts_with('<')
        || line.starts_with("---")
        || line.starts_with("- ")
        || line.starts_with("* ")
        || line.starts_with("+ "))
}

/// The first plain paragraph of a markdown document.
///
/// Front matter, headings, fenced code, lists, quotes and tables are
/// skipped.
pub fn markdown_summary(raw: &str) -> Option<String> {
    let mut paragraph: Vec<&str> = Vec::new();
    for (line, fenced) in markdown_lines(raw) {
        let trimmed = line.trim();
        if fenced {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if trimmed.is_empty() || !starts_paragraph(trimmed) {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(trimmed);
    }

    non_empty(inline_text(&paragraph.join(" ")))
}
