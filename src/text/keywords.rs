use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::stopwords::is_stopword;
use super::tokenize::tokenize;

/// Keyword → occurrence count for one article.
///
/// Serialized as a flat JSON object, e.g. `{"rust":5,"tokio":3}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagMap(BTreeMap<String, u32>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, word: impl Into<String>, count: u32) {
        self.0.insert(word.into(), count);
    }

    pub fn get(&self, word: &str) -> Option<u32> {
        self.0.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FromIterator<(String, u32)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Tuning knobs for [`extract_tags`].
#[derive(Debug, Clone, Copy)]
pub struct TagOptions {
    /// How many of the most frequent words to consider
    pub top_n: usize,
    /// Words seen fewer times than this are dropped
    pub min_count: u32,
    /// How many times the title is added to the text
    pub title_weight: usize,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            min_count: 2,
            title_weight: 3,
        }
    }
}

/// The `n` most frequent items, most frequent first.
///
/// Ties keep the order in which items were first seen.
pub fn most_common<I>(items: I, n: usize) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = String>,
{
    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, pos)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(n);
    ranked.into_iter().map(|(word, count, _)| (word, count)).collect()
}

/// Visible text of an HTML fragment.
///
/// Text inside `script`, `noscript` and `style` elements is skipped. Text
/// nodes are joined with spaces so adjacent blocks do not fuse into one word.
pub fn html_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            matches!(a.value(), Node::Element(el) if matches!(el.name(), "script" | "noscript" | "style"))
        });
        if !hidden {
            parts.push(&**text);
        }
    }

    parts.join(" ")
}

/// Extract an article's keyword map from its HTML body and title.
///
/// The title is repeated `title_weight` times to favour its words; tokens of
/// one character and stopwords are ignored; of the `top_n` most frequent
/// words only those seen at least `min_count` times are kept.
pub fn extract_tags(html: &str, title: &str, options: TagOptions) -> TagMap {
    let mut text = html_text(html);
    for _ in 0..options.title_weight {
        text.push(' ');
        text.push_str(title);
    }

    let words = tokenize(&text)
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| w.chars().count() > 1 && !is_stopword(w));

    most_common(words, options.top_n)
        .into_iter()
        .filter_map(|(word, count)| {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            (count >= options.min_count).then_some((word, count))
        })
        .collect()
}
