//! Keyword selection for archived pages

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use url::Url;

/// Number of keywords derived when the page declares none
pub const MAX_DERIVED_KEYWORDS: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "http", "https", "www", "com", "edu",
    "org",
];

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]{3,}").unwrap());

/// Picks the keywords that summarize a page
///
/// Declared `<meta name="keywords">` values win: split on commas, trimmed,
/// lowercased, deduplicated in first-seen order. Otherwise words of three or
/// more letters are collected from the title, headings and URL path. Stopwords
/// are dropped and the five most frequent are returned, ties going to the word
/// seen first.
pub fn extract_keywords(
    url: &Url,
    title: &str,
    meta_keywords: &str,
    headings: &[String],
) -> Vec<String> {
    if !meta_keywords.trim().is_empty() {
        let mut keywords: Vec<String> = Vec::new();
        for keyword in meta_keywords.split(',') {
            let keyword = keyword.trim().to_lowercase();
            if !keyword.is_empty() && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }
        return keywords;
    }

    let mut corpus = String::from(title);
    for heading in headings {
        corpus.push(' ');
        corpus.push_str(heading);
    }
    if let Some(segments) = url.path_segments() {
        for segment in segments {
            corpus.push(' ');
            corpus.push_str(segment);
        }
    }
    let corpus = corpus.to_lowercase();

    // word -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in WORD.find_iter(&corpus).map(|m| m.as_str()).enumerate() {
        if STOPWORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(MAX_DERIVED_KEYWORDS)
        .map(|(word, _, _)| word.to_string())
        .collect()
}
