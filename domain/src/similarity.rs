//! Trigram similarity, compatible with the pg_trgm definition: lowercase,
//! pad each word with two leading and one trailing space, and compare the
//! trigram sets with Jaccard.

use std::collections::BTreeSet;

/// Minimum similarity for a keyword to be suggested.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

fn trigrams(s: &str) -> BTreeSet<[char; 3]> {
    let mut out = BTreeSet::new();
    let lower = s.to_lowercase();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let padded: Vec<char> = "  ".chars().chain(word.chars()).chain([' ']).collect();
        for w in padded.windows(3) {
            out.insert([w[0], w[1], w[2]]);
        }
    }
    out
}

/// Similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() && tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}

/// Keep candidates above the threshold, best first, at most `limit`.
pub fn rank_similar<I>(keyword: &str, candidates: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut scored: Vec<(f64, String)> = candidates
        .into_iter()
        .filter(|c| c != keyword)
        .map(|c| (similarity(keyword, &c), c))
        .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().take(limit).map(|(_, k)| k).collect()
}
