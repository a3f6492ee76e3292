//! Word-level trigram similarity for typo-tolerant keyword matching.
//!
//! Words are lowercased, padded with two leading spaces and one trailing
//! space, and split into overlapping character trigrams. Two words are as
//! similar as the Jaccard overlap of their trigram sets. A query matches a
//! text by averaging, over the query words, the best similarity each one
//! reaches against any word of the text.
//!
//! [`probe_trigrams`] gives the unpadded trigrams of the query's words, which
//! is what the store looks up in its trigram index to pick candidates.

use std::collections::HashSet;

type Trigram = [char; 3];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

fn trigrams(word: &str) -> HashSet<Trigram> {
    let padded: Vec<char> = "  ".chars().chain(word.chars()).chain(" ".chars()).collect();
    padded.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

fn jaccard(a: &HashSet<Trigram>, b: &HashSet<Trigram>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Distinct three-character windows of every query word with at least
/// three characters, lowercased, in first-seen order.
pub fn probe_trigrams(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for word in words(query) {
        let chars: Vec<char> = word.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            if seen.insert(trigram.clone()) {
                out.push(trigram);
            }
        }
    }
    out
}

/// Precomputed query side of word-level similarity, reused across many texts.
pub struct TrigramQuery {
    words: Vec<HashSet<Trigram>>,
}

impl TrigramQuery {
    pub fn new(query: &str) -> Self {
        let mut seen = HashSet::new();
        let words = words(query)
            .filter(|w| seen.insert(w.clone()))
            .map(|w| trigrams(&w))
            .collect();
        Self { words }
    }

    /// Mean over query words of the best match against any word of `text`.
    pub fn score(&self, text: &str) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        let text_words: HashSet<String> = words(text).collect();
        if text_words.is_empty() {
            return 0.0;
        }
        let text_trigrams: Vec<HashSet<Trigram>> = text_words.iter().map(|w| trigrams(w)).collect();

        let total: f64 = self
            .words
            .iter()
            .map(|q| {
                text_trigrams
                    .iter()
                    .map(|t| jaccard(q, t))
                    .fold(0.0, f64::max)
            })
            .sum();
        total / self.words.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn similarity(a: &str, b: &str) -> f64 {
        jaccard(&trigrams(&a.to_lowercase()), &trigrams(&b.to_lowercase()))
    }

    fn word_similarity(query: &str, text: &str) -> f64 {
        TrigramQuery::new(query).score(text)
    }

    #[test]
    fn identical_words_are_fully_similar() {
        assert!((similarity("invoice", "Invoice") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn typo_stays_above_floor() {
        assert!(similarity("certificate", "certifcate") > 0.3);
        assert!(word_similarity("pilot certifcate", "The pilot certificate was renewed.") > 0.3);
    }

    #[test]
    fn unrelated_words_score_low() {
        assert!(similarity("invoice", "zebra") < 0.1);
        assert!(word_similarity("zebra", "quarterly telecom invoice") < 0.3);
    }

    #[test]
    fn empty_inputs_score_zero() {
        assert_eq!(word_similarity("", "anything"), 0.0);
        assert_eq!(word_similarity("query", ""), 0.0);
        assert_eq!(TrigramQuery::new(" ... ").score("anything"), 0.0);
    }

    #[test]
    fn probes_skip_short_words() {
        assert_eq!(probe_trigrams("A4 Pilot"), vec!["pil", "ilo", "lot"]);
        assert_eq!(probe_trigrams("lot of pilots"), vec!["lot", "pil", "ilo", "ots"]);
        assert!(probe_trigrams("a b 12").is_empty());
    }
}
